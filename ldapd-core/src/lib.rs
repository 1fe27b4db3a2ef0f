//! # ldapd-core
//!
//! Directory data model for ldapd.
//!
//! This crate provides:
//! - Attribute storage keyed by schema attribute types
//! - Entries, including the root DSE and the subschema subentry
//! - Three-valued filter evaluation and attribute selection
//! - Entry templates for directories that generate entries on demand

pub mod attributes;
pub mod entry;
pub mod filter;
pub mod template;

pub use attributes::AttributeDict;
pub use entry::{
    in_scope, Entry, EntryKind, RootDse, FEATURE_ABSOLUTE_FILTERS,
    FEATURE_ALL_OPERATIONAL_ATTRIBUTES,
};
pub use filter::{evaluate, AttributeSource, FilterResult};
pub use template::EntryTemplate;
