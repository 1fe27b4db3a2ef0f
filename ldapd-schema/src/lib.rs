//! # ldapd-schema
//!
//! LDAP schema type system for ldapd.
//!
//! This crate provides:
//! - Case-insensitive OID and short name registries with uniqueness checks
//! - Syntaxes that decode wire values into typed [`Value`]s
//! - Equality, ordering and substring matching rules
//! - Attribute types and object classes with superior inheritance
//! - RFC4512 description parsing and printing
//! - RFC4514 distinguished names
//! - Standard definition tables (RFC4512, RFC4517, RFC4519, RFC2307)

pub mod definitions;
pub mod dn;
pub mod error;
pub mod matching;
pub mod registry;
pub mod schema;
pub mod standard;
pub mod syntax;
pub mod value;

pub use definitions::{
    AttributeTypeDefinition, AttributeUsage, MatchingRuleDefinition, MatchingRuleUseDescription,
    ObjectClassDefinition, ObjectClassKind, SchemaDefinitions, SyntaxDefinition,
};
pub use dn::{Dn, Rdn, RdnAssertion};
pub use error::SchemaError;
pub use matching::{MatchAlgorithm, MatchingRule, MatchingRuleKind};
pub use registry::{normalize_key, OidRegistry};
pub use schema::{
    AttributeType, AttributeTypeId, MatchingRuleId, ObjectClass, ObjectClassId, Schema,
    SchemaObject, SchemaObjectId, Syntax, SyntaxId,
};
pub use syntax::SyntaxKind;
pub use value::Value;
