//! # ldapd-protocol
//!
//! LDAPv3 wire protocol for ldapd.
//!
//! This crate provides:
//! - Definite-length BER primitives
//! - The LDAPv3 message envelope and protocol operations
//! - Search filters with BER and RFC4515 string forms
//! - Result codes and the LDAP error taxonomy
//! - Paged results control and extended operation values
//! - An incremental `decode_one`/`encode` codec

pub mod ber;
pub mod codec;
pub mod controls;
pub mod error;
pub mod extended;
pub mod filter;
pub mod message;

pub use codec::{decode_one, encode, Decoder, Encoder};
pub use controls::{PagedResults, PAGED_RESULTS_OID};
pub use error::{LdapError, ProtocolError, ResultCode};
pub use filter::Filter;
pub use message::{
    BindAuthentication, Change, Control, DerefAliases, LdapMessage, LdapResult, ModifyOperation,
    PartialAttribute, ProtocolOp, SearchRequest, SearchResultEntry, SearchScope,
};

/// LDAP protocol version supported by this implementation.
pub const LDAP_VERSION: i64 = 3;

/// Default port for plain LDAP and StartTLS.
pub const DEFAULT_PORT: u16 = 389;

/// Default port for LDAP over implicit TLS.
pub const DEFAULT_TLS_PORT: u16 = 636;

/// Maximum size of one encoded message (8 MiB).
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;
