//! # ldapd-server
//!
//! LDAPv3 server for ldapd.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - BER message framing and operation dispatch
//! - Per-connection sessions with SASL dialogs and paged search cursors
//! - A pluggable [`Directory`] backend and a static built-in directory
//! - StartTLS and LDAPS
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod sasl;
pub mod server;
pub mod session;
pub mod stream;
pub mod tls;

pub use auth::PasswordValidator;
pub use config::{
    Config, DirectoryConfig, FeaturesConfig, LimitsConfig, MetricsConfig, NetworkConfig,
    TlsConfig,
};
pub use directory::{BindObject, Directory, StaticDirectory};
pub use error::ServerError;
pub use handler::{HandlerOptions, RequestHandler};
pub use metrics::Metrics;
pub use sasl::{SaslMechanism, SaslOutcome};
pub use server::{Server, ServerConfig};
pub use session::Session;
