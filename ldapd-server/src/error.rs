//! Server error types.

use ldapd_protocol::{LdapError, ResultCode};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ldapd_protocol::ProtocolError),

    #[error(transparent)]
    Ldap(#[from] LdapError),

    #[error("schema error: {0}")]
    Schema(#[from] ldapd_schema::SchemaError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("server shutting down")]
    ShuttingDown,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ServerError {
    /// Result code reported to the client. Only LDAP errors keep their own
    /// code; everything else is `other`.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ServerError::Ldap(e) => e.result_code(),
            _ => ResultCode::Other,
        }
    }

    /// Diagnostic message safe to send to the client.
    pub fn diagnostic_message(&self) -> String {
        match self {
            ServerError::Ldap(e) => e.message().to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldap_errors_keep_their_code() {
        let err = ServerError::from(LdapError::NoSuchObject("cn=x".into()));
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);
        assert_eq!(err.diagnostic_message(), "cn=x");
    }

    #[test]
    fn test_other_errors_are_opaque() {
        let err = ServerError::Internal("lock poisoned at handler.rs".into());
        assert_eq!(err.result_code(), ResultCode::Other);
        assert!(!err.diagnostic_message().contains("handler"));
        assert_eq!(ServerError::ShuttingDown.result_code(), ResultCode::Other);
    }
}
