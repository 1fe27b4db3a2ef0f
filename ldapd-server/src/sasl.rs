//! SASL mechanisms.
//!
//! A mechanism either completes a bind in one round or answers with a
//! challenge and a [`SaslContinuation`] that the session keeps until the
//! client's next BIND request with the same mechanism.

use crate::directory::{BindObject, Directory};
use ldapd_protocol::LdapError;

/// What a connection knows when a SASL round runs.
pub struct SaslContext<'a> {
    pub directory: &'a dyn Directory,
    /// Transport identity, e.g. derived from a client certificate.
    pub external_identity: Option<&'a str>,
}

/// Result of one SASL round.
pub enum SaslOutcome {
    Complete {
        bind: BindObject,
        /// Additional data sent with the successful BindResponse.
        server_data: Option<Vec<u8>>,
    },
    Challenge {
        data: Vec<u8>,
        continuation: Box<dyn SaslContinuation>,
    },
}

impl SaslOutcome {
    fn complete(bind: BindObject) -> Self {
        SaslOutcome::Complete {
            bind,
            server_data: None,
        }
    }
}

/// A suspended SASL dialog.
pub trait SaslContinuation: Send {
    fn step(
        self: Box<Self>,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError>;
}

pub trait SaslMechanism: Send + Sync {
    /// IANA registered mechanism name.
    fn name(&self) -> &str;

    /// Runs the first round.
    fn start(
        &self,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError>;
}

/// Mechanisms built into the server, by name.
pub fn builtin(name: &str) -> Option<Box<dyn SaslMechanism>> {
    match name.to_ascii_uppercase().as_str() {
        "ANONYMOUS" => Some(Box::new(Anonymous)),
        "PLAIN" => Some(Box::new(Plain)),
        "EXTERNAL" => Some(Box::new(External)),
        _ => None,
    }
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, LdapError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| LdapError::ProtocolError(format!("{} is not valid UTF-8", what)))
}

/// RFC4505. The optional credentials are trace information.
pub struct Anonymous;

impl SaslMechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn start(
        &self,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError> {
        let trace = credentials.map(|c| utf8(c, "trace")).transpose()?;
        let bind = ctx.directory.do_bind_sasl_anonymous(trace.as_deref())?;
        Ok(SaslOutcome::complete(bind))
    }
}

/// RFC4616: `[authzid] NUL authcid NUL password`.
///
/// A client that sends no credentials gets an empty challenge and supplies
/// them in a second round.
pub struct Plain;

impl Plain {
    fn authenticate(ctx: &SaslContext<'_>, credentials: &[u8]) -> Result<SaslOutcome, LdapError> {
        let parts: Vec<&[u8]> = credentials.split(|b| *b == 0).collect();
        let [authzid, authcid, password] = parts.as_slice() else {
            return Err(LdapError::ProtocolError(
                "PLAIN credentials must be authzid NUL authcid NUL password".to_string(),
            ));
        };
        let authzid = utf8(authzid, "authzid")?;
        let authcid = utf8(authcid, "authcid")?;
        let password = utf8(password, "password")?;
        let authzid = (!authzid.is_empty()).then_some(authzid.as_str());
        let bind = ctx
            .directory
            .do_bind_sasl_plain(&authcid, &password, authzid)?;
        Ok(SaslOutcome::complete(bind))
    }
}

impl SaslMechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn start(
        &self,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError> {
        match credentials {
            Some(credentials) => Self::authenticate(ctx, credentials),
            None => Ok(SaslOutcome::Challenge {
                data: Vec::new(),
                continuation: Box::new(PlainAwaitingCredentials),
            }),
        }
    }
}

struct PlainAwaitingCredentials;

impl SaslContinuation for PlainAwaitingCredentials {
    fn step(
        self: Box<Self>,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError> {
        Plain::authenticate(ctx, credentials.unwrap_or_default())
    }
}

/// RFC4422 appendix A. Credentials, if present, are the requested authzid.
pub struct External;

impl SaslMechanism for External {
    fn name(&self) -> &str {
        "EXTERNAL"
    }

    fn start(
        &self,
        ctx: &SaslContext<'_>,
        credentials: Option<&[u8]>,
    ) -> Result<SaslOutcome, LdapError> {
        let authzid = match credentials {
            Some(c) if !c.is_empty() => Some(utf8(c, "authzid")?),
            _ => None,
        };
        let bind = ctx
            .directory
            .do_bind_sasl_external(ctx.external_identity, authzid.as_deref())?;
        Ok(SaslOutcome::complete(bind))
    }
}
