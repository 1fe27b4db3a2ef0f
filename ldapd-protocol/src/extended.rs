//! Extended operation OIDs and request/response values.

use crate::ber::{tag, BerReader, BerWriter};
use crate::error::{ProtocolError, ResultCode};
use crate::message::{LdapMessage, LdapResult, ProtocolOp};

/// StartTLS (RFC4511 section 4.14).
pub const STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";
/// "Who am I?" (RFC4532).
pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";
/// Password Modify (RFC3062).
pub const PASSWORD_MODIFY_OID: &str = "1.3.6.1.4.1.4203.1.11.1";
/// Notice of Disconnection (RFC4511 section 4.4.1).
pub const NOTICE_OF_DISCONNECTION_OID: &str = "1.3.6.1.4.1.1466.20036";

const TAG_USER_IDENTITY: u8 = 0x80;
const TAG_OLD_PASSWORD: u8 = 0x81;
const TAG_NEW_PASSWORD: u8 = 0x82;
const TAG_GENERATED_PASSWORD: u8 = 0x80;

/// Value of a Password Modify request. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordModifyRequest {
    pub user_identity: Option<Vec<u8>>,
    pub old_password: Option<Vec<u8>>,
    pub new_password: Option<Vec<u8>>,
}

impl PasswordModifyRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = BerWriter::new();
        w.write_constructed(tag::SEQUENCE, |w| {
            if let Some(v) = &self.user_identity {
                w.write_octets(TAG_USER_IDENTITY, v);
            }
            if let Some(v) = &self.old_password {
                w.write_octets(TAG_OLD_PASSWORD, v);
            }
            if let Some(v) = &self.new_password {
                w.write_octets(TAG_NEW_PASSWORD, v);
            }
        });
        w.into_bytes().to_vec()
    }

    /// Decodes the request value. A missing value means all fields are absent.
    pub fn decode(value: Option<&[u8]>) -> Result<Self, ProtocolError> {
        let Some(value) = value else {
            return Ok(Self::default());
        };
        let mut seq = BerReader::new(value).read_constructed(tag::SEQUENCE)?;
        Ok(Self {
            user_identity: seq.read_optional(TAG_USER_IDENTITY)?.map(|v| v.to_vec()),
            old_password: seq.read_optional(TAG_OLD_PASSWORD)?.map(|v| v.to_vec()),
            new_password: seq.read_optional(TAG_NEW_PASSWORD)?.map(|v| v.to_vec()),
        })
    }
}

/// Value of a Password Modify response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordModifyResponse {
    pub generated_password: Option<Vec<u8>>,
}

impl PasswordModifyResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = BerWriter::new();
        w.write_constructed(tag::SEQUENCE, |w| {
            if let Some(v) = &self.generated_password {
                w.write_octets(TAG_GENERATED_PASSWORD, v);
            }
        });
        w.into_bytes().to_vec()
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        let mut seq = BerReader::new(value).read_constructed(tag::SEQUENCE)?;
        Ok(Self {
            generated_password: seq
                .read_optional(TAG_GENERATED_PASSWORD)?
                .map(|v| v.to_vec()),
        })
    }
}

/// Builds the unsolicited Notice of Disconnection sent before closing a
/// connection whose byte stream can no longer be decoded.
pub fn notice_of_disconnection(result_code: ResultCode, message: impl Into<String>) -> LdapMessage {
    LdapMessage::new(
        0,
        ProtocolOp::ExtendedResponse {
            result: LdapResult::new(result_code, message),
            name: Some(NOTICE_OF_DISCONNECTION_OID.to_string()),
            value: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_modify_request_fields() {
        let req = PasswordModifyRequest {
            user_identity: Some(b"u:alice".to_vec()),
            old_password: None,
            new_password: Some(b"secret".to_vec()),
        };
        let value = req.encode();
        // SEQUENCE, [0] identity, [2] new password
        assert_eq!(value[0], 0x30);
        assert_eq!(value[2], 0x80);
        assert_eq!(PasswordModifyRequest::decode(Some(&value)).unwrap(), req);
    }

    #[test]
    fn test_password_modify_request_absent_value() {
        let req = PasswordModifyRequest::decode(None).unwrap();
        assert_eq!(req, PasswordModifyRequest::default());
    }

    #[test]
    fn test_password_modify_response() {
        let empty = PasswordModifyResponse::default().encode();
        assert_eq!(empty, vec![0x30, 0x00]);

        let resp = PasswordModifyResponse {
            generated_password: Some(b"Xy12".to_vec()),
        };
        assert_eq!(PasswordModifyResponse::decode(&resp.encode()).unwrap(), resp);
    }

    #[test]
    fn test_notice_of_disconnection() {
        let msg = notice_of_disconnection(ResultCode::ProtocolError, "framing");
        assert_eq!(msg.message_id, 0);
        match msg.op {
            ProtocolOp::ExtendedResponse { result, name, .. } => {
                assert_eq!(result.result_code, ResultCode::ProtocolError);
                assert_eq!(name.as_deref(), Some(NOTICE_OF_DISCONNECTION_OID));
            }
            other => panic!("unexpected op {:?}", other),
        }
    }
}
