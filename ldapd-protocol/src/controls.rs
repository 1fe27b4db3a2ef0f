//! Control values understood by the server.

use crate::ber::{tag, BerReader, BerWriter};
use crate::error::ProtocolError;
use crate::message::Control;

/// Simple Paged Results Manipulation control (RFC2696).
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// Value of the paged results control: `SEQUENCE { size INTEGER, cookie OCTET STRING }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResults {
    pub size: u32,
    pub cookie: Vec<u8>,
}

impl PagedResults {
    pub fn new(size: u32, cookie: impl Into<Vec<u8>>) -> Self {
        Self {
            size,
            cookie: cookie.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BerWriter::new();
        w.write_constructed(tag::SEQUENCE, |w| {
            w.write_integer(tag::INTEGER, self.size as i64);
            w.write_octets(tag::OCTET_STRING, &self.cookie);
        });
        w.into_bytes().to_vec()
    }

    pub fn decode(value: &[u8]) -> Result<Self, ProtocolError> {
        let mut seq = BerReader::new(value).read_constructed(tag::SEQUENCE)?;
        let size = seq.read_integer(tag::INTEGER)?;
        let size = u32::try_from(size)
            .map_err(|_| ProtocolError::Malformed(format!("page size {}", size)))?;
        let cookie = seq.read_octets(tag::OCTET_STRING)?.to_vec();
        Ok(Self { size, cookie })
    }

    /// Wraps the value in a control for a response.
    pub fn into_control(self) -> Control {
        Control {
            control_type: PAGED_RESULTS_OID.to_string(),
            criticality: false,
            value: Some(self.encode()),
        }
    }

    /// Extracts the value from a request control.
    pub fn from_control(control: &Control) -> Result<Self, ProtocolError> {
        let value = control
            .value
            .as_deref()
            .ok_or_else(|| ProtocolError::Malformed("paged results control without value".into()))?;
        Self::decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_results_wire_format() {
        let value = PagedResults::new(5, b"\x00\x01".to_vec()).encode();
        assert_eq!(value, vec![0x30, 0x07, 0x02, 0x01, 0x05, 0x04, 0x02, 0x00, 0x01]);
        assert_eq!(
            PagedResults::decode(&value).unwrap(),
            PagedResults::new(5, b"\x00\x01".to_vec())
        );
    }

    #[test]
    fn test_paged_results_control() {
        let control = PagedResults::new(0, Vec::new()).into_control();
        assert_eq!(control.control_type, PAGED_RESULTS_OID);
        assert!(!control.criticality);
        let parsed = PagedResults::from_control(&control).unwrap();
        assert_eq!(parsed.size, 0);
        assert!(parsed.cookie.is_empty());
    }

    #[test]
    fn test_paged_results_rejects_missing_value() {
        let control = Control {
            control_type: PAGED_RESULTS_OID.to_string(),
            criticality: true,
            value: None,
        };
        assert!(PagedResults::from_control(&control).is_err());
        assert!(PagedResults::decode(&[0x30, 0x03, 0x02, 0x01, 0xff]).is_err());
    }
}
