//! Definite-length BER primitives used by the LDAP message codec.
//!
//! Only the subset LDAPv3 needs is supported: single byte identifiers,
//! definite lengths of up to four length octets, and the universal
//! BOOLEAN, INTEGER, OCTET STRING, ENUMERATED, NULL, SEQUENCE and SET types
//! (plus their context and application specific re-tagged forms).
//!
//! ```text
//! +-----+--------------------------+----------------+
//! | tag | length (1 or 1+n octets) | contents       |
//! +-----+--------------------------+----------------+
//! ```

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Universal tags.
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const ENUMERATED: u8 = 0x0a;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
}

/// Bit marking a constructed encoding.
pub const CONSTRUCTED: u8 = 0x20;

/// Parsed identifier and length octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: u8,
    pub header_len: usize,
    pub content_len: usize,
}

impl Header {
    /// Total encoded size of the element.
    pub fn total_len(&self) -> usize {
        self.header_len + self.content_len
    }
}

/// Parses the identifier and length octets at the start of `data`.
///
/// Returns `Ok(None)` when more bytes are needed to complete the header.
pub fn parse_header(data: &[u8]) -> Result<Option<Header>, ProtocolError> {
    let Some(&tag) = data.first() else {
        return Ok(None);
    };
    if tag & 0x1f == 0x1f {
        return Err(ProtocolError::Framing(format!(
            "multi-byte identifier {:#04x} not supported",
            tag
        )));
    }
    let Some(&first) = data.get(1) else {
        return Ok(None);
    };
    if first < 0x80 {
        return Ok(Some(Header {
            tag,
            header_len: 2,
            content_len: first as usize,
        }));
    }
    if first == 0x80 {
        return Err(ProtocolError::Framing(
            "indefinite length encoding is not allowed".to_string(),
        ));
    }
    let count = (first & 0x7f) as usize;
    if count > 4 {
        return Err(ProtocolError::Framing(format!(
            "length uses {} octets (max 4)",
            count
        )));
    }
    if data.len() < 2 + count {
        return Ok(None);
    }
    let content_len = data[2..2 + count]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Ok(Some(Header {
        tag,
        header_len: 2 + count,
        content_len,
    }))
}

fn put_length(buf: &mut BytesMut, len: usize) {
    if len < 0x80 {
        buf.put_u8(len as u8);
        return;
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    buf.put_u8(0x80 | (4 - skip) as u8);
    buf.put_slice(&bytes[skip..]);
}

/// Minimal two's complement contents octets for an INTEGER.
pub fn integer_contents(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decodes two's complement INTEGER contents.
pub fn decode_integer(contents: &[u8]) -> Result<i64, ProtocolError> {
    if contents.is_empty() || contents.len() > 8 {
        return Err(ProtocolError::Malformed(format!(
            "integer of {} octets",
            contents.len()
        )));
    }
    let negative = contents[0] & 0x80 != 0;
    let init: i64 = if negative { -1 } else { 0 };
    Ok(contents
        .iter()
        .fold(init, |acc, b| (acc << 8) | *b as i64))
}

/// Builds BER elements into a growable buffer.
#[derive(Debug, Default)]
pub struct BerWriter {
    buf: BytesMut,
}

impl BerWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes one element with the given contents octets.
    pub fn write_tlv(&mut self, tag: u8, contents: &[u8]) {
        self.buf.put_u8(tag);
        put_length(&mut self.buf, contents.len());
        self.buf.put_slice(contents);
    }

    pub fn write_integer(&mut self, tag: u8, value: i64) {
        self.write_tlv(tag, &integer_contents(value));
    }

    pub fn write_octets(&mut self, tag: u8, value: &[u8]) {
        self.write_tlv(tag, value);
    }

    pub fn write_bool(&mut self, tag: u8, value: bool) {
        self.write_tlv(tag, &[if value { 0xff } else { 0x00 }]);
    }

    pub fn write_null(&mut self, tag: u8) {
        self.write_tlv(tag, &[]);
    }

    /// Writes a constructed element whose contents are produced by `f`.
    pub fn write_constructed<F>(&mut self, tag: u8, f: F)
    where
        F: FnOnce(&mut BerWriter),
    {
        let mut inner = BerWriter::new();
        f(&mut inner);
        self.write_tlv(tag, &inner.buf);
    }
}

/// Cursor over the contents of a constructed BER element.
#[derive(Debug, Clone)]
pub struct BerReader<'a> {
    data: &'a [u8],
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Reads the next element, returning its tag and contents octets.
    pub fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), ProtocolError> {
        let header = parse_header(self.data)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?
            .ok_or_else(|| ProtocolError::Malformed("truncated element header".to_string()))?;
        if self.data.len() < header.total_len() {
            return Err(ProtocolError::Malformed(format!(
                "element {:#04x} truncated: need {} bytes, have {}",
                header.tag,
                header.total_len(),
                self.data.len()
            )));
        }
        let contents = &self.data[header.header_len..header.total_len()];
        self.data = &self.data[header.total_len()..];
        Ok((header.tag, contents))
    }

    /// Reads the next element and checks its tag.
    pub fn read_expected(&mut self, expected: u8) -> Result<&'a [u8], ProtocolError> {
        let (actual, contents) = self.read_tlv()?;
        if actual != expected {
            return Err(ProtocolError::UnexpectedTag { expected, actual });
        }
        Ok(contents)
    }

    pub fn read_integer(&mut self, tag: u8) -> Result<i64, ProtocolError> {
        decode_integer(self.read_expected(tag)?)
    }

    pub fn read_octets(&mut self, tag: u8) -> Result<&'a [u8], ProtocolError> {
        self.read_expected(tag)
    }

    pub fn read_string(&mut self, tag: u8) -> Result<String, ProtocolError> {
        let bytes = self.read_expected(tag)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn read_bool(&mut self, tag: u8) -> Result<bool, ProtocolError> {
        let contents = self.read_expected(tag)?;
        match contents {
            [b] => Ok(*b != 0),
            _ => Err(ProtocolError::Malformed(format!(
                "boolean of {} octets",
                contents.len()
            ))),
        }
    }

    /// Reads a constructed element and returns a reader over its contents.
    pub fn read_constructed(&mut self, tag: u8) -> Result<BerReader<'a>, ProtocolError> {
        Ok(BerReader::new(self.read_expected(tag)?))
    }

    /// Reads the next element only if it carries `tag`.
    pub fn read_optional(&mut self, tag: u8) -> Result<Option<&'a [u8]>, ProtocolError> {
        if self.peek_tag() == Some(tag) {
            return self.read_expected(tag).map(Some);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_and_long_lengths() {
        let mut w = BerWriter::new();
        w.write_octets(tag::OCTET_STRING, &[0xaa; 5]);
        assert_eq!(&w.into_bytes()[..2], &[0x04, 0x05]);

        let mut w = BerWriter::new();
        w.write_octets(tag::OCTET_STRING, &[0xaa; 300]);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], &[0x04, 0x82, 0x01, 0x2c]);
        assert_eq!(bytes.len(), 304);
    }

    #[test]
    fn test_integer_contents_minimal() {
        assert_eq!(integer_contents(0), vec![0x00]);
        assert_eq!(integer_contents(127), vec![0x7f]);
        assert_eq!(integer_contents(128), vec![0x00, 0x80]);
        assert_eq!(integer_contents(256), vec![0x01, 0x00]);
        assert_eq!(integer_contents(-1), vec![0xff]);
        assert_eq!(integer_contents(-128), vec![0x80]);
        assert_eq!(integer_contents(-129), vec![0xff, 0x7f]);
    }

    #[test]
    fn test_parse_header_incomplete() {
        assert_eq!(parse_header(&[]).unwrap(), None);
        assert_eq!(parse_header(&[0x30]).unwrap(), None);
        assert_eq!(parse_header(&[0x30, 0x82, 0x01]).unwrap(), None);

        let header = parse_header(&[0x30, 0x82, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!(header.header_len, 4);
        assert_eq!(header.content_len, 256);
    }

    #[test]
    fn test_parse_header_rejects_indefinite_length() {
        let err = parse_header(&[0x30, 0x80]).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("indefinite"));
    }

    #[test]
    fn test_reader_nested() {
        let mut w = BerWriter::new();
        w.write_constructed(tag::SEQUENCE, |w| {
            w.write_integer(tag::INTEGER, 7);
            w.write_bool(tag::BOOLEAN, true);
            w.write_octets(0x80, b"ctx");
        });
        let bytes = w.into_bytes();

        let mut outer = BerReader::new(&bytes);
        let mut seq = outer.read_constructed(tag::SEQUENCE).unwrap();
        assert!(outer.is_empty());
        assert_eq!(seq.read_integer(tag::INTEGER).unwrap(), 7);
        assert!(seq.read_bool(tag::BOOLEAN).unwrap());
        assert_eq!(seq.read_optional(0x81).unwrap(), None);
        assert_eq!(seq.read_optional(0x80).unwrap(), Some(&b"ctx"[..]));
        assert!(seq.is_empty());
    }

    #[test]
    fn test_reader_truncated_and_wrong_tag() {
        let mut r = BerReader::new(&[0x04, 0x05, 0x61]);
        assert!(matches!(r.read_tlv(), Err(ProtocolError::Malformed(_))));

        let mut r = BerReader::new(&[0x02, 0x01, 0x05]);
        assert!(matches!(
            r.read_octets(tag::OCTET_STRING),
            Err(ProtocolError::UnexpectedTag {
                expected: 0x04,
                actual: 0x02
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_integer_codec(value in any::<i64>()) {
            let contents = integer_contents(value);
            prop_assert!(!contents.is_empty() && contents.len() <= 8);
            prop_assert_eq!(decode_integer(&contents).unwrap(), value);
        }
    }
}
