//! Incremental decoder and encoder for LDAP messages.

use crate::ber::{parse_header, tag, BerWriter};
use crate::error::ProtocolError;
use crate::message::LdapMessage;
use crate::MAX_MESSAGE_SIZE;
use bytes::{Buf, BytesMut};

/// Decodes one message from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete message;
/// nothing is consumed in that case. On success, and on
/// [`ProtocolError::InvalidMessage`], the message bytes are removed from the
/// buffer. Any other error means the stream is out of sync.
pub fn decode_one(buf: &mut BytesMut) -> Result<Option<LdapMessage>, ProtocolError> {
    let Some(header) = parse_header(&buf[..])? else {
        return Ok(None);
    };
    if header.tag != tag::SEQUENCE {
        return Err(ProtocolError::Framing(format!(
            "expected LDAPMessage SEQUENCE, got tag {:#04x}",
            header.tag
        )));
    }
    if header.content_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: header.content_len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if buf.len() < header.total_len() {
        return Ok(None);
    }

    buf.advance(header.header_len);
    let contents = buf.split_to(header.content_len);
    LdapMessage::decode(&contents).map(Some)
}

/// Encodes a message into its BER representation.
pub fn encode(message: &LdapMessage) -> BytesMut {
    let mut w = BerWriter::new();
    message.encode(&mut w);
    w.into_bytes()
}

/// Encodes messages.
pub struct Encoder;

impl Encoder {
    /// Encodes a single message.
    pub fn encode_message(message: &LdapMessage) -> BytesMut {
        encode(message)
    }

    /// Encodes several messages back to back.
    pub fn encode_all<'a, I>(messages: I) -> BytesMut
    where
        I: IntoIterator<Item = &'a LdapMessage>,
    {
        let mut buf = BytesMut::new();
        for message in messages {
            buf.extend_from_slice(&encode(message));
        }
        buf
    }
}

/// Buffers inbound bytes and decodes messages as they complete.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    pub fn decode_message(&mut self) -> Result<Option<LdapMessage>, ProtocolError> {
        decode_one(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
