//! Search filters.
//!
//! The filter AST mirrors the RFC4511 `Filter` CHOICE. Filters are carried on
//! the wire in BER and can also be written in the RFC4515 string form:
//!
//! - `(&(a=1)(b=2))` - conjunction, `(&)` is the absolute true filter (RFC4526)
//! - `(|(a=1)(b=2))` - disjunction, `(|)` is the absolute false filter
//! - `(!(a=1))` - negation
//! - `(cn=*)` - presence
//! - `(cn=Jo*n*)` - substrings
//! - `(cn=John)`, `(cn~=John)`, `(uidNumber>=1000)`, `(uidNumber<=1000)`
//! - `(cn:caseExactMatch:=John)`, `(:dn:2.5.13.5:=John)` - extensible match
//!
//! Assertion values escape `*`, `(`, `)`, `\` and NUL as `\XX`.

use crate::ber::{tag, BerReader, BerWriter};
use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

pub const FILTER_AND: u8 = 0xa0;
pub const FILTER_OR: u8 = 0xa1;
pub const FILTER_NOT: u8 = 0xa2;
pub const FILTER_EQUALITY: u8 = 0xa3;
pub const FILTER_SUBSTRINGS: u8 = 0xa4;
pub const FILTER_GREATER_OR_EQUAL: u8 = 0xa5;
pub const FILTER_LESS_OR_EQUAL: u8 = 0xa6;
pub const FILTER_PRESENT: u8 = 0x87;
pub const FILTER_APPROX: u8 = 0xa8;
pub const FILTER_EXTENSIBLE: u8 = 0xa9;

const SUBSTRING_INITIAL: u8 = 0x80;
const SUBSTRING_ANY: u8 = 0x81;
const SUBSTRING_FINAL: u8 = 0x82;

const MRA_RULE: u8 = 0x81;
const MRA_TYPE: u8 = 0x82;
const MRA_VALUE: u8 = 0x83;
const MRA_DN_ATTRIBUTES: u8 = 0x84;

/// A search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, Vec<u8>),
    Substrings {
        attribute: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        final_: Option<Vec<u8>>,
    },
    GreaterOrEqual(String, Vec<u8>),
    LessOrEqual(String, Vec<u8>),
    Approx(String, Vec<u8>),
    Extensible {
        matching_rule: Option<String>,
        attribute: Option<String>,
        value: Vec<u8>,
        dn_attributes: bool,
    },
    /// A filter choice this implementation does not know. Evaluates to undefined.
    Unrecognized { tag: u8, contents: Vec<u8> },
}

impl Filter {
    /// Shorthand for an equality filter with a string assertion.
    pub fn equal(attribute: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        Filter::Equal(attribute.into(), value.as_ref().to_vec())
    }

    /// Shorthand for a presence filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present(attribute.into())
    }

    /// Writes the filter as a BER element.
    pub fn encode(&self, w: &mut BerWriter) {
        match self {
            Filter::And(filters) => w.write_constructed(FILTER_AND, |w| {
                for f in filters {
                    f.encode(w);
                }
            }),
            Filter::Or(filters) => w.write_constructed(FILTER_OR, |w| {
                for f in filters {
                    f.encode(w);
                }
            }),
            Filter::Not(inner) => w.write_constructed(FILTER_NOT, |w| inner.encode(w)),
            Filter::Present(attr) => w.write_octets(FILTER_PRESENT, attr.as_bytes()),
            Filter::Equal(attr, value) => encode_ava(w, FILTER_EQUALITY, attr, value),
            Filter::GreaterOrEqual(attr, value) => {
                encode_ava(w, FILTER_GREATER_OR_EQUAL, attr, value)
            }
            Filter::LessOrEqual(attr, value) => encode_ava(w, FILTER_LESS_OR_EQUAL, attr, value),
            Filter::Approx(attr, value) => encode_ava(w, FILTER_APPROX, attr, value),
            Filter::Substrings {
                attribute,
                initial,
                any,
                final_,
            } => w.write_constructed(FILTER_SUBSTRINGS, |w| {
                w.write_octets(tag::OCTET_STRING, attribute.as_bytes());
                w.write_constructed(tag::SEQUENCE, |w| {
                    if let Some(initial) = initial {
                        w.write_octets(SUBSTRING_INITIAL, initial);
                    }
                    for part in any {
                        w.write_octets(SUBSTRING_ANY, part);
                    }
                    if let Some(final_) = final_ {
                        w.write_octets(SUBSTRING_FINAL, final_);
                    }
                });
            }),
            Filter::Extensible {
                matching_rule,
                attribute,
                value,
                dn_attributes,
            } => w.write_constructed(FILTER_EXTENSIBLE, |w| {
                if let Some(rule) = matching_rule {
                    w.write_octets(MRA_RULE, rule.as_bytes());
                }
                if let Some(attr) = attribute {
                    w.write_octets(MRA_TYPE, attr.as_bytes());
                }
                w.write_octets(MRA_VALUE, value);
                if *dn_attributes {
                    w.write_bool(MRA_DN_ATTRIBUTES, true);
                }
            }),
            Filter::Unrecognized { tag, contents } => w.write_tlv(*tag, contents),
        }
    }

    /// Reads one filter element.
    pub fn decode(r: &mut BerReader<'_>) -> Result<Self, ProtocolError> {
        let (filter_tag, contents) = r.read_tlv()?;
        let mut inner = BerReader::new(contents);
        let filter = match filter_tag {
            FILTER_AND | FILTER_OR => {
                let mut filters = Vec::new();
                while !inner.is_empty() {
                    filters.push(Filter::decode(&mut inner)?);
                }
                if filter_tag == FILTER_AND {
                    Filter::And(filters)
                } else {
                    Filter::Or(filters)
                }
            }
            FILTER_NOT => Filter::Not(Box::new(Filter::decode(&mut inner)?)),
            FILTER_PRESENT => Filter::Present(utf8(contents)?),
            FILTER_EQUALITY | FILTER_GREATER_OR_EQUAL | FILTER_LESS_OR_EQUAL | FILTER_APPROX => {
                let attr = inner.read_string(tag::OCTET_STRING)?;
                let value = inner.read_octets(tag::OCTET_STRING)?.to_vec();
                match filter_tag {
                    FILTER_EQUALITY => Filter::Equal(attr, value),
                    FILTER_GREATER_OR_EQUAL => Filter::GreaterOrEqual(attr, value),
                    FILTER_LESS_OR_EQUAL => Filter::LessOrEqual(attr, value),
                    _ => Filter::Approx(attr, value),
                }
            }
            FILTER_SUBSTRINGS => {
                let attribute = inner.read_string(tag::OCTET_STRING)?;
                let mut parts = inner.read_constructed(tag::SEQUENCE)?;
                let mut initial = None;
                let mut any = Vec::new();
                let mut final_ = None;
                while !parts.is_empty() {
                    let (part_tag, value) = parts.read_tlv()?;
                    match part_tag {
                        SUBSTRING_INITIAL if initial.is_none() && any.is_empty() => {
                            initial = Some(value.to_vec())
                        }
                        SUBSTRING_ANY if final_.is_none() => any.push(value.to_vec()),
                        SUBSTRING_FINAL if final_.is_none() => final_ = Some(value.to_vec()),
                        other => {
                            return Err(ProtocolError::Malformed(format!(
                                "unexpected substring component {:#04x}",
                                other
                            )))
                        }
                    }
                }
                Filter::Substrings {
                    attribute,
                    initial,
                    any,
                    final_,
                }
            }
            FILTER_EXTENSIBLE => {
                let matching_rule = inner.read_optional(MRA_RULE)?.map(utf8).transpose()?;
                let attribute = inner.read_optional(MRA_TYPE)?.map(utf8).transpose()?;
                let value = inner.read_octets(MRA_VALUE)?.to_vec();
                let dn_attributes = if inner.peek_tag() == Some(MRA_DN_ATTRIBUTES) {
                    inner.read_bool(MRA_DN_ATTRIBUTES)?
                } else {
                    false
                };
                Filter::Extensible {
                    matching_rule,
                    attribute,
                    value,
                    dn_attributes,
                }
            }
            other => Filter::Unrecognized {
                tag: other,
                contents: contents.to_vec(),
            },
        };
        Ok(filter)
    }
}

fn encode_ava(w: &mut BerWriter, filter_tag: u8, attr: &str, value: &[u8]) {
    w.write_constructed(filter_tag, |w| {
        w.write_octets(tag::OCTET_STRING, attr.as_bytes());
        w.write_octets(tag::OCTET_STRING, value);
    });
}

fn utf8(bytes: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    match std::str::from_utf8(value) {
        Ok(s) => {
            for c in s.chars() {
                match c {
                    '*' | '(' | ')' | '\\' | '\0' => write!(f, "\\{:02x}", c as u32)?,
                    c => write!(f, "{}", c)?,
                }
            }
            Ok(())
        }
        Err(_) => {
            for b in value {
                write!(f, "\\{:02x}", b)?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                write!(f, "(&")?;
                for sub in filters {
                    write!(f, "{}", sub)?;
                }
                write!(f, ")")
            }
            Filter::Or(filters) => {
                write!(f, "(|")?;
                for sub in filters {
                    write!(f, "{}", sub)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Equal(attr, value) => {
                write!(f, "({}=", attr)?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::GreaterOrEqual(attr, value) => {
                write!(f, "({}>=", attr)?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::LessOrEqual(attr, value) => {
                write!(f, "({}<=", attr)?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::Approx(attr, value) => {
                write!(f, "({}~=", attr)?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::Substrings {
                attribute,
                initial,
                any,
                final_,
            } => {
                write!(f, "({}=", attribute)?;
                if let Some(initial) = initial {
                    write_escaped(f, initial)?;
                }
                write!(f, "*")?;
                for part in any {
                    write_escaped(f, part)?;
                    write!(f, "*")?;
                }
                if let Some(final_) = final_ {
                    write_escaped(f, final_)?;
                }
                write!(f, ")")
            }
            Filter::Extensible {
                matching_rule,
                attribute,
                value,
                dn_attributes,
            } => {
                write!(f, "(")?;
                if let Some(attr) = attribute {
                    write!(f, "{}", attr)?;
                }
                if *dn_attributes {
                    write!(f, ":dn")?;
                }
                if let Some(rule) = matching_rule {
                    write!(f, ":{}", rule)?;
                }
                write!(f, ":=")?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Filter::Unrecognized { tag, .. } => write!(f, "(?{:#04x})", tag),
        }
    }
}

impl FromStr for Filter {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid("empty filter"));
        }
        // A bare item without parentheses is accepted for convenience.
        let owned;
        let input = if s.starts_with('(') {
            s
        } else {
            owned = format!("({})", s);
            &owned
        };
        let mut parser = Parser::new(input.as_bytes());
        let filter = parser.parse_filter()?;
        if parser.pos != parser.input.len() {
            return Err(invalid(format!("trailing input at offset {}", parser.pos)));
        }
        Ok(filter)
    }
}

fn invalid(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidFilter {
        reason: reason.into(),
    }
}

/// Recursive descent parser for RFC4515 filter strings.
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn expect(&mut self, c: u8) -> Result<(), ProtocolError> {
        if self.peek() != Some(c) {
            return Err(invalid(format!(
                "expected '{}' at offset {}",
                c as char, self.pos
            )));
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_filter(&mut self) -> Result<Filter, ProtocolError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.parse_filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.parse_filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(invalid("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Filter>, ProtocolError> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.parse_filter()?);
        }
        Ok(filters)
    }

    fn parse_attribute(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn parse_item(&mut self) -> Result<Filter, ProtocolError> {
        let attribute = self.parse_attribute();

        if self.peek() == Some(b':') {
            return self.parse_extensible(attribute);
        }
        if attribute.is_empty() {
            return Err(invalid(format!("missing attribute at offset {}", self.pos)));
        }

        if self.peek_str("~=") {
            self.pos += 2;
            return Ok(Filter::Approx(attribute, self.parse_value()?));
        }
        if self.peek_str(">=") {
            self.pos += 2;
            return Ok(Filter::GreaterOrEqual(attribute, self.parse_value()?));
        }
        if self.peek_str("<=") {
            self.pos += 2;
            return Ok(Filter::LessOrEqual(attribute, self.parse_value()?));
        }
        self.expect(b'=')?;

        let parts = self.parse_substring_parts()?;
        if parts.len() == 1 {
            let value = parts.into_iter().next().unwrap_or_default();
            return Ok(Filter::Equal(attribute, value));
        }
        if parts.len() == 2 && parts.iter().all(|p| p.is_empty()) {
            return Ok(Filter::Present(attribute));
        }

        let last = parts.len() - 1;
        let mut initial = None;
        let mut any = Vec::new();
        let mut final_ = None;
        for (i, part) in parts.into_iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            if i == 0 {
                initial = Some(part);
            } else if i == last {
                final_ = Some(part);
            } else {
                any.push(part);
            }
        }
        Ok(Filter::Substrings {
            attribute,
            initial,
            any,
            final_,
        })
    }

    fn parse_extensible(&mut self, attribute: String) -> Result<Filter, ProtocolError> {
        let mut dn_attributes = false;
        let mut matching_rule = None;

        if self.peek_str(":dn") && self.input.get(self.pos + 3) == Some(&b':') {
            self.pos += 3;
            dn_attributes = true;
        }
        if self.peek() == Some(b':') && !self.peek_str(":=") {
            self.pos += 1;
            let rule = self.parse_attribute();
            if rule.is_empty() {
                return Err(invalid(format!("missing matching rule at offset {}", self.pos)));
            }
            matching_rule = Some(rule);
        }
        if !self.peek_str(":=") {
            return Err(invalid(format!("expected ':=' at offset {}", self.pos)));
        }
        self.pos += 2;

        let attribute = if attribute.is_empty() {
            None
        } else {
            Some(attribute)
        };
        if attribute.is_none() && matching_rule.is_none() {
            return Err(invalid(
                "extensible match needs an attribute or a matching rule",
            ));
        }
        Ok(Filter::Extensible {
            matching_rule,
            attribute,
            value: self.parse_value()?,
            dn_attributes,
        })
    }

    /// Reads an assertion value, rejecting unescaped `*`.
    fn parse_value(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let parts = self.parse_substring_parts()?;
        if parts.len() != 1 {
            return Err(invalid(format!("unexpected '*' before offset {}", self.pos)));
        }
        Ok(parts.into_iter().next().unwrap_or_default())
    }

    /// Reads a value up to the closing parenthesis, splitting on unescaped `*`.
    fn parse_substring_parts(&mut self) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut parts = vec![Vec::new()];
        loop {
            match self.peek() {
                None => return Err(invalid("unterminated filter value")),
                Some(b')') => return Ok(parts),
                Some(b'(') => {
                    return Err(invalid(format!("unescaped '(' at offset {}", self.pos)))
                }
                Some(b'*') => {
                    self.pos += 1;
                    parts.push(Vec::new());
                }
                Some(b'\\') => {
                    let hex = self
                        .input
                        .get(self.pos + 1..self.pos + 3)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| invalid(format!("bad escape at offset {}", self.pos)))?;
                    self.pos += 3;
                    if let Some(last) = parts.last_mut() {
                        last.push(hex);
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Filter {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_simple_items() {
        assert_eq!(parse("(cn=test)"), Filter::equal("cn", "test"));
        assert_eq!(parse("cn=test"), Filter::equal("cn", "test"));
        assert_eq!(parse("(objectClass=*)"), Filter::present("objectClass"));
        assert_eq!(
            parse("(uidNumber>=1000)"),
            Filter::GreaterOrEqual("uidNumber".to_string(), b"1000".to_vec())
        );
        assert_eq!(
            parse("(uidNumber<=10)"),
            Filter::LessOrEqual("uidNumber".to_string(), b"10".to_vec())
        );
        assert_eq!(
            parse("(cn~=jon)"),
            Filter::Approx("cn".to_string(), b"jon".to_vec())
        );
    }

    #[test]
    fn test_parse_absolute_filters() {
        assert_eq!(parse("(&)"), Filter::And(vec![]));
        assert_eq!(parse("(|)"), Filter::Or(vec![]));
    }

    #[test]
    fn test_parse_nested() {
        let filter = parse("(&(objectClass=person)(|(cn=a)(!(sn=b))))");
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::equal("objectClass", "person"),
                Filter::Or(vec![
                    Filter::equal("cn", "a"),
                    Filter::Not(Box::new(Filter::equal("sn", "b"))),
                ]),
            ])
        );
    }

    #[test]
    fn test_parse_substrings() {
        assert_eq!(
            parse("(cn=Jo*h*n)"),
            Filter::Substrings {
                attribute: "cn".to_string(),
                initial: Some(b"Jo".to_vec()),
                any: vec![b"h".to_vec()],
                final_: Some(b"n".to_vec()),
            }
        );
        assert_eq!(
            parse("(cn=*mid*)"),
            Filter::Substrings {
                attribute: "cn".to_string(),
                initial: None,
                any: vec![b"mid".to_vec()],
                final_: None,
            }
        );
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(parse(r"(cn=a\2ab)"), Filter::equal("cn", "a*b"));
        assert_eq!(parse(r"(cn=\28x\29)"), Filter::equal("cn", "(x)"));
        assert!("(cn=\\zz)".parse::<Filter>().is_err());
    }

    #[test]
    fn test_parse_extensible() {
        assert_eq!(
            parse("(cn:caseExactMatch:=Fred)"),
            Filter::Extensible {
                matching_rule: Some("caseExactMatch".to_string()),
                attribute: Some("cn".to_string()),
                value: b"Fred".to_vec(),
                dn_attributes: false,
            }
        );
        assert_eq!(
            parse("(o:dn:=Ace)"),
            Filter::Extensible {
                matching_rule: None,
                attribute: Some("o".to_string()),
                value: b"Ace".to_vec(),
                dn_attributes: true,
            }
        );
        assert_eq!(
            parse("(:dn:2.4.6.8.10:=Dino)"),
            Filter::Extensible {
                matching_rule: Some("2.4.6.8.10".to_string()),
                attribute: None,
                value: b"Dino".to_vec(),
                dn_attributes: true,
            }
        );
        assert!("(:=x)".parse::<Filter>().is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<Filter>().is_err());
        assert!("(cn=test".parse::<Filter>().is_err());
        assert!("(=test)".parse::<Filter>().is_err());
        assert!("(cn=a)(cn=b)".parse::<Filter>().is_err());
        assert!("(cn>=a*)".parse::<Filter>().is_err());
    }

    #[test]
    fn test_display_reparses() {
        for s in [
            "(&(objectClass=person)(cn=J*n))",
            "(|)",
            "(!(uid=a\\2ab))",
            "(cn:dn:caseIgnoreMatch:=x)",
            "(member=*)",
        ] {
            let filter = parse(s);
            assert_eq!(parse(&filter.to_string()), filter);
        }
        assert_eq!(Filter::equal("cn", "a(b)").to_string(), "(cn=a\\28b\\29)");
    }

    #[test]
    fn test_ber_encoding() {
        let mut w = BerWriter::new();
        Filter::present("objectClass").encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes[0], FILTER_PRESENT);
        assert_eq!(&bytes[2..], b"objectClass");

        let filter = parse("(&(cn=a*b)(!(uid:dn:=x))(sn>=q))");
        let mut w = BerWriter::new();
        filter.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = Filter::decode(&mut BerReader::new(&bytes)).unwrap();
        assert_eq!(decoded, filter);
    }

    #[test]
    fn test_decode_unrecognized_choice() {
        let bytes = [0xaa, 0x01, 0x00];
        let decoded = Filter::decode(&mut BerReader::new(&bytes)).unwrap();
        assert_eq!(
            decoded,
            Filter::Unrecognized {
                tag: 0xaa,
                contents: vec![0x00]
            }
        );
    }
}
