//! Attribute syntaxes (RFC4517 section 3.3).
//!
//! A syntax converts between the octets carried on the wire and a decoded
//! [`Value`]. Decoding is strict: a value that does not conform raises
//! `invalidAttributeSyntax`.

use crate::dn::Dn;
use crate::value::Value;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use ldapd_protocol::LdapError;

/// Well-known syntax OIDs.
pub mod oids {
    pub const ATTRIBUTE_TYPE_DESCRIPTION: &str = "1.3.6.1.4.1.1466.115.121.1.3";
    pub const BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
    pub const COUNTRY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.11";
    pub const DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
    pub const DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
    pub const GENERALIZED_TIME: &str = "1.3.6.1.4.1.1466.115.121.1.24";
    pub const IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";
    pub const INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
    pub const MATCHING_RULE_DESCRIPTION: &str = "1.3.6.1.4.1.1466.115.121.1.30";
    pub const MATCHING_RULE_USE_DESCRIPTION: &str = "1.3.6.1.4.1.1466.115.121.1.31";
    pub const NUMERIC_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.36";
    pub const OBJECT_CLASS_DESCRIPTION: &str = "1.3.6.1.4.1.1466.115.121.1.37";
    pub const OID: &str = "1.3.6.1.4.1.1466.115.121.1.38";
    pub const OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";
    pub const PRINTABLE_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.44";
    pub const TELEPHONE_NUMBER: &str = "1.3.6.1.4.1.1466.115.121.1.50";
    pub const LDAP_SYNTAX_DESCRIPTION: &str = "1.3.6.1.4.1.1466.115.121.1.54";
    pub const SUBSTRING_ASSERTION: &str = "1.3.6.1.4.1.1466.115.121.1.58";
}

/// Value format implemented by a syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    DirectoryString,
    Ia5String,
    PrintableString,
    NumericString,
    TelephoneNumber,
    CountryString,
    OctetString,
    Integer,
    Boolean,
    Oid,
    Dn,
    GeneralizedTime,
    SubstringAssertion,
    /// One of the RFC4512 schema element description syntaxes.
    SchemaDescription,
}

fn invalid(kind: SyntaxKind, reason: impl Into<String>) -> LdapError {
    LdapError::InvalidAttributeSyntax(format!("{:?}: {}", kind, reason.into()))
}

fn is_printable(c: char) -> bool {
    c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c)
}

/// True for a numeric OID (`2.5.4.3`) or a descriptor (`cn`).
pub fn is_oid(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        return s.split('.').all(|arc| {
            !arc.is_empty()
                && arc.chars().all(|c| c.is_ascii_digit())
                && (arc == "0" || !arc.starts_with('0'))
        });
    }
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn two_digits(b: &[u8], at: usize) -> Option<u32> {
    let d = b.get(at..at + 2)?;
    if d.iter().all(|c| c.is_ascii_digit()) {
        Some(((d[0] - b'0') * 10 + (d[1] - b'0')) as u32)
    } else {
        None
    }
}

/// Parses an RFC4517 GeneralizedTime: `YYYYMMDDHH[MM[SS]][(.|,)fraction](Z|(+|-)HH[MM])`.
pub fn parse_generalized_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let b = s.as_bytes();
    let century = two_digits(b, 0)?;
    let year = (century * 100 + two_digits(b, 2)?) as i32;
    let month = two_digits(b, 4)?;
    let day = two_digits(b, 6)?;
    let hour = two_digits(b, 8)?;
    let mut pos = 10;

    // Seconds covered by the last unit present, used to scale a fraction
    let mut unit = 3600i64;
    let mut minute = 0;
    let mut second = 0;
    if let Some(m) = two_digits(b, pos) {
        minute = m;
        pos += 2;
        unit = 60;
        if let Some(sec) = two_digits(b, pos) {
            second = sec;
            pos += 2;
            unit = 1;
        }
    }

    let mut fraction = Duration::zero();
    if matches!(b.get(pos), Some(b'.') | Some(b',')) {
        pos += 1;
        let start = pos;
        while b.get(pos).is_some_and(|c| c.is_ascii_digit()) {
            pos += 1;
        }
        if pos == start {
            return None;
        }
        let digits: f64 = format!("0.{}", &s[start..pos]).parse().ok()?;
        fraction = Duration::nanoseconds((digits * unit as f64 * 1e9) as i64);
    }

    let offset = match b.get(pos)? {
        b'Z' => {
            pos += 1;
            FixedOffset::east_opt(0)?
        }
        sign @ (b'+' | b'-') => {
            let hh = two_digits(b, pos + 1)?;
            pos += 3;
            let mm = match two_digits(b, pos) {
                Some(mm) => {
                    pos += 2;
                    mm
                }
                None => 0,
            };
            let secs = (hh * 3600 + mm * 60) as i32;
            FixedOffset::east_opt(if *sign == b'-' { -secs } else { secs })?
        }
        _ => return None,
    };
    if pos != b.len() {
        return None;
    }

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let local = offset.from_local_datetime(&naive).single()?;
    Some(local + fraction)
}

impl SyntaxKind {
    /// Decodes wire octets into a value.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, LdapError> {
        let kind = *self;
        if kind == SyntaxKind::OctetString {
            return Ok(Value::Bytes(bytes.to_vec()));
        }
        let s = std::str::from_utf8(bytes).map_err(|_| invalid(kind, "not valid UTF-8"))?;
        match kind {
            SyntaxKind::DirectoryString
            | SyntaxKind::SubstringAssertion
            | SyntaxKind::SchemaDescription => {
                if s.is_empty() {
                    return Err(invalid(kind, "empty value"));
                }
                Ok(Value::String(s.to_string()))
            }
            SyntaxKind::Ia5String => {
                if !s.is_ascii() {
                    return Err(invalid(kind, "non-ASCII character"));
                }
                Ok(Value::String(s.to_string()))
            }
            SyntaxKind::PrintableString | SyntaxKind::TelephoneNumber => {
                if s.is_empty() || !s.chars().all(is_printable) {
                    return Err(invalid(kind, format!("'{}' is not a printable string", s)));
                }
                Ok(Value::String(s.to_string()))
            }
            SyntaxKind::CountryString => {
                if s.len() != 2 || !s.chars().all(is_printable) {
                    return Err(invalid(kind, format!("'{}' is not a country code", s)));
                }
                Ok(Value::String(s.to_string()))
            }
            SyntaxKind::NumericString => {
                if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == ' ') {
                    return Err(invalid(kind, format!("'{}' is not a numeric string", s)));
                }
                Ok(Value::String(s.to_string()))
            }
            SyntaxKind::Integer => {
                let digits = s.strip_prefix('-').unwrap_or(s);
                let canonical = !digits.is_empty()
                    && digits.chars().all(|c| c.is_ascii_digit())
                    && (digits == "0" || !digits.starts_with('0'))
                    && s != "-0";
                if !canonical {
                    return Err(invalid(kind, format!("'{}' is not an integer", s)));
                }
                s.parse()
                    .map(Value::Integer)
                    .map_err(|_| invalid(kind, format!("'{}' is out of range", s)))
            }
            SyntaxKind::Boolean => match s {
                "TRUE" => Ok(Value::Boolean(true)),
                "FALSE" => Ok(Value::Boolean(false)),
                _ => Err(invalid(kind, format!("'{}' is not TRUE or FALSE", s))),
            },
            SyntaxKind::Oid => {
                if !is_oid(s) {
                    return Err(invalid(kind, format!("'{}' is not an OID", s)));
                }
                Ok(Value::Oid(s.to_string()))
            }
            SyntaxKind::Dn => Dn::parse(s)
                .map(Value::Dn)
                .map_err(|e| invalid(kind, e.message().to_string())),
            SyntaxKind::GeneralizedTime => parse_generalized_time(s)
                .map(Value::Time)
                .ok_or_else(|| invalid(kind, format!("'{}' is not a generalized time", s))),
            SyntaxKind::OctetString => Ok(Value::Bytes(bytes.to_vec())),
        }
    }

    /// Encodes a value, rejecting values this syntax would not decode.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, LdapError> {
        let bytes = value.to_bytes();
        self.decode(&bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::ResultCode;

    #[test]
    fn test_directory_string() {
        assert_eq!(
            SyntaxKind::DirectoryString.decode(b"Test").unwrap(),
            Value::from("Test")
        );
        let err = SyntaxKind::DirectoryString.decode(b"").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidAttributeSyntax);
        assert!(SyntaxKind::DirectoryString.decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_integer() {
        assert_eq!(SyntaxKind::Integer.decode(b"1000").unwrap(), Value::Integer(1000));
        assert_eq!(SyntaxKind::Integer.decode(b"-7").unwrap(), Value::Integer(-7));
        assert_eq!(SyntaxKind::Integer.decode(b"0").unwrap(), Value::Integer(0));
        for bad in ["", "-", "007", "-0", "1e3", "abc", "99999999999999999999"] {
            assert!(SyntaxKind::Integer.decode(bad.as_bytes()).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_boolean_and_oid() {
        assert_eq!(SyntaxKind::Boolean.decode(b"TRUE").unwrap(), Value::Boolean(true));
        assert!(SyntaxKind::Boolean.decode(b"true").is_err());

        assert!(is_oid("2.5.4.3"));
        assert!(is_oid("cn"));
        assert!(is_oid("x-my-attr"));
        assert!(!is_oid("2.05.4"));
        assert!(!is_oid("2..4"));
        assert!(!is_oid("-cn"));
        assert!(SyntaxKind::Oid.decode(b"person").is_ok());
    }

    #[test]
    fn test_string_variants() {
        assert!(SyntaxKind::Ia5String.decode(b"user@example.com").is_ok());
        assert!(SyntaxKind::Ia5String.decode("café".as_bytes()).is_err());
        assert!(SyntaxKind::NumericString.decode(b"123 456").is_ok());
        assert!(SyntaxKind::NumericString.decode(b"12a").is_err());
        assert!(SyntaxKind::CountryString.decode(b"DE").is_ok());
        assert!(SyntaxKind::CountryString.decode(b"DEU").is_err());
        assert!(SyntaxKind::TelephoneNumber.decode(b"+1 512 305 0280").is_ok());
        assert!(SyntaxKind::PrintableString.decode(b"a*b").is_err());
    }

    #[test]
    fn test_dn_syntax() {
        let value = SyntaxKind::Dn.decode(b"cn=a,dc=example").unwrap();
        assert!(matches!(value, Value::Dn(ref dn) if dn.depth() == 2));
        let err = SyntaxKind::Dn.decode(b"garbage").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidAttributeSyntax);
    }

    #[test]
    fn test_generalized_time() {
        let t = parse_generalized_time("20240102030405Z").unwrap();
        assert_eq!(Value::Time(t).to_string(), "20240102030405Z");

        let t = parse_generalized_time("202401020304Z").unwrap();
        assert_eq!(Value::Time(t).to_string(), "20240102030400Z");

        let t = parse_generalized_time("2024010203+0100").unwrap();
        assert_eq!(Value::Time(t).to_string(), "20240102020000Z");

        let t = parse_generalized_time("20240102030405.5Z").unwrap();
        assert_eq!(Value::Time(t).to_string(), "20240102030405.500Z");

        for bad in ["2024", "20241302030405Z", "20240102030405", "20240102030405Zx", "2024010203."] {
            assert!(parse_generalized_time(bad).is_none(), "{}", bad);
        }
    }

    #[test]
    fn test_encode_validates() {
        assert_eq!(
            SyntaxKind::Integer.encode(&Value::Integer(12)).unwrap(),
            b"12".to_vec()
        );
        assert!(SyntaxKind::Integer.encode(&Value::from("twelve")).is_err());
        assert_eq!(
            SyntaxKind::OctetString.encode(&Value::Bytes(vec![1, 2])).unwrap(),
            vec![1, 2]
        );
    }
}
