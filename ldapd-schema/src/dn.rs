//! Distinguished names (RFC4514).
//!
//! A DN is stored leaf-first, in the same order as its string form:
//! `cn=test,dc=example,dc=com` has the RDN `cn=test` at index 0.
//!
//! Equality ignores attribute type case, value case, insignificant
//! whitespace and the order of assertions within a multi-valued RDN.

use ldapd_protocol::LdapError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One `type=value` pair of an RDN.
#[derive(Debug, Clone)]
pub struct RdnAssertion {
    pub attribute: String,
    pub value: String,
}

impl RdnAssertion {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    fn key(&self) -> (String, String) {
        (
            self.attribute.trim().to_ascii_lowercase(),
            normalize_value(&self.value),
        )
    }
}

fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A relative distinguished name: one or more assertions joined by `+`.
#[derive(Debug, Clone)]
pub struct Rdn(pub Vec<RdnAssertion>);

impl Rdn {
    pub fn single(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Rdn(vec![RdnAssertion::new(attribute, value)])
    }

    pub fn assertions(&self) -> &[RdnAssertion] {
        &self.0
    }

    fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.0.iter().map(RdnAssertion::key).collect();
        keys.sort();
        keys
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.keys() == other.keys()
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keys().hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, assertion) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}=", assertion.attribute)?;
            write_escaped_value(f, &assertion.value)?;
        }
        Ok(())
    }
}

/// A distinguished name.
#[derive(Debug, Clone, Default)]
pub struct Dn(Vec<Rdn>);

impl Dn {
    /// The root DN (zero RDNs), which names the RootDSE.
    pub fn root() -> Self {
        Dn(Vec::new())
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Dn(rdns)
    }

    pub fn parse(s: &str) -> Result<Self, LdapError> {
        s.parse()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.0
    }

    /// Number of RDNs.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The leaf RDN, if any.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.0.first()
    }

    /// The DN one level up. The root has no parent.
    pub fn parent(&self) -> Option<Dn> {
        if self.0.is_empty() {
            return None;
        }
        Some(Dn(self.0[1..].to_vec()))
    }

    /// Returns a new DN with `rdn` prepended.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.0.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.0.iter().cloned());
        Dn(rdns)
    }

    /// True if `self` is strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.0.len() > ancestor.0.len() && self.0[self.0.len() - ancestor.0.len()..] == ancestor.0[..]
    }

    /// True if `self` is an immediate child of `parent`.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.0.len() == parent.0.len() + 1 && self.is_descendant_of(parent)
    }

    /// True if `self` equals `base` or lies below it.
    pub fn is_within(&self, base: &Dn) -> bool {
        self == base || self.is_descendant_of(base)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

fn write_escaped_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => write!(f, "\\{}", c)?,
            '#' if i == 0 => write!(f, "\\#")?,
            ' ' if i == 0 || i == last => write!(f, "\\ ")?,
            '\0' => write!(f, "\\00")?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

fn invalid(input: &str, reason: impl fmt::Display) -> LdapError {
    LdapError::InvalidDnSyntax(format!("'{}': {}", input, reason))
}

fn valid_attribute_type(attr: &str) -> bool {
    let mut chars = attr.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Accumulates one assertion value, tracking trailing unescaped spaces.
#[derive(Default)]
struct ValueBuf {
    bytes: Vec<u8>,
    significant: usize,
}

impl ValueBuf {
    fn push_char(&mut self, c: char, escaped: bool) {
        if c == ' ' && !escaped {
            if self.bytes.is_empty() {
                return;
            }
            self.bytes.push(b' ');
            return;
        }
        let mut tmp = [0u8; 4];
        self.bytes.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
        self.significant = self.bytes.len();
    }

    fn push_byte(&mut self, b: u8) {
        self.bytes.push(b);
        self.significant = self.bytes.len();
    }

    fn finish(mut self, input: &str) -> Result<String, LdapError> {
        self.bytes.truncate(self.significant);
        String::from_utf8(self.bytes).map_err(|_| invalid(input, "value is not valid UTF-8"))
    }
}

fn finish_assertion(
    input: &str,
    attribute: &mut String,
    value: ValueBuf,
    assertions: &mut Vec<RdnAssertion>,
) -> Result<(), LdapError> {
    let attr = attribute.trim().to_string();
    if !valid_attribute_type(&attr) {
        return Err(invalid(input, format!("bad attribute type '{}'", attr)));
    }
    assertions.push(RdnAssertion::new(attr, value.finish(input)?));
    attribute.clear();
    Ok(())
}

impl FromStr for Dn {
    type Err = LdapError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Ok(Dn::root());
        }

        let mut rdns = Vec::new();
        let mut assertions = Vec::new();
        let mut attribute = String::new();
        let mut value = ValueBuf::default();
        let mut in_value = false;

        let mut chars = input.chars();
        while let Some(c) = chars.next() {
            if !in_value {
                match c {
                    '=' => in_value = true,
                    ',' | '+' | '\\' => {
                        return Err(invalid(input, format!("unexpected '{}' in attribute type", c)))
                    }
                    c => attribute.push(c),
                }
                continue;
            }
            match c {
                '\\' => {
                    let Some(next) = chars.next() else {
                        return Err(invalid(input, "dangling escape"));
                    };
                    if next.is_ascii_hexdigit() {
                        let Some(low) = chars.next().filter(|c| c.is_ascii_hexdigit()) else {
                            return Err(invalid(input, "bad hex escape"));
                        };
                        let hex: String = [next, low].iter().collect();
                        let byte = u8::from_str_radix(&hex, 16)
                            .map_err(|_| invalid(input, "bad hex escape"))?;
                        value.push_byte(byte);
                    } else if ",+\"\\<>;= #".contains(next) {
                        value.push_char(next, true);
                    } else {
                        return Err(invalid(input, format!("cannot escape '{}'", next)));
                    }
                }
                ',' | '+' => {
                    let taken = std::mem::take(&mut value);
                    finish_assertion(input, &mut attribute, taken, &mut assertions)?;
                    in_value = false;
                    if c == ',' {
                        rdns.push(Rdn(std::mem::take(&mut assertions)));
                    }
                }
                c => value.push_char(c, false),
            }
        }

        if !in_value {
            return Err(invalid(input, "missing '=' in last RDN"));
        }
        finish_assertion(input, &mut attribute, value, &mut assertions)?;
        rdns.push(Rdn(assertions));
        Ok(Dn(rdns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dn(s: &str) -> Dn {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_simple() {
        let d = dn("cn=test,dc=example,dc=com");
        assert_eq!(d.depth(), 3);
        assert_eq!(d.rdn().unwrap().assertions()[0].attribute, "cn");
        assert_eq!(d.rdn().unwrap().assertions()[0].value, "test");
        assert_eq!(d.to_string(), "cn=test,dc=example,dc=com");
    }

    #[test]
    fn test_root_dn() {
        assert!(dn("").is_root());
        assert!(dn("  ").is_root());
        assert_eq!(Dn::root().to_string(), "");
        assert!(Dn::root().parent().is_none());
    }

    #[test]
    fn test_normalized_equality() {
        assert_eq!(dn("CN=Test,DC=Example"), dn("cn=test, dc=example"));
        assert_eq!(dn("cn=John  Smith"), dn("cn=john smith"));
        assert_ne!(dn("cn=a,dc=x"), dn("cn=b,dc=x"));
        assert_eq!(dn("cn=a+sn=b,dc=x"), dn("sn=B+cn=A,dc=x"));
    }

    #[test]
    fn test_escapes() {
        let d = dn(r"cn=Smith\, John,dc=x");
        assert_eq!(d.rdn().unwrap().assertions()[0].value, "Smith, John");
        assert_eq!(d.to_string(), r"cn=Smith\, John,dc=x");

        let d = dn(r"cn=\23hash\20,dc=x");
        assert_eq!(d.rdn().unwrap().assertions()[0].value, "#hash ");
        assert_eq!(d.to_string(), r"cn=\#hash\ ,dc=x");

        let d = dn(r"cn=caf\C3\A9");
        assert_eq!(d.rdn().unwrap().assertions()[0].value, "café");
    }

    #[test]
    fn test_multi_valued_rdn() {
        let d = dn("cn=a+uid=b,dc=x");
        assert_eq!(d.rdn().unwrap().assertions().len(), 2);
        assert_eq!(d.to_string(), "cn=a+uid=b,dc=x");
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["cn", "cn=a,", "=a", "cn=a,dc", r"cn=a\", r"cn=\zz", "c n=a"] {
            let err = bad.parse::<Dn>().unwrap_err();
            assert_eq!(
                err.result_code(),
                ldapd_protocol::ResultCode::InvalidDnSyntax,
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_hierarchy() {
        let base = dn("dc=example,dc=com");
        let child = dn("ou=people,dc=example,dc=com");
        let grandchild = dn("uid=a,ou=people,dc=example,dc=com");

        assert!(child.is_child_of(&base));
        assert!(!grandchild.is_child_of(&base));
        assert!(grandchild.is_descendant_of(&base));
        assert!(!base.is_descendant_of(&base));
        assert!(base.is_within(&base));
        assert!(grandchild.is_within(&Dn::root()));
        assert!(!base.is_within(&child));

        assert_eq!(grandchild.parent().unwrap(), child);
        assert_eq!(base.child(Rdn::single("ou", "People")), child);
    }

    proptest! {
        #[test]
        fn prop_escaped_values_survive_printing(value in "[a-zA-Z0-9 ,+=#;<>\"\\\\]{1,12}") {
            let original = Dn::from_rdns(vec![Rdn::single("cn", value.clone()), Rdn::single("dc", "x")]);
            let reparsed = dn(&original.to_string());
            prop_assert_eq!(&reparsed.rdns()[0].assertions()[0].value, &value);
            prop_assert_eq!(reparsed.depth(), 2);
        }
    }
}
