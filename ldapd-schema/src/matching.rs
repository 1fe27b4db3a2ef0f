//! Matching rules (RFC4517 section 4).

use crate::dn::Dn;
use crate::schema::{AttributeTypeId, Schema, SyntaxId};
use crate::syntax::{parse_generalized_time, SyntaxKind};
use crate::value::Value;
use chrono::{DateTime, FixedOffset};
use ldapd_protocol::LdapError;
use std::cmp::Ordering;

/// Which filter items a matching rule can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchingRuleKind {
    Equality,
    Ordering,
    Substr,
}

impl MatchingRuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingRuleKind::Equality => "EQUALITY",
            MatchingRuleKind::Ordering => "ORDERING",
            MatchingRuleKind::Substr => "SUBSTR",
        }
    }
}

/// Comparison algorithm a matching rule applies to decoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchAlgorithm {
    CaseIgnore,
    CaseExact,
    NumericString,
    TelephoneNumber,
    OctetString,
    Integer,
    Boolean,
    ObjectIdentifier,
    DistinguishedName,
    GeneralizedTime,
    /// Compares the first component of a schema description with an OID.
    ObjectIdentifierFirstComponent,
}

/// A resolved matching rule.
#[derive(Debug, Clone)]
pub struct MatchingRule {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub obsolete: bool,
    pub kind: MatchingRuleKind,
    pub algorithm: MatchAlgorithm,
    pub syntax: SyntaxId,
    pub(crate) syntax_kind: SyntaxKind,
    pub compatibility_tag: String,
    pub compatible_syntaxes: Vec<SyntaxId>,
    pub compatible_attribute_types: Vec<AttributeTypeId>,
}

/// Case-folded form with insignificant spaces removed.
fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whitespace collapsed, case preserved.
fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip(s: &str, drop: &[char]) -> String {
    s.chars().filter(|c| !drop.contains(c)).collect()
}

fn as_integer(value: &Value) -> Result<i64, LdapError> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => other.to_string().parse().map_err(|_| {
            LdapError::InvalidAttributeSyntax(format!("'{}' is not an integer", other))
        }),
    }
}

fn as_boolean(value: &Value) -> Result<bool, LdapError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => match other.to_string().as_str() {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            s => Err(LdapError::InvalidAttributeSyntax(format!(
                "'{}' is not a boolean",
                s
            ))),
        },
    }
}

fn as_dn(value: &Value) -> Result<Dn, LdapError> {
    match value {
        Value::Dn(dn) => Ok(dn.clone()),
        other => Dn::parse(&other.to_string()),
    }
}

fn as_time(value: &Value) -> Result<DateTime<FixedOffset>, LdapError> {
    match value {
        Value::Time(t) => Ok(*t),
        other => parse_generalized_time(&other.to_string()).ok_or_else(|| {
            LdapError::InvalidAttributeSyntax(format!("'{}' is not a generalized time", other))
        }),
    }
}

/// First whitespace-separated component after the opening parenthesis.
fn first_component(value: &Value) -> String {
    let text = value.to_string();
    text.trim_start()
        .trim_start_matches('(')
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

impl MatchingRule {
    /// Preferred name, falling back to the OID.
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    fn require(&self, kind: MatchingRuleKind) -> Result<(), LdapError> {
        if self.kind != kind {
            return Err(LdapError::InappropriateMatching(format!(
                "{} is not an {} rule",
                self.name(),
                kind.as_str()
            )));
        }
        Ok(())
    }

    /// Decodes an assertion value with the rule's assertion syntax.
    pub fn decode_assertion(&self, assertion: &[u8]) -> Result<Value, LdapError> {
        self.syntax_kind.decode(assertion)
    }

    fn values_equal(&self, schema: &Schema, value: &Value, assertion: &Value) -> Result<bool, LdapError> {
        Ok(match self.algorithm {
            MatchAlgorithm::CaseIgnore => fold(&value.to_string()) == fold(&assertion.to_string()),
            MatchAlgorithm::CaseExact => {
                collapse(&value.to_string()) == collapse(&assertion.to_string())
            }
            MatchAlgorithm::NumericString => {
                strip(&value.to_string(), &[' ']) == strip(&assertion.to_string(), &[' '])
            }
            MatchAlgorithm::TelephoneNumber => {
                fold(&strip(&value.to_string(), &[' ', '-']))
                    == fold(&strip(&assertion.to_string(), &[' ', '-']))
            }
            MatchAlgorithm::OctetString => value.to_bytes() == assertion.to_bytes(),
            MatchAlgorithm::Integer => as_integer(value)? == as_integer(assertion)?,
            MatchAlgorithm::Boolean => as_boolean(value)? == as_boolean(assertion)?,
            MatchAlgorithm::ObjectIdentifier => {
                schema.canonical_oid(&value.to_string())
                    == schema.canonical_oid(&assertion.to_string())
            }
            MatchAlgorithm::DistinguishedName => as_dn(value)? == as_dn(assertion)?,
            MatchAlgorithm::GeneralizedTime => as_time(value)? == as_time(assertion)?,
            MatchAlgorithm::ObjectIdentifierFirstComponent => {
                schema.canonical_oid(&first_component(value))
                    == schema.canonical_oid(&assertion.to_string())
            }
        })
    }

    fn compare(&self, value: &Value, assertion: &Value) -> Result<Ordering, LdapError> {
        Ok(match self.algorithm {
            MatchAlgorithm::CaseIgnore => fold(&value.to_string()).cmp(&fold(&assertion.to_string())),
            MatchAlgorithm::CaseExact => {
                collapse(&value.to_string()).cmp(&collapse(&assertion.to_string()))
            }
            MatchAlgorithm::NumericString => {
                strip(&value.to_string(), &[' ']).cmp(&strip(&assertion.to_string(), &[' ']))
            }
            MatchAlgorithm::OctetString => value.to_bytes().cmp(&assertion.to_bytes()),
            MatchAlgorithm::Integer => as_integer(value)?.cmp(&as_integer(assertion)?),
            MatchAlgorithm::GeneralizedTime => as_time(value)?.cmp(&as_time(assertion)?),
            other => {
                return Err(LdapError::InappropriateMatching(format!(
                    "{} cannot order values ({:?})",
                    self.name(),
                    other
                )))
            }
        })
    }

    fn normalize_substring(&self, s: &str) -> Result<String, LdapError> {
        Ok(match self.algorithm {
            MatchAlgorithm::CaseIgnore => fold(s),
            MatchAlgorithm::CaseExact => collapse(s),
            MatchAlgorithm::NumericString => strip(s, &[' ']),
            MatchAlgorithm::TelephoneNumber => fold(&strip(s, &[' ', '-'])),
            other => {
                return Err(LdapError::InappropriateMatching(format!(
                    "{} cannot match substrings ({:?})",
                    self.name(),
                    other
                )))
            }
        })
    }

    /// EQUALITY match: true if any value equals the assertion.
    pub fn match_equal(&self, schema: &Schema, values: &[Value], assertion: &[u8]) -> Result<bool, LdapError> {
        self.require(MatchingRuleKind::Equality)?;
        let assertion = self.decode_assertion(assertion)?;
        for value in values {
            if self.values_equal(schema, value, &assertion)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Approximate match. No phonetic algorithm is implemented, so this is
    /// the equality match.
    pub fn match_approx(&self, schema: &Schema, values: &[Value], assertion: &[u8]) -> Result<bool, LdapError> {
        self.match_equal(schema, values, assertion)
    }

    /// ORDERING match: true if any value sorts before the assertion.
    pub fn match_less(&self, values: &[Value], assertion: &[u8]) -> Result<bool, LdapError> {
        self.require(MatchingRuleKind::Ordering)?;
        let assertion = self.decode_assertion(assertion)?;
        for value in values {
            if self.compare(value, &assertion)? == Ordering::Less {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// ORDERING match used by `<=` filter items.
    pub fn match_less_or_equal(&self, values: &[Value], assertion: &[u8]) -> Result<bool, LdapError> {
        self.require(MatchingRuleKind::Ordering)?;
        let assertion = self.decode_assertion(assertion)?;
        for value in values {
            if self.compare(value, &assertion)? != Ordering::Greater {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// ORDERING match: true if any value is not less than the assertion.
    pub fn match_greater_or_equal(&self, values: &[Value], assertion: &[u8]) -> Result<bool, LdapError> {
        self.require(MatchingRuleKind::Ordering)?;
        let assertion = self.decode_assertion(assertion)?;
        for value in values {
            if self.compare(value, &assertion)? != Ordering::Less {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// SUBSTR match: `initial*any*...*final` against any value.
    pub fn match_substr(
        &self,
        values: &[Value],
        initial: Option<&[u8]>,
        any: &[Vec<u8>],
        final_: Option<&[u8]>,
    ) -> Result<bool, LdapError> {
        self.require(MatchingRuleKind::Substr)?;
        let component = |bytes: &[u8]| -> Result<String, LdapError> {
            let s = std::str::from_utf8(bytes).map_err(|_| {
                LdapError::InvalidAttributeSyntax("substring is not valid UTF-8".to_string())
            })?;
            self.normalize_substring(s)
        };
        let initial = initial.map(component).transpose()?;
        let any = any
            .iter()
            .map(|a| component(a))
            .collect::<Result<Vec<_>, _>>()?;
        let final_ = final_.map(component).transpose()?;

        for value in values {
            let text = self.normalize_substring(&value.to_string())?;
            if substring_matches(&text, initial.as_deref(), &any, final_.as_deref()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn substring_matches(text: &str, initial: Option<&str>, any: &[String], final_: Option<&str>) -> bool {
    let mut rest = text;
    if let Some(initial) = initial {
        match rest.strip_prefix(initial) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        match rest.find(part.as_str()) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    match final_ {
        Some(final_) => rest.ends_with(final_),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::ResultCode;

    fn schema() -> Schema {
        Schema::standard().unwrap()
    }

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_case_ignore_equality() {
        let schema = schema();
        let rule = schema.matching_rule("caseIgnoreMatch").unwrap();
        let values = strings(&["Test  User"]);
        assert!(rule.match_equal(&schema, &values, b"test user").unwrap());
        assert!(rule.match_equal(&schema, &values, b" TEST USER ").unwrap());
        assert!(!rule.match_equal(&schema, &values, b"other").unwrap());
        assert!(!rule.match_equal(&schema, &[], b"test").unwrap());
    }

    #[test]
    fn test_case_exact_equality() {
        let schema = schema();
        let rule = schema.matching_rule("caseExactMatch").unwrap();
        let values = strings(&["Test"]);
        assert!(rule.match_equal(&schema, &values, b"Test").unwrap());
        assert!(!rule.match_equal(&schema, &values, b"test").unwrap());
    }

    #[test]
    fn test_wrong_kind_is_inappropriate() {
        let schema = schema();
        let rule = schema.matching_rule("caseIgnoreMatch").unwrap();
        let err = rule.match_less(&strings(&["a"]), b"b").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InappropriateMatching);
        let err = rule.match_substr(&strings(&["a"]), Some(b"a"), &[], None).unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InappropriateMatching);
    }

    #[test]
    fn test_integer_ordering() {
        let schema = schema();
        let rule = schema.matching_rule("integerOrderingMatch").unwrap();
        let values = vec![Value::Integer(1000), Value::Integer(5)];
        assert!(rule.match_less(&values, b"10").unwrap());
        assert!(!rule.match_less(&values, b"5").unwrap());
        assert!(rule.match_greater_or_equal(&values, b"1000").unwrap());
        assert!(!rule.match_greater_or_equal(&values, b"1001").unwrap());
        assert!(rule.match_less_or_equal(&values, b"5").unwrap());
        assert!(!rule.match_less_or_equal(&values, b"4").unwrap());

        let err = rule.match_less(&values, b"ten").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidAttributeSyntax);
    }

    #[test]
    fn test_substrings() {
        let schema = schema();
        let rule = schema.matching_rule("caseIgnoreSubstringsMatch").unwrap();
        let values = strings(&["John Smith"]);
        assert!(rule.match_substr(&values, Some(b"jo"), &[], None).unwrap());
        assert!(rule.match_substr(&values, None, &[b"N S".to_vec()], None).unwrap());
        assert!(rule.match_substr(&values, Some(b"j"), &[b"h".to_vec()], Some(b"th")).unwrap());
        assert!(!rule.match_substr(&values, Some(b"smith"), &[], None).unwrap());
        // Components may not overlap
        assert!(!rule
            .match_substr(&strings(&["abc"]), Some(b"ab"), &[], Some(b"bc"))
            .unwrap());
    }

    #[test]
    fn test_object_identifier_match_resolves_names() {
        let schema = schema();
        let rule = schema.matching_rule("objectIdentifierMatch").unwrap();
        let values = vec![Value::Oid("person".into())];
        assert!(rule.match_equal(&schema, &values, b"PERSON").unwrap());
        assert!(rule.match_equal(&schema, &values, b"2.5.6.6").unwrap());
        assert!(!rule.match_equal(&schema, &values, b"top").unwrap());
    }

    #[test]
    fn test_dn_match() {
        let schema = schema();
        let rule = schema.matching_rule("distinguishedNameMatch").unwrap();
        let values = vec![Value::Dn(Dn::parse("CN=Admin, DC=Example").unwrap())];
        assert!(rule.match_equal(&schema, &values, b"cn=admin,dc=example").unwrap());
        let err = rule.match_equal(&schema, &values, b"not a dn").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidAttributeSyntax);
    }

    #[test]
    fn test_first_component_match() {
        let schema = schema();
        let rule = schema.matching_rule("objectIdentifierFirstComponentMatch").unwrap();
        let values = strings(&["( 2.5.4.3 NAME 'cn' SUP name )"]);
        assert!(rule.match_equal(&schema, &values, b"2.5.4.3").unwrap());
        assert!(rule.match_equal(&schema, &values, b"cn").unwrap());
        assert!(!rule.match_equal(&schema, &values, b"2.5.4.4").unwrap());
    }

    #[test]
    fn test_generalized_time_ordering() {
        let schema = schema();
        let rule = schema.matching_rule("generalizedTimeOrderingMatch").unwrap();
        let values = vec![SyntaxKind::GeneralizedTime.decode(b"20240101000000Z").unwrap()];
        assert!(rule.match_less(&values, b"20240101010000+0000").unwrap());
        assert!(rule.match_greater_or_equal(&values, b"20240101010000+0200").unwrap());
    }
}
