//! Search filter evaluation (RFC4511 section 4.5.1.7, RFC4526).
//!
//! Entries evaluate to TRUE, FALSE or UNDEFINED. Entry templates add
//! MAYBE_TRUE for items over attributes whose values are not known yet, so
//! a template never rejects a filter that one of its instances would match.

use ldapd_protocol::{Filter, LdapError};
use ldapd_schema::{AttributeType, AttributeTypeId, Dn, MatchingRule, MatchingRuleKind, Schema, Value};

/// Result of evaluating a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    True,
    False,
    Undefined,
    /// Only produced for templates: some instance may match.
    MaybeTrue,
}

impl FilterResult {
    pub fn not(self) -> Self {
        match self {
            FilterResult::True => FilterResult::False,
            FilterResult::False => FilterResult::True,
            other => other,
        }
    }

    /// Whether a search should return (or generate) the object.
    pub fn is_candidate(self) -> bool {
        matches!(self, FilterResult::True | FilterResult::MaybeTrue)
    }

    fn and(results: impl Iterator<Item = FilterResult>) -> Self {
        let (mut undefined, mut maybe) = (false, false);
        for result in results {
            match result {
                FilterResult::False => return FilterResult::False,
                FilterResult::Undefined => undefined = true,
                FilterResult::MaybeTrue => maybe = true,
                FilterResult::True => {}
            }
        }
        if undefined {
            FilterResult::Undefined
        } else if maybe {
            FilterResult::MaybeTrue
        } else {
            FilterResult::True
        }
    }

    fn or(results: impl Iterator<Item = FilterResult>) -> Self {
        let (mut undefined, mut maybe) = (false, false);
        for result in results {
            match result {
                FilterResult::True => return FilterResult::True,
                FilterResult::Undefined => undefined = true,
                FilterResult::MaybeTrue => maybe = true,
                FilterResult::False => {}
            }
        }
        if maybe {
            FilterResult::MaybeTrue
        } else if undefined {
            FilterResult::Undefined
        } else {
            FilterResult::False
        }
    }
}

/// Something a filter can be evaluated against.
pub trait AttributeSource {
    fn schema(&self) -> &Schema;

    fn dn(&self) -> &Dn;

    /// Values of an attribute type and its subtypes, and whether further
    /// values are unknown.
    fn values(&self, id: AttributeTypeId) -> (Vec<Value>, bool);
}

/// Evaluates `filter` against `source`. Never fails: matching errors
/// become UNDEFINED.
pub fn evaluate<S: AttributeSource + ?Sized>(source: &S, filter: &Filter) -> FilterResult {
    match filter {
        Filter::And(filters) => FilterResult::and(filters.iter().map(|f| evaluate(source, f))),
        Filter::Or(filters) => FilterResult::or(filters.iter().map(|f| evaluate(source, f))),
        Filter::Not(inner) => evaluate(source, inner).not(),
        Filter::Present(attribute) => {
            let Some(id) = source.schema().attribute_type_id(attribute) else {
                return FilterResult::Undefined;
            };
            match source.values(id) {
                (values, _) if !values.is_empty() => FilterResult::True,
                (_, true) => FilterResult::MaybeTrue,
                _ => FilterResult::False,
            }
        }
        Filter::Equal(attribute, value) => item(source, attribute, |schema, at, values| {
            equality_rule(schema, at)?.match_equal(schema, values, value)
        }),
        Filter::Approx(attribute, value) => item(source, attribute, |schema, at, values| {
            equality_rule(schema, at)?.match_approx(schema, values, value)
        }),
        Filter::GreaterOrEqual(attribute, value) => item(source, attribute, |schema, at, values| {
            ordering_rule(schema, at)?.match_greater_or_equal(values, value)
        }),
        Filter::LessOrEqual(attribute, value) => item(source, attribute, |schema, at, values| {
            ordering_rule(schema, at)?.match_less_or_equal(values, value)
        }),
        Filter::Substrings {
            attribute,
            initial,
            any,
            final_,
        } => item(source, attribute, |schema, at, values| {
            let rule = at
                .substr
                .map(|id| schema.matching_rule_by_id(id))
                .ok_or_else(|| no_rule(at, MatchingRuleKind::Substr))?;
            rule.match_substr(values, initial.as_deref(), any, final_.as_deref())
        }),
        Filter::Extensible {
            matching_rule,
            attribute,
            value,
            dn_attributes,
        } => extensible(
            source,
            matching_rule.as_deref(),
            attribute.as_deref(),
            value,
            *dn_attributes,
        ),
        Filter::Unrecognized { .. } => FilterResult::Undefined,
    }
}

fn no_rule(at: &AttributeType, kind: MatchingRuleKind) -> LdapError {
    LdapError::InappropriateMatching(format!(
        "{} has no {} matching rule",
        at.name(),
        kind.as_str()
    ))
}

fn equality_rule<'a>(schema: &'a Schema, at: &AttributeType) -> Result<&'a MatchingRule, LdapError> {
    at.equality
        .map(|id| schema.matching_rule_by_id(id))
        .ok_or_else(|| no_rule(at, MatchingRuleKind::Equality))
}

fn ordering_rule<'a>(schema: &'a Schema, at: &AttributeType) -> Result<&'a MatchingRule, LdapError> {
    at.ordering
        .map(|id| schema.matching_rule_by_id(id))
        .ok_or_else(|| no_rule(at, MatchingRuleKind::Ordering))
}

/// Evaluates one attribute value assertion.
fn item<S, F>(source: &S, attribute: &str, matcher: F) -> FilterResult
where
    S: AttributeSource + ?Sized,
    F: FnOnce(&Schema, &AttributeType, &[Value]) -> Result<bool, LdapError>,
{
    let schema = source.schema();
    let Some(id) = schema.attribute_type_id(attribute) else {
        return FilterResult::Undefined;
    };
    let (values, unknown) = source.values(id);
    match matcher(schema, schema.attribute_type_by_id(id), &values) {
        Ok(true) => FilterResult::True,
        Ok(false) | Err(_) if unknown => FilterResult::MaybeTrue,
        Ok(false) => FilterResult::False,
        Err(_) => FilterResult::Undefined,
    }
}

/// RFC4511 extensibleMatch.
fn extensible<S: AttributeSource + ?Sized>(
    source: &S,
    matching_rule: Option<&str>,
    attribute: Option<&str>,
    value: &[u8],
    dn_attributes: bool,
) -> FilterResult {
    let schema = source.schema();
    let rule = match matching_rule {
        Some(key) => match schema.matching_rule(key) {
            Some(rule) => Some(rule),
            None => return FilterResult::Undefined,
        },
        None => None,
    };
    let candidates = match (attribute, rule) {
        (Some(key), _) => match schema.attribute_type_id(key) {
            Some(id) => vec![id],
            None => return FilterResult::Undefined,
        },
        (None, Some(rule)) => rule.compatible_attribute_types.clone(),
        (None, None) => return FilterResult::Undefined,
    };

    let (mut evaluated, mut maybe) = (false, false);
    for id in candidates {
        let at = schema.attribute_type_by_id(id);
        let rule = match rule {
            Some(rule) if rule.compatible_attribute_types.contains(&id) => rule,
            Some(_) => continue,
            None => match at.equality {
                Some(rule) => schema.matching_rule_by_id(rule),
                None => continue,
            },
        };

        let (mut values, unknown) = source.values(id);
        if dn_attributes {
            values.extend(dn_values(source.dn(), schema, id, at));
        }
        match rule.match_equal(schema, &values, value) {
            Ok(true) => return FilterResult::True,
            Ok(false) => {
                evaluated = true;
                maybe |= unknown;
            }
            Err(_) => maybe |= unknown,
        }
    }

    if maybe {
        FilterResult::MaybeTrue
    } else if evaluated {
        FilterResult::False
    } else {
        FilterResult::Undefined
    }
}

/// RDN values of `dn` for an attribute type or its subtypes.
fn dn_values(dn: &Dn, schema: &Schema, id: AttributeTypeId, at: &AttributeType) -> Vec<Value> {
    let syntax = schema.syntax_by_id(at.syntax);
    dn.rdns()
        .iter()
        .flat_map(|rdn| rdn.assertions())
        .filter(|assertion| {
            schema
                .attribute_type_id(&assertion.attribute)
                .is_some_and(|aid| aid == id || at.subtypes.contains(&aid))
        })
        .filter_map(|assertion| syntax.decode(assertion.value.as_bytes()).ok())
        .collect()
}
