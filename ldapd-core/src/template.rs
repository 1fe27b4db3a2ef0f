//! Entry templates: a family of entries that is not generated yet.
//!
//! A template stands for every entry `<rdn attribute>=<value>,<parent>`
//! its host could produce. Attributes can be marked as wildcards, meaning
//! their values are only known per instance. Searches are first matched
//! against the template so that hosts only generate entries when some
//! instance can match.

use crate::attributes::AttributeDict;
use crate::entry::Entry;
use crate::filter::{evaluate, AttributeSource, FilterResult};
use ldapd_protocol::{Filter, LdapError, SearchScope};
use ldapd_schema::{AttributeTypeId, Dn, Rdn, Schema, Value};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct EntryTemplate {
    parent: Dn,
    rdn_attribute: AttributeTypeId,
    /// Pattern DN, `<rdn attribute>=*,<parent>`; used for DN attribute matching.
    dn: Dn,
    attributes: AttributeDict,
    wildcards: Vec<AttributeTypeId>,
}

impl EntryTemplate {
    /// A template for entries below `parent` named by `rdn_attribute`. The
    /// RDN attribute is a wildcard.
    pub fn new(schema: &Schema, parent: Dn, rdn_attribute: &str) -> Result<Self, LdapError> {
        let attributes = AttributeDict::new(schema);
        let rdn_attribute = attributes.resolve(rdn_attribute)?;
        let name = schema.attribute_type_by_id(rdn_attribute).name().to_string();
        Ok(Self {
            dn: parent.child(Rdn::single(name, "*")),
            parent,
            rdn_attribute,
            attributes,
            wildcards: vec![rdn_attribute],
        })
    }

    pub fn parent(&self) -> &Dn {
        &self.parent
    }

    pub fn schema(&self) -> &Schema {
        self.attributes.schema()
    }

    /// Attribute values shared by every instance.
    pub fn attributes(&self) -> &AttributeDict {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeDict {
        &mut self.attributes
    }

    /// Marks an attribute as having per-instance values.
    pub fn set_wildcard(&mut self, key: &str) -> Result<(), LdapError> {
        let id = self.attributes.resolve(key)?;
        if !self.wildcards.contains(&id) {
            self.wildcards.push(id);
        }
        Ok(())
    }

    pub fn is_wildcard(&self, id: AttributeTypeId) -> bool {
        self.wildcards.contains(&id)
    }

    /// Four-valued filter evaluation.
    pub fn evaluate(&self, filter: &Filter) -> FilterResult {
        evaluate(self, filter)
    }

    /// The RDN value a DN fixes for instances, if it names one.
    fn instance_rdn_value(&self, dn: &Dn) -> Option<String> {
        if !dn.is_child_of(&self.parent) {
            return None;
        }
        match dn.rdn()?.assertions() {
            [assertion]
                if self.schema().attribute_type_id(&assertion.attribute)
                    == Some(self.rdn_attribute) =>
            {
                Some(assertion.value.clone())
            }
            _ => None,
        }
    }

    /// Whether some instance may lie in the search area.
    fn may_be_in_scope(&self, base: &Dn, scope: SearchScope) -> bool {
        match scope {
            SearchScope::BaseObject => self.instance_rdn_value(base).is_some(),
            SearchScope::SingleLevel => *base == self.parent,
            SearchScope::WholeSubtree => {
                self.parent.is_within(base) || self.instance_rdn_value(base).is_some()
            }
        }
    }

    /// True unless no instance can match the search.
    pub fn match_search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> bool {
        self.may_be_in_scope(base, scope) && self.evaluate(filter).is_candidate()
    }

    /// Materializes one instance.
    ///
    /// `overrides` supply per-instance values; only wildcard attributes may
    /// be overridden.
    pub fn create_entry(
        &self,
        rdn_value: &str,
        overrides: Vec<(&str, Vec<Value>)>,
    ) -> Result<Entry, LdapError> {
        let schema = self.schema();
        let rdn_type = schema.attribute_type_by_id(self.rdn_attribute);
        let rdn_decoded = schema.syntax_by_id(rdn_type.syntax).decode(rdn_value.as_bytes())?;

        let mut attributes = self.attributes.clone();
        attributes.set_by_id(self.rdn_attribute, vec![rdn_decoded]);
        for (key, values) in overrides {
            let id = attributes.resolve(key)?;
            if !self.is_wildcard(id) {
                return Err(LdapError::Other(format!(
                    "template attribute '{}' is not a wildcard",
                    key
                )));
            }
            attributes.set_by_id(id, values);
        }

        let dn = self.parent.child(Rdn::single(rdn_type.name(), rdn_value));
        Ok(Entry::with_attributes(dn, attributes))
    }

    /// Values every matching instance must hold.
    ///
    /// Derived from the RDN a base DN names and from equality items at the
    /// top level of the filter (alone or inside an AND). The result can be
    /// less specific than the search but never stricter.
    pub fn extract_search_constraints(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
    ) -> AttributeDict {
        let schema = self.schema();
        let mut constraints = AttributeDict::new(schema);

        if scope != SearchScope::SingleLevel {
            if let Some(value) = self.instance_rdn_value(base) {
                let syntax = schema.syntax_by_id(schema.attribute_type_by_id(self.rdn_attribute).syntax);
                if let Ok(value) = syntax.decode(value.as_bytes()) {
                    constraints.set_by_id(self.rdn_attribute, vec![value]);
                }
            }
        }

        let legs: &[Filter] = match filter {
            Filter::And(legs) => legs,
            single => std::slice::from_ref(single),
        };
        for leg in legs {
            let Filter::Equal(attribute, value) = leg else {
                continue;
            };
            let Some(id) = schema.attribute_type_id(attribute) else {
                continue;
            };
            let syntax = schema.syntax_by_id(schema.attribute_type_by_id(id).syntax);
            match syntax.decode(value) {
                Ok(value) => {
                    let mut values = constraints.local_values(id).to_vec();
                    values.push(value);
                    constraints.set_by_id(id, values);
                }
                Err(e) => trace!("Ignoring undecodable constraint on {}: {}", attribute, e),
            }
        }
        constraints
    }
}

impl AttributeSource for EntryTemplate {
    fn schema(&self) -> &Schema {
        self.attributes.schema()
    }

    fn dn(&self) -> &Dn {
        &self.dn
    }

    fn values(&self, id: AttributeTypeId) -> (Vec<Value>, bool) {
        let subtypes = &self.schema().attribute_type_by_id(id).subtypes;
        let unknown = self.is_wildcard(id) || subtypes.iter().any(|s| self.is_wildcard(*s));
        (self.attributes.get_by_id(id, true), unknown)
    }
}
