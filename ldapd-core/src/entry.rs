//! Directory entries.

use crate::attributes::AttributeDict;
use crate::filter::{evaluate, AttributeSource, FilterResult};
use ldapd_protocol::{
    Filter, LdapError, PartialAttribute, SearchRequest, SearchResultEntry, SearchScope,
};
use ldapd_schema::{AttributeTypeId, Dn, Schema, Value};

/// RFC4526 absolute true and false filters.
pub const FEATURE_ABSOLUTE_FILTERS: &str = "1.3.6.1.4.1.4203.1.5.3";
/// RFC3673 `+` attribute selector.
pub const FEATURE_ALL_OPERATIONAL_ATTRIBUTES: &str = "1.3.6.1.4.1.4203.1.5.1";

/// Special entries answer only their own, fixed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    RootDse,
    Subschema,
}

/// Contents of the root DSE.
#[derive(Debug, Clone, Default)]
pub struct RootDse {
    pub naming_contexts: Vec<String>,
    pub subschema_subentry: Option<String>,
    pub supported_extensions: Vec<String>,
    pub supported_controls: Vec<String>,
    pub supported_sasl_mechanisms: Vec<String>,
    pub supported_features: Vec<String>,
    pub vendor_name: Option<String>,
    pub vendor_version: Option<String>,
}

/// A directory object: a DN and its attributes.
#[derive(Debug, Clone)]
pub struct Entry {
    dn: Dn,
    attributes: AttributeDict,
    kind: EntryKind,
}

/// Whether `dn` lies in the search area given by `base` and `scope`.
pub fn in_scope(dn: &Dn, base: &Dn, scope: SearchScope) -> bool {
    match scope {
        SearchScope::BaseObject => dn == base,
        SearchScope::SingleLevel => dn.is_child_of(base),
        SearchScope::WholeSubtree => dn.is_within(base),
    }
}

impl Entry {
    pub fn new(schema: &Schema, dn: Dn) -> Self {
        Self::with_attributes(dn, AttributeDict::new(schema))
    }

    pub fn with_attributes(dn: Dn, attributes: AttributeDict) -> Self {
        Self {
            dn,
            attributes,
            kind: EntryKind::Regular,
        }
    }

    /// The root DSE (RFC4512 section 5.1), found at the empty DN.
    pub fn root_dse(schema: &Schema, info: &RootDse) -> Result<Self, LdapError> {
        let mut attrs = AttributeDict::new(schema);
        attrs.set_text("objectClass", &["top"])?;
        attrs.set_text("supportedLDAPVersion", &["3"])?;
        let lists = [
            ("namingContexts", &info.naming_contexts),
            ("supportedExtension", &info.supported_extensions),
            ("supportedControl", &info.supported_controls),
            ("supportedSASLMechanisms", &info.supported_sasl_mechanisms),
            ("supportedFeatures", &info.supported_features),
        ];
        for (key, values) in lists {
            if !values.is_empty() {
                attrs.set_text(key, values)?;
            }
        }
        let singles = [
            ("subschemaSubentry", &info.subschema_subentry),
            ("vendorName", &info.vendor_name),
            ("vendorVersion", &info.vendor_version),
        ];
        for (key, value) in singles {
            if let Some(value) = value {
                attrs.set_text(key, &[value])?;
            }
        }

        Ok(Self {
            dn: Dn::root(),
            attributes: attrs,
            kind: EntryKind::RootDse,
        })
    }

    /// The subschema subentry publishing `schema` at `dn`.
    pub fn subschema_subentry(schema: &Schema, dn: Dn) -> Result<Self, LdapError> {
        let mut attrs = AttributeDict::new(schema);
        attrs.set_text("objectClass", &["top", "subschema"])?;
        if let Some(rdn) = dn.rdn() {
            for assertion in rdn.assertions() {
                attrs.set_text(&assertion.attribute, &[&assertion.value])?;
            }
        }

        let descriptions =
            |items: Vec<String>| -> Vec<Value> { items.into_iter().map(Value::String).collect() };
        attrs.set(
            "ldapSyntaxes",
            descriptions(schema.syntaxes().map(|s| s.description()).collect()),
        )?;
        attrs.set("matchingRules", descriptions(schema.matching_rule_descriptions()))?;
        attrs.set(
            "matchingRuleUse",
            descriptions(
                schema
                    .matching_rule_uses()
                    .iter()
                    .map(|u| u.to_string())
                    .collect(),
            ),
        )?;
        attrs.set(
            "attributeTypes",
            descriptions(schema.attribute_types().map(|(_, a)| a.description()).collect()),
        )?;
        attrs.set(
            "objectClasses",
            descriptions(schema.object_classes().map(|o| o.description()).collect()),
        )?;

        Ok(Self {
            dn,
            attributes: attrs,
            kind: EntryKind::Subschema,
        })
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn schema(&self) -> &Schema {
        self.attributes.schema()
    }

    pub fn attributes(&self) -> &AttributeDict {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeDict {
        &mut self.attributes
    }

    fn is_object_class(&self, attribute: &str) -> bool {
        let schema = self.schema();
        schema.attribute_type_id(attribute).is_some()
            && schema.attribute_type_id(attribute) == schema.attribute_type_id("objectClass")
    }

    /// Whether a search with this base, scope and filter returns the entry.
    pub fn match_search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> bool {
        match self.kind {
            EntryKind::Regular => {
                in_scope(&self.dn, base, scope) && evaluate(self, filter) == FilterResult::True
            }
            EntryKind::RootDse => {
                scope == SearchScope::BaseObject
                    && base.is_root()
                    && matches!(filter, Filter::Present(attr) if self.is_object_class(attr))
            }
            EntryKind::Subschema => {
                let schema = self.schema();
                scope == SearchScope::BaseObject
                    && *base == self.dn
                    && matches!(filter, Filter::Equal(attr, value)
                        if self.is_object_class(attr)
                            && std::str::from_utf8(value).is_ok_and(|v| {
                                schema.canonical_oid(v) == schema.canonical_oid("subschema")
                            }))
            }
        }
    }

    /// Answers a SEARCH request against this entry alone.
    pub fn search(&self, request: &SearchRequest) -> Result<Option<SearchResultEntry>, LdapError> {
        let base = Dn::parse(&request.base_object)?;
        if !self.match_search(&base, request.scope, &request.filter) {
            return Ok(None);
        }
        Ok(Some(self.project(&request.attributes, request.types_only)))
    }

    /// Builds the response entry for an attribute selection.
    ///
    /// `*` (or no selector) selects user attributes, `+` operational ones,
    /// `1.1` nothing; names select that type and its subtypes.
    pub fn project(&self, selectors: &[String], types_only: bool) -> SearchResultEntry {
        let schema = self.schema();
        let mut all_user = selectors.is_empty();
        let mut all_operational = false;
        let mut explicit: Vec<AttributeTypeId> = Vec::new();
        for selector in selectors {
            match selector.as_str() {
                "*" => all_user = true,
                "+" => all_operational = true,
                "1.1" => {}
                name => {
                    if let Some(id) = schema.attribute_type_id(name) {
                        explicit.push(id);
                        explicit.extend_from_slice(&schema.attribute_type_by_id(id).subtypes);
                    }
                }
            }
        }

        let attributes = self
            .attributes
            .iter()
            .filter(|(id, at, _)| {
                explicit.contains(id)
                    || if at.is_operational() {
                        all_operational
                    } else {
                        all_user
                    }
            })
            .map(|(_, at, values)| {
                let values = if types_only {
                    Vec::new()
                } else {
                    values.iter().map(Value::to_bytes).collect()
                };
                PartialAttribute::new(at.name(), values)
            })
            .collect();

        SearchResultEntry {
            object_name: self.dn.to_string(),
            attributes,
        }
    }

    /// Answers a COMPARE request against this entry.
    pub fn compare(&self, dn: &Dn, attribute: &str, value: &[u8]) -> Result<bool, LdapError> {
        if *dn != self.dn {
            return Err(LdapError::NoSuchObject(dn.to_string()));
        }
        let schema = self.schema();
        let id = self.attributes.resolve(attribute)?;
        let at = schema.attribute_type_by_id(id);
        let rule = at.equality.ok_or_else(|| {
            LdapError::InappropriateMatching(format!("{} has no EQUALITY matching rule", at.name()))
        })?;
        schema
            .matching_rule_by_id(rule)
            .match_equal(schema, &self.attributes.get_by_id(id, true), value)
    }
}

impl AttributeSource for Entry {
    fn schema(&self) -> &Schema {
        self.attributes.schema()
    }

    fn dn(&self) -> &Dn {
        &self.dn
    }

    fn values(&self, id: AttributeTypeId) -> (Vec<Value>, bool) {
        (self.attributes.get_by_id(id, true), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldapd_protocol::ResultCode;

    fn schema() -> Schema {
        Schema::standard().unwrap()
    }

    fn test_entry(schema: &Schema) -> Entry {
        let mut entry = Entry::new(schema, Dn::parse("cn=test,dc=example,dc=com").unwrap());
        let attrs = entry.attributes_mut();
        attrs.set_text("objectClass", &["top", "person"]).unwrap();
        attrs.set_text("cn", &["Test"]).unwrap();
        attrs.set_text("sn", &["Tester"]).unwrap();
        attrs.set_text("createTimestamp", &["20240101000000Z"]).unwrap();
        entry
    }

    fn request(base: &str, scope: SearchScope, filter: &str) -> SearchRequest {
        SearchRequest::new(base, scope, filter.parse().unwrap())
    }

    #[test]
    fn test_case_insensitive_subtree_search() {
        let schema = schema();
        let entry = test_entry(&schema);
        let result = entry
            .search(&request("dc=example,dc=com", SearchScope::WholeSubtree, "(cn=test)"))
            .unwrap()
            .unwrap();
        assert_eq!(result.object_name, "cn=test,dc=example,dc=com");
        assert_eq!(result.values("cn"), Some(&[b"Test".to_vec()][..]));
    }

    #[test]
    fn test_empty_and_matches_on_scope_alone() {
        let schema = schema();
        let entry = test_entry(&schema);
        for (base, scope, expected) in [
            ("dc=example,dc=com", SearchScope::WholeSubtree, true),
            ("dc=example,dc=com", SearchScope::SingleLevel, true),
            ("dc=example,dc=com", SearchScope::BaseObject, false),
            ("cn=test,dc=example,dc=com", SearchScope::BaseObject, true),
            ("cn=test,dc=example,dc=com", SearchScope::SingleLevel, false),
            ("dc=com", SearchScope::SingleLevel, false),
            ("dc=other", SearchScope::WholeSubtree, false),
            ("", SearchScope::WholeSubtree, true),
        ] {
            let found = entry.search(&request(base, scope, "(&)")).unwrap().is_some();
            assert_eq!(found, expected, "{} {:?}", base, scope);
        }
    }

    #[test]
    fn test_invalid_base_dn() {
        let schema = schema();
        let entry = test_entry(&schema);
        let err = entry
            .search(&request("garbage", SearchScope::WholeSubtree, "(&)"))
            .unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InvalidDnSyntax);
    }

    #[test]
    fn test_attribute_selection() {
        let schema = schema();
        let entry = test_entry(&schema);
        let names = |selectors: &[&str]| -> Vec<String> {
            let selectors: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
            entry
                .project(&selectors, false)
                .attributes
                .into_iter()
                .map(|a| a.attribute_type)
                .collect()
        };
        assert_eq!(names(&[]), vec!["objectClass", "cn", "sn"]);
        assert_eq!(names(&["*"]), vec!["objectClass", "cn", "sn"]);
        assert_eq!(names(&["+"]), vec!["createTimestamp"]);
        assert_eq!(names(&["*", "+"]).len(), 4);
        assert!(names(&["1.1"]).is_empty());
        assert_eq!(names(&["commonName"]), vec!["cn"]);
        // Requesting a supertype returns its subtypes
        assert_eq!(names(&["name"]), vec!["cn", "sn"]);
        assert_eq!(names(&["bogus", "sn"]), vec!["sn"]);
    }

    #[test]
    fn test_types_only() {
        let schema = schema();
        let entry = test_entry(&schema);
        let result = entry.project(&["cn".to_string()], true);
        assert_eq!(result.attributes.len(), 1);
        assert!(result.attributes[0].values.is_empty());
    }

    #[test]
    fn test_compare() {
        let schema = schema();
        let entry = test_entry(&schema);
        let dn = Dn::parse("CN=Test, DC=Example, DC=Com").unwrap();
        assert!(entry.compare(&dn, "cn", b"Test").unwrap());
        assert!(!entry.compare(&dn, "cn", b"Nope").unwrap());
        assert!(entry.compare(&dn, "name", b"tester").unwrap());

        let other = Dn::parse("cn=missing,dc=example,dc=com").unwrap();
        let err = entry.compare(&other, "cn", b"Test").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);

        let err = entry.compare(&dn, "bogus", b"x").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::UndefinedAttributeType);

        let err = entry.compare(&dn, "supportedLDAPVersion", b"3").unwrap_err();
        assert_eq!(err.result_code(), ResultCode::InappropriateMatching);
    }

    #[test]
    fn test_root_dse() {
        let schema = schema();
        let info = RootDse {
            naming_contexts: vec!["dc=example,dc=com".into()],
            subschema_subentry: Some("cn=subschema".into()),
            supported_extensions: vec!["1.3.6.1.4.1.4203.1.11.3".into()],
            supported_sasl_mechanisms: vec!["PLAIN".into()],
            supported_features: vec![FEATURE_ABSOLUTE_FILTERS.into()],
            vendor_name: Some("ldapd".into()),
            ..Default::default()
        };
        let root = Entry::root_dse(&schema, &info).unwrap();
        assert_eq!(root.kind(), EntryKind::RootDse);

        let mut req = request("", SearchScope::BaseObject, "(objectClass=*)");
        req.attributes = vec!["+".into()];
        let result = root.search(&req).unwrap().unwrap();
        assert_eq!(result.object_name, "");
        assert_eq!(result.values("supportedLDAPVersion"), Some(&[b"3".to_vec()][..]));
        assert_eq!(
            result.values("namingContexts"),
            Some(&[b"dc=example,dc=com".to_vec()][..])
        );
        assert!(result.values("supportedControl").is_none());

        // Only a base search for (objectClass=*) at the empty DN
        assert!(root.search(&request("", SearchScope::WholeSubtree, "(objectClass=*)")).unwrap().is_none());
        assert!(root.search(&request("", SearchScope::BaseObject, "(&)")).unwrap().is_none());
        assert!(root
            .search(&request("dc=example,dc=com", SearchScope::BaseObject, "(objectClass=*)"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_subschema_subentry() {
        let schema = schema();
        let dn = Dn::parse("cn=subschema").unwrap();
        let subschema = Entry::subschema_subentry(&schema, dn).unwrap();

        let mut req = request("cn=subschema", SearchScope::BaseObject, "(objectClass=subschema)");
        req.attributes = vec!["attributeTypes".into(), "objectClasses".into(), "cn".into()];
        let result = subschema.search(&req).unwrap().unwrap();
        let attribute_types = result.values("attributeTypes").unwrap();
        assert_eq!(attribute_types.len(), schema.attribute_types().count());
        assert!(attribute_types
            .iter()
            .any(|v| v.starts_with(b"( 2.5.4.3 NAME ( 'cn' 'commonName' )")));
        assert_eq!(result.values("cn"), Some(&[b"subschema".to_vec()][..]));

        assert!(subschema
            .search(&request("cn=subschema", SearchScope::BaseObject, "(objectClass=*)"))
            .unwrap()
            .is_none());
        assert!(subschema
            .search(&request("", SearchScope::WholeSubtree, "(objectClass=subschema)"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_subschema_compare_first_component() {
        let schema = schema();
        let dn = Dn::parse("cn=subschema").unwrap();
        let subschema = Entry::subschema_subentry(&schema, dn.clone()).unwrap();
        assert!(subschema.compare(&dn, "objectClasses", b"person").unwrap());
        assert!(!subschema.compare(&dn, "objectClasses", b"1.2.3.4").unwrap());
    }
}
