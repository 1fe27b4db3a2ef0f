//! Resolved, immutable schema.
//!
//! A [`Schema`] is built from [`SchemaDefinitions`] in dependency order:
//! syntaxes, matching rules, attribute types, object classes. Attribute
//! types and object classes may reference superiors defined later in the
//! input, so they are resolved in repeated passes until no definition makes
//! progress. Objects live in arenas and refer to each other by typed index.

use crate::definitions::{
    AttributeTypeDefinition, AttributeUsage, MatchingRuleDefinition, MatchingRuleUseDescription,
    ObjectClassDefinition, ObjectClassKind, SchemaDefinitions, SyntaxDefinition,
};
use crate::error::SchemaError;
use crate::matching::{MatchingRule, MatchingRuleKind};
use crate::registry::{normalize_key, OidRegistry};
use crate::standard;
use crate::syntax::SyntaxKind;
use crate::value::Value;
use ldapd_protocol::LdapError;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;
use tracing::debug;

macro_rules! schema_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(&self) -> usize {
                self.0
            }
        }
    };
}

schema_id!(
    /// Index of a syntax within the schema that issued it.
    SyntaxId
);
schema_id!(
    /// Index of a matching rule within the schema that issued it.
    MatchingRuleId
);
schema_id!(
    /// Index of an attribute type within the schema that issued it.
    AttributeTypeId
);
schema_id!(
    /// Index of an object class within the schema that issued it.
    ObjectClassId
);

/// A resolved syntax.
#[derive(Debug, Clone)]
pub struct Syntax {
    pub oid: String,
    pub kind: SyntaxKind,
    pub compatibility_tags: Vec<String>,
    pub compatible_matching_rules: Vec<MatchingRuleId>,
    definition: SyntaxDefinition,
}

impl Syntax {
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, LdapError> {
        self.kind.decode(bytes)
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, LdapError> {
        self.kind.encode(value)
    }

    /// RFC4512 `ldapSyntaxes` description.
    pub fn description(&self) -> String {
        self.definition.to_string()
    }
}

/// A resolved attribute type with inherited rules and syntax filled in.
#[derive(Debug, Clone)]
pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    pub sup: Option<AttributeTypeId>,
    pub equality: Option<MatchingRuleId>,
    pub ordering: Option<MatchingRuleId>,
    pub substr: Option<MatchingRuleId>,
    pub syntax: SyntaxId,
    pub single_value: bool,
    pub collective: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
    /// Transitive subtypes, excluding the type itself.
    pub subtypes: Vec<AttributeTypeId>,
    pub compatible_matching_rules: Vec<MatchingRuleId>,
    definition: AttributeTypeDefinition,
}

impl AttributeType {
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn is_operational(&self) -> bool {
        self.usage != AttributeUsage::UserApplications
    }

    pub fn description(&self) -> String {
        self.definition.to_string()
    }
}

/// A resolved object class.
#[derive(Debug, Clone)]
pub struct ObjectClass {
    pub oid: String,
    pub names: Vec<String>,
    pub sup: Vec<ObjectClassId>,
    pub kind: ObjectClassKind,
    pub must: Vec<AttributeTypeId>,
    pub may: Vec<AttributeTypeId>,
    definition: ObjectClassDefinition,
}

impl ObjectClass {
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or(&self.oid)
    }

    pub fn description(&self) -> String {
        self.definition.to_string()
    }
}

/// Identity of any schema object, used for whole-schema uniqueness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaObjectId {
    Syntax(SyntaxId),
    MatchingRule(MatchingRuleId),
    AttributeType(AttributeTypeId),
    ObjectClass(ObjectClassId),
}

/// Borrowed view of any schema object.
#[derive(Debug, Clone, Copy)]
pub enum SchemaObject<'a> {
    Syntax(&'a Syntax),
    MatchingRule(&'a MatchingRule),
    AttributeType(&'a AttributeType),
    ObjectClass(&'a ObjectClass),
}

impl SchemaObject<'_> {
    pub fn oid(&self) -> &str {
        match self {
            SchemaObject::Syntax(s) => &s.oid,
            SchemaObject::MatchingRule(r) => &r.oid,
            SchemaObject::AttributeType(a) => &a.oid,
            SchemaObject::ObjectClass(o) => &o.oid,
        }
    }
}

struct SchemaInner {
    definitions: SchemaDefinitions,
    syntaxes: Vec<Syntax>,
    matching_rules: Vec<MatchingRule>,
    attribute_types: Vec<AttributeType>,
    object_classes: Vec<ObjectClass>,
    syntax_index: OidRegistry<SyntaxId>,
    matching_rule_index: OidRegistry<MatchingRuleId>,
    attribute_type_index: OidRegistry<AttributeTypeId>,
    object_class_index: OidRegistry<ObjectClassId>,
    objects: OidRegistry<SchemaObjectId>,
}

/// An immutable, shareable schema.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("syntaxes", &self.inner.syntaxes.len())
            .field("matching_rules", &self.inner.matching_rules.len())
            .field("attribute_types", &self.inner.attribute_types.len())
            .field("object_classes", &self.inner.object_classes.len())
            .finish()
    }
}

fn unresolved(kind: &'static str, oid: &str, missing_kind: &'static str, missing: &str) -> SchemaError {
    SchemaError::UnresolvedDependency {
        kind,
        oid: oid.to_string(),
        missing_kind,
        missing: missing.to_string(),
    }
}

fn invalid(kind: &'static str, oid: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidDefinition {
        kind,
        oid: oid.to_string(),
        reason: reason.into(),
    }
}

const SYNTAX: &str = "syntax";
const MATCHING_RULE: &str = "matching rule";
const ATTRIBUTE_TYPE: &str = "attribute type";
const OBJECT_CLASS: &str = "object class";

/// Registers definitions whose dependencies are satisfied, pass after pass.
///
/// `add` returns `Ok(false)` when a dependency is still missing. Once a pass
/// makes no progress the remaining definitions are forced so the missing
/// dependency surfaces as an error.
fn resolve_in_passes<T>(
    definitions: &[T],
    mut add: impl FnMut(&T, bool) -> Result<bool, SchemaError>,
) -> Result<(), SchemaError> {
    let mut pending: Vec<&T> = definitions.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut remaining = Vec::new();
        for def in pending {
            if !add(def, false)? {
                remaining.push(def);
            }
        }
        if remaining.len() == before {
            for def in remaining {
                add(def, true)?;
            }
            return Ok(());
        }
        pending = remaining;
    }
    Ok(())
}

struct Builder {
    syntaxes: Vec<Syntax>,
    matching_rules: Vec<MatchingRule>,
    attribute_types: Vec<AttributeType>,
    object_classes: Vec<ObjectClass>,
    syntax_index: OidRegistry<SyntaxId>,
    matching_rule_index: OidRegistry<MatchingRuleId>,
    attribute_type_index: OidRegistry<AttributeTypeId>,
    object_class_index: OidRegistry<ObjectClassId>,
    objects: OidRegistry<SchemaObjectId>,
}

impl Builder {
    fn new() -> Self {
        Self {
            syntaxes: Vec::new(),
            matching_rules: Vec::new(),
            attribute_types: Vec::new(),
            object_classes: Vec::new(),
            syntax_index: OidRegistry::new(SYNTAX),
            matching_rule_index: OidRegistry::new(MATCHING_RULE),
            attribute_type_index: OidRegistry::new(ATTRIBUTE_TYPE),
            object_class_index: OidRegistry::new(OBJECT_CLASS),
            objects: OidRegistry::new("schema object"),
        }
    }

    fn add_syntax(&mut self, def: &SyntaxDefinition) -> Result<(), SchemaError> {
        let id = SyntaxId(self.syntaxes.len());
        self.syntax_index.register(&def.oid, &[], id)?;
        self.objects.register(&def.oid, &[], SchemaObjectId::Syntax(id))?;

        let mut tags = vec![def.oid.clone()];
        tags.extend(def.extra_compatibility_tags.iter().cloned());
        self.syntaxes.push(Syntax {
            oid: def.oid.clone(),
            kind: def.kind,
            compatibility_tags: tags,
            compatible_matching_rules: Vec::new(),
            definition: def.clone(),
        });
        Ok(())
    }

    fn add_matching_rule(&mut self, def: &MatchingRuleDefinition) -> Result<(), SchemaError> {
        let syntax = self
            .syntax_index
            .get(&def.syntax)
            .ok_or_else(|| unresolved(MATCHING_RULE, &def.oid, SYNTAX, &def.syntax))?;

        let id = MatchingRuleId(self.matching_rules.len());
        self.matching_rule_index.register(&def.oid, &def.names, id)?;
        self.objects
            .register(&def.oid, &def.names, SchemaObjectId::MatchingRule(id))?;

        let syntax_def = &self.syntaxes[syntax.0];
        self.matching_rules.push(MatchingRule {
            oid: def.oid.clone(),
            names: def.names.clone(),
            description: def.description.clone(),
            obsolete: def.obsolete,
            kind: def.kind,
            algorithm: def.algorithm,
            syntax,
            syntax_kind: syntax_def.kind,
            compatibility_tag: def
                .compatibility_tag
                .clone()
                .unwrap_or_else(|| syntax_def.oid.clone()),
            compatible_syntaxes: Vec::new(),
            compatible_attribute_types: Vec::new(),
        });
        Ok(())
    }

    /// Resolves a locally declared matching rule of an attribute type.
    fn rule_for(
        &self,
        def: &AttributeTypeDefinition,
        key: Option<&str>,
        kind: MatchingRuleKind,
        syntax: SyntaxId,
    ) -> Result<Option<MatchingRuleId>, SchemaError> {
        let Some(key) = key else {
            return Ok(None);
        };
        let id = self
            .matching_rule_index
            .get(key)
            .ok_or_else(|| unresolved(ATTRIBUTE_TYPE, &def.oid, MATCHING_RULE, key))?;
        let rule = &self.matching_rules[id.0];
        if rule.kind != kind {
            return Err(invalid(
                ATTRIBUTE_TYPE,
                &def.oid,
                format!("{} is not an {} rule", key, kind.as_str()),
            ));
        }
        let syntax = &self.syntaxes[syntax.0];
        if !syntax.compatibility_tags.contains(&rule.compatibility_tag) {
            return Err(invalid(
                ATTRIBUTE_TYPE,
                &def.oid,
                format!("{} is not applicable to syntax {}", key, syntax.oid),
            ));
        }
        Ok(Some(id))
    }

    fn try_add_attribute_type(
        &mut self,
        def: &AttributeTypeDefinition,
        force: bool,
    ) -> Result<bool, SchemaError> {
        let sup = match &def.sup {
            Some(key) => match self.attribute_type_index.get(key) {
                Some(id) => Some(id),
                None if force => {
                    return Err(unresolved(ATTRIBUTE_TYPE, &def.oid, ATTRIBUTE_TYPE, key))
                }
                None => return Ok(false),
            },
            None => None,
        };
        let inherited = sup.map(|id| {
            let parent = &self.attribute_types[id.0];
            (parent.syntax, parent.equality, parent.ordering, parent.substr)
        });

        let syntax = match (&def.syntax, inherited) {
            (Some(key), _) => self
                .syntax_index
                .get(key)
                .ok_or_else(|| unresolved(ATTRIBUTE_TYPE, &def.oid, SYNTAX, key))?,
            (None, Some((syntax, ..))) => syntax,
            (None, None) => {
                return Err(invalid(
                    ATTRIBUTE_TYPE,
                    &def.oid,
                    "neither a syntax nor a superior type",
                ))
            }
        };
        let equality = self
            .rule_for(def, def.equality.as_deref(), MatchingRuleKind::Equality, syntax)?
            .or(inherited.and_then(|(_, eq, _, _)| eq));
        let ordering = self
            .rule_for(def, def.ordering.as_deref(), MatchingRuleKind::Ordering, syntax)?
            .or(inherited.and_then(|(_, _, ord, _)| ord));
        let substr = self
            .rule_for(def, def.substr.as_deref(), MatchingRuleKind::Substr, syntax)?
            .or(inherited.and_then(|(_, _, _, sub)| sub));

        let id = AttributeTypeId(self.attribute_types.len());
        self.attribute_type_index.register(&def.oid, &def.names, id)?;
        self.objects
            .register(&def.oid, &def.names, SchemaObjectId::AttributeType(id))?;
        self.attribute_types.push(AttributeType {
            oid: def.oid.clone(),
            names: def.names.clone(),
            sup,
            equality,
            ordering,
            substr,
            syntax,
            single_value: def.single_value,
            collective: def.collective,
            no_user_modification: def.no_user_modification,
            usage: def.usage,
            subtypes: Vec::new(),
            compatible_matching_rules: Vec::new(),
            definition: def.clone(),
        });
        Ok(true)
    }

    fn try_add_object_class(
        &mut self,
        def: &ObjectClassDefinition,
        force: bool,
    ) -> Result<bool, SchemaError> {
        let mut sup = Vec::with_capacity(def.sup.len());
        for key in &def.sup {
            match self.object_class_index.get(key) {
                Some(id) => sup.push(id),
                None if force => {
                    return Err(unresolved(OBJECT_CLASS, &def.oid, OBJECT_CLASS, key))
                }
                None => return Ok(false),
            }
        }
        let attributes = |keys: &[String]| -> Result<Vec<AttributeTypeId>, SchemaError> {
            keys.iter()
                .map(|key| {
                    self.attribute_type_index
                        .get(key)
                        .ok_or_else(|| unresolved(OBJECT_CLASS, &def.oid, ATTRIBUTE_TYPE, key))
                })
                .collect()
        };
        let must = attributes(&def.must)?;
        let may = attributes(&def.may)?;

        let id = ObjectClassId(self.object_classes.len());
        self.object_class_index.register(&def.oid, &def.names, id)?;
        self.objects
            .register(&def.oid, &def.names, SchemaObjectId::ObjectClass(id))?;
        self.object_classes.push(ObjectClass {
            oid: def.oid.clone(),
            names: def.names.clone(),
            sup,
            kind: def.kind,
            must,
            may,
            definition: def.clone(),
        });
        Ok(true)
    }

    /// Computes the back-reference sets once every object is registered.
    fn derive(&mut self) {
        for index in 0..self.attribute_types.len() {
            let mut parent = self.attribute_types[index].sup;
            while let Some(p) = parent {
                self.attribute_types[p.0].subtypes.push(AttributeTypeId(index));
                parent = self.attribute_types[p.0].sup;
            }
        }

        for (r, rule) in self.matching_rules.iter_mut().enumerate() {
            for (s, syntax) in self.syntaxes.iter_mut().enumerate() {
                if syntax.compatibility_tags.contains(&rule.compatibility_tag) {
                    rule.compatible_syntaxes.push(SyntaxId(s));
                    syntax.compatible_matching_rules.push(MatchingRuleId(r));
                }
            }
            for (a, attribute) in self.attribute_types.iter_mut().enumerate() {
                if rule.compatible_syntaxes.contains(&attribute.syntax) {
                    rule.compatible_attribute_types.push(AttributeTypeId(a));
                    attribute.compatible_matching_rules.push(MatchingRuleId(r));
                }
            }
        }
    }
}

impl Schema {
    /// Builds a schema from `definitions` on top of the RFC4512 core.
    pub fn new(definitions: SchemaDefinitions) -> Result<Self, SchemaError> {
        let mut all = standard::core_definitions()?;
        all.merge(&definitions);
        Self::build(all)
    }

    /// The RFC4512 core schema alone.
    pub fn core() -> Result<Self, SchemaError> {
        Self::new(SchemaDefinitions::default())
    }

    /// Core, RFC4519 user schema and the RFC2307 NIS subset.
    pub fn standard() -> Result<Self, SchemaError> {
        let mut definitions = standard::rfc4519_definitions()?;
        definitions.merge(&standard::nis_definitions()?);
        Self::new(definitions)
    }

    fn build(definitions: SchemaDefinitions) -> Result<Self, SchemaError> {
        let mut builder = Builder::new();
        for def in &definitions.syntaxes {
            builder.add_syntax(def)?;
        }
        for def in &definitions.matching_rules {
            builder.add_matching_rule(def)?;
        }
        resolve_in_passes(&definitions.attribute_types, |def, force| {
            builder.try_add_attribute_type(def, force)
        })?;
        resolve_in_passes(&definitions.object_classes, |def, force| {
            builder.try_add_object_class(def, force)
        })?;
        builder.derive();

        debug!(
            "Built schema: {} syntaxes, {} matching rules, {} attribute types, {} object classes",
            builder.syntaxes.len(),
            builder.matching_rules.len(),
            builder.attribute_types.len(),
            builder.object_classes.len()
        );

        Ok(Self {
            inner: Arc::new(SchemaInner {
                definitions,
                syntaxes: builder.syntaxes,
                matching_rules: builder.matching_rules,
                attribute_types: builder.attribute_types,
                object_classes: builder.object_classes,
                syntax_index: builder.syntax_index,
                matching_rule_index: builder.matching_rule_index,
                attribute_type_index: builder.attribute_type_index,
                object_class_index: builder.object_class_index,
                objects: builder.objects,
            }),
        })
    }

    /// A new schema with additional definitions. `self` is unchanged.
    pub fn extend(&self, definitions: &SchemaDefinitions) -> Result<Self, SchemaError> {
        let mut all = self.inner.definitions.clone();
        all.merge(definitions);
        Self::build(all)
    }

    /// A new schema holding the definitions of both schemas.
    pub fn merge(&self, other: &Schema) -> Result<Self, SchemaError> {
        self.extend(&other.inner.definitions)
    }

    /// The raw definitions this schema was built from.
    pub fn definitions(&self) -> &SchemaDefinitions {
        &self.inner.definitions
    }

    pub fn get(&self, key: &str) -> Option<SchemaObject<'_>> {
        let inner = &self.inner;
        Some(match inner.objects.get(key)? {
            SchemaObjectId::Syntax(id) => SchemaObject::Syntax(&inner.syntaxes[id.0]),
            SchemaObjectId::MatchingRule(id) => {
                SchemaObject::MatchingRule(&inner.matching_rules[id.0])
            }
            SchemaObjectId::AttributeType(id) => {
                SchemaObject::AttributeType(&inner.attribute_types[id.0])
            }
            SchemaObjectId::ObjectClass(id) => {
                SchemaObject::ObjectClass(&inner.object_classes[id.0])
            }
        })
    }

    /// Looks up any object by OID or name.
    pub fn lookup(&self, key: &str) -> Result<SchemaObject<'_>, SchemaError> {
        self.get(key).ok_or_else(|| SchemaError::NotFound {
            key: key.to_string(),
        })
    }

    /// Numeric OID for a name, or the normalized key if it is unknown.
    pub fn canonical_oid(&self, key: &str) -> String {
        match self.get(key) {
            Some(object) => object.oid().to_string(),
            None => normalize_key(key),
        }
    }

    pub fn syntax(&self, key: &str) -> Option<&Syntax> {
        self.inner
            .syntax_index
            .get(key)
            .map(|id| &self.inner.syntaxes[id.0])
    }

    pub fn syntax_by_id(&self, id: SyntaxId) -> &Syntax {
        &self.inner.syntaxes[id.0]
    }

    pub fn matching_rule(&self, key: &str) -> Option<&MatchingRule> {
        self.inner
            .matching_rule_index
            .get(key)
            .map(|id| &self.inner.matching_rules[id.0])
    }

    pub fn matching_rule_by_id(&self, id: MatchingRuleId) -> &MatchingRule {
        &self.inner.matching_rules[id.0]
    }

    pub fn attribute_type_id(&self, key: &str) -> Option<AttributeTypeId> {
        self.inner.attribute_type_index.get(key)
    }

    pub fn attribute_type(&self, key: &str) -> Option<&AttributeType> {
        self.attribute_type_id(key)
            .map(|id| &self.inner.attribute_types[id.0])
    }

    pub fn attribute_type_by_id(&self, id: AttributeTypeId) -> &AttributeType {
        &self.inner.attribute_types[id.0]
    }

    pub fn object_class(&self, key: &str) -> Option<&ObjectClass> {
        self.inner
            .object_class_index
            .get(key)
            .map(|id| &self.inner.object_classes[id.0])
    }

    pub fn object_class_by_id(&self, id: ObjectClassId) -> &ObjectClass {
        &self.inner.object_classes[id.0]
    }

    pub fn syntaxes(&self) -> impl Iterator<Item = &Syntax> {
        self.inner.syntaxes.iter()
    }

    pub fn matching_rules(&self) -> impl Iterator<Item = &MatchingRule> {
        self.inner.matching_rules.iter()
    }

    pub fn attribute_types(&self) -> impl Iterator<Item = (AttributeTypeId, &AttributeType)> {
        self.inner
            .attribute_types
            .iter()
            .enumerate()
            .map(|(i, a)| (AttributeTypeId(i), a))
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.inner.object_classes.iter()
    }

    /// Attribute types with `userApplications` usage.
    pub fn user_attribute_types(&self) -> impl Iterator<Item = (AttributeTypeId, &AttributeType)> {
        self.attribute_types().filter(|(_, a)| !a.is_operational())
    }

    pub fn operational_attribute_types(
        &self,
    ) -> impl Iterator<Item = (AttributeTypeId, &AttributeType)> {
        self.attribute_types().filter(|(_, a)| a.is_operational())
    }

    /// RFC4512 `matchingRuleUse` values: every rule that applies to at
    /// least one attribute type.
    pub fn matching_rule_uses(&self) -> Vec<MatchingRuleUseDescription> {
        self.inner
            .matching_rules
            .iter()
            .filter(|rule| !rule.compatible_attribute_types.is_empty())
            .map(|rule| MatchingRuleUseDescription {
                oid: rule.oid.clone(),
                names: rule.names.clone(),
                applies: rule
                    .compatible_attribute_types
                    .iter()
                    .map(|id| self.attribute_type_by_id(*id).name().to_string())
                    .collect(),
            })
            .collect()
    }

    /// RFC4512 `matchingRules` values.
    pub fn matching_rule_descriptions(&self) -> Vec<String> {
        self.inner
            .definitions
            .matching_rules
            .iter()
            .map(|def| def.to_string())
            .collect()
    }
}

impl BitOr for &Schema {
    type Output = Result<Schema, SchemaError>;

    fn bitor(self, other: &Schema) -> Self::Output {
        self.merge(other)
    }
}
