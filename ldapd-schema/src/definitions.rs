//! Raw schema definitions and their RFC4512 description form.
//!
//! Definitions reference each other by OID or name. They are resolved into
//! schema objects by [`Schema::new`](crate::Schema::new).

use crate::error::SchemaError;
use crate::matching::{MatchAlgorithm, MatchingRuleKind};
use crate::syntax::SyntaxKind;
use std::fmt;
use std::str::FromStr;

/// Definition of an attribute syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxDefinition {
    pub oid: String,
    pub description: Option<String>,
    pub kind: SyntaxKind,
    /// Compatibility tags in addition to the syntax OID itself.
    pub extra_compatibility_tags: Vec<String>,
}

impl SyntaxDefinition {
    pub fn new(oid: &str, description: &str, kind: SyntaxKind) -> Self {
        Self {
            oid: oid.to_string(),
            description: Some(description.to_string()),
            kind,
            extra_compatibility_tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.extra_compatibility_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// Definition of a matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRuleDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub obsolete: bool,
    /// Assertion value syntax.
    pub syntax: String,
    pub kind: MatchingRuleKind,
    pub algorithm: MatchAlgorithm,
    /// Defaults to the assertion syntax OID.
    pub compatibility_tag: Option<String>,
}

impl MatchingRuleDefinition {
    pub fn new(
        oid: &str,
        name: &str,
        syntax: &str,
        kind: MatchingRuleKind,
        algorithm: MatchAlgorithm,
    ) -> Self {
        Self {
            oid: oid.to_string(),
            names: vec![name.to_string()],
            description: None,
            obsolete: false,
            syntax: syntax.to_string(),
            kind,
            algorithm,
            compatibility_tag: None,
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.compatibility_tag = Some(tag.to_string());
        self
    }
}

/// RFC4512 attribute type usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeUsage {
    #[default]
    UserApplications,
    DirectoryOperation,
    DistributedOperation,
    DsaOperation,
}

impl AttributeUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeUsage::UserApplications => "userApplications",
            AttributeUsage::DirectoryOperation => "directoryOperation",
            AttributeUsage::DistributedOperation => "distributedOperation",
            AttributeUsage::DsaOperation => "dSAOperation",
        }
    }
}

impl FromStr for AttributeUsage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "userApplications" => Ok(AttributeUsage::UserApplications),
            "directoryOperation" => Ok(AttributeUsage::DirectoryOperation),
            "distributedOperation" => Ok(AttributeUsage::DistributedOperation),
            "dSAOperation" => Ok(AttributeUsage::DsaOperation),
            other => Err(format!("unknown usage '{}'", other)),
        }
    }
}

/// Definition of an attribute type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeTypeDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub obsolete: bool,
    pub sup: Option<String>,
    pub equality: Option<String>,
    pub ordering: Option<String>,
    pub substr: Option<String>,
    pub syntax: Option<String>,
    pub syntax_len: Option<u32>,
    pub single_value: bool,
    pub collective: bool,
    pub no_user_modification: bool,
    pub usage: AttributeUsage,
}

/// RFC4512 object class kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectClassKind {
    Abstract,
    #[default]
    Structural,
    Auxiliary,
}

impl ObjectClassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClassKind::Abstract => "ABSTRACT",
            ObjectClassKind::Structural => "STRUCTURAL",
            ObjectClassKind::Auxiliary => "AUXILIARY",
        }
    }
}

/// Definition of an object class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectClassDefinition {
    pub oid: String,
    pub names: Vec<String>,
    pub description: Option<String>,
    pub obsolete: bool,
    pub sup: Vec<String>,
    pub kind: ObjectClassKind,
    pub must: Vec<String>,
    pub may: Vec<String>,
}

/// All raw definitions a schema is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDefinitions {
    pub syntaxes: Vec<SyntaxDefinition>,
    pub matching_rules: Vec<MatchingRuleDefinition>,
    pub attribute_types: Vec<AttributeTypeDefinition>,
    pub object_classes: Vec<ObjectClassDefinition>,
}

fn merge_unique<T: PartialEq + Clone>(into: &mut Vec<T>, from: &[T]) {
    for item in from {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

impl SchemaDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses attribute type and object class descriptions.
    pub fn parse<S: AsRef<str>>(
        attribute_types: &[S],
        object_classes: &[S],
    ) -> Result<Self, SchemaError> {
        Ok(Self {
            attribute_types: attribute_types
                .iter()
                .map(|s| s.as_ref().parse())
                .collect::<Result<_, _>>()?,
            object_classes: object_classes
                .iter()
                .map(|s| s.as_ref().parse())
                .collect::<Result<_, _>>()?,
            ..Self::default()
        })
    }

    /// Adds every definition of `other` that is not already present.
    ///
    /// Conflicting definitions for the same OID are kept and surface as a
    /// duplicate error when the schema is built.
    pub fn merge(&mut self, other: &SchemaDefinitions) {
        merge_unique(&mut self.syntaxes, &other.syntaxes);
        merge_unique(&mut self.matching_rules, &other.matching_rules);
        merge_unique(&mut self.attribute_types, &other.attribute_types);
        merge_unique(&mut self.object_classes, &other.object_classes);
    }

    pub fn len(&self) -> usize {
        self.syntaxes.len()
            + self.matching_rules.len()
            + self.attribute_types.len()
            + self.object_classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Description parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Quoted(String),
    Word(String),
}

fn parse_error(input: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Parse {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, SchemaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '\'' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) => break,
                        Some((_, c)) => s.push(c),
                        None => return Err(parse_error(input, "unterminated quoted string")),
                    }
                }
                tokens.push(Token::Quoted(s));
            }
            c => {
                let mut s = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || next == '(' || next == ')' || next == '\'' {
                        break;
                    }
                    s.push(next);
                    chars.next();
                }
                tokens.push(Token::Word(s));
            }
        }
    }
    Ok(tokens)
}

const FLAGS: &[&str] = &[
    "OBSOLETE",
    "SINGLE-VALUE",
    "COLLECTIVE",
    "NO-USER-MODIFICATION",
    "ABSTRACT",
    "STRUCTURAL",
    "AUXILIARY",
];

/// A description split into its OID and keyword fields.
struct Description {
    oid: String,
    fields: Vec<(String, Vec<String>)>,
}

impl Description {
    fn parse(input: &str) -> Result<Self, SchemaError> {
        let mut tokens = tokenize(input)?.into_iter();
        if tokens.next() != Some(Token::Open) {
            return Err(parse_error(input, "expected '('"));
        }
        let oid = match tokens.next() {
            Some(Token::Word(oid)) => oid,
            _ => return Err(parse_error(input, "expected numeric OID")),
        };

        let mut fields = Vec::new();
        loop {
            let keyword = match tokens.next() {
                Some(Token::Close) => break,
                Some(Token::Word(w)) => w,
                _ => return Err(parse_error(input, "expected keyword")),
            };
            if FLAGS.contains(&keyword.as_str()) {
                fields.push((keyword, Vec::new()));
                continue;
            }
            let values = match tokens.next() {
                Some(Token::Quoted(s)) | Some(Token::Word(s)) => vec![s],
                Some(Token::Open) => {
                    let mut values = Vec::new();
                    loop {
                        match tokens.next() {
                            Some(Token::Close) => break,
                            Some(Token::Word(w)) if w == "$" => {}
                            Some(Token::Quoted(s)) | Some(Token::Word(s)) => values.push(s),
                            _ => return Err(parse_error(input, "unterminated list")),
                        }
                    }
                    values
                }
                _ => {
                    return Err(parse_error(
                        input,
                        format!("missing value for {}", keyword),
                    ))
                }
            };
            fields.push((keyword, values));
        }
        if tokens.next().is_some() {
            return Err(parse_error(input, "trailing input after ')'"));
        }
        Ok(Self { oid, fields })
    }
}

fn single(input: &str, keyword: &str, mut values: Vec<String>) -> Result<String, SchemaError> {
    if values.len() != 1 {
        return Err(parse_error(input, format!("{} takes one value", keyword)));
    }
    Ok(values.remove(0))
}

impl FromStr for AttributeTypeDefinition {
    type Err = SchemaError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let desc = Description::parse(input)?;
        let mut def = AttributeTypeDefinition {
            oid: desc.oid,
            ..Default::default()
        };
        for (keyword, values) in desc.fields {
            match keyword.as_str() {
                "NAME" => def.names = values,
                "DESC" => def.description = Some(single(input, &keyword, values)?),
                "OBSOLETE" => def.obsolete = true,
                "SUP" => def.sup = Some(single(input, &keyword, values)?),
                "EQUALITY" => def.equality = Some(single(input, &keyword, values)?),
                "ORDERING" => def.ordering = Some(single(input, &keyword, values)?),
                "SUBSTR" => def.substr = Some(single(input, &keyword, values)?),
                "SYNTAX" => {
                    let noidlen = single(input, &keyword, values)?;
                    match noidlen.split_once('{') {
                        Some((oid, len)) => {
                            let len = len
                                .strip_suffix('}')
                                .and_then(|l| l.parse().ok())
                                .ok_or_else(|| parse_error(input, "invalid syntax length"))?;
                            def.syntax = Some(oid.to_string());
                            def.syntax_len = Some(len);
                        }
                        None => def.syntax = Some(noidlen),
                    }
                }
                "SINGLE-VALUE" => def.single_value = true,
                "COLLECTIVE" => def.collective = true,
                "NO-USER-MODIFICATION" => def.no_user_modification = true,
                "USAGE" => {
                    def.usage = single(input, &keyword, values)?
                        .parse()
                        .map_err(|e: String| parse_error(input, e))?
                }
                k if k.starts_with("X-") => {}
                other => return Err(parse_error(input, format!("unknown keyword {}", other))),
            }
        }
        Ok(def)
    }
}

impl FromStr for ObjectClassDefinition {
    type Err = SchemaError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let desc = Description::parse(input)?;
        let mut def = ObjectClassDefinition {
            oid: desc.oid,
            ..Default::default()
        };
        for (keyword, values) in desc.fields {
            match keyword.as_str() {
                "NAME" => def.names = values,
                "DESC" => def.description = Some(single(input, &keyword, values)?),
                "OBSOLETE" => def.obsolete = true,
                "SUP" => def.sup = values,
                "ABSTRACT" => def.kind = ObjectClassKind::Abstract,
                "STRUCTURAL" => def.kind = ObjectClassKind::Structural,
                "AUXILIARY" => def.kind = ObjectClassKind::Auxiliary,
                "MUST" => def.must = values,
                "MAY" => def.may = values,
                k if k.starts_with("X-") => {}
                other => return Err(parse_error(input, format!("unknown keyword {}", other))),
            }
        }
        Ok(def)
    }
}

// ---------------------------------------------------------------------------
// Description printing
// ---------------------------------------------------------------------------

fn write_names(f: &mut fmt::Formatter<'_>, names: &[String]) -> fmt::Result {
    match names {
        [] => Ok(()),
        [name] => write!(f, " NAME '{}'", name),
        names => {
            write!(f, " NAME (")?;
            for name in names {
                write!(f, " '{}'", name)?;
            }
            write!(f, " )")
        }
    }
}

fn write_oids(f: &mut fmt::Formatter<'_>, keyword: &str, oids: &[String]) -> fmt::Result {
    match oids {
        [] => Ok(()),
        [oid] => write!(f, " {} {}", keyword, oid),
        oids => write!(f, " {} ( {} )", keyword, oids.join(" $ ")),
    }
}

fn write_description(f: &mut fmt::Formatter<'_>, description: &Option<String>) -> fmt::Result {
    match description {
        Some(d) => write!(f, " DESC '{}'", d),
        None => Ok(()),
    }
}

impl fmt::Display for SyntaxDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {}", self.oid)?;
        write_description(f, &self.description)?;
        write!(f, " )")
    }
}

impl fmt::Display for MatchingRuleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {}", self.oid)?;
        write_names(f, &self.names)?;
        write_description(f, &self.description)?;
        if self.obsolete {
            write!(f, " OBSOLETE")?;
        }
        write!(f, " SYNTAX {} )", self.syntax)
    }
}

impl fmt::Display for AttributeTypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {}", self.oid)?;
        write_names(f, &self.names)?;
        write_description(f, &self.description)?;
        if self.obsolete {
            write!(f, " OBSOLETE")?;
        }
        if let Some(sup) = &self.sup {
            write!(f, " SUP {}", sup)?;
        }
        if let Some(rule) = &self.equality {
            write!(f, " EQUALITY {}", rule)?;
        }
        if let Some(rule) = &self.ordering {
            write!(f, " ORDERING {}", rule)?;
        }
        if let Some(rule) = &self.substr {
            write!(f, " SUBSTR {}", rule)?;
        }
        if let Some(syntax) = &self.syntax {
            write!(f, " SYNTAX {}", syntax)?;
            if let Some(len) = self.syntax_len {
                write!(f, "{{{}}}", len)?;
            }
        }
        if self.single_value {
            write!(f, " SINGLE-VALUE")?;
        }
        if self.collective {
            write!(f, " COLLECTIVE")?;
        }
        if self.no_user_modification {
            write!(f, " NO-USER-MODIFICATION")?;
        }
        if self.usage != AttributeUsage::UserApplications {
            write!(f, " USAGE {}", self.usage.as_str())?;
        }
        write!(f, " )")
    }
}

impl fmt::Display for ObjectClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {}", self.oid)?;
        write_names(f, &self.names)?;
        write_description(f, &self.description)?;
        if self.obsolete {
            write!(f, " OBSOLETE")?;
        }
        write_oids(f, "SUP", &self.sup)?;
        write!(f, " {}", self.kind.as_str())?;
        write_oids(f, "MUST", &self.must)?;
        write_oids(f, "MAY", &self.may)?;
        write!(f, " )")
    }
}

/// RFC4512 matching rule use description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRuleUseDescription {
    pub oid: String,
    pub names: Vec<String>,
    pub applies: Vec<String>,
}

impl fmt::Display for MatchingRuleUseDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "( {}", self.oid)?;
        write_names(f, &self.names)?;
        write_oids(f, "APPLIES", &self.applies)?;
        write!(f, " )")
    }
}
