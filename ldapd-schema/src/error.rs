//! Schema construction errors.

use thiserror::Error;

/// Errors raised while building or querying a schema.
///
/// These are configuration errors: a schema that fails to build is never
/// partially usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate OID '{oid}' registering {kind}")]
    DuplicateOid { kind: &'static str, oid: String },

    #[error("duplicate name '{name}' registering {kind} {oid}")]
    DuplicateName {
        kind: &'static str,
        oid: String,
        name: String,
    },

    #[error("{kind} {oid} references unknown {missing_kind} '{missing}'")]
    UnresolvedDependency {
        kind: &'static str,
        oid: String,
        missing_kind: &'static str,
        missing: String,
    },

    #[error("invalid {kind} {oid}: {reason}")]
    InvalidDefinition {
        kind: &'static str,
        oid: String,
        reason: String,
    },

    #[error("cannot parse schema description '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("schema object not found: {key}")]
    NotFound { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::DuplicateOid {
            kind: "attribute type",
            oid: "2.5.4.3".to_string(),
        };
        assert_eq!(err.to_string(), "duplicate OID '2.5.4.3' registering attribute type");

        let err = SchemaError::UnresolvedDependency {
            kind: "object class",
            oid: "1.2.3".to_string(),
            missing_kind: "attribute type",
            missing: "fooAttr".to_string(),
        };
        assert!(err.to_string().contains("fooAttr"));

        let err = SchemaError::NotFound {
            key: "bogus".to_string(),
        };
        assert!(err.to_string().contains("bogus"));
    }
}
