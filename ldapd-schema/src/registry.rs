//! OID and short name registry.

use crate::error::SchemaError;
use std::collections::HashMap;

/// Normalizes a lookup key: surrounding whitespace is ignored and case folded.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Maps a numeric OID and every short name of an object to one value.
///
/// Lookups are case-insensitive. Registration is all-or-nothing: if the OID
/// or any name is already taken, nothing is inserted.
#[derive(Debug, Clone)]
pub struct OidRegistry<T> {
    kind: &'static str,
    entries: HashMap<String, T>,
    count: usize,
}

impl<T: Copy> OidRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            count: 0,
        }
    }

    /// Registers `value` under `oid` and `names`.
    pub fn register(&mut self, oid: &str, names: &[String], value: T) -> Result<(), SchemaError> {
        let oid_key = normalize_key(oid);
        if self.entries.contains_key(&oid_key) {
            return Err(SchemaError::DuplicateOid {
                kind: self.kind,
                oid: oid.to_string(),
            });
        }

        let mut keys = vec![oid_key];
        for name in names {
            let key = normalize_key(name);
            if self.entries.contains_key(&key) || keys.contains(&key) {
                return Err(SchemaError::DuplicateName {
                    kind: self.kind,
                    oid: oid.to_string(),
                    name: name.clone(),
                });
            }
            keys.push(key);
        }

        for key in keys {
            self.entries.insert(key, value);
        }
        self.count += 1;
        Ok(())
    }

    /// Returns the value registered under an OID or name.
    pub fn get(&self, key: &str) -> Option<T> {
        self.entries.get(&normalize_key(key)).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Number of registered objects (not keys).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_lookup_by_oid_and_names() {
        let mut registry = OidRegistry::new("attribute type");
        registry
            .register("2.5.4.3", &names(&["cn", "commonName"]), 7usize)
            .unwrap();

        assert_eq!(registry.get("2.5.4.3"), Some(7));
        assert_eq!(registry.get("cn"), Some(7));
        assert_eq!(registry.get("CommonName"), Some(7));
        assert_eq!(registry.get("  CN "), Some(7));
        assert_eq!(registry.get("sn"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_oid_rejected() {
        let mut registry = OidRegistry::new("syntax");
        registry.register("1.2.3", &[], 1u8).unwrap();
        let err = registry.register("1.2.3", &[], 2u8).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateOid { .. }));
        assert_eq!(registry.get("1.2.3"), Some(1));
    }

    #[test]
    fn test_duplicate_name_is_atomic() {
        let mut registry = OidRegistry::new("object class");
        registry.register("1.1", &names(&["top"]), 1u8).unwrap();

        let err = registry
            .register("1.2", &names(&["person", "TOP"]), 2u8)
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName { ref name, .. } if name == "TOP"));
        // Nothing from the failed registration is visible
        assert!(!registry.contains("1.2"));
        assert!(!registry.contains("person"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_within_one_object() {
        let mut registry = OidRegistry::new("attribute type");
        let err = registry
            .register("1.1", &names(&["a", "A"]), 1u8)
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName { .. }));
        assert!(registry.is_empty());
    }
}
