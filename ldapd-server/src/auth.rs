//! Password validation.
//!
//! Passwords are checked against SHA-256 hashes from configuration so the
//! server never holds plaintext credentials.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Validates user passwords against pre-configured hashes.
#[derive(Debug, Clone, Default)]
pub struct PasswordValidator {
    /// Lowercased uid -> SHA-256 hex hash.
    hashes: HashMap<String, String>,
}

impl PasswordValidator {
    /// Creates a validator from `(uid, hash)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            hashes: entries
                .into_iter()
                .map(|(uid, hash)| (uid.to_lowercase(), hash.to_lowercase()))
                .collect(),
        }
    }

    /// Returns whether `uid` has a password.
    pub fn has_password(&self, uid: &str) -> bool {
        self.hashes.contains_key(&uid.to_lowercase())
    }

    /// Returns the number of users with a password.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Validates a plaintext password by hashing and comparing.
    pub fn validate(&self, uid: &str, password: &[u8]) -> bool {
        match self.hashes.get(&uid.to_lowercase()) {
            Some(hash) => *hash == Self::hash_password(password),
            None => false,
        }
    }

    /// Replaces the password of `uid`.
    pub fn set_password(&mut self, uid: &str, password: &[u8]) {
        self.hashes
            .insert(uid.to_lowercase(), Self::hash_password(password));
    }

    /// Hashes a password using SHA-256, returning a lowercase hex string.
    pub fn hash_password(password: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PasswordValidator {
        PasswordValidator::new(vec![(
            "Alice".to_string(),
            PasswordValidator::hash_password(b"wonderland"),
        )])
    }

    #[test]
    fn test_hash_password() {
        let hash = PasswordValidator::hash_password(b"secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, PasswordValidator::hash_password(b"secret"));
        assert_ne!(hash, PasswordValidator::hash_password(b"Secret"));
        // Well-known SHA-256 of the empty string
        assert_eq!(
            PasswordValidator::hash_password(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate() {
        let v = validator();
        assert!(v.validate("alice", b"wonderland"));
        assert!(v.validate("ALICE", b"wonderland"));
        assert!(!v.validate("alice", b"Wonderland"));
        assert!(!v.validate("bob", b"wonderland"));
        assert!(v.has_password("alice"));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn test_uppercase_hashes_accepted() {
        let hash = PasswordValidator::hash_password(b"pw").to_uppercase();
        let v = PasswordValidator::new(vec![("carol".to_string(), hash)]);
        assert!(v.validate("carol", b"pw"));
    }

    #[test]
    fn test_set_password() {
        let mut v = validator();
        v.set_password("alice", b"looking-glass");
        assert!(!v.validate("alice", b"wonderland"));
        assert!(v.validate("alice", b"looking-glass"));

        let mut empty = PasswordValidator::default();
        assert!(empty.is_empty());
        empty.set_password("dave", b"x");
        assert!(empty.validate("dave", b"x"));
    }
}
