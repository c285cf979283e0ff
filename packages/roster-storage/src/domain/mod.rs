//! Domain layer for the collection store
//!
//! # Model
//!
//! - A **collection** is a named, ordered set of JSON documents.
//! - Every collection has one implicit default key (insertion order); all
//!   other indexes are declared with [`IndexSpec`] and can be dropped.
//! - Indexes address top-level document fields by name.
//!
//! # Port Trait
//!
//! - [`CollectionStore`]: the only storage abstraction the load pipeline uses
//!
//! # Examples
//!
//! ```rust,ignore
//! use roster_storage::domain::{CollectionStore, IndexSpec};
//! use serde_json::json;
//!
//! async fn example(store: &dyn CollectionStore) -> roster_storage::Result<()> {
//!     store.truncate("instructors").await?;
//!     store.insert_many("instructors", &[json!({"id": "PRF001"})]).await?;
//!     store
//!         .create_index("instructors", &IndexSpec::unique("instructors_id_unique", ["id"]))
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, StorageError};

// ═══════════════════════════════════════════════════════════════════════════
// Domain Models
// ═══════════════════════════════════════════════════════════════════════════

/// Declared secondary index over one or more top-level document fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name (unique across the store)
    pub name: String,
    /// Indexed fields, in key order
    pub fields: Vec<String>,
    /// Reject two documents with equal keys
    pub unique: bool,
    /// Only index documents where every key field is present and non-empty
    #[serde(default)]
    pub sparse: bool,
}

impl IndexSpec {
    /// Plain lookup index
    pub fn secondary<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            sparse: false,
        }
    }

    /// Uniqueness index
    pub fn unique<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique: true,
            ..Self::secondary(name, fields)
        }
    }

    /// Skip documents whose key fields are missing or empty
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Check names before they reach the engine
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if self.fields.is_empty() {
            return Err(StorageError::config(format!(
                "index '{}' declares no fields",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            validate_identifier(field)?;
            if !seen.insert(field.as_str()) {
                return Err(StorageError::config(format!(
                    "index '{}' lists field '{}' twice",
                    self.name, field
                )));
            }
        }
        Ok(())
    }
}

/// Collection, field and index names must be plain identifiers.
///
/// They are interpolated into engine statements, so anything else is refused.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 64 {
        Ok(())
    } else {
        Err(StorageError::config(format!("invalid identifier: '{}'", name)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait
// ═══════════════════════════════════════════════════════════════════════════

/// Collection store
///
/// Collections are created on first use. Implementations must keep
/// `insert_many` atomic: either every document is stored or none is.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Remove every document; returns how many were removed
    async fn truncate(&self, collection: &str) -> Result<usize>;

    /// Insert all documents as one bulk operation, in order
    ///
    /// # Errors
    ///
    /// `ErrorKind::Constraint` when a declared unique index rejects a document;
    /// nothing is inserted in that case.
    async fn insert_many(&self, collection: &str, documents: &[serde_json::Value])
        -> Result<usize>;

    /// Names of the droppable indexes on a collection
    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>>;

    /// Drop an index; `Ok(false)` when it did not exist
    async fn drop_index(&self, collection: &str, name: &str) -> Result<bool>;

    /// Create an index over the current contents
    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()>;

    /// Distinct non-empty string values of a top-level field
    async fn field_values(&self, collection: &str, field: &str) -> Result<BTreeSet<String>>;

    /// All documents in insertion order
    async fn find_all(&self, collection: &str) -> Result<Vec<serde_json::Value>>;

    /// Number of documents
    async fn count(&self, collection: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_spec_constructors() {
        let idx = IndexSpec::unique("learners_email_unique", ["email"]);
        assert!(idx.unique);
        assert!(!idx.sparse);
        assert_eq!(idx.fields, vec!["email".to_string()]);

        let idx = IndexSpec::secondary("courses_instructor", ["instructorId"]).sparse();
        assert!(!idx.unique);
        assert!(idx.sparse);
    }

    #[test]
    fn test_index_spec_validate() {
        assert!(IndexSpec::unique("slots_room", ["room", "day"]).validate().is_ok());
        assert!(IndexSpec::unique("slots_room", Vec::<String>::new())
            .validate()
            .is_err());
        assert!(IndexSpec::unique("slots_room", ["room", "room"])
            .validate()
            .is_err());
        assert!(IndexSpec::unique("bad name", ["room"]).validate().is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("schedule_slots").is_ok());
        assert!(validate_identifier("_hidden").is_ok());
        assert!(validate_identifier("firstName").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1st").is_err());
        assert!(validate_identifier("a'; DROP TABLE x; --").is_err());
        assert!(validate_identifier("with.dot").is_err());
    }

    #[test]
    fn test_index_spec_serde() {
        let idx = IndexSpec::unique("x_unique", ["a", "b"]).sparse();
        let json = serde_json::to_string(&idx).unwrap();
        let back: IndexSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(idx, back);
    }
}
