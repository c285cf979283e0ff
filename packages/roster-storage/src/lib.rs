//! roster-storage - document collections for the roster load pipeline
//!
//! ## Core Principles
//!
//! 1. **Collections, not tables**: records are stored as JSON documents; the
//!    store never interprets a document beyond the fields an index names.
//! 2. **Replace, not upsert**: the pipeline truncates a collection and
//!    bulk-inserts the new contents; `insert_many` is all-or-nothing.
//! 3. **Indexes are declarative**: every non-default index is described by an
//!    [`IndexSpec`] and can be dropped and rebuilt at will.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roster_storage::{CollectionStore, IndexSpec, SqliteCollectionStore};
//!
//! let store = SqliteCollectionStore::open("roster.db")?;
//! store.truncate("courses").await?;
//! store.insert_many("courses", &documents).await?;
//! store.create_index("courses", &IndexSpec::unique("courses_id_unique", ["id"])).await?;
//! store.close()?;
//! ```

pub mod domain;
pub mod error;

#[cfg(feature = "sqlite")]
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{validate_identifier, CollectionStore, IndexSpec};

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteCollectionStore;
