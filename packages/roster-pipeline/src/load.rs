//! Load Coordinator: truncate, then bulk insert

use roster_storage::{CollectionStore, StorageError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub accepted: usize,
    pub rejected: usize,
    pub inserted_count: usize,
    /// Documents removed by the truncate
    pub removed: usize,
}

pub struct LoadCoordinator<'a> {
    store: &'a dyn CollectionStore,
}

impl<'a> LoadCoordinator<'a> {
    pub fn new(store: &'a dyn CollectionStore) -> Self {
        Self { store }
    }

    /// Replace the contents of `collection` with `documents`.
    ///
    /// The truncate is unconditional, so an empty accepted set leaves an empty
    /// collection. Any store failure is fatal for the stage.
    pub async fn replace(
        &self,
        collection: &str,
        documents: &[Value],
        rejected: usize,
    ) -> Result<LoadReport> {
        let removed = self
            .store
            .truncate(collection)
            .await
            .map_err(|e| PipelineError::store_write(collection, e))?;
        debug!(collection, removed, "Truncated collection");

        let inserted_count = if documents.is_empty() {
            0
        } else {
            self.store
                .insert_many(collection, documents)
                .await
                .map_err(|e| PipelineError::store_write(collection, e))?
        };

        if inserted_count != documents.len() {
            return Err(PipelineError::store_write(
                collection,
                StorageError::database(format!(
                    "inserted {} of {} documents",
                    inserted_count,
                    documents.len()
                )),
            ));
        }

        info!(
            collection,
            accepted = documents.len(),
            rejected,
            inserted = inserted_count,
            "Loaded collection"
        );

        Ok(LoadReport {
            accepted: documents.len(),
            rejected,
            inserted_count,
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_storage::SqliteCollectionStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_replace_removes_stale_documents() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        let loader = LoadCoordinator::new(&store);

        loader
            .replace("courses", &[json!({"id": "OLD001"}), json!({"id": "OLD002"})], 0)
            .await
            .unwrap();
        let report = loader
            .replace("courses", &[json!({"id": "CUR001"})], 2)
            .await
            .unwrap();

        assert_eq!(
            report,
            LoadReport {
                accepted: 1,
                rejected: 2,
                inserted_count: 1,
                removed: 2,
            }
        );
        let docs = store.find_all("courses").await.unwrap();
        assert_eq!(docs, vec![json!({"id": "CUR001"})]);
    }

    #[tokio::test]
    async fn test_empty_set_still_truncates() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        let loader = LoadCoordinator::new(&store);

        loader
            .replace("learners", &[json!({"id": "EST001"})], 0)
            .await
            .unwrap();
        let report = loader.replace("learners", &[], 0).await.unwrap();

        assert_eq!(report.inserted_count, 0);
        assert_eq!(store.count("learners").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_collection_name_is_store_write_error() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        let err = LoadCoordinator::new(&store)
            .replace("bad name", &[json!({})], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StoreWrite { .. }));
    }
}
