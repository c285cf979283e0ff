//! Index Manager
//!
//! After a load, every non-default index on the collection is dropped and the
//! declared set is created again. Dropping an index that is already gone is a
//! no-op; a failed create aborts the run.

use roster_storage::{CollectionStore, IndexSpec};
use tracing::{debug, info};

use crate::entities::EntityKind;
use crate::error::{PipelineError, Result};

/// Index set for one collection
pub fn declared_indexes(entity: EntityKind) -> Vec<IndexSpec> {
    let c = entity.collection();
    let name = |suffix: &str| format!("{c}_{suffix}");

    match entity {
        EntityKind::Instructor => vec![
            IndexSpec::unique(name("id_unique"), ["id"]),
            IndexSpec::unique(name("email_unique"), ["email"]),
            IndexSpec::unique(name("identification_number_unique"), ["identificationNumber"])
                .sparse(),
            IndexSpec::secondary(name("specialty"), ["specialty"]),
        ],
        EntityKind::Course => vec![
            IndexSpec::unique(name("id_unique"), ["id"]),
            IndexSpec::secondary(name("instructor_id"), ["instructorId"]),
            IndexSpec::secondary(name("level"), ["level"]),
        ],
        EntityKind::Learner => vec![
            IndexSpec::unique(name("id_unique"), ["id"]),
            IndexSpec::unique(name("email_unique"), ["email"]),
            IndexSpec::unique(name("identification_number_unique"), ["identificationNumber"]),
            IndexSpec::secondary(name("registration_date"), ["registrationDate"]),
        ],
        EntityKind::ScheduleSlot => vec![
            IndexSpec::unique(name("id_unique"), ["id"]),
            IndexSpec::secondary(name("course_id"), ["courseId"]),
            IndexSpec::secondary(name("instructor_id"), ["instructorId"]),
            IndexSpec::secondary(name("day_time"), ["day", "startTime", "endTime"]),
            IndexSpec::unique(name("room_slot_unique"), ["room", "day", "startTime", "endTime"]),
        ],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub dropped: usize,
    pub created: usize,
}

pub struct IndexManager<'a> {
    store: &'a dyn CollectionStore,
}

impl<'a> IndexManager<'a> {
    pub fn new(store: &'a dyn CollectionStore) -> Self {
        Self { store }
    }

    pub async fn rebuild(&self, entity: EntityKind) -> Result<IndexReport> {
        let collection = entity.collection();
        let mut report = IndexReport::default();

        let existing = self
            .store
            .list_indexes(collection)
            .await
            .map_err(PipelineError::connection)?;

        for index in existing {
            match self.store.drop_index(collection, &index).await {
                Ok(true) => report.dropped += 1,
                Ok(false) => debug!(collection, index = %index, "Index already gone"),
                Err(source) => {
                    return Err(PipelineError::Index {
                        collection: collection.to_string(),
                        index,
                        action: "dropped",
                        source,
                    })
                }
            }
        }

        for spec in declared_indexes(entity) {
            self.store
                .create_index(collection, &spec)
                .await
                .map_err(|source| PipelineError::Index {
                    collection: collection.to_string(),
                    index: spec.name.clone(),
                    action: "created",
                    source,
                })?;
            report.created += 1;
        }

        info!(
            collection,
            dropped = report.dropped,
            created = report.created,
            "Rebuilt indexes"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_storage::SqliteCollectionStore;
    use serde_json::json;

    #[test]
    fn test_declared_sets_are_valid() {
        for entity in EntityKind::ALL {
            let specs = declared_indexes(entity);
            assert!(specs.iter().any(|s| s.unique && s.fields == vec!["id".to_string()]));
            for spec in specs {
                spec.validate().unwrap();
                assert!(spec.name.starts_with(entity.collection()));
            }
        }
    }

    #[tokio::test]
    async fn test_rebuild_is_repeatable() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        let manager = IndexManager::new(&store);

        let first = manager.rebuild(EntityKind::Course).await.unwrap();
        assert_eq!(first, IndexReport { dropped: 0, created: 3 });

        let second = manager.rebuild(EntityKind::Course).await.unwrap();
        assert_eq!(second, IndexReport { dropped: 3, created: 3 });

        let mut names = store.list_indexes("courses").await.unwrap();
        names.sort();
        assert_eq!(
            names,
            vec!["courses_id_unique", "courses_instructor_id", "courses_level"]
        );
    }

    #[tokio::test]
    async fn test_stray_index_is_dropped() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        store
            .create_index("learners", &IndexSpec::secondary("learners_legacy", ["codigo"]))
            .await
            .unwrap();

        let report = IndexManager::new(&store).rebuild(EntityKind::Learner).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(!store
            .list_indexes("learners")
            .await
            .unwrap()
            .contains(&"learners_legacy".to_string()));
    }

    #[tokio::test]
    async fn test_create_failure_is_fatal() {
        let store = SqliteCollectionStore::in_memory().unwrap();
        store
            .insert_many(
                "instructors",
                &[json!({"id": "PRF001", "email": "a@x.co"}), json!({"id": "PRF001", "email": "b@x.co"})],
            )
            .await
            .unwrap();

        let err = IndexManager::new(&store)
            .rebuild(EntityKind::Instructor)
            .await
            .unwrap_err();
        match err {
            PipelineError::Index { index, action, .. } => {
                assert_eq!(index, "instructors_id_unique");
                assert_eq!(action, "created");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
