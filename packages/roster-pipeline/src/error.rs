use roster_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::entities::EntityKind;
use crate::run::StagePhase;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Stage-level failures. Per-record violations never become a `PipelineError`;
/// they are reported as violation lists and the record is skipped.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error for {entity}: {message}")]
    Parse {
        entity: EntityKind,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    #[error("Store write failed for {collection}: {source}")]
    StoreWrite {
        collection: String,
        #[source]
        source: StorageError,
    },

    #[error("Index {index} on {collection} could not be {action}: {source}")]
    Index {
        collection: String,
        index: String,
        action: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Store connection error: {0}")]
    Connection(#[source] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: EntityKind,
        from: String,
        to: String,
    },

    #[error("Load plan error: {0}")]
    Plan(String),

    #[error("{entity} stage failed while {phase}: {source}")]
    StageFailed {
        entity: EntityKind,
        phase: StagePhase,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn parse(entity: EntityKind, message: impl Into<String>) -> Self {
        Self::Parse {
            entity,
            message: message.into(),
            source: None,
        }
    }

    pub fn store_write(collection: &str, source: StorageError) -> Self {
        Self::StoreWrite {
            collection: collection.to_string(),
            source,
        }
    }

    /// Read access to an earlier collection failed: a dropped connection or
    /// engine failure, never a data problem.
    pub fn connection(source: StorageError) -> Self {
        Self::Connection(source)
    }

    /// Wrap a failure with the entity and phase it happened in
    pub fn in_stage(self, entity: EntityKind, phase: StagePhase) -> Self {
        match self {
            already @ PipelineError::StageFailed { .. } => already,
            other => PipelineError::StageFailed {
                entity,
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The failure beneath any stage wrapper
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Entity and phase of a stage failure
    pub fn stage(&self) -> Option<(EntityKind, StagePhase)> {
        match self {
            PipelineError::StageFailed { entity, phase, .. } => Some((*entity, *phase)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = PipelineError::parse(EntityKind::Course, "cannot open courses.csv")
            .in_stage(EntityKind::Course, StagePhase::Extracting)
            .in_stage(EntityKind::Learner, StagePhase::Loading);

        assert_eq!(
            err.stage(),
            Some((EntityKind::Course, StagePhase::Extracting))
        );
        assert!(matches!(err.root(), PipelineError::Parse { .. }));
    }

    #[test]
    fn test_stage_failure_message_names_entity_and_phase() {
        let err = PipelineError::store_write(
            "courses",
            StorageError::constraint("UNIQUE constraint failed"),
        )
        .in_stage(EntityKind::Course, StagePhase::Loading);

        let msg = err.to_string();
        assert!(msg.contains("course"));
        assert!(msg.contains("loading"));
        assert!(msg.contains("UNIQUE constraint failed"));
    }
}
