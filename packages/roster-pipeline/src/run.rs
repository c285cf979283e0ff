//! Run tracking: per-entity phase state machine

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::EntityKind;
use crate::error::{PipelineError, Result};

/// Sub-stage of one entity's run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    Extracting,
    Validating,
    Loading,
    Indexing,
}

impl StagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagePhase::Extracting => "extracting",
            StagePhase::Validating => "validating",
            StagePhase::Loading => "loading",
            StagePhase::Indexing => "indexing",
        }
    }

    /// Phase that may follow this one
    fn next(&self) -> Option<StagePhase> {
        match self {
            StagePhase::Extracting => Some(StagePhase::Validating),
            StagePhase::Validating => Some(StagePhase::Loading),
            StagePhase::Loading => Some(StagePhase::Indexing),
            StagePhase::Indexing => None,
        }
    }
}

impl std::fmt::Display for StagePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-entity state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityState {
    Idle,
    Running {
        phase: StagePhase,
        started_at: DateTime<Utc>,
    },
    Done {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        documents_loaded: usize,
    },
    Failed {
        failed_at: DateTime<Utc>,
        phase: StagePhase,
        error: String,
    },
}

impl EntityState {
    pub fn state_name(&self) -> &'static str {
        match self {
            EntityState::Idle => "idle",
            EntityState::Running { phase, .. } => phase.as_str(),
            EntityState::Done { .. } => "done",
            EntityState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntityState::Done { .. } | EntityState::Failed { .. })
    }
}

/// Outcome of the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// State machine over the four entity stages
#[derive(Debug, Clone)]
pub struct RunTracker {
    run_id: Uuid,
    states: BTreeMap<EntityKind, EntityState>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            states: EntityKind::ALL
                .iter()
                .map(|k| (*k, EntityState::Idle))
                .collect(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self, entity: EntityKind) -> &EntityState {
        static IDLE: EntityState = EntityState::Idle;
        self.states.get(&entity).unwrap_or(&IDLE)
    }

    fn invalid(&self, entity: EntityKind, to: &str) -> PipelineError {
        PipelineError::InvalidStateTransition {
            entity,
            from: self.state(entity).state_name().to_string(),
            to: to.to_string(),
        }
    }

    /// Transition: IDLE → EXTRACTING → VALIDATING → LOADING → INDEXING
    pub fn advance(&mut self, entity: EntityKind, phase: StagePhase) -> Result<()> {
        let next = match self.state(entity) {
            EntityState::Idle if phase == StagePhase::Extracting => EntityState::Running {
                phase,
                started_at: Utc::now(),
            },
            EntityState::Running {
                phase: current,
                started_at,
            } if current.next() == Some(phase) => EntityState::Running {
                phase,
                started_at: *started_at,
            },
            _ => return Err(self.invalid(entity, phase.as_str())),
        };
        self.states.insert(entity, next);
        Ok(())
    }

    /// Transition: INDEXING → DONE
    pub fn complete(&mut self, entity: EntityKind, documents_loaded: usize) -> Result<()> {
        match self.state(entity) {
            EntityState::Running {
                phase: StagePhase::Indexing,
                started_at,
            } => {
                let done = EntityState::Done {
                    started_at: *started_at,
                    completed_at: Utc::now(),
                    documents_loaded,
                };
                self.states.insert(entity, done);
                Ok(())
            }
            _ => Err(self.invalid(entity, "done")),
        }
    }

    /// Transition: RUNNING → FAILED
    pub fn fail(&mut self, entity: EntityKind, phase: StagePhase, error: String) -> Result<()> {
        match self.state(entity) {
            EntityState::Running { .. } => {
                let failed = EntityState::Failed {
                    failed_at: Utc::now(),
                    phase,
                    error,
                };
                self.states.insert(entity, failed);
                Ok(())
            }
            _ => Err(self.invalid(entity, "failed")),
        }
    }

    /// Phase the entity is currently in, if running
    pub fn current_phase(&self, entity: EntityKind) -> Option<StagePhase> {
        match self.state(entity) {
            EntityState::Running { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub fn status(&self) -> RunStatus {
        let states: Vec<_> = self.states.values().collect();
        if states.iter().any(|s| matches!(s, EntityState::Failed { .. })) {
            RunStatus::Failed
        } else if states.iter().all(|s| matches!(s, EntityState::Done { .. })) {
            RunStatus::Done
        } else if states.iter().all(|s| matches!(s, EntityState::Idle)) {
            RunStatus::Pending
        } else {
            RunStatus::Running
        }
    }
}
