/*
 * Roster Pipeline - validation-and-load for school records
 *
 * Turns four flat sources (instructors, courses, learners, schedule slots)
 * into schema-valid, referentially consistent document collections.
 *
 * Architecture:
 * - Record Extractor (lazy CSV rows)
 * - Field Transformer (typed candidates, three-state cells)
 * - Validation Engine (declarative rule tables)
 * - Referential Validator (intervals, uniqueness, references, room overlaps)
 * - Load Coordinator (truncate + bulk insert)
 * - Index Manager (drop + rebuild)
 * - Pipeline Orchestrator (fixed order, per-entity state machine)
 */

pub mod config;
pub mod entities;
pub mod error;
pub mod extract;
pub mod indexes;
pub mod load;
pub mod orchestrator;
pub mod plan;
pub mod run;
pub mod stage;
pub mod transform;
pub mod validation;

// Re-exports
pub use config::{ConfigError, PipelineConfig};
pub use entities::{Course, Entity, EntityKind, Instructor, Learner, ScheduleSlot};
pub use error::{PipelineError, Result};
pub use extract::{open_source, RawRecord, RecordStream};
pub use indexes::{declared_indexes, IndexManager};
pub use load::{LoadCoordinator, LoadReport};
pub use orchestrator::{PipelineOrchestrator, RunSummary};
pub use plan::{LoadPlan, StageNode};
pub use run::{EntityState, RunStatus, RunTracker, StagePhase};
pub use stage::{EntityStage, StageContext, StageHandler, StageReport};
pub use transform::Parsed;
pub use validation::{KnownIds, ReferentialValidator, RuleTable};
