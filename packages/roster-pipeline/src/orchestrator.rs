//! Pipeline Orchestrator: runs the entity stages in plan order against one store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use roster_storage::{CollectionStore, SqliteCollectionStore};
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::entities::{Course, EntityKind, Instructor, Learner, ScheduleSlot};
use crate::error::{PipelineError, Result};
use crate::plan::LoadPlan;
use crate::run::{RunStatus, RunTracker, StagePhase};
use crate::stage::{EntityStage, StageContext, StageHandler, StageReport};

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// One entry per collection, in load order
    pub collections: Vec<StageReport>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn collection(&self, name: &str) -> Option<&StageReport> {
        self.collections.iter().find(|c| c.collection == name)
    }

    pub fn documents_loaded(&self) -> usize {
        self.collections.iter().map(|c| c.documents_loaded).sum()
    }
}

/// Runs the load plan against one store, strictly in order
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    id_pattern: Regex,
    plan: LoadPlan,
    stage_handlers: HashMap<EntityKind, Arc<dyn StageHandler>>,
}

impl PipelineOrchestrator {
    /// Validate `config` and register the standard handler for every entity
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let id_pattern = config.validation.compiled_id_pattern()?;

        let mut orchestrator = Self {
            config,
            id_pattern,
            plan: LoadPlan::standard()?,
            stage_handlers: HashMap::new(),
        };
        orchestrator.register_handler(Arc::new(EntityStage::<Instructor>::new()));
        orchestrator.register_handler(Arc::new(EntityStage::<Course>::new()));
        orchestrator.register_handler(Arc::new(EntityStage::<Learner>::new()));
        orchestrator.register_handler(Arc::new(EntityStage::<ScheduleSlot>::new()));
        Ok(orchestrator)
    }

    /// Register a stage handler, replacing any handler for the same entity
    pub fn register_handler(&mut self, handler: Arc<dyn StageHandler>) {
        self.stage_handlers.insert(handler.entity(), handler);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn plan(&self) -> &LoadPlan {
        &self.plan
    }

    /// Open the configured store, run every stage, then release the store
    pub async fn run(&self) -> Result<RunSummary> {
        let store = SqliteCollectionStore::open(&self.config.store.path)
            .map_err(PipelineError::connection)?;
        info!(path = %self.config.store.path.display(), "Opened store");

        let mut tracker = RunTracker::new();
        let outcome = self.execute(&store, &mut tracker).await;

        let closed = store.close();
        let summary = outcome?;
        closed.map_err(PipelineError::connection)?;
        Ok(summary)
    }

    /// Run against a store the caller owns
    pub async fn run_with_store(&self, store: &dyn CollectionStore) -> Result<RunSummary> {
        let mut tracker = RunTracker::new();
        self.execute(store, &mut tracker).await
    }

    /// Run every stage in plan order; the first fatal failure marks that
    /// entity Failed and leaves the remaining entities Idle.
    pub async fn execute(
        &self,
        store: &dyn CollectionStore,
        tracker: &mut RunTracker,
    ) -> Result<RunSummary> {
        let run_id = tracker.run_id();
        let span = info_span!("run", run_id = %run_id);
        self.execute_stages(store, tracker).instrument(span).await
    }

    async fn execute_stages(
        &self,
        store: &dyn CollectionStore,
        tracker: &mut RunTracker,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let ctx = StageContext {
            run_id: tracker.run_id(),
            store,
            config: &self.config,
            id_pattern: &self.id_pattern,
        };

        info!("Execution plan:\n{}", self.plan.execution_plan());

        let mut collections = Vec::with_capacity(self.plan.stages().len());
        for stage in self.plan.stages() {
            let handler = self.stage_handlers.get(&stage.entity).ok_or_else(|| {
                PipelineError::Plan(format!("no handler registered for {}", stage.entity))
            })?;

            let span = info_span!("stage", entity = %stage.entity);
            match handler.execute(&ctx, tracker).instrument(span).await {
                Ok(report) => collections.push(report),
                Err(e) => return Err(self.abort(tracker, stage.entity, e)),
            }
        }

        let summary = RunSummary {
            run_id: tracker.run_id(),
            status: tracker.status(),
            collections,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            loaded = summary.documents_loaded(),
            duration_ms = summary.duration_ms,
            "Run complete"
        );
        Ok(summary)
    }

    /// Record the failure on the tracker and name entity and phase in the error
    fn abort(&self, tracker: &mut RunTracker, entity: EntityKind, err: PipelineError) -> PipelineError {
        let phase = err
            .stage()
            .map(|(_, phase)| phase)
            .or_else(|| tracker.current_phase(entity))
            .unwrap_or(StagePhase::Extracting);
        let err = err.in_stage(entity, phase);

        if tracker.current_phase(entity).is_some() {
            if let Err(transition) = tracker.fail(entity, phase, err.to_string()) {
                error!(entity = %entity, error = %transition, "Could not record failure");
            }
        }
        error!(entity = %entity, phase = %phase, error = %err, "Stage failed; aborting run");
        err
    }
}
