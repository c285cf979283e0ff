//! Entity stages
//!
//! One `EntityStage<E>` per collection drives its records through
//! extract, transform, validate, load and index. Rejected records are
//! logged one warning each and never reach the store.

use std::fs::File;
use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use roster_storage::{CollectionStore, StorageError};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::entities::{Entity, EntityKind};
use crate::error::{PipelineError, Result};
use crate::extract::{open_source, RecordStream};
use crate::indexes::IndexManager;
use crate::load::LoadCoordinator;
use crate::run::{RunTracker, StagePhase};
use crate::validation::{KnownIds, ReferentialValidator};

/// Everything a stage borrows from the run
pub struct StageContext<'a> {
    pub run_id: Uuid,
    pub store: &'a dyn CollectionStore,
    pub config: &'a PipelineConfig,
    pub id_pattern: &'a Regex,
}

/// Per-entity outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub collection: String,
    pub documents_loaded: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub malformed_rows: usize,
    pub duration_ms: u64,
}

/// Stage handler trait (one per entity kind)
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn entity(&self) -> EntityKind;

    /// Run extract → validate → load → index, advancing `tracker` as it goes.
    /// Errors come back wrapped in [`PipelineError::StageFailed`].
    async fn execute(&self, ctx: &StageContext<'_>, tracker: &mut RunTracker)
        -> Result<StageReport>;
}

/// The standard stage for entity shape `E`
pub struct EntityStage<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E> Default for EntityStage<E> {
    fn default() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityStage<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parent id sets, read from the store; `None` when enforcement is off
    async fn known_ids(&self, ctx: &StageContext<'_>) -> Result<Option<KnownIds>> {
        if !ctx.config.validation.enforce_references {
            return Ok(None);
        }
        let mut known = KnownIds::new();
        for parent in E::KIND.dependencies() {
            let ids = ctx
                .store
                .field_values(parent.collection(), "id")
                .await
                .map_err(PipelineError::connection)?;
            debug!(entity = %E::KIND, parent = %parent, count = ids.len(), "Loaded parent ids");
            known.insert(*parent, ids);
        }
        Ok(Some(known))
    }

    /// Open the source and warn once about missing required columns
    fn extract(&self, ctx: &StageContext<'_>) -> Result<RecordStream<File>> {
        let path = ctx.config.sources.path_for(E::KIND);
        let rows = open_source(E::KIND, &path, ctx.config.sources.delimiter_byte())?;

        let rules = E::rules(ctx.id_pattern);
        let missing = rows.missing_columns(E::COLUMNS, rules.required_fields());
        if !missing.is_empty() && !rows.headers().is_empty() {
            warn!(
                entity = %E::KIND,
                path = %path.display(),
                missing = %missing.join(", "),
                "Source is missing required columns"
            );
        }
        Ok(rows)
    }

    /// Validate every row; accepted records come back as documents in source order
    fn validate(
        &self,
        ctx: &StageContext<'_>,
        rows: &mut RecordStream<File>,
        known: Option<KnownIds>,
    ) -> Result<(Vec<serde_json::Value>, usize)> {
        let rules = E::rules(ctx.id_pattern);
        let mut referential = ReferentialValidator::new(&rules, known);
        let mut accepted = Vec::new();
        let mut rejected = 0;

        for row in rows {
            let raw = row?;
            let candidate = E::from_raw(&raw);

            let mut violations = rules.check(&candidate);
            if violations.is_empty() {
                if let Err(refused) = referential.admit(&candidate) {
                    violations = refused;
                }
            }

            if !violations.is_empty() {
                rejected += 1;
                warn!(
                    entity = %E::KIND,
                    record_id = candidate.record_id(),
                    line = raw.line(),
                    violations = ?violations,
                    "Rejected record"
                );
                continue;
            }

            let document = serde_json::to_value(&candidate).map_err(|e| {
                PipelineError::store_write(E::KIND.collection(), StorageError::from(e))
            })?;
            accepted.push(document);
        }

        Ok((accepted, rejected))
    }

    async fn run(&self, ctx: &StageContext<'_>, tracker: &mut RunTracker) -> Result<StageReport> {
        let entity = E::KIND;
        let started = Instant::now();

        tracker.advance(entity, StagePhase::Extracting)?;
        let mut rows = self.extract(ctx)?;
        let known = self.known_ids(ctx).await?;

        tracker.advance(entity, StagePhase::Validating)?;
        let (documents, rejected) = self.validate(ctx, &mut rows, known)?;
        let malformed = rows.stats().malformed;

        tracker.advance(entity, StagePhase::Loading)?;
        let load = LoadCoordinator::new(ctx.store)
            .replace(entity.collection(), &documents, rejected)
            .await?;

        tracker.advance(entity, StagePhase::Indexing)?;
        IndexManager::new(ctx.store).rebuild(entity).await?;

        tracker.complete(entity, load.inserted_count)?;

        let report = StageReport {
            collection: entity.collection().to_string(),
            documents_loaded: load.inserted_count,
            accepted: load.accepted,
            rejected: load.rejected,
            malformed_rows: malformed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            run_id = %ctx.run_id,
            entity = %entity,
            loaded = report.documents_loaded,
            rejected = report.rejected,
            malformed = report.malformed_rows,
            duration_ms = report.duration_ms,
            "Stage complete"
        );
        Ok(report)
    }
}

#[async_trait]
impl<E: Entity> StageHandler for EntityStage<E> {
    fn entity(&self) -> EntityKind {
        E::KIND
    }

    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        tracker: &mut RunTracker,
    ) -> Result<StageReport> {
        match self.run(ctx, tracker).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let phase = tracker
                    .current_phase(E::KIND)
                    .unwrap_or(StagePhase::Extracting);
                Err(e.in_stage(E::KIND, phase))
            }
        }
    }
}
