//! Load plan: entity dependency order

use std::collections::HashSet;

use crate::entities::EntityKind;
use crate::error::{PipelineError, Result};

/// Stage node in the load plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNode {
    pub entity: EntityKind,
    pub name: &'static str,
    pub dependencies: Vec<EntityKind>,
}

impl StageNode {
    pub fn new(entity: EntityKind, name: &'static str, dependencies: Vec<EntityKind>) -> Self {
        Self {
            entity,
            name,
            dependencies,
        }
    }
}

/// Fixed, strictly sequential stage order
#[derive(Debug, Clone)]
pub struct LoadPlan {
    stages: Vec<StageNode>,
}

impl LoadPlan {
    /// Build a plan from stages in execution order
    pub fn new(stages: Vec<StageNode>) -> Result<Self> {
        let mut seen = HashSet::new();

        for stage in &stages {
            for dep in &stage.dependencies {
                if !stages.iter().any(|s| s.entity == *dep) {
                    return Err(PipelineError::Plan(format!(
                        "{} depends on {}, which is not in the plan",
                        stage.entity, dep
                    )));
                }
                if !seen.contains(dep) {
                    return Err(PipelineError::Plan(format!(
                        "{} must run after {}",
                        stage.entity, dep
                    )));
                }
            }
            if !seen.insert(stage.entity) {
                return Err(PipelineError::Plan(format!(
                    "{} appears more than once",
                    stage.entity
                )));
            }
        }

        Ok(Self { stages })
    }

    /// Instructor → Course → Learner → ScheduleSlot
    pub fn standard() -> Result<Self> {
        let names = ["Instructors", "Courses", "Learners", "Schedule slots"];
        let stages = EntityKind::ALL
            .iter()
            .zip(names)
            .map(|(kind, name)| StageNode::new(*kind, name, kind.dependencies().to_vec()))
            .collect();
        Self::new(stages)
    }

    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    pub fn order(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.stages.iter().map(|s| s.entity)
    }

    /// Execution plan as string (for logging)
    pub fn execution_plan(&self) -> String {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                if stage.dependencies.is_empty() {
                    format!("Stage {}: {}", i + 1, stage.name)
                } else {
                    let deps: Vec<_> = stage.dependencies.iter().map(|d| d.as_str()).collect();
                    format!("Stage {}: {} (after {})", i + 1, stage.name, deps.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
