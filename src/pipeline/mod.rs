//! Pipeline execution: milestone catalog, state machine, registry
//!
//! A pipeline is one end-to-end run of the milestone sequence for a single
//! upload/training session. The state machine owns the milestone list and
//! overall progress, advances milestones over time or on external events,
//! and fans out typed events over a broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod machine;
pub mod registry;

pub use machine::Pipeline;
pub use registry::PipelineRegistry;

// =============================================================================
// Milestone catalog
// =============================================================================

/// Milestone ids of the standard catalog.
pub const DATASET_UPLOADED: &str = "dataset_uploaded";
pub const SCHEMA_PROFILING: &str = "schema_profiling";
pub const PREPROCESSING_COMPLETE: &str = "preprocessing_complete";
pub const MODEL_SUGGESTIONS_READY: &str = "model_suggestions_ready";
pub const CODE_GENERATION: &str = "code_generation";
pub const TRAINING_IN_PROGRESS: &str = "training_in_progress";
pub const METRICS_RETURNED: &str = "metrics_returned";
pub const IMPROVEMENT_ITERATION: &str = "improvement_iteration";
pub const FINAL_MODEL_TRAINED: &str = "final_model_trained";
pub const MODEL_DEPLOYED: &str = "model_deployed";

/// Static display metadata for one catalog stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneSpec {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// The standard ordered stage catalog.
pub const MILESTONE_CATALOG: &[MilestoneSpec] = &[
    MilestoneSpec {
        id: DATASET_UPLOADED,
        title: "Dataset Uploaded",
        description: "Dataset file validated and received",
    },
    MilestoneSpec {
        id: SCHEMA_PROFILING,
        title: "Schema Profiling",
        description: "Preprocessing agent analyzing schema and data structure",
    },
    MilestoneSpec {
        id: PREPROCESSING_COMPLETE,
        title: "Preprocessing Complete",
        description: "Data cleaned, validated, and preprocessed",
    },
    MilestoneSpec {
        id: MODEL_SUGGESTIONS_READY,
        title: "Model Suggestions Ready",
        description: "Orchestration ranked model recommendations",
    },
    MilestoneSpec {
        id: CODE_GENERATION,
        title: "Code Generation",
        description: "Generating executable validation and training code",
    },
    MilestoneSpec {
        id: TRAINING_IN_PROGRESS,
        title: "Training in Progress",
        description: "Executor running experiments",
    },
    MilestoneSpec {
        id: METRICS_RETURNED,
        title: "Metrics Returned",
        description: "Training metrics and validation results received",
    },
    MilestoneSpec {
        id: IMPROVEMENT_ITERATION,
        title: "Improvement Iteration",
        description: "Improvement agent optimizing model performance",
    },
    MilestoneSpec {
        id: FINAL_MODEL_TRAINED,
        title: "Final Model Trained",
        description: "Model trained on full dataset",
    },
    MilestoneSpec {
        id: MODEL_DEPLOYED,
        title: "Model Deployed",
        description: "Deployment service deployed endpoint",
    },
];

// =============================================================================
// Milestone
// =============================================================================

/// Lifecycle status of a single milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl MilestoneStatus {
    /// Completed and Failed are terminal per milestone.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MilestoneStatus::Completed | MilestoneStatus::Failed)
    }

    /// Statuses only move forward: Pending -> Running -> Completed, or
    /// Pending/Running -> Failed.
    pub fn can_transition_to(&self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Completed) | (Pending, Failed) | (Running, Completed) | (Running, Failed)
        )
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Running => "running",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MilestoneStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MilestoneStatus::Pending),
            "running" => Ok(MilestoneStatus::Running),
            "completed" => Ok(MilestoneStatus::Completed),
            "failed" => Ok(MilestoneStatus::Failed),
            _ => Err(Error::Validation(format!("invalid milestone status: {s}"))),
        }
    }
}

/// One discrete, named stage of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: MilestoneStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Milestone {
    /// Build a pending milestone from its catalog entry.
    pub fn from_spec(spec: &MilestoneSpec) -> Self {
        Self {
            id: spec.id.to_string(),
            title: spec.title.to_string(),
            description: Some(spec.description.to_string()),
            status: MilestoneStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

// =============================================================================
// Pipeline state
// =============================================================================

/// Lifecycle status of the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Running => "running",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one pipeline run. Observers receive clones and must never
/// write back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub pipeline_id: String,
    pub milestones: Vec<Milestone>,
    /// 0..=100, recomputed on every milestone completion.
    pub overall_progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    /// Build an idle state with every catalog milestone pending.
    pub fn from_catalog(pipeline_id: &str, catalog: &[MilestoneSpec]) -> Self {
        Self {
            pipeline_id: pipeline_id.to_string(),
            milestones: catalog.iter().map(Milestone::from_spec).collect(),
            overall_progress: 0,
            current_stage: None,
            status: PipelineStatus::Idle,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn milestone(&self, milestone_id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id == milestone_id)
    }

    pub fn completed_count(&self) -> usize {
        self.milestones
            .iter()
            .filter(|m| m.status == MilestoneStatus::Completed)
            .count()
    }

    /// round(100 * completed / total), 0 for an empty catalog.
    pub fn computed_progress(&self) -> u8 {
        if self.milestones.is_empty() {
            return 0;
        }
        let ratio = self.completed_count() as f64 / self.milestones.len() as f64;
        (ratio * 100.0).round() as u8
    }
}

// =============================================================================
// Events
// =============================================================================

/// Typed event fanned out to subscribers on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_id: String,
        timestamp: DateTime<Utc>,
    },
    MilestoneStarted {
        milestone_id: String,
        timestamp: DateTime<Utc>,
    },
    MilestoneCompleted {
        milestone_id: String,
        overall_progress: u8,
        timestamp: DateTime<Utc>,
    },
    MilestoneFailed {
        milestone_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    PipelineCompleted {
        pipeline_id: String,
        timestamp: DateTime<Utc>,
    },
    PipelineFailed {
        pipeline_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Milestone id for milestone-scoped events.
    pub fn milestone_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::MilestoneStarted { milestone_id, .. }
            | PipelineEvent::MilestoneCompleted { milestone_id, .. }
            | PipelineEvent::MilestoneFailed { milestone_id, .. } => Some(milestone_id),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
