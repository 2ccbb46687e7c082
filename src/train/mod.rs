//! Model training: per-model state tracking, orchestration, metrics
//!
//! The orchestrator sequences opaque asynchronous training operations
//! supplied by a [`ModelTrainer`] collaborator, tracks one
//! [`ModelTrainingState`] per model, and records improvement iterations
//! against it.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::improve::ImprovementIteration;

pub mod metrics;
pub mod orchestrator;

pub use metrics::{synthesize_metrics, ModelMetrics};
pub use orchestrator::{ModelTrainer, SimulatedTrainer, TrainingOrchestrator};

/// Lifecycle status of one model's training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Training,
    Completed,
    Failed,
}

impl TrainingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStatus::Completed | TrainingStatus::Failed)
    }
}

impl std::fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrainingStatus::Pending => "pending",
            TrainingStatus::Training => "training",
            TrainingStatus::Completed => "completed",
            TrainingStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Tracked state for one model selected for training. Created when training
/// is requested, retained for the session, discarded on reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainingState {
    pub model_id: String,
    pub model_name: String,
    pub status: TrainingStatus,
    /// 0..=100, non-decreasing.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    pub improvement_iterations: u32,
    pub improvement_history: Vec<ImprovementIteration>,
    /// Wall-clock training duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl ModelTrainingState {
    pub fn new(model_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            status: TrainingStatus::Pending,
            progress: 0,
            metrics: None,
            improvement_iterations: 0,
            improvement_history: Vec::new(),
            execution_time: None,
        }
    }

    /// Append an improvement iteration, enforcing the configured maximum.
    /// The model's current metrics become the iteration's after-metrics.
    pub fn push_iteration(&mut self, iteration: ImprovementIteration, max_iterations: u32) -> Result<()> {
        if self.improvement_iterations >= max_iterations {
            return Err(Error::InvalidState(format!(
                "model {} already ran {max_iterations} improvement iterations",
                self.model_id
            )));
        }
        self.metrics = Some(iteration.after_metrics.clone());
        self.improvement_history.push(iteration);
        self.improvement_iterations += 1;
        Ok(())
    }
}
