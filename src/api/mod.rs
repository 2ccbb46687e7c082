//! Collaborator interfaces
//!
//! The core consumes two opaque backends: a dataset/training backend and a
//! deployment backend. Any transport is acceptable; the contract is
//! asynchronous request/response with the typed error payload from
//! [`crate::error`]. The default in-process implementation lives in
//! [`mock`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::train::ModelMetrics;

pub mod mock;

pub use mock::MockBackend;

// =============================================================================
// Dataset upload
// =============================================================================

/// Upload request. The file itself is opaque to the core; only the name
/// (for validation) and size travel through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetUpload {
    pub file_name: String,
    pub size_bytes: u64,
}

impl DatasetUpload {
    pub fn new(file_name: impl Into<String>, size_bytes: u64) -> Self {
        Self { file_name: file_name.into(), size_bytes }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub nullable: bool,
    pub sample_values: Vec<serde_json::Value>,
}

/// Profiling summary returned with a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: u64,
    pub column_count: u32,
    pub columns: Vec<ColumnInfo>,
    pub data_types: HashMap<String, String>,
    pub missing_values: HashMap<String, u64>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub dataset_id: String,
    pub profile: DatasetProfile,
}

// =============================================================================
// Model suggestions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classification,
    Regression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
    pub kind: ModelKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_accuracy: Option<f64>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub recommended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSuggestions {
    pub models: Vec<ModelOption>,
    pub recommended_model_id: String,
    pub reasoning: String,
}

// =============================================================================
// Training runs
// =============================================================================

/// Phase of a backend training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed | RunPhase::Stopped)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Pending => "pending",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Polled snapshot of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRunStatus {
    pub training_id: String,
    pub phase: RunPhase,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub elapsed_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Final results of a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResults {
    pub training_id: String,
    pub model_id: String,
    pub metrics: ModelMetrics,
    pub feature_importance: Vec<FeatureImportance>,
    pub model_summary: String,
    pub duration_secs: u64,
    pub finished_at: DateTime<Utc>,
    pub download_url: String,
    pub endpoint: String,
}

// =============================================================================
// Deployment
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployOutcome {
    pub success: bool,
    pub endpoint: String,
    pub message: String,
}

// =============================================================================
// Backend traits
// =============================================================================

/// Dataset and training collaborator.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    async fn upload_dataset(&self, upload: DatasetUpload) -> Result<UploadResponse>;

    async fn model_suggestions(&self, dataset_id: &str) -> Result<ModelSuggestions>;

    /// Begin a run; returns the training id to poll with.
    async fn start_training(&self, dataset_id: &str, model_id: &str) -> Result<String>;

    async fn training_status(&self, training_id: &str) -> Result<TrainingRunStatus>;

    /// Stop a run that is still in flight.
    async fn stop_training(&self, training_id: &str) -> Result<()>;

    /// Results become available once the run completes.
    async fn training_results(&self, training_id: &str) -> Result<TrainingResults>;
}

/// Deployment collaborator.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    async fn deploy(&self, model_id: &str) -> Result<DeployOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_phase_finished() {
        assert!(RunPhase::Completed.is_finished());
        assert!(RunPhase::Failed.is_finished());
        assert!(RunPhase::Stopped.is_finished());
        assert!(!RunPhase::Pending.is_finished());
        assert!(!RunPhase::Running.is_finished());
    }

    #[test]
    fn test_status_serialization_shape() {
        let status = TrainingRunStatus {
            training_id: "training-1".into(),
            phase: RunPhase::Running,
            progress: 40,
            current_step: Some("Training model...".into()),
            elapsed_secs: 12,
            eta_secs: Some(18),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"phase\":\"running\""));
        assert!(json.contains("\"progress\":40"));
    }
}
