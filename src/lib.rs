//! # Canalizar: ML Workflow Pipeline & Improvement Core
//!
//! Canalizar tracks a multi-stage, partially-asynchronous ML workflow as a
//! sequence of named milestones, orchestrates concurrent model training,
//! and drives iterative improvement passes over a model's metrics.
//!
//! ## Architecture
//!
//! - **pipeline**: milestone catalog, per-run state machine, registry
//! - **train**: training orchestration, per-model state, metrics synthesis
//! - **improve**: technique catalog and the improvement iteration engine
//! - **decision**: review-checkpoint policy and two-stage cancellation
//! - **api**: collaborator traits plus the in-process mock backend
//! - **session**: the facade wiring one workflow end to end
//!
//! ## Example
//!
//! ```no_run
//! use canalizar::api::DatasetUpload;
//! use canalizar::config::SessionConfig;
//! use canalizar::decision::UserAction;
//! use canalizar::session::WorkflowSession;
//!
//! # async fn demo() -> canalizar::Result<()> {
//! let mut session = WorkflowSession::new(SessionConfig::default());
//! session.upload(DatasetUpload::new("churn.csv", 64 * 1024)).await?;
//!
//! session
//!     .train_models(&[("model_random_forest".into(), "Random Forest".into())])
//!     .await?;
//! session.select_model("model_random_forest")?;
//!
//! session.decide(UserAction::SendToImprovement).await?;
//! session.decide(UserAction::ProceedToDeployment).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod decision;
pub mod error;
pub mod improve;
pub mod pipeline;
pub mod session;
pub mod train;

// Re-export commonly used types
pub use config::{SessionConfig, TimingConfig};
pub use error::{Error, ErrorPayload, Result};
pub use pipeline::{Milestone, MilestoneStatus, Pipeline, PipelineEvent, PipelineState};
pub use session::{DecisionOutcome, WorkflowSession};
pub use train::{ModelMetrics, ModelTrainingState, TrainingOrchestrator};
