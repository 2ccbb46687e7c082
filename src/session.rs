//! Workflow session
//!
//! Owns one end-to-end workflow: the current pipeline, the per-model
//! training states, the selected model, and decision handling. Exactly one
//! pipeline is current per session; uploading a new dataset resets the
//! previous run first.

use std::sync::Arc;

use log::{debug, info};

use crate::api::{
    DatasetUpload, DeployOutcome, DeploymentBackend, MockBackend, ModelSuggestions,
    TrainingBackend, UploadResponse,
};
use crate::config::SessionConfig;
use crate::decision::{available_actions, CancellationGuard, ReviewStage, UserAction};
use crate::error::{Error, Result};
use crate::improve::{ImprovementEngine, ImprovementIteration};
use crate::pipeline::{
    MilestoneStatus, Pipeline, FINAL_MODEL_TRAINED, IMPROVEMENT_ITERATION, METRICS_RETURNED,
    MODEL_DEPLOYED, MODEL_SUGGESTIONS_READY, TRAINING_IN_PROGRESS,
};
use crate::train::{ModelTrainingState, TrainingOrchestrator, TrainingStatus};

/// What a review decision produced.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    /// The model was deployed; the workflow is over for this model.
    Deployed(DeployOutcome),
    /// One more improvement iteration ran and was recorded.
    Improved(ImprovementIteration),
    /// The model was discarded; back to model selection.
    Reselect,
}

pub struct WorkflowSession {
    backend: Arc<dyn TrainingBackend>,
    deployer: Arc<dyn DeploymentBackend>,
    pipeline: Pipeline,
    orchestrator: TrainingOrchestrator,
    engine: ImprovementEngine,
    config: SessionConfig,
    dataset_id: Option<String>,
    selected_model: Option<String>,
    cancel: CancellationGuard,
}

impl WorkflowSession {
    /// Session wired to the in-process mock collaborators.
    pub fn new(config: SessionConfig) -> Self {
        let backend = Arc::new(MockBackend::new(config.timing.clone(), config.confusion_total));
        Self::with_backends(config, backend.clone(), backend)
    }

    /// Session over custom collaborators.
    pub fn with_backends(
        config: SessionConfig,
        backend: Arc<dyn TrainingBackend>,
        deployer: Arc<dyn DeploymentBackend>,
    ) -> Self {
        Self {
            backend,
            deployer,
            pipeline: Pipeline::new(config.timing.clone()),
            orchestrator: TrainingOrchestrator::simulated(
                config.timing.clone(),
                config.confusion_total,
            ),
            engine: ImprovementEngine::new(config.timing.clone(), config.confusion_total),
            config,
            dataset_id: None,
            selected_model: None,
            cancel: CancellationGuard::new(),
        }
    }

    /// The current pipeline handle, for snapshots and event subscription.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Snapshot of every tracked model state.
    pub fn training_states(&self) -> Vec<ModelTrainingState> {
        self.orchestrator.states()
    }

    pub fn model_state(&self, model_id: &str) -> Option<ModelTrainingState> {
        self.orchestrator.state(model_id)
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Upload a dataset and start a fresh pipeline for it. Any previous
    /// workflow in this session is reset first.
    pub async fn upload(&mut self, upload: DatasetUpload) -> Result<UploadResponse> {
        if self.pipeline.state().is_some() {
            debug!("resetting previous workflow before new upload");
            self.reset();
        }

        let response = self.backend.upload_dataset(upload).await?;
        self.dataset_id = Some(response.dataset_id.clone());
        self.pipeline.initialize(&response.dataset_id);
        self.pipeline.start()?;
        info!("workflow started for dataset {}", response.dataset_id);
        Ok(response)
    }

    /// Ranked model suggestions for the uploaded dataset.
    pub async fn suggest_models(&self) -> Result<ModelSuggestions> {
        let dataset_id = self.require_dataset()?;
        let suggestions = self.backend.model_suggestions(&dataset_id).await?;
        self.mark_milestone(MODEL_SUGGESTIONS_READY, MilestoneStatus::Completed);
        Ok(suggestions)
    }

    /// Train the selected candidate models concurrently. Milestones are
    /// driven by the real completion events rather than the internal timer.
    pub async fn train_models(
        &mut self,
        selections: &[(String, String)],
    ) -> Result<Vec<ModelTrainingState>> {
        self.require_dataset()?;
        if selections.is_empty() {
            return Err(Error::Validation("no models selected for training".into()));
        }

        self.mark_milestone(TRAINING_IN_PROGRESS, MilestoneStatus::Running);
        let results = self.orchestrator.train_all(selections).await;
        self.mark_milestone(TRAINING_IN_PROGRESS, MilestoneStatus::Completed);
        self.mark_milestone(METRICS_RETURNED, MilestoneStatus::Completed);

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            debug!("{failed}/{} training runs failed", results.len());
        }
        Ok(self.orchestrator.states())
    }

    /// Carry one completed model forward into review.
    pub fn select_model(&mut self, model_id: &str) -> Result<()> {
        let state = self
            .orchestrator
            .state(model_id)
            .ok_or_else(|| Error::NotFound(format!("model {model_id}")))?;
        if state.status != TrainingStatus::Completed {
            return Err(Error::InvalidState(format!(
                "model {model_id} is {}, not completed",
                state.status
            )));
        }
        self.selected_model = Some(model_id.to_string());
        Ok(())
    }

    /// Which review checkpoint the selected model is at.
    pub fn review_stage(&self) -> Result<ReviewStage> {
        let state = self.selected_state()?;
        Ok(if state.improvement_iterations == 0 {
            ReviewStage::AfterTraining
        } else {
            ReviewStage::AfterImprovement
        })
    }

    /// Legal actions at the current review checkpoint.
    pub fn review_actions(&self) -> Result<Vec<UserAction>> {
        let state = self.selected_state()?;
        Ok(available_actions(
            self.review_stage()?,
            state.improvement_iterations,
            self.config.max_improvement_iterations,
        ))
    }

    /// Apply a review decision. Illegal actions for the current checkpoint
    /// are rejected.
    pub async fn decide(&mut self, action: UserAction) -> Result<DecisionOutcome> {
        self.cancel.disarm();
        let state = self.selected_state()?;
        if !self.review_actions()?.contains(&action) {
            return Err(Error::InvalidState(format!(
                "{action} is not available at this checkpoint"
            )));
        }

        match action {
            UserAction::ProceedToDeployment => {
                self.mark_milestone(FINAL_MODEL_TRAINED, MilestoneStatus::Completed);
                let outcome = self.deployer.deploy(&state.model_id).await?;
                if outcome.success {
                    self.mark_milestone(MODEL_DEPLOYED, MilestoneStatus::Completed);
                    info!("model {} deployed to {}", state.model_id, outcome.endpoint);
                } else {
                    self.pipeline.fail();
                }
                Ok(DecisionOutcome::Deployed(outcome))
            }
            UserAction::SendToImprovement => {
                let metrics = state.metrics.clone().ok_or_else(|| {
                    Error::InvalidState(format!("model {} has no metrics", state.model_id))
                })?;
                self.mark_milestone(IMPROVEMENT_ITERATION, MilestoneStatus::Running);

                let outcome = self.engine.run(&metrics, |_| {}).await;
                let iteration = ImprovementIteration::new(
                    state.improvement_iterations + 1,
                    metrics,
                    outcome.improved_metrics,
                    outcome.techniques,
                );
                self.orchestrator.apply_improvement(
                    &state.model_id,
                    iteration.clone(),
                    self.config.max_improvement_iterations,
                )?;
                self.mark_milestone(IMPROVEMENT_ITERATION, MilestoneStatus::Completed);
                info!(
                    "improvement iteration {} recorded for {}",
                    iteration.iteration_number, state.model_id
                );
                Ok(DecisionOutcome::Improved(iteration))
            }
            UserAction::RejectAndReselect => {
                self.orchestrator.discard(&state.model_id)?;
                self.selected_model = None;
                Ok(DecisionOutcome::Reselect)
            }
        }
    }

    /// First stage of cancellation: arm the guard. Returns true while a
    /// confirmation is pending.
    pub fn request_cancel(&mut self) -> bool {
        self.cancel.request()
    }

    /// Second stage: confirm and reset the whole session. Without a prior
    /// request this does nothing and returns false.
    pub fn confirm_cancel(&mut self) -> bool {
        if self.cancel.confirm() {
            self.reset();
            true
        } else {
            false
        }
    }

    pub fn cancel_pending(&self) -> bool {
        self.cancel.is_armed()
    }

    /// Discard the pipeline, all training state and the selection.
    pub fn reset(&mut self) {
        self.pipeline.reset();
        self.orchestrator.clear();
        self.dataset_id = None;
        self.selected_model = None;
        self.cancel.disarm();
    }

    fn require_dataset(&self) -> Result<String> {
        self.dataset_id
            .clone()
            .ok_or_else(|| Error::InvalidState("no dataset uploaded".into()))
    }

    fn selected_state(&self) -> Result<ModelTrainingState> {
        let model_id = self
            .selected_model
            .as_deref()
            .ok_or_else(|| Error::InvalidState("no model selected for review".into()))?;
        self.orchestrator
            .state(model_id)
            .ok_or_else(|| Error::NotFound(format!("model {model_id}")))
    }

    /// External milestone updates race benignly with the automatic
    /// progression; a transition the machine already made is not an error
    /// here.
    fn mark_milestone(&self, milestone_id: &str, status: MilestoneStatus) {
        if let Err(err) = self.pipeline.update_milestone_status(milestone_id, status) {
            debug!("milestone {milestone_id} not updated to {status}: {err}");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
