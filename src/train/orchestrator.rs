//! Training orchestration
//!
//! Runs one or more opaque model-training operations concurrently,
//! interleaved on the shared runtime, and tracks a [`ModelTrainingState`]
//! per model. Progress callbacks for a given model arrive in non-decreasing
//! order; nothing is guaranteed across models.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::TimingConfig;
use crate::error::Result;
use crate::improve::ImprovementIteration;
use crate::train::{synthesize_metrics, ModelMetrics, ModelTrainingState, TrainingStatus};

/// Shared progress observer, invoked at checkpoints 0..=100.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// The opaque asynchronous training operation. Implementations report
/// progress at monotonically non-decreasing checkpoints from 0 to 100
/// inclusive, then resolve with final metrics.
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn train(
        &self,
        model_id: &str,
        model_name: &str,
        on_progress: ProgressCallback,
    ) -> Result<ModelMetrics>;
}

/// Default demo collaborator: timed checkpoints every tick, synthesized
/// metrics at the end.
pub struct SimulatedTrainer {
    timing: TimingConfig,
    confusion_total: u32,
}

impl SimulatedTrainer {
    pub fn new(timing: TimingConfig, confusion_total: u32) -> Self {
        Self { timing, confusion_total }
    }
}

#[async_trait]
impl ModelTrainer for SimulatedTrainer {
    async fn train(
        &self,
        model_id: &str,
        _model_name: &str,
        on_progress: ProgressCallback,
    ) -> Result<ModelMetrics> {
        for percent in (0..=100u8).step_by(10) {
            tokio::time::sleep(self.timing.progress_tick).await;
            on_progress(percent);
        }
        tokio::time::sleep(self.timing.training_settle).await;

        let mut rng = StdRng::from_os_rng();
        let base_accuracy = 0.85 + rng.random_range(0.0..0.1);
        debug!("simulated training finished for {model_id}");
        Ok(synthesize_metrics(base_accuracy, 0.0, self.confusion_total, &mut rng))
    }
}

/// Tracks per-model training state and fans out concurrent training runs.
/// Clones share the same state map.
#[derive(Clone)]
pub struct TrainingOrchestrator {
    trainer: Arc<dyn ModelTrainer>,
    states: Arc<RwLock<HashMap<String, ModelTrainingState>>>,
}

impl TrainingOrchestrator {
    pub fn new(trainer: Arc<dyn ModelTrainer>) -> Self {
        Self {
            trainer,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Orchestrator backed by the demo trainer.
    pub fn simulated(timing: TimingConfig, confusion_total: u32) -> Self {
        Self::new(Arc::new(SimulatedTrainer::new(timing, confusion_total)))
    }

    /// Create (or re-create) the pending state for a model.
    pub fn register(&self, model_id: &str, model_name: &str) {
        self.states.write().unwrap().insert(
            model_id.to_string(),
            ModelTrainingState::new(model_id, model_name),
        );
    }

    /// Train a single model, updating its tracked state throughout. An
    /// optional external observer receives the same checkpoints the state
    /// map does.
    pub async fn train_model(
        &self,
        model_id: &str,
        model_name: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ModelMetrics> {
        if !self.states.read().unwrap().contains_key(model_id) {
            self.register(model_id, model_name);
        }
        self.update_state(model_id, |state| state.status = TrainingStatus::Training);

        let states = Arc::clone(&self.states);
        let id_for_progress = model_id.to_string();
        let progress: ProgressCallback = Arc::new(move |percent| {
            let capped = percent.min(100);
            if let Some(state) = states.write().unwrap().get_mut(&id_for_progress) {
                // Per-model progress never regresses, whatever the trainer
                // reports.
                if capped > state.progress {
                    state.progress = capped;
                }
            }
            if let Some(cb) = &on_progress {
                cb(capped);
            }
        });

        match self.trainer.train(model_id, model_name, progress).await {
            Ok(metrics) => {
                self.update_state(model_id, |state| {
                    state.status = TrainingStatus::Completed;
                    state.progress = 100;
                    state.execution_time = Some(metrics.execution_time);
                    state.metrics = Some(metrics.clone());
                });
                Ok(metrics)
            }
            Err(err) => {
                self.update_state(model_id, |state| state.status = TrainingStatus::Failed);
                Err(err)
            }
        }
    }

    /// Train several models concurrently. All states are registered before
    /// any training begins; results are returned in input order.
    pub async fn train_all(
        &self,
        models: &[(String, String)],
    ) -> Vec<(String, Result<ModelMetrics>)> {
        for (model_id, model_name) in models {
            self.register(model_id, model_name);
        }
        let runs = models.iter().map(|(model_id, model_name)| {
            let orchestrator = self.clone();
            async move {
                let result = orchestrator.train_model(model_id, model_name, None).await;
                (model_id.clone(), result)
            }
        });
        join_all(runs).await
    }

    /// True once every tracked model reached a terminal status. False while
    /// nothing is tracked.
    pub fn all_complete(&self) -> bool {
        let states = self.states.read().unwrap();
        !states.is_empty() && states.values().all(|s| s.status.is_terminal())
    }

    /// Snapshot of one model's state.
    pub fn state(&self, model_id: &str) -> Option<ModelTrainingState> {
        self.states.read().unwrap().get(model_id).cloned()
    }

    /// Snapshot of every tracked state, ordered by model id.
    pub fn states(&self) -> Vec<ModelTrainingState> {
        let mut all: Vec<_> = self.states.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        all
    }

    /// Record an improvement iteration against a model, enforcing the cap.
    pub fn apply_improvement(
        &self,
        model_id: &str,
        iteration: ImprovementIteration,
        max_iterations: u32,
    ) -> Result<()> {
        let mut states = self.states.write().unwrap();
        let state = states
            .get_mut(model_id)
            .ok_or_else(|| crate::error::Error::NotFound(format!("model {model_id}")))?;
        state.push_iteration(iteration, max_iterations)
    }

    /// Drop one model's tracked progress (reject-and-reselect path).
    pub fn discard(&self, model_id: &str) -> Result<()> {
        match self.states.write().unwrap().remove(model_id) {
            Some(_) => Ok(()),
            None => Err(crate::error::Error::NotFound(format!("model {model_id}"))),
        }
    }

    /// Drop all tracked state (session reset).
    pub fn clear(&self) {
        self.states.write().unwrap().clear();
    }

    fn update_state(&self, model_id: &str, apply: impl FnOnce(&mut ModelTrainingState)) {
        if let Some(state) = self.states.write().unwrap().get_mut(model_id) {
            apply(state);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
