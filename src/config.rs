//! Workflow configuration
//!
//! All simulated delays live here rather than as hardcoded constants, so a
//! real backend can supply its own durations and tests can run with
//! near-zero timings.

use std::collections::HashMap;
use std::time::Duration;

/// Delay and duration tables for every simulated asynchronous step.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Per-milestone simulated stage duration, keyed by milestone id.
    pub milestone_delays: HashMap<String, Duration>,
    /// Fallback duration for milestone ids missing from the table.
    pub default_milestone_delay: Duration,
    /// Pause between consecutive milestones during automatic progression.
    pub milestone_pause: Duration,
    /// Interval between training progress checkpoints.
    pub progress_tick: Duration,
    /// Settle time between the last progress checkpoint and the result.
    pub training_settle: Duration,
    /// Bounds for a single optimization technique run.
    pub technique_min: Duration,
    pub technique_max: Duration,
    /// Collaborator call latencies.
    pub upload_delay: Duration,
    pub suggestion_delay: Duration,
    pub training_start_delay: Duration,
    pub status_delay: Duration,
    pub deploy_delay: Duration,
    /// Multiplier applied to the backend's staged training simulation.
    pub simulation_scale: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let mut milestone_delays = HashMap::new();
        for (id, millis) in [
            ("dataset_uploaded", 1000),
            ("schema_profiling", 2000),
            ("preprocessing_complete", 2500),
            ("model_suggestions_ready", 3000),
            ("code_generation", 2000),
            ("training_in_progress", 8000),
            ("metrics_returned", 1000),
            ("improvement_iteration", 3000),
            ("final_model_trained", 5000),
            ("model_deployed", 2000),
        ] {
            milestone_delays.insert(id.to_string(), Duration::from_millis(millis));
        }

        Self {
            milestone_delays,
            default_milestone_delay: Duration::from_millis(2000),
            milestone_pause: Duration::from_millis(500),
            progress_tick: Duration::from_millis(300),
            training_settle: Duration::from_millis(500),
            technique_min: Duration::from_millis(1000),
            technique_max: Duration::from_millis(2000),
            upload_delay: Duration::from_millis(1500),
            suggestion_delay: Duration::from_millis(2000),
            training_start_delay: Duration::from_millis(1000),
            status_delay: Duration::from_millis(300),
            deploy_delay: Duration::from_millis(2000),
            simulation_scale: 1.0,
        }
    }
}

impl TimingConfig {
    /// All delays collapsed to zero. Intended for tests and demo fast mode.
    pub fn instant() -> Self {
        Self {
            milestone_delays: HashMap::new(),
            default_milestone_delay: Duration::ZERO,
            milestone_pause: Duration::ZERO,
            progress_tick: Duration::ZERO,
            training_settle: Duration::ZERO,
            technique_min: Duration::ZERO,
            technique_max: Duration::ZERO,
            upload_delay: Duration::ZERO,
            suggestion_delay: Duration::ZERO,
            training_start_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            deploy_delay: Duration::ZERO,
            simulation_scale: 0.0,
        }
    }

    /// Duration for one milestone's simulated stage.
    pub fn milestone_delay(&self, milestone_id: &str) -> Duration {
        self.milestone_delays
            .get(milestone_id)
            .copied()
            .unwrap_or(self.default_milestone_delay)
    }

    /// Override one milestone's duration.
    pub fn with_milestone_delay(mut self, milestone_id: &str, delay: Duration) -> Self {
        self.milestone_delays.insert(milestone_id.to_string(), delay);
        self
    }
}

/// Session-level knobs combining timings with policy limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timing: TimingConfig,
    /// Upper bound on improvement iterations per model.
    pub max_improvement_iterations: u32,
    /// Sample count the synthesized confusion matrix must sum to.
    pub confusion_total: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            max_improvement_iterations: 3,
            confusion_total: 1000,
        }
    }
}

impl SessionConfig {
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_improvement_iterations = max;
        self
    }
}
