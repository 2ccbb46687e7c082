//! Improvement iteration engine
//!
//! Selects a random subset of the technique catalog, executes the
//! techniques strictly sequentially with status callbacks, and synthesizes
//! improved metrics with a positive offset. Holds no iteration counter;
//! the caller is the single source of truth for iteration bookkeeping.

use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::TimingConfig;
use crate::improve::{
    compare_metrics, MetricImprovement, OptimizationTechnique, TechniqueStatus, TECHNIQUE_CATALOG,
};
use crate::train::{synthesize_metrics, ModelMetrics};

/// Result of one engine pass.
#[derive(Debug, Clone)]
pub struct ImprovementOutcome {
    pub techniques: Vec<OptimizationTechnique>,
    pub improved_metrics: ModelMetrics,
    pub improvements: Vec<MetricImprovement>,
}

pub struct ImprovementEngine {
    timing: TimingConfig,
    confusion_total: u32,
}

impl ImprovementEngine {
    pub fn new(timing: TimingConfig, confusion_total: u32) -> Self {
        Self { timing, confusion_total }
    }

    /// Run one improvement pass over the given metrics. `on_update` is
    /// invoked with a snapshot when each technique starts and when it
    /// completes; at most one technique is running at any moment.
    pub async fn run<F>(&self, current_metrics: &ModelMetrics, on_update: F) -> ImprovementOutcome
    where
        F: Fn(&OptimizationTechnique) + Send,
    {
        let mut rng = StdRng::from_os_rng();
        let mut techniques = self.select_techniques(&mut rng);

        for technique in techniques.iter_mut() {
            technique.status = TechniqueStatus::Running;
            on_update(technique);
            debug!("running technique: {}", technique.name);

            tokio::time::sleep(self.technique_duration(&mut rng)).await;

            technique.status = TechniqueStatus::Completed;
            on_update(technique);
        }

        // 2-7% improvement offset on top of the current accuracy.
        let improvement = 0.02 + rng.random_range(0.0..0.05);
        let improved_metrics = synthesize_metrics(
            current_metrics.accuracy,
            improvement,
            self.confusion_total,
            &mut rng,
        );
        let improvements = compare_metrics(current_metrics, &improved_metrics);

        ImprovementOutcome {
            techniques,
            improved_metrics,
            improvements,
        }
    }

    /// 4-5 catalog techniques, without replacement, order randomized.
    fn select_techniques(&self, rng: &mut StdRng) -> Vec<OptimizationTechnique> {
        let mut pool: Vec<OptimizationTechnique> = TECHNIQUE_CATALOG
            .iter()
            .map(OptimizationTechnique::from_spec)
            .collect();
        pool.shuffle(rng);
        let count = 4 + rng.random_range(0..2usize);
        pool.truncate(count);
        pool
    }

    fn technique_duration(&self, rng: &mut StdRng) -> Duration {
        let min = self.timing.technique_min.as_millis() as u64;
        let max = self.timing.technique_max.as_millis() as u64;
        if max > min {
            Duration::from_millis(rng.random_range(min..=max))
        } else {
            self.timing.technique_min
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
