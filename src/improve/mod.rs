//! Improvement iterations: technique catalog, delta reports, engine
//!
//! One improvement iteration runs a random subset of optimization
//! techniques over a model's current metrics and reports the before/after
//! deltas. The engine is stateless between calls; iteration bookkeeping
//! belongs to the caller.

use serde::{Deserialize, Serialize};

use crate::train::ModelMetrics;

pub mod engine;

pub use engine::{ImprovementEngine, ImprovementOutcome};

// =============================================================================
// Technique catalog
// =============================================================================

/// Static catalog entry for one optimization technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechniqueSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// The fixed technique catalog iterations draw from.
pub const TECHNIQUE_CATALOG: &[TechniqueSpec] = &[
    TechniqueSpec {
        name: "Hyperparameter Tuning",
        description: "Optimizing learning rate, batch size, and regularization parameters",
    },
    TechniqueSpec {
        name: "Dropout Tuning",
        description: "Adjusting dropout rates to prevent overfitting",
    },
    TechniqueSpec {
        name: "Regularization",
        description: "Applying L1/L2 regularization techniques",
    },
    TechniqueSpec {
        name: "Early Stopping",
        description: "Implementing early stopping to prevent overfitting",
    },
    TechniqueSpec {
        name: "Learning Rate Scheduling",
        description: "Adaptive learning rate optimization",
    },
    TechniqueSpec {
        name: "Feature Engineering",
        description: "Creating and selecting optimal features",
    },
    TechniqueSpec {
        name: "Cross-Validation",
        description: "K-fold cross-validation for robust evaluation",
    },
];

/// Execution status of one technique within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueStatus {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for TechniqueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TechniqueStatus::Pending => "pending",
            TechniqueStatus::Running => "running",
            TechniqueStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// One selected technique and its execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationTechnique {
    pub name: String,
    pub description: String,
    pub status: TechniqueStatus,
}

impl OptimizationTechnique {
    pub fn from_spec(spec: &TechniqueSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            description: spec.description.to_string(),
            status: TechniqueStatus::Pending,
        }
    }
}

// =============================================================================
// Delta reports
// =============================================================================

/// Before/after delta for one headline metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricImprovement {
    pub metric: String,
    pub before: f64,
    pub after: f64,
    /// Percentage change relative to `before`; 0 when `before` is 0.
    pub change: f64,
    pub improved: bool,
}

impl MetricImprovement {
    pub fn between(metric: impl Into<String>, before: f64, after: f64) -> Self {
        let change = if before == 0.0 {
            0.0
        } else {
            (after - before) / before * 100.0
        };
        Self {
            metric: metric.into(),
            before,
            after,
            change,
            improved: after > before,
        }
    }
}

/// Delta report over the four headline metrics.
pub fn compare_metrics(before: &ModelMetrics, after: &ModelMetrics) -> Vec<MetricImprovement> {
    vec![
        MetricImprovement::between("accuracy", before.accuracy, after.accuracy),
        MetricImprovement::between("precision", before.precision, after.precision),
        MetricImprovement::between("recall", before.recall, after.recall),
        MetricImprovement::between("f1_score", before.f1_score, after.f1_score),
    ]
}

/// One completed pass of the improvement engine over a model's metrics.
/// Appended to the model's history, never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementIteration {
    /// 1-based, assigned by the caller as `prior_iterations + 1`.
    pub iteration_number: u32,
    pub techniques: Vec<OptimizationTechnique>,
    pub before_metrics: ModelMetrics,
    pub after_metrics: ModelMetrics,
    pub improvements: Vec<MetricImprovement>,
}

impl ImprovementIteration {
    /// Wrap an engine outcome into a numbered history record.
    pub fn new(
        iteration_number: u32,
        before_metrics: ModelMetrics,
        after_metrics: ModelMetrics,
        techniques: Vec<OptimizationTechnique>,
    ) -> Self {
        let improvements = compare_metrics(&before_metrics, &after_metrics);
        Self {
            iteration_number,
            techniques,
            before_metrics,
            after_metrics,
            improvements,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
