//! Evaluation metrics and the demo synthesis policy
//!
//! Real metrics come from the training backend; the synthesis policy here
//! backs the default in-process collaborator and the improvement engine's
//! post-iteration estimates.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Classification metrics for one trained model. Immutable once produced;
/// every training or improvement step yields a fresh instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `[[tn, fp], [fn, tp]]` for binary classification.
    pub confusion_matrix: [[u32; 2]; 2],
    /// Training wall-clock in seconds.
    pub execution_time: f64,
    /// Auxiliary scalar values (loss, epochs, batch size, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ModelMetrics {
    /// Sum of the confusion matrix cells.
    pub fn matrix_total(&self) -> u32 {
        self.confusion_matrix.iter().flatten().sum()
    }

    /// All four headline metrics within [0, 1].
    pub fn is_bounded(&self) -> bool {
        [self.accuracy, self.precision, self.recall, self.f1_score]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// Synthesize plausible metrics around a base accuracy.
///
/// Accuracy draws a bounded perturbation on top of `base_accuracy +
/// improvement`; precision and recall track accuracy with small offsets;
/// F1 is the harmonic mean. The confusion matrix is derived proportionally
/// over `total` samples, with the false-negative cell computed by
/// subtraction so the cells always sum to `total` exactly. When rounding
/// would drive that cell negative it is clamped to zero and the
/// true-negative cell is recomputed by subtraction instead.
pub fn synthesize_metrics<R: Rng + ?Sized>(
    base_accuracy: f64,
    improvement: f64,
    total: u32,
    rng: &mut R,
) -> ModelMetrics {
    let accuracy = (base_accuracy + improvement + rng.random_range(0.0..0.05)).min(1.0);
    let precision = (accuracy - 0.02 + rng.random_range(0.0..0.04)).clamp(0.0, 1.0);
    let recall = (accuracy - 0.01 + rng.random_range(0.0..0.03)).clamp(0.0, 1.0);
    let f1_score = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    let total_f = f64::from(total);
    let tp = (accuracy * total_f * 0.6).floor() as u32;
    let mut tn = (accuracy * total_f * 0.4).floor() as u32;
    let fp = ((1.0 - precision) * total_f * 0.4).floor() as u32;
    let false_negatives = if tp + tn + fp > total {
        tn = total - tp - fp;
        0
    } else {
        total - tp - tn - fp
    };

    let validation_accuracy = (accuracy - 0.02 + rng.random_range(0.0..0.03)).clamp(0.0, 1.0);
    let metadata = HashMap::from([
        ("loss".to_string(), json!(0.15 + rng.random_range(0.0..0.1))),
        ("validation_loss".to_string(), json!(0.18 + rng.random_range(0.0..0.12))),
        ("validation_accuracy".to_string(), json!(validation_accuracy)),
        ("epochs".to_string(), json!(10 + rng.random_range(0..20))),
        ("batch_size".to_string(), json!(32)),
    ]);

    ModelMetrics {
        accuracy,
        precision,
        recall,
        f1_score,
        confusion_matrix: [[tn, fp], [false_negatives, tp]],
        execution_time: 30.0 + rng.random_range(0.0..60.0),
        metadata,
    }
}

// =============================================================================
// Tests
// =============================================================================
