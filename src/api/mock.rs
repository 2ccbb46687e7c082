//! In-process mock backend
//!
//! Simulates both collaborators for demos and tests: upload validation,
//! dataset profiling, model suggestions, a staged training simulation with
//! polled status, results, and deployment. State lives in `RwLock`-guarded
//! maps; the staged simulation runs as a background task and checks for a
//! stop request before every step.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::api::{
    ColumnInfo, DatasetProfile, DatasetUpload, DeployOutcome, DeploymentBackend, FeatureImportance,
    ModelKind, ModelOption, ModelSuggestions, RunPhase, TrainingBackend, TrainingResults,
    TrainingRunStatus, UploadResponse,
};
use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::train::synthesize_metrics;

const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

/// Progress checkpoints of the staged training simulation: target percent,
/// step label, base delay before the step lands.
const TRAINING_STEPS: &[(u8, &str, u64)] = &[
    (10, "Loading and preprocessing data...", 2000),
    (25, "Splitting data into train/test sets...", 1500),
    (40, "Training model...", 4000),
    (60, "Validating model performance...", 2500),
    (80, "Cross-validation...", 3000),
    (95, "Finalizing model...", 2000),
    (100, "Training completed!", 500),
];

struct TrainingRecord {
    status: TrainingRunStatus,
    model_id: String,
    started: Instant,
}

#[derive(Default)]
struct MockStorage {
    datasets: RwLock<HashMap<String, DatasetProfile>>,
    trainings: RwLock<HashMap<String, TrainingRecord>>,
    results: RwLock<HashMap<String, TrainingResults>>,
    counter: RwLock<u64>,
}

impl MockStorage {
    fn generate_id(&self, prefix: &str) -> String {
        let mut counter = self.counter.write().unwrap();
        *counter += 1;
        format!("{}-{:08x}", prefix, *counter)
    }
}

/// Default in-process collaborator for both backend traits.
#[derive(Clone)]
pub struct MockBackend {
    timing: TimingConfig,
    confusion_total: u32,
    storage: Arc<MockStorage>,
}

impl MockBackend {
    pub fn new(timing: TimingConfig, confusion_total: u32) -> Self {
        Self {
            timing,
            confusion_total,
            storage: Arc::new(MockStorage::default()),
        }
    }

    fn validate_extension(file_name: &str) -> Result<()> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(())
        } else {
            Err(Error::Validation(
                "Unsupported file type. Please upload a CSV or Excel file.".into(),
            ))
        }
    }

    fn build_profile(rng: &mut StdRng) -> DatasetProfile {
        let row_count = 1000 + rng.random_range(0..9000u64);
        let column_count = 5 + rng.random_range(0..15u32);
        let columns = vec![
            ColumnInfo {
                name: "feature1".into(),
                dtype: "numeric".into(),
                nullable: false,
                sample_values: vec![json!(1.2), json!(3.4), json!(5.6)],
            },
            ColumnInfo {
                name: "feature2".into(),
                dtype: "categorical".into(),
                nullable: true,
                sample_values: vec![json!("A"), json!("B"), json!("C")],
            },
            ColumnInfo {
                name: "target".into(),
                dtype: "numeric".into(),
                nullable: false,
                sample_values: vec![json!(0), json!(1), json!(0)],
            },
        ];
        DatasetProfile {
            row_count,
            column_count,
            columns,
            data_types: HashMap::from([
                ("feature1".to_string(), "float64".to_string()),
                ("feature2".to_string(), "object".to_string()),
                ("target".to_string(), "int64".to_string()),
            ]),
            missing_values: HashMap::from([("feature2".to_string(), 5)]),
            summary: format!(
                "Dataset contains {row_count} rows with {column_count} columns. \
                 Data appears to be suitable for machine learning."
            ),
        }
    }

    fn suggestion_catalog() -> Vec<ModelOption> {
        vec![
            ModelOption {
                id: "model_random_forest".into(),
                name: "Random Forest".into(),
                kind: ModelKind::Classification,
                description: "An ensemble method that builds multiple decision trees and combines their predictions.".into(),
                estimated_accuracy: Some(0.92),
                pros: vec![
                    "Handles non-linear relationships well".into(),
                    "Robust to overfitting".into(),
                    "Provides feature importance scores".into(),
                    "Works well with mixed data types".into(),
                ],
                cons: vec![
                    "Can be memory intensive".into(),
                    "Less interpretable than single trees".into(),
                ],
                recommended: true,
            },
            ModelOption {
                id: "model_xgboost".into(),
                name: "XGBoost".into(),
                kind: ModelKind::Classification,
                description: "An optimized gradient boosting framework that achieves state-of-the-art results.".into(),
                estimated_accuracy: Some(0.94),
                pros: vec![
                    "High performance and accuracy".into(),
                    "Built-in regularization".into(),
                    "Handles missing values".into(),
                    "Fast training time".into(),
                ],
                cons: vec![
                    "Requires hyperparameter tuning".into(),
                    "Less interpretable".into(),
                ],
                recommended: false,
            },
            ModelOption {
                id: "model_logistic_regression".into(),
                name: "Logistic Regression".into(),
                kind: ModelKind::Classification,
                description: "A linear model for classification that is fast and interpretable.".into(),
                estimated_accuracy: Some(0.85),
                pros: vec![
                    "Fast training and prediction".into(),
                    "Highly interpretable".into(),
                    "No hyperparameter tuning needed".into(),
                    "Works well with linear relationships".into(),
                ],
                cons: vec![
                    "Assumes linear relationship".into(),
                    "Lower accuracy for complex patterns".into(),
                ],
                recommended: false,
            },
            ModelOption {
                id: "model_neural_network".into(),
                name: "Neural Network".into(),
                kind: ModelKind::Classification,
                description: "A deep learning model that can learn complex patterns in the data.".into(),
                estimated_accuracy: Some(0.91),
                pros: vec![
                    "Can learn complex non-linear patterns".into(),
                    "Flexible architecture".into(),
                    "Good for large datasets".into(),
                ],
                cons: vec![
                    "Requires large amounts of data".into(),
                    "Long training time".into(),
                    "Black box model".into(),
                    "Requires significant hyperparameter tuning".into(),
                ],
                recommended: false,
            },
        ]
    }

    /// Drive one run through the staged simulation. Stops cooperatively if
    /// the run was stopped between steps.
    async fn run_simulation(storage: Arc<MockStorage>, training_id: String, scale: f64, confusion_total: u32) {
        for &(progress, step, base_millis) in TRAINING_STEPS {
            let delay = Duration::from_millis(base_millis).mul_f64(scale.max(0.0));
            tokio::time::sleep(delay).await;

            let mut trainings = storage.trainings.write().unwrap();
            let Some(record) = trainings.get_mut(&training_id) else { return };
            if record.status.phase == RunPhase::Stopped {
                debug!("training {training_id} stopped; skipping remaining steps");
                return;
            }
            let elapsed = record.started.elapsed().as_secs();
            record.status.progress = progress;
            record.status.current_step = Some(step.to_string());
            record.status.elapsed_secs = elapsed;
            record.status.eta_secs = if progress < 100 {
                Some(elapsed * u64::from(100 - progress) / u64::from(progress))
            } else {
                None
            };
            record.status.phase = if progress < 100 {
                RunPhase::Running
            } else {
                RunPhase::Completed
            };
        }

        Self::store_results(&storage, &training_id, confusion_total);
    }

    fn store_results(storage: &MockStorage, training_id: &str, confusion_total: u32) {
        let (model_id, duration_secs) = {
            let trainings = storage.trainings.read().unwrap();
            let Some(record) = trainings.get(training_id) else { return };
            (record.model_id.clone(), record.started.elapsed().as_secs())
        };

        let mut rng = StdRng::from_os_rng();
        let metrics = synthesize_metrics(0.90, 0.0, confusion_total, &mut rng);
        let summary = format!(
            "Model trained successfully with {:.1}% accuracy. The model shows good \
             performance across all metrics with balanced precision and recall.",
            metrics.accuracy * 100.0
        );
        let results = TrainingResults {
            training_id: training_id.to_string(),
            model_id,
            metrics,
            feature_importance: vec![
                FeatureImportance { feature: "feature1".into(), importance: 0.35 },
                FeatureImportance { feature: "feature2".into(), importance: 0.28 },
                FeatureImportance { feature: "feature3".into(), importance: 0.20 },
                FeatureImportance { feature: "feature4".into(), importance: 0.12 },
                FeatureImportance { feature: "feature5".into(), importance: 0.05 },
            ],
            model_summary: summary,
            duration_secs,
            finished_at: Utc::now(),
            download_url: format!("/download/{training_id}"),
            endpoint: format!("https://models.example.com/{training_id}"),
        };
        storage
            .results
            .write()
            .unwrap()
            .insert(training_id.to_string(), results);
    }
}

#[async_trait]
impl TrainingBackend for MockBackend {
    async fn upload_dataset(&self, upload: DatasetUpload) -> Result<UploadResponse> {
        tokio::time::sleep(self.timing.upload_delay).await;
        Self::validate_extension(&upload.file_name)?;

        let dataset_id = self.storage.generate_id("dataset");
        let mut rng = StdRng::from_os_rng();
        let profile = Self::build_profile(&mut rng);
        self.storage
            .datasets
            .write()
            .unwrap()
            .insert(dataset_id.clone(), profile.clone());
        debug!("dataset {dataset_id} uploaded ({} bytes)", upload.size_bytes);
        Ok(UploadResponse { dataset_id, profile })
    }

    async fn model_suggestions(&self, dataset_id: &str) -> Result<ModelSuggestions> {
        tokio::time::sleep(self.timing.suggestion_delay).await;
        if !self.storage.datasets.read().unwrap().contains_key(dataset_id) {
            return Err(Error::NotFound(format!("dataset {dataset_id}")));
        }
        Ok(ModelSuggestions {
            models: Self::suggestion_catalog(),
            recommended_model_id: "model_random_forest".into(),
            reasoning: "Based on your dataset characteristics (mixed data types, moderate size), \
                        Random Forest is recommended for its balance of accuracy, \
                        interpretability, and robustness."
                .into(),
        })
    }

    async fn start_training(&self, dataset_id: &str, model_id: &str) -> Result<String> {
        tokio::time::sleep(self.timing.training_start_delay).await;
        if !self.storage.datasets.read().unwrap().contains_key(dataset_id) {
            return Err(Error::NotFound(format!("dataset {dataset_id}")));
        }

        let training_id = self.storage.generate_id("training");
        let record = TrainingRecord {
            status: TrainingRunStatus {
                training_id: training_id.clone(),
                phase: RunPhase::Pending,
                progress: 0,
                current_step: Some("Initializing training...".into()),
                elapsed_secs: 0,
                eta_secs: None,
            },
            model_id: model_id.to_string(),
            started: Instant::now(),
        };
        self.storage
            .trainings
            .write()
            .unwrap()
            .insert(training_id.clone(), record);

        tokio::spawn(Self::run_simulation(
            Arc::clone(&self.storage),
            training_id.clone(),
            self.timing.simulation_scale,
            self.confusion_total,
        ));
        Ok(training_id)
    }

    async fn training_status(&self, training_id: &str) -> Result<TrainingRunStatus> {
        tokio::time::sleep(self.timing.status_delay).await;
        self.storage
            .trainings
            .read()
            .unwrap()
            .get(training_id)
            .map(|record| record.status.clone())
            .ok_or_else(|| Error::NotFound(format!("training {training_id}")))
    }

    async fn stop_training(&self, training_id: &str) -> Result<()> {
        tokio::time::sleep(self.timing.status_delay).await;
        let mut trainings = self.storage.trainings.write().unwrap();
        let record = trainings
            .get_mut(training_id)
            .ok_or_else(|| Error::NotFound(format!("training {training_id}")))?;
        if matches!(record.status.phase, RunPhase::Completed | RunPhase::Failed) {
            return Err(Error::InvalidState(
                "cannot stop training that is already completed or failed".into(),
            ));
        }
        record.status.phase = RunPhase::Stopped;
        record.status.current_step = Some("Training stopped by user".into());
        Ok(())
    }

    async fn training_results(&self, training_id: &str) -> Result<TrainingResults> {
        tokio::time::sleep(self.timing.status_delay).await;
        self.storage
            .results
            .read()
            .unwrap()
            .get(training_id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "results for {training_id}; training may still be in progress"
                ))
            })
    }
}

#[async_trait]
impl DeploymentBackend for MockBackend {
    async fn deploy(&self, model_id: &str) -> Result<DeployOutcome> {
        tokio::time::sleep(self.timing.deploy_delay).await;
        Ok(DeployOutcome {
            success: true,
            endpoint: format!("https://models.example.com/{model_id}"),
            message: "Model deployed successfully".into(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MockBackend {
        MockBackend::new(TimingConfig::instant(), 1000)
    }

    async fn wait_for_phase(backend: &MockBackend, training_id: &str, phase: RunPhase) -> TrainingRunStatus {
        for _ in 0..200 {
            let status = backend.training_status(training_id).await.unwrap();
            if status.phase == phase {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("training {training_id} never reached {phase}");
    }

    #[tokio::test]
    async fn test_upload_accepts_csv_and_excel() {
        let backend = backend();
        for name in ["data.csv", "data.XLSX", "data.xls"] {
            let response = backend
                .upload_dataset(DatasetUpload::new(name, 1024))
                .await
                .unwrap();
            assert!(response.dataset_id.starts_with("dataset-"));
            assert!(response.profile.row_count >= 1000);
            assert_eq!(response.profile.columns.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_extension() {
        let backend = backend();
        for name in ["data.txt", "data.parquet", "noextension"] {
            let err = backend
                .upload_dataset(DatasetUpload::new(name, 1024))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{name} should be rejected");
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_suggestions_require_known_dataset() {
        let backend = backend();
        assert!(matches!(
            backend.model_suggestions("dataset-missing").await,
            Err(Error::NotFound(_))
        ));

        let response = backend
            .upload_dataset(DatasetUpload::new("data.csv", 10))
            .await
            .unwrap();
        let suggestions = backend.model_suggestions(&response.dataset_id).await.unwrap();
        assert_eq!(suggestions.models.len(), 4);
        assert_eq!(suggestions.recommended_model_id, "model_random_forest");
        assert_eq!(
            suggestions
                .models
                .iter()
                .filter(|m| m.recommended)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_training_lifecycle() {
        let backend = backend();
        let upload = backend
            .upload_dataset(DatasetUpload::new("data.csv", 10))
            .await
            .unwrap();
        let training_id = backend
            .start_training(&upload.dataset_id, "model_random_forest")
            .await
            .unwrap();
        assert!(training_id.starts_with("training-"));

        let status = wait_for_phase(&backend, &training_id, RunPhase::Completed).await;
        assert_eq!(status.progress, 100);
        assert!(status.eta_secs.is_none());

        let results = backend.training_results(&training_id).await.unwrap();
        assert_eq!(results.model_id, "model_random_forest");
        assert_eq!(results.metrics.matrix_total(), 1000);
        assert!(results.metrics.is_bounded());
        assert_eq!(results.feature_importance.len(), 5);
    }

    #[tokio::test]
    async fn test_start_training_requires_dataset() {
        let backend = backend();
        assert!(matches!(
            backend.start_training("dataset-missing", "m1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_training_semantics() {
        let backend = MockBackend::new(
            TimingConfig {
                // Slow simulation so the run is still stoppable.
                simulation_scale: 10.0,
                ..TimingConfig::instant()
            },
            1000,
        );
        let upload = backend
            .upload_dataset(DatasetUpload::new("data.csv", 10))
            .await
            .unwrap();
        let training_id = backend
            .start_training(&upload.dataset_id, "model_xgboost")
            .await
            .unwrap();

        backend.stop_training(&training_id).await.unwrap();
        let status = backend.training_status(&training_id).await.unwrap();
        assert_eq!(status.phase, RunPhase::Stopped);
        assert_eq!(status.current_step.as_deref(), Some("Training stopped by user"));

        // Unknown id.
        assert!(matches!(
            backend.stop_training("training-missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_completed_training_is_invalid() {
        let backend = backend();
        let upload = backend
            .upload_dataset(DatasetUpload::new("data.csv", 10))
            .await
            .unwrap();
        let training_id = backend
            .start_training(&upload.dataset_id, "model_xgboost")
            .await
            .unwrap();
        wait_for_phase(&backend, &training_id, RunPhase::Completed).await;

        let err = backend.stop_training(&training_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_results_not_found_before_completion() {
        let backend = backend();
        let err = backend.training_results("training-missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deploy_resolves_endpoint() {
        let backend = backend();
        let outcome = backend.deploy("model_random_forest").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.endpoint.ends_with("model_random_forest"));
    }
}
