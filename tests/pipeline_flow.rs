//! Integration tests for pipeline execution

use std::time::Duration;

use canalizar::config::TimingConfig;
use canalizar::pipeline::{
    MilestoneStatus, Pipeline, PipelineEvent, PipelineRegistry, PipelineStatus, DATASET_UPLOADED,
    MILESTONE_CATALOG,
};

#[tokio::test]
async fn test_start_completes_upload_within_one_tick() {
    let pipeline = Pipeline::new(TimingConfig::default());
    pipeline.initialize("p1");
    pipeline.start().unwrap();

    let state = pipeline.state().unwrap();
    assert_eq!(state.milestones.len(), 10);
    assert_eq!(
        state.milestone(DATASET_UPLOADED).unwrap().status,
        MilestoneStatus::Completed
    );
    assert_eq!(state.overall_progress, 10);
}

#[tokio::test(start_paused = true)]
async fn test_progress_formula_holds_after_every_completion() {
    let pipeline = Pipeline::new(TimingConfig::default());
    pipeline.initialize("p1");
    let mut events = pipeline.subscribe();
    pipeline.start().unwrap();
    tokio::time::sleep(Duration::from_secs(90)).await;

    let total = MILESTONE_CATALOG.len();
    let mut completed = 0usize;
    let mut last = 0u8;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::MilestoneCompleted { overall_progress, .. } = event {
            completed += 1;
            let expected = (100.0 * completed as f64 / total as f64).round() as u8;
            assert_eq!(overall_progress, expected);
            assert!(overall_progress >= last, "progress regressed");
            last = overall_progress;
        }
    }
    assert_eq!(completed, total);
    assert_eq!(pipeline.state().unwrap().status, PipelineStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_progression_freezes_state() {
    let pipeline = Pipeline::new(TimingConfig::default());
    pipeline.initialize("p1");
    pipeline.start().unwrap();

    tokio::time::sleep(Duration::from_millis(4000)).await;
    pipeline.stop();
    let frozen = pipeline.state().unwrap();
    assert_eq!(frozen.status, PipelineStatus::Idle);

    // Wait far past every configured delay: no further transitions.
    tokio::time::sleep(Duration::from_secs(300)).await;
    let after = pipeline.state().unwrap();
    assert_eq!(after.overall_progress, frozen.overall_progress);
    for (frozen_m, after_m) in frozen.milestones.iter().zip(after.milestones.iter()) {
        assert_eq!(frozen_m.status, after_m.status, "milestone {} moved", frozen_m.id);
    }
}

#[tokio::test]
async fn test_reset_then_initialize_is_clean() {
    let pipeline = Pipeline::new(TimingConfig::instant());
    pipeline.initialize("p1");
    pipeline.start().unwrap();
    pipeline.reset();
    assert!(pipeline.state().is_none());

    let state = pipeline.initialize("p1");
    assert_eq!(state.overall_progress, 0);
    assert_eq!(state.status, PipelineStatus::Idle);
    assert!(state
        .milestones
        .iter()
        .all(|m| m.status == MilestoneStatus::Pending));
}

#[tokio::test(start_paused = true)]
async fn test_registry_runs_pipelines_concurrently() {
    let registry = PipelineRegistry::new(TimingConfig::default());
    let p1 = registry.create("workflow-a");
    let p2 = registry.create("workflow-b");
    p1.start().unwrap();
    p2.start().unwrap();

    tokio::time::sleep(Duration::from_secs(90)).await;

    assert_eq!(p1.state().unwrap().status, PipelineStatus::Completed);
    assert_eq!(p2.state().unwrap().status, PipelineStatus::Completed);
    assert_eq!(registry.len(), 2);
}
