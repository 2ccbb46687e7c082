//! Pipeline registry
//!
//! Pipelines are explicit handles keyed by `pipeline_id` rather than a
//! process-wide singleton, so several workflows can run side by side.
//! Creating a pipeline under an id that is already registered resets the
//! old run first.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::TimingConfig;
use crate::error::{Error, Result};
use crate::pipeline::machine::Pipeline;
use crate::pipeline::MilestoneSpec;

pub struct PipelineRegistry {
    catalog: Option<Vec<MilestoneSpec>>,
    timing: TimingConfig,
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl PipelineRegistry {
    /// Registry producing pipelines over the standard catalog.
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            catalog: None,
            timing,
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    /// Registry producing pipelines over a custom catalog.
    pub fn with_catalog(catalog: &[MilestoneSpec], timing: TimingConfig) -> Self {
        Self {
            catalog: Some(catalog.to_vec()),
            timing,
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    /// Create and initialize a pipeline under the given id. An existing
    /// pipeline under the same id is reset and replaced.
    pub fn create(&self, pipeline_id: &str) -> Pipeline {
        let pipeline = match &self.catalog {
            Some(catalog) => Pipeline::with_catalog(catalog, self.timing.clone()),
            None => Pipeline::new(self.timing.clone()),
        };
        pipeline.initialize(pipeline_id);

        let mut pipelines = self.pipelines.write().unwrap();
        if let Some(old) = pipelines.insert(pipeline_id.to_string(), pipeline.clone()) {
            old.reset();
        }
        pipeline
    }

    /// Handle for an existing pipeline.
    pub fn get(&self, pipeline_id: &str) -> Result<Pipeline> {
        self.pipelines
            .read()
            .unwrap()
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pipeline {pipeline_id}")))
    }

    /// Reset and drop a pipeline.
    pub fn remove(&self, pipeline_id: &str) -> Result<()> {
        let removed = self.pipelines.write().unwrap().remove(pipeline_id);
        match removed {
            Some(pipeline) => {
                pipeline.reset();
                Ok(())
            }
            None => Err(Error::NotFound(format!("pipeline {pipeline_id}"))),
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.read().unwrap().is_empty()
    }
}
