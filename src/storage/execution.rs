//! Single-slot durable record of the pipeline execution being tracked.
//!
//! Reads fail open: a missing, unreadable or corrupt record is reported as
//! "no record" and logged, never returned as an error.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{Pool, KEY_CURRENT_PIPELINE_NAME, KEY_EXECUTION_PHASE, KEY_PIPELINE_EXECUTION};
use crate::model::PipelineExecution;

/// Fallback display name when no pipeline name was stored.
pub const UNKNOWN_PIPELINE: &str = "Unknown Pipeline";

#[derive(Clone)]
pub struct ExecutionStore {
    pool: Pool,
}

impl ExecutionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Replace the stored record wholesale.
    pub fn save(&self, execution: &PipelineExecution) -> Result<()> {
        let json = serde_json::to_string(execution)?;
        super::put_value(&self.pool, KEY_PIPELINE_EXECUTION, &json)
            .context("Failed to save pipeline execution")?;
        debug!(
            project = %execution.project_name,
            pipeline_id = execution.pipeline_id,
            run_id = execution.run_id,
            running = execution.status.is_running,
            "Saved pipeline execution"
        );
        Ok(())
    }

    /// The stored record, or `None` when absent or unparsable.
    pub fn get(&self) -> Option<PipelineExecution> {
        let raw = match super::get_value(&self.pool, KEY_PIPELINE_EXECUTION) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read pipeline execution: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(execution) => Some(execution),
            Err(e) => {
                warn!("Ignoring corrupt pipeline execution record: {}", e);
                None
            }
        }
    }

    /// Drop the record together with its phase.
    pub fn clear(&self) -> Result<()> {
        super::remove_value(&self.pool, KEY_PIPELINE_EXECUTION)
            .context("Failed to clear pipeline execution")?;
        super::remove_value(&self.pool, KEY_EXECUTION_PHASE)
            .context("Failed to clear execution phase")
    }

    pub fn save_phase(&self, phase: &str) -> Result<()> {
        super::put_value(&self.pool, KEY_EXECUTION_PHASE, phase)
            .context("Failed to save execution phase")
    }

    /// Last saved phase label, if any.
    pub fn phase(&self) -> Option<String> {
        super::get_value(&self.pool, KEY_EXECUTION_PHASE)
            .map_err(|e| warn!("Failed to read execution phase: {}", e))
            .ok()
            .flatten()
    }

    pub fn set_current_pipeline_name(&self, name: &str) -> Result<()> {
        super::put_value(&self.pool, KEY_CURRENT_PIPELINE_NAME, name)
            .context("Failed to save current pipeline name")
    }

    pub fn current_pipeline_name(&self) -> String {
        match super::get_value(&self.pool, KEY_CURRENT_PIPELINE_NAME) {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => UNKNOWN_PIPELINE.to_string(),
            Err(e) => {
                warn!("Failed to read current pipeline name: {}", e);
                UNKNOWN_PIPELINE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionStatus;
    use crate::storage::{open_memory_pool, put_value};

    fn store() -> ExecutionStore {
        ExecutionStore::new(open_memory_pool().unwrap())
    }

    #[test]
    fn test_save_then_get_round_trips() {
        let store = store();
        let mut exec = PipelineExecution::new("Sample", 42).with_pipeline_name("Smoke");
        exec.run_id = 777;
        exec.status = ExecutionStatus::running("inProgress");

        store.save(&exec).unwrap();
        assert_eq!(store.get(), Some(exec));
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let store = store();
        store.save(&PipelineExecution::new("First", 1)).unwrap();
        store.save(&PipelineExecution::new("Second", 2)).unwrap();

        let current = store.get().unwrap();
        assert_eq!(current.project_name, "Second");
        assert_eq!(current.pipeline_id, 2);
    }

    #[test]
    fn test_clear_then_get_returns_none() {
        let store = store();
        store.save(&PipelineExecution::new("Sample", 42)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_corrupt_record_reads_as_none() {
        let pool = open_memory_pool().unwrap();
        put_value(&pool, KEY_PIPELINE_EXECUTION, "{not json").unwrap();
        let store = ExecutionStore::new(pool);
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_clear_drops_saved_phase() {
        let store = store();
        store.save(&PipelineExecution::new("Sample", 42)).unwrap();
        store.save_phase("succeeded").unwrap();
        assert_eq!(store.phase().as_deref(), Some("succeeded"));

        store.clear().unwrap();
        assert_eq!(store.phase(), None);
    }

    #[test]
    fn test_current_pipeline_name_defaults() {
        let store = store();
        assert_eq!(store.current_pipeline_name(), UNKNOWN_PIPELINE);
        store.set_current_pipeline_name("Regression").unwrap();
        assert_eq!(store.current_pipeline_name(), "Regression");
    }
}
