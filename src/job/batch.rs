//! Batch Runner
//!
//! Runs many job specs through one polling engine. Both modes return exactly
//! one outcome per spec, in input order, and never abort on a failed spec.

use super::engine::PollingEngine;
use super::{JobOutcome, JobSpec};
use crate::error::AdoError;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One job at a time
    #[default]
    Sequential,
    /// One task per job, joined once
    Simultaneous,
}

#[derive(Clone)]
pub struct BatchRunner {
    engine: PollingEngine,
}

impl BatchRunner {
    pub fn new(engine: PollingEngine) -> Self {
        Self { engine }
    }

    pub async fn run(&self, specs: &[JobSpec], mode: BatchMode) -> Vec<JobOutcome> {
        match mode {
            BatchMode::Sequential => self.run_sequential(specs).await,
            BatchMode::Simultaneous => self.run_simultaneous(specs).await,
        }
    }

    pub async fn run_sequential(&self, specs: &[JobSpec]) -> Vec<JobOutcome> {
        tracing::info!("Running {} {} jobs sequentially", specs.len(), self.engine.kind());
        let mut outcomes = Vec::with_capacity(specs.len());
        for spec in specs {
            outcomes.push(run_one(&self.engine, spec).await);
        }
        outcomes
    }

    pub async fn run_simultaneous(&self, specs: &[JobSpec]) -> Vec<JobOutcome> {
        tracing::info!("Running {} {} jobs simultaneously", specs.len(), self.engine.kind());
        let handles: Vec<_> = specs
            .iter()
            .cloned()
            .map(|spec| {
                let engine = self.engine.clone();
                tokio::spawn(async move { run_one(&engine, &spec).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => JobOutcome::errored(
                    AdoError::Internal(format!("job task failed: {}", e)),
                    Duration::ZERO,
                ),
            })
            .collect()
    }
}

async fn run_one(engine: &PollingEngine, spec: &JobSpec) -> JobOutcome {
    let started = Instant::now();
    match engine.create_and_wait(spec).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("{} job for {} errored: {}", engine.kind(), spec.definition, e);
            JobOutcome::errored(e, started.elapsed())
        },
    }
}
