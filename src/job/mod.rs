//! Long-running jobs
//!
//! Builds and pipeline runs are created like any other resource and then
//! polled until the backend reports a terminal status or the caller's
//! deadline passes.

pub mod batch;
pub mod engine;
pub mod status;

pub use batch::{BatchMode, BatchRunner};
pub use engine::PollingEngine;
pub use status::JobStatus;

use crate::error::AdoError;
use crate::resource::record::{Identity, ResourceRecord};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// A job to submit
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Definition (or pipeline) to run
    pub definition: Identity,
    pub parameters: Map<String, Value>,
    pub source_branch: Option<String>,
    pub timeout: Duration,
}

impl JobSpec {
    pub fn new(definition: impl Into<Identity>, timeout: Duration) -> Self {
        Self {
            definition: definition.into(),
            parameters: Map::new(),
            source_branch: None,
            timeout,
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.source_branch = Some(branch.to_string());
        self
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// What happened to one submitted spec
#[derive(Debug)]
pub struct JobOutcome {
    /// Absent only when submission itself failed
    pub job_identity: Option<Identity>,
    pub status: JobStatus,
    /// The last polled record, or why there is none
    pub result: Result<ResourceRecord, AdoError>,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn finished(record: ResourceRecord, status: JobStatus, elapsed: Duration) -> Self {
        Self {
            job_identity: Some(record.identity.clone()),
            status,
            result: Ok(record),
            elapsed,
        }
    }

    pub fn timed_out(identity: Identity, elapsed: Duration) -> Self {
        Self {
            result: Err(AdoError::TimedOut {
                job: identity.to_string(),
                elapsed,
            }),
            job_identity: Some(identity),
            status: JobStatus::TimedOut,
            elapsed,
        }
    }

    /// Submission failed, there is no job
    pub fn errored(error: AdoError, elapsed: Duration) -> Self {
        Self {
            job_identity: None,
            status: JobStatus::Errored,
            result: Err(error),
            elapsed,
        }
    }

    /// The job exists but could not be followed to the end
    pub fn errored_with(identity: Identity, error: AdoError, elapsed: Duration) -> Self {
        Self {
            job_identity: Some(identity),
            ..Self::errored(error, elapsed)
        }
    }

    /// What a planning session reports instead of running the job
    pub fn planned(record: ResourceRecord) -> Self {
        Self {
            job_identity: Some(record.identity.clone()),
            status: JobStatus::Submitted,
            result: Ok(record),
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Summary for reports
    pub fn to_json(&self) -> Value {
        let mut summary = json!({
            "job": self.job_identity.as_ref().map(Identity::to_value),
            "status": self.status,
            "elapsed": status::duration_display(self.elapsed),
        });
        match &self.result {
            Ok(record) => summary["record"] = record.to_json(),
            Err(e) => summary["error"] = Value::String(e.to_string()),
        }
        summary
    }
}
