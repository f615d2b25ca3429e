//! Polling Engine
//!
//! Submits a job through the kind's manager and re-reads it on a fixed
//! interval, bypassing the cache, until the status is terminal or the
//! deadline passes. Status reads are cut off at the deadline too, so a hung
//! request cannot hold a job past its budget. A timeout is a local
//! observation: the remote job keeps running and can be cancelled with an
//! explicit delete.

use super::status::{duration_display, JobStatus};
use super::{JobOutcome, JobSpec};
use crate::error::{AdoError, Result};
use crate::resource::manager::ResourceManager;
use crate::resource::record::{Identity, ResourceRecord};
use crate::resource::registry::JobDef;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Why a status read produced no record
enum ReadFailure {
    Error(AdoError),
    Deadline,
}

impl ReadFailure {
    fn into_outcome(self, identity: Identity, elapsed: Duration) -> JobOutcome {
        match self {
            Self::Error(e) => JobOutcome::errored_with(identity, e, elapsed),
            Self::Deadline => JobOutcome::timed_out(identity, elapsed),
        }
    }
}

#[derive(Clone)]
pub struct PollingEngine {
    manager: ResourceManager,
    job: &'static JobDef,
    poll_interval: Duration,
}

impl PollingEngine {
    pub fn new(manager: ResourceManager) -> Result<Self> {
        let Some(job) = manager.def().job.as_ref() else {
            return Err(AdoError::Unsupported {
                kind: manager.kind().to_string(),
                operation: "polling",
            });
        };
        let poll_interval = manager.session().poll_interval();

        Ok(Self {
            manager,
            job,
            poll_interval,
        })
    }

    pub fn kind(&self) -> &'static str {
        self.manager.kind()
    }

    /// Submit `spec` and wait for it.
    ///
    /// Only a failed submission is returned as an error. Once the job exists
    /// every outcome, including a failed status read, carries its identity.
    pub async fn create_and_wait(&self, spec: &JobSpec) -> Result<JobOutcome> {
        let started = Instant::now();
        let (manager, params) = self.submission(spec);

        let record = manager.create(params).await?;
        tracing::info!(
            "Submitted {} {} for definition {}",
            self.kind(),
            record.identity,
            spec.definition
        );

        if manager.session().is_planning() {
            return Ok(JobOutcome::planned(record));
        }
        Ok(self.poll(&manager, record, started, spec.timeout).await)
    }

    /// Wait for a job that already exists
    pub async fn wait(&self, identity: &Identity, timeout: Duration) -> JobOutcome {
        let started = Instant::now();
        match self.read(&self.manager, identity, started + timeout).await {
            Ok(record) => self.poll(&self.manager, record, started, timeout).await,
            Err(failure) => failure.into_outcome(identity.clone(), started.elapsed()),
        }
    }

    /// Manager and create parameters for one spec
    fn submission(&self, spec: &JobSpec) -> (ResourceManager, serde_json::Map<String, Value>) {
        let mut params = serde_json::Map::new();
        let mut manager = self.manager.clone();

        if self.job.definition_in_scope {
            manager = manager.scoped(&self.job.definition_param, &spec.definition);
        } else {
            params.insert(self.job.definition_param.clone(), spec.definition.to_value());
        }

        if let (Some(param), Some(branch)) = (&self.job.branch_param, &spec.source_branch) {
            params.insert(param.clone(), Value::String(branch.clone()));
        }
        if let Some(param) = &self.job.parameters_param {
            if !spec.parameters.is_empty() {
                params.insert(param.clone(), Value::Object(spec.parameters.clone()));
            }
        }

        (manager, params)
    }

    /// Fresh status read that gives up at `deadline`
    async fn read(
        &self,
        manager: &ResourceManager,
        identity: &Identity,
        deadline: Instant,
    ) -> std::result::Result<ResourceRecord, ReadFailure> {
        match tokio::time::timeout_at(deadline, manager.refresh(identity)).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(e)) => {
                tracing::warn!("Reading {} {} failed: {}", self.kind(), identity, e);
                Err(ReadFailure::Error(e))
            },
            Err(_) => {
                tracing::warn!(
                    "{} {} status read still pending at the deadline, giving up",
                    self.kind(),
                    identity
                );
                Err(ReadFailure::Deadline)
            },
        }
    }

    async fn poll(
        &self,
        manager: &ResourceManager,
        mut record: ResourceRecord,
        started: Instant,
        timeout: Duration,
    ) -> JobOutcome {
        let identity = record.identity.clone();
        let deadline = started + timeout;
        let mut polls: u32 = 0;

        loop {
            let status = JobStatus::from_record(self.job, &record);
            if status.is_terminal() {
                let elapsed = started.elapsed();
                tracing::info!(
                    "{} {} {} {} after {} ({} polls)",
                    status.icon(),
                    self.kind(),
                    identity,
                    status,
                    duration_display(elapsed),
                    polls
                );
                return JobOutcome::finished(record, status, elapsed);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::warn!(
                    "{} {} still {} after {}, giving up",
                    self.kind(),
                    identity,
                    status,
                    duration_display(elapsed)
                );
                return JobOutcome::timed_out(identity, elapsed);
            }

            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
            record = match self.read(manager, &identity, deadline).await {
                Ok(record) => record,
                Err(failure) => return failure.into_outcome(identity, started.elapsed()),
            };
            polls += 1;
            tracing::debug!("poll {} {} #{}", self.kind(), identity, polls);
        }
    }
}
