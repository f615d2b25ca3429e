//! Job status

use crate::resource::record::ResourceRecord;
use crate::resource::registry::JobDef;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Where a remote job is in its lifecycle.
///
/// `Submitted -> Running -> {Succeeded, Failed, Canceled, TimedOut}`.
/// `Errored` marks a job whose submission or polling raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    /// Deadline passed locally; the remote job may still be running
    TimedOut,
    Errored,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::Running)
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Submitted => "◯",
            Self::Running => "↻",
            Self::Succeeded => "✓",
            Self::Failed | Self::Errored => "✗",
            Self::Canceled => "⊘",
            Self::TimedOut => "⧗",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
        }
    }

    /// Read the status off a polled record using the kind's job definition
    pub fn from_record(job: &JobDef, record: &ResourceRecord) -> Self {
        let Some(state) = record.get_str(&job.state_field) else {
            return Self::Submitted;
        };
        if !job.terminal_states.iter().any(|s| s == state) {
            return Self::Running;
        }

        let result = record.get_str(&job.result_field).unwrap_or_default();
        if job.succeeded_results.iter().any(|r| r == result) {
            Self::Succeeded
        } else if job.canceled_results.iter().any(|r| r == result) {
            Self::Canceled
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format duration for display
pub fn duration_display(d: Duration) -> String {
    if d.as_secs() < 1 {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() < 60 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}
