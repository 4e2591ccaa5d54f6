//! Job model: states, submission options, status snapshots and errors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use upe_manifest::CompileStatus;
use upe_utils::error::{ErrorInfo, ErrorKind, GeneratorError};

use crate::scheduler::SlotLease;

pub type JobId = String;

/// Lifecycle state of a job.
///
/// `Queued -> Running -> {Completed | Queued (retry) | Failed | Cancelled}`.
/// Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Coarse progress reported by status lookups.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 50,
            Self::Completed | Self::Failed | Self::Cancelled => 100,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation flag for running jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CancelFlag {
    #[default]
    NotRequested,
    /// Marked cancelled while running; the attempt is still executing
    Requested,
    /// The attempt finished and its result was discarded
    Acknowledged,
}

/// Per-submission overrides. Unset fields use the scheduler defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// 1 (lowest) to 10 (highest)
    pub priority: Option<u8>,
    pub max_attempts: Option<u32>,
    /// Hold the job before it becomes eligible for dispatch
    pub delay: Option<Duration>,
}

impl JobOptions {
    #[must_use]
    pub const fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Immediate reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: JobId,
    pub status: JobState,
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: JobId,
    pub job_type: String,
    pub state: JobState,
    /// 0 queued, 50 running, 100 terminal
    pub progress: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Cause of the last failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregate counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
    /// Executing attempts, including cancelled jobs still finishing
    pub active_slots: usize,
    pub max_concurrent: usize,
    /// Highest number of simultaneously executing attempts observed
    pub peak_active: usize,
}

/// Input handed to a [`JobHandler`](crate::JobHandler) for one attempt.
///
/// Holds the attempt's concurrency slot: every clone keeps it taken.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub job_type: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub(crate) lease: SlotLease,
}

impl JobContext {
    /// A handle on this attempt's concurrency slot.
    #[must_use]
    pub fn slot_lease(&self) -> SlotLease {
        self.lease.clone()
    }
}

/// Why a job attempt failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Unknown job type '{0}'")]
    UnknownType(String),

    #[error("Invalid payload for '{job_type}' job: {reason}")]
    InvalidPayload { job_type: String, reason: String },

    #[error("Compile finished with status {status}{}", detail_suffix(.detail))]
    CompileNotOk {
        status: CompileStatus,
        detail: Option<ErrorInfo>,
    },

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job attempt aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Handler(String),
}

fn detail_suffix(detail: &Option<ErrorInfo>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {}", d.message))
        .unwrap_or_default()
}

impl JobError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownType(_) | Self::InvalidPayload { .. } => ErrorKind::Validation,
            Self::CompileNotOk {
                detail: Some(info), ..
            } => info.kind,
            Self::CompileNotOk { detail: None, .. } => ErrorKind::Validation,
            Self::Generator(_) | Self::Timeout(_) | Self::Handler(_) => ErrorKind::Compute,
            Self::Aborted(_) => ErrorKind::Internal,
        }
    }

    /// Only compute failures are retried. Validation failures and compiles
    /// that did not reach OK fail the same way on every attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Generator(_) | Self::Timeout(_) | Self::Handler(_))
    }

    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}
