use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Job status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in queue
    Pending,
    /// Job is currently being processed
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed (may be requeued)
    Failed,
    /// Job failed permanently (max retries exceeded)
    Dead,
    /// Job was cancelled by an operator
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle action a job asks the orchestrator to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Create,
    Update,
    Refresh,
    Recreate,
    Delete,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Refresh => "refresh",
            Self::Recreate => "recreate",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "refresh" => Some(Self::Refresh),
            "recreate" => Some(Self::Recreate),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Lifecycle job submitted to the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleJob {
    /// Unique job identifier
    pub id: Uuid,

    /// Which workflow to run
    pub action: LifecycleAction,

    /// Name of the environment the workflow targets
    pub environment: String,

    /// Current status
    pub status: JobStatus,

    /// Retry information
    pub retry_count: u32,
    pub max_retries: u32,

    /// Timestamps
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,

    /// Error message if failed
    pub error_message: Option<String>,
}

impl LifecycleJob {
    pub fn new(action: LifecycleAction, environment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            environment: environment.into(),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
