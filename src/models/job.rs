//! Job instances created when a trigger fires.
//!
//! Jobs move through a small status state machine and are retained for
//! history; nothing deletes them automatically.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite key of a job: (id, namespace)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub id: String,
    pub namespace: String,
}

impl JobId {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Initial state when a trigger fire creates the job
    Created,
    /// The execution subsystem has picked the job up
    Running,
    /// Terminal: all tasks finished successfully
    Successful,
    /// Terminal: execution failed
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// Legal transitions of the job state machine
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        match self {
            Self::Created => matches!(to, Self::Running | Self::Successful | Self::Failed),
            Self::Running => matches!(to, Self::Successful | Self::Failed),
            Self::Successful | Self::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Successful => write!(f, "successful"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// One instance produced by a trigger fire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub workflow: String,
    pub trigger: String,
    pub namespace: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Set once the job reaches a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        workflow: impl Into<String>,
        trigger: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow: workflow.into(),
            trigger: trigger.into(),
            namespace: namespace.into(),
            status: JobStatus::Created,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn job_id(&self) -> JobId {
        JobId::new(self.id.clone(), self.namespace.clone())
    }
}
