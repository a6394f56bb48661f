pub mod auth;
pub mod fabric;
pub mod retry;

pub use auth::Credential;
pub use fabric::{agent_endpoint, FabricClient, DEFAULT_API_BASE};
pub use retry::{poll_job, JobOutcome, PollPolicy, RetryPolicy, Sleeper, TokioSleeper};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// A notebook item in a Fabric workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNotebook {
    pub id: String,
    pub display_name: String,
}

/// Any workspace item, e.g. a data agent produced by a notebook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub display_name: String,
    pub item_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
    Deduped,
}

impl JobState {
    /// Maps the service's status strings; anything unrecognised is treated
    /// as still running.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "notstarted" => JobState::NotStarted,
            "completed" | "succeeded" => JobState::Succeeded,
            "failed" => JobState::Failed,
            "cancelled" | "canceled" => JobState::Cancelled,
            "deduped" => JobState::Deduped,
            _ => JobState::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled | JobState::Deduped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotStarted => "not_started",
            JobState::InProgress => "in_progress",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Deduped => "deduped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub failure_reason: Option<String>,
}

/// The Fabric operations the workflow depends on.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create_notebook(
        &self,
        workspace_id: &str,
        display_name: &str,
        content: &str,
    ) -> Result<RemoteNotebook>;

    async fn update_notebook(&self, workspace_id: &str, notebook_id: &str, content: &str)
        -> Result<()>;

    /// Looks a notebook up by id first, then by display name.
    async fn find_notebook(
        &self,
        workspace_id: &str,
        notebook_id: Option<&str>,
        display_name: &str,
    ) -> Result<Option<RemoteNotebook>>;

    async fn list_notebooks(&self, workspace_id: &str) -> Result<Vec<RemoteNotebook>>;

    /// Starts a notebook run and returns the job instance id.
    async fn start_notebook_job(
        &self,
        workspace_id: &str,
        notebook_id: &str,
        inline_install: bool,
    ) -> Result<String>;

    async fn job_status(&self, workspace_id: &str, notebook_id: &str, job_id: &str)
        -> Result<JobStatus>;

    async fn list_data_agents(&self, workspace_id: &str) -> Result<Vec<RemoteItem>>;

    /// Sends one question to a published agent endpoint and returns the answer.
    async fn ask_agent(&self, endpoint_url: &str, question: &str) -> Result<String>;
}
