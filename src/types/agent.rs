use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DadError, Result};

/// Lifecycle stage of an agent. Variants are declared in their forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Uploaded,
    Executed,
    Deployed,
    Tested,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::Uploaded => "uploaded",
            Stage::Executed => "executed",
            Stage::Deployed => "deployed",
            Stage::Tested => "tested",
        }
    }

    pub fn all() -> [Stage; 5] {
        [
            Stage::Created,
            Stage::Uploaded,
            Stage::Executed,
            Stage::Deployed,
            Stage::Tested,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DadError;

    fn from_str(s: &str) -> Result<Self> {
        Stage::all()
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DadError::Config(format!("unknown stage `{}`", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: String,
    pub succeeded: bool,
    pub runtime_secs: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub folder: String,
    pub notebook_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    /// Id of the workspace the notebook was uploaded to.
    #[serde(default, alias = "workspace", skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_notebook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job: Option<JobSummary>,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>, notebook_path: PathBuf) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            folder: folder_name(&name),
            name,
            notebook_path,
            artifact_path: None,
            workspace_id: None,
            remote_notebook_id: None,
            remote_agent_id: None,
            endpoint_url: None,
            last_job: None,
            stage: Stage::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites every field that is set in `fields`.
    pub fn merge(&mut self, fields: AgentFields) {
        let AgentFields {
            artifact_path,
            workspace_id,
            remote_notebook_id,
            remote_agent_id,
            endpoint_url,
            last_job,
        } = fields;

        if artifact_path.is_some() {
            self.artifact_path = artifact_path;
        }
        if workspace_id.is_some() {
            self.workspace_id = workspace_id;
        }
        if remote_notebook_id.is_some() {
            self.remote_notebook_id = remote_notebook_id;
        }
        if remote_agent_id.is_some() {
            self.remote_agent_id = remote_agent_id;
        }
        if endpoint_url.is_some() {
            self.endpoint_url = endpoint_url;
        }
        if last_job.is_some() {
            self.last_job = last_job;
        }
    }
}

/// Partial update applied by `Tracker::advance`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentFields {
    pub artifact_path: Option<PathBuf>,
    pub workspace_id: Option<String>,
    pub remote_notebook_id: Option<String>,
    pub remote_agent_id: Option<String>,
    pub endpoint_url: Option<String>,
    pub last_job: Option<JobSummary>,
}

impl AgentFields {
    pub fn artifact(path: PathBuf) -> Self {
        Self {
            artifact_path: Some(path),
            ..Self::default()
        }
    }

    pub fn remote_notebook(id: impl Into<String>) -> Self {
        Self {
            remote_notebook_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn endpoint(url: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Directory name used for an agent: lowercase, with spaces and hyphens
/// folded to underscores.
pub fn folder_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn validate_agent_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| DadError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid("name is empty"));
    }
    if trimmed.len() != name.len() {
        return Err(invalid("leading or trailing whitespace"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_')))
    {
        return Err(invalid(&format!("character `{}` is not allowed", c)));
    }
    Ok(())
}
