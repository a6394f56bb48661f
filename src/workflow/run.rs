use chrono::Utc;

use super::Project;
use crate::convert::fabric::has_inline_directives;
use crate::error::{DadError, Result};
use crate::lifecycle::require_remote_notebook;
use crate::remote::{agent_endpoint, poll_job, JobOutcome, JobState, RemoteClient, RemoteItem};
use crate::types::{folder_name, AgentFields, AgentRecord, JobSummary, Stage};

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: AgentRecord,
    pub job: JobOutcome,
    /// The data agent the run produced, when one could be matched.
    pub agent: Option<RemoteItem>,
    /// Where the matched agent will be reachable once published.
    pub suggested_endpoint: Option<String>,
}

fn summarize(outcome: &JobOutcome) -> JobSummary {
    JobSummary {
        job_id: outcome.job_id.clone(),
        status: outcome.state.as_str().to_string(),
        succeeded: outcome.state == JobState::Succeeded,
        runtime_secs: outcome.waited.as_secs(),
        finished_at: Utc::now(),
    }
}

fn job_failure(outcome: JobOutcome) -> DadError {
    DadError::JobFailed {
        job_id: outcome.job_id,
        status: outcome.state.as_str().to_string(),
        reason: outcome.failure_reason,
    }
}

/// Data agents are matched by display name, exactly or by folder form.
fn matching_agent(agents: Vec<RemoteItem>, record: &AgentRecord) -> Option<RemoteItem> {
    let wanted = folder_name(&record.name);
    agents
        .into_iter()
        .find(|a| a.display_name == record.name || folder_name(&a.display_name) == wanted)
}

impl Project {
    async fn start_and_poll(
        &self,
        client: &dyn RemoteClient,
        workspace_id: &str,
        notebook_id: &str,
        inline_install: bool,
    ) -> Result<JobOutcome> {
        let retry = self.config.retry_policy();
        let job_id = retry
            .run(self.sleeper(), "start notebook job", || {
                client.start_notebook_job(workspace_id, notebook_id, inline_install)
            })
            .await?;

        poll_job(
            client,
            &retry,
            &self.config.poll_policy(),
            self.sleeper(),
            workspace_id,
            notebook_id,
            &job_id,
        )
        .await
    }

    /// Runs the agent's uploaded notebook to completion. On success the
    /// agent moves to `executed`, carrying the id of the data agent the
    /// notebook created.
    pub async fn run_agent(
        &mut self,
        client: &dyn RemoteClient,
        name: &str,
        workspace: Option<&str>,
    ) -> Result<RunOutcome> {
        let record = self.tracker.get(name)?.clone();
        let notebook_id = require_remote_notebook(&record)?.to_string();
        let workspace = self.resolve_workspace(workspace.or(record.workspace_id.as_deref()))?;
        let workspace_id = workspace.record.id.as_str();

        let inline_install = match &record.artifact_path {
            Some(path) => std::fs::read_to_string(self.path(path))
                .map(|source| has_inline_directives(&source))
                .unwrap_or(false),
            None => false,
        };

        log::info!("Running notebook {} for '{}'", notebook_id, name);
        let job = self
            .start_and_poll(client, workspace_id, &notebook_id, inline_install)
            .await?;

        let summary = summarize(&job);
        if job.state != JobState::Succeeded {
            self.tracker.update(
                name,
                AgentFields {
                    last_job: Some(summary),
                    ..AgentFields::default()
                },
            )?;
            return Err(job_failure(job));
        }

        let agents = self
            .config
            .retry_policy()
            .run(self.sleeper(), "list data agents", || {
                client.list_data_agents(workspace_id)
            })
            .await?;
        let agent = matching_agent(agents, &record);
        if agent.is_none() {
            log::warn!(
                "Run of '{}' succeeded but no data agent with that name was found",
                name
            );
        }

        let suggested_endpoint = agent
            .as_ref()
            .map(|a| agent_endpoint(&self.config.api_base, workspace_id, &a.id));
        let record = self.tracker.advance(
            name,
            Stage::Executed,
            AgentFields {
                remote_agent_id: agent.as_ref().map(|a| a.id.clone()),
                last_job: Some(summary),
                ..AgentFields::default()
            },
        )?;

        Ok(RunOutcome {
            record,
            job,
            agent,
            suggested_endpoint,
        })
    }

    /// Runs any notebook in a workspace, by id or display name, without
    /// touching tracked state.
    pub async fn run_notebook(
        &self,
        client: &dyn RemoteClient,
        workspace: Option<&str>,
        notebook: &str,
    ) -> Result<JobOutcome> {
        let workspace = self.resolve_workspace(workspace)?;
        let workspace_id = workspace.record.id.as_str();

        let found = self
            .config
            .retry_policy()
            .run(self.sleeper(), "find notebook", || {
                client.find_notebook(workspace_id, Some(notebook), notebook)
            })
            .await?
            .ok_or_else(|| DadError::RemoteRejected {
                operation: "find notebook".to_string(),
                status: 404,
                body: format!("no notebook '{}' in workspace {}", notebook, workspace_id),
            })?;

        let job = self
            .start_and_poll(client, workspace_id, &found.id, true)
            .await?;
        if job.state != JobState::Succeeded {
            return Err(job_failure(job));
        }
        Ok(job)
    }
}
