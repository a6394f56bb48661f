use super::compile::CompileOptions;
use super::Project;
use crate::error::{DadError, Result};
use crate::remote::{RemoteClient, RemoteNotebook};
use crate::types::{AgentFields, AgentRecord, Stage};

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Workspace name or id; defaults to the active workspace.
    pub workspace: Option<String>,
    /// Remote display name; defaults to the agent name.
    pub display_name: Option<String>,
    /// Replace the definition of an existing remote notebook.
    pub update: bool,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: AgentRecord,
    pub notebook: RemoteNotebook,
    pub created: bool,
}

impl Project {
    /// Publishes the agent's artifact as a Fabric notebook, compiling first
    /// if no artifact exists yet.
    pub async fn upload_agent(
        &mut self,
        client: &dyn RemoteClient,
        name: &str,
        options: &UploadOptions,
    ) -> Result<UploadOutcome> {
        let mut record = self.tracker.get(name)?.clone();

        let artifact_missing = record
            .artifact_path
            .as_ref()
            .map_or(true, |path| !self.path(path).exists());
        if artifact_missing {
            log::info!("No compiled artifact for '{}'; compiling first", name);
            record = self.compile_agent(name, &CompileOptions::default())?.0;
        }

        let artifact_path = record.artifact_path.clone().unwrap_or_default();
        let artifact_file = self.path(&artifact_path);
        let content =
            std::fs::read_to_string(&artifact_file).map_err(|e| DadError::io(&artifact_file, e))?;

        let workspace = self.resolve_workspace(options.workspace.as_deref())?;
        let workspace_id = workspace.record.id.as_str();
        let display_name = options.display_name.as_deref().unwrap_or(&record.name);

        // A stored id only means something in the workspace it came from.
        let known_id = record
            .remote_notebook_id
            .as_deref()
            .filter(|_| record.workspace_id.as_deref() == Some(workspace_id));

        let retry = self.config.retry_policy();
        let existing = retry
            .run(self.sleeper(), "find notebook", || {
                client.find_notebook(workspace_id, known_id, display_name)
            })
            .await?;

        let (notebook, created) = match existing {
            Some(notebook) if options.update => {
                retry
                    .run(self.sleeper(), "update notebook", || {
                        client.update_notebook(workspace_id, &notebook.id, &content)
                    })
                    .await?;
                (notebook, false)
            }
            Some(notebook) => {
                return Err(DadError::RemoteNotebookExists {
                    display_name: notebook.display_name,
                    notebook_id: notebook.id,
                })
            }
            None => {
                // A create whose response was lost may still have landed, so
                // later attempts look for it before posting again.
                let content = content.as_str();
                let mut attempt = 0u32;
                let notebook = retry
                    .run(self.sleeper(), "upload notebook", || {
                        attempt += 1;
                        let first = attempt == 1;
                        async move {
                            if !first {
                                if let Some(notebook) =
                                    client.find_notebook(workspace_id, None, display_name).await?
                                {
                                    log::info!(
                                        "Notebook '{}' was created by an earlier attempt ({})",
                                        display_name,
                                        notebook.id
                                    );
                                    return Ok(notebook);
                                }
                            }
                            client.create_notebook(workspace_id, display_name, content).await
                        }
                    })
                    .await?;
                (notebook, true)
            }
        };

        let record = self.tracker.advance(
            name,
            Stage::Uploaded,
            AgentFields {
                remote_notebook_id: Some(notebook.id.clone()),
                workspace_id: Some(workspace.record.id.clone()),
                ..AgentFields::default()
            },
        )?;

        Ok(UploadOutcome {
            record,
            notebook,
            created,
        })
    }
}
