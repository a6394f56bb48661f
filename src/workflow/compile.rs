use std::path::PathBuf;

use super::Project;
use crate::convert::{Artifact, ConvertOptions, Converter, DirectivePolicy};
use crate::error::Result;
use crate::types::{AgentFields, AgentRecord};

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Directory for the artifact, relative to the project root. Defaults to
    /// the agent's folder.
    pub output_dir: Option<PathBuf>,
    /// File name for the artifact. Defaults to `{folder}_fabric.py`.
    pub output_name: Option<String>,
    /// Overrides the configured directive policy.
    pub policy: Option<DirectivePolicy>,
}

/// Result of compiling one agent as part of [`Project::compile_all`].
#[derive(Debug)]
pub struct CompileOutcome {
    pub agent: String,
    pub result: Result<PathBuf>,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

pub fn default_artifact_name(folder: &str) -> String {
    format!("{}_fabric.py", folder)
}

impl Project {
    fn converter(&self, policy: Option<DirectivePolicy>) -> Converter {
        let lakehouse = self
            .tracker
            .active_workspace()
            .and_then(|(_, workspace)| workspace.lakehouse());

        Converter::new(ConvertOptions {
            policy: policy.unwrap_or(self.config.directive_policy),
            lakehouse,
        })
    }

    fn artifact_path(record: &AgentRecord, options: &CompileOptions) -> PathBuf {
        let dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&record.folder));
        let mut name = options
            .output_name
            .clone()
            .unwrap_or_else(|| default_artifact_name(&record.folder));
        if !name.ends_with(".py") {
            name.push_str(".py");
        }
        dir.join(name)
    }

    /// Converts the agent's notebook and records where the artifact went.
    /// The stage is left alone.
    pub fn compile_agent(&mut self, name: &str, options: &CompileOptions) -> Result<(AgentRecord, Artifact)> {
        let record = self.tracker.get(name)?.clone();
        let artifact_path = Self::artifact_path(&record, options);

        let artifact = self.converter(options.policy).convert_file(
            &self.path(&record.notebook_path),
            &self.path(&artifact_path),
        )?;

        let record = self
            .tracker
            .update(name, AgentFields::artifact(artifact_path))?;
        Ok((record, artifact))
    }

    /// Compiles every tracked agent, continuing past failures. A custom
    /// `output_name` is ignored here since names would collide.
    pub fn compile_all(&mut self, options: &CompileOptions) -> Vec<CompileOutcome> {
        let names: Vec<String> = self.tracker.list().iter().map(|r| r.name.clone()).collect();
        let options = CompileOptions {
            output_name: None,
            ..options.clone()
        };

        names
            .into_iter()
            .map(|name| {
                let result = self
                    .compile_agent(&name, &options)
                    .map(|(record, _)| record.artifact_path.unwrap_or_default());
                if let Err(e) = &result {
                    log::warn!("Failed to compile '{}': {}", name, e);
                }
                CompileOutcome { agent: name, result }
            })
            .collect()
    }
}
