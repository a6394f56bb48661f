use std::path::{Component, Path, PathBuf};

use super::Project;
use crate::error::{DadError, Result};
use crate::templates;
use crate::types::{folder_name, validate_agent_name, AgentRecord};

impl Project {
    /// Writes `{folder}/{folder}.ipynb` and a README, then tracks the agent
    /// at `created`. With `force`, an existing record and its files are
    /// replaced.
    pub fn init_agent(&mut self, name: &str, force: bool) -> Result<AgentRecord> {
        validate_agent_name(name)?;

        let folder = folder_name(name);
        let notebook_path = PathBuf::from(&folder).join(format!("{}.ipynb", folder));
        let notebook_file = self.path(&notebook_path);

        if !force && (self.tracker.contains(name) || notebook_file.exists()) {
            return Err(DadError::DuplicateName(name.to_string()));
        }
        if force && self.tracker.contains(name) {
            self.tracker.remove(name)?;
        }

        let dir = self.root.join(&folder);
        std::fs::create_dir_all(&dir).map_err(|e| DadError::io(&dir, e))?;
        std::fs::write(&notebook_file, templates::starter_notebook(name))
            .map_err(|e| DadError::io(&notebook_file, e))?;

        let readme = dir.join("README.md");
        std::fs::write(&readme, templates::readme(name, &folder))
            .map_err(|e| DadError::io(&readme, e))?;

        log::info!("Scaffolded agent '{}' in {}", name, dir.display());
        self.tracker.create(name, notebook_path)
    }

    /// Stops tracking an agent; with `delete_files`, also removes its folder
    /// and compiled artifact.
    pub fn remove_agent(&mut self, name: &str, delete_files: bool) -> Result<AgentRecord> {
        if delete_files {
            // Paths come from the state file; only delete inside the project.
            let record = self.tracker.get(name)?;
            validate_agent_name(&record.folder)?;
            if let Some(artifact) = record.artifact_path.as_deref().filter(|p| !is_contained(p)) {
                return Err(DadError::Config(format!(
                    "refusing to delete {}: not inside the project",
                    artifact.display()
                )));
            }
        }

        let record = self.tracker.remove(name)?;

        if delete_files {
            if let Some(artifact) = &record.artifact_path {
                let path = self.path(artifact);
                if path.is_file() {
                    std::fs::remove_file(&path).map_err(|e| DadError::io(&path, e))?;
                }
            }
            let dir = self.root.join(&record.folder);
            if dir.is_dir() {
                std::fs::remove_dir_all(&dir).map_err(|e| DadError::io(&dir, e))?;
                log::info!("Deleted {}", dir.display());
            }
        }

        Ok(record)
    }
}

/// A relative path made only of plain components.
fn is_contained(path: &Path) -> bool {
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}
