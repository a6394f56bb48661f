//! End-to-end agent operations over a project directory.

pub mod compile;
pub mod publish;
pub mod run;
pub mod scaffold;
pub mod upload;

pub use compile::{CompileOptions, CompileOutcome};
pub use publish::{AgentAnswer, TestReport, DEFAULT_TEST_QUESTION};
pub use run::RunOutcome;
pub use upload::{UploadOptions, UploadOutcome};

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{DadError, Result};
use crate::lifecycle::{ResolvedWorkspace, Tracker};
use crate::remote::{Sleeper, TokioSleeper};
use crate::storage::JsonFileStore;
use crate::types::WorkspaceRecord;

/// Everything one command needs: where the project lives, its settings and
/// its tracked state.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub tracker: Tracker,
    sleeper: Box<dyn Sleeper>,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>, config: Config, tracker: Tracker) -> Self {
        Self {
            root: root.into(),
            config,
            tracker,
            sleeper: Box::new(TokioSleeper),
        }
    }

    /// Opens the JSON state file named by `config` under `root`.
    pub fn open(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root = root.into();
        let store = JsonFileStore::new(config.state_path(&root));
        let tracker = Tracker::open(Box::new(store))?;
        Ok(Self::new(root, config, tracker))
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Like [`Tracker::resolve_workspace`], falling back to a workspace id
    /// from the configuration when nothing is registered.
    pub fn resolve_workspace(&self, override_: Option<&str>) -> Result<ResolvedWorkspace> {
        match self.tracker.resolve_workspace(override_) {
            Err(DadError::NoActiveWorkspace) => {
                let id = self
                    .config
                    .workspace_id
                    .as_deref()
                    .ok_or(DadError::NoActiveWorkspace)?;
                Ok(ResolvedWorkspace {
                    name: None,
                    record: WorkspaceRecord::new(id, self.config.tenant_id.clone().unwrap_or_default())?,
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStateStore;

    const WS: &str = "4b9a3c1e-2f6d-4e8a-9c7b-1d2e3f4a5b6c";

    fn project(config: Config) -> Project {
        let tracker = Tracker::open(Box::new(InMemoryStateStore::new())).unwrap();
        Project::new("/tmp/dad", config, tracker)
    }

    #[test]
    fn test_workspace_falls_back_to_config() {
        let config = Config {
            workspace_id: Some(WS.to_string()),
            tenant_id: Some("tenant".to_string()),
            ..Config::default()
        };
        let resolved = project(config).resolve_workspace(None).unwrap();
        assert_eq!(resolved.record.id, WS);
        assert_eq!(resolved.record.tenant_id, "tenant");
    }

    #[test]
    fn test_no_workspace_anywhere() {
        assert!(matches!(
            project(Config::default()).resolve_workspace(None),
            Err(DadError::NoActiveWorkspace)
        ));
    }
}
