use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{AgentName, AgentRecord, WorkspaceName, WorkspaceRecord};

/// Everything the tool persists, written as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub workspaces: BTreeMap<WorkspaceName, WorkspaceRecord>,
    #[serde(default)]
    pub active_workspace: Option<WorkspaceName>,
    #[serde(default)]
    pub agents: BTreeMap<AgentName, AgentRecord>,
}

/// Backing store for the state document. Implementations replace the whole
/// document on every save; there is no merging between writers.
pub trait StateStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<StateDocument>>;
    fn save(&self, document: &StateDocument) -> Result<()>;
    fn describe(&self) -> String;
}
