use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DadError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl WorkspaceRecord {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_workspace_id(&id)?;
        Ok(Self {
            id,
            tenant_id: tenant_id.into(),
            storage_id: None,
            storage_name: None,
            description: String::new(),
        })
    }

    pub fn with_storage(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.storage_id = Some(id.into());
        self.storage_name = Some(name.into());
        self
    }

    /// The default lakehouse bound into converted notebooks, when both
    /// halves of it are known.
    pub fn lakehouse(&self) -> Option<LakehouseBinding> {
        match (&self.storage_id, &self.storage_name) {
            (Some(id), Some(name)) => Some(LakehouseBinding {
                workspace_id: self.id.clone(),
                lakehouse_id: id.clone(),
                lakehouse_name: name.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakehouseBinding {
    pub workspace_id: String,
    pub lakehouse_id: String,
    pub lakehouse_name: String,
}

/// Fabric workspace ids are UUIDs.
pub fn validate_workspace_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| DadError::InvalidWorkspaceId(id.to_string()))
}
