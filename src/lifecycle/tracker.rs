use chrono::Utc;
use std::path::PathBuf;

use crate::error::{DadError, Result};
use crate::storage::{StateDocument, StateStore};
use crate::types::{
    validate_workspace_id, AgentFields, AgentRecord, Stage, WorkspaceRecord,
};

/// A workspace chosen for an operation, by registered name or raw id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWorkspace {
    pub name: Option<String>,
    pub record: WorkspaceRecord,
}

/// Agent and workspace records over a [`StateStore`].
///
/// Every mutation rewrites the whole document. Stage order is not enforced
/// here; callers advance in order and a regression is only logged.
pub struct Tracker {
    store: Box<dyn StateStore>,
    document: StateDocument,
}

impl Tracker {
    pub fn open(store: Box<dyn StateStore>) -> Result<Self> {
        let document = store.load()?.unwrap_or_default();
        log::debug!(
            "Opened state {} ({} agents, {} workspaces)",
            store.describe(),
            document.agents.len(),
            document.workspaces.len()
        );
        Ok(Self { store, document })
    }

    pub fn create(&mut self, name: &str, notebook_path: PathBuf) -> Result<AgentRecord> {
        if self.document.agents.contains_key(name) {
            return Err(DadError::DuplicateName(name.to_string()));
        }

        let record = AgentRecord::new(name, notebook_path);
        self.commit(|document| {
            document.agents.insert(name.to_string(), record.clone());
            Ok(())
        })?;

        log::info!("Created agent '{}'", name);
        Ok(record)
    }

    pub fn advance(&mut self, name: &str, stage: Stage, fields: AgentFields) -> Result<AgentRecord> {
        let updated = self.commit(|document| {
            let record = document
                .agents
                .get_mut(name)
                .ok_or_else(|| DadError::UnknownAgent(name.to_string()))?;

            if stage < record.stage {
                log::warn!(
                    "Agent '{}' moving backwards from {} to {}",
                    name,
                    record.stage,
                    stage
                );
            }

            record.merge(fields);
            record.stage = stage;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })?;

        log::info!("Agent '{}' is now {}", name, stage);
        Ok(updated)
    }

    /// Merges `fields` without changing the stage.
    pub fn update(&mut self, name: &str, fields: AgentFields) -> Result<AgentRecord> {
        let stage = self.get(name)?.stage;
        self.advance(name, stage, fields)
    }

    pub fn get(&self, name: &str) -> Result<&AgentRecord> {
        self.document
            .agents
            .get(name)
            .ok_or_else(|| DadError::UnknownAgent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.document.agents.contains_key(name)
    }

    pub fn list(&self) -> Vec<&AgentRecord> {
        self.document.agents.values().collect()
    }

    pub fn remove(&mut self, name: &str) -> Result<AgentRecord> {
        let record = self.commit(|document| {
            document
                .agents
                .remove(name)
                .ok_or_else(|| DadError::UnknownAgent(name.to_string()))
        })?;

        log::info!("Removed agent '{}'", name);
        Ok(record)
    }

    /// Adds or replaces a workspace. The first one registered becomes active.
    pub fn register_workspace(&mut self, name: &str, workspace: WorkspaceRecord) -> Result<()> {
        validate_workspace_id(&workspace.id)?;

        self.commit(|document| {
            document.workspaces.insert(name.to_string(), workspace);
            if document.active_workspace.is_none() {
                document.active_workspace = Some(name.to_string());
            }
            Ok(())
        })
    }

    pub fn set_active_workspace(&mut self, name: &str) -> Result<()> {
        if !self.document.workspaces.contains_key(name) {
            return Err(DadError::UnknownWorkspace(name.to_string()));
        }

        self.commit(|document| {
            document.active_workspace = Some(name.to_string());
            Ok(())
        })?;
        log::info!("Active workspace set to '{}'", name);
        Ok(())
    }

    pub fn active_workspace(&self) -> Option<(&str, &WorkspaceRecord)> {
        let name = self.document.active_workspace.as_deref()?;
        self.document
            .workspaces
            .get(name)
            .map(|record| (name, record))
    }

    pub fn workspace(&self, name: &str) -> Result<&WorkspaceRecord> {
        self.document
            .workspaces
            .get(name)
            .ok_or_else(|| DadError::UnknownWorkspace(name.to_string()))
    }

    pub fn workspaces(&self) -> impl Iterator<Item = (&String, &WorkspaceRecord)> {
        self.document.workspaces.iter()
    }

    /// Picks the workspace for an operation: an explicit override (a
    /// registered name, or a bare workspace id), else the active one.
    pub fn resolve_workspace(&self, override_: Option<&str>) -> Result<ResolvedWorkspace> {
        match override_ {
            Some(key) => {
                if let Some(record) = self.document.workspaces.get(key) {
                    return Ok(ResolvedWorkspace {
                        name: Some(key.to_string()),
                        record: record.clone(),
                    });
                }
                if let Some((name, record)) =
                    self.document.workspaces.iter().find(|(_, w)| w.id == key)
                {
                    return Ok(ResolvedWorkspace {
                        name: Some(name.clone()),
                        record: record.clone(),
                    });
                }
                if validate_workspace_id(key).is_ok() {
                    let tenant_id = self
                        .active_workspace()
                        .map(|(_, w)| w.tenant_id.clone())
                        .unwrap_or_default();
                    return Ok(ResolvedWorkspace {
                        name: None,
                        record: WorkspaceRecord::new(key, tenant_id)?,
                    });
                }
                Err(DadError::UnknownWorkspace(key.to_string()))
            }
            None => self
                .active_workspace()
                .map(|(name, record)| ResolvedWorkspace {
                    name: Some(name.to_string()),
                    record: record.clone(),
                })
                .ok_or(DadError::NoActiveWorkspace),
        }
    }

    /// Applies `change` to a copy of the document and keeps the copy only
    /// once it is saved.
    fn commit<T>(&mut self, change: impl FnOnce(&mut StateDocument) -> Result<T>) -> Result<T> {
        let mut next = self.document.clone();
        let value = change(&mut next)?;
        self.store.save(&next)?;
        self.document = next;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStateStore;

    const WS_DEV: &str = "4b9a3c1e-2f6d-4e8a-9c7b-1d2e3f4a5b6c";
    const WS_PROD: &str = "9f8e7d6c-5b4a-4392-8170-6f5e4d3c2b1a";

    fn tracker() -> (Tracker, InMemoryStateStore) {
        let store = InMemoryStateStore::new();
        let tracker = Tracker::open(Box::new(store.clone())).unwrap();
        (tracker, store)
    }

    #[test]
    fn test_create_starts_at_created() {
        let (mut tracker, _) = tracker();
        let record = tracker
            .create("sales_bot", PathBuf::from("sales_bot/sales_bot.ipynb"))
            .unwrap();
        assert_eq!(record.stage, Stage::Created);
        assert_eq!(record.folder, "sales_bot");
    }

    #[test]
    fn test_every_mutation_saves() {
        let (mut tracker, store) = tracker();
        tracker.create("a", PathBuf::from("a.ipynb")).unwrap();
        tracker
            .advance("a", Stage::Uploaded, AgentFields::remote_notebook("nb"))
            .unwrap();
        tracker
            .register_workspace("dev", WorkspaceRecord::new(WS_DEV, "t").unwrap())
            .unwrap();
        tracker.set_active_workspace("dev").unwrap();
        tracker.remove("a").unwrap();
        assert_eq!(store.save_count(), 5);
    }

    #[test]
    fn test_failed_operations_do_not_save() {
        let (mut tracker, store) = tracker();
        assert!(tracker.advance("ghost", Stage::Uploaded, AgentFields::default()).is_err());
        assert!(tracker.set_active_workspace("nowhere").is_err());
        assert!(tracker.remove("ghost").is_err());
        assert_eq!(store.save_count(), 0);
    }

    struct ReadOnlyStore;

    impl StateStore for ReadOnlyStore {
        fn load(&self) -> Result<Option<StateDocument>> {
            Ok(None)
        }

        fn save(&self, _document: &StateDocument) -> Result<()> {
            Err(DadError::io(
                "state.json",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ))
        }

        fn describe(&self) -> String {
            "read-only".to_string()
        }
    }

    #[test]
    fn test_failed_save_leaves_state_unchanged() {
        let mut tracker = Tracker::open(Box::new(ReadOnlyStore)).unwrap();

        assert!(matches!(
            tracker.create("a", PathBuf::from("a.ipynb")),
            Err(DadError::Io { .. })
        ));
        assert!(!tracker.contains("a"));

        assert!(tracker
            .register_workspace("dev", WorkspaceRecord::new(WS_DEV, "t").unwrap())
            .is_err());
        assert!(tracker.active_workspace().is_none());
        assert_eq!(tracker.workspaces().count(), 0);
    }

    #[test]
    fn test_failed_advance_keeps_previous_record() {
        let store = InMemoryStateStore::new();
        let mut tracker = Tracker::open(Box::new(store.clone())).unwrap();
        tracker.create("a", PathBuf::from("a.ipynb")).unwrap();

        let mut tracker = Tracker {
            store: Box::new(ReadOnlyStore),
            document: tracker.document.clone(),
        };
        assert!(tracker
            .advance("a", Stage::Uploaded, AgentFields::remote_notebook("nb"))
            .is_err());

        let record = tracker.get("a").unwrap();
        assert_eq!(record.stage, Stage::Created);
        assert!(record.remote_notebook_id.is_none());
    }

    #[test]
    fn test_regression_is_allowed() {
        let (mut tracker, _) = tracker();
        tracker.create("a", PathBuf::from("a.ipynb")).unwrap();
        tracker.advance("a", Stage::Executed, AgentFields::default()).unwrap();
        let record = tracker.advance("a", Stage::Uploaded, AgentFields::default()).unwrap();
        assert_eq!(record.stage, Stage::Uploaded);
    }

    #[test]
    fn test_update_keeps_stage() {
        let (mut tracker, _) = tracker();
        tracker.create("a", PathBuf::from("a.ipynb")).unwrap();
        tracker.advance("a", Stage::Uploaded, AgentFields::default()).unwrap();
        let record = tracker
            .update("a", AgentFields::artifact(PathBuf::from("a_fabric.py")))
            .unwrap();
        assert_eq!(record.stage, Stage::Uploaded);
        assert_eq!(record.artifact_path, Some(PathBuf::from("a_fabric.py")));
    }

    #[test]
    fn test_first_workspace_becomes_active() {
        let (mut tracker, _) = tracker();
        tracker
            .register_workspace("dev", WorkspaceRecord::new(WS_DEV, "t").unwrap())
            .unwrap();
        tracker
            .register_workspace("prod", WorkspaceRecord::new(WS_PROD, "t").unwrap())
            .unwrap();

        assert_eq!(tracker.active_workspace().unwrap().0, "dev");
        tracker.set_active_workspace("prod").unwrap();
        assert_eq!(tracker.active_workspace().unwrap().1.id, WS_PROD);
    }

    #[test]
    fn test_resolve_workspace() {
        let (mut tracker, _) = tracker();
        assert!(matches!(
            tracker.resolve_workspace(None),
            Err(DadError::NoActiveWorkspace)
        ));

        tracker
            .register_workspace("dev", WorkspaceRecord::new(WS_DEV, "tenant-1").unwrap())
            .unwrap();

        let by_default = tracker.resolve_workspace(None).unwrap();
        assert_eq!(by_default.name.as_deref(), Some("dev"));

        let by_id = tracker.resolve_workspace(Some(WS_DEV)).unwrap();
        assert_eq!(by_id.name.as_deref(), Some("dev"));

        let unregistered = tracker.resolve_workspace(Some(WS_PROD)).unwrap();
        assert_eq!(unregistered.name, None);
        assert_eq!(unregistered.record.tenant_id, "tenant-1");

        assert!(matches!(
            tracker.resolve_workspace(Some("staging")),
            Err(DadError::UnknownWorkspace(_))
        ));
    }

    #[test]
    fn test_reopen_sees_saved_state() {
        let (mut tracker, store) = tracker();
        tracker.create("a", PathBuf::from("a.ipynb")).unwrap();

        let reopened = Tracker::open(Box::new(store)).unwrap();
        assert!(reopened.contains("a"));
    }
}
