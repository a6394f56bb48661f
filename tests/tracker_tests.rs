use std::path::PathBuf;
use tempfile::TempDir;

use dadfw::lifecycle::Tracker;
use dadfw::storage::{JsonFileStore, StateStore};
use dadfw::types::{AgentFields, Stage, WorkspaceRecord};
use dadfw::DadError;

const WS: &str = "4b9a3c1e-2f6d-4e8a-9c7b-1d2e3f4a5b6c";

fn open(path: &std::path::Path) -> Tracker {
    Tracker::open(Box::new(JsonFileStore::new(path))).unwrap()
}

#[test]
fn test_duplicate_create_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut tracker = open(&temp_dir.path().join("state.json"));

    tracker
        .create("sales_bot", PathBuf::from("sales_bot/sales_bot.ipynb"))
        .unwrap();
    let again = tracker.create("sales_bot", PathBuf::from("sales_bot/sales_bot.ipynb"));
    assert!(matches!(again, Err(DadError::DuplicateName(name)) if name == "sales_bot"));
}

#[test]
fn test_advance_then_get() {
    let temp_dir = TempDir::new().unwrap();
    let mut tracker = open(&temp_dir.path().join("state.json"));

    tracker
        .create("sales_bot", PathBuf::from("sales_bot/sales_bot.ipynb"))
        .unwrap();
    tracker
        .advance("sales_bot", Stage::Uploaded, AgentFields::remote_notebook("nb-123"))
        .unwrap();

    let record = tracker.get("sales_bot").unwrap();
    assert_eq!(record.stage, Stage::Uploaded);
    assert_eq!(record.remote_notebook_id.as_deref(), Some("nb-123"));
}

#[test]
fn test_unknown_agent() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = open(&temp_dir.path().join("state.json"));
    assert!(matches!(tracker.get("unknown"), Err(DadError::UnknownAgent(_))));
}

#[test]
fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/state.json");

    {
        let mut tracker = open(&path);
        tracker.create("a", PathBuf::from("a/a.ipynb")).unwrap();
        tracker
            .advance("a", Stage::Executed, AgentFields::remote_notebook("nb-1"))
            .unwrap();
        tracker
            .register_workspace(
                "dev",
                WorkspaceRecord::new(WS, "tenant").unwrap().with_storage("lh", "Sales"),
            )
            .unwrap();
    }

    let tracker = open(&path);
    let record = tracker.get("a").unwrap();
    assert_eq!(record.stage, Stage::Executed);
    assert_eq!(record.remote_notebook_id.as_deref(), Some("nb-1"));

    let (name, workspace) = tracker.active_workspace().unwrap();
    assert_eq!(name, "dev");
    assert_eq!(workspace.lakehouse().unwrap().lakehouse_name, "Sales");
}

#[test]
fn test_saved_document_is_plain_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");

    let mut tracker = open(&path);
    tracker.create("a", PathBuf::from("a/a.ipynb")).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["agents"]["a"]["stage"], "created");

    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path() != path)
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
}

#[test]
fn test_corrupt_state_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = JsonFileStore::new(&path);
    assert!(matches!(store.load(), Err(DadError::Config(_))));
}

#[test]
fn test_invalid_workspace_id() {
    assert!(matches!(
        WorkspaceRecord::new("my-workspace", "tenant"),
        Err(DadError::InvalidWorkspaceId(_))
    ));
}
