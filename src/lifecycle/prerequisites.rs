use std::path::Path;

use crate::error::{DadError, Result};
use crate::types::{AgentRecord, Stage};

/// What a record lacks for the stage it claims, relative to `root`.
pub fn missing_prerequisites(record: &AgentRecord, root: &Path) -> Vec<String> {
    let mut missing = Vec::new();

    if !root.join(&record.notebook_path).exists() {
        missing.push(format!("notebook file {}", record.notebook_path.display()));
    }
    match &record.artifact_path {
        Some(path) if !root.join(path).exists() => {
            missing.push(format!("compiled artifact {} (run compile)", path.display()))
        }
        None => missing.push("compiled artifact (run compile)".to_string()),
        _ => {}
    }

    if record.stage >= Stage::Uploaded && record.remote_notebook_id.is_none() {
        missing.push("remote notebook id (run upload)".to_string());
    }
    if record.stage >= Stage::Executed && record.remote_agent_id.is_none() {
        missing.push("remote agent id (run the notebook in Fabric)".to_string());
    }
    if record.stage >= Stage::Deployed && record.endpoint_url.is_none() {
        missing.push("endpoint URL (run publish)".to_string());
    }

    missing
}

pub fn require_remote_notebook(record: &AgentRecord) -> Result<&str> {
    record
        .remote_notebook_id
        .as_deref()
        .ok_or_else(|| DadError::MissingPrerequisite {
            agent: record.name.clone(),
            missing: "a remote notebook id; run `dad upload` first".to_string(),
        })
}

pub fn require_endpoint(record: &AgentRecord) -> Result<&str> {
    record
        .endpoint_url
        .as_deref()
        .ok_or_else(|| DadError::MissingPrerequisite {
            agent: record.name.clone(),
            missing: "an endpoint URL; run `dad publish` first".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_record_needs_files() {
        let temp_dir = TempDir::new().unwrap();
        let record = AgentRecord::new("a", PathBuf::from("a/a.ipynb"));

        let missing = missing_prerequisites(&record, temp_dir.path());
        assert_eq!(missing.len(), 2);
        assert!(missing[0].starts_with("notebook file"));
    }

    #[test]
    fn test_stage_specific_requirements() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.ipynb"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("a_fabric.py"), "").unwrap();

        let mut record = AgentRecord::new("a", PathBuf::from("a.ipynb"));
        record.artifact_path = Some(PathBuf::from("a_fabric.py"));
        assert!(missing_prerequisites(&record, temp_dir.path()).is_empty());

        record.stage = Stage::Deployed;
        record.remote_notebook_id = Some("nb".to_string());
        let missing = missing_prerequisites(&record, temp_dir.path());
        assert_eq!(missing.len(), 2);
        assert!(missing.iter().any(|m| m.starts_with("remote agent id")));
        assert!(missing.iter().any(|m| m.starts_with("endpoint URL")));
    }

    #[test]
    fn test_require_helpers() {
        let mut record = AgentRecord::new("a", PathBuf::from("a.ipynb"));
        assert!(matches!(
            require_remote_notebook(&record),
            Err(DadError::MissingPrerequisite { .. })
        ));
        assert!(require_endpoint(&record).is_err());

        record.remote_notebook_id = Some("nb-1".to_string());
        assert_eq!(require_remote_notebook(&record).unwrap(), "nb-1");
    }
}
