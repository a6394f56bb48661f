use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{DadError, Result};

use super::traits::{StateDocument, StateStore};

pub const DEFAULT_STATE_FILE: &str = "dad_state.json";

/// State kept in a pretty-printed JSON file.
///
/// Saves write a sibling temp file and rename it over the target, so readers
/// only ever see a complete document. Two processes saving at once still
/// race: the last rename wins.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<StateDocument>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DadError::io(&self.path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        let document = serde_json::from_str(&raw).map_err(|e| {
            DadError::Config(format!("state file {} is corrupt: {}", self.path.display(), e))
        })?;
        Ok(Some(document))
    }

    fn save(&self, document: &StateDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DadError::io(parent, e))?;
        }

        let mut body = serde_json::to_string_pretty(document)?;
        body.push('\n');

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).map_err(|e| DadError::io(&temp, e))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| DadError::io(&temp, e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| DadError::io(&self.path, e))?;
        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
