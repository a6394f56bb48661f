use std::sync::{Arc, RwLock};

use crate::error::Result;

use super::traits::{StateDocument, StateStore};

/// Keeps the document in memory. Clones share the same document, which lets
/// tests reopen a tracker over what a previous one saved.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    document: Arc<RwLock<Option<StateDocument>>>,
    saves: Arc<RwLock<usize>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<Option<StateDocument>> {
        Ok(self.document.read().unwrap().clone())
    }

    fn save(&self, document: &StateDocument) -> Result<()> {
        *self.document.write().unwrap() = Some(document.clone());
        *self.saves.write().unwrap() += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
