pub mod json_file;
pub mod memory;
pub mod traits;

pub use json_file::{JsonFileStore, DEFAULT_STATE_FILE};
pub use memory::InMemoryStateStore;
pub use traits::{StateDocument, StateStore};
