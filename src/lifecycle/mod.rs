pub mod prerequisites;
pub mod tracker;

pub use prerequisites::{missing_prerequisites, require_endpoint, require_remote_notebook};
pub use tracker::{ResolvedWorkspace, Tracker};
