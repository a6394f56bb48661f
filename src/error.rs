use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DadError>;

#[derive(Debug, Error)]
pub enum DadError {
    #[error("Malformed notebook{}: {reason}", cell_suffix(.cell))]
    Parse { cell: Option<usize>, reason: String },

    #[error("Unsupported directive in cell {cell}, line {line}: {directive}")]
    UnsupportedDirective {
        cell: usize,
        line: usize,
        directive: String,
    },

    #[error("Agent '{0}' already exists")]
    DuplicateName(String),

    #[error("Agent '{0}' not found")]
    UnknownAgent(String),

    #[error("Workspace '{0}' is not registered")]
    UnknownWorkspace(String),

    #[error("No active workspace; register one with `dad workspace add`")]
    NoActiveWorkspace,

    #[error("Invalid agent name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid workspace id '{0}': expected a UUID")]
    InvalidWorkspaceId(String),

    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Agent '{agent}' is missing {missing}")]
    MissingPrerequisite { agent: String, missing: String },

    #[error("Notebook '{display_name}' already exists remotely ({notebook_id}); pass --update to replace it")]
    RemoteNotebookExists {
        display_name: String,
        notebook_id: String,
    },

    #[error("Transient remote failure during {operation}: {message}")]
    TransientRemote { operation: String, message: String },

    #[error("Remote rejected {operation} with status {status}: {body}")]
    RemoteRejected {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Outcome of {operation} is unknown ({message}); check the workspace before retrying")]
    RemoteOutcomeUnknown { operation: String, message: String },

    #[error("{operation} failed after {attempts} attempt(s): {cause}")]
    TerminalRemote {
        operation: String,
        attempts: u32,
        #[source]
        cause: Box<DadError>,
    },

    #[error("Job {job_id} ended with status {status}{}", reason_suffix(.reason))]
    JobFailed {
        job_id: String,
        status: String,
        reason: Option<String>,
    },

    #[error("Job {job_id} did not finish within {waited_secs}s")]
    PollTimeout { job_id: String, waited_secs: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DadError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        DadError::TransientRemote {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same remote call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DadError::TransientRemote { .. })
    }
}

fn cell_suffix(cell: &Option<usize>) -> String {
    match cell {
        Some(index) => format!(" (cell {})", index),
        None => String::new(),
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {}", reason),
        None => String::new(),
    }
}
