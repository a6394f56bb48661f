pub mod agent;
pub mod notebook;
pub mod workspace;

pub use agent::{folder_name, validate_agent_name, AgentFields, AgentRecord, JobSummary, Stage};
pub use notebook::{Cell, CellKind, Notebook, PARAMETERS_TAG};
pub use workspace::{validate_workspace_id, LakehouseBinding, WorkspaceRecord};

pub type AgentName = String;
pub type WorkspaceName = String;
