pub mod config;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod remote;
pub mod storage;
pub mod templates;
pub mod types;
pub mod workflow;

pub use config::Config;
pub use error::{DadError, Result};
pub use types::*;
