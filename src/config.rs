use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::convert::DirectivePolicy;
use crate::error::{DadError, Result};
use crate::remote::{Credential, PollPolicy, RetryPolicy, DEFAULT_API_BASE};
use crate::storage::DEFAULT_STATE_FILE;

pub const CONFIG_FILE: &str = "dad.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub access_token: Option<String>,
    pub tenant_id: Option<String>,
    pub workspace_id: Option<String>,
    pub api_base: String,
    pub state_file: PathBuf,
    pub directive_policy: DirectivePolicy,
    pub max_retries: u32,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: None,
            tenant_id: None,
            workspace_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            directive_policy: DirectivePolicy::default(),
            max_retries: RetryPolicy::default().max_retries,
            poll_interval_secs: PollPolicy::default().interval.as_secs(),
            poll_timeout_secs: None,
        }
    }
}

/// `dad.toml`; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    tenant_id: Option<String>,
    workspace_id: Option<String>,
    api_base: Option<String>,
    state_file: Option<PathBuf>,
    directive_policy: Option<DirectivePolicy>,
    max_retries: Option<u32>,
    poll_interval_secs: Option<u64>,
    poll_timeout_secs: Option<u64>,
}

impl Config {
    /// Defaults, then `dad.toml` under `root`, then the process environment.
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let path = root.join(CONFIG_FILE);
        if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| DadError::io(&path, e))?;
            config.apply_file(&raw)?;
            log::debug!("Loaded {}", path.display());
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, raw: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(raw)
            .map_err(|e| DadError::Config(format!("{}: {}", CONFIG_FILE, e)))?;

        if file.tenant_id.is_some() {
            self.tenant_id = file.tenant_id;
        }
        if file.workspace_id.is_some() {
            self.workspace_id = file.workspace_id;
        }
        if let Some(api_base) = file.api_base {
            self.api_base = api_base;
        }
        if let Some(state_file) = file.state_file {
            self.state_file = state_file;
        }
        if let Some(policy) = file.directive_policy {
            self.directive_policy = policy;
        }
        if let Some(max_retries) = file.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(interval) = file.poll_interval_secs {
            self.poll_interval_secs = interval;
        }
        if file.poll_timeout_secs.is_some() {
            self.poll_timeout_secs = file.poll_timeout_secs;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("FABRIC_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
        if let Some(tenant) = var("FABRIC_TENANT_ID") {
            self.tenant_id = Some(tenant);
        }
        if let Some(workspace) = var("FABRIC_WORKSPACE_ID") {
            self.workspace_id = Some(workspace);
        }
        if let Some(api_base) = var("FABRIC_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(state_file) = var("DAD_STATE_FILE") {
            self.state_file = PathBuf::from(state_file);
        }
        if let Some(policy) = var("DAD_DIRECTIVE_POLICY") {
            self.directive_policy = policy.parse()?;
        }
        if let Some(retries) = var("DAD_MAX_RETRIES") {
            self.max_retries = retries
                .trim()
                .parse()
                .map_err(|_| DadError::Config(format!("DAD_MAX_RETRIES: not a number: {}", retries)))?;
        }
        if let Some(interval) = var("DAD_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = interval.trim().parse().map_err(|_| {
                DadError::Config(format!("DAD_POLL_INTERVAL_SECS: not a number: {}", interval))
            })?;
        }
        Ok(())
    }

    /// State file location; relative paths resolve against `root`.
    pub fn state_path(&self, root: &Path) -> PathBuf {
        if self.state_file.is_absolute() {
            self.state_file.clone()
        } else {
            root.join(&self.state_file)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            timeout: self.poll_timeout_secs.map(Duration::from_secs),
        }
    }

    /// A static token when one is configured, otherwise the Azure CLI session.
    pub fn credential(&self) -> Credential {
        match &self.access_token {
            Some(token) => Credential::from_token(token.clone()),
            None => Credential::azure_cli(self.tenant_id.clone()),
        }
    }
}
