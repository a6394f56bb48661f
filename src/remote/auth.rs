use serde::Deserialize;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::error::{DadError, Result};

pub const FABRIC_RESOURCE: &str = "https://api.fabric.microsoft.com";

const AZ_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzAccessToken {
    access_token: String,
}

/// Where bearer tokens come from. The Azure CLI token is fetched once per
/// process.
#[derive(Debug)]
pub enum Credential {
    Static(String),
    AzureCli {
        tenant_id: Option<String>,
        cached: OnceCell<String>,
    },
}

impl Credential {
    pub fn from_token(token: impl Into<String>) -> Self {
        Credential::Static(token.into())
    }

    pub fn azure_cli(tenant_id: Option<String>) -> Self {
        Credential::AzureCli {
            tenant_id: tenant_id.filter(|t| !t.is_empty()),
            cached: OnceCell::new(),
        }
    }

    pub async fn token(&self) -> Result<String> {
        match self {
            Credential::Static(token) => Ok(token.clone()),
            Credential::AzureCli { tenant_id, cached } => cached
                .get_or_try_init(|| fetch_az_token(tenant_id.clone()))
                .await
                .cloned(),
        }
    }
}

async fn fetch_az_token(tenant_id: Option<String>) -> Result<String> {
    let mut args = vec![
        "account".to_string(),
        "get-access-token".to_string(),
        "--resource".to_string(),
        FABRIC_RESOURCE.to_string(),
        "--output".to_string(),
        "json".to_string(),
    ];
    if let Some(tenant) = tenant_id {
        args.push("--tenant".to_string());
        args.push(tenant);
    }

    log::debug!("Requesting Fabric token from the Azure CLI");
    let output = tokio::time::timeout(
        Duration::from_secs(AZ_TIMEOUT_SECS),
        tokio::task::spawn_blocking(move || {
            Command::new("az")
                .args(&args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
        }),
    )
    .await
    .map_err(|_| DadError::Auth("timed out waiting for `az account get-access-token`".to_string()))?
    .map_err(|e| DadError::Auth(format!("az task failed: {}", e)))?
    .map_err(|e| DadError::Auth(format!("could not run `az` (is the Azure CLI installed?): {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DadError::Auth(format!(
            "`az account get-access-token` failed; run `az login` first: {}",
            stderr.trim()
        )));
    }

    parse_az_output(&output.stdout)
}

fn parse_az_output(stdout: &[u8]) -> Result<String> {
    let parsed: AzAccessToken = serde_json::from_slice(stdout)
        .map_err(|e| DadError::Auth(format!("unexpected az output: {}", e)))?;
    Ok(parsed.access_token)
}
