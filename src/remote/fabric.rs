use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::auth::Credential;
use super::{JobState, JobStatus, RemoteClient, RemoteItem, RemoteNotebook};
use crate::error::{DadError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.fabric.microsoft.com/v1";

const NOTEBOOK_PART: &str = "notebook-content.py";
const AGENT_API_VERSION: &str = "2024-05-01-preview";
const DATA_AGENT_TYPE: &str = "DataAgent";
const MAX_OPERATION_POLLS: u32 = 120;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionPart {
    path: &'static str,
    payload: String,
    payload_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Definition {
    parts: Vec<DefinitionPart>,
}

impl Definition {
    fn notebook(content: &str) -> Self {
        Self {
            parts: vec![DefinitionPart {
                path: NOTEBOOK_PART,
                payload: BASE64.encode(content.as_bytes()),
                payload_type: "InlineBase64",
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateNotebookRequest<'a> {
    display_name: &'a str,
    description: &'a str,
    definition: Definition,
}

#[derive(Debug, Serialize)]
struct UpdateDefinitionRequest {
    definition: Definition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    id: String,
    display_name: String,
    #[serde(rename = "type", default)]
    item_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPage {
    #[serde(default)]
    value: Vec<ItemPayload>,
    continuation_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationPayload {
    status: String,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FailureReason {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobInstancePayload {
    status: String,
    failure_reason: Option<FailureReason>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Debug, Deserialize)]
struct ChatAnswer {
    content: Option<String>,
}

/// [`RemoteClient`] over the Fabric REST API.
#[derive(Debug)]
pub struct FabricClient {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
    operation_interval: Duration,
}

impl FabricClient {
    pub fn new(credential: Credential) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_API_BASE.to_string(),
            credential,
            operation_interval: Duration::from_secs(5),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fallback delay between long-running operation polls when the
    /// service sends no `Retry-After`.
    pub fn with_operation_interval(mut self, interval: Duration) -> Self {
        self.operation_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// The published endpoint for a data agent.
    pub fn agent_endpoint(&self, workspace_id: &str, agent_id: &str) -> String {
        agent_endpoint(&self.base_url, workspace_id, agent_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.credential.token().await?))
    }

    async fn get(&self, operation: &str, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        check_status(operation, response).await
    }

    async fn post<B: Serialize + ?Sized>(&self, operation: &str, url: &str, body: &B) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .header("Authorization", self.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;
        check_status(operation, response).await
    }

    /// POST that must not reach the service twice.
    async fn post_once<B: Serialize + ?Sized>(&self, operation: &str, url: &str, body: &B) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .header("Authorization", self.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| unrepeatable_transport_error(operation, e))?;
        check_status(operation, response).await
    }

    async fn list_items(&self, operation: &str, first_url: String) -> Result<Vec<ItemPayload>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: ItemPage = self
                .get(operation, &url)
                .await?
                .json()
                .await
                .map_err(|e| transport_error(operation, e))?;
            items.extend(page.value);
            next = page.continuation_uri;
        }

        Ok(items)
    }

    /// Follows a 202 response's `Location` until the operation settles.
    async fn wait_for_operation(&self, operation: &str, accepted: &Response) -> Result<()> {
        let Some(location) = header_str(accepted.headers(), LOCATION) else {
            return Ok(());
        };
        let mut delay = retry_after(accepted.headers()).unwrap_or(self.operation_interval);

        for _ in 0..MAX_OPERATION_POLLS {
            tokio::time::sleep(delay).await;

            let response = self.get(operation, &location).await?;
            delay = retry_after(response.headers()).unwrap_or(self.operation_interval);
            let status: OperationPayload = response
                .json()
                .await
                .map_err(|e| transport_error(operation, e))?;

            log::debug!("{} operation status: {}", operation, status.status);
            match status.status.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" => {
                    return Err(DadError::RemoteRejected {
                        operation: operation.to_string(),
                        status: 200,
                        body: status
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "operation failed".to_string()),
                    })
                }
                _ => {}
            }
        }

        Err(DadError::transient(
            operation,
            format!("operation still running after {} polls", MAX_OPERATION_POLLS),
        ))
    }
}

#[async_trait]
impl RemoteClient for FabricClient {
    async fn create_notebook(
        &self,
        workspace_id: &str,
        display_name: &str,
        content: &str,
    ) -> Result<RemoteNotebook> {
        let op = "create notebook";
        let request = CreateNotebookRequest {
            display_name,
            description: "Data agent notebook",
            definition: Definition::notebook(content),
        };

        let url = self.url(&format!("/workspaces/{}/notebooks", workspace_id));
        let response = self.post(op, &url, &request).await?;

        if response.status() == StatusCode::ACCEPTED {
            self.wait_for_operation(op, &response).await?;
            return self
                .find_notebook(workspace_id, None, display_name)
                .await?
                .ok_or_else(|| DadError::RemoteRejected {
                    operation: op.to_string(),
                    status: 202,
                    body: format!("notebook '{}' not listed after creation", display_name),
                });
        }

        let item: ItemPayload = response.json().await.map_err(|e| transport_error(op, e))?;
        log::info!("Created notebook '{}' ({})", item.display_name, item.id);
        Ok(RemoteNotebook {
            id: item.id,
            display_name: item.display_name,
        })
    }

    async fn update_notebook(&self, workspace_id: &str, notebook_id: &str, content: &str) -> Result<()> {
        let op = "update notebook";
        let request = UpdateDefinitionRequest {
            definition: Definition::notebook(content),
        };

        let url = self.url(&format!(
            "/workspaces/{}/notebooks/{}/updateDefinition",
            workspace_id, notebook_id
        ));
        let response = self.post(op, &url, &request).await?;
        if response.status() == StatusCode::ACCEPTED {
            self.wait_for_operation(op, &response).await?;
        }

        log::info!("Updated notebook definition {}", notebook_id);
        Ok(())
    }

    async fn find_notebook(
        &self,
        workspace_id: &str,
        notebook_id: Option<&str>,
        display_name: &str,
    ) -> Result<Option<RemoteNotebook>> {
        let notebooks = self.list_notebooks(workspace_id).await?;

        if let Some(id) = notebook_id {
            if let Some(found) = notebooks.iter().find(|n| n.id == id) {
                return Ok(Some(found.clone()));
            }
        }
        Ok(notebooks.into_iter().find(|n| n.display_name == display_name))
    }

    async fn list_notebooks(&self, workspace_id: &str) -> Result<Vec<RemoteNotebook>> {
        let url = self.url(&format!("/workspaces/{}/notebooks", workspace_id));
        let items = self.list_items("list notebooks", url).await?;
        Ok(items
            .into_iter()
            .map(|item| RemoteNotebook {
                id: item.id,
                display_name: item.display_name,
            })
            .collect())
    }

    async fn start_notebook_job(
        &self,
        workspace_id: &str,
        notebook_id: &str,
        inline_install: bool,
    ) -> Result<String> {
        let op = "start notebook job";
        let body = serde_json::json!({
            "executionData": { "_inlineInstallationEnabled": inline_install }
        });

        let url = self.url(&format!(
            "/workspaces/{}/items/{}/jobs/instances?jobType=RunNotebook",
            workspace_id, notebook_id
        ));
        let response = self.post_once(op, &url, &body).await?;

        let job_id = header_str(response.headers(), LOCATION)
            .and_then(|location| {
                location
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .map(str::to_string)
            })
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DadError::RemoteRejected {
                operation: op.to_string(),
                status: response.status().as_u16(),
                body: "no Location header on job start".to_string(),
            })?;

        log::info!("Started job {} for notebook {}", job_id, notebook_id);
        Ok(job_id)
    }

    async fn job_status(&self, workspace_id: &str, notebook_id: &str, job_id: &str) -> Result<JobStatus> {
        let op = "job status";
        let url = self.url(&format!(
            "/workspaces/{}/items/{}/jobs/instances/{}",
            workspace_id, notebook_id, job_id
        ));
        let payload: JobInstancePayload = self
            .get(op, &url)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(op, e))?;

        Ok(JobStatus {
            state: JobState::parse(&payload.status),
            failure_reason: payload.failure_reason.and_then(|r| r.message),
        })
    }

    async fn list_data_agents(&self, workspace_id: &str) -> Result<Vec<RemoteItem>> {
        let url = self.url(&format!(
            "/workspaces/{}/items?type={}",
            workspace_id, DATA_AGENT_TYPE
        ));
        let items = self.list_items("list data agents", url).await?;
        Ok(items
            .into_iter()
            .map(|item| RemoteItem {
                id: item.id,
                display_name: item.display_name,
                item_type: item.item_type,
            })
            .collect())
    }

    async fn ask_agent(&self, endpoint_url: &str, question: &str) -> Result<String> {
        let op = "ask agent";
        let url = format!(
            "{}/chat/completions?api-version={}",
            endpoint_url.trim_end_matches('/'),
            AGENT_API_VERSION
        );
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: question,
            }],
        };

        let response: ChatResponse = self
            .post(op, &url, &request)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(op, e))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DadError::RemoteRejected {
                operation: op.to_string(),
                status: 200,
                body: "agent returned no answer".to_string(),
            })
    }
}

/// The OpenAI-compatible endpoint Fabric exposes for a published data agent.
pub fn agent_endpoint(api_base: &str, workspace_id: &str, agent_id: &str) -> String {
    format!(
        "{}/workspaces/{}/aiskills/{}/aiassistant/openai",
        api_base.trim_end_matches('/'),
        workspace_id,
        agent_id
    )
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Throttling and gateway failures are worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn transport_error(operation: &str, e: reqwest::Error) -> DadError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        DadError::transient(operation, e.to_string())
    } else {
        DadError::RemoteRejected {
            operation: operation.to_string(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            body: e.to_string(),
        }
    }
}

/// Only a failed connect proves the request never arrived; anything later
/// may have started work on the service side.
fn unrepeatable_transport_error(operation: &str, e: reqwest::Error) -> DadError {
    if e.is_connect() {
        DadError::transient(operation, e.to_string())
    } else {
        DadError::RemoteOutcomeUnknown {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if is_transient_status(status) {
        Err(DadError::transient(operation, format!("HTTP {}: {}", status.as_u16(), body)))
    } else {
        Err(DadError::RemoteRejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
