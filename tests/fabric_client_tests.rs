use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

use dadfw::remote::{Credential, FabricClient, JobState, RemoteClient};
use dadfw::DadError;

fn client(server: &mockito::ServerGuard) -> FabricClient {
    FabricClient::new(Credential::from_token("test-token"))
        .with_base_url(server.url())
        .with_operation_interval(Duration::ZERO)
}

#[tokio::test]
async fn test_create_notebook_sends_base64_definition() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/workspaces/ws-1/notebooks")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({ "displayName": "sales_bot" })),
            Matcher::Regex("\"payloadType\":\"InlineBase64\"".to_string()),
            Matcher::Regex("\"path\":\"notebook-content.py\"".to_string()),
        ]))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"nb-1","displayName":"sales_bot","type":"Notebook"}"#)
        .create_async()
        .await;

    let notebook = client(&server)
        .create_notebook("ws-1", "sales_bot", "# Fabric notebook source\n")
        .await
        .unwrap();

    assert_eq!(notebook.id, "nb-1");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_notebook_follows_long_running_operation() {
    let mut server = mockito::Server::new_async().await;
    let operation_url = format!("{}/operations/op-1", server.url());

    let create = server
        .mock("POST", "/workspaces/ws-1/notebooks")
        .with_status(202)
        .with_header("location", &operation_url)
        .create_async()
        .await;
    let operation = server
        .mock("GET", "/operations/op-1")
        .with_status(200)
        .with_body(r#"{"status":"Succeeded"}"#)
        .create_async()
        .await;
    let list = server
        .mock("GET", "/workspaces/ws-1/notebooks")
        .with_status(200)
        .with_body(r#"{"value":[{"id":"nb-7","displayName":"sales_bot","type":"Notebook"}]}"#)
        .create_async()
        .await;

    let notebook = client(&server)
        .create_notebook("ws-1", "sales_bot", "x = 1\n")
        .await
        .unwrap();

    assert_eq!(notebook.id, "nb-7");
    create.assert_async().await;
    operation.assert_async().await;
    list.assert_async().await;
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let mut server = mockito::Server::new_async().await;
    let _throttled = server
        .mock("GET", "/workspaces/busy/notebooks")
        .with_status(429)
        .with_body("slow down")
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/workspaces/gone/notebooks")
        .with_status(404)
        .with_body("no such workspace")
        .create_async()
        .await;

    let client = client(&server);

    let throttled = client.list_notebooks("busy").await;
    assert!(matches!(throttled, Err(ref e) if e.is_transient()));

    match client.list_notebooks("gone").await {
        Err(DadError::RemoteRejected { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such workspace");
        }
        other => panic!("expected RemoteRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_job_reads_location() {
    let mut server = mockito::Server::new_async().await;
    let location = format!("{}/workspaces/ws-1/items/nb-1/jobs/instances/job-42", server.url());
    let mock = server
        .mock("POST", "/workspaces/ws-1/items/nb-1/jobs/instances")
        .match_query(Matcher::UrlEncoded("jobType".to_string(), "RunNotebook".to_string()))
        .match_body(Matcher::PartialJson(
            json!({ "executionData": { "_inlineInstallationEnabled": true } }),
        ))
        .with_status(202)
        .with_header("location", &location)
        .create_async()
        .await;

    let job_id = client(&server)
        .start_notebook_job("ws-1", "nb-1", true)
        .await
        .unwrap();

    assert_eq!(job_id, "job-42");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_job_status_failure_reason() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/workspaces/ws-1/items/nb-1/jobs/instances/job-42")
        .with_status(200)
        .with_body(r#"{"id":"job-42","status":"Failed","failureReason":{"message":"cell 2 raised"}}"#)
        .create_async()
        .await;

    let status = client(&server)
        .job_status("ws-1", "nb-1", "job-42")
        .await
        .unwrap();

    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failure_reason.as_deref(), Some("cell 2 raised"));
}

#[tokio::test]
async fn test_list_data_agents_follows_continuation() {
    let mut server = mockito::Server::new_async().await;
    let next = format!(
        "{}/workspaces/ws-1/items?type=DataAgent&continuationToken=abc",
        server.url()
    );

    let _first = server
        .mock("GET", "/workspaces/ws-1/items")
        .match_query(Matcher::Exact("type=DataAgent".to_string()))
        .with_status(200)
        .with_body(
            json!({
                "value": [{ "id": "ag-1", "displayName": "sales_bot", "type": "DataAgent" }],
                "continuationUri": next
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _second = server
        .mock("GET", "/workspaces/ws-1/items")
        .match_query(Matcher::UrlEncoded("continuationToken".to_string(), "abc".to_string()))
        .with_status(200)
        .with_body(r#"{"value":[{"id":"ag-2","displayName":"inventory","type":"DataAgent"}]}"#)
        .create_async()
        .await;

    let agents = client(&server).list_data_agents("ws-1").await.unwrap();
    let ids: Vec<&str> = agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["ag-1", "ag-2"]);
}

#[tokio::test]
async fn test_ask_agent() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/aiskills/ag-1/aiassistant/openai/chat/completions")
        .match_query(Matcher::Any)
        .match_body(Matcher::Regex(
            r#""role":"user","content":"How many sales\?""#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"42"}}]}"#)
        .create_async()
        .await;

    let endpoint = format!("{}/aiskills/ag-1/aiassistant/openai", server.url());
    let answer = client(&server)
        .ask_agent(&endpoint, "How many sales?")
        .await
        .unwrap();

    assert_eq!(answer, "42");
}

#[tokio::test]
async fn test_job_start_timeout_is_not_retryable() {
    // Accepts connections and never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let client = FabricClient::new(Credential::from_token("test-token"))
        .with_base_url(format!("http://{}", addr))
        .with_request_timeout(Duration::from_millis(200));

    let started = client.start_notebook_job("ws-1", "nb-1", false).await;
    assert!(
        matches!(started, Err(DadError::RemoteOutcomeUnknown { .. })),
        "got {:?}",
        started
    );

    let listed = client.list_notebooks("ws-1").await;
    assert!(matches!(listed, Err(ref e) if e.is_transient()), "got {:?}", listed);
}
