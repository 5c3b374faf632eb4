use agentflow::cli::{self, Command, ExecutionsCommand, FlowsCommand};
use agentflow::config::{
    ApiConfig, AppConfig, AssistantsConfig, PollingConfig, StreamingConfig, ThreadsConfig,
};
use agentflow::flows::{ExecutionStatus, Outcome};
use agentflow::stream::{FlowExecutionArtifact, ProgressStatus, StreamEvent};
use agentflow::{Client, Error};
use futures::StreamExt;
use serde_json::{Map, Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, method, path, query_param},
};

fn app_config(base_url: &str) -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 30,
        },
        polling: PollingConfig {
            interval_ms: 2000,
            max_retries: 3,
        },
        streaming: StreamingConfig { timeout_secs: 60 },
        threads: ThreadsConfig { search_limit: 100 },
        assistants: AssistantsConfig {
            graph_id: "custom_agent".to_string(),
        },
    }
}

async fn mount_send_report_schema(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/flows/f1/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1",
            "name": "send_report",
            "description": "",
            "parameters": {"recipient": {"type": "string", "required": true}},
            "return_type": "dict"
        })))
        .mount(server)
        .await;
}

fn run_command(recipient: &str) -> Command {
    Command::Flows(FlowsCommand::Run {
        flow_id: "f1".to_string(),
        params: vec![("recipient".to_string(), recipient.to_string())],
        poll: false,
        timeout: None,
        run_id: Some("run-9".to_string()),
    })
}

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}

#[tokio::test]
async fn execute_stream_yields_events_in_order() {
    let server = MockServer::start().await;
    let body = format!(
        "{}data: {{not json}}\n\n{}",
        sse(&[
            json!({"type": "stream", "status": "success", "message": "fetched rows", "timestamp": "t1"}),
        ]),
        sse(&[
            json!({"type": "stream", "status": "success", "message": "sent report", "timestamp": "t2"}),
            json!({"type": "complete", "success": true, "data": {"status": "success", "sent": 3}, "execution_time": 1.5, "timestamp": "t3"}),
        ]),
    );

    Mock::given(method("POST"))
        .and(path("/flows/f1/execute-stream"))
        .and(body_partial_json(json!({"run_id": "run-1", "timeout": 60, "parameters": {"to": "ops"}})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let mut parameters = Map::new();
    parameters.insert("to".to_string(), json!("ops"));

    let events: Vec<StreamEvent> = client
        .flows()
        .execute_stream("f1", &parameters, 60, Some("run-1"))
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    match &events[0] {
        StreamEvent::Stream(p) => assert_eq!(p.message, "fetched rows"),
        other => panic!("unexpected first event: {other:?}"),
    }
    match &events[2] {
        StreamEvent::Complete(done) => {
            assert_eq!(done.outcome(), Outcome::Succeeded);
            assert_eq!(done.execution_time, Some(1.5));
        }
        other => panic!("unexpected last event: {other:?}"),
    }
}

#[tokio::test]
async fn execute_stream_http_error_becomes_failure_pair() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows/f1/execute-stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let events: Vec<StreamEvent> = client
        .flows()
        .execute_stream("f1", &Map::new(), 60, None)
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    match (&events[0], &events[1]) {
        (StreamEvent::Stream(p), StreamEvent::Complete(c)) => {
            assert_eq!(p.status, ProgressStatus::Failed);
            assert_eq!(p.message, "HTTP error! status: 500");
            assert!(!c.success);
            assert_eq!(c.error.as_deref(), Some("HTTP error! status: 500"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn execute_stream_connection_failure_becomes_failure_pair() {
    // Nothing listens on the port once the server is dropped.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let client = Client::new(uri).unwrap();
    let events: Vec<StreamEvent> = client
        .flows()
        .execute_stream("f1", &Map::new(), 60, None)
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Stream(p) if p.status == ProgressStatus::Failed));
    assert!(matches!(&events[1], StreamEvent::Complete(c) if !c.success));
}

#[tokio::test]
async fn artifact_execution_reuses_agent_run_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows/f9/execute-stream"))
        .and(body_partial_json(json!({"run_id": "agent-run-7", "parameters": {"limit": 5}})))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[json!({
            "type": "complete", "success": false, "error": "quota exceeded", "timestamp": "t"
        })])))
        .expect(1)
        .mount(&server)
        .await;

    let artifact = FlowExecutionArtifact::from_value(&json!({
        "type": "flow_execution_request",
        "flow_id": "f9",
        "flow_name": "sync_contacts",
        "run_id": "agent-run-7",
        "parameters": {"limit": 5}
    }))
    .unwrap();

    let client = Client::new(server.uri()).unwrap();
    let events: Vec<StreamEvent> = client.flows().execute_artifact(&artifact, 30).collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Complete(c) if c.outcome() == Outcome::Failed));
}

#[tokio::test]
async fn api_errors_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flows/missing/schema"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Flow not found"))
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let err = client.flows().schema("missing").await.unwrap_err();
    match &err {
        Error::Api { status, message } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Flow not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "API Error (404): Flow not found");
}

#[tokio::test]
async fn schema_drives_parameter_building() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flows/f1/schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1",
            "name": "send_report",
            "description": "Email the weekly report",
            "parameters": {
                "recipient": {"type": "string", "required": true},
                "copies": {"type": "integer", "default": 1},
                "dry_run": {"type": "boolean"}
            },
            "return_type": "dict"
        })))
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let schema = client.flows().schema("f1").await.unwrap();

    let params = schema
        .parameters_from_pairs([("recipient", "ops@example.com"), ("dry_run", "true")])
        .unwrap();
    assert_eq!(params["recipient"], json!("ops@example.com"));
    assert_eq!(params["copies"], json!(1));
    assert_eq!(params["dry_run"], json!(true));

    assert!(matches!(
        schema.parameters_from_pairs([("copies", "2")]),
        Err(Error::InvalidParameter { ref name, .. }) if name == "recipient"
    ));
}

#[tokio::test]
async fn executions_list_filters_by_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/executions"))
        .and(query_param("status", "running"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "executions": [{"id": "e1", "flow_id": "f1", "status": "running"}],
            "total": 21,
            "page": 2,
            "limit": 20
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let page = client
        .executions()
        .list(2, 20, Some(ExecutionStatus::Running))
        .await
        .unwrap();
    assert_eq!(page.executions.len(), 1);
    assert_eq!(page.executions[0].outcome(), None);
}

#[tokio::test]
async fn cancel_ignores_response_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/executions/e1/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_string("cancelled"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    client.executions().cancel("e1").await.unwrap();
}

#[tokio::test]
async fn run_stops_when_validation_fails() {
    let server = MockServer::start().await;
    mount_send_report_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/flows/f1/validate"))
        .and(body_json(json!({"recipient": "nobody"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_valid": false,
            "errors": ["recipient must be an email address", "recipient is not allowed"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/flows/f1/execute-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(0)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let err = cli::run(run_command("nobody"), &client, &app_config(&server.uri()))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Validation failed: recipient must be an email address, recipient is not allowed"
    );
}

#[tokio::test]
async fn run_executes_after_successful_validation() {
    let server = MockServer::start().await;
    mount_send_report_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/flows/f1/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_valid": true,
            "warnings": ["recipient is external"]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/flows/f1/execute-stream"))
        .and(body_partial_json(json!({"run_id": "run-9", "timeout": 60})))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[json!({
            "type": "complete", "success": true, "execution_time": 0.2, "timestamp": "t"
        })])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    cli::run(run_command("ops@example.com"), &client, &app_config(&server.uri()))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_execution() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/executions/e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/executions/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Execution not found"))
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let command = Command::Executions(ExecutionsCommand::Delete {
        execution_id: "e1".to_string(),
    });
    cli::run(command, &client, &app_config(&server.uri()))
        .await
        .unwrap();

    assert!(matches!(
        client.executions().delete("missing").await,
        Err(Error::Api { status: 404, .. })
    ));
}
