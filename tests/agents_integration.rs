use agentflow::Client;
use agentflow::agents::{AssistantParams, AssistantPatch};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, method, path},
};

fn assistant(name: &str, configurable: &Value, version: u64) -> Value {
    json!({
        "assistant_id": "a1",
        "graph_id": "custom_agent",
        "name": name,
        "config": {"configurable": configurable},
        "metadata": {},
        "created_at": "2025-03-01T09:00:00+00:00",
        "updated_at": "2025-03-02T09:00:00+00:00",
        "version": version
    })
}

#[tokio::test]
async fn list_searches_the_configured_graph() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/assistants/search"))
        .and(body_json(json!({"graph_id": "reporting_agent", "limit": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([assistant(
            "Reporter",
            &json!({"model_preset": "claude-sonnet", "instructions": "Be brief"}),
            1
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri())
        .unwrap()
        .with_graph_id("reporting_agent");
    let assistants = client.assistants().list().await.unwrap();
    assert_eq!(assistants.len(), 1);
    assert_eq!(assistants[0].config.configurable.model_preset, "claude-sonnet");
}

#[tokio::test]
async fn create_from_params_nests_configurable() {
    let server = MockServer::start().await;
    let configurable = json!({
        "model_preset": "gpt-4o",
        "instructions": "Triage email",
        "flow_tool_ids": ["f1"],
        "gumcp_services": []
    });
    Mock::given(method("POST"))
        .and(path("/assistants"))
        .and(body_partial_json(json!({
            "graph_id": "custom_agent",
            "name": "Triage",
            "config": {"configurable": configurable}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant("Triage", &configurable, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let created = client
        .assistants()
        .create_from_params(AssistantParams {
            name: "Triage".to_string(),
            model_preset: "gpt-4o".to_string(),
            instructions: "Triage email".to_string(),
            flow_tool_ids: vec!["f1".to_string()],
            gumcp_services: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(created.name, "Triage");
}

#[tokio::test]
async fn update_from_params_merges_with_current_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assistants/a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant(
            "Reporter",
            &json!({
                "model_preset": "claude-sonnet",
                "instructions": "Be brief",
                "flow_tool_ids": ["f1", "f2"],
                "gumcp_services": ["gmail"]
            }),
            3,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let merged = json!({
        "model_preset": "gemini-flash",
        "instructions": "Be brief",
        "flow_tool_ids": ["f1", "f2"],
        "gumcp_services": ["gmail"]
    });
    Mock::given(method("PATCH"))
        .and(path("/assistants/a1"))
        .and(body_json(json!({"config": {"configurable": merged}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(assistant("Reporter", &merged, 4)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let updated = client
        .assistants()
        .update_from_params(
            "a1",
            AssistantPatch {
                model_preset: Some("gemini-flash".to_string()),
                ..AssistantPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, Some(4));
    assert_eq!(updated.config.configurable.gumcp_services, ["gmail"]);
}

#[tokio::test]
async fn discovery_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agents/presets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "claude-sonnet", "name": "Claude Sonnet", "provider": "anthropic"},
            {"id": "gpt-4o"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agents/gumcp-services"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"services": ["gmail", "gsheets"]})),
        )
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    let presets = client.assistants().presets().await.unwrap();
    assert_eq!(presets[0].label(), "Claude Sonnet");
    assert_eq!(presets[1].label(), "gpt-4o");
    assert_eq!(client.assistants().services().await.unwrap(), ["gmail", "gsheets"]);
}

#[tokio::test]
async fn delete_accepts_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/assistants/a1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(server.uri()).unwrap();
    client.assistants().delete("a1").await.unwrap();
}
