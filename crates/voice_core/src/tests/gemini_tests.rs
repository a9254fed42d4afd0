use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::*;
use crate::registry::FunctionRegistry;

#[derive(Debug, Clone)]
struct Captured {
    call: String,
    query: HashMap<String, String>,
    body: Value,
}

struct Stub {
    status: StatusCode,
    reply: Value,
    captured: Mutex<Vec<Captured>>,
}

async fn stub_handler(
    State(stub): State<Arc<Stub>>,
    Path(call): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    stub.captured
        .lock()
        .expect("captured lock")
        .push(Captured { call, query, body });
    (stub.status, Json(stub.reply.clone()))
}

async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Arc<Stub>) {
    let stub = Arc::new(Stub {
        status,
        reply,
        captured: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/v1beta/models/:call", post(stub_handler))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve stub");
    });
    (format!("http://{addr}/v1beta"), stub)
}

fn client_for(endpoint: String) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        api_key: Some("test-key".to_string()),
        endpoint,
        model: "gemini-test".to_string(),
        temperature: None,
        max_output_tokens: Some(256),
    })
    .expect("client")
}

fn request_with(history: Vec<Message>) -> ModelRequest {
    ModelRequest {
        history,
        system_instruction: "You are Robbie.".to_string(),
        functions: FunctionRegistry::with_builtin_functions().declarations(),
        options: GenerationOptions {
            temperature: None,
            max_output_tokens: Some(256),
        },
    }
}

#[tokio::test]
async fn decodes_text_and_function_call_parts() {
    let (endpoint, stub) = spawn_stub(
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Opening analytics." },
                        { "functionCall": { "name": "navigate_to", "args": { "destination": "analytics" } } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }),
    )
    .await;
    let client = client_for(endpoint);

    let reply = client
        .generate(request_with(vec![Message::user_text("show me analytics")]))
        .await
        .expect("reply");

    let mut args = Map::new();
    args.insert("destination".into(), json!("analytics"));
    assert_eq!(
        reply.parts,
        vec![
            ReplyPart::Text("Opening analytics.".to_string()),
            ReplyPart::FunctionCall(FunctionCall {
                name: "navigate_to".to_string(),
                args,
            }),
        ]
    );

    let captured = stub.captured.lock().expect("captured lock").clone();
    assert_eq!(captured.len(), 1);
    let request = &captured[0];
    assert_eq!(request.call, "gemini-test:generateContent");
    assert_eq!(request.query.get("key").map(String::as_str), Some("test-key"));
    assert_eq!(
        request.body["systemInstruction"]["parts"][0]["text"],
        "You are Robbie."
    );
    assert_eq!(
        request.body["tools"][0]["functionDeclarations"][0]["name"],
        "navigate_to"
    );
    assert_eq!(request.body["contents"][0]["role"], "user");
    assert_eq!(
        request.body["contents"][0]["parts"][0]["text"],
        "show me analytics"
    );
    assert_eq!(request.body["generationConfig"]["maxOutputTokens"], 256);
    assert!(request.body["generationConfig"].get("temperature").is_none());
}

#[tokio::test]
async fn history_carries_function_calls_and_responses() {
    let (endpoint, stub) = spawn_stub(
        StatusCode::OK,
        json!({ "candidates": [{ "content": { "parts": [{ "text": "Done." }] } }] }),
    )
    .await;
    let client = client_for(endpoint);

    let history = vec![
        Message::user_text("set lead time to six weeks"),
        Message {
            role: Role::Model,
            parts: vec![ReplyPart::FunctionCall(FunctionCall {
                name: "set_lead_time".to_string(),
                args: Map::new(),
            })],
        },
        Message {
            role: Role::User,
            parts: vec![ReplyPart::FunctionResponse {
                name: "set_lead_time".to_string(),
                response: json!({ "success": true }),
            }],
        },
    ];
    client.generate(request_with(history)).await.expect("reply");

    let body = stub.captured.lock().expect("captured lock")[0].body.clone();
    assert_eq!(body["contents"][1]["role"], "model");
    assert_eq!(
        body["contents"][1]["parts"][0]["functionCall"]["name"],
        "set_lead_time"
    );
    assert_eq!(
        body["contents"][2]["parts"][0]["functionResponse"]["response"]["success"],
        true
    );
}

#[tokio::test]
async fn non_success_status_is_external_api_error() {
    let (endpoint, _stub) = spawn_stub(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": { "code": 429, "message": "quota exhausted", "status": "RESOURCE_EXHAUSTED" } }),
    )
    .await;
    let client = client_for(endpoint);

    let err = client
        .generate(request_with(vec![Message::user_text("hello")]))
        .await
        .expect_err("429");
    match err {
        VoiceError::ExternalApi(message) => {
            assert!(message.contains("429"), "{message}");
            assert!(message.contains("quota exhausted"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_candidates_are_rejected() {
    let (endpoint, _stub) = spawn_stub(StatusCode::OK, json!({ "candidates": [] })).await;
    let client = client_for(endpoint);

    let err = client
        .generate(request_with(vec![Message::user_text("hello")]))
        .await
        .expect_err("no candidates");
    assert!(matches!(err, VoiceError::ExternalApi(_)));
}

#[tokio::test]
async fn missing_api_key_is_not_initialized() {
    let client = GeminiClient::new(GeminiConfig::default()).expect("client");
    let err = client
        .generate(request_with(vec![Message::user_text("hello")]))
        .await
        .expect_err("no key");
    assert!(matches!(err, VoiceError::NotInitialized(_)));
}

#[test]
fn config_reads_environment_lookup() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("GEMINI_API_KEY", "  "),
        ("GEMINI_ENDPOINT", "not a url"),
        ("GEMINI_MODEL", "gemini-1.5-pro"),
    ]);
    let config = GeminiConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
    assert_eq!(config.api_key, None);
    assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(config.model, "gemini-1.5-pro");

    let config = GeminiConfig::from_lookup(|key| match key {
        "GEMINI_API_KEY" => Some("secret".to_string()),
        "GEMINI_ENDPOINT" => Some("http://127.0.0.1:9999/v1beta".to_string()),
        _ => None,
    });
    assert_eq!(config.api_key.as_deref(), Some("secret"));
    assert_eq!(config.endpoint, "http://127.0.0.1:9999/v1beta");
    assert_eq!(config.model, DEFAULT_MODEL);
}
