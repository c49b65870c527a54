use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use psych_eval::config::Config;
use psych_eval::inference::{
    BackendKind, CompletionBackend, InferenceError, InferenceGateway, InferenceRequest,
};

const BOUNDARY: &str = "psych-eval-test-boundary";

struct CannedBackend {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl CannedBackend {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for CannedBackend {
    fn name(&self) -> &'static str {
        "canned"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn complete(&self, _request: &InferenceRequest) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InferenceError::EmptyResponse)
    }
}

fn app(backend: Arc<CannedBackend>) -> Router {
    app_with_upload_limit(backend, 1_048_576)
}

fn app_with_upload_limit(backend: Arc<CannedBackend>, max_bytes: usize) -> Router {
    let config = Config::from_lookup(|key| match key {
        "DEEPSEEK_API_KEY" => Some("sk-test".to_string()),
        "UPLOAD_MAX_BYTES" => Some(max_bytes.to_string()),
        _ => None,
    })
    .unwrap();
    let state = psych_eval::build_state(&config, InferenceGateway::new(backend));
    psych_eval::api::router(state)
}

fn json_request(method: &str, uri: &str, session: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, session: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-session-id", session)
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/image/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn tiny_png() -> Vec<u8> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::new(8, 8))
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

#[tokio::test]
async fn chat_without_message_is_rejected() {
    let backend = CannedBackend::new(&["hello"]);
    let app = app(backend.clone());

    let (status, body) = send(&app, json_request("POST", "/api/chat", Some("s1"), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_session_header_is_rejected() {
    let app = app(CannedBackend::new(&[]));

    let (status, body) = send(
        &app,
        json_request("POST", "/api/chat", None, json!({"message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn chat_round_trip_is_stored_in_session() {
    let app = app(CannedBackend::new(&["<think>plan</think>我在听。"]));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/chat",
            Some("s1"),
            json!({"message": "今天心情不好"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["reply"], "我在听。");

    let (_, history) = send(&app, empty_request("GET", "/api/chat/history", "s1")).await;
    let turns = history["history"].as_array().unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0]["role"], "system");
    assert_eq!(turns[2]["content"], "我在听。");

    let (_, other) = send(&app, empty_request("GET", "/api/chat/history", "s2")).await;
    assert_eq!(other["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reset_leaves_only_system_prompt() {
    let app = app(CannedBackend::new(&["ok"]));

    send(
        &app,
        json_request("POST", "/api/chat", Some("s1"), json!({"message": "hello"})),
    )
    .await;
    let (status, _) = send(&app, empty_request("POST", "/api/chat/reset", "s1")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, empty_request("GET", "/api/chat/history", "s1")).await;
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["role"], "system");
}

#[tokio::test]
async fn assess_without_conversation_is_no_history() {
    let backend = CannedBackend::new(&["report"]);
    let app = app(backend.clone());

    let (status, body) = send(&app, empty_request("POST", "/api/chat/assess", "fresh")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_history");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn out_of_range_survey_is_invalid_input() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app(backend.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/survey",
            Some("s1"),
            json!({"questions": ["a", "b", "c"], "responses": [0, 1, 4]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/survey",
            Some("s1"),
            json!({"questions": ["a", "b"], "responses": [1]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn non_string_question_is_invalid_input() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app(backend.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/survey",
            Some("s1"),
            json!({"questions": ["a", 2], "responses": [1, 2]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn survey_result_is_returned_and_recorded() {
    let app = app(CannedBackend::new(&[
        r#"{"score": 42, "risk_level": "Medium", "analysis": "中度压力", "recommendations": ["规律作息", "适度运动"]}"#,
    ]));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/survey",
            Some("s1"),
            json!({"questions": ["我感到紧张", "我睡眠不好"], "responses": [2, 1], "ageGroup": "18-25"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["score"], 42);
    assert_eq!(body["risk_level"], "medium");
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 2);

    let (_, history) = send(&app, empty_request("GET", "/api/survey/history", "s1")).await;
    let records = history["history"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["ageGroup"], "18-25");
    assert_eq!(records[0]["result"]["score"], 42);

    send(&app, empty_request("POST", "/api/survey/reset", "s1")).await;
    let (_, history) = send(&app, empty_request("GET", "/api/survey/history", "s1")).await;
    assert!(history["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_survey_reply_is_degraded() {
    let app = app(CannedBackend::new(&["sorry, no idea"]));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/survey",
            Some("s1"),
            json!({"questions": ["a"], "responses": [0]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["score"].is_null());
    assert_eq!(body["risk_level"], "unknown");
}

#[tokio::test]
async fn evaluate_rejects_malformed_json() {
    let app = app(CannedBackend::new(&[]));
    let request = Request::builder()
        .method("POST")
        .uri("/api/evaluate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn evaluate_returns_report() {
    let app = app(CannedBackend::new(&["1. 综合心理评价：良好"]));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/evaluate",
            None,
            json!({"text": "最近还好", "questions": ["q"], "responses": [1]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "1. 综合心理评价：良好");
}

#[tokio::test]
async fn evaluate_backend_failure_is_unavailable() {
    let app = app(CannedBackend::new(&[]));

    let (status, body) = send(
        &app,
        json_request("POST", "/api/evaluate", None, json!({"text": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "inference_unavailable");
    assert!(!body["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn upload_with_disallowed_extension_is_415() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app(backend.clone());

    let (status, body) = send(
        &app,
        multipart_request(&[("file", Some("notes.txt"), &b"hello"[..])]),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_type");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn upload_without_image_is_missing_upload() {
    let app = app(CannedBackend::new(&[]));

    let (status, body) = send(&app, multipart_request(&[("note", None, &b"nothing"[..])])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_upload");
}

#[tokio::test]
async fn upload_file_is_analyzed() {
    let app = app(CannedBackend::new(&[r#"{"emotion": "平静", "analysis": "色调柔和"}"#]));
    let png = tiny_png();

    let (status, body) = send(
        &app,
        multipart_request(&[("file", Some("drawing.PNG"), png.as_slice())]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "upload successful");
    assert_eq!(body["result"]["emotion"], "平静");
}

#[tokio::test]
async fn upload_base64_field_is_analyzed() {
    let app = app(CannedBackend::new(&["画面明亮"]));
    let encoded = format!("data:image/png;base64,{}", BASE64.encode(tiny_png()));

    let (status, body) = send(
        &app,
        multipart_request(&[("image", None, encoded.as_bytes())]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["emotion"].is_null());
    assert_eq!(body["result"]["analysis"], "画面明亮");
}

#[tokio::test]
async fn undecodable_upload_is_rejected() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app(backend.clone());

    let (status, body) = send(
        &app,
        multipart_request(&[("file", Some("photo.jpg"), &b"not really a jpeg"[..])]),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_type");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn oversized_file_upload_is_rejected() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app_with_upload_limit(backend.clone(), 4096);
    let payload = vec![0u8; 8192];

    let (status, body) = send(
        &app,
        multipart_request(&[("file", Some("large.png"), payload.as_slice())]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "upload_too_large");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn oversized_base64_upload_is_rejected() {
    let backend = CannedBackend::new(&["{}"]);
    let app = app_with_upload_limit(backend.clone(), 4096);
    let encoded = BASE64.encode(vec![0u8; 8192]);

    let (status, body) = send(
        &app,
        multipart_request(&[("image", None, encoded.as_bytes())]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "upload_too_large");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn upload_at_the_limit_is_accepted() {
    let png = tiny_png();
    let app = app_with_upload_limit(
        CannedBackend::new(&[r#"{"emotion": "平静", "analysis": "ok"}"#]),
        png.len(),
    );

    let (status, _) = send(
        &app,
        multipart_request(&[("file", Some("drawing.png"), png.as_slice())]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
