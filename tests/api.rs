use axum::{body::Body, http, response::Response, Router};
use openbio_infer::api::{routes, ProxySettings};
use openbio_infer::upstream::{ChatRequest, ChatUpstream, UpstreamError};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

#[derive(Clone)]
enum Reply {
    Body(Value),
    Fail,
}

#[derive(Clone)]
struct FakeUpstream {
    reply: Reply,
    delay: Duration,
    seen: Arc<Mutex<Vec<Value>>>,
}

impl FakeUpstream {
    fn new(reply: Reply) -> Self {
        Self { reply, delay: Duration::ZERO, seen: Arc::new(Mutex::new(Vec::new())) }
    }
}

#[async_trait::async_trait]
impl ChatUpstream for FakeUpstream {
    async fn chat_completions(&self, req: &ChatRequest) -> Result<Value, UpstreamError> {
        self.seen.lock().unwrap().push(serde_json::to_value(req).unwrap());
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Reply::Body(v) => Ok(v.clone()),
            Reply::Fail => Err(UpstreamError("connection refused".into())),
        }
    }
}

fn settings() -> ProxySettings {
    ProxySettings {
        model_id: "aaditya/Llama3-OpenBioLLM-8B".into(),
        temperature: 0.2,
        top_p: 0.9,
        max_tokens: 64,
        template_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/prompt_template.txt"),
    }
}

fn test_router(upstream: FakeUpstream) -> Router {
    routes(upstream, settings())
}

fn hello_test() -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": "Hello test"}, "index": 0}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn generate_req(body: Value) -> http::Request<Body> {
    http::Request::builder()
        .method(http::Method::POST)
        .uri("/generate")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_ok_without_upstream() {
    let app = test_router(FakeUpstream::new(Reply::Fail));
    let req = http::Request::builder().uri("/health").body(Body::empty()).unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = json_body(res).await;
    assert_eq!(v["status"], "ok");
    assert_eq!(v["model"], "aaditya/Llama3-OpenBioLLM-8B");
}

#[tokio::test]
async fn generate_ok() {
    let upstream = FakeUpstream::new(Reply::Body(hello_test()));
    let seen = upstream.seen.clone();
    let app = test_router(upstream);

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = json_body(res).await;
    assert_eq!(v["text"], "Hello test");
    assert_eq!(v["prompt_tokens"], 10);
    assert_eq!(v["completion_tokens"], 5);
    assert!(v["latency_ms"].as_u64().is_some());

    let sent = seen.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["model"], "aaditya/Llama3-OpenBioLLM-8B");
    assert_eq!(sent[0]["stream"], false);
    assert_eq!(sent[0]["max_tokens"], 64);
    assert_eq!(sent[0]["messages"][0]["role"], "system");
    assert!(sent[0]["messages"][0]["content"].as_str().unwrap().contains("clinical assistant"));
    assert_eq!(sent[0]["messages"][1], json!({"role": "user", "content": "test"}));
}

#[tokio::test]
async fn generate_latency_covers_upstream_call() {
    let mut upstream = FakeUpstream::new(Reply::Body(hello_test()));
    upstream.delay = Duration::from_millis(50);
    let app = test_router(upstream);

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = json_body(res).await;
    let latency = v["latency_ms"].as_u64().unwrap();
    assert!(latency >= 50, "latency {latency} ms");
}

#[tokio::test]
async fn generate_without_usage_reports_null_tokens() {
    let body = json!({"choices": [{"message": {"content": " plain "}}]});
    let app = test_router(FakeUpstream::new(Reply::Body(body)));

    let res = app.oneshot(generate_req(json!({"input": "x"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    let v = json_body(res).await;
    assert_eq!(v["text"], "plain");
    assert!(v["prompt_tokens"].is_null());
    assert!(v["completion_tokens"].is_null());
}

#[tokio::test]
async fn generate_upstream_error_is_502() {
    let app = test_router(FakeUpstream::new(Reply::Fail));

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::BAD_GATEWAY);
    let v = json_body(res).await;
    assert_eq!(v["detail"], "Upstream vLLM error");
    assert!(v.get("text").is_none());
}

#[tokio::test]
async fn generate_missing_choices_is_500() {
    let body = json!({"usage": {"prompt_tokens": 1, "completion_tokens": 1}});
    let app = test_router(FakeUpstream::new(Reply::Body(body)));

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    let v = json_body(res).await;
    assert_eq!(v["detail"], "Malformed vLLM response");
}

#[tokio::test]
async fn generate_empty_choices_is_500() {
    let app = test_router(FakeUpstream::new(Reply::Body(json!({"choices": []}))));

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn generate_missing_template_is_500() {
    let mut s = settings();
    s.template_path = PathBuf::from("no/such/template.txt");
    let upstream = FakeUpstream::new(Reply::Body(hello_test()));
    let seen = upstream.seen.clone();
    let app = routes(upstream, s);

    let res = app.oneshot(generate_req(json!({"input": "test"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generate_bad_request() {
    let app = test_router(FakeUpstream::new(Reply::Body(hello_test())));
    // missing required field "input"
    let res = app.oneshot(generate_req(json!({"text": "x"}))).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn template_edits_apply_to_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tpl.txt");
    std::fs::write(&path, "<|system|>first<|user|>{{input}}").unwrap();

    let upstream = FakeUpstream::new(Reply::Body(hello_test()));
    let seen = upstream.seen.clone();
    let mut s = settings();
    s.template_path = path.clone();
    let app = routes(upstream, s);

    app.clone().oneshot(generate_req(json!({"input": "a"}))).await.unwrap();
    std::fs::write(&path, "<|system|>second<|user|>{{input}}").unwrap();
    app.oneshot(generate_req(json!({"input": "b"}))).await.unwrap();

    let sent = seen.lock().unwrap();
    assert_eq!(sent[0]["messages"][0]["content"], "first");
    assert_eq!(sent[1]["messages"][0]["content"], "second");
}
