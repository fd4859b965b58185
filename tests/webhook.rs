//! Integration tests for the webhook intake.
//!
//! Each test spins up the real Axum server on a random port with the
//! in-memory ledger, a stub chat gateway, and a stub vision gateway, then
//! drives the full dispatch + worker + pipeline path over HTTP.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tokio::time::sleep;

use lens_relay::dispatch::idempotency::IdempotencyGate;
use lens_relay::dispatch::warn::{WarnScope, WarnThrottle};
use lens_relay::dispatch::{Dispatcher, ReplyTemplates};
use lens_relay::error::GatewayError;
use lens_relay::gateway::{ChatGateway, VisionGateway};
use lens_relay::pipeline::{ImageProcessor, ReplyFormat};
use lens_relay::server::{AppState, build_router};
use lens_relay::store::{CredentialStore, KvStore, MemoryStore};
use lens_relay::worker::{JobQueue, WorkerPool};

/// Chat stub: downloads succeed, posted replies are recorded.
struct StubChat {
    posts: Mutex<Vec<(String, String, String)>>,
}

impl StubChat {
    fn new() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
        }
    }

    fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    fn texts(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl ChatGateway for StubChat {
    async fn download_file(&self, _url: &str) -> Result<Vec<u8>, GatewayError> {
        Ok(b"image-bytes".to_vec())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.posts.lock().unwrap().push((
            channel_id.to_string(),
            thread_ts.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

/// Vision stub: counts invocations, records keys, answers or fails.
struct StubVision {
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
    fail_transport: bool,
}

impl StubVision {
    fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            fail_transport: false,
        }
    }

    fn timing_out() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            fail_transport: true,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionGateway for StubVision {
    async fn infer(
        &self,
        api_key: &SecretString,
        _image_data_uri: &str,
        _parameter: &str,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .push(api_key.expose_secret().to_string());
        if self.fail_transport {
            return Err(GatewayError::Transport {
                gateway: "vision",
                reason: "operation timed out".into(),
            });
        }
        Ok(r#"{"result": {"total_objects": 3, "object_counts": {"apple": 3}}}"#.to_string())
    }
}

struct Bridge {
    base_url: String,
    chat: Arc<StubChat>,
    vision: Arc<StubVision>,
    credentials: CredentialStore,
    client: reqwest::Client,
}

/// Start the full bridge with stub gateways on a random port.
async fn start_bridge(vision: StubVision) -> Bridge {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let chat = Arc::new(StubChat::new());
    let vision = Arc::new(vision);
    let credentials = CredentialStore::new(Arc::clone(&kv));

    let processor = Arc::new(ImageProcessor::new(
        Arc::clone(&chat) as Arc<dyn ChatGateway>,
        Arc::clone(&vision) as Arc<dyn VisionGateway>,
        ReplyFormat::ObjectCount,
    ));
    let queue: Arc<dyn JobQueue> = Arc::new(WorkerPool::start(
        2,
        16,
        processor,
        Arc::clone(&chat) as Arc<dyn ChatGateway>,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Some("UBOT".to_string()),
        IdempotencyGate::new(Arc::clone(&kv), Duration::from_secs(600)),
        WarnThrottle::new(Arc::clone(&kv), Duration::from_secs(3600), WarnScope::PerUser),
        credentials.clone(),
        Arc::clone(&chat) as Arc<dyn ChatGateway>,
        queue,
        ReplyTemplates::default(),
    ));

    let app = build_router(AppState { dispatcher }, Duration::from_secs(5));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Bridge {
        base_url: format!("http://{addr}"),
        chat,
        vision,
        credentials,
        client: reqwest::Client::new(),
    }
}

impl Bridge {
    async fn deliver(&self, body: serde_json::Value) -> (u16, String) {
        let resp = self
            .client
            .post(format!("{}/events", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.text().await.unwrap())
    }

    async fn register(&self, user: &str, secret: &str) {
        self.credentials
            .register(user, &SecretString::from(secret.to_string()))
            .await
            .unwrap();
    }
}

fn image_event(user: &str, ts: &str, client_msg_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "event_callback",
        "event_id": format!("Ev-{ts}"),
        "event": {
            "type": "message",
            "user": user,
            "channel": "C1",
            "ts": ts,
            "client_msg_id": client_msg_id,
            "text": "count apples",
            "files": [{"id": format!("F-{ts}"), "mimetype": "image/jpeg",
                        "url_private": "https://files.example/F1"}]
        }
    })
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn health_endpoint_answers() {
    let bridge = start_bridge(StubVision::ok()).await;
    let resp = bridge
        .client
        .get(&bridge.base_url)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp.text().await.unwrap().contains("running"));
}

#[tokio::test]
async fn url_verification_echoes_the_challenge_every_time() {
    let bridge = start_bridge(StubVision::ok()).await;
    let body = serde_json::json!({
        "type": "url_verification",
        "event_id": "Ev-fixed",
        "challenge": "challenge-token-123"
    });

    // Same delivery id twice: the handshake must never be deduplicated.
    for _ in 0..2 {
        let (status, text) = bridge.deliver(body.clone()).await;
        assert_eq!(status, 200);
        assert_eq!(text, "challenge-token-123");
    }
}

#[tokio::test]
async fn admitted_image_is_processed_once_and_replied_once() {
    let bridge = start_bridge(StubVision::ok()).await;
    bridge.register("U1", "sk-abc").await;

    let (status, text) = bridge.deliver(image_event("U1", "1.100", "cm-1")).await;
    assert_eq!(status, 200);
    assert_eq!(text, "ok");

    wait_until(|| bridge.chat.post_count() == 1).await;
    assert_eq!(bridge.vision.call_count(), 1);

    let texts = bridge.chat.texts();
    assert!(texts[0].contains("Total objects found: 3"));
    assert!(texts[0].contains("apple"));

    // The per-user key travelled to the inference gateway.
    assert_eq!(bridge.vision.keys.lock().unwrap()[0], "sk-abc");

    // Redelivery: acknowledged as duplicate, nothing reprocessed.
    let (status, text) = bridge.deliver(image_event("U1", "1.100", "cm-1")).await;
    assert_eq!(status, 200);
    assert_eq!(text, "duplicate");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.vision.call_count(), 1);
    assert_eq!(bridge.chat.post_count(), 1);
}

#[tokio::test]
async fn credential_less_user_gets_one_warning_across_deliveries() {
    let bridge = start_bridge(StubVision::ok()).await;

    let (_, text) = bridge.deliver(image_event("U2", "2.100", "cm-a")).await;
    assert_eq!(text, "no_credential");
    let (_, text) = bridge.deliver(image_event("U2", "2.200", "cm-b")).await;
    assert_eq!(text, "no_credential");

    wait_until(|| bridge.chat.post_count() >= 1).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.chat.post_count(), 1);
    assert!(bridge.chat.texts()[0].contains("register"));
    assert_eq!(bridge.vision.call_count(), 0);
}

#[tokio::test]
async fn bot_events_are_ignored_without_replies() {
    let bridge = start_bridge(StubVision::ok()).await;
    bridge.register("UBOT", "sk-bot").await;

    let mut body = image_event("UBOT", "3.100", "cm-bot");
    let (_, text) = bridge.deliver(body.clone()).await;
    assert_eq!(text, "ignored");

    body["event"]["user"] = serde_json::json!("U1");
    body["event"]["bot_id"] = serde_json::json!("B1");
    let (_, text) = bridge.deliver(body).await;
    assert_eq!(text, "ignored");

    sleep(Duration::from_millis(100)).await;
    assert_eq!(bridge.chat.post_count(), 0);
    assert_eq!(bridge.vision.call_count(), 0);
}

#[tokio::test]
async fn register_command_then_image_flows_end_to_end() {
    let bridge = start_bridge(StubVision::ok()).await;

    let command = serde_json::json!({
        "type": "event_callback",
        "event": {
            "type": "message",
            "user": "U3",
            "channel": "C1",
            "ts": "4.100",
            "client_msg_id": "cm-reg",
            "text": "register sk-fresh"
        }
    });
    let (status, text) = bridge.deliver(command).await;
    assert_eq!(status, 200);
    assert_eq!(text, "command");

    wait_until(|| bridge.chat.post_count() == 1).await;
    assert!(bridge.chat.texts()[0].contains("registered"));

    let (_, text) = bridge.deliver(image_event("U3", "4.200", "cm-img")).await;
    assert_eq!(text, "ok");

    wait_until(|| bridge.chat.post_count() == 2).await;
    assert_eq!(bridge.vision.keys.lock().unwrap()[0], "sk-fresh");
}

#[tokio::test]
async fn inference_timeout_yields_exactly_one_failure_reply() {
    let bridge = start_bridge(StubVision::timing_out()).await;
    bridge.register("U1", "sk-abc").await;

    let (_, text) = bridge.deliver(image_event("U1", "5.100", "cm-t")).await;
    assert_eq!(text, "ok");

    wait_until(|| bridge.chat.post_count() == 1).await;
    sleep(Duration::from_millis(100)).await;

    // No retry: one inference attempt, one failure reply.
    assert_eq!(bridge.vision.call_count(), 1);
    assert_eq!(bridge.chat.post_count(), 1);
    let reply = &bridge.chat.texts()[0];
    assert!(reply.contains(":x:"));
    assert!(reply.contains("timed out"));
}

#[tokio::test]
async fn multiple_attachments_get_independent_replies() {
    let bridge = start_bridge(StubVision::ok()).await;
    bridge.register("U1", "sk-abc").await;

    let body = serde_json::json!({
        "type": "event_callback",
        "event": {
            "type": "message",
            "user": "U1",
            "channel": "C1",
            "ts": "6.100",
            "client_msg_id": "cm-multi",
            "text": "",
            "files": [
                {"id": "F-a", "mimetype": "image/png", "url_private": "https://files.example/a"},
                {"id": "F-b", "mimetype": "image/png", "url_private": "https://files.example/b"},
                {"id": "F-c", "mimetype": "application/pdf", "url_private": "https://files.example/c"}
            ]
        }
    });
    let (_, text) = bridge.deliver(body).await;
    assert_eq!(text, "ok");

    // Two image attachments, two replies; the PDF is skipped.
    wait_until(|| bridge.chat.post_count() == 2).await;
    assert_eq!(bridge.vision.call_count(), 2);
}

#[tokio::test]
async fn malformed_json_is_the_only_rejection() {
    let bridge = start_bridge(StubVision::ok()).await;

    let resp = bridge
        .client
        .post(format!("{}/events", bridge.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());

    // A well-formed body with unknown shape still acknowledges 200.
    let (status, text) = bridge
        .deliver(serde_json::json!({"type": "something_else"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(text, "ignored");
}
