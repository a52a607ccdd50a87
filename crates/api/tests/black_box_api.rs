use std::collections::HashMap;

use atrium_infra::{AppConfig, StoreError};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn_with(config: Result<AppConfig, StoreError>) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let services = atrium_api::app::services::build_services(config).await;
        let app = atrium_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    async fn spawn() -> Self {
        Self::spawn_with(config(&[("ATRIUM_TIMELINE_BACKEND", "memory")])).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, StoreError> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(|key| map.get(key).cloned())
}

trait AsTenant {
    fn as_tenant(self, tenant: &str) -> Self;
}

impl AsTenant for reqwest::RequestBuilder {
    fn as_tenant(self, tenant: &str) -> Self {
        self.header("x-tenant-id", tenant).header("x-user-id", "u1")
    }
}

fn command(tenant: &str, base_rev: u64, key: &str) -> Value {
    json!({
        "command_id": format!("cmd-{key}"),
        "type": "canvas.apply_ops",
        "canvas_id": "c1",
        "base_rev": base_rev,
        "idempotency_key": key,
        "args": {"ops": [{"op": "add_node", "node_id": format!("n-{key}")}]},
        "routing": {"tenant_id": tenant, "env": "dev"}
    })
}

async fn register(client: &reqwest::Client, srv: &TestServer, tenant: &str, path: &str) -> StatusCode {
    client
        .post(srv.url(path))
        .as_tenant(tenant)
        .send()
        .await
        .unwrap()
        .status()
}

async fn apply(client: &reqwest::Client, srv: &TestServer, tenant: &str, body: &Value) -> (StatusCode, Value) {
    let res = client
        .post(srv.url("/canvases/c1/commands"))
        .as_tenant(tenant)
        .json(body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn health_is_public_and_domain_routes_need_identity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/canvases/c1/revision")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unconfigured_backend_answers_503() {
    let srv = TestServer::spawn_with(config(&[])).await;
    let client = reqwest::Client::new();

    assert_eq!(
        client.get(srv.url("/health")).send().await.unwrap().status(),
        StatusCode::OK
    );
    let res = client
        .get(srv.url("/canvases/c1/revision"))
        .as_tenant("t_A")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "backend_unavailable");
}

#[tokio::test]
async fn apply_idempotent_replay_and_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    assert_eq!(register(&client, &srv, "t_A", "/resources/canvas/c1").await, StatusCode::OK);

    let (status, first) = apply(&client, &srv, "t_A", &command("t_A", 0, "k1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "applied");
    assert_eq!(first["current_rev"], 1);

    let (status, replay) = apply(&client, &srv, "t_A", &command("t_A", 0, "k1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["current_rev"], 1);
    assert_eq!(replay["event_id"], first["event_id"]);
    assert_eq!(replay["reason"], "Idempotent replay");

    let (_, _) = apply(&client, &srv, "t_A", &command("t_A", 1, "k2")).await;
    let (status, conflict) = apply(&client, &srv, "t_A", &command("t_A", 1, "k3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conflict["status"], "conflict");
    assert_eq!(conflict["current_rev"], 2);
    assert_eq!(conflict["recovery_ops"].as_array().unwrap().len(), 1);

    let head: Value = client
        .get(srv.url("/canvases/c1/revision"))
        .as_tenant("t_A")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(head["head_rev"], 2);
}

#[tokio::test]
async fn foreign_tenants_get_404_and_wrong_routing_gets_403() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    assert_eq!(register(&client, &srv, "t_A", "/resources/thread/th-1").await, StatusCode::OK);
    assert_eq!(register(&client, &srv, "t_A", "/resources/canvas/c1").await, StatusCode::OK);

    assert_eq!(
        register(&client, &srv, "t_B", "/resources/thread/th-1").await,
        StatusCode::NOT_FOUND
    );
    let res = client
        .get(srv.url("/streams/thread/th-1/events"))
        .as_tenant("t_B")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let unknown = client
        .get(srv.url("/streams/thread/th-404/events"))
        .as_tenant("t_B")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        res.json::<Value>().await.unwrap(),
        unknown.json::<Value>().await.unwrap()
    );

    let (status, _) = apply(&client, &srv, "t_B", &command("t_B", 0, "k1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut prod = command("t_A", 0, "k1");
    prod["routing"]["env"] = json!("prod");
    let (status, body) = apply(&client, &srv, "t_A", &prod).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");
}

#[tokio::test]
async fn messages_replay_by_cursor() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    assert_eq!(register(&client, &srv, "t_A", "/resources/thread/th-1").await, StatusCode::OK);

    let mut ids = Vec::new();
    for text in ["hello", "world"] {
        let res = client
            .post(srv.url("/threads/th-1/messages"))
            .as_tenant("t_A")
            .json(&json!({"text": text, "role": "user", "sender_id": "u1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["event"]["type"], "chat.message");
        assert_eq!(body["event"]["meta"]["last_event_id"], body["event"]["event_id"]);
        ids.push(body["event"]["event_id"].as_str().unwrap().to_string());
    }

    let page: Value = client
        .get(srv.url(&format!("/streams/thread/th-1/events?after={}", ids[0])))
        .as_tenant("t_A")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let events = page["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event_id"], ids[1].as_str());
    assert_eq!(page["last_event_id"], ids[1].as_str());

    let gone = client
        .get(srv.url("/streams/thread/th-1/events?after=bogus"))
        .as_tenant("t_A")
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::GONE);
}

#[tokio::test]
async fn live_stream_starts_with_the_backlog() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    assert_eq!(register(&client, &srv, "t_A", "/resources/thread/th-1").await, StatusCode::OK);

    let posted: Value = client
        .post(srv.url("/threads/th-1/messages"))
        .as_tenant("t_A")
        .json(&json!({"text": "missed while offline"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id = posted["event"]["event_id"].as_str().unwrap().to_string();

    let mut res = client
        .get(srv.url("/streams/thread/th-1/live"))
        .as_tenant("t_A")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut seen = String::new();
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !seen.contains(&event_id) {
        let chunk = tokio::time::timeout_at(deadline, res.chunk())
            .await
            .expect("no SSE data before deadline")
            .unwrap()
            .expect("stream ended early");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(seen.contains(&format!("id: {event_id}")));
    assert!(seen.contains("event: chat.message"));

    let gone = client
        .get(srv.url("/streams/thread/th-1/live"))
        .as_tenant("t_A")
        .header("last-event-id", "bogus")
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::GONE);
}
