use super::*;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Captured {
    params: Arc<Mutex<Option<HashMap<String, String>>>>,
    headers: Arc<Mutex<Option<HashMap<String, String>>>>,
    body: Arc<Mutex<Option<serde_json::Value>>>,
    path: Arc<Mutex<Option<String>>>,
    raw_body: Arc<Mutex<Option<Vec<u8>>>>,
}

fn snapshot_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

async fn spawn_router(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn wire_user() -> serde_json::Value {
    json!({
        "id": "00000000-0000-0000-0000-000000000055",
        "email": "inspector@example.com",
        "user_metadata": { "full_name": "Ada Inspector" }
    })
}

#[tokio::test]
async fn sign_in_decodes_session_and_arms_bearer_for_later_calls() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/auth/v1/token",
            post(|| async {
                Json(json!({
                    "access_token": "user-token",
                    "refresh_token": "refresh-token",
                    "expires_in": 3600,
                    "user": wire_user(),
                }))
            }),
        )
        .route(
            "/rest/v1/profiles",
            get(
                |State(state): State<Captured>, headers: HeaderMap| async move {
                    *state.headers.lock().expect("lock") = Some(snapshot_headers(&headers));
                    Json(json!([]))
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    let session = client
        .auth()
        .sign_in("inspector@example.com", "pw")
        .await
        .expect("sign in");

    assert_eq!(session.access_token, "user-token");
    assert_eq!(session.user.email, "inspector@example.com");
    assert_eq!(session.user.display_name.as_deref(), Some("Ada Inspector"));
    assert!(session.expires_at.is_some());

    let _rows: Vec<serde_json::Value> = client.from("profiles").fetch().await.expect("fetch");
    let headers = captured.headers.lock().expect("lock").clone().expect("captured");
    assert_eq!(headers.get("authorization").map(String::as_str), Some("Bearer user-token"));
    assert_eq!(headers.get("apikey").map(String::as_str), Some("anon-key"));
}

#[tokio::test]
async fn sign_in_passes_remote_error_message_through() {
    let app = Router::new().route(
        "/auth/v1/token",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error_description": "Invalid login credentials" })),
            )
        }),
    );
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    let err = client
        .auth()
        .sign_in("inspector@example.com", "wrong")
        .await
        .expect_err("must fail");

    match err {
        ClientError::Remote(message) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn sign_out_drops_token_even_when_remote_rejects() {
    let app = Router::new().route(
        "/auth/v1/logout",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "logout backend down" })),
            )
        }),
    );
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    client.set_access_token(Some("user-token".to_string()));

    let err = client.auth().sign_out().await.expect_err("must surface");
    match err {
        ClientError::Remote(message) => assert_eq!(message, "logout backend down"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn user_is_none_without_token_and_when_token_rejected() {
    let app = Router::new().route(
        "/auth/v1/user",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "bad jwt" }))) }),
    );
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    assert!(client.auth().user().await.expect("no token").is_none());

    client.set_access_token(Some("stale".to_string()));
    assert!(client.auth().user().await.expect("rejected token").is_none());
}

#[tokio::test]
async fn table_query_assembles_filters_order_and_limit() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/rest/v1/traffic_data",
            get(
                |State(state): State<Captured>, Query(params): Query<HashMap<String, String>>| async move {
                    *state.params.lock().expect("lock") = Some(params);
                    Json(json!([]))
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    let _rows: Vec<serde_json::Value> = client
        .from("traffic_data")
        .select("*")
        .eq("junction_id", "j-1")
        .gte("timestamp", "2026-01-01T00:00:00Z")
        .order("timestamp", false)
        .limit(10)
        .fetch()
        .await
        .expect("fetch");

    let params = captured.params.lock().expect("lock").clone().expect("captured");
    assert_eq!(params.get("select").map(String::as_str), Some("*"));
    assert_eq!(params.get("junction_id").map(String::as_str), Some("eq.j-1"));
    assert_eq!(
        params.get("timestamp").map(String::as_str),
        Some("gte.2026-01-01T00:00:00Z")
    );
    assert_eq!(params.get("order").map(String::as_str), Some("timestamp.desc"));
    assert_eq!(params.get("limit").map(String::as_str), Some("10"));
}

#[tokio::test]
async fn fetch_one_asserts_a_single_row() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/rest/v1/profiles",
            get(
                |State(state): State<Captured>, headers: HeaderMap| async move {
                    *state.headers.lock().expect("lock") = Some(snapshot_headers(&headers));
                    Json(json!({ "row": 1 }))
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    let _row: serde_json::Value = client
        .from("profiles")
        .eq("id", "u-1")
        .fetch_one()
        .await
        .expect("fetch one");

    let headers = captured.headers.lock().expect("lock").clone().expect("captured");
    assert_eq!(
        headers.get("accept").map(String::as_str),
        Some("application/vnd.pgrst.object+json")
    );
}

#[tokio::test]
async fn insert_returning_sends_representation_preference_and_row() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/rest/v1/alerts",
            post(
                |State(state): State<Captured>,
                 headers: HeaderMap,
                 Json(body): Json<serde_json::Value>| async move {
                    *state.headers.lock().expect("lock") = Some(snapshot_headers(&headers));
                    *state.body.lock().expect("lock") = Some(body);
                    Json(json!({ "inserted": true }))
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    let row: serde_json::Value = client
        .from("alerts")
        .insert_returning(&json!({ "title": "Congestion" }))
        .await
        .expect("insert");

    assert_eq!(row, json!({ "inserted": true }));
    let headers = captured.headers.lock().expect("lock").clone().expect("captured");
    assert_eq!(
        headers.get("prefer").map(String::as_str),
        Some("return=representation")
    );
    let body = captured.body.lock().expect("lock").clone().expect("captured");
    assert_eq!(body, json!({ "title": "Congestion" }));
}

#[tokio::test]
async fn update_applies_filters_and_asks_for_minimal_return() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/rest/v1/cameras",
            patch(
                |State(state): State<Captured>,
                 Query(params): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 Json(body): Json<serde_json::Value>| async move {
                    *state.params.lock().expect("lock") = Some(params);
                    *state.headers.lock().expect("lock") = Some(snapshot_headers(&headers));
                    *state.body.lock().expect("lock") = Some(body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    client
        .from("cameras")
        .eq("junction_id", "j-1")
        .eq("camera_index", 2)
        .update(&json!({ "is_active": true }))
        .await
        .expect("update");

    let params = captured.params.lock().expect("lock").clone().expect("captured");
    assert_eq!(params.get("junction_id").map(String::as_str), Some("eq.j-1"));
    assert_eq!(params.get("camera_index").map(String::as_str), Some("eq.2"));
    let headers = captured.headers.lock().expect("lock").clone().expect("captured");
    assert_eq!(headers.get("prefer").map(String::as_str), Some("return=minimal"));
}

#[tokio::test]
async fn upload_sets_upsert_and_content_type() {
    let captured = Captured::default();
    let state = captured.clone();
    let app = Router::new()
        .route(
            "/storage/v1/object/avatars/*path",
            post(
                |State(state): State<Captured>,
                 Path(path): Path<String>,
                 headers: HeaderMap,
                 body: axum::body::Bytes| async move {
                    *state.path.lock().expect("lock") = Some(path);
                    *state.headers.lock().expect("lock") = Some(snapshot_headers(&headers));
                    *state.raw_body.lock().expect("lock") = Some(body.to_vec());
                    Json(json!({ "Key": "avatars/u.png" }))
                },
            ),
        )
        .with_state(state);
    let base_url = spawn_router(app).await;

    let client = RemoteClient::new(&base_url, "anon-key");
    client
        .storage_from("avatars")
        .upload("avatars/u-55.png", b"png-bytes".to_vec(), Some("image/png"), true)
        .await
        .expect("upload");

    let path = captured.path.lock().expect("lock").clone().expect("captured");
    assert_eq!(path, "avatars/u-55.png");
    let headers = captured.headers.lock().expect("lock").clone().expect("captured");
    assert_eq!(headers.get("x-upsert").map(String::as_str), Some("true"));
    assert_eq!(headers.get("content-type").map(String::as_str), Some("image/png"));
    let body = captured.raw_body.lock().expect("lock").clone().expect("captured");
    assert_eq!(body, b"png-bytes".to_vec());

    assert_eq!(
        client.storage_from("avatars").public_url("avatars/u-55.png"),
        format!("{base_url}/storage/v1/object/public/avatars/avatars/u-55.png")
    );
}
