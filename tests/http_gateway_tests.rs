//! HTTP identity gateway tests against a stub axum server: bearer
//! attachment, the single refresh-then-retry on 401, and the dead-refresh
//! path that forces a full local logout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use mentora::error::AuthError;
use mentora::identity::{HttpIdentityGateway, IdentityGateway, Role, SessionManager, TokenStore};

fn init_logs() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

struct StubState {
    /// The one access token the API currently accepts.
    valid_access: Mutex<String>,
    /// The one refresh token that can mint a new access token.
    valid_refresh: String,
    /// Access token issued by a successful refresh.
    rotate_to: String,
    me_hits: AtomicUsize,
    refresh_hits: AtomicUsize,
}

impl StubState {
    fn new(valid_access: &str, valid_refresh: &str, rotate_to: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(valid_access.to_string()),
            valid_refresh: valid_refresh.to_string(),
            rotate_to: rotate_to.to_string(),
            me_hits: AtomicUsize::new(0),
            refresh_hits: AtomicUsize::new(0),
        })
    }
}

fn bearer_ok(state: &StubState, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", state.valid_access.lock());
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

fn identity_body() -> Value {
    json!({
        "user": {"id": 11, "username": "galina", "displayName": "Galina P."},
        "currentRole": "MENTOR",
        "availableRoles": ["STUDENT", "MENTOR"]
    })
}

async fn me(State(state): State<Arc<StubState>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    state.me_hits.fetch_add(1, Ordering::SeqCst);
    if bearer_ok(&state, &headers) {
        (StatusCode::OK, Json(identity_body()))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "access token expired"})))
    }
}

async fn refresh(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.refresh_hits.fetch_add(1, Ordering::SeqCst);
    if body.get("refreshToken").and_then(|v| v.as_str()) == Some(state.valid_refresh.as_str()) {
        *state.valid_access.lock() = state.rotate_to.clone();
        (StatusCode::OK, Json(json!({"accessToken": state.rotate_to})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "refresh token revoked"})))
    }
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let username = body.get("username").and_then(|v| v.as_str()).unwrap_or("");
    let password = body.get("password").and_then(|v| v.as_str()).unwrap_or("");
    if username == "galina" && password == "s3cr3t!" {
        (
            StatusCode::OK,
            Json(json!({
                "accessToken": "acc-login",
                "refreshToken": "ref-login",
                "user": {"id": 11, "username": "galina", "displayName": "Galina P."},
                // Legacy spellings still served by older backend rows.
                "currentRole": "ROLE_MENTOR",
                "availableRoles": ["ROLE_STUDENT", "ROLE_MENTOR"]
            })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "invalid username or password"})))
    }
}

async fn switch_role(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !bearer_ok(&state, &headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "access token expired"})));
    }
    match body.get("role").and_then(|v| v.as_str()) {
        Some("STUDENT") => (
            StatusCode::OK,
            Json(json!({
                "accessToken": "acc-student",
                "refreshToken": "ref-student",
                "user": {"id": 11, "username": "galina", "displayName": "Galina P."},
                "currentRole": "STUDENT",
                "availableRoles": ["STUDENT", "MENTOR"]
            })),
        ),
        _ => (StatusCode::FORBIDDEN, Json(json!({"message": "role not available"}))),
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn spawn_stub(state: Arc<StubState>) -> String {
    init_logs();
    let app = Router::new()
        .route("/api/users/me", get(me))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/switch-role", post(switch_role))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn login_normalizes_legacy_wire_roles() {
    let base = spawn_stub(StubState::new("unused", "unused", "unused")).await;
    let store = Arc::new(TokenStore::in_memory());
    let gateway = HttpIdentityGateway::new(&base, store).unwrap();

    let payload = gateway.login("galina", "s3cr3t!").await.expect("login should succeed");
    assert_eq!(payload.current_role, Role::Mentor);
    assert_eq!(payload.available_roles, vec![Role::Student, Role::Mentor]);
    assert_eq!(payload.access_token, "acc-login");
}

#[tokio::test]
async fn invalid_credentials_carry_the_server_message() {
    let base = spawn_stub(StubState::new("unused", "unused", "unused")).await;
    let store = Arc::new(TokenStore::in_memory());
    let gateway = HttpIdentityGateway::new(&base, store).unwrap();

    let err = gateway.login("galina", "wrong").await.expect_err("must fail");
    match err {
        AuthError::InvalidCredentials { message } => {
            assert_eq!(message, "invalid username or password");
        }
        other => panic!("expected InvalidCredentials, got {:?}", other),
    }
}

#[tokio::test]
async fn valid_bearer_passes_without_touching_refresh() {
    let stub = StubState::new("acc-1", "ref-1", "acc-2");
    let base = spawn_stub(stub.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    store.set_tokens("acc-1", "ref-1");
    let gateway = HttpIdentityGateway::new(&base, store).unwrap();

    let identity = gateway.fetch_current_user().await.expect("should succeed");
    assert_eq!(identity.current_role, Role::Mentor);
    assert_eq!(stub.me_hits.load(Ordering::SeqCst), 1);
    assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_access_token_refreshes_once_and_retries_once() {
    let stub = StubState::new("acc-1", "ref-1", "acc-2");
    let base = spawn_stub(stub.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    // Stale access token, live refresh token.
    store.set_tokens("acc-stale", "ref-1");
    let gateway = HttpIdentityGateway::new(&base, store.clone()).unwrap();

    let identity = gateway.fetch_current_user().await.expect("refresh-retry should recover");
    assert_eq!(identity.current_role, Role::Mentor);
    assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 1, "exactly one refresh");
    assert_eq!(stub.me_hits.load(Ordering::SeqCst), 2, "original call retried once");
    assert_eq!(store.get_access_token().as_deref(), Some("acc-2"), "silent replacement");
    assert_eq!(store.get_refresh_token().as_deref(), Some("ref-1"), "refresh token kept");
}

#[tokio::test]
async fn dead_refresh_token_forces_full_local_logout() {
    let stub = StubState::new("acc-1", "ref-1", "acc-2");
    let base = spawn_stub(stub.clone()).await;
    let store = Arc::new(TokenStore::in_memory());
    store.set_tokens("acc-stale", "ref-revoked");
    let gateway = Arc::new(HttpIdentityGateway::new(&base, store.clone()).unwrap());

    // Wire the expired hook into the session manager's local logout path.
    let manager = Arc::new(SessionManager::new(gateway.clone(), store.clone()));
    {
        let manager = manager.clone();
        gateway.on_session_expired(move || manager.force_logout());
    }

    let err = gateway.fetch_current_user().await.expect_err("dead refresh must surface");
    assert!(matches!(err, AuthError::RefreshInvalid { .. }), "got {:?}", err);
    assert_eq!(stub.refresh_hits.load(Ordering::SeqCst), 1);
    assert_eq!(stub.me_hits.load(Ordering::SeqCst), 1, "no blind retry after failed refresh");
    assert!(!store.has_tokens(), "hook cleared the store");
    assert!(!manager.state().is_authenticated());
}

#[tokio::test]
async fn switch_role_refusal_maps_to_role_not_available() {
    let stub = StubState::new("acc-1", "ref-1", "acc-2");
    let base = spawn_stub(stub).await;
    let store = Arc::new(TokenStore::in_memory());
    store.set_tokens("acc-1", "ref-1");
    let gateway = HttpIdentityGateway::new(&base, store).unwrap();

    let err = gateway.switch_role(Role::Admin).await.expect_err("stub refuses ADMIN");
    assert!(matches!(err, AuthError::RoleNotAvailable { .. }), "got {:?}", err);

    let payload = gateway.switch_role(Role::Student).await.expect("stub allows STUDENT");
    assert_eq!(payload.current_role, Role::Student);
    assert_eq!(payload.access_token, "acc-student");
}
