use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

use super::principal::UserInfo;
use super::role::Role;
use super::token_store::TokenStore;

/// Full authentication payload: a fresh token pair plus the identity it is
/// scoped to. Returned by login and by role switch (switching roles issues a
/// new pair scoped to the new role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
    pub current_role: Role,
    pub available_roles: Vec<Role>,
}

/// Identity without tokens, as returned by the current-user endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPayload {
    pub user: UserInfo,
    pub current_role: Role,
    pub available_roles: Vec<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
}

/// The five network operations the session core depends on. Implementations
/// own bearer attachment and the transparent refresh-on-401 retry; the
/// session manager never sees that mechanism.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> AuthResult<AuthPayload>;
    /// Best-effort; callers swallow any failure.
    async fn logout(&self, refresh_token: Option<&str>) -> AuthResult<()>;
    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedToken>;
    async fn switch_role(&self, role: Role) -> AuthResult<AuthPayload>;
    async fn fetch_current_user(&self) -> AuthResult<IdentityPayload>;
}

// --- wire DTOs (camelCase JSON, roles as raw strings) ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: i64,
    username: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthDto {
    access_token: String,
    refresh_token: String,
    user: UserDto,
    current_role: String,
    #[serde(default)]
    available_roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDto {
    user: UserDto,
    current_role: String,
    #[serde(default)]
    available_roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshDto {
    access_token: String,
}

impl From<UserDto> for UserInfo {
    fn from(d: UserDto) -> Self {
        UserInfo { id: d.id, username: d.username, display_name: d.display_name }
    }
}

/// Normalize raw role codes at the boundary, preserving the invariant that
/// the current role is a member of the available set even when the two come
/// from inconsistent backend rows.
fn reconcile_roles(current_raw: &str, available_raw: &[String]) -> (Role, Vec<Role>) {
    let current = Role::normalize(current_raw);
    let mut available = Role::normalize_set(available_raw);
    if !available.contains(&current) {
        available.insert(0, current);
    }
    (current, available)
}

impl From<AuthDto> for AuthPayload {
    fn from(d: AuthDto) -> Self {
        let (current_role, available_roles) = reconcile_roles(&d.current_role, &d.available_roles);
        AuthPayload {
            access_token: d.access_token,
            refresh_token: d.refresh_token,
            user: d.user.into(),
            current_role,
            available_roles,
        }
    }
}

impl From<IdentityDto> for IdentityPayload {
    fn from(d: IdentityDto) -> Self {
        let (current_role, available_roles) = reconcile_roles(&d.current_role, &d.available_roles);
        IdentityPayload { user: d.user.into(), current_role, available_roles }
    }
}

/// REST identity gateway. Reads the access token from the shared store on
/// every request; a 401 triggers exactly one refresh-and-retry, and a dead
/// refresh token fires the session-expired hook before surfacing.
pub struct HttpIdentityGateway {
    base: Url,
    client: reqwest::Client,
    store: Arc<TokenStore>,
    expired_hook: RwLock<Option<Box<dyn Fn() + Send + Sync>>>,
    // Single-flights the refresh when several in-flight calls hit 401 at once.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl HttpIdentityGateway {
    pub fn new(base: &str, store: Arc<TokenStore>) -> AuthResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| AuthError::internal(format!("invalid base URL {}: {}", base, e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Self {
            base,
            client,
            store,
            expired_hook: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Register the hook invoked when the refresh token itself is rejected.
    /// Wired to `SessionManager::force_logout` so a dead session is cleared
    /// locally without coupling the gateway to the manager's API.
    pub fn on_session_expired<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.expired_hook.write() = Some(Box::new(hook));
    }

    fn fire_expired_hook(&self) {
        if let Some(hook) = self.expired_hook.read().as_ref() {
            hook();
        }
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AuthError::internal(format!("bad endpoint {}: {}", path, e)))
    }

    fn bearer_headers(&self) -> AuthResult<HeaderMap> {
        let token = self
            .store
            .get_access_token()
            .ok_or_else(|| AuthError::unauthorized("no access token in store"))?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AuthError::internal(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        let val: serde_json::Value = resp.json().await.unwrap_or(serde_json::json!({}));
        val.get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("HTTP {}", status))
    }

    /// Issue one authorized request. On 401 the token pair in the store is
    /// refreshed once and the request retried exactly once; a second 401
    /// surfaces to the caller.
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> AuthResult<reqwest::Response> {
        let url = self.endpoint(path)?;
        let first = self.issue(method.clone(), url.clone(), body.clone()).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }
        debug!("gateway: 401 on {}, attempting refresh", path);
        self.refresh_once().await?;
        self.issue(method, url, body).await
    }

    async fn issue(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> AuthResult<reqwest::Response> {
        let mut req = self.client.request(method, url).headers(self.bearer_headers()?);
        if let Some(b) = body {
            req = req.json(&b);
        }
        Ok(req.send().await?)
    }

    /// Refresh the access token through the store, single-flighted. If a
    /// concurrent caller already replaced the token while we waited for the
    /// gate, the new token is used as-is.
    async fn refresh_once(&self) -> AuthResult<()> {
        let stale = self.store.get_access_token();
        let _gate = self.refresh_gate.lock().await;
        if self.store.get_access_token() != stale {
            return Ok(());
        }
        let refresh_token = match self.store.get_refresh_token() {
            Some(t) => t,
            None => {
                self.fire_expired_hook();
                return Err(AuthError::refresh_invalid("no refresh token in store"));
            }
        };
        match self.refresh(&refresh_token).await {
            Ok(refreshed) => {
                self.store.replace_access_token(&refreshed.access_token);
                Ok(())
            }
            Err(e @ AuthError::RefreshInvalid { .. }) => {
                warn!("gateway: refresh token rejected, session is over");
                self.fire_expired_hook();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityGateway for HttpIdentityGateway {
    async fn login(&self, username: &str, password: &str) -> AuthResult<AuthPayload> {
        let url = self.endpoint("/api/auth/login")?;
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({"username": username, "password": password}))
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => {
                let dto: AuthDto = resp.json().await?;
                Ok(dto.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                Err(AuthError::invalid_credentials(Self::error_message(resp).await))
            }
            _ => Err(AuthError::internal(Self::error_message(resp).await)),
        }
    }

    async fn logout(&self, refresh_token: Option<&str>) -> AuthResult<()> {
        let url = self.endpoint("/api/auth/logout")?;
        let mut req = self
            .client
            .post(url)
            .json(&serde_json::json!({"refreshToken": refresh_token}));
        // Attach the bearer if present, but do not fail for its absence:
        // logout is best-effort by contract.
        if let Ok(headers) = self.bearer_headers() {
            req = req.headers(headers);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::internal(Self::error_message(resp).await))
        }
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedToken> {
        let url = self.endpoint("/api/auth/refresh")?;
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({"refreshToken": refresh_token}))
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => {
                let dto: RefreshDto = resp.json().await?;
                Ok(RefreshedToken { access_token: dto.access_token })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::refresh_invalid(Self::error_message(resp).await))
            }
            _ => Err(AuthError::internal(Self::error_message(resp).await)),
        }
    }

    async fn switch_role(&self, role: Role) -> AuthResult<AuthPayload> {
        let resp = self
            .send_authorized(
                Method::POST,
                "/api/auth/switch-role",
                Some(serde_json::json!({"role": role.code()})),
            )
            .await?;
        match resp.status() {
            s if s.is_success() => {
                let dto: AuthDto = resp.json().await?;
                Ok(dto.into())
            }
            StatusCode::FORBIDDEN | StatusCode::CONFLICT => {
                Err(AuthError::role_not_available(Self::error_message(resp).await))
            }
            _ => Err(AuthError::internal(Self::error_message(resp).await)),
        }
    }

    async fn fetch_current_user(&self) -> AuthResult<IdentityPayload> {
        let resp = self.send_authorized(Method::GET, "/api/users/me", None).await?;
        match resp.status() {
            s if s.is_success() => {
                let dto: IdentityDto = resp.json().await?;
                Ok(dto.into())
            }
            StatusCode::UNAUTHORIZED => {
                Err(AuthError::unauthorized(Self::error_message(resp).await))
            }
            _ => Err(AuthError::internal(Self::error_message(resp).await)),
        }
    }
}
