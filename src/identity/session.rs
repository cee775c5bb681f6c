use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{AuthError, AuthResult};
use crate::tprintln;

use super::gateway::{AuthPayload, IdentityGateway};
use super::principal::UserInfo;
use super::role::Role;
use super::token_store::TokenStore;

/// In-memory session snapshot published to views. All mutation goes through
/// the session manager's named operations; views subscribe, they never write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserInfo>,
    pub current_role: Option<Role>,
    pub available_roles: Vec<Role>,
    /// True once the first boot reconciliation has resolved, success or not.
    /// Monotonic; guards route decisions against premature redirects.
    pub initialized: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.current_role.is_some()
    }

    fn signed_out(initialized: bool) -> Self {
        SessionState { initialized, ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Owns session state and its transitions. Public operations are serialized
/// by an operation gate; an epoch counter invalidates results of operations
/// that were superseded while awaiting the network, so a stale response can
/// never resurrect a cleared session.
pub struct SessionManager {
    gateway: Arc<dyn IdentityGateway>,
    store: Arc<TokenStore>,
    state_tx: watch::Sender<SessionState>,
    op_gate: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn IdentityGateway>, store: Arc<TokenStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            gateway,
            store,
            state_tx,
            op_gate: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current snapshot. Cheap clone; views that need change notification
    /// should use [`SessionManager::subscribe`] instead of polling.
    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// One-time reconciliation of persisted tokens against the server.
    /// Absorbs every failure into "signed out": an expired session at page
    /// load is expected, not exceptional. Calling again after the first
    /// resolution is a no-op.
    pub async fn bootstrap(&self) {
        let _gate = self.op_gate.lock().await;
        if self.state().initialized {
            return;
        }
        self.reconcile_locked().await;
    }

    /// Re-run the server reconciliation on an already-initialized session,
    /// e.g. after a revoked-token signal. Same absorption semantics as
    /// `bootstrap`.
    pub async fn reconcile(&self) {
        let _gate = self.op_gate.lock().await;
        self.reconcile_locked().await;
    }

    async fn reconcile_locked(&self) {
        if !self.store.has_tokens() {
            tprintln!("session.bootstrap no stored tokens");
            self.commit(|s| *s = SessionState::signed_out(true));
            return;
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        match self.gateway.fetch_current_user().await {
            Ok(identity) => {
                if self.superseded(epoch) {
                    // A force_logout landed while we were in flight; do not
                    // resurrect the cleared session, just resolve boot.
                    self.commit(|s| s.initialized = true);
                    return;
                }
                tprintln!(
                    "session.bootstrap user={} role={}",
                    identity.user.username,
                    identity.current_role
                );
                // Cached values are for paint only; authorization state always
                // comes from the server response.
                self.store.set_user_info(&identity.user);
                self.store.set_current_role(identity.current_role);
                self.store.set_available_roles(&identity.available_roles);
                self.commit(|s| {
                    s.user = Some(identity.user.clone());
                    s.current_role = Some(identity.current_role);
                    s.available_roles = identity.available_roles.clone();
                    s.initialized = true;
                });
            }
            Err(e) => {
                tprintln!("session.bootstrap rejected: {}", e);
                if !self.superseded(epoch) {
                    self.store.clear_all();
                }
                self.commit(|s| *s = SessionState::signed_out(true));
            }
        }
    }

    /// Explicit sign-in. On success tokens and identity are committed as one
    /// transition; on failure state is untouched and the error surfaces for
    /// display. Callers must not auto-retry: a bad password is not transient.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult<SessionState> {
        let _gate = self.op_gate.lock().await;
        let payload = self
            .gateway
            .login(&credentials.username, &credentials.password)
            .await?;
        tprintln!(
            "session.login user={} role={} available={:?}",
            payload.user.username,
            payload.current_role,
            payload.available_roles
        );
        self.apply_auth_payload(&payload);
        Ok(self.state())
    }

    /// Sign out. The server call is best-effort; local state is cleared
    /// unconditionally so the user can always leave an unreachable or
    /// compromised session.
    pub async fn logout(&self) {
        let _gate = self.op_gate.lock().await;
        let refresh_token = self.store.get_refresh_token();
        if let Err(e) = self.gateway.logout(refresh_token.as_deref()).await {
            tprintln!("session.logout server call failed (ignored): {}", e);
        }
        self.store.clear_all();
        let initialized = self.state().initialized;
        self.commit(move |s| *s = SessionState::signed_out(initialized));
        tprintln!("session.logout cleared");
    }

    /// Change the acting role. The server is the authority and issues a new
    /// token pair scoped to the target role; the old access token must not
    /// be used past this point. On failure state is unchanged and the caller
    /// must not navigate.
    pub async fn switch_role(&self, target: Role) -> AuthResult<SessionState> {
        let _gate = self.op_gate.lock().await;
        let current = self.state();
        if !current.is_authenticated() {
            return Err(AuthError::unauthorized("no active session"));
        }
        if !current.available_roles.contains(&target) {
            return Err(AuthError::role_not_available(format!(
                "role {} is not available to this account",
                target
            )));
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let payload = self.gateway.switch_role(target).await?;
        if self.superseded(epoch) {
            return Err(AuthError::internal("session changed while switching roles"));
        }
        tprintln!(
            "session.switch_role user={} role={}",
            payload.user.username,
            payload.current_role
        );
        self.apply_auth_payload(&payload);
        Ok(self.state())
    }

    /// Local-only clear, used by the gateway's session-expired hook when the
    /// refresh token is rejected. Synchronous: no server call can help a
    /// session whose refresh token is already dead. Bumps the epoch so any
    /// in-flight operation discards its result.
    pub fn force_logout(&self) {
        self.store.clear_all();
        let initialized = self.state().initialized;
        self.commit(move |s| *s = SessionState::signed_out(initialized));
        tprintln!("session.force_logout");
    }

    fn apply_auth_payload(&self, payload: &AuthPayload) {
        self.store.install(
            &payload.access_token,
            &payload.refresh_token,
            &payload.user,
            payload.current_role,
            &payload.available_roles,
        );
        self.commit(|s| {
            s.user = Some(payload.user.clone());
            s.current_role = Some(payload.current_role);
            s.available_roles = payload.available_roles.clone();
            s.initialized = true;
        });
    }

    fn commit<F: FnOnce(&mut SessionState)>(&self, f: F) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_modify(f);
    }

    fn superseded(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }
}
