use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::principal::UserInfo;
use super::role::Role;

/// Everything the client persists across reloads: the token pair plus a
/// cached copy of identity for instant paint before reconciliation.
/// Role codes are kept as raw strings here; normalization happens on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
    #[serde(default)]
    pub current_role: Option<String>,
    #[serde(default)]
    pub available_roles: Vec<String>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Durable backing for the token store. The whole snapshot is written on
/// every save so a reader never observes a partially updated record.
pub trait StorageBackend: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>>;
    fn save(&self, snapshot: &StoredSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<Option<StoredSession>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<StoredSession>> {
        Ok(self.data.lock().clone())
    }
    fn save(&self, snapshot: &StoredSession) -> Result<()> {
        *self.data.lock() = Some(snapshot.clone());
        Ok(())
    }
    fn clear(&self) -> Result<()> {
        *self.data.lock() = None;
        Ok(())
    }
}

/// Single-JSON-document file backend. Writes go to a sibling temp file and
/// are renamed into place so the on-disk snapshot is always whole.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".tmp");
        PathBuf::from(p)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read session file {}", self.path.display()))?;
        let snap = serde_json::from_str(&raw)
            .with_context(|| format!("parse session file {}", self.path.display()))?;
        Ok(Some(snap))
    }

    fn save(&self, snapshot: &StoredSession) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let raw = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename into {}", self.path.display()))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }
}

/// Scoped, synchronous persistence for tokens and cached identity.
/// The in-memory snapshot is authoritative for reads; the backend mirrors it
/// so the session survives reloads. A backend write failure degrades the
/// store to cache-only with a warning, except `clear_all` which always
/// empties memory before touching the backend.
pub struct TokenStore {
    backend: Box<dyn StorageBackend>,
    snap: RwLock<Option<StoredSession>>,
}

impl TokenStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        let snap = match backend.load() {
            Ok(s) => s,
            Err(e) => {
                warn!("token store: unreadable snapshot, starting empty: {}", e);
                None
            }
        };
        Self { backend, snap: RwLock::new(snap) }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn on_disk<P: AsRef<Path>>(path: P) -> Self {
        Self::new(Box::new(FileBackend::new(path.as_ref())))
    }

    pub fn has_tokens(&self) -> bool {
        self.snap
            .read()
            .as_ref()
            .map(|s| !s.access_token.is_empty() && !s.refresh_token.is_empty())
            .unwrap_or(false)
    }

    pub fn get_access_token(&self) -> Option<String> {
        self.snap
            .read()
            .as_ref()
            .filter(|s| !s.access_token.is_empty())
            .map(|s| s.access_token.clone())
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.snap
            .read()
            .as_ref()
            .filter(|s| !s.refresh_token.is_empty())
            .map(|s| s.refresh_token.clone())
    }

    pub fn set_tokens(&self, access: &str, refresh: &str) {
        self.mutate(|s| {
            s.access_token = access.to_string();
            s.refresh_token = refresh.to_string();
        });
    }

    /// Silent refresh: the access token is replaced, the refresh token and
    /// cached identity stay as they are.
    pub fn replace_access_token(&self, access: &str) {
        self.mutate(|s| s.access_token = access.to_string());
    }

    pub fn set_user_info(&self, user: &UserInfo) {
        self.mutate(|s| s.user = Some(user.clone()));
    }

    pub fn user_info(&self) -> Option<UserInfo> {
        self.snap.read().as_ref().and_then(|s| s.user.clone())
    }

    pub fn set_current_role(&self, role: Role) {
        self.mutate(|s| s.current_role = Some(role.code().to_string()));
    }

    pub fn current_role(&self) -> Option<Role> {
        self.snap
            .read()
            .as_ref()
            .and_then(|s| s.current_role.as_deref())
            .map(Role::normalize)
    }

    pub fn set_available_roles(&self, roles: &[Role]) {
        self.mutate(|s| {
            s.available_roles = roles.iter().map(|r| r.code().to_string()).collect();
        });
    }

    pub fn available_roles(&self) -> Vec<Role> {
        self.snap
            .read()
            .as_ref()
            .map(|s| Role::normalize_set(&s.available_roles))
            .unwrap_or_default()
    }

    /// Install a complete authentication result in one write: token pair and
    /// cached identity land together, so a crash between keys cannot leave a
    /// half-updated snapshot.
    pub fn install(
        &self,
        access: &str,
        refresh: &str,
        user: &UserInfo,
        current_role: Role,
        available_roles: &[Role],
    ) {
        self.mutate(|s| {
            s.access_token = access.to_string();
            s.refresh_token = refresh.to_string();
            s.user = Some(user.clone());
            s.current_role = Some(current_role.code().to_string());
            s.available_roles = available_roles.iter().map(|r| r.code().to_string()).collect();
        });
    }

    /// Remove every key as one operation: the in-memory snapshot is dropped
    /// under the write lock before the backend is touched, so no reader can
    /// observe a partial clear.
    pub fn clear_all(&self) {
        *self.snap.write() = None;
        if let Err(e) = self.backend.clear() {
            warn!("token store: backend clear failed: {}", e);
        }
    }

    fn mutate<F: FnOnce(&mut StoredSession)>(&self, f: F) {
        let mut guard = self.snap.write();
        let snap = guard.get_or_insert_with(StoredSession::default);
        f(snap);
        snap.saved_at = Some(Utc::now());
        if let Err(e) = self.backend.save(snap) {
            warn!("token store: persist failed, session is cache-only: {}", e);
        }
    }
}
