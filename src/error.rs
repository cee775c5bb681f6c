//! Unified error model for the session core.
//! One enum spans the identity gateway, token store and session manager so
//! callers can branch on the taxonomy without string matching.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    /// Bad username/password on an explicit login. No state change.
    InvalidCredentials { message: String },
    /// Requested role is not in the caller's available set. No state change.
    RoleNotAvailable { message: String },
    /// Refresh token expired or revoked; forces a full local logout.
    RefreshInvalid { message: String },
    /// Access token rejected outside the refresh path (bootstrap reconciliation).
    Unauthorized { message: String },
    /// Transport-level failure reaching the identity backend.
    Network { message: String },
    /// Token store persistence failure.
    Storage { message: String },
    Internal { message: String },
}

impl AuthError {
    pub fn message(&self) -> &str {
        match self {
            AuthError::InvalidCredentials { message }
            | AuthError::RoleNotAvailable { message }
            | AuthError::RefreshInvalid { message }
            | AuthError::Unauthorized { message }
            | AuthError::Network { message }
            | AuthError::Storage { message }
            | AuthError::Internal { message } => message.as_str(),
        }
    }

    pub fn invalid_credentials<S: Into<String>>(msg: S) -> Self {
        AuthError::InvalidCredentials { message: msg.into() }
    }
    pub fn role_not_available<S: Into<String>>(msg: S) -> Self {
        AuthError::RoleNotAvailable { message: msg.into() }
    }
    pub fn refresh_invalid<S: Into<String>>(msg: S) -> Self {
        AuthError::RefreshInvalid { message: msg.into() }
    }
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        AuthError::Unauthorized { message: msg.into() }
    }
    pub fn network<S: Into<String>>(msg: S) -> Self {
        AuthError::Network { message: msg.into() }
    }
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        AuthError::Storage { message: msg.into() }
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AuthError::Internal { message: msg.into() }
    }

    /// Representative HTTP status for each taxonomy member.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials { .. } => 401,
            AuthError::RoleNotAvailable { .. } => 403,
            AuthError::RefreshInvalid { .. } => 401,
            AuthError::Unauthorized { .. } => 401,
            AuthError::Network { .. } => 503,
            AuthError::Storage { .. } => 500,
            AuthError::Internal { .. } => 500,
        }
    }

    /// True for failures a caller may retry without side effects.
    /// Login and role switch issue tokens on the server, so their
    /// characteristic errors are excluded.
    pub fn retry_safe(&self) -> bool {
        matches!(self, AuthError::Network { .. } | AuthError::Storage { .. })
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            AuthError::InvalidCredentials { .. } => "invalid_credentials",
            AuthError::RoleNotAvailable { .. } => "role_not_available",
            AuthError::RefreshInvalid { .. } => "refresh_invalid",
            AuthError::Unauthorized { .. } => "unauthorized",
            AuthError::Network { .. } => "network",
            AuthError::Storage { .. } => "storage",
            AuthError::Internal { .. } => "internal",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal { message: err.to_string() }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AuthError::invalid_credentials("bad password").http_status(), 401);
        assert_eq!(AuthError::role_not_available("not yours").http_status(), 403);
        assert_eq!(AuthError::refresh_invalid("revoked").http_status(), 401);
        assert_eq!(AuthError::unauthorized("expired").http_status(), 401);
        assert_eq!(AuthError::network("timeout").http_status(), 503);
        assert_eq!(AuthError::storage("disk").http_status(), 500);
        assert_eq!(AuthError::internal("bug").http_status(), 500);
    }

    #[test]
    fn retry_safety_excludes_token_issuing_failures() {
        assert!(AuthError::network("timeout").retry_safe());
        assert!(!AuthError::invalid_credentials("no").retry_safe());
        assert!(!AuthError::role_not_available("no").retry_safe());
        assert!(!AuthError::refresh_invalid("no").retry_safe());
    }

    #[test]
    fn display_carries_kind_and_message() {
        let e = AuthError::refresh_invalid("session expired");
        assert_eq!(e.to_string(), "refresh_invalid: session expired");
    }
}
