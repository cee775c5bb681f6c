use super::policy::{default_route_for, is_route_allowed};
use super::session::SessionState;

pub const LOGIN_ROUTE: &str = "/login";

/// Outcome of the pre-render check for a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Caller may see the requested view.
    Render,
    /// Bootstrap has not resolved yet; render a neutral loading state and
    /// do not redirect anywhere.
    Loading,
    /// Unauthenticated; go to login, carrying the requested path so login
    /// can return the user there.
    RedirectToLogin { to: String },
    /// Authenticated but not permitted here; go to the role's safe default.
    Redirect { to: String },
}

/// Build the login route with the original path preserved as a query
/// parameter.
pub fn login_route_with_next(requested: &str) -> String {
    format!("{}?next={}", LOGIN_ROUTE, urlencoding::encode(requested))
}

/// Two-stage navigation decision, consulted before rendering any protected
/// view. Pure over the supplied snapshot; the policy table is consulted on
/// every call, never cached.
pub fn evaluate_route(state: &SessionState, path: &str) -> RouteDecision {
    if !state.initialized {
        // Redirecting during the reconciliation window would bounce an
        // authenticated user to the login screen.
        return RouteDecision::Loading;
    }
    if !state.is_authenticated() {
        return RouteDecision::RedirectToLogin { to: login_route_with_next(path) };
    }
    let role = match state.current_role {
        Some(r) => r,
        // Unreachable for a well-formed state, but degrade to login rather
        // than panic if an invariant was broken upstream.
        None => return RouteDecision::RedirectToLogin { to: login_route_with_next(path) },
    };
    if is_route_allowed(role, path) {
        return RouteDecision::Render;
    }
    let fallback = default_route_for(role);
    if fallback == path {
        // Loop guard: the computed destination is where we already are.
        return RouteDecision::Render;
    }
    RouteDecision::Redirect { to: fallback.to_string() }
}
