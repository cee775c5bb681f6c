use crate::error::AuthResult;

use super::policy::default_route_for;
use super::role::Role;
use super::session::SessionManager;

/// Navigation seam for the shell hosting the session core. One method; the
/// shell decides what "navigate" means (history push, full reload, ...).
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// User-initiated role change: mutate the session first, navigate second.
/// Navigating before the new token pair is installed would let the next
/// request run under the stale role, so the order here is load-bearing.
/// On failure the caller stays on the current page under the current role.
pub async fn switch_role_and_navigate(
    manager: &SessionManager,
    navigator: &dyn Navigator,
    target: Role,
) -> AuthResult<()> {
    let state = manager.switch_role(target).await?;
    let role = state.current_role.unwrap_or(target);
    navigator.navigate(default_route_for(role));
    Ok(())
}
