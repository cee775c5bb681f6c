//! Session and access-control core: who the caller is, which role they are
//! acting as, and how every route decision derives from that.
//! Keep the public surface thin and split implementation across sub-modules.

mod role;
mod principal;
mod token_store;
mod gateway;
mod session;
mod policy;
mod guard;
mod switcher;

pub use role::Role;
pub use principal::UserInfo;
pub use token_store::{FileBackend, MemoryBackend, StorageBackend, StoredSession, TokenStore};
pub use gateway::{
    AuthPayload, HttpIdentityGateway, IdentityPayload, IdentityGateway, RefreshedToken,
};
pub use session::{Credentials, SessionManager, SessionState};
pub use policy::{default_route_for, is_route_allowed, menu_for, MenuItem};
pub use guard::{evaluate_route, login_route_with_next, RouteDecision, LOGIN_ROUTE};
pub use switcher::{switch_role_and_navigate, Navigator};
