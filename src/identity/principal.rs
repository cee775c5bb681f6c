use serde::{Deserialize, Serialize};

/// Identity record for the signed-in user, as returned by the backend and
/// cached in the token store for instant paint before reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub display_name: String,
}
