use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical acting-capacity of an authenticated user. External data (wire
/// responses, persisted snapshots) carries role codes as strings; everything
/// inside the core works on this enum, normalized once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl Role {
    pub fn code(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Mentor => "MENTOR",
            Role::Admin => "ADMIN",
        }
    }

    /// Parse a role code, accepting the legacy spellings still present in
    /// older rows of the backend (`ROLE_`-prefixed, mixed case).
    pub fn parse(code: &str) -> Option<Role> {
        let canon = code.trim().to_ascii_uppercase();
        let canon = canon.strip_prefix("ROLE_").unwrap_or(&canon);
        match canon {
            "STUDENT" => Some(Role::Student),
            "MENTOR" | "TUTOR" => Some(Role::Mentor),
            "ADMIN" | "ADMINISTRATOR" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Parse with a lowest-privilege fallback: an unrecognized code from
    /// stale persisted state degrades to Student instead of breaking
    /// navigation.
    pub fn normalize(code: &str) -> Role {
        Role::parse(code).unwrap_or(Role::Student)
    }

    /// Normalize a list of raw codes into an ordered, deduplicated role set.
    /// Unrecognized entries are dropped rather than widened to Student so a
    /// corrupt list cannot grant a role the server never issued.
    pub fn normalize_set(codes: &[String]) -> Vec<Role> {
        let mut out: Vec<Role> = Vec::with_capacity(codes.len());
        for code in codes {
            if let Some(r) = Role::parse(code) {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        }
        out
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_legacy_codes() {
        assert_eq!(Role::parse("STUDENT"), Some(Role::Student));
        assert_eq!(Role::parse("mentor"), Some(Role::Mentor));
        assert_eq!(Role::parse("ROLE_ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("role_tutor"), Some(Role::Mentor));
        assert_eq!(Role::parse(" Administrator "), Some(Role::Admin));
        assert_eq!(Role::parse("SUPERUSER"), None);
    }

    #[test]
    fn normalize_falls_back_to_lowest_privilege() {
        assert_eq!(Role::normalize("GHOST"), Role::Student);
        assert_eq!(Role::normalize("ADMIN"), Role::Admin);
    }

    #[test]
    fn normalize_set_dedups_and_preserves_order() {
        let raw = vec![
            "MENTOR".to_string(),
            "ROLE_STUDENT".to_string(),
            "mentor".to_string(),
            "UNKNOWN".to_string(),
        ];
        assert_eq!(Role::normalize_set(&raw), vec![Role::Mentor, Role::Student]);
    }

    #[test]
    fn serde_round_trips_screaming_snake() {
        let j = serde_json::to_string(&Role::Mentor).unwrap();
        assert_eq!(j, "\"MENTOR\"");
        let r: Role = serde_json::from_str("\"ADMIN\"").unwrap();
        assert_eq!(r, Role::Admin);
    }
}
