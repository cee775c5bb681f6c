use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::role::Role;

/// One navigation entry. Order inside a role's menu is deterministic and
/// meaningful for the UI, but carries no authorization weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub route: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
}

struct RolePolicy {
    menu: Vec<MenuItem>,
    default_route: &'static str,
    allowed_prefixes: &'static [&'static str],
}

const fn item(route: &'static str, label: &'static str, icon: &'static str) -> MenuItem {
    MenuItem { route, label, icon }
}

// Routes every authenticated role may visit regardless of menu.
const SHARED_PREFIXES: [&str; 2] = ["/profile", "/kb"];

static TABLE: Lazy<HashMap<Role, RolePolicy>> = Lazy::new(|| {
    let mut t = HashMap::new();
    t.insert(
        Role::Student,
        RolePolicy {
            menu: vec![
                item("/tasks", "My Tasks", "tasks"),
                item("/quizzes", "Quizzes", "quiz"),
                item("/results", "My Results", "chart"),
                item("/kb", "Knowledge Base", "book"),
            ],
            default_route: "/tasks",
            allowed_prefixes: &["/tasks", "/quizzes", "/quiz", "/results"],
        },
    );
    t.insert(
        Role::Mentor,
        RolePolicy {
            menu: vec![
                item("/review", "Grading", "check"),
                item("/manage/tasks", "Tasks", "tasks"),
                item("/manage/questions", "Questions", "question"),
                item("/manage/quizzes", "Quizzes", "quiz"),
                item("/kb", "Knowledge Base", "book"),
            ],
            default_route: "/review",
            allowed_prefixes: &["/review", "/manage"],
        },
    );
    t.insert(
        Role::Admin,
        RolePolicy {
            menu: vec![
                item("/users", "Users", "people"),
                item("/reports", "Reports", "chart"),
                item("/settings", "Settings", "gear"),
                item("/kb", "Knowledge Base", "book"),
            ],
            default_route: "/users",
            allowed_prefixes: &["/users", "/reports", "/settings"],
        },
    );
    t
});

fn policy(role: Role) -> &'static RolePolicy {
    // The table is total over Role; normalization upstream guarantees no
    // other values reach here.
    TABLE.get(&role).expect("role policy table is total")
}

/// Ordered menu for a role.
pub fn menu_for(role: Role) -> &'static [MenuItem] {
    &policy(role).menu
}

/// Landing route after login and after every role switch.
pub fn default_route_for(role: Role) -> &'static str {
    policy(role).default_route
}

/// Authoritative route predicate. Pure; consulted on every navigation, never
/// cached. Matching is per path segment, so `/tasks/5` falls under `/tasks`
/// but `/tasksx` does not. Query strings are ignored.
pub fn is_route_allowed(role: Role, route: &str) -> bool {
    let path = route.split(['?', '#']).next().unwrap_or(route);
    let matches = |prefix: &str| {
        path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
    };
    SHARED_PREFIXES.iter().copied().any(matches)
        || policy(role).allowed_prefixes.iter().copied().any(matches)
}
