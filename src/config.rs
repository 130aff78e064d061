//! Session configuration with environment overrides.

/// How discovered HID report characteristics are mapped to roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleAssignment {
    /// Tag by Report Reference when every report carries one, else by order.
    #[default]
    Auto,
    /// First report = motion, second = compass, third = feature.
    Positional,
    /// Only reports with a recognised Report Reference get a role.
    Tagged,
}

/// Tunables for a [`crate::GloveSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub role_assignment: RoleAssignment,
    /// Capacity of the consumer event channel.
    pub event_capacity: usize,
    /// Subscribe to notifying reports after discovery.
    pub subscribe_notifications: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role_assignment: RoleAssignment::Auto,
            event_capacity: 256,
            subscribe_notifications: true,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `GLOVE_ROLE_ASSIGNMENT` (auto|positional|tagged),
    /// `GLOVE_EVENT_CAPACITY` and `GLOVE_SUBSCRIBE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let role_assignment = match read_env_string("GLOVE_ROLE_ASSIGNMENT", "auto").as_str() {
            "auto" => RoleAssignment::Auto,
            "positional" => RoleAssignment::Positional,
            "tagged" => RoleAssignment::Tagged,
            other => {
                log::warn!(
                    "Unknown GLOVE_ROLE_ASSIGNMENT='{}', using auto (supported: auto|positional|tagged)",
                    other
                );
                defaults.role_assignment
            }
        };

        Self {
            role_assignment,
            event_capacity: read_env_usize("GLOVE_EVENT_CAPACITY", defaults.event_capacity).max(1),
            subscribe_notifications: read_env_bool(
                "GLOVE_SUBSCRIBE",
                defaults.subscribe_notifications,
            ),
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
