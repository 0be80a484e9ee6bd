//! Collaborator identity as reported by the realtime backend.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The user behind a session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// The profile used by sessions that have not authenticated.
    pub fn anonymous() -> Self {
        Self::new("anonymous", "Anonymous")
    }
}

/// One collaborator session on a shared document.
///
/// A user editing the same document from two places shows up as two
/// collaborators with the same `user_id` and different `session_id`s.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Collaborator {
    pub user_id: String,
    pub session_id: String,
    pub display_name: String,
    pub color: String,
    pub short_name: String,
}

impl Collaborator {
    /// Open a new session for a user.
    pub fn for_session(profile: &UserProfile) -> Self {
        Self::with_session_id(profile, Ulid::new().to_string())
    }

    /// Describe a session with a known id.
    pub fn with_session_id(profile: &UserProfile, session_id: impl Into<String>) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            session_id: session_id.into(),
            display_name: profile.display_name.clone(),
            color: CollaboratorColors::color_for_user(&profile.user_id).to_string(),
            short_name: short_name(&profile.display_name),
        }
    }
}

/// Events about the set of sessions attached to a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollaboratorEvent {
    Joined(Collaborator),
    Left(Collaborator),
}

/// Initials of a display name, e.g. `"Ada Lovelace"` -> `"AL"`.
pub fn short_name(display_name: &str) -> String {
    let initials: String = display_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();
    if initials.is_empty() {
        "?".to_string()
    } else {
        initials
    }
}

/// Color palette for collaborator highlights.
pub struct CollaboratorColors;

impl CollaboratorColors {
    pub const COLORS: [&'static str; 12] = [
        "#E91E63", // Pink
        "#9C27B0", // Purple
        "#3F51B5", // Indigo
        "#2196F3", // Blue
        "#00BCD4", // Cyan
        "#009688", // Teal
        "#4CAF50", // Green
        "#8BC34A", // Light Green
        "#CDDC39", // Lime
        "#FF9800", // Orange
        "#FF5722", // Deep Orange
        "#795548", // Brown
    ];

    /// A stable color for a user id.
    pub fn color_for_user(user_id: &str) -> &'static str {
        let hash: usize = user_id.bytes().map(|b| b as usize).sum();
        Self::COLORS[hash % Self::COLORS.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("Ada Lovelace"), "AL");
        assert_eq!(short_name("grace"), "G");
        assert_eq!(short_name("   "), "?");
    }

    #[test]
    fn test_sessions_are_distinct() {
        let profile = UserProfile::new("u1", "Alice Smith");
        let a = Collaborator::for_session(&profile);
        let b = Collaborator::for_session(&profile);

        assert_eq!(a.user_id, b.user_id);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.color, b.color);
        assert_eq!(a.short_name, "AS");
    }

    #[test]
    fn test_color_assignment() {
        let color = CollaboratorColors::color_for_user("alice");
        assert!(CollaboratorColors::COLORS.contains(&color));
        assert_eq!(color, CollaboratorColors::color_for_user("alice"));
    }
}
