//! Portal user accounts
//!
//! Users are owned by the authentication subsystem; everything else
//! references them by id. The admin flag is mutable only by other admins.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A portal account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Account id
    pub id: Uuid,

    /// Login email, unique
    pub email: String,

    /// Whether this account may perform administrative actions
    pub is_admin: bool,

    /// External OAuth identity link, if registered via GitLab
    pub gitlab_id: Option<String>,

    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

impl User {
    /// Create a new non-admin user
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            is_admin: false,
            gitlab_id: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Mark the user as an administrator
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Link an external OAuth identity
    pub fn with_gitlab_id(mut self, gitlab_id: impl Into<String>) -> Self {
        self.gitlab_id = Some(gitlab_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("alice@example.com");
        assert!(!user.is_admin);
        assert!(user.gitlab_id.is_none());
        assert_eq!(user.email, "alice@example.com");
    }
}
