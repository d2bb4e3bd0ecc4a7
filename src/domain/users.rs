//! Authenticated callers and their account state.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// Account state. Only `Active` accounts may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Pending,
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Suspended => "suspended",
        }
    }
}

impl Display for UserStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Owner filter applied to reads and writes; admins see every row.
    pub fn owner_scope(&self) -> Option<Uuid> {
        if self.is_admin() {
            None
        } else {
            Some(self.user_id)
        }
    }

    /// Identity folded into response-cache keys. Admins read unscoped rows, so
    /// they share one scope.
    pub fn cache_scope(&self) -> String {
        match self.owner_scope() {
            None => "admin".to_string(),
            Some(user_id) => format!("user:{user_id}"),
        }
    }
}

/// A stored login session joined with its user.
#[derive(Debug, Clone)]
pub struct UserSessionRecord {
    pub id: Uuid,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
}

impl UserSessionRecord {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            email: self.email.clone(),
            role: self.role,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: UserRole, status: UserStatus) -> Principal {
        Principal {
            user_id: Uuid::nil(),
            email: "agent@example.com".to_string(),
            role,
            status,
        }
    }

    #[test]
    fn admins_are_unscoped() {
        assert_eq!(
            principal(UserRole::Admin, UserStatus::Active).owner_scope(),
            None
        );
        assert_eq!(
            principal(UserRole::User, UserStatus::Active).owner_scope(),
            Some(Uuid::nil())
        );
    }

    #[test]
    fn cache_scope_follows_row_visibility() {
        assert_eq!(
            principal(UserRole::Admin, UserStatus::Active).cache_scope(),
            "admin"
        );
        assert_eq!(
            principal(UserRole::User, UserStatus::Active).cache_scope(),
            format!("user:{}", Uuid::nil())
        );
    }

    #[test]
    fn only_active_accounts_are_active() {
        assert!(principal(UserRole::User, UserStatus::Active).is_active());
        assert!(!principal(UserRole::User, UserStatus::Pending).is_active());
        assert!(!principal(UserRole::Admin, UserStatus::Suspended).is_active());
    }
}
