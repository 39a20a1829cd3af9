//! User model for nimbus.

use std::fmt;
use std::str::FromStr;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Regular storage user.
    #[default]
    User,
    /// Administrator.
    Admin,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A registered user together with its quota ledger entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Login username (unique, case-insensitive).
    pub username: String,
    /// Opaque credential (hash); verified by the login collaborator.
    pub credential: String,
    /// User role.
    #[sqlx(try_from = "String")]
    pub role: Role,
    /// Storage quota in bytes.
    pub quota_bytes: i64,
    /// Bytes currently reserved or stored.
    pub used_bytes: i64,
    /// Account creation timestamp.
    pub created_at: String,
}

impl User {
    /// Check if this user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Bytes still available for new reservations.
    pub fn remaining_bytes(&self) -> i64 {
        (self.quota_bytes - self.used_bytes).max(0)
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login username.
    pub username: String,
    /// Opaque credential.
    pub credential: String,
    /// User role (defaults to User).
    pub role: Role,
    /// Storage quota in bytes.
    pub quota_bytes: i64,
}

impl NewUser {
    /// Create a new regular user with the given quota.
    pub fn new(username: impl Into<String>, credential: impl Into<String>, quota_bytes: i64) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
            role: Role::User,
            quota_bytes,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_strings() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("sysop".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_new_user_builder() {
        let user = NewUser::new("alice", "hash", 1024).with_role(Role::Admin);
        assert_eq!(user.username, "alice");
        assert_eq!(user.quota_bytes, 1024);
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_remaining_bytes() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            credential: String::new(),
            role: Role::User,
            quota_bytes: 100,
            used_bytes: 40,
            created_at: String::new(),
        };
        assert_eq!(user.remaining_bytes(), 60);
        assert!(!user.is_admin());
    }
}
