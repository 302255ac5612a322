//! User Aggregate and the verified caller identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole { Buyer, Seller, Admin }

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" | "customer" => Ok(Self::Buyer),
            "seller" | "vendor" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    name: String,
    email: String,
    role: UserRole,
    created_at: DateTime<Utc>,
    last_active_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn register(name: impl Into<String>, email: impl Into<String>, role: UserRole, at: DateTime<Utc>) -> Self {
        Self { id: Uuid::now_v7(), name: name.into(), email: email.into(), role, created_at: at, last_active_at: Some(at) }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn email(&self) -> &str { &self.email }
    pub fn role(&self) -> UserRole { self.role }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn last_active_at(&self) -> Option<DateTime<Utc>> { self.last_active_at }

    pub fn record_activity(&mut self, at: DateTime<Utc>) {
        if self.last_active_at.map_or(true, |prev| prev < at) {
            self.last_active_at = Some(at);
        }
    }
}

/// Caller identity handed over by the authentication layer, already verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor { pub id: Uuid, pub role: UserRole }

impl Actor {
    pub fn new(id: Uuid, role: UserRole) -> Self { Self { id, role } }
    pub fn admin(id: Uuid) -> Self { Self::new(id, UserRole::Admin) }
    pub fn is_admin(&self) -> bool { self.role == UserRole::Admin }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_activity_only_moves_forward() {
        let now = Utc::now();
        let mut user = User::register("Ada", "ada@example.com", UserRole::Buyer, now);
        user.record_activity(now - Duration::hours(1));
        assert_eq!(user.last_active_at(), Some(now));
        user.record_activity(now + Duration::hours(1));
        assert_eq!(user.last_active_at(), Some(now + Duration::hours(1)));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Vendor".parse::<UserRole>(), Ok(UserRole::Seller));
        assert!("root".parse::<UserRole>().is_err());
    }
}
