use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Partner,
    Client,
    Admin,
    /// Background sweeps and other server-initiated work.
    System,
}

impl ActorRole {
    pub fn from_claim(role: Option<&str>) -> Self {
        match role {
            Some("partner") | Some("therapist") => ActorRole::Partner,
            Some("admin") | Some("organization") => ActorRole::Admin,
            _ => ActorRole::Client,
        }
    }
}

/// The caller on whose behalf a scheduling operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn partner(id: Uuid) -> Self {
        Self::new(id, ActorRole::Partner)
    }

    pub fn client(id: Uuid) -> Self {
        Self::new(id, ActorRole::Client)
    }

    pub fn system() -> Self {
        Self::new(Uuid::nil(), ActorRole::System)
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::System)
    }

    /// Partners manage their own schedule; admins and the system manage any.
    pub fn can_manage_partner(&self, partner_id: Uuid) -> bool {
        self.is_privileged() || (self.role == ActorRole::Partner && self.id == partner_id)
    }
}

impl TryFrom<&User> for Actor {
    type Error = String;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| format!("User id '{}' is not a valid UUID", user.id))?;
        Ok(Actor::new(id, ActorRole::from_claim(user.role.as_deref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_from_user_maps_roles() {
        let id = Uuid::new_v4();
        let user = User {
            id: id.to_string(),
            email: None,
            role: Some("therapist".to_string()),
            metadata: None,
            created_at: None,
        };

        let actor = Actor::try_from(&user).unwrap();
        assert_eq!(actor.role, ActorRole::Partner);
        assert!(actor.can_manage_partner(id));
        assert!(!actor.can_manage_partner(Uuid::new_v4()));
    }

    #[test]
    fn test_actor_rejects_non_uuid_subject() {
        let user = User {
            id: "not-a-uuid".to_string(),
            email: None,
            role: None,
            metadata: None,
            created_at: None,
        };
        assert!(Actor::try_from(&user).is_err());
    }
}
