//! User identity, role claim, and profile records.

use common::UserId;
use serde::{Deserialize, Serialize};

/// Role claim carried in the auth provider's session metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular shopper.
    #[default]
    User,

    /// May manage the catalog through the admin surface.
    Admin,
}

impl Role {
    /// Returns true if this role grants admin access.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Parses a role claim string, defaulting to `User` for unknown values.
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("admin") => Role::Admin,
            _ => Role::User,
        }
    }

    /// Returns the role name in its wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated user as held by the session store: identity plus
/// the profile fields the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

/// The profiles-table row shape. The row id is the auth user's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_claim() {
        assert_eq!(Role::from_claim(Some("admin")), Role::Admin);
        assert_eq!(Role::from_claim(Some("user")), Role::User);
        assert_eq!(Role::from_claim(Some("other")), Role::User);
        assert_eq!(Role::from_claim(None), Role::User);
    }

    #[test]
    fn test_is_admin() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn test_profile_roundtrip() {
        let profile = Profile {
            id: UserId::new(),
            full_name: Some("Asha Rai".to_string()),
            avatar_url: None,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("avatar_url").is_none());
        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(profile, back);
    }
}
