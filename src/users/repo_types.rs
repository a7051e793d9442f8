use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Marketplace side the account signed up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Freelancer,
}

impl Role {
    pub fn from_is_client(is_client: bool) -> Self {
        if is_client {
            Self::Client
        } else {
            Self::Freelancer
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Freelancer => "freelancer",
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub hashed_password: String, // Argon2 PHC string
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub profile_completed: bool,
    pub verification_code: Option<String>,
    pub verification_code_expires: Option<OffsetDateTime>,
    pub welcome_otp: Option<String>,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// "First Last", or whichever half exists. `None` when both are blank.
    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        let full = format!("{first} {last}").trim().to_owned();
        (!full.is_empty()).then_some(full)
    }

    /// Name used to greet the user in messages.
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Fields needed to insert a fresh, unverified account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub hashed_password: String,
    pub first_name: Option<String>,
    pub role: Role,
    pub verification_code: String,
    pub verification_code_expires: OffsetDateTime,
}

impl NewUser {
    /// The row a fresh insert produces.
    #[cfg(test)]
    pub fn into_user(self, created_at: OffsetDateTime) -> User {
        User {
            id: self.id,
            email: self.email,
            username: self.username,
            hashed_password: self.hashed_password,
            first_name: self.first_name,
            last_name: None,
            phone: None,
            role: self.role.as_str().to_owned(),
            is_active: false,
            is_verified: false,
            profile_completed: false,
            verification_code: Some(self.verification_code),
            verification_code_expires: Some(self.verification_code_expires),
            welcome_otp: None,
            last_login: None,
            created_at,
        }
    }
}

/// Columns of [`User`] written when the profile is completed.
#[derive(Debug, Clone)]
pub struct ContactDetails {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// One-to-one extension of [`User`], created when the email is verified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub years_experience: Option<i32>,
    pub education: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub full_address: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub languages: Vec<String>,
    pub availability: Option<String>,
}

impl UserProfile {
    #[cfg(test)]
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: Option<&str>, last: Option<&str>) -> User {
        let mut user = NewUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            username: "ada".into(),
            hashed_password: "x".into(),
            first_name: first.map(Into::into),
            role: Role::Client,
            verification_code: "123456".into(),
            verification_code_expires: OffsetDateTime::now_utc(),
        }
        .into_user(OffsetDateTime::now_utc());
        user.last_name = last.map(Into::into);
        user
    }

    #[test]
    fn full_name_joins_available_parts() {
        assert_eq!(user(Some("Ada"), Some("Lovelace")).full_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(user(None, Some("Lovelace")).full_name().as_deref(), Some("Lovelace"));
        assert_eq!(user(Some("  "), None).full_name(), None);
        assert_eq!(user(None, None).full_name(), None);
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(user(Some("Ada"), None).display_name(), "Ada");
        assert_eq!(user(None, None).display_name(), "ada");
        assert_eq!(user(Some(""), None).display_name(), "ada");
    }

    #[test]
    fn new_users_start_unverified_with_pending_code() {
        let u = user(None, None);
        assert!(!u.is_active && !u.is_verified && !u.profile_completed);
        assert_eq!(u.verification_code.as_deref(), Some("123456"));
        assert_eq!(u.role, "client");
    }
}
