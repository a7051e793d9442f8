use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::{User, UserProfile};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_client: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub user_id: Uuid,
    #[serde(alias = "verification_code")]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailRequest {
    pub email: String,
}

/// OAuth2 password form; `username` may also be an email or a phone number.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
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
    #[serde(default)]
    pub languages: Vec<String>,
    pub availability: Option<String>,
}

impl CompleteProfileRequest {
    pub fn into_profile(self, user_id: Uuid) -> UserProfile {
        UserProfile {
            user_id,
            bio: self.bio,
            skills: self.skills,
            years_experience: self.years_experience,
            education: self.education,
            street: self.street,
            city: self.city,
            state: self.state,
            country: self.country,
            zip: self.zip,
            full_address: self.full_address,
            website: self.website,
            linkedin: self.linkedin,
            github: self.github,
            languages: self.languages,
            availability: self.availability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    VerifyEmail,
    CompleteProfile,
    Done,
}

/// Acknowledges a workflow step and names the client's next action.
#[derive(Debug, Serialize, Deserialize)]
pub struct StepCompletion {
    pub message: String,
    pub success: bool,
    pub next_step: NextStep,
    pub user_id: Uuid,
}

impl StepCompletion {
    pub fn new(message: &str, next_step: NextStep, user_id: Uuid) -> Self {
        Self {
            message: message.to_owned(),
            success: true,
            next_step,
            user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmailExists {
    pub exists: bool,
    pub message: String,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TokenData {
    pub access_token: String,
    pub token_type: &'static str,
    pub username: String,
}

/// Flattened user returned by login and `/me`.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub profile_completed: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            role: user.role.clone(),
            phone: user.phone.clone(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            profile_completed: user.profile_completed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: TokenData,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub full_address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Social {
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub years_experience: Option<i32>,
    pub education: Option<String>,
    /// Present once a street address has been given.
    pub address: Option<Address>,
    pub social: Social,
    pub languages: Vec<String>,
    pub availability: Option<String>,
}

impl From<UserProfile> for ProfileView {
    fn from(p: UserProfile) -> Self {
        let address = p.street.is_some().then(|| Address {
            street: p.street,
            city: p.city,
            state: p.state,
            country: p.country,
            zip: p.zip,
            full_address: p.full_address,
        });
        Self {
            bio: p.bio,
            skills: p.skills,
            years_experience: p.years_experience,
            education: p.education,
            address,
            social: Social {
                website: p.website,
                linkedin: p.linkedin,
                github: p.github,
            },
            languages: p.languages,
            availability: p.availability,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeUser {
    #[serde(flatten)]
    pub summary: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileView>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: MeUser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_step_is_snake_case() {
        let body = serde_json::to_value(StepCompletion::new("ok", NextStep::VerifyEmail, Uuid::nil())).unwrap();
        assert_eq!(body["next_step"], "verify_email");
        assert_eq!(body["success"], true);
        assert_eq!(body["user_id"], Uuid::nil().to_string());
    }

    #[test]
    fn verify_request_accepts_either_code_field() {
        let id = Uuid::new_v4();
        let a: VerifyEmailRequest = serde_json::from_value(json!({"user_id": id, "code": "123456"})).unwrap();
        let b: VerifyEmailRequest =
            serde_json::from_value(json!({"user_id": id, "verification_code": "123456"})).unwrap();
        assert_eq!(a.code, b.code);
    }

    #[test]
    fn profile_address_only_with_street() {
        let mut profile = UserProfile::empty(Uuid::nil());
        profile.city = Some("Paris".into());
        assert!(ProfileView::from(profile.clone()).address.is_none());

        profile.street = Some("1 Rue".into());
        let view = serde_json::to_value(ProfileView::from(profile)).unwrap();
        assert_eq!(view["address"]["city"], "Paris");
        assert!(view["social"].is_object());
    }
}
