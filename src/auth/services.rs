//! Signup, verification and login workflow.
//!
//! A user moves from unverified (`is_active = false`, code pending) to
//! verified (`is_active = true`, code cleared, empty profile present), and
//! later to profile-complete. Email delivery outcomes are logged and never
//! undo a transition that was already stored.

use axum::extract::FromRef;
use lazy_static::lazy_static;
use rand::{rngs::OsRng, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            CheckEmailRequest, CompleteProfileRequest, EmailExists, LoginForm, LoginResponse,
            MeResponse, MeUser, NextStep, ResendRequest, SignupRequest, StepCompletion, TokenData,
            UserSummary, VerifyEmailRequest,
        },
        jwt::{Claims, JwtKeys},
        password::{hash_password, verify_password, DUMMY_HASH},
    },
    error::{AppError, Result},
    state::AppState,
    users::{ContactDetails, NewUser, Role, StoreError, UniqueField, User, UserStore},
};

/// Validity window of a verification code.
pub const CODE_TTL: Duration = Duration::minutes(30);
pub const MIN_PASSWORD_LEN: usize = 8;
/// Inserts attempted when concurrent signups keep taking the derived username.
const USERNAME_ATTEMPTS: usize = 3;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Six decimal digits, zero padded.
pub(crate) fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

fn is_code_format(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Digits with an optional leading `+`.
pub(crate) fn is_phone(identifier: &str) -> bool {
    let digits = identifier.strip_prefix('+').unwrap_or(identifier);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Local part of `email`, suffixed with 1, 2, ... until no user holds it.
/// Recomputed from the base on every call.
pub async fn derive_username(store: &dyn UserStore, email: &str) -> std::result::Result<String, StoreError> {
    let base = email.split('@').next().unwrap_or(email);
    let mut candidate = base.to_owned();
    let mut suffix = 0u32;
    while store.username_exists(&candidate).await? {
        suffix += 1;
        candidate = format!("{base}{suffix}");
    }
    Ok(candidate)
}

pub async fn initial_signup(state: &AppState, req: SignupRequest) -> Result<StepCompletion> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.store.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::EmailTaken);
    }

    let hashed_password = hash_password(&req.password)?;
    let code = generate_code();
    let expires = OffsetDateTime::now_utc() + CODE_TTL;

    let mut attempt = 1;
    let user = loop {
        let username = derive_username(state.store.as_ref(), &email).await?;
        let new_user = NewUser {
            id: Uuid::new_v4(),
            email: email.clone(),
            username: username.clone(),
            hashed_password: hashed_password.clone(),
            first_name: Some(username),
            role: Role::from_is_client(req.is_client),
            verification_code: code.clone(),
            verification_code_expires: expires,
        };
        match state.store.insert(new_user).await {
            Ok(user) => break user,
            Err(StoreError::Conflict(UniqueField::Email)) => {
                warn!(%email, "email registered concurrently");
                return Err(AppError::EmailTaken);
            }
            Err(StoreError::Conflict(UniqueField::Username)) if attempt < USERNAME_ATTEMPTS => {
                warn!(%email, attempt, "derived username taken concurrently, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    };
    info!(user_id = %user.id, username = %user.username, role = %user.role, "user created");

    let sent = state
        .mailer
        .send_verification_code(&user.email, &code, &user.id.to_string())
        .await;
    if !sent {
        warn!(user_id = %user.id, "verification email not delivered; account kept");
    }

    Ok(StepCompletion::new(
        "Account created. Please verify your email.",
        NextStep::VerifyEmail,
        user.id,
    ))
}

pub async fn verify_email(state: &AppState, req: VerifyEmailRequest) -> Result<StepCompletion> {
    let user = state
        .store
        .find_by_id(req.user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    if !is_code_format(&req.code) || user.verification_code.as_deref() != Some(req.code.as_str()) {
        warn!(user_id = %user.id, "invalid verification code");
        return Err(AppError::InvalidCode);
    }
    if user
        .verification_code_expires
        .is_some_and(|expires| expires < OffsetDateTime::now_utc())
    {
        warn!(user_id = %user.id, "verification code expired");
        return Err(AppError::ExpiredCode);
    }

    let welcome_otp = generate_code();
    if !state.store.activate(user.id, &req.code, &welcome_otp).await? {
        warn!(user_id = %user.id, "verification code replaced or consumed concurrently");
        return Err(AppError::InvalidCode);
    }
    info!(user_id = %user.id, "email verified");

    let sent = state
        .mailer
        .send_welcome(&user.email, user.display_name(), Some(&welcome_otp))
        .await;
    if !sent {
        warn!(user_id = %user.id, "welcome email not delivered");
    }

    Ok(StepCompletion::new(
        "Email verified successfully.",
        NextStep::CompleteProfile,
        user.id,
    ))
}

fn already_verified(user_id: Uuid) -> StepCompletion {
    StepCompletion::new("User is already verified.", NextStep::CompleteProfile, user_id)
}

pub async fn resend_verification(state: &AppState, req: ResendRequest) -> Result<StepCompletion> {
    let user = state
        .store
        .find_by_id(req.user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    if user.is_active {
        return Ok(already_verified(user.id));
    }

    let code = generate_code();
    let expires = OffsetDateTime::now_utc() + CODE_TTL;
    if !state.store.reissue_code(user.id, &code, expires).await? {
        info!(user_id = %user.id, "user verified concurrently, code not reissued");
        return Ok(already_verified(user.id));
    }
    info!(user_id = %user.id, "verification code reissued");

    if !state
        .mailer
        .send_verification_code(&user.email, &code, &user.id.to_string())
        .await
    {
        warn!(user_id = %user.id, "verification email not delivered");
    }

    Ok(StepCompletion::new(
        "Verification code resent. Please check your email.",
        NextStep::VerifyEmail,
        user.id,
    ))
}

pub async fn check_email(state: &AppState, req: CheckEmailRequest) -> Result<EmailExists> {
    let email = normalize_email(&req.email);
    let found = state.store.find_by_email(&email).await?;
    Ok(match found {
        Some(user) => EmailExists {
            exists: true,
            message: "Email is already registered. Please login instead.".into(),
            is_active: Some(user.is_active),
        },
        None => EmailExists {
            exists: false,
            message: "Email is available for registration.".into(),
            is_active: None,
        },
    })
}

async fn find_login_user(store: &dyn UserStore, identifier: &str) -> Result<Option<User>> {
    let identifier = identifier.trim();
    let key = if identifier.contains('@') {
        normalize_email(identifier)
    } else {
        identifier.to_owned()
    };
    if let Some(user) = store.find_by_email_or_username(&key).await? {
        return Ok(Some(user));
    }
    if is_phone(identifier) {
        return Ok(store.find_by_phone(identifier).await?);
    }
    Ok(None)
}

pub async fn login(state: &AppState, form: LoginForm) -> Result<LoginResponse> {
    let Some(mut user) = find_login_user(state.store.as_ref(), &form.username).await? else {
        // Same argon2 cost as a wrong password.
        let _ = verify_password(&form.password, DUMMY_HASH);
        warn!("login for unknown account");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&form.password, &user.hashed_password)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let now = OffsetDateTime::now_utc();
    state.store.touch_last_login(user.id, now).await?;
    user.last_login = Some(now);

    let access_token = JwtKeys::from_ref(state).sign(&user)?;
    info!(user_id = %user.id, "user logged in");

    Ok(LoginResponse {
        message: "Login successful",
        token: TokenData {
            access_token,
            token_type: "bearer",
            username: user.username.clone(),
        },
        user: UserSummary::from(&user),
    })
}

async fn current_user(state: &AppState, claims: &Claims) -> Result<User> {
    state
        .store
        .find_by_email_or_username(&claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(username = %claims.sub, "token for missing user");
            AppError::Unauthorized
        })
}

pub async fn me(state: &AppState, claims: &Claims) -> Result<MeResponse> {
    let user = current_user(state, claims).await?;
    let profile = state.store.find_profile(user.id).await?;
    Ok(MeResponse {
        user: MeUser {
            summary: UserSummary::from(&user),
            profile: profile.map(Into::into),
        },
    })
}

pub async fn complete_profile(
    state: &AppState,
    claims: &Claims,
    mut req: CompleteProfileRequest,
) -> Result<StepCompletion> {
    let user = current_user(state, claims).await?;
    if !user.is_active {
        return Err(AppError::NotVerified);
    }

    let first_name = req.first_name.trim().to_owned();
    let last_name = req.last_name.trim().to_owned();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::Validation("First and last name are required".into()));
    }
    let phone = req.phone.take().map(|p| p.trim().to_owned()).filter(|p| !p.is_empty());
    if phone.as_deref().is_some_and(|p| !is_phone(p)) {
        return Err(AppError::Validation("Invalid phone number".into()));
    }
    if req.years_experience.is_some_and(|y| y < 0) {
        return Err(AppError::Validation("Years of experience cannot be negative".into()));
    }

    let contact = ContactDetails {
        first_name,
        last_name,
        phone,
    };
    let profile = req.into_profile(user.id);
    state.store.complete_profile(&contact, &profile).await?;
    info!(user_id = %user.id, "profile completed");

    Ok(StepCompletion::new("Profile completed.", NextStep::Done, user.id))
}
