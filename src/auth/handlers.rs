use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            CheckEmailRequest, CompleteProfileRequest, EmailExists, LoginForm, LoginResponse,
            MeResponse, ResendRequest, SignupRequest, StepCompletion, VerifyEmailRequest,
        },
        jwt::AuthUser,
        services,
    },
    error::Result,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup/initial", post(signup_initial))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/check-email", post(check_email))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/complete-profile", post(complete_profile))
}

#[instrument(skip(state, payload))]
pub async fn signup_initial(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<StepCompletion>)> {
    let resp = services::initial_signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<StepCompletion>> {
    Ok(Json(services::verify_email(&state, payload).await?))
}

#[instrument(skip(state, payload), fields(user_id = %payload.user_id))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendRequest>,
) -> Result<Json<StepCompletion>> {
    Ok(Json(services::resend_verification(&state, payload).await?))
}

#[instrument(skip(state, payload))]
pub async fn check_email(
    State(state): State<AppState>,
    Json(payload): Json<CheckEmailRequest>,
) -> Result<Json<EmailExists>> {
    Ok(Json(services::check_email(&state, payload).await?))
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(services::login(&state, form).await?))
}

#[instrument(skip(state, claims), fields(username = %claims.sub))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>> {
    Ok(Json(services::me(&state, &claims).await?))
}

#[instrument(skip(state, claims, payload), fields(username = %claims.sub))]
pub async fn complete_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(payload): Json<CompleteProfileRequest>,
) -> Result<Json<StepCompletion>> {
    Ok(Json(services::complete_profile(&state, &claims, payload).await?))
}
