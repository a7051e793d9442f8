use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::dto::{
    Check, Checks, ConfigCheck, EmailConfigView, HealthReport, Status, TestEmailQuery,
    TestEmailReport,
};
use crate::{mail::DELIVERY_TIMEOUT, state::AppState};

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/test-email", post(test_email))
}

async fn probe_email(state: &AppState) -> anyhow::Result<()> {
    match timeout(DELIVERY_TIMEOUT, state.mailer.transport().probe()).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("smtp probe timed out after {DELIVERY_TIMEOUT:?}"),
    }
}

/// Liveness plus database, SMTP and configuration checks. The SMTP check
/// performs a real login on every call.
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = Check::from_result(state.store.ping().await);
    let email = Check::from_result(probe_email(&state).await.map_err(|e| format!("{e:#}")));

    let missing = state.config.missing_values();
    let config = ConfigCheck {
        check: if missing.is_empty() {
            Check::healthy()
        } else {
            Check::from_result(Err("configuration values missing"))
        },
        missing,
    };

    let all_healthy = database.is_healthy() && email.is_healthy() && config.check.is_healthy();
    let (status, code) = if all_healthy {
        (Status::Healthy, StatusCode::OK)
    } else {
        warn!(
            database = ?database.error,
            email = ?email.error,
            missing = ?config.missing,
            "health check degraded"
        );
        (Status::Degraded, StatusCode::SERVICE_UNAVAILABLE)
    };

    let report = HealthReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        app_name: state.config.app_name.clone(),
        environment: state.config.environment.clone(),
        checks: Checks {
            api: Check::healthy(),
            database,
            email,
            config,
        },
    };
    (code, Json(report))
}

/// Probes the SMTP server, then sends a verification message with a fixed
/// code to `email` through the regular delivery path.
#[instrument(skip(state))]
pub async fn test_email(
    State(state): State<AppState>,
    Query(query): Query<TestEmailQuery>,
) -> Json<TestEmailReport> {
    let email_config = &state.config.email;
    let direct = probe_email(&state).await;
    if let Err(e) = &direct {
        warn!(error = %e, "direct smtp test failed");
    }

    let success = state
        .mailer
        .send_verification_code(&query.email, "123456", "test-user-id")
        .await;
    info!(success, direct_smtp_test = direct.is_ok(), "email test completed");

    Json(TestEmailReport {
        success,
        direct_smtp_test: direct.is_ok(),
        message: "Email test completed - check server logs for details",
        email_config: EmailConfigView {
            host: email_config.host.clone(),
            port: email_config.port,
            username_set: !email_config.username.is_empty(),
            password_set: !email_config.password.is_empty(),
            template_dir_exists: state.mailer.templates_dir().is_dir(),
        },
    })
}
