use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct Check {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Check {
    pub fn healthy() -> Self {
        Self {
            status: Status::Healthy,
            error: None,
        }
    }

    pub fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::healthy(),
            Err(e) => Self {
                status: Status::Unhealthy,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == Status::Healthy
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigCheck {
    #[serde(flatten)]
    pub check: Check,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct Checks {
    pub api: Check,
    pub database: Check,
    pub email: Check,
    pub config: ConfigCheck,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub version: &'static str,
    pub app_name: String,
    pub environment: String,
    pub checks: Checks,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct EmailConfigView {
    pub host: String,
    pub port: u16,
    pub username_set: bool,
    pub password_set: bool,
    pub template_dir_exists: bool,
}

#[derive(Debug, Serialize)]
pub struct TestEmailReport {
    pub success: bool,
    pub direct_smtp_test: bool,
    pub message: &'static str,
    pub email_config: EmailConfigView,
}
