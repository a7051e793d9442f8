use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::AppConfig;
use crate::mail::Mailer;
use crate::users::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub mailer: Mailer,
}

impl AppState {
    /// Connects the database pool and the mail transport. Also returns the
    /// pool so the caller can run migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, sqlx::PgPool)> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;
        info!("database pool ready");

        let mailer = Mailer::from_config(&config.email)?;
        let state = Self {
            config: Arc::new(config),
            store: Arc::new(PgUserStore::new(pool.clone())),
            mailer,
        };
        Ok((state, pool))
    }
}

#[cfg(test)]
pub struct TestHarness {
    pub state: AppState,
    pub store: Arc<crate::users::memory::MemoryUserStore>,
    pub mail: Arc<crate::mail::testing::RecordingTransport>,
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::harness().state
    }

    pub fn fake_with_config(config: AppConfig) -> Self {
        Self::harness_with_config(config).state
    }

    pub fn harness() -> TestHarness {
        Self::harness_with_config(AppConfig::for_tests())
    }

    /// In-memory store and recording transport, no database or SMTP server.
    pub fn harness_with_config(config: AppConfig) -> TestHarness {
        let store = Arc::new(crate::users::memory::MemoryUserStore::default());
        let mail = Arc::new(crate::mail::testing::RecordingTransport::default());
        let mailer = Mailer::new(mail.clone(), &config.email);
        let state = Self {
            config: Arc::new(config),
            store: store.clone(),
            mailer,
        };
        TestHarness { state, store, mail }
    }
}
