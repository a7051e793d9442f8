use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, SmtpTransport, Tokio1Executor, Transport};
use tracing::{debug, info};

use crate::config::EmailConfig;

/// Bound on every SMTP exchange.
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound delivery of finished messages.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Non-blocking delivery.
    async fn send(&self, message: Message) -> anyhow::Result<()>;
    /// Blocking delivery; callers run it on the blocking pool.
    fn send_blocking(&self, message: &Message) -> anyhow::Result<()>;
    /// Connects, upgrades with STARTTLS and authenticates without sending.
    async fn probe(&self) -> anyhow::Result<()>;
}

/// Authenticated SMTP submission over STARTTLS.
pub struct SmtpMailTransport {
    nonblocking: AsyncSmtpTransport<Tokio1Executor>,
    blocking: SmtpTransport,
}

impl SmtpMailTransport {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let nonblocking = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("configure async smtp transport")?
            .port(config.port)
            .credentials(credentials.clone())
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let blocking = SmtpTransport::starttls_relay(&config.host)
            .context("configure blocking smtp transport")?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        info!(host = %config.host, port = config.port, "smtp transport configured");
        Ok(Self {
            nonblocking,
            blocking,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> anyhow::Result<()> {
        AsyncTransport::send(&self.nonblocking, message)
            .await
            .context("async smtp send")?;
        Ok(())
    }

    fn send_blocking(&self, message: &Message) -> anyhow::Result<()> {
        Transport::send(&self.blocking, message).context("blocking smtp send")?;
        Ok(())
    }

    async fn probe(&self) -> anyhow::Result<()> {
        let connected = self
            .nonblocking
            .test_connection()
            .await
            .context("smtp connection test")?;
        if !connected {
            anyhow::bail!("smtp server did not accept the connection");
        }
        Ok(())
    }
}

/// Logs messages instead of transmitting them (`EMAIL_TEST_MODE=true`).
pub struct LogTransport;

impl LogTransport {
    fn log(message: &Message) {
        let to: Vec<String> = message.envelope().to().iter().map(ToString::to_string).collect();
        info!(?to, "email test mode: message logged, not transmitted");
        debug!(message = %String::from_utf8_lossy(&message.formatted()), "email test mode");
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: Message) -> anyhow::Result<()> {
        Self::log(&message);
        Ok(())
    }

    fn send_blocking(&self, message: &Message) -> anyhow::Result<()> {
        Self::log(message);
        Ok(())
    }

    async fn probe(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Path {
        Async,
        Blocking,
    }

    #[derive(Debug, Clone)]
    pub struct Sent {
        pub to: Vec<String>,
        pub raw: String,
        pub path: Path,
    }

    /// Records delivered messages; each path can be told to fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub fail_async: AtomicBool,
        pub fail_blocking: AtomicBool,
        pub fail_probe: AtomicBool,
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        pub fn failing() -> Self {
            let transport = Self::default();
            transport.fail_async.store(true, Ordering::SeqCst);
            transport.fail_blocking.store(true, Ordering::SeqCst);
            transport.fail_probe.store(true, Ordering::SeqCst);
            transport
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, message: &Message, path: Path) {
            self.sent.lock().unwrap().push(Sent {
                to: message.envelope().to().iter().map(ToString::to_string).collect(),
                raw: String::from_utf8_lossy(&message.formatted()).into_owned(),
                path,
            });
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, message: Message) -> anyhow::Result<()> {
            if self.fail_async.load(Ordering::SeqCst) {
                anyhow::bail!("async path down");
            }
            self.record(&message, Path::Async);
            Ok(())
        }

        fn send_blocking(&self, message: &Message) -> anyhow::Result<()> {
            if self.fail_blocking.load(Ordering::SeqCst) {
                anyhow::bail!("blocking path down");
            }
            self.record(message, Path::Blocking);
            Ok(())
        }

        async fn probe(&self) -> anyhow::Result<()> {
            if self.fail_probe.load(Ordering::SeqCst) {
                anyhow::bail!("535 authentication failed");
            }
            Ok(())
        }
    }
}
