//! Send transactional emails (verification codes, welcome, password reset).
//!
//! Delivery is attempted once on the async path, bounded by
//! [`DELIVERY_TIMEOUT`], then once more on the blocking path. The outcome is
//! a plain `bool`; no delivery failure ever reaches the caller as an error.

mod templates;
mod transport;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::config::EmailConfig;

pub use templates::{Context, Template, TemplateRenderer};
#[cfg(test)]
pub use transport::testing;
pub use transport::{LogTransport, MailTransport, SmtpMailTransport};

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
const BRAND: &str = "Lanceraa";

pub const VERIFICATION_SUBJECT: &str = "Your Lanceraa Verification Code";
pub const WELCOME_SUBJECT: &str = "Welcome to Lanceraa!";
pub const PASSWORD_RESET_SUBJECT: &str = "Reset Your Lanceraa Password";

#[derive(Clone)]
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    renderer: Arc<TemplateRenderer>,
    from: String,
    support_email: String,
}

impl Mailer {
    pub fn new(transport: Arc<dyn MailTransport>, config: &EmailConfig) -> Self {
        Self {
            transport,
            renderer: Arc::new(TemplateRenderer::new(config.templates_dir.clone())),
            from: config.from.clone(),
            support_email: config.support_email.clone(),
        }
    }

    /// Picks the SMTP transport, or the logging one in test mode.
    pub fn from_config(config: &EmailConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn MailTransport> = if config.test_mode {
            warn!("EMAIL_TEST_MODE is on, emails will be logged instead of sent");
            Arc::new(LogTransport)
        } else {
            Arc::new(SmtpMailTransport::new(config)?)
        };
        Ok(Self::new(transport, config))
    }

    pub fn transport(&self) -> &dyn MailTransport {
        self.transport.as_ref()
    }

    pub fn templates_dir(&self) -> &Path {
        self.renderer.dir()
    }

    fn build_message(&self, to: &str, subject: &str, html: String) -> anyhow::Result<Message> {
        let from: Mailbox = self.from.parse().context("invalid EMAIL_FROM address")?;
        let to: Mailbox = to.parse().context("invalid recipient address")?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .date_now()
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("build email message")?;
        Ok(message)
    }

    /// Renders `template` and delivers it to `to`. Returns whether either
    /// delivery attempt succeeded.
    #[instrument(skip(self, context), fields(template = template.name()))]
    pub async fn deliver(&self, to: &str, subject: &str, template: Template, mut context: Context) -> bool {
        context
            .entry("year")
            .or_insert_with(|| time::OffsetDateTime::now_utc().year().to_string());
        let html = self.renderer.render_or_fallback(template, &context);

        let message = match self.build_message(to, subject, html) {
            Ok(message) => message,
            Err(err) => {
                error!(error = ?err, "email not sent");
                return false;
            }
        };

        match timeout(DELIVERY_TIMEOUT, self.transport.send(message.clone())).await {
            Ok(Ok(())) => {
                info!("email sent");
                return true;
            }
            Ok(Err(err)) => warn!(error = ?err, "async delivery failed, retrying synchronously"),
            Err(_) => warn!(timeout = ?DELIVERY_TIMEOUT, "async delivery timed out, retrying synchronously"),
        }

        let transport = Arc::clone(&self.transport);
        match tokio::task::spawn_blocking(move || transport.send_blocking(&message)).await {
            Ok(Ok(())) => {
                info!("email sent on synchronous retry");
                true
            }
            Ok(Err(err)) => {
                error!(error = ?err, "synchronous delivery failed");
                false
            }
            Err(err) => {
                error!(error = %err, "synchronous delivery task aborted");
                false
            }
        }
    }

    fn base_context(&self) -> Context {
        Context::from([
            ("app_name", BRAND.to_owned()),
            ("support_email", self.support_email.clone()),
        ])
    }

    pub async fn send_verification_code(&self, to: &str, code: &str, user_id: &str) -> bool {
        let mut context = self.base_context();
        context.insert("code", code.to_owned());
        context.insert("user_id", user_id.to_owned());
        self.deliver(to, VERIFICATION_SUBJECT, Template::VerificationCode, context)
            .await
    }

    pub async fn send_welcome(&self, to: &str, user_name: &str, otp: Option<&str>) -> bool {
        let mut context = self.base_context();
        context.insert("user_name", user_name.to_owned());
        if let Some(otp) = otp {
            context.insert("otp", otp.to_owned());
        }
        self.deliver(to, WELCOME_SUBJECT, Template::Welcome, context).await
    }

    #[allow(dead_code)]
    pub async fn send_password_reset(&self, to: &str, reset_code: &str) -> bool {
        let mut context = self.base_context();
        context.insert("reset_code", reset_code.to_owned());
        self.deliver(to, PASSWORD_RESET_SUBJECT, Template::PasswordReset, context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::{Path as SentPath, RecordingTransport};
    use super::*;
    use crate::config::AppConfig;

    fn mailer(transport: Arc<RecordingTransport>) -> Mailer {
        Mailer::new(transport, &AppConfig::for_tests().email)
    }

    #[tokio::test]
    async fn async_path_success_sends_once() {
        let transport = Arc::new(RecordingTransport::default());
        assert!(mailer(transport.clone()).send_verification_code("ada@example.com", "123456", "u1").await);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, SentPath::Async);
        assert_eq!(sent[0].to, vec!["ada@example.com"]);
        assert!(sent[0].raw.contains(VERIFICATION_SUBJECT));
        assert!(sent[0].raw.contains("123456"));
    }

    #[tokio::test]
    async fn async_failure_falls_back_to_blocking_once() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_async.store(true, Ordering::SeqCst);

        assert!(mailer(transport.clone()).send_welcome("ada@example.com", "ada", Some("654321")).await);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, SentPath::Blocking);
        assert!(sent[0].raw.contains("654321"));
    }

    #[tokio::test]
    async fn both_paths_failing_returns_false() {
        let transport = Arc::new(RecordingTransport::failing());
        assert!(!mailer(transport.clone()).send_password_reset("ada@example.com", "998877").await);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn invalid_recipient_is_reported_not_raised() {
        let transport = Arc::new(RecordingTransport::default());
        assert!(!mailer(transport.clone()).send_verification_code("not an address", "123456", "u1").await);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_templates_still_deliver_fallback_body() {
        let transport = Arc::new(RecordingTransport::default());
        let mut config = AppConfig::for_tests().email;
        config.templates_dir = "/nonexistent".into();
        let mailer = Mailer::new(transport.clone(), &config);

        assert!(mailer.send_verification_code("ada@example.com", "246810", "u1").await);
        let raw = &transport.sent()[0].raw;
        assert!(raw.contains("Your verification code is"));
        assert!(raw.contains("246810"));
    }

    #[tokio::test]
    async fn test_mode_logs_instead_of_sending() {
        let mut config = AppConfig::for_tests().email;
        config.test_mode = true;
        let mailer = Mailer::from_config(&config).unwrap();
        assert!(mailer.send_verification_code("ada@example.com", "135790", "u1").await);
        assert!(mailer.transport().probe().await.is_ok());
    }
}
