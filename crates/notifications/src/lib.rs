pub mod channel;
pub mod format;
pub mod manager;

pub use channel::{ChannelError, PrimaryChannel, SecondaryChannel, SmtpChannel, WebhookChannel};
pub use format::{format_primary, format_secondary, SecondaryPayload, PRIMARY_BODY_LIMIT_CHARS};
pub use manager::{ChannelOutcome, NotificationManager, NotificationManagerConfig, NotificationMode, NotificationOutcome};

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, Tokio1Executor};

#[derive(Debug, thiserror::Error)]
pub enum NotificationConfigError {
    #[error("notification config error: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

/// Environment-sourced configuration for the two notification channels.
/// Either or both may be absent, in which case `build_manager` wires up a
/// manager whose `notify` is a no-op success (§4.9: disabled channels don't
/// count as a scan failure).
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub mode: NotificationMode,
    pub fallback_delay_secs: u64,
    pub top_n_primary: usize,
    pub webhook_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        let smtp_to = std::env::var("NOTIFICATION_EMAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        let mode = match std::env::var("NOTIFICATION_MODE").unwrap_or_default().as_str() {
            "primary_only" => NotificationMode::PrimaryOnly,
            "both" => NotificationMode::Both,
            _ => NotificationMode::PrimaryWithFallback,
        };

        Self {
            mode,
            fallback_delay_secs: std::env::var("NOTIFICATION_FALLBACK_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            top_n_primary: std::env::var("NOTIFICATION_TOP_N")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            webhook_url: std::env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_host: std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: std::env::var("SMTP_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: std::env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: std::env::var("SMTP_FROM_ADDRESS").ok().filter(|s| !s.is_empty()),
            smtp_to,
            smtp_tls,
        }
    }

    fn build_smtp_channel(&self) -> Result<SmtpChannel, NotificationConfigError> {
        let host = self
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationConfigError::Invalid("SMTP_HOST not set".into()))?;
        let from_addr = self
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotificationConfigError::Invalid("SMTP_FROM_ADDRESS not set".into()))?;

        let from: Mailbox = from_addr
            .parse()
            .map_err(|e| NotificationConfigError::Invalid(format!("invalid from address: {e}")))?;

        let to: Vec<Mailbox> = self.smtp_to.iter().filter_map(|addr| addr.parse().ok()).collect();
        if to.is_empty() {
            return Err(NotificationConfigError::Invalid("no valid NOTIFICATION_EMAIL_TO addresses".into()));
        }

        let mut builder = match self.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| NotificationConfigError::Invalid(format!("SMTP transport error: {e}")))?;

        builder = builder.port(self.smtp_port);
        if let (Some(user), Some(pass)) = (&self.smtp_username, &self.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(SmtpChannel::new("smtp", builder.build(), from, to))
    }

    /// Builds a `NotificationManager` from this config. A channel that fails
    /// to construct (missing env var, bad address) is logged and left out
    /// rather than failing the whole manager — the other channel may still
    /// be usable.
    pub fn build_manager(&self) -> NotificationManager {
        let primary: Option<Box<dyn PrimaryChannel>> = self.webhook_url.as_ref().map(|url| {
            Box::new(WebhookChannel::new("webhook", url.clone())) as Box<dyn PrimaryChannel>
        });
        if primary.is_none() {
            tracing::info!("primary notification channel disabled (NOTIFICATION_WEBHOOK_URL not set)");
        }

        let secondary: Option<Box<dyn SecondaryChannel>> = if self.smtp_host.is_some() {
            match self.build_smtp_channel() {
                Ok(channel) => Some(Box::new(channel) as Box<dyn SecondaryChannel>),
                Err(e) => {
                    tracing::warn!("secondary notification channel disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        let manager_config = NotificationManagerConfig {
            mode: self.mode,
            fallback_delay: std::time::Duration::from_secs(self.fallback_delay_secs),
            top_n_primary: self.top_n_primary,
            ..NotificationManagerConfig::default()
        };

        NotificationManager::new(primary, secondary, manager_config)
    }
}
