use async_trait::async_trait;

use crate::format::SecondaryPayload;

/// Whether a channel-level failure should be retried inside the channel
/// (§4.9: "up to 3 with exponential backoff for transient vendor errors").
/// Non-retryable failures (bad recipient, vendor-side policy rejection) stop
/// the retry loop immediately.
#[derive(Debug, Clone)]
pub enum ChannelError {
    Transient(String),
    NonRetryable(String),
}

impl ChannelError {
    pub fn message(&self) -> &str {
        match self {
            ChannelError::Transient(m) | ChannelError::NonRetryable(m) => m,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ChannelError::Transient(_))
    }
}

#[async_trait]
pub trait PrimaryChannel: Send + Sync {
    fn channel_id(&self) -> &str;
    async fn send_once(&self, body: &str) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait SecondaryChannel: Send + Sync {
    fn channel_id(&self) -> &str;
    async fn send_once(&self, payload: &SecondaryPayload) -> Result<(), ChannelError>;
}

/// Chat webhook channel (e.g. Discord/Slack-style incoming webhook). Payload
/// rejections for a bad recipient or vendor-side policy violation are
/// non-retryable; network/5xx failures are transient.
pub struct WebhookChannel {
    channel_id: String,
    webhook_url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(channel_id: impl Into<String>, webhook_url: String) -> Self {
        Self {
            channel_id: channel_id.into(),
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PrimaryChannel for WebhookChannel {
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn send_once(&self, body: &str) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "content": body,
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 429 || status.is_server_error() {
            Err(ChannelError::Transient(format!("HTTP {status}: {body}")))
        } else {
            Err(ChannelError::NonRetryable(format!("HTTP {status}: {body}")))
        }
    }
}

/// Long-form email channel over SMTP, via `lettre`'s async transport. HTML
/// body plus a plaintext fallback and the scan's JSON artifact attached.
pub struct SmtpChannel {
    channel_id: String,
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: lettre::message::Mailbox,
    to: Vec<lettre::message::Mailbox>,
}

impl SmtpChannel {
    pub fn new(
        channel_id: impl Into<String>,
        transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
        from: lettre::message::Mailbox,
        to: Vec<lettre::message::Mailbox>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            transport,
            from,
            to,
        }
    }
}

#[async_trait]
impl SecondaryChannel for SmtpChannel {
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn send_once(&self, payload: &SecondaryPayload) -> Result<(), ChannelError> {
        use lettre::message::{header::ContentType, Attachment, MultiPart, SinglePart};
        use lettre::AsyncTransport;

        if self.to.is_empty() {
            return Err(ChannelError::NonRetryable("no recipients configured".to_string()));
        }

        let attachment = Attachment::new("scan_results.json".to_string())
            .body(payload.json_attachment.clone(), ContentType::parse("application/json").unwrap());

        let body = MultiPart::mixed()
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(payload.text.clone()))
                    .singlepart(SinglePart::html(payload.html.clone())),
            )
            .singlepart(attachment);

        for recipient in &self.to {
            let message = lettre::Message::builder()
                .from(self.from.clone())
                .to(recipient.clone())
                .subject(&payload.subject)
                .multipart(body.clone())
                .map_err(|e| ChannelError::NonRetryable(format!("failed to build email: {e}")))?;

            self.transport.send(message).await.map_err(|e| {
                if e.is_permanent() {
                    ChannelError::NonRetryable(e.to_string())
                } else {
                    ChannelError::Transient(e.to_string())
                }
            })?;
        }

        Ok(())
    }
}
