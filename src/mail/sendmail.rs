use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;
const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    InvalidRecipient(String),

    #[error("Failed after {attempts} attempts: {reason}")]
    Delivery { attempts: u32, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Substitute `{{key}}` placeholders in an HTML template. Values are
/// escaped, so member-supplied text can never add markup.
pub fn render_template(template: &str, placeholders: &[(&str, &str)]) -> String {
    let mut html = template.to_string();
    for (key, value) in placeholders {
        html = html.replace(&format!("{{{{{}}}}}", key), &ammonia::clean_text(value));
    }
    html
}

fn check_recipient(to_email: &str) -> Result<(), MailError> {
    if to_email.is_empty() || !to_email.contains('@') {
        return Err(MailError::InvalidRecipient(to_email.to_string()));
    }
    Ok(())
}

/// Delivers through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from_email: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from_email: String) -> Self {
        ResendMailer {
            http: reqwest::Client::new(),
            api_key,
            from_email,
        }
    }

    async fn send_via_resend(&self, mail: &OutgoingMail) -> Result<String, String> {
        let request_body = json!({
            "from": self.from_email,
            "to": mail.to,
            "subject": mail.subject,
            "html": mail.html,
        });

        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .unwrap_or_else(|_| "No response body".to_string());

        if status.is_success() {
            let id = serde_json::from_str::<serde_json::Value>(&response_text)
                .ok()
                .and_then(|body| body.get("id").and_then(|v| v.as_str()).map(str::to_string))
                .unwrap_or_else(|| "success".to_string());
            Ok(id)
        } else {
            Err(format!("Resend API error ({}): {}", status.as_u16(), response_text))
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        check_recipient(&mail.to)?;

        let mut last_error = String::from("Unknown email sending error");
        for attempt in 1..=MAX_RETRIES {
            match self.send_via_resend(&mail).await {
                Ok(email_id) => {
                    tracing::info!("Email sent to {} (id: {})", mail.to, email_id);
                    return Ok(());
                }
                Err(e) => {
                    last_error = e;
                    if attempt < MAX_RETRIES {
                        let delay = RETRY_DELAY_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Email send attempt {} failed for {}. Retrying in {}ms...",
                            attempt,
                            mail.to,
                            delay
                        );
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        tracing::error!("Email failed for {}: {}", mail.to, last_error);
        Err(MailError::Delivery {
            attempts: MAX_RETRIES,
            reason: last_error,
        })
    }
}

/// Writes mail to the log instead of sending it. Used when no mail API key
/// is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        check_recipient(&mail.to)?;
        tracing::warn!(
            to = %mail.to,
            subject = %mail.subject,
            "Mail delivery is not configured; logging message instead:\n{}",
            mail.html
        );
        Ok(())
    }
}
