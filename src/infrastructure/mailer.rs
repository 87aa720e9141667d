use crate::domain::notification::{EmailMessage, NotifyError};
use crate::domain::ports::Mailer;
use async_trait::async_trait;

/// Mailer that records outgoing messages in the log instead of sending them.
/// Bodies are not logged since they can carry one-time codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotifyError> {
        if message.to.trim().is_empty() {
            return Err(NotifyError::Delivery("recipient address is empty".to_string()));
        }
        tracing::info!(to = %message.to, subject = %message.subject, "email dispatched");
        Ok(())
    }
}
