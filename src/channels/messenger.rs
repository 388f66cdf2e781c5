//! Messenger trait and the transport-independent pieces.

use std::sync::Arc;

use async_trait::async_trait;

use super::reply::OutgoingReply;
use super::{CloudApiMessenger, TwilioMessenger};
use crate::config::MessagingProvider;
use crate::error::ChannelError;

/// Delivers replies to an identity.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Channel name for logs and errors.
    fn name(&self) -> &str;

    /// Send one reply. Errors are reported to the caller, never retried here.
    async fn send(&self, identity: &str, reply: &OutgoingReply) -> Result<(), ChannelError>;
}

/// Writes replies to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    fn name(&self) -> &str {
        "log-only"
    }

    async fn send(&self, identity: &str, reply: &OutgoingReply) -> Result<(), ChannelError> {
        tracing::info!(to = identity, body = %reply.to_text(), "Reply (not delivered)");
        Ok(())
    }
}

/// Build the messenger for the configured provider.
pub fn build_messenger(provider: &MessagingProvider) -> Arc<dyn Messenger> {
    match provider {
        MessagingProvider::Twilio {
            account_sid,
            auth_token,
            from,
        } => Arc::new(TwilioMessenger::new(
            account_sid.clone(),
            auth_token.clone(),
            from.clone(),
        )),
        MessagingProvider::CloudApi {
            access_token,
            phone_number_id,
            ..
        } => Arc::new(CloudApiMessenger::new(
            access_token.clone(),
            phone_number_id.clone(),
        )),
        MessagingProvider::LogOnly => Arc::new(LogMessenger),
    }
}

/// Split `text` into chunks of at most `max_chars` characters, preferring
/// line breaks, then spaces.
pub(crate) fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
