//! Twilio WhatsApp transport.
//!
//! Inbound messages arrive as a form-encoded webhook; replies go out through
//! the Messages REST resource. Twilio has no interactive lists on this path,
//! so every reply is sent as numbered text.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::messenger::{Messenger, split_message};
use super::reply::OutgoingReply;
use crate::error::ChannelError;

/// Maximum body length for a WhatsApp message sent through Twilio.
const TWILIO_MAX_MESSAGE_LENGTH: usize = 1600;

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Address prefix Twilio puts on WhatsApp numbers.
pub const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Empty TwiML document used to acknowledge a webhook without replying inline.
pub const EMPTY_TWIML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#;

/// Form fields of an inbound Twilio webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioInbound {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    /// Id of the tapped row when the message answers a list picker.
    ///
    /// `TwilioMessenger` only sends numbered text, so this is set only when
    /// the sender is configured with a Content API list-picker template whose
    /// item ids use the same `date:` / `time:` / `0` row ids.
    #[serde(rename = "ListId", default)]
    pub list_id: Option<String>,
}

impl TwilioInbound {
    /// Session key: the sender address without the channel prefix.
    pub fn identity(&self) -> &str {
        strip_channel_prefix(&self.from)
    }

    /// The row id of a tapped list item, or the typed text.
    pub fn text(&self) -> &str {
        match self.list_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => &self.body,
        }
    }
}

pub fn strip_channel_prefix(address: &str) -> &str {
    address.strip_prefix(WHATSAPP_PREFIX).unwrap_or(address).trim()
}

/// Sends replies through the Twilio Messages API.
pub struct TwilioMessenger {
    account_sid: String,
    auth_token: SecretString,
    from: String,
    base_url: String,
    client: reqwest::Client,
}

impl TwilioMessenger {
    pub fn new(account_sid: String, auth_token: SecretString, from: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from,
            base_url: TWILIO_API.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }

    async fn send_chunk(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let form = [("From", self.from.as_str()), ("To", to), ("Body", body)];
        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "twilio".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                name: "twilio".into(),
                reason: resp.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "twilio".into(),
                reason: format!("Messages API returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, identity: &str, reply: &OutgoingReply) -> Result<(), ChannelError> {
        let to = format!("{WHATSAPP_PREFIX}{identity}");
        for chunk in split_message(&reply.to_text(), TWILIO_MAX_MESSAGE_LENGTH) {
            self.send_chunk(&to, &chunk).await?;
        }
        tracing::debug!(to = identity, "Twilio reply sent");
        Ok(())
    }
}
