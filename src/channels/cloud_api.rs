//! WhatsApp Business Cloud API transport.
//!
//! Replies are sent as interactive lists when they fit WhatsApp's limits and
//! as text otherwise. Inbound notifications carry either typed text or the
//! id of a tapped list row.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::messenger::{Messenger, split_message};
use super::reply::{ListSection, OutgoingReply};
use crate::error::ChannelError;

const GRAPH_API: &str = "https://graph.facebook.com/v20.0";

const MAX_TEXT_LENGTH: usize = 4096;
const MAX_LIST_ROWS: usize = 10;
const MAX_LIST_BODY: usize = 1024;
const MAX_BUTTON_TITLE: usize = 20;
const MAX_ROW_TITLE: usize = 24;
const MAX_SECTION_TITLE: usize = 24;
const MAX_ROW_DESCRIPTION: usize = 72;

// ── Inbound ─────────────────────────────────────────────────────────────

/// Webhook notification body.
#[derive(Debug, Default, Deserialize)]
pub struct CloudWebhook {
    #[serde(default)]
    pub entry: Vec<CloudEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudEntry {
    #[serde(default)]
    pub changes: Vec<CloudChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudChange {
    #[serde(default)]
    pub value: CloudChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloudChangeValue {
    #[serde(default)]
    pub messages: Vec<CloudMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CloudMessage {
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<CloudText>,
    pub interactive: Option<CloudInteractive>,
}

#[derive(Debug, Deserialize)]
pub struct CloudText {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudInteractive {
    pub list_reply: Option<CloudReplyId>,
    pub button_reply: Option<CloudReplyId>,
}

#[derive(Debug, Deserialize)]
pub struct CloudReplyId {
    pub id: String,
}

/// One routable inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub identity: String,
    pub text: String,
}

impl CloudWebhook {
    /// Text and list-reply messages in delivery order. Status updates and
    /// unsupported message types are skipped.
    pub fn inbound_texts(&self) -> Vec<InboundText> {
        self.entry
            .iter()
            .flat_map(|e| &e.changes)
            .flat_map(|c| &c.value.messages)
            .filter_map(|m| {
                let text = m.text_content()?;
                Some(InboundText {
                    identity: m.from.clone(),
                    text,
                })
            })
            .collect()
    }
}

impl CloudMessage {
    fn text_content(&self) -> Option<String> {
        if let Some(interactive) = &self.interactive {
            let chosen = interactive
                .list_reply
                .as_ref()
                .or(interactive.button_reply.as_ref());
            if let Some(reply) = chosen {
                return Some(reply.id.clone());
            }
        }
        match &self.text {
            Some(text) => Some(text.body.clone()),
            None => {
                tracing::debug!(kind = %self.kind, "Skipping unsupported Cloud API message");
                None
            }
        }
    }
}

/// Answer the subscription handshake: returns the challenge when the mode
/// is `subscribe` and the token matches.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected: &SecretString,
) -> Option<String> {
    if mode != Some("subscribe") {
        return None;
    }
    if token? != expected.expose_secret() {
        return None;
    }
    challenge.map(str::to_string)
}

// ── Outbound ────────────────────────────────────────────────────────────

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Whether a list can be sent natively.
fn fits_list(body: &str, reply: &OutgoingReply) -> bool {
    let rows = reply.row_count();
    rows > 0 && rows <= MAX_LIST_ROWS && body.chars().count() <= MAX_LIST_BODY
}

fn list_payload(to: &str, body: &str, button: &str, sections: &[ListSection]) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = sections
        .iter()
        .filter(|s| !s.rows.is_empty())
        .map(|s| {
            let rows: Vec<serde_json::Value> = s
                .rows
                .iter()
                .map(|r| {
                    let mut row = serde_json::json!({
                        "id": r.id,
                        "title": truncate(&r.title, MAX_ROW_TITLE),
                    });
                    if let Some(description) = &r.description {
                        row["description"] =
                            serde_json::Value::String(truncate(description, MAX_ROW_DESCRIPTION));
                    }
                    row
                })
                .collect();
            serde_json::json!({
                "title": truncate(&s.title, MAX_SECTION_TITLE),
                "rows": rows,
            })
        })
        .collect();

    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "body": { "text": body },
            "action": {
                "button": truncate(button, MAX_BUTTON_TITLE),
                "sections": sections,
            },
        },
    })
}

fn text_payload(to: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": { "body": body },
    })
}

/// Sends replies through the Graph API `messages` endpoint.
pub struct CloudApiMessenger {
    access_token: SecretString,
    phone_number_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl CloudApiMessenger {
    pub fn new(access_token: SecretString, phone_number_id: String) -> Self {
        Self {
            access_token,
            phone_number_id,
            base_url: GRAPH_API.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }

    /// Payloads to post for `reply`, in order.
    fn payloads(identity: &str, reply: &OutgoingReply) -> Vec<serde_json::Value> {
        match reply {
            OutgoingReply::List {
                body,
                button,
                sections,
            } if fits_list(body, reply) => vec![list_payload(identity, body, button, sections)],
            _ => split_message(&reply.to_text(), MAX_TEXT_LENGTH)
                .iter()
                .map(|chunk| text_payload(identity, chunk))
                .collect(),
        }
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp-cloud".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                name: "whatsapp-cloud".into(),
                reason: resp.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp-cloud".into(),
                reason: format!("messages endpoint returned {status}: {err}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for CloudApiMessenger {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    async fn send(&self, identity: &str, reply: &OutgoingReply) -> Result<(), ChannelError> {
        for payload in Self::payloads(identity, reply) {
            self.post(&payload).await?;
        }
        tracing::debug!(to = identity, "Cloud API reply sent");
        Ok(())
    }
}
