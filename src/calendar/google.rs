//! Google Calendar v3 event insertion.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{CalendarBackend, CalendarEvent, CommittedEvent};
use crate::config::CalendarConfig;
use crate::error::CalendarError;

const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Inserts events into one Google calendar with a bearer token.
pub struct GoogleCalendar {
    calendar_id: String,
    access_token: SecretString,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: Option<String>,
}

impl GoogleCalendar {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            calendar_id: config.calendar_id.clone(),
            access_token: config.access_token.clone(),
            base_url: GOOGLE_CALENDAR_API.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, self.calendar_id)
    }

    fn event_body(event: &CalendarEvent) -> serde_json::Value {
        serde_json::json!({
            "summary": event.summary,
            "start": {
                "dateTime": event.start.to_rfc3339(),
                "timeZone": event.time_zone(),
            },
            "end": {
                "dateTime": event.end.to_rfc3339(),
                "timeZone": event.time_zone(),
            },
        })
    }
}

#[async_trait]
impl CalendarBackend for GoogleCalendar {
    fn name(&self) -> &str {
        "google"
    }

    async fn commit(&self, event: &CalendarEvent) -> Result<CommittedEvent, CalendarError> {
        let resp = self
            .client
            .post(self.events_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&Self::event_body(event))
            .send()
            .await
            .map_err(|e| CalendarError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let inserted: InsertedEvent = resp
            .json()
            .await
            .map_err(|e| CalendarError::RequestFailed(format!("Invalid response body: {e}")))?;

        tracing::info!(
            event_id = inserted.id.as_deref().unwrap_or("-"),
            start = %event.start,
            "Calendar event created"
        );
        Ok(CommittedEvent { id: inserted.id })
    }
}
