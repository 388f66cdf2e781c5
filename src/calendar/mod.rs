//! Calendar reservation boundary.

pub mod google;

pub use google::GoogleCalendar;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::CalendarError;

/// An event to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl CalendarEvent {
    /// IANA name of the event timezone.
    pub fn time_zone(&self) -> &'static str {
        self.start.timezone().name()
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedEvent {
    /// Provider-side event id, when the provider returns one.
    pub id: Option<String>,
}

/// Commits a chosen slot to an external calendar. No retries.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn commit(&self, event: &CalendarEvent) -> Result<CommittedEvent, CalendarError>;
}

/// Used when no calendar is configured; every commit fails.
#[derive(Debug, Default)]
pub struct UnconfiguredCalendar;

#[async_trait]
impl CalendarBackend for UnconfiguredCalendar {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn commit(&self, event: &CalendarEvent) -> Result<CommittedEvent, CalendarError> {
        tracing::warn!(summary = %event.summary, "No calendar configured, cannot book");
        Err(CalendarError::NotConfigured)
    }
}
