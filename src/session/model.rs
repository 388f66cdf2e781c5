//! Conversation state for a single identity.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level branch of a live conversation.
///
/// "No session" is the initial state and is represented by the absence of a
/// [`Session`] in the store, so it has no variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum Flow {
    /// The menu was sent; waiting for "1"/"pedir" or "2"/"citas".
    AwaitChoice,
    /// Waiting for a "<quantity> <product>" message.
    Order,
    /// Booking an appointment.
    Appointment {
        /// 0 = rest of the current week, n = n weeks ahead.
        week_offset: u32,
        step: AppointmentStep,
    },
}

/// Sub-state of the appointment flow.
///
/// Each step stores the exact list it last offered, so a numeric answer
/// always resolves against what the user actually saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum AppointmentStep {
    AskDate { offered: Vec<NaiveDate> },
    AskTime { date: NaiveDate, offered: Vec<NaiveTime> },
}

impl Flow {
    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitChoice => "await_choice",
            Self::Order => "order",
            Self::Appointment {
                step: AppointmentStep::AskDate { .. },
                ..
            } => "appointment.ask_date",
            Self::Appointment {
                step: AppointmentStep::AskTime { .. },
                ..
            } => "appointment.ask_time",
        }
    }
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutable per-identity conversation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub flow: Flow,
    pub created_at: DateTime<Utc>,
    /// Bumped on every write; drives idle eviction.
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: impl Into<String>, flow: Flow) -> Self {
        let now = Utc::now();
        Self {
            identity: identity.into(),
            flow,
            created_at: now,
            last_activity: now,
        }
    }

    /// Replace the flow and mark the session as active.
    pub fn advance(&mut self, flow: Flow) {
        self.flow = flow;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Whether the session has been idle for longer than `max_idle`.
    pub fn is_idle(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> bool {
        now - self.last_activity > max_idle
    }
}
