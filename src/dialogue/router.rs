//! Dialogue router: one transition of the per-identity state machine.
//!
//! | Current | Input | Next |
//! |---|---|---|
//! | none | anything | `AwaitChoice` (menu) |
//! | `AwaitChoice` | "2" / "citas" | `AskDate` week 0 |
//! | `AwaitChoice` | "1" / "pedir" | `Order` |
//! | `AwaitChoice` | other | unchanged (reprompt) |
//! | any appointment step | "menu" | deleted (reset hint) |
//! | `AskDate` | 1..N or date row | `AskTime` for that date |
//! | `AskDate` | "0" | `AskDate`, next week |
//! | `AskDate` | other | unchanged (same list) |
//! | `AskTime` | 1..N or time row | deleted after a booking attempt |
//! | `AskTime` | "0" | `AskDate`, same week |
//! | `AskTime` | other | unchanged (same list) |
//! | `Order` | catalog match | deleted after persisting the order |
//! | `Order` | no match | unchanged (catalog reprompt) |

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use super::parser::parse_order;
use super::replies::{self, parse_date_row_id, parse_time_row_id};
use super::slots::SlotGenerator;
use crate::calendar::{CalendarBackend, CalendarEvent};
use crate::channels::{NAV_ROW_ID, OutgoingReply};
use crate::error::DialogueError;
use crate::session::{AppointmentStep, Flow};
use crate::store::{Database, NewAppointment, NewOrder};

/// Result of one routed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub reply: OutgoingReply,
    /// `None` means the session ends.
    pub next: Option<Flow>,
}

impl Transition {
    fn stay(flow: Flow, reply: OutgoingReply) -> Self {
        Self {
            reply,
            next: Some(flow),
        }
    }

    fn end(reply: OutgoingReply) -> Self {
        Self { reply, next: None }
    }
}

/// How a message answers a selection list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection<T> {
    /// The "0" navigation entry.
    Navigate,
    Item(T),
    Invalid,
}

/// Resolve `input` against the list that was last offered.
///
/// Accepts a 1-based number, "0", or a row id that decodes to an offered item.
fn select<T: Copy + PartialEq>(
    input: &str,
    offered: &[T],
    decode_id: impl Fn(&str) -> Option<T>,
) -> Selection<T> {
    if input == NAV_ROW_ID {
        return Selection::Navigate;
    }
    if let Ok(index) = input.parse::<usize>() {
        return match index.checked_sub(1).and_then(|i| offered.get(i)) {
            Some(item) => Selection::Item(*item),
            None => Selection::Invalid,
        };
    }
    match decode_id(input) {
        Some(item) if offered.contains(&item) => Selection::Item(item),
        _ => Selection::Invalid,
    }
}

fn is_reset(input: &str) -> bool {
    input.eq_ignore_ascii_case("menu")
}

fn wants_appointment(input: &str) -> bool {
    input == "2" || input.to_lowercase().contains("citas")
}

fn wants_order(input: &str) -> bool {
    input == "1" || input.to_lowercase().contains("pedir")
}

/// Computes the next state and reply for one inbound message.
pub struct DialogueRouter {
    db: Arc<dyn Database>,
    calendar: Arc<dyn CalendarBackend>,
    slots: SlotGenerator,
    summary_prefix: String,
}

impl DialogueRouter {
    pub fn new(
        db: Arc<dyn Database>,
        calendar: Arc<dyn CalendarBackend>,
        slots: SlotGenerator,
        summary_prefix: impl Into<String>,
    ) -> Self {
        Self {
            db,
            calendar,
            slots,
            summary_prefix: summary_prefix.into(),
        }
    }

    pub fn slots(&self) -> &SlotGenerator {
        &self.slots
    }

    /// Route `text` from `identity` given its current flow.
    ///
    /// `today` is the business-local date used for week 0.
    pub async fn step(
        &self,
        identity: &str,
        current: Option<&Flow>,
        text: &str,
        today: NaiveDate,
    ) -> Result<Transition, DialogueError> {
        let input = text.trim();

        let Some(flow) = current else {
            return Ok(Transition::stay(Flow::AwaitChoice, replies::menu()));
        };

        match flow {
            Flow::AwaitChoice => self.on_choice(input, today).await,
            Flow::Order => self.on_order(identity, input).await,
            Flow::Appointment { .. } if is_reset(input) => {
                debug!(identity, "Conversation reset from appointment flow");
                Ok(Transition::end(replies::reset_hint()))
            }
            Flow::Appointment {
                week_offset,
                step: AppointmentStep::AskDate { offered },
            } => self.on_date(identity, *week_offset, offered, input, today),
            Flow::Appointment {
                week_offset,
                step: AppointmentStep::AskTime { date, offered },
            } => {
                self.on_time(identity, *week_offset, *date, offered, input, today)
                    .await
            }
        }
    }

    async fn on_choice(&self, input: &str, today: NaiveDate) -> Result<Transition, DialogueError> {
        if wants_appointment(input) {
            return Ok(self.ask_date(0, today));
        }
        if wants_order(input) {
            let catalog = self.db.list_products().await?;
            return Ok(Transition::stay(
                Flow::Order,
                replies::order_prompt(&catalog),
            ));
        }
        Ok(Transition::stay(Flow::AwaitChoice, replies::menu_reprompt()))
    }

    async fn on_order(&self, identity: &str, input: &str) -> Result<Transition, DialogueError> {
        let catalog = self.db.list_products().await?;

        let Some(intent) = parse_order(input, &catalog) else {
            debug!(identity, "No catalog product in order message");
            return Ok(Transition::stay(
                Flow::Order,
                replies::catalog_reprompt(&catalog),
            ));
        };

        let user = self.db.ensure_user(identity).await?;
        let order_id = self
            .db
            .insert_order(&NewOrder {
                order_date: Utc::now(),
                amount: intent.quantity,
                message: input.to_string(),
                user_id: user.id,
                product_id: intent.product_id,
            })
            .await?;

        info!(
            order_id,
            user_id = user.id,
            product = %intent.product_name,
            quantity = intent.quantity,
            total = %intent.total(),
            "Order persisted"
        );
        Ok(Transition::end(replies::order_confirmation(&intent)))
    }

    fn ask_date(&self, week_offset: u32, today: NaiveDate) -> Transition {
        let offered = self.slots.dates(today, week_offset);
        let reply = replies::date_list(&offered, false);
        Transition::stay(
            Flow::Appointment {
                week_offset,
                step: AppointmentStep::AskDate { offered },
            },
            reply,
        )
    }

    fn on_date(
        &self,
        identity: &str,
        week_offset: u32,
        offered: &[NaiveDate],
        input: &str,
        today: NaiveDate,
    ) -> Result<Transition, DialogueError> {
        match select(input, offered, parse_date_row_id) {
            Selection::Navigate => {
                let next_week = week_offset.checked_add(1).ok_or_else(|| {
                    DialogueError::Unroutable {
                        identity: identity.to_string(),
                        reason: "week offset overflow".into(),
                    }
                })?;
                Ok(self.ask_date(next_week, today))
            }
            Selection::Item(date) => {
                let times: Vec<NaiveTime> = self
                    .slots
                    .slots(date)
                    .iter()
                    .map(|s| s.start_time())
                    .collect();
                if times.is_empty() {
                    return Err(DialogueError::Unroutable {
                        identity: identity.to_string(),
                        reason: format!("no slots on {date}"),
                    });
                }
                let reply = replies::time_list(date, &times, false);
                Ok(Transition::stay(
                    Flow::Appointment {
                        week_offset,
                        step: AppointmentStep::AskTime {
                            date,
                            offered: times,
                        },
                    },
                    reply,
                ))
            }
            Selection::Invalid => Ok(Transition::stay(
                Flow::Appointment {
                    week_offset,
                    step: AppointmentStep::AskDate {
                        offered: offered.to_vec(),
                    },
                },
                replies::date_list(offered, true),
            )),
        }
    }

    async fn on_time(
        &self,
        identity: &str,
        week_offset: u32,
        date: NaiveDate,
        offered: &[NaiveTime],
        input: &str,
        today: NaiveDate,
    ) -> Result<Transition, DialogueError> {
        match select(input, offered, parse_time_row_id) {
            Selection::Navigate => Ok(self.ask_date(week_offset, today)),
            Selection::Item(time) => self.book(identity, date, time).await,
            Selection::Invalid => Ok(Transition::stay(
                Flow::Appointment {
                    week_offset,
                    step: AppointmentStep::AskTime {
                        date,
                        offered: offered.to_vec(),
                    },
                },
                replies::time_list(date, offered, true),
            )),
        }
    }

    /// Commit the chosen slot. The session ends whatever the outcome.
    async fn book(
        &self,
        identity: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Transition, DialogueError> {
        let slot = self
            .slots
            .slot_at(date, time)
            .ok_or_else(|| DialogueError::Unroutable {
                identity: identity.to_string(),
                reason: format!("{date} {time} does not exist in the business timezone"),
            })?;

        let user = self.db.ensure_user(identity).await?;
        let event = CalendarEvent {
            summary: format!("{} - {}", self.summary_prefix, identity),
            start: slot.start,
            end: slot.end,
        };

        let committed = match self.calendar.commit(&event).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(
                    identity,
                    calendar = self.calendar.name(),
                    start = %slot.start,
                    error = %e,
                    "Calendar commit failed"
                );
                return Ok(Transition::end(replies::booking_failed()));
            }
        };

        let record = NewAppointment {
            user_id: user.id,
            starts_at: slot.start.with_timezone(&Utc),
            ends_at: slot.end.with_timezone(&Utc),
            summary: event.summary.clone(),
            calendar_event_id: committed.id,
        };
        // The calendar already holds the event, so the customer is still told.
        match self.db.insert_appointment(&record).await {
            Ok(id) => info!(appointment_id = id, user_id = user.id, start = %slot.start, "Appointment booked"),
            Err(e) => tracing::error!(
                user_id = user.id,
                start = %slot.start,
                error = %e,
                "Appointment booked but not recorded"
            ),
        }

        Ok(Transition::end(replies::booking_confirmed(&slot)))
    }
}
