//! Conversation engine: runs one inbound message end to end.
//!
//! Session lookup, routing, session write and delivery happen in sequence
//! inside a `turn` span. Delivery failures are logged but never undo the
//! state change.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info_span, warn};
use uuid::Uuid;

use super::replies;
use super::router::DialogueRouter;
use crate::channels::{Messenger, OutgoingReply};
use crate::error::DialogueError;
use crate::session::{Session, SessionStore};

/// Whether the reply reached the messenger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
    /// No reply was produced for this turn.
    Skipped,
}

/// What one turn did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    /// Flow label after the turn, `None` if the session ended.
    pub state: Option<&'static str>,
    pub reply: Option<OutgoingReply>,
    pub delivery: Delivery,
}

pub struct ConversationEngine {
    sessions: Arc<dyn SessionStore>,
    router: DialogueRouter,
    messenger: Arc<dyn Messenger>,
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        router: DialogueRouter,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            sessions,
            router,
            messenger,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Handle one message from `identity`.
    pub async fn handle_message(&self, identity: &str, text: &str) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", %turn_id, identity);
        self.run_turn(turn_id, identity, text).instrument(span).await
    }

    async fn run_turn(&self, turn_id: Uuid, identity: &str, text: &str) -> TurnOutcome {
        let today = self.router.slots().today();
        let session = self.sessions.get(identity).await;
        let from = session.as_ref().map(|s| s.flow.label()).unwrap_or("none");

        let result = self
            .router
            .step(identity, session.as_ref().map(|s| &s.flow), text, today)
            .await;

        let (state, reply) = match result {
            Ok(transition) => {
                let state = transition.next.as_ref().map(|f| f.label());
                match transition.next {
                    Some(flow) => {
                        let session = match session {
                            Some(mut existing) => {
                                existing.advance(flow);
                                existing
                            }
                            None => Session::new(identity, flow),
                        };
                        self.sessions.set(session).await;
                    }
                    None => {
                        self.sessions.delete(identity).await;
                    }
                }
                debug!(from, to = state.unwrap_or("none"), "Transition");
                (state, Some(transition.reply))
            }
            Err(DialogueError::Unroutable { reason, .. }) => {
                warn!(from, %reason, "Unroutable session, restarting");
                self.sessions.delete(identity).await;
                (None, Some(replies::restart_hint()))
            }
            Err(DialogueError::Database(e)) => {
                error!(from, error = %e, "Persistence failure, conversation dropped");
                self.sessions.delete(identity).await;
                (None, None)
            }
        };

        let delivery = match &reply {
            Some(reply) => self.deliver(identity, reply).await,
            None => Delivery::Skipped,
        };

        TurnOutcome {
            turn_id,
            state,
            reply,
            delivery,
        }
    }

    async fn deliver(&self, identity: &str, reply: &OutgoingReply) -> Delivery {
        match self.messenger.send(identity, reply).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                warn!(messenger = self.messenger.name(), error = %e, "Reply delivery failed");
                Delivery::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::Mutex;

    use crate::calendar::UnconfiguredCalendar;
    use crate::config::SchedulingConfig;
    use crate::dialogue::slots::SlotGenerator;
    use crate::error::{ChannelError, DatabaseError};
    use crate::session::{AppointmentStep, Flow, InMemorySessionStore};
    use crate::store::{
        Database, LibSqlBackend, NewAppointment, NewOrder, Product, StoredAppointment,
        StoredOrder, User,
    };

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, OutgoingReply)>>,
        fail: bool,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, identity: &str, reply: &OutgoingReply) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .await
                .push((identity.to_string(), reply.clone()));
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "offline".into(),
                });
            }
            Ok(())
        }
    }

    /// Every call fails.
    struct BrokenDatabase;

    fn broken() -> DatabaseError {
        DatabaseError::Query("disk on fire".into())
    }

    #[async_trait]
    impl Database for BrokenDatabase {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            Err(broken())
        }
        async fn list_products(&self) -> Result<Vec<Product>, DatabaseError> {
            Err(broken())
        }
        async fn get_user_by_phone(&self, _: &str) -> Result<Option<User>, DatabaseError> {
            Err(broken())
        }
        async fn create_user(&self, _: &str, _: &str, _: &str) -> Result<User, DatabaseError> {
            Err(broken())
        }
        async fn insert_order(&self, _: &NewOrder) -> Result<i64, DatabaseError> {
            Err(broken())
        }
        async fn orders_for_user(&self, _: i64) -> Result<Vec<StoredOrder>, DatabaseError> {
            Err(broken())
        }
        async fn insert_appointment(&self, _: &NewAppointment) -> Result<i64, DatabaseError> {
            Err(broken())
        }
        async fn appointments_for_user(
            &self,
            _: i64,
        ) -> Result<Vec<StoredAppointment>, DatabaseError> {
            Err(broken())
        }
    }

    const ID: &str = "+34600000000";

    fn engine_with(
        db: Arc<dyn Database>,
        messenger: Arc<RecordingMessenger>,
    ) -> (ConversationEngine, Arc<InMemorySessionStore>) {
        let sessions = InMemorySessionStore::new();
        let router = DialogueRouter::new(
            db,
            Arc::new(UnconfiguredCalendar),
            SlotGenerator::new(&SchedulingConfig::default()),
            "Cita",
        );
        (
            ConversationEngine::new(sessions.clone(), router, messenger),
            sessions,
        )
    }

    async fn engine(
        messenger: Arc<RecordingMessenger>,
    ) -> (ConversationEngine, Arc<InMemorySessionStore>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        engine_with(db, messenger)
    }

    #[tokio::test]
    async fn first_message_creates_session_and_sends_one_menu() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (engine, sessions) = engine(messenger.clone()).await;

        let outcome = engine.handle_message(ID, "hola").await;
        assert_eq!(outcome.state, Some("await_choice"));
        assert_eq!(outcome.delivery, Delivery::Sent);

        let session = sessions.get(ID).await.unwrap();
        assert_eq!(session.flow, Flow::AwaitChoice);

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ID);
        assert!(sent[0].1.to_text().contains("Pedir"));
    }

    #[tokio::test]
    async fn order_conversation_end_to_end() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (engine, sessions) = engine(messenger.clone()).await;

        engine.handle_message(ID, "hola").await;
        let outcome = engine.handle_message(ID, "1").await;
        assert_eq!(outcome.state, Some("order"));

        let outcome = engine.handle_message(ID, "asdf").await;
        assert_eq!(outcome.state, Some("order"));

        let outcome = engine.handle_message(ID, "2 gafas").await;
        assert_eq!(outcome.state, None);
        assert!(outcome.reply.unwrap().to_text().contains("Total: 100"));
        assert!(sessions.get(ID).await.is_none());
        assert_eq!(messenger.sent.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_transition() {
        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..Default::default()
        });
        let (engine, sessions) = engine(messenger).await;

        let outcome = engine.handle_message(ID, "hola").await;
        assert!(matches!(outcome.delivery, Delivery::Failed(_)));
        assert_eq!(sessions.get(ID).await.unwrap().flow, Flow::AwaitChoice);
    }

    #[tokio::test]
    async fn unconfigured_calendar_ends_booking() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (engine, sessions) = engine(messenger.clone()).await;

        engine.handle_message(ID, "hola").await;
        engine.handle_message(ID, "citas").await;
        let outcome = engine.handle_message(ID, "1").await;
        assert_eq!(outcome.state, Some("appointment.ask_time"));

        let outcome = engine.handle_message(ID, "1").await;
        assert_eq!(outcome.state, None);
        assert_eq!(outcome.reply, Some(replies::booking_failed()));
        assert!(sessions.get(ID).await.is_none());
    }

    #[tokio::test]
    async fn persistence_failure_drops_session_silently() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (engine, sessions) = engine_with(Arc::new(BrokenDatabase), messenger.clone());
        sessions.set(Session::new(ID, Flow::Order)).await;

        let outcome = engine.handle_message(ID, "2 gafas").await;
        assert_eq!(outcome.state, None);
        assert_eq!(outcome.reply, None);
        assert_eq!(outcome.delivery, Delivery::Skipped);
        assert!(sessions.get(ID).await.is_none());
        assert!(messenger.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unroutable_session_restarts() {
        let messenger = Arc::new(RecordingMessenger::default());
        let sessions = InMemorySessionStore::new();
        // Closing equals opening, so a chosen day has no slots.
        let config = SchedulingConfig {
            closing: SchedulingConfig::default().opening,
            ..SchedulingConfig::default()
        };
        let router = DialogueRouter::new(
            Arc::new(LibSqlBackend::new_memory().await.unwrap()),
            Arc::new(UnconfiguredCalendar),
            SlotGenerator::new(&config),
            "Cita",
        );
        let engine = ConversationEngine::new(sessions.clone(), router, messenger);

        let date = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();
        sessions
            .set(Session::new(
                ID,
                Flow::Appointment {
                    week_offset: 0,
                    step: AppointmentStep::AskDate {
                        offered: vec![date],
                    },
                },
            ))
            .await;

        let outcome = engine.handle_message(ID, "1").await;
        assert_eq!(outcome.state, None);
        assert_eq!(outcome.reply, Some(replies::restart_hint()));
        assert!(sessions.get(ID).await.is_none());
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (engine, sessions) = engine(messenger).await;

        engine.handle_message("+1", "hola").await;
        engine.handle_message("+2", "hola").await;
        engine.handle_message("+2", "1").await;

        assert_eq!(sessions.get("+1").await.unwrap().flow, Flow::AwaitChoice);
        assert_eq!(sessions.get("+2").await.unwrap().flow, Flow::Order);
        assert_eq!(sessions.len().await, 2);
    }
}
