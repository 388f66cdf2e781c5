//! Integration tests for the webhook server.
//!
//! Each test spins up the Axum app on a random port with an in-memory
//! database, a recording calendar and a recording messenger, then drives
//! whole conversations over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, TimeDelta};
use secrecy::SecretString;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use shop_assist::calendar::{CalendarBackend, CalendarEvent, CommittedEvent};
use shop_assist::channels::{Messenger, OutgoingReply};
use shop_assist::config::SchedulingConfig;
use shop_assist::dialogue::{ConversationEngine, DialogueRouter, SlotGenerator};
use shop_assist::error::{CalendarError, ChannelError};
use shop_assist::session::{Flow, InMemorySessionStore, SessionStore};
use shop_assist::store::{Database, LibSqlBackend};
use shop_assist::webhook::{AppState, webhook_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const TWILIO_FROM: &str = "whatsapp:+34600000000";
const IDENTITY: &str = "+34600000000";

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<(String, OutgoingReply)>>,
}

impl RecordingMessenger {
    async fn last(&self) -> OutgoingReply {
        self.sent.lock().await.last().unwrap().1.clone()
    }

    async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
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
        Ok(())
    }
}

struct RecordingCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    fail: bool,
}

#[async_trait]
impl CalendarBackend for RecordingCalendar {
    fn name(&self) -> &str {
        "recording"
    }

    async fn commit(&self, event: &CalendarEvent) -> Result<CommittedEvent, CalendarError> {
        self.events.lock().await.push(event.clone());
        if self.fail {
            return Err(CalendarError::Rejected {
                status: 409,
                body: "conflict".into(),
            });
        }
        Ok(CommittedEvent {
            id: Some("evt-42".into()),
        })
    }
}

struct Harness {
    base: String,
    client: reqwest::Client,
    db: Arc<LibSqlBackend>,
    sessions: Arc<InMemorySessionStore>,
    messenger: Arc<RecordingMessenger>,
    calendar: Arc<RecordingCalendar>,
}

/// Start the webhook server on a random port.
async fn start_server(fail_calendar: bool) -> Harness {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let sessions = InMemorySessionStore::new();
    let messenger = Arc::new(RecordingMessenger::default());
    let calendar = Arc::new(RecordingCalendar {
        events: Mutex::new(Vec::new()),
        fail: fail_calendar,
    });

    let router = DialogueRouter::new(
        db.clone(),
        calendar.clone(),
        SlotGenerator::new(&SchedulingConfig::default()),
        "Cita",
    );
    let engine = Arc::new(ConversationEngine::new(
        sessions.clone(),
        router,
        messenger.clone(),
    ));
    let app = webhook_routes(AppState {
        engine,
        verify_token: Some(SecretString::from("verify-me")),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        db,
        sessions,
        messenger,
        calendar,
    }
}

impl Harness {
    /// Send a Twilio-style form message and assert the empty TwiML ack.
    async fn twilio(&self, body: &str) {
        let resp = self
            .client
            .post(format!("{}/webhook", self.base))
            .form(&[("From", TWILIO_FROM), ("Body", body)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().contains("<Response></Response>"));
    }

    /// Send a Cloud API notification for one message.
    async fn cloud(&self, message: Value) {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"field": "messages", "value": {"messages": [message]}}]}]
        });
        let resp = self
            .client
            .post(format!("{}/webhook/whatsapp", self.base))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    async fn flow(&self, identity: &str) -> Option<Flow> {
        self.sessions.get(identity).await.map(|s| s.flow)
    }
}

fn cloud_text(from: &str, body: &str) -> Value {
    serde_json::json!({"from": from, "id": "wamid.1", "type": "text", "text": {"body": body}})
}

fn cloud_list_reply(from: &str, id: &str) -> Value {
    serde_json::json!({
        "from": from,
        "id": "wamid.2",
        "type": "interactive",
        "interactive": {"type": "list_reply", "list_reply": {"id": id, "title": "x"}}
    })
}

#[tokio::test]
async fn order_conversation_over_twilio() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(false).await;

        h.twilio("hola").await;
        assert_eq!(h.flow(IDENTITY).await, Some(Flow::AwaitChoice));
        let menu = h.messenger.last().await.to_text();
        assert!(menu.contains("Pedir") && menu.contains("Citas"));

        h.twilio("pedir").await;
        assert_eq!(h.flow(IDENTITY).await, Some(Flow::Order));

        h.twilio("asdf").await;
        assert_eq!(h.flow(IDENTITY).await, Some(Flow::Order));
        let catalog = h.messenger.last().await.to_text();
        assert!(catalog.contains("gafas: 50"));
        assert!(catalog.contains("lentillas: 20"));

        h.twilio("2 gafas").await;
        assert_eq!(h.flow(IDENTITY).await, None);
        assert!(h.messenger.last().await.to_text().contains("Total: 100"));
        assert_eq!(h.messenger.count().await, 4);

        let user = h.db.get_user_by_phone(IDENTITY).await.unwrap().unwrap();
        let orders = h.db.orders_for_user(user.id).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].amount, 2);
        assert_eq!(orders[0].product_id, 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn appointment_conversation_over_cloud_api() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(false).await;
        let wa_id = "34600000000";

        h.cloud(cloud_text(wa_id, "hola")).await;
        h.cloud(cloud_text(wa_id, "citas")).await;
        let Some(Flow::Appointment { week_offset: 0, .. }) = h.flow(wa_id).await else {
            panic!("expected week 0 date list");
        };
        let dates = h.messenger.last().await;
        let week0_rows = dates.row_count();
        assert!((2..=8).contains(&week0_rows));

        // Page forward, then tap the first day of next week.
        h.cloud(cloud_list_reply(wa_id, "0")).await;
        let Some(Flow::Appointment { week_offset: 1, .. }) = h.flow(wa_id).await else {
            panic!("expected week 1");
        };
        let next_week = h.messenger.last().await;
        assert_eq!(next_week.row_count(), 8);
        let first_day = next_week.rows().next().unwrap().id.clone();
        assert!(first_day.starts_with("date:"));

        h.cloud(cloud_list_reply(wa_id, &first_day)).await;
        assert_eq!(
            h.flow(wa_id).await.map(|f| f.label()),
            Some("appointment.ask_time")
        );

        // Back from the time list keeps the week.
        h.cloud(cloud_text(wa_id, "0")).await;
        let Some(Flow::Appointment { week_offset: 1, .. }) = h.flow(wa_id).await else {
            panic!("expected week 1 after going back");
        };

        h.cloud(cloud_text(wa_id, "1")).await;
        h.cloud(cloud_text(wa_id, "3")).await;
        assert_eq!(h.flow(wa_id).await, None);
        assert!(h.messenger.last().await.to_text().contains("10:00"));

        let events = h.calendar.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].start.time(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
        assert_eq!(events[0].end - events[0].start, TimeDelta::minutes(30));
        assert_eq!(
            format!("date:{}", events[0].start.date_naive().format("%Y-%m-%d")),
            first_day
        );

        let user = h.db.get_user_by_phone(wa_id).await.unwrap().unwrap();
        let booked = h.db.appointments_for_user(user.id).await.unwrap();
        assert_eq!(booked.len(), 1);
        assert_eq!(booked[0].calendar_event_id.as_deref(), Some("evt-42"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_booking_ends_conversation() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(true).await;

        h.twilio("hola").await;
        h.twilio("2").await;
        h.twilio("1").await;
        h.twilio("1").await;

        assert_eq!(h.flow(IDENTITY).await, None);
        assert_eq!(h.calendar.events.lock().await.len(), 1);
        assert!(h.messenger.last().await.to_text().contains("no hemos podido"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn menu_resets_appointment_and_invalid_choice_reprompts() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(false).await;

        h.twilio("hola").await;
        h.twilio("citas").await;
        let before = h.flow(IDENTITY).await;

        h.twilio("99").await;
        assert_eq!(h.flow(IDENTITY).await, before);
        assert!(h.messenger.last().await.to_text().contains("no es válida"));

        h.twilio("menu").await;
        assert_eq!(h.flow(IDENTITY).await, None);

        h.twilio("hola").await;
        assert_eq!(h.flow(IDENTITY).await, Some(Flow::AwaitChoice));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_and_verification() {
    timeout(TEST_TIMEOUT, async {
        let h = start_server(false).await;
        h.twilio("hola").await;

        let health: Value = h
            .client
            .get(format!("{}/health", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["sessions"], 1);

        let challenge = h
            .client
            .get(format!("{}/webhook/whatsapp", h.base))
            .query(&[
                ("hub.mode", "subscribe"),
                ("hub.verify_token", "verify-me"),
                ("hub.challenge", "8675309"),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(challenge.status(), 200);
        assert_eq!(challenge.text().await.unwrap(), "8675309");
    })
    .await
    .expect("test timed out");
}
