//! Dialogue: order parsing, slot generation, routing and the turn engine.

pub mod engine;
pub mod parser;
pub mod replies;
pub mod router;
pub mod slots;

pub use engine::{ConversationEngine, Delivery, TurnOutcome};
pub use parser::{OrderIntent, parse_order};
pub use router::{DialogueRouter, Transition};
pub use slots::{AppointmentSlot, SlotGenerator};
