//! Per-identity conversation sessions.

pub mod model;
pub mod store;

pub use model::{AppointmentStep, Flow, Session};
pub use store::{InMemorySessionStore, SessionStore, spawn_expiry_task};
