//! Shop Assist: WhatsApp ordering and appointment bot.

pub mod calendar;
pub mod channels;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod session;
pub mod store;
pub mod webhook;
