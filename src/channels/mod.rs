//! WhatsApp transports: inbound payloads and reply delivery.

pub mod cloud_api;
pub mod messenger;
pub mod reply;
pub mod twilio;

pub use cloud_api::{CloudApiMessenger, CloudWebhook, InboundText};
pub use messenger::{LogMessenger, Messenger, build_messenger};
pub use reply::{ListRow, ListSection, NAV_ROW_ID, OutgoingReply};
pub use twilio::{TwilioInbound, TwilioMessenger};
