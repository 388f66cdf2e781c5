//! `Database` trait: the persistence boundary consumed by the dialogue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Placeholder name given to users created from an inbound message.
pub const PLACEHOLDER_USER_NAME: &str = "Cliente WhatsApp";

/// Role assigned to auto-created users.
pub const DEFAULT_USER_ROLE: &str = "client";

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

/// A customer record, keyed by phone (the messaging identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
}

/// An order to insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_date: DateTime<Utc>,
    pub amount: u32,
    /// The raw message the order was parsed from.
    pub message: String,
    pub user_id: i64,
    pub product_id: i64,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredOrder {
    pub id: i64,
    pub order_date: DateTime<Utc>,
    pub amount: u32,
    pub message: String,
    pub user_id: i64,
    pub product_id: i64,
}

/// A booked appointment to insert.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub summary: String,
    pub calendar_event_id: Option<String>,
}

/// A persisted appointment.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAppointment {
    pub id: i64,
    pub user_id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub summary: String,
    pub calendar_event_id: Option<String>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Catalog ─────────────────────────────────────────────────────

    /// Full catalog in listing order (ascending id).
    async fn list_products(&self) -> Result<Vec<Product>, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError>;

    async fn create_user(&self, name: &str, email: &str, phone: &str)
    -> Result<User, DatabaseError>;

    /// Look up the user for `phone`, creating a placeholder record if absent.
    async fn ensure_user(&self, phone: &str) -> Result<User, DatabaseError> {
        if let Some(user) = self.get_user_by_phone(phone).await? {
            return Ok(user);
        }
        self.create_user(PLACEHOLDER_USER_NAME, "", phone).await
    }

    // ── Orders ──────────────────────────────────────────────────────

    /// Insert an order. Returns the new row id.
    async fn insert_order(&self, order: &NewOrder) -> Result<i64, DatabaseError>;

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<StoredOrder>, DatabaseError>;

    // ── Appointments ────────────────────────────────────────────────

    /// Insert a booked appointment. Returns the new row id.
    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<i64, DatabaseError>;

    async fn appointments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<StoredAppointment>, DatabaseError>;
}
