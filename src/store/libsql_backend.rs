//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    DEFAULT_USER_ROLE, Database, NewAppointment, NewOrder, Product, StoredAppointment,
    StoredOrder, User,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run an `INSERT ... RETURNING id` and return the id.
    async fn insert_returning_id(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}"))),
            Ok(None) => Err(DatabaseError::Query(format!("{op}: no id returned"))),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_product(row: &libsql::Row) -> Result<Product, DatabaseError> {
    let price_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("product price: {e}")))?;
    let price = Decimal::from_str(price_str.trim()).map_err(|e| {
        DatabaseError::Serialization(format!("invalid product price '{price_str}': {e}"))
    })?;

    Ok(Product {
        id: row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("product id: {e}")))?,
        name: row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("product name: {e}")))?,
        price,
    })
}

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get::<String>(2).unwrap_or_default(),
        phone: row.get(3)?,
        role: row.get(4)?,
    })
}

fn row_to_order(row: &libsql::Row) -> Result<StoredOrder, libsql::Error> {
    let order_date: String = row.get(1)?;
    let amount: i64 = row.get(2)?;
    Ok(StoredOrder {
        id: row.get(0)?,
        order_date: parse_datetime(&order_date),
        amount: u32::try_from(amount).unwrap_or_default(),
        message: row.get(3)?,
        user_id: row.get(4)?,
        product_id: row.get(5)?,
    })
}

fn row_to_appointment(row: &libsql::Row) -> Result<StoredAppointment, libsql::Error> {
    let starts_at: String = row.get(2)?;
    let ends_at: String = row.get(3)?;
    Ok(StoredAppointment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        starts_at: parse_datetime(&starts_at),
        ends_at: parse_datetime(&ends_at),
        summary: row.get(4)?,
        calendar_event_id: row.get(5).ok(),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str = "id, name, email, phone, role";

const ORDER_COLUMNS: &str = "id, order_date, amount, message, user_id, product_id";

const APPOINTMENT_COLUMNS: &str = "id, user_id, starts_at, ends_at, summary, calendar_event_id";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Catalog ─────────────────────────────────────────────────────

    async fn list_products(&self) -> Result<Vec<Product>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT id, name, price FROM products ORDER BY id ASC", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_products: {e}")))?;

        let mut products = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_products: {e}")))?
        {
            products.push(row_to_product(&row)?);
        }
        Ok(products)
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_user_by_phone row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_phone: {e}"))),
        }
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<User, DatabaseError> {
        let id = self
            .insert_returning_id(
                "create_user",
                "INSERT INTO users (name, email, phone, role) VALUES (?1, ?2, ?3, ?4) RETURNING id",
                params![name, email, phone, DEFAULT_USER_ROLE],
            )
            .await?;

        info!(user_id = id, phone, "User created");
        Ok(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            role: DEFAULT_USER_ROLE.to_string(),
        })
    }

    // ── Orders ──────────────────────────────────────────────────────

    async fn insert_order(&self, order: &NewOrder) -> Result<i64, DatabaseError> {
        let id = self
            .insert_returning_id(
                "insert_order",
                "INSERT INTO orders (order_date, amount, message, user_id, product_id)
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
                params![
                    order.order_date.to_rfc3339(),
                    i64::from(order.amount),
                    order.message.clone(),
                    order.user_id,
                    order.product_id,
                ],
            )
            .await?;

        debug!(order_id = id, user_id = order.user_id, "Order inserted into DB");
        Ok(id)
    }

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<StoredOrder>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ?1 ORDER BY order_date DESC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("orders_for_user: {e}")))?;

        let mut orders = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("orders_for_user: {e}")))?
        {
            let order = row_to_order(&row)
                .map_err(|e| DatabaseError::Query(format!("orders_for_user row parse: {e}")))?;
            orders.push(order);
        }
        Ok(orders)
    }

    // ── Appointments ────────────────────────────────────────────────

    async fn insert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> Result<i64, DatabaseError> {
        let id = self
            .insert_returning_id(
                "insert_appointment",
                "INSERT INTO appointments (user_id, starts_at, ends_at, summary, calendar_event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING id",
                params![
                    appointment.user_id,
                    appointment.starts_at.to_rfc3339(),
                    appointment.ends_at.to_rfc3339(),
                    appointment.summary.clone(),
                    opt_text(appointment.calendar_event_id.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await?;

        debug!(appointment_id = id, user_id = appointment.user_id, "Appointment inserted into DB");
        Ok(id)
    }

    async fn appointments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<StoredAppointment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE user_id = ?1 ORDER BY starts_at ASC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("appointments_for_user: {e}")))?;

        let mut appointments = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("appointments_for_user: {e}")))?
        {
            let appointment = row_to_appointment(&row).map_err(|e| {
                DatabaseError::Query(format!("appointments_for_user row parse: {e}"))
            })?;
            appointments.push(appointment);
        }
        Ok(appointments)
    }
}
