//! Persistence layer: catalog, users, orders and appointments.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Database, NewAppointment, NewOrder, Product, StoredAppointment, StoredOrder, User,
};
