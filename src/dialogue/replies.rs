//! Reply bodies sent to the customer.
//!
//! Selection lists reserve the key "0" for navigation and number the real
//! choices from 1 in the order they were offered. Row ids encode the choice
//! itself (`date:YYYY-MM-DD`, `time:HH:MM`) so a tapped row resolves
//! without relying on its position.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use super::parser::OrderIntent;
use super::slots::{AppointmentSlot, date_label};
use crate::channels::{ListRow, ListSection, NAV_ROW_ID, OutgoingReply};
use crate::store::Product;

const DATE_ID_PREFIX: &str = "date:";
const TIME_ID_PREFIX: &str = "time:";
const DATE_ID_FORMAT: &str = "%Y-%m-%d";
const TIME_ID_FORMAT: &str = "%H:%M";

pub fn date_row_id(date: NaiveDate) -> String {
    format!("{DATE_ID_PREFIX}{}", date.format(DATE_ID_FORMAT))
}

pub fn time_row_id(time: NaiveTime) -> String {
    format!("{TIME_ID_PREFIX}{}", time.format(TIME_ID_FORMAT))
}

/// Decode a `date:` row id.
pub fn parse_date_row_id(id: &str) -> Option<NaiveDate> {
    let raw = id.strip_prefix(DATE_ID_PREFIX)?;
    NaiveDate::parse_from_str(raw, DATE_ID_FORMAT).ok()
}

/// Decode a `time:` row id.
pub fn parse_time_row_id(id: &str) -> Option<NaiveTime> {
    let raw = id.strip_prefix(TIME_ID_PREFIX)?;
    NaiveTime::parse_from_str(raw, TIME_ID_FORMAT).ok()
}

/// Format a price for display: whole amounts without decimals.
pub fn format_price(price: Decimal) -> String {
    if price.fract().is_zero() {
        price.trunc().normalize().to_string()
    } else {
        format!("{:.2}", price)
    }
}

// ── Menu ────────────────────────────────────────────────────────────────

pub fn menu() -> OutgoingReply {
    menu_with_intro("¡Hola! ¿En qué podemos ayudarte?")
}

pub fn menu_reprompt() -> OutgoingReply {
    menu_with_intro("No he entendido tu elección. Responde 1 para pedir o 2 para pedir cita.")
}

fn menu_with_intro(intro: &str) -> OutgoingReply {
    OutgoingReply::List {
        body: intro.to_string(),
        button: "Ver opciones".to_string(),
        sections: vec![ListSection {
            title: "Opciones".to_string(),
            rows: vec![
                ListRow::new("1", "1", "Pedir").with_description("Hacer un pedido"),
                ListRow::new("2", "2", "Citas").with_description("Reservar una cita"),
            ],
        }],
    }
}

/// Sent after an explicit "menu" reset.
pub fn reset_hint() -> OutgoingReply {
    OutgoingReply::text("Has vuelto al inicio. Escribe cualquier mensaje para ver el menú.")
}

/// Sent when the conversation hit a state it cannot continue from.
pub fn restart_hint() -> OutgoingReply {
    OutgoingReply::text(
        "Ha ocurrido un error y hemos reiniciado la conversación. \
         Escribe cualquier mensaje para empezar de nuevo.",
    )
}

// ── Orders ──────────────────────────────────────────────────────────────

pub fn order_prompt(catalog: &[Product]) -> OutgoingReply {
    let example = catalog
        .first()
        .map(|p| format!("2 {}", p.name))
        .unwrap_or_else(|| "2 gafas".to_string());
    OutgoingReply::text(format!(
        "Escribe la cantidad y el producto que quieres, por ejemplo \"{example}\"."
    ))
}

/// Sent when no catalog product was recognised.
pub fn catalog_reprompt(catalog: &[Product]) -> OutgoingReply {
    let mut body = String::from("No he reconocido ningún producto. Nuestro catálogo:");
    for product in catalog {
        body.push_str(&format!(
            "\n- {}: {} €",
            product.name,
            format_price(product.price)
        ));
    }
    body.push_str("\nEscribe la cantidad y el producto, por ejemplo \"2 ");
    body.push_str(catalog.first().map_or("gafas", |p| p.name.as_str()));
    body.push_str("\".");
    OutgoingReply::text(body)
}

pub fn order_confirmation(intent: &OrderIntent) -> OutgoingReply {
    OutgoingReply::text(format!(
        "¡Gracias! Pedido registrado: {} x {}. Total: {} €.",
        intent.quantity,
        intent.product_name,
        format_price(intent.total())
    ))
}

// ── Appointments ────────────────────────────────────────────────────────

/// Dates list. `invalid` prefixes a "not a valid option" notice.
pub fn date_list(dates: &[NaiveDate], invalid: bool) -> OutgoingReply {
    let rows = dates
        .iter()
        .enumerate()
        .map(|(i, date)| ListRow::new(date_row_id(*date), (i + 1).to_string(), date_label(*date)))
        .collect();

    let body = if invalid {
        "Esa opción no es válida. Elige un día de la lista:"
    } else {
        "Elige un día para tu cita:"
    };

    OutgoingReply::List {
        body: body.to_string(),
        button: "Ver días".to_string(),
        sections: vec![
            ListSection {
                title: "Días disponibles".to_string(),
                rows,
            },
            ListSection {
                title: "Más opciones".to_string(),
                rows: vec![ListRow::new(NAV_ROW_ID, NAV_ROW_ID, "Semana siguiente")],
            },
        ],
    }
}

/// Time list for `date`. `invalid` prefixes a "not a valid option" notice.
pub fn time_list(date: NaiveDate, times: &[NaiveTime], invalid: bool) -> OutgoingReply {
    let rows = times
        .iter()
        .enumerate()
        .map(|(i, time)| {
            ListRow::new(
                time_row_id(*time),
                (i + 1).to_string(),
                time.format(TIME_ID_FORMAT).to_string(),
            )
        })
        .collect();

    let label = date_label(date);
    let body = if invalid {
        format!("Esa opción no es válida. Elige una hora para el {label}:")
    } else {
        format!("Elige una hora para el {label}:")
    };

    OutgoingReply::List {
        body,
        button: "Ver horas".to_string(),
        sections: vec![
            ListSection {
                title: "Horas disponibles".to_string(),
                rows,
            },
            ListSection {
                title: "Más opciones".to_string(),
                rows: vec![ListRow::new(NAV_ROW_ID, NAV_ROW_ID, "Cambiar de día")],
            },
        ],
    }
}

pub fn booking_confirmed(slot: &AppointmentSlot) -> OutgoingReply {
    OutgoingReply::text(format!(
        "Cita confirmada para el {} a las {}. ¡Te esperamos!",
        date_label(slot.date),
        slot.label()
    ))
}

pub fn booking_failed() -> OutgoingReply {
    OutgoingReply::text(
        "Lo sentimos, no hemos podido reservar la cita. \
         Escribe cualquier mensaje para intentarlo de nuevo.",
    )
}
