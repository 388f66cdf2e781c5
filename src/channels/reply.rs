//! Outgoing reply shapes shared by every messenger.

use serde::Serialize;

/// Row id reserved for the back/next-page entry of a selection list.
pub const NAV_ROW_ID: &str = "0";

/// A reply to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingReply {
    /// Plain text body.
    Text { body: String },
    /// Interactive list. Channels without native lists render it with
    /// [`OutgoingReply::to_text`].
    List {
        body: String,
        /// Title of the button that opens the list.
        button: String,
        sections: Vec<ListSection>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// A selectable row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRow {
    /// Stable id returned by the channel when the row is tapped.
    pub id: String,
    /// What the user can type instead of tapping, e.g. "3" or "0".
    pub key: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(id: impl Into<String>, key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl OutgoingReply {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    /// Total rows across all sections (0 for text).
    pub fn row_count(&self) -> usize {
        match self {
            Self::Text { .. } => 0,
            Self::List { sections, .. } => sections.iter().map(|s| s.rows.len()).sum(),
        }
    }

    /// Iterate every row in display order.
    pub fn rows(&self) -> impl Iterator<Item = &ListRow> {
        let sections: &[ListSection] = match self {
            Self::Text { .. } => &[],
            Self::List { sections, .. } => sections,
        };
        sections.iter().flat_map(|s| s.rows.iter())
    }

    /// Render as a numbered plain-text message.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::List { body, sections, .. } => {
                let mut out = body.clone();
                for section in sections {
                    if sections.len() > 1 && !section.title.is_empty() {
                        out.push_str("\n\n");
                        out.push_str(&section.title);
                    }
                    for row in &section.rows {
                        out.push('\n');
                        out.push_str(&row.key);
                        out.push_str(". ");
                        out.push_str(&row.title);
                        if let Some(description) = &row.description {
                            out.push_str(" (");
                            out.push_str(description);
                            out.push(')');
                        }
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_section_list() -> OutgoingReply {
        OutgoingReply::List {
            body: "Elige un día:".into(),
            button: "Ver días".into(),
            sections: vec![
                ListSection {
                    title: "Días".into(),
                    rows: vec![
                        ListRow::new("date:2026-10-16", "1", "Viernes 16/10"),
                        ListRow::new("date:2026-10-17", "2", "Sábado 17/10"),
                    ],
                },
                ListSection {
                    title: "Más".into(),
                    rows: vec![
                        ListRow::new(NAV_ROW_ID, "0", "Semana siguiente")
                            .with_description("Ver más días"),
                    ],
                },
            ],
        }
    }

    #[test]
    fn text_passthrough() {
        let reply = OutgoingReply::text("hola");
        assert_eq!(reply.to_text(), "hola");
        assert_eq!(reply.row_count(), 0);
        assert_eq!(reply.rows().count(), 0);
    }

    #[test]
    fn list_renders_keys_in_order() {
        let text = two_section_list().to_text();
        assert_eq!(
            text,
            "Elige un día:\n\nDías\n1. Viernes 16/10\n2. Sábado 17/10\n\nMás\n0. Semana siguiente (Ver más días)"
        );
    }

    #[test]
    fn single_section_title_is_omitted() {
        let reply = OutgoingReply::List {
            body: "Menú".into(),
            button: "Opciones".into(),
            sections: vec![ListSection {
                title: "Opciones".into(),
                rows: vec![ListRow::new("1", "1", "Pedir"), ListRow::new("2", "2", "Citas")],
            }],
        };
        assert_eq!(reply.to_text(), "Menú\n1. Pedir\n2. Citas");
    }

    #[test]
    fn rows_flatten_sections() {
        let reply = two_section_list();
        let ids: Vec<_> = reply.rows().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["date:2026-10-16", "date:2026-10-17", "0"]);
        assert_eq!(reply.row_count(), 3);
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(OutgoingReply::text("x")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["body"], "x");
    }
}
