use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

const FIELD_HEADER: &str = "field";
const VALUE_HEADER: &str = "value";

/// A two-column field/value table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    rows: Vec<[String; 2]>,
}

impl Table {
    /// Creates a table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|(field, value)| [painter.muted(field), value])
                .collect(),
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record([FIELD_HEADER, VALUE_HEADER]);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}
