use std::fmt::{self, Display, Formatter};

use crate::codec::DeviceStatus;
use crate::utils::bank_label;

use super::painter::Painter;
use super::table::Table;

/// Renders a bootloader status snapshot.
pub(crate) struct StatusView<'a> {
    status: &'a DeviceStatus,
    painter: &'a Painter,
}

impl<'a> StatusView<'a> {
    pub(crate) fn new(status: &'a DeviceStatus, painter: &'a Painter) -> Self {
        Self { status, painter }
    }
}

impl Display for StatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let status = self.status;
        let active_bank = status.active_bank();
        let table = Table::key_value(
            self.painter,
            vec![
                (
                    "active bank",
                    self.painter
                        .value(format!("{active_bank} ({})", bank_label(active_bank))),
                ),
                ("version A", status.version_a().to_string()),
                ("version B", status.version_b().to_string()),
                ("state", self.painter.boot_state(status.state())),
            ],
        );

        writeln!(f, "{}", self.painter.heading("Bootloader status"))?;
        write!(f, "{table}")
    }
}
