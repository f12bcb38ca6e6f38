use std::fmt::{self, Display, Formatter};
use std::path::Path;

use crate::handlers::UploadReceipt;
use crate::utils::bank_label;

use super::painter::Painter;
use super::table::Table;

/// Renders a completed upload.
pub(crate) struct UploadReceiptView<'a> {
    path: &'a Path,
    receipt: &'a UploadReceipt,
    painter: &'a Painter,
}

impl<'a> UploadReceiptView<'a> {
    pub(crate) fn new(path: &'a Path, receipt: &'a UploadReceipt, painter: &'a Painter) -> Self {
        Self {
            path,
            receipt,
            painter,
        }
    }
}

impl Display for UploadReceiptView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let receipt = self.receipt;
        let bank = receipt.bank();
        let table = Table::key_value(
            self.painter,
            vec![
                ("file", self.path.display().to_string()),
                ("bank", format!("{bank} ({})", bank_label(bank))),
                ("version", receipt.version().to_string()),
                ("bytes", receipt.bytes_sent().to_string()),
                ("blocks", receipt.blocks_sent().to_string()),
                (
                    "crc32",
                    self.painter.value(format!("0x{:08X}", receipt.crc32())),
                ),
            ],
        );

        writeln!(
            f,
            "{} {}",
            self.painter.success("✓"),
            self.painter.heading("Firmware uploaded")
        )?;
        writeln!(f, "{table}")?;
        write!(
            f,
            "{}",
            self.painter.muted(format!(
                "Reboot the device to start bank {}.",
                bank_label(bank)
            ))
        )
    }
}
