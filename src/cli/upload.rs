use std::fs;
use std::io;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::cli::{OutputFormat, RunOptions, UploadArgs, with_session, write_json_line};
use crate::handlers::{UploadHandler, UploadRequest};
use crate::hw::HardwareClient;
use crate::terminal::TerminalClient;

use super::ui::{Painter, UploadReceiptView};

/// Executes the `upload` command.
#[instrument(
    skip(client, args, out, terminal_client),
    level = "info",
    fields(path = %args.path().display(), bank = args.bank(), version = args.version())
)]
pub(crate) fn run<W>(
    client: Box<dyn HardwareClient>,
    args: &UploadArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    options: RunOptions,
) -> Result<()>
where
    W: io::Write,
{
    let path = args.path();
    let image = fs::read(path)
        .with_context(|| format!("failed to read firmware file `{}`", path.display()))?;
    let request = UploadRequest::new(args.bank(), args.version(), image)
        .with_chunk_size(args.chunk_size())
        .with_start_timeout(args.start_timeout());

    let receipt = with_session(client, options.response_timeout(), |session| {
        UploadHandler::upload(session, request).with_context(|| {
            format!(
                "failed to upload `{}` to bank {}",
                path.display(),
                args.bank()
            )
        })
    })?;

    match options.output_format() {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", UploadReceiptView::new(path, &receipt, &painter))?;
        }
        OutputFormat::Json => write_json_line(out, &receipt)?,
    }

    Ok(())
}
