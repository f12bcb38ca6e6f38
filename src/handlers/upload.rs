use std::time::Duration;

use indicatif::ProgressStyle;
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use tracing::{Span, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::codec::crc32::checksum;
use crate::codec::{AckStatus, Command};
use crate::hw::{DeviceSession, ExchangeError};
use crate::protocol::{DEFAULT_START_UPDATE_TIMEOUT, MAX_DATA_BLOCK_SIZE};

/// Errors returned by firmware uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("chunk size {chunk_size} must be between 1 and {max}")]
    InvalidChunkSize { chunk_size: usize, max: usize },
    #[error("image of {size} bytes does not fit in a 32-bit size field")]
    ImageTooLarge { size: usize },
    #[error("device rejected {step} at offset {offset} with status {status}")]
    DeviceRejected {
        step: UploadStep,
        offset: u32,
        status: AckStatus,
    },
    #[error("device computed a different checksum than 0x{expected_crc:08X}")]
    CrcMismatch { expected_crc: u32 },
    #[error("upload session already ran and is {state}")]
    AlreadyRun { state: UploadState },
    #[error("{step} exchange failed at offset {offset}")]
    Exchange {
        step: UploadStep,
        offset: u32,
        #[source]
        source: ExchangeError,
    },
}

/// Upload phase a failure happened in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    Start,
    DataBlock,
    Finish,
}

/// Upload session lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Started,
    Uploading,
    Finishing,
    Done,
    Failed,
}

impl UploadState {
    /// Returns whether the session may move from `self` to `next`.
    ///
    /// ```
    /// use crispy_upload::UploadState;
    ///
    /// assert!(UploadState::Started.can_advance_to(UploadState::Finishing));
    /// assert!(!UploadState::Done.can_advance_to(UploadState::Uploading));
    /// ```
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Started)
                | (Self::Started | Self::Uploading, Self::Uploading)
                | (Self::Started | Self::Uploading, Self::Finishing)
                | (Self::Finishing, Self::Done)
                | (
                    Self::Idle | Self::Started | Self::Uploading | Self::Finishing,
                    Self::Failed
                )
        )
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Firmware upload request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UploadRequest {
    bank: u8,
    version: u32,
    image: Vec<u8>,
    chunk_size: usize,
    start_timeout: Duration,
}

impl UploadRequest {
    /// Creates a request with the default chunk size and start timeout.
    ///
    /// ```
    /// use crispy_upload::UploadRequest;
    ///
    /// let request = UploadRequest::new(1, 42, vec![0xAA; 4096]);
    /// assert_eq!(1024, request.chunk_size());
    /// ```
    #[must_use]
    pub fn new(bank: u8, version: u32, image: impl Into<Vec<u8>>) -> Self {
        Self {
            bank,
            version,
            image: image.into(),
            chunk_size: MAX_DATA_BLOCK_SIZE,
            start_timeout: DEFAULT_START_UPDATE_TIMEOUT,
        }
    }

    /// Overrides the bytes sent per data block.
    ///
    /// ```
    /// use crispy_upload::UploadRequest;
    ///
    /// let request = UploadRequest::new(0, 1, vec![0; 10]).with_chunk_size(256);
    /// assert_eq!(256, request.chunk_size());
    /// ```
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Overrides how long to wait for `StartUpdate`, which erases the bank.
    #[must_use]
    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn image_len(&self) -> usize {
        self.image.len()
    }
}

/// Summary of a completed upload.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct UploadReceipt {
    bank: u8,
    version: u32,
    bytes_sent: usize,
    blocks_sent: usize,
    crc32: u32,
}

impl UploadReceipt {
    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the image bytes the device acknowledged.
    #[must_use]
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Returns the number of data blocks the device acknowledged.
    #[must_use]
    pub fn blocks_sent(&self) -> usize {
        self.blocks_sent
    }

    /// Returns the image checksum the device verified.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }
}

/// One upload attempt: start, stream every block, finish.
///
/// [`UploadSession::run`] stops at the first failure without retrying and
/// leaves the session in [`UploadState::Done`] or [`UploadState::Failed`].
/// A session runs at most once.
#[derive(Debug)]
pub struct UploadSession {
    bank: u8,
    version: u32,
    image: Vec<u8>,
    size: u32,
    crc32: u32,
    chunk_size: usize,
    start_timeout: Duration,
    acknowledged: u32,
    blocks_sent: usize,
    state: UploadState,
}

impl UploadSession {
    /// Validates `request` and computes the image checksum.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidChunkSize`] for a chunk size of zero or
    /// above [`MAX_DATA_BLOCK_SIZE`], and [`UploadError::ImageTooLarge`] when
    /// the image length does not fit in 32 bits.
    pub fn new(request: UploadRequest) -> Result<Self, UploadError> {
        let UploadRequest {
            bank,
            version,
            image,
            chunk_size,
            start_timeout,
        } = request;

        if chunk_size == 0 || chunk_size > MAX_DATA_BLOCK_SIZE {
            return Err(UploadError::InvalidChunkSize {
                chunk_size,
                max: MAX_DATA_BLOCK_SIZE,
            });
        }
        let size = u32::try_from(image.len())
            .map_err(|_| UploadError::ImageTooLarge { size: image.len() })?;
        let crc32 = checksum(&image);

        Ok(Self {
            bank,
            version,
            image,
            size,
            crc32,
            chunk_size,
            start_timeout,
            acknowledged: 0,
            blocks_sent: 0,
            state: UploadState::Idle,
        })
    }

    /// Returns the lifecycle state, which is terminal once `run` returns.
    #[must_use]
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Returns the host-side image checksum sent with `StartUpdate`.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Returns the number of data blocks the image splits into.
    #[must_use]
    pub fn block_count(&self) -> usize {
        (self.size as usize).div_ceil(self.chunk_size)
    }

    /// Drives the upload to completion over `device`.
    ///
    /// `on_progress` is called with `(bytes_acknowledged, total_bytes)` after
    /// each accepted block.
    ///
    /// # Errors
    ///
    /// Returns the first failure: a rejected step, a checksum mismatch at
    /// finish, or an exchange error tagged with its step and offset.
    /// Returns [`UploadError::AlreadyRun`] without touching the device when
    /// the session has already run.
    #[instrument(
        skip(self, device, on_progress),
        level = "debug",
        fields(bank = self.bank, size = self.size, crc32 = self.crc32, chunk_size = self.chunk_size)
    )]
    pub fn run<F>(
        &mut self,
        device: &mut DeviceSession,
        mut on_progress: F,
    ) -> Result<UploadReceipt, UploadError>
    where
        F: FnMut(usize, usize),
    {
        if self.state != UploadState::Idle {
            return Err(UploadError::AlreadyRun { state: self.state });
        }

        match self.drive(device, &mut on_progress) {
            Ok(receipt) => {
                self.advance(UploadState::Done);
                Ok(receipt)
            }
            Err(error) => {
                self.advance(UploadState::Failed);
                tracing::debug!(%error, "upload failed");
                Err(error)
            }
        }
    }

    fn drive(
        &mut self,
        device: &mut DeviceSession,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> Result<UploadReceipt, UploadError> {
        let start = Command::StartUpdate {
            bank: self.bank,
            size: self.size,
            crc32: self.crc32,
            version: self.version,
        };
        let status = device
            .expect_ack(&start, self.start_timeout)
            .map_err(|source| self.exchange_error(UploadStep::Start, source))?;
        self.require_ok(UploadStep::Start, status)?;
        self.advance(UploadState::Started);

        let image = std::mem::take(&mut self.image);
        let total = image.len();
        let response_timeout = device.response_timeout();
        while (self.acknowledged as usize) < total {
            // Every block starts where the device's acknowledged bytes end.
            let offset = self.acknowledged;
            let block_start = offset as usize;
            let chunk = &image[block_start..total.min(block_start + self.chunk_size)];
            self.advance(UploadState::Uploading);

            let block = Command::DataBlock {
                offset,
                data: chunk.to_vec(),
            };
            let status = device
                .expect_ack(&block, response_timeout)
                .map_err(|source| self.exchange_error(UploadStep::DataBlock, source))?;
            self.require_ok(UploadStep::DataBlock, status)?;

            self.acknowledged += chunk.len() as u32;
            self.blocks_sent += 1;
            tracing::trace!(
                offset,
                block_len = chunk.len(),
                acknowledged = self.acknowledged,
                "data block accepted"
            );
            on_progress(self.acknowledged as usize, total);
        }

        self.advance(UploadState::Finishing);
        let status = device
            .expect_ack(&Command::FinishUpdate, response_timeout)
            .map_err(|source| self.exchange_error(UploadStep::Finish, source))?;
        if status == AckStatus::CrcError {
            return Err(UploadError::CrcMismatch {
                expected_crc: self.crc32,
            });
        }
        self.require_ok(UploadStep::Finish, status)?;

        Ok(UploadReceipt {
            bank: self.bank,
            version: self.version,
            bytes_sent: self.acknowledged as usize,
            blocks_sent: self.blocks_sent,
            crc32: self.crc32,
        })
    }

    fn advance(&mut self, next: UploadState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid upload transition {} -> {next}",
            self.state
        );
        tracing::trace!(from = %self.state, to = %next, "upload state changed");
        self.state = next;
    }

    fn require_ok(&self, step: UploadStep, status: AckStatus) -> Result<(), UploadError> {
        if status.is_ok() {
            return Ok(());
        }
        Err(UploadError::DeviceRejected {
            step,
            offset: self.acknowledged,
            status,
        })
    }

    fn exchange_error(&self, step: UploadStep, source: ExchangeError) -> UploadError {
        UploadError::Exchange {
            step,
            offset: self.acknowledged,
            source,
        }
    }
}

/// Uploads firmware images to a bootloader bank.
pub struct UploadHandler;

impl UploadHandler {
    /// Uploads `request` and reports progress on the current span.
    ///
    /// ```
    /// use crispy_upload::{
    ///     DeviceSession, FakeChannel, FakeDeviceConfig, UploadHandler, UploadRequest,
    /// };
    ///
    /// let channel = FakeChannel::new(&FakeDeviceConfig::default());
    /// let mut session = DeviceSession::new(Box::new(channel));
    /// let receipt = UploadHandler::upload(&mut session, UploadRequest::new(0, 1, vec![0x5A; 3000]))?;
    /// assert_eq!(3, receipt.blocks_sent());
    /// # Ok::<(), crispy_upload::UploadError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error when the request is invalid or any upload step fails.
    pub fn upload(
        session: &mut DeviceSession,
        request: UploadRequest,
    ) -> Result<UploadReceipt, UploadError> {
        Self::upload_with_progress(session, request, |_sent, _total| {})
    }

    /// Uploads `request`, calling `on_progress` after each accepted block.
    ///
    /// # Errors
    ///
    /// Returns an error when the request is invalid or any upload step fails.
    #[instrument(
        skip(session, request, on_progress),
        level = "info",
        fields(bank = request.bank(), version = request.version(), image_len = request.image_len())
    )]
    pub fn upload_with_progress<F>(
        session: &mut DeviceSession,
        request: UploadRequest,
        mut on_progress: F,
    ) -> Result<UploadReceipt, UploadError>
    where
        F: FnMut(usize, usize),
    {
        let span = Span::current();
        span.pb_set_style(&upload_progress_style());
        span.pb_set_length(request.image_len() as u64);
        span.pb_set_message(&format!("Uploading to bank {}", request.bank()));

        let mut upload = UploadSession::new(request)?;
        tracing::debug!(
            crc32 = format_args!("0x{:08X}", upload.crc32()),
            blocks = upload.block_count(),
            "starting upload"
        );
        let result = upload.run(session, |sent, total| {
            span.pb_set_position(sent as u64);
            on_progress(sent, total);
        });

        let finish_message = match &result {
            Ok(receipt) => format!("Uploaded {} bytes", receipt.bytes_sent()),
            Err(_error) => "Upload failed".to_string(),
        };
        span.pb_set_finish_message(&finish_message);
        result
    }
}

fn upload_progress_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan.bold} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}",
    )
    .unwrap_or_else(|_error| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(0)]
    #[case::above_cap(MAX_DATA_BLOCK_SIZE + 1)]
    fn new_rejects_invalid_chunk_size(#[case] chunk_size: usize) {
        let request = UploadRequest::new(0, 1, vec![1, 2, 3]).with_chunk_size(chunk_size);
        assert_matches!(
            UploadSession::new(request),
            Err(UploadError::InvalidChunkSize { chunk_size: rejected, max: MAX_DATA_BLOCK_SIZE })
                if rejected == chunk_size
        );
    }

    #[test]
    fn new_computes_checksum_and_block_count() {
        let request = UploadRequest::new(0, 1, b"123456789".to_vec()).with_chunk_size(4);
        let session = UploadSession::new(request).expect("request should be valid");

        assert_eq!(0xCBF4_3926, session.crc32());
        assert_eq!(3, session.block_count());
        assert_eq!(UploadState::Idle, session.state());
    }

    #[rstest]
    #[case(UploadState::Idle, UploadState::Started, true)]
    #[case(UploadState::Started, UploadState::Uploading, true)]
    #[case(UploadState::Uploading, UploadState::Uploading, true)]
    #[case(UploadState::Uploading, UploadState::Finishing, true)]
    #[case(UploadState::Finishing, UploadState::Done, true)]
    #[case(UploadState::Started, UploadState::Failed, true)]
    #[case(UploadState::Idle, UploadState::Uploading, false)]
    #[case(UploadState::Finishing, UploadState::Uploading, false)]
    #[case(UploadState::Done, UploadState::Failed, false)]
    #[case(UploadState::Failed, UploadState::Started, false)]
    fn transitions_follow_upload_order(
        #[case] from: UploadState,
        #[case] to: UploadState,
        #[case] allowed: bool,
    ) {
        assert_eq!(allowed, from.can_advance_to(to));
    }

    #[test]
    fn terminal_states_are_done_and_failed() {
        assert!(UploadState::Done.is_terminal());
        assert!(UploadState::Failed.is_terminal());
        assert!(!UploadState::Finishing.is_terminal());
    }

    #[test]
    fn step_names_render_in_snake_case() {
        assert_eq!("data_block", UploadStep::DataBlock.to_string());
    }
}
