use std::time::{Duration, Instant};

use tracing::instrument;

use super::channel::ByteChannel;
use crate::error::ChannelError;
use crate::protocol::FRAME_DELIMITER;

/// Accumulates bytes until a frame delimiter arrives.
#[derive(Debug, Clone)]
pub(crate) struct FrameReader {
    buffer: Vec<u8>,
    max_len: usize,
}

impl FrameReader {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_len.min(4096)),
            max_len,
        }
    }

    /// Feeds one byte and returns the completed frame, delimiter excluded,
    /// once the delimiter is seen.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, ChannelError> {
        if byte == FRAME_DELIMITER {
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        if self.buffer.len() >= self.max_len {
            self.buffer.clear();
            return Err(ChannelError::FrameTooLong {
                max_len: self.max_len,
            });
        }
        self.buffer.push(byte);
        Ok(None)
    }

    /// Discards any partial frame.
    pub(crate) fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Reads one whole frame from `channel`, giving up once `timeout` has
    /// elapsed since the call started.
    ///
    /// Nothing is returned on expiry; the partial frame is discarded.
    #[instrument(skip(self, channel), level = "trace", fields(timeout_ms = timeout.as_millis()))]
    pub(crate) fn read_frame(
        &mut self,
        channel: &mut dyn ByteChannel,
        timeout: Duration,
    ) -> Result<Vec<u8>, ChannelError> {
        self.reset();
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.reset();
                return Err(ChannelError::timeout(timeout));
            }

            let byte = match channel.read_byte(remaining) {
                Ok(byte) => byte,
                Err(ChannelError::Timeout { .. }) => {
                    self.reset();
                    return Err(ChannelError::timeout(timeout));
                }
                Err(error) => {
                    self.reset();
                    return Err(error);
                }
            };

            if let Some(frame) = self.push(byte)? {
                return Ok(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    struct QueueChannel {
        bytes: VecDeque<u8>,
    }

    impl ByteChannel for QueueChannel {
        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), ChannelError> {
            Ok(())
        }

        fn read_byte(&mut self, timeout: Duration) -> Result<u8, ChannelError> {
            self.bytes
                .pop_front()
                .ok_or_else(|| ChannelError::timeout(timeout))
        }

        fn flush(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }

        fn name(&self) -> String {
            "queue".to_string()
        }
    }

    #[test]
    fn push_completes_on_delimiter() {
        let mut reader = FrameReader::new(8);
        assert_eq!(None, reader.push(0x02).expect("byte should buffer"));
        assert_eq!(None, reader.push(0x11).expect("byte should buffer"));
        assert_eq!(
            Some(vec![0x02, 0x11]),
            reader.push(FRAME_DELIMITER).expect("delimiter should complete")
        );
        assert_eq!(
            Some(Vec::new()),
            reader.push(FRAME_DELIMITER).expect("bare delimiter is an empty frame")
        );
    }

    #[test]
    fn push_rejects_overlong_frame() {
        let mut reader = FrameReader::new(2);
        reader.push(1).expect("first byte should buffer");
        reader.push(2).expect("second byte should buffer");
        assert_matches!(reader.push(3), Err(ChannelError::FrameTooLong { max_len: 2 }));
    }

    #[test]
    fn read_frame_returns_bytes_before_delimiter() {
        let mut channel = QueueChannel {
            bytes: VecDeque::from([0x01, 0x01, 0x01, 0x00, 0x05]),
        };
        let mut reader = FrameReader::new(16);

        let frame = reader
            .read_frame(&mut channel, Duration::from_millis(50))
            .expect("frame should be read");
        assert_eq!(vec![0x01, 0x01, 0x01], frame);
        assert_eq!(VecDeque::from([0x05]), channel.bytes);
    }

    #[test]
    fn read_frame_times_out_without_partial_frame() {
        let mut channel = QueueChannel {
            bytes: VecDeque::from([0x01, 0x01]),
        };
        let mut reader = FrameReader::new(16);

        let result = reader.read_frame(&mut channel, Duration::from_millis(20));
        assert_matches!(result, Err(ChannelError::Timeout { timeout_ms: 20 }));
        assert!(reader.buffer.is_empty());
    }
}
