//! Wire codecs: frame stuffing, checksums, varints and typed messages.

pub mod cobs;
pub mod crc32;
pub mod varint;

mod message;

pub use message::*;
