#![cfg_attr(not(any(test, feature = "std")), no_std)]
//! Framed datagram transport over an asynchronous serial line
//!
//! ```text
//! | START | payload (escaped) | CRC (escaped, 2 bytes) | START | ...
//! ```
//!
//! Received bytes are decoded in interrupt context into a fixed [`buffer::PacketBuffer`] and
//! read out by the main loop; packets to send travel the other way through a second buffer.
//! Each buffer has exactly one producer and one consumer, so neither side ever takes a lock.
//! Corrupt, aborted or oversized packets are dropped silently.
//!
//! Start from [`link::Link`], which owns both buffers and splits into an interrupt half and an
//! application half.

pub mod buffer;
pub mod circ;
pub mod config;
pub mod crc;
pub mod diag;
pub mod escape;
pub mod link;
mod log;
#[cfg(feature = "nrf")]
pub mod nrf;
pub mod rx;
pub mod transport;
pub mod tx;

pub use buffer::{Consumer, PacketBuffer, Producer, RingState};
pub use config::Config;
pub use diag::ErrorPacket;
pub use link::{Link, LinkApp, LinkIsr};
pub use rx::{Receiver, RxState, RxStatus};
pub use transport::{SerialPort, SoftNotify, TxNotify};
pub use tx::{Sender, Transmitter, encode_frame};

/// Default size of each byte ring.
pub const BYTE_RING_SIZE: usize = 32;
/// Default number of boundary slots in each ring.
pub const BOUND_RING_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub enum Error {
    AlreadyInitialized,
    BufferTooShort,
    PacketTooLong,
    #[cfg(any(test, feature = "std"))]
    Io(std::io::ErrorKind),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AlreadyInitialized => f.write_str("buffer already split"),
            Error::BufferTooShort => f.write_str("destination shorter than packet"),
            Error::PacketTooLong => f.write_str("packet does not fit"),
            #[cfg(any(test, feature = "std"))]
            Error::Io(kind) => write!(f, "transport i/o: {kind}"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(any(test, feature = "std"))]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.kind())
    }
}
