//! Diagnostic error packet
//!
//! ```text
//! | 'c' | errnum | line (BE u16) | file (6 bytes, NUL padded) |
//! ```
//!
//! Reports where firmware hit an error, over the same link as everything else. Use the
//! [`send_error!`](crate::send_error) macro so that the line and file are filled in.

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::Error;
use crate::crc::CRC_SIZE;
use crate::log::warn;
use crate::transport::TxNotify;
use crate::tx::Sender;

pub const KIND_ERROR: u8 = b'c';
pub const FILE_LEN: usize = 6;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(C)]
pub struct ErrorPacket {
    pub kind: u8,
    pub errnum: u8,
    pub line: U16<BigEndian>,
    pub file: [u8; FILE_LEN],
}

impl ErrorPacket {
    pub const SIZE: usize = size_of::<Self>();

    /// `file` is cut down to its last path component, then to [`FILE_LEN`] bytes.
    pub fn new(errnum: u8, line: u16, file: &str) -> Self {
        let base = file.rsplit(['/', '\\']).next().unwrap_or(file).as_bytes();
        let mut name = [0u8; FILE_LEN];
        let n = base.len().min(FILE_LEN);
        name[..n].copy_from_slice(&base[..n]);

        Self {
            kind: KIND_ERROR,
            errnum,
            line: U16::new(line),
            file: name,
        }
    }

    /// Reads an error packet out of a received payload.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let pkt = Self::read_from_bytes(payload).ok()?;
        (pkt.kind == KIND_ERROR).then_some(pkt)
    }

    pub fn line(&self) -> u16 {
        self.line.get()
    }

    /// File name without the NUL padding.
    pub fn file_name(&self) -> &[u8] {
        let end = self.file.iter().position(|&b| b == 0).unwrap_or(FILE_LEN);
        &self.file[..end]
    }
}

impl<N: TxNotify, const BYTES: usize, const BOUNDS: usize> Sender<'_, N, BYTES, BOUNDS> {
    /// Queues an [`ErrorPacket`].
    ///
    /// `Ok(false)` when the ring is momentarily full, `Err(PacketTooLong)` when the ring could
    /// never hold one.
    pub fn send_error(&mut self, errnum: u8, line: u16, file: &str) -> Result<bool, Error> {
        if ErrorPacket::SIZE + CRC_SIZE > BYTES - 1 {
            return Err(Error::PacketTooLong);
        }

        let pkt = ErrorPacket::new(errnum, line, file);
        let queued = self.frame_send(pkt.as_bytes());
        if !queued {
            warn!("diag: error {} at line {} not queued", errnum, line);
        }
        Ok(queued)
    }
}

/// Sends an [`ErrorPacket`] stamped with the calling line and file.
///
/// ```ignore
/// send_error!(app.sender(), 3)?;
/// ```
#[macro_export]
macro_rules! send_error {
    ($sender:expr, $errnum:expr) => {
        $sender.send_error($errnum, line!() as u16, file!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PacketBuffer;
    use crate::transport::SoftNotify;

    #[test]
    fn layout_is_packed_and_big_endian() {
        let pkt = ErrorPacket::new(7, 0x0102, "src/motor.rs");
        assert_eq!(ErrorPacket::SIZE, 10);
        assert_eq!(pkt.as_bytes(), b"c\x07\x01\x02motor.");
        assert_eq!(pkt.file_name(), b"motor.");
    }

    #[test]
    fn short_names_are_nul_padded() {
        let pkt = ErrorPacket::new(1, 9, "a.c");
        assert_eq!(pkt.file, *b"a.c\0\0\0");
        assert_eq!(pkt.file_name(), b"a.c");
    }

    #[test]
    fn parse_checks_kind_and_length() {
        let pkt = ErrorPacket::new(42, 300, "lib.rs");
        assert_eq!(ErrorPacket::parse(pkt.as_bytes()), Some(pkt));
        assert_eq!(ErrorPacket::parse(&pkt.as_bytes()[..9]), None);

        let mut other = [0u8; ErrorPacket::SIZE];
        other.copy_from_slice(pkt.as_bytes());
        other[0] = b'a';
        assert_eq!(ErrorPacket::parse(&other), None);
    }

    #[test]
    fn macro_queues_a_packet() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, mut c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);

        assert!(send_error!(sender, 5).unwrap());
        let mut out = [0u8; 16];
        let n = c.copy_packet(&mut out);
        assert_eq!(n, ErrorPacket::SIZE + CRC_SIZE);
        let pkt = ErrorPacket::parse(&out[..ErrorPacket::SIZE]).unwrap();
        assert_eq!(pkt.errnum, 5);
        assert_eq!(pkt.file_name(), b"diag.r");
        assert!(pkt.line() > 0);
    }

    #[test]
    fn too_small_ring_is_an_error() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<8, 4>::new();
        let (p, _c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        assert!(matches!(sender.send_error(1, 1, "x"), Err(Error::PacketTooLong)));
    }
}
