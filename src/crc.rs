//! CRC-16/CCITT as used on the wire
//!
//! This is the reflected CCITT update found in most 8-bit C libraries (polynomial `0x1021`
//! reflected to `0x8408`, initial value `0xFFFF`, no final xor). In catalogue terms it is
//! CRC-16/MCRF4XX.
//!
//! Because the register is reflected, its low byte carries the highest-order polynomial terms.
//! The trailer therefore goes out low register byte first, which is what makes the receive side
//! fold back to zero for an intact packet.

use crc::{CRC_16_MCRF4XX, Crc};

/// Initial accumulator value.
pub const CRC_INIT: u16 = 0xFFFF;

/// Bytes taken by the trailer at the end of every packet.
pub const CRC_SIZE: usize = 2;

/// Whole-buffer form of [`crc_update`].
pub const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_MCRF4XX);

/// Folds one byte into the accumulator.
#[inline]
pub const fn crc_update(crc: u16, byte: u8) -> u16 {
    let mut data = byte ^ (crc as u8);
    data ^= data << 4;
    (((data as u16) << 8) | (crc >> 8)) ^ ((data >> 4) as u16) ^ ((data as u16) << 3)
}

/// CRC of a whole buffer starting from [`CRC_INIT`].
#[inline]
pub fn crc_ccitt(data: &[u8]) -> u16 {
    CCITT.checksum(data)
}

/// Trailer bytes in wire order.
#[inline]
pub const fn crc_trailer(crc: u16) -> [u8; CRC_SIZE] {
    crc.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(init: u16, data: &[u8]) -> u16 {
        data.iter().fold(init, |crc, &b| crc_update(crc, b))
    }

    #[test]
    fn matches_catalogue_check_value() {
        assert_eq!(fold(CRC_INIT, b"123456789"), 0x6F91);
        assert_eq!(crc_ccitt(b"123456789"), 0x6F91);
    }

    #[test]
    fn incremental_matches_whole_buffer() {
        let mut data = [0u8; 64];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }
        for len in 0..data.len() {
            assert_eq!(fold(CRC_INIT, &data[..len]), crc_ccitt(&data[..len]));
        }
    }

    #[test]
    fn payload_followed_by_trailer_folds_to_zero() {
        let payloads: [&[u8]; 5] = [
            &[0x00],
            &[0x01, 0x7E, 0x02],
            &[0x7D, 0x7E, 0x7F],
            &[0xFF; 29],
            b"motor",
        ];
        for p in payloads {
            let crc = fold(CRC_INIT, p);
            assert_eq!(fold(crc, &crc_trailer(crc)), 0, "payload {p:?}");
        }

        for b in 0..=255u8 {
            let crc = crc_update(CRC_INIT, b);
            assert_eq!(fold(crc, &crc_trailer(crc)), 0);
        }
    }

    #[test]
    fn corrupted_byte_is_detected() {
        let payload = [0x10, 0x20, 0x30, 0x40];
        let crc = crc_ccitt(&payload);
        let mut wire = [0u8; 6];
        wire[..4].copy_from_slice(&payload);
        wire[4..].copy_from_slice(&crc_trailer(crc));
        wire[2] ^= 0x01;
        assert_ne!(fold(CRC_INIT, &wire), 0);
    }
}
