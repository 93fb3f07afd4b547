//! Receive state machine
//!
//! Runs in the receive interrupt, one call per line byte. Decoded payload bytes go straight
//! into the tentative region of the receive ring; the packet is published on the closing
//! START only if its CRC folds to zero.

use core::ops::BitOr;

use embassy_sync::waitqueue::AtomicWaker;

use crate::buffer::{Producer, RingState};
use crate::crc::{CRC_INIT, CRC_SIZE, crc_update};
use crate::escape::{Decoded, START, Unescaper};
use crate::log::{debug, trace};

/// Line status reported alongside a received byte.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus(u8);

impl RxStatus {
    pub const OK: Self = Self(0);
    pub const FRAMING: Self = Self(1 << 0);
    pub const OVERRUN: Self = Self(1 << 1);
    pub const PARITY: Self = Self(1 << 2);
    pub const BREAK: Self = Self(1 << 3);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RxStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for a START; everything else is noise.
    Idle,
    /// Accumulating a packet.
    InPacket,
}

pub struct Receiver<'a, const BYTES: usize, const BOUNDS: usize> {
    ring: Producer<'a, BYTES, BOUNDS>,
    unescaper: Unescaper,
    started: bool,
    crc: u16,
    drop_on: RxStatus,
    waker: Option<&'a AtomicWaker>,
}

impl<'a, const BYTES: usize, const BOUNDS: usize> Receiver<'a, BYTES, BOUNDS> {
    pub fn new(ring: Producer<'a, BYTES, BOUNDS>, drop_on: RxStatus) -> Self {
        Self {
            ring,
            unescaper: Unescaper::new(),
            started: false,
            crc: CRC_INIT,
            drop_on,
            waker: None,
        }
    }

    /// Wakes `waker` every time a packet is published.
    pub fn with_waker(mut self, waker: &'a AtomicWaker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn state(&self) -> RxState {
        if self.started { RxState::InPacket } else { RxState::Idle }
    }

    /// Feeds one byte from the line.
    pub fn on_byte(&mut self, byte: u8, status: RxStatus) {
        if status.intersects(self.drop_on) {
            debug!("rx: line error {:?}, dropping", status);
            self.drop_packet();
            return;
        }

        if byte != START && !self.started {
            return;
        }

        match self.unescaper.feed(byte) {
            Decoded::Start => {
                self.finish_packet();
                self.started = true;
                self.crc = CRC_INIT;
            }
            Decoded::Reset => {
                debug!("rx: reset");
                self.drop_packet();
            }
            Decoded::Pending => {}
            Decoded::Byte(b) => {
                self.crc = crc_update(self.crc, b);
                if !self.ring.push(b) {
                    debug!("rx: ring full, dropping");
                    self.drop_packet();
                }
            }
        }
    }

    /// Handles the START that closes the packet in progress. An empty packet is just an idle
    /// START and leaves nothing behind.
    fn finish_packet(&mut self) {
        let len = self.ring.tentative_len();
        if len == 0 {
            return;
        }

        if len <= CRC_SIZE {
            debug!("rx: runt of {} bytes", len);
            self.ring.rollback();
        } else if self.crc != 0 {
            debug!("rx: crc mismatch ({=u16:#x})", self.crc);
            self.ring.rollback();
        } else if self.ring.trim(CRC_SIZE) && self.ring.commit() {
            trace!("rx: packet of {} bytes", len - CRC_SIZE);
            if let Some(waker) = self.waker {
                waker.wake();
            }
        } else {
            debug!("rx: no boundary slot, dropping");
        }
    }

    fn drop_packet(&mut self) {
        self.started = false;
        self.unescaper.reset();
        self.crc = CRC_INIT;
        self.ring.rollback();
    }

    pub fn snapshot(&self) -> RingState {
        self.ring.snapshot()
    }
}
