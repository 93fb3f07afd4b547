//! Byte stuffing
//!
//! ```text
//! 0x7e (START) => 0x7d, 0x5e
//! 0x7f (RESET) => 0x7d, 0x5f
//! 0x7d (ESCAPE) => 0x7d, 0x5d
//! ```

/// Frame delimiter. Ends one packet and starts the next.
pub const START: u8 = 0x7E;
/// Aborts the packet in progress.
pub const RESET: u8 = 0x7F;
/// Marks the following byte as xored with [`ESCAPE_MASK`].
pub const ESCAPE: u8 = 0x7D;
pub const ESCAPE_MASK: u8 = 0x20;

#[inline(always)]
pub const fn needs_escape(byte: u8) -> bool {
    matches!(byte, START | RESET | ESCAPE)
}

/// Wire form of one payload byte.
///
/// Returns the bytes to put on the line and how many of them are used (1 or 2).
#[inline]
pub const fn escape(byte: u8) -> ([u8; 2], usize) {
    if needs_escape(byte) {
        ([ESCAPE, byte ^ ESCAPE_MASK], 2)
    } else {
        ([byte, 0], 1)
    }
}

/// Result of feeding one line byte to an [`Unescaper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decoded {
    /// Frame delimiter, any pending escape is forgotten.
    Start,
    /// Abort signal, any pending escape is forgotten.
    Reset,
    /// Escape marker swallowed, nothing to deliver yet.
    Pending,
    /// A payload byte.
    Byte(u8),
}

/// Escape decoder. Holds only the pending-escape flag; START and RESET are always reported
/// as themselves, even right after an ESCAPE.
#[derive(Debug, Default, Clone)]
pub struct Unescaper {
    escaped: bool,
}

impl Unescaper {
    pub const fn new() -> Self {
        Self { escaped: false }
    }

    pub fn feed(&mut self, byte: u8) -> Decoded {
        match byte {
            START => {
                self.escaped = false;
                Decoded::Start
            }
            RESET => {
                self.escaped = false;
                Decoded::Reset
            }
            ESCAPE => {
                self.escaped = true;
                Decoded::Pending
            }
            b if self.escaped => {
                self.escaped = false;
                Decoded::Byte(b ^ ESCAPE_MASK)
            }
            b => Decoded::Byte(b),
        }
    }

    pub fn is_escaped(&self) -> bool {
        self.escaped
    }

    pub fn reset(&mut self) {
        self.escaped = false;
    }
}
