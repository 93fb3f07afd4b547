//! Byte transports
//!
//! The framing core never touches hardware itself. It needs a way to mask and unmask the
//! "transmitter ready" notification ([`TxNotify`]) and, for the generic
//! [`crate::LinkIsr::service`] loop, a port that hands out received bytes and takes bytes to send
//! ([`SerialPort`]).

use core::sync::atomic::{AtomicBool, Ordering, compiler_fence};

use crate::rx::RxStatus;

/// Transmit-ready notification control.
///
/// Both calls must act as a compiler barrier: every ring write before `unlock` must be emitted
/// before the notification can fire.
pub trait TxNotify {
    /// Masks the notification. Called by the transmit driver when it runs dry.
    fn lock(&self);
    /// Unmasks the notification. Called after a packet is published.
    fn unlock(&self);
    fn is_unlocked(&self) -> bool;
}

impl<T: TxNotify + ?Sized> TxNotify for &T {
    fn lock(&self) {
        (**self).lock()
    }

    fn unlock(&self) {
        (**self).unlock()
    }

    fn is_unlocked(&self) -> bool {
        (**self).is_unlocked()
    }
}

/// A serial line, byte at a time.
pub trait SerialPort {
    type Error;

    /// Next received byte and its line status, or `None` if nothing is waiting.
    fn read_byte(&mut self) -> Result<Option<(u8, RxStatus)>, Self::Error>;

    /// Whether [`Self::write_byte`] can take a byte right now.
    fn write_ready(&mut self) -> bool {
        true
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Pushes out anything the port buffers internally.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Notification flag with no hardware behind it, for hosted builds and tests.
///
/// It has no interrupt to pend, so an `unlock` that lands between the driver's last empty
/// check and its `lock` is lost. Drive both link halves from one thread or under one lock.
#[derive(Debug, Default)]
pub struct SoftNotify {
    enabled: AtomicBool,
}

impl SoftNotify {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
        }
    }
}

impl TxNotify for SoftNotify {
    fn lock(&self) {
        self.enabled.store(false, Ordering::Release);
        compiler_fence(Ordering::SeqCst);
    }

    fn unlock(&self) {
        compiler_fence(Ordering::SeqCst);
        self.enabled.store(true, Ordering::Release);
    }

    fn is_unlocked(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(any(test, feature = "std"))]
pub use hosted::IoPort;

#[cfg(any(test, feature = "std"))]
mod hosted {
    use std::io::{self, ErrorKind, Read, Write};

    use super::SerialPort;
    use crate::rx::RxStatus;

    /// Hosted stand-in for the UART: any reader/writer pair, e.g. a pipe, a pty or a file.
    ///
    /// Reads are expected to be non-blocking (or the reader finite); `WouldBlock`,
    /// `Interrupted` and end of input all mean "nothing waiting".
    ///
    /// [`crate::LinkIsr::service`] must not run concurrently with the application half, see
    /// [`super::SoftNotify`].
    pub struct IoPort<R, W> {
        reader: R,
        writer: W,
    }

    impl<R: Read, W: Write> IoPort<R, W> {
        pub fn new(reader: R, writer: W) -> Self {
            Self { reader, writer }
        }

        pub fn into_inner(self) -> (R, W) {
            (self.reader, self.writer)
        }

        pub fn writer(&self) -> &W {
            &self.writer
        }
    }

    impl<R: Read, W: Write> SerialPort for IoPort<R, W> {
        type Error = io::Error;

        fn read_byte(&mut self) -> io::Result<Option<(u8, RxStatus)>> {
            let mut byte = [0u8; 1];
            match self.reader.read(&mut byte) {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some((byte[0], RxStatus::OK))),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }

        fn write_byte(&mut self, byte: u8) -> io::Result<()> {
            self.writer.write_all(&[byte])
        }

        fn flush(&mut self) -> io::Result<()> {
            self.writer.flush()
        }
    }

    #[cfg(test)]
    mod tests {
        use std::io::Cursor;

        use super::*;

        #[test]
        fn reads_until_input_is_exhausted() {
            let mut port = IoPort::new(Cursor::new(vec![0x7E, 0x01]), Vec::new());
            assert_eq!(port.read_byte().unwrap(), Some((0x7E, RxStatus::OK)));
            assert_eq!(port.read_byte().unwrap(), Some((0x01, RxStatus::OK)));
            assert_eq!(port.read_byte().unwrap(), None);
            port.write_byte(0x55).unwrap();
            port.flush().unwrap();
            assert_eq!(port.writer(), &vec![0x55]);
        }

        #[test]
        fn hard_errors_surface_as_link_errors() {
            struct Broken;
            impl Read for Broken {
                fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                    Err(ErrorKind::BrokenPipe.into())
                }
            }

            let mut port = IoPort::new(Broken, Vec::new());
            let err = crate::Error::from(port.read_byte().unwrap_err());
            assert!(matches!(err, crate::Error::Io(ErrorKind::BrokenPipe)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_notify_starts_locked() {
        let n = SoftNotify::new();
        assert!(!n.is_unlocked());
        n.unlock();
        assert!(n.is_unlocked());
        (&n).lock();
        assert!(!n.is_unlocked());
    }
}
