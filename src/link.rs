//! Link: both rings plus the split into interrupt and application halves
//!
//! ```ignore
//! static LINK: Link = Link::new();
//! static NOTIFY: MyUartNotify = MyUartNotify;
//!
//! let (isr, mut app) = LINK.try_split(&NOTIFY, &Config::default())?;
//! // move `isr` to the interrupt handler, keep `app` in the main loop
//! ```

use core::future::poll_fn;
use core::task::Poll;

use embassy_sync::waitqueue::AtomicWaker;

use crate::buffer::{Consumer, PacketBuffer, RingState};
use crate::config::Config;
use crate::rx::{Receiver, RxState, RxStatus};
use crate::transport::{SerialPort, TxNotify};
use crate::tx::{Sender, Transmitter};
use crate::{BOUND_RING_SIZE, BYTE_RING_SIZE, Error};

pub struct Link<const BYTES: usize = BYTE_RING_SIZE, const BOUNDS: usize = BOUND_RING_SIZE> {
    rx: PacketBuffer<BYTES, BOUNDS>,
    tx: PacketBuffer<BYTES, BOUNDS>,
    rx_waker: AtomicWaker,
}

impl<const BYTES: usize, const BOUNDS: usize> Default for Link<BYTES, BOUNDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BYTES: usize, const BOUNDS: usize> Link<BYTES, BOUNDS> {
    pub const fn new() -> Self {
        Self {
            rx: PacketBuffer::new(),
            tx: PacketBuffer::new(),
            rx_waker: AtomicWaker::new(),
        }
    }

    /// Splits the link into the half driven by the serial interrupt and the half used by the
    /// application. Fails if the link was already split.
    pub fn try_split<'a, N: TxNotify>(
        &'a self,
        notify: &'a N,
        config: &Config,
    ) -> Result<(LinkIsr<'a, N, BYTES, BOUNDS>, LinkApp<'a, N, BYTES, BOUNDS>), Error> {
        let (rx_w, rx_r) = self.rx.try_split()?;
        let (tx_w, tx_r) = self.tx.try_split()?;

        Ok((
            LinkIsr {
                rx: Receiver::new(rx_w, config.drop_on).with_waker(&self.rx_waker),
                tx: Transmitter::new(tx_r, notify),
                notify,
            },
            LinkApp {
                rx: rx_r,
                tx: Sender::new(tx_w, notify),
                waker: &self.rx_waker,
            },
        ))
    }
}

/// Interrupt half: receive state machine and transmit driver.
pub struct LinkIsr<
    'a,
    N: TxNotify,
    const BYTES: usize = BYTE_RING_SIZE,
    const BOUNDS: usize = BOUND_RING_SIZE,
> {
    rx: Receiver<'a, BYTES, BOUNDS>,
    tx: Transmitter<'a, N, BYTES, BOUNDS>,
    notify: &'a N,
}

impl<N: TxNotify, const BYTES: usize, const BOUNDS: usize> LinkIsr<'_, N, BYTES, BOUNDS> {
    /// Receive interrupt: one byte and its line status.
    pub fn on_rx_byte(&mut self, byte: u8, status: RxStatus) {
        self.rx.on_byte(byte, status);
    }

    /// Transmit-ready interrupt: the byte to send, or `None` after the notification has been
    /// masked because nothing is queued.
    pub fn next_tx_byte(&mut self) -> Option<u8> {
        self.tx.next_byte()
    }

    /// Moves everything `port` has received into the receive ring, then feeds it bytes to send
    /// for as long as the transmit notification is unmasked and the port is ready.
    ///
    /// This is the interrupt half and must never run concurrently with [`LinkApp`]. With a
    /// notification that cannot re-raise itself, such as [`crate::SoftNotify`], a packet
    /// committed while the driver is between finding the ring empty and locking stays queued
    /// until the next `frame_send`. On a hosted build call it from the thread that owns the
    /// [`LinkApp`], or hold one lock around both.
    pub fn service<S: SerialPort>(&mut self, port: &mut S) -> Result<(), S::Error> {
        while let Some((byte, status)) = port.read_byte()? {
            self.rx.on_byte(byte, status);
        }

        let mut wrote = false;
        while self.notify.is_unlocked() && port.write_ready() {
            match self.tx.next_byte() {
                Some(byte) => {
                    port.write_byte(byte)?;
                    wrote = true;
                }
                None => break,
            }
        }
        if wrote {
            port.flush()?;
        }
        Ok(())
    }

    pub fn rx_state(&self) -> RxState {
        self.rx.state()
    }

    pub fn rx_snapshot(&self) -> RingState {
        self.rx.snapshot()
    }

    pub fn tx_snapshot(&self) -> RingState {
        self.tx.snapshot()
    }
}

/// Application half: reads received packets and queues packets to send.
///
/// Packets are never released implicitly; call [`Self::advance_to_next_packet`] once done
/// with one, or use [`Self::recv`] which does both.
pub struct LinkApp<
    'a,
    N: TxNotify,
    const BYTES: usize = BYTE_RING_SIZE,
    const BOUNDS: usize = BOUND_RING_SIZE,
> {
    rx: Consumer<'a, BYTES, BOUNDS>,
    tx: Sender<'a, N, BYTES, BOUNDS>,
    waker: &'a AtomicWaker,
}

impl<'a, N: TxNotify, const BYTES: usize, const BOUNDS: usize> LinkApp<'a, N, BYTES, BOUNDS> {
    pub fn packet_count(&self) -> usize {
        self.rx.packet_count()
    }

    pub fn has_packet(&self) -> bool {
        self.rx.has_packet()
    }

    pub fn current_packet_length(&self) -> usize {
        self.rx.current_packet_length()
    }

    pub fn peek_byte(&mut self) -> u8 {
        self.rx.peek_byte()
    }

    pub fn copy_packet(&mut self, dst: &mut [u8]) -> usize {
        self.rx.copy_packet(dst)
    }

    pub fn advance_to_next_packet(&mut self) {
        self.rx.advance_to_next_packet()
    }

    /// Copies the oldest packet into `buf` and releases it. Returns the number of bytes copied,
    /// which is the whole packet unless part of it was already read with `peek_byte`.
    ///
    /// `Ok(None)` when nothing is queued. A packet longer than `buf` is still released, with
    /// `Err(BufferTooShort)`, so that one oversized packet cannot wedge the queue.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        if !self.rx.has_packet() {
            return Ok(None);
        }

        let unread = self.rx.remaining();
        self.rx.copy_packet(buf);
        self.rx.advance_to_next_packet();
        if unread > buf.len() {
            return Err(Error::BufferTooShort);
        }
        Ok(Some(unread))
    }

    /// Waits until at least one packet is queued and returns how many are.
    pub async fn wait_packet(&mut self) -> usize {
        poll_fn(|cx| {
            self.waker.register(cx.waker());

            match self.rx.packet_count() {
                0 => Poll::Pending,
                n => Poll::Ready(n),
            }
        })
        .await
    }

    /// [`Self::recv`] that waits for a packet.
    pub async fn recv_async(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            if let Some(len) = self.recv(buf)? {
                return Ok(len);
            }
            self.wait_packet().await;
        }
    }

    pub fn frame_send(&mut self, data: &[u8]) -> bool {
        self.tx.frame_send(data)
    }

    pub fn frame_start(&mut self) {
        self.tx.frame_start()
    }

    pub fn frame_append_u8(&mut self, x: u8) {
        self.tx.frame_append_u8(x)
    }

    pub fn frame_append_u16(&mut self, x: u16) {
        self.tx.frame_append_u16(x)
    }

    pub fn frame_append(&mut self, data: &[u8]) {
        self.tx.frame_append(data)
    }

    pub fn frame_done(&mut self) -> bool {
        self.tx.frame_done()
    }

    pub fn sender(&mut self) -> &mut Sender<'a, N, BYTES, BOUNDS> {
        &mut self.tx
    }

    pub fn rx_snapshot(&self) -> RingState {
        self.rx.snapshot()
    }

    pub fn tx_snapshot(&self) -> RingState {
        self.tx.snapshot()
    }
}
