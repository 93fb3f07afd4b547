//! Transmit side
//!
//! [`Sender`] runs in the main loop and fills the transmit ring, either a whole packet at a time
//! ([`Sender::frame_send`]) or field by field ([`Sender::frame_start`] ..
//! [`Sender::frame_done`]). [`Transmitter`] runs in the transmit-ready interrupt and turns the
//! ring back into line bytes, one per call.

use crate::Error;
use crate::buffer::{Consumer, Producer, RingState};
use crate::crc::{CRC_INIT, CRC_SIZE, crc_ccitt, crc_trailer, crc_update};
use crate::escape::{ESCAPE, ESCAPE_MASK, START, escape, needs_escape};
use crate::log::{debug, trace, warn};
use crate::transport::TxNotify;

/// Transmit driver, the consumer of the transmit ring.
///
/// Escaping happens in place: when the next byte is a sentinel, ESCAPE goes out and the
/// buffered byte is rewritten to its masked form, which the following call then sends.
pub struct Transmitter<'a, N: TxNotify, const BYTES: usize, const BOUNDS: usize> {
    ring: Consumer<'a, BYTES, BOUNDS>,
    notify: &'a N,
    packet_started: bool,
}

impl<'a, N: TxNotify, const BYTES: usize, const BOUNDS: usize> Transmitter<'a, N, BYTES, BOUNDS> {
    pub fn new(ring: Consumer<'a, BYTES, BOUNDS>, notify: &'a N) -> Self {
        Self {
            ring,
            notify,
            packet_started: false,
        }
    }

    /// Next byte to put on the line.
    ///
    /// Returns `None` once nothing is queued, after masking the transmit-ready notification.
    pub fn next_byte(&mut self) -> Option<u8> {
        if !self.ring.has_packet() {
            self.packet_started = false;
            self.notify.lock();
            return None;
        }

        if !self.packet_started {
            self.packet_started = true;
            return Some(START);
        }

        match self.ring.unread_byte() {
            None => {
                // The closing START doubles as the opening START of the next packet.
                self.ring.advance_to_next_packet();
                if self.ring.has_packet() {
                    self.packet_started = true;
                } else {
                    self.packet_started = false;
                    self.notify.lock();
                }
                Some(START)
            }
            Some(b) if needs_escape(b) => {
                self.ring.replace_unread_byte(b ^ ESCAPE_MASK);
                Some(ESCAPE)
            }
            Some(b) => {
                self.ring.peek_byte();
                Some(b)
            }
        }
    }

    pub fn snapshot(&self) -> RingState {
        self.ring.snapshot()
    }
}

/// Main-loop producer of the transmit ring.
pub struct Sender<'a, N: TxNotify, const BYTES: usize, const BOUNDS: usize> {
    ring: Producer<'a, BYTES, BOUNDS>,
    notify: &'a N,
    building: bool,
    crc: u16,
}

impl<'a, N: TxNotify, const BYTES: usize, const BOUNDS: usize> Sender<'a, N, BYTES, BOUNDS> {
    pub fn new(ring: Producer<'a, BYTES, BOUNDS>, notify: &'a N) -> Self {
        Self {
            ring,
            notify,
            building: false,
            crc: CRC_INIT,
        }
    }

    /// Queues `data` as one packet.
    ///
    /// Either the whole packet and its CRC are queued or nothing is: when the ring is short
    /// of bytes or boundary slots the packet is dropped. Returns whether it was queued.
    /// A packet being built with [`Self::frame_start`] is abandoned.
    pub fn frame_send(&mut self, data: &[u8]) -> bool {
        if self.building {
            warn!("tx: frame_send during a build, abandoning the build");
            self.abort();
        }

        if data.is_empty() {
            return false;
        }

        if data.len() + CRC_SIZE > self.ring.free_bytes() || !self.ring.can_commit() {
            debug!("tx: no room for {} bytes, dropping", data.len());
            return false;
        }

        let crc = crc_ccitt(data);
        if !(self.ring.push_slice(data) && self.ring.push_slice(&crc_trailer(crc))) {
            self.ring.rollback();
            return false;
        }

        self.publish()
    }

    /// Opens a packet to be filled with the `frame_append_*` calls.
    ///
    /// Does nothing, leaving the builder inactive, when no packet could be committed anyway.
    /// Calling it again restarts the packet.
    pub fn frame_start(&mut self) {
        self.ring.rollback();
        if !self.ring.can_commit() {
            debug!("tx: no boundary slot, not starting");
            self.building = false;
            return;
        }

        self.building = true;
        self.crc = CRC_INIT;
    }

    pub fn frame_append_u8(&mut self, x: u8) {
        self.append(&[x]);
    }

    /// Appends `x` most significant byte first.
    pub fn frame_append_u16(&mut self, x: u16) {
        self.append(&x.to_be_bytes());
    }

    /// Appends `data` as a unit: it fits with room for the trailer, or the packet is aborted.
    pub fn frame_append(&mut self, data: &[u8]) {
        self.append(data);
    }

    fn append(&mut self, data: &[u8]) {
        if !self.building {
            return;
        }

        if self.ring.free_bytes() < data.len() + CRC_SIZE || !self.ring.push_slice(data) {
            debug!("tx: build overflow, dropping packet");
            self.abort();
            return;
        }

        self.crc = data.iter().fold(self.crc, |crc, &b| crc_update(crc, b));
    }

    /// Closes the packet opened by [`Self::frame_start`] and queues it. Returns whether a
    /// packet was queued; an empty or aborted build queues nothing.
    pub fn frame_done(&mut self) -> bool {
        if !self.building {
            return false;
        }
        self.building = false;

        if self.ring.tentative_len() == 0 || !self.ring.push_slice(&crc_trailer(self.crc)) {
            self.ring.rollback();
            return false;
        }

        self.publish()
    }

    /// Whether a packet is open for appending.
    pub fn is_building(&self) -> bool {
        self.building
    }

    fn abort(&mut self) {
        self.building = false;
        self.ring.rollback();
    }

    fn publish(&mut self) -> bool {
        if !self.ring.commit() {
            return false;
        }
        trace!("tx: queued packet");
        self.notify.unlock();
        true
    }

    pub fn snapshot(&self) -> RingState {
        self.ring.snapshot()
    }
}

/// Encodes one complete frame, both START bytes included, into `out`.
///
/// This is the path for hosts that write a whole frame at once instead of running a
/// [`Transmitter`]. Returns the number of bytes written.
pub fn encode_frame(payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    let crc = crc_ccitt(payload);
    let trailer = crc_trailer(crc);
    let mut n = 0;

    let mut put = |b: u8| -> Result<(), Error> {
        let slot = out.get_mut(n).ok_or(Error::PacketTooLong)?;
        *slot = b;
        n += 1;
        Ok(())
    };

    put(START)?;
    for &b in payload.iter().chain(trailer.iter()) {
        let (wire, len) = escape(b);
        for &w in &wire[..len] {
            put(w)?;
        }
    }
    put(START)?;

    Ok(n)
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::buffer::PacketBuffer;
    use crate::transport::SoftNotify;

    fn drain<N: TxNotify>(tx: &mut Transmitter<'_, N, 32, 8>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = tx.next_byte() {
            out.push(b);
        }
        out
    }

    fn expected(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in payloads {
            let mut frame = [0u8; 80];
            let n = encode_frame(p, &mut frame).unwrap();
            // consecutive frames share a START
            let skip = if out.is_empty() { 0 } else { 1 };
            out.extend_from_slice(&frame[skip..n]);
        }
        out
    }

    #[test]
    fn drain_with_nothing_queued_locks_the_notification() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (_p, c) = buf.try_split().unwrap();
        let mut tx = Transmitter::new(c, &notify);
        notify.unlock();
        assert_eq!(tx.next_byte(), None);
        assert!(!notify.is_unlocked());
    }

    #[test]
    fn frame_send_escapes_on_the_fly() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        assert!(sender.frame_send(&[0x01, 0x7E, 0x02]));
        assert!(notify.is_unlocked());

        let line = drain(&mut tx);
        assert_eq!(&line[..5], &[START, 0x01, 0x7D, 0x5E, 0x02]);
        assert_eq!(line, expected(&[&[0x01, 0x7E, 0x02]]));
        assert_eq!(*line.last().unwrap(), START);
        assert!(!notify.is_unlocked());
        assert_eq!(tx.snapshot().packets, 0);
    }

    #[test]
    fn back_to_back_packets_share_a_start() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        assert!(sender.frame_send(b"ab"));
        assert!(sender.frame_send(b"cd"));
        let line = drain(&mut tx);
        assert_eq!(line, expected(&[b"ab", b"cd"]));
        assert_eq!(line.iter().filter(|&&b| b == START).count(), 3);
    }

    #[test]
    fn frame_send_refuses_what_does_not_fit() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, _c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);

        assert!(!sender.frame_send(&[]));
        assert!(!sender.frame_send(&[0; 30]));
        assert_eq!(sender.snapshot().bytes, 0);
        assert!(!notify.is_unlocked());
        assert!(sender.frame_send(&[0; 29]));
        assert!(!sender.frame_send(&[0]));
        assert_eq!(sender.snapshot().packets, 1);
    }

    #[test]
    fn packet_count_never_passes_the_boundary_limit() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, _c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);

        let mut queued = 0;
        for i in 0..10u8 {
            if sender.frame_send(&[i]) {
                queued += 1;
            }
            assert!(sender.snapshot().packets <= 7);
        }
        assert_eq!(queued, 6);
    }

    #[test]
    fn builder_matches_frame_send() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        sender.frame_start();
        sender.frame_append_u8(b'b');
        sender.frame_append_u16(0x7E7D);
        sender.frame_append(&[0x00, 0x7F]);
        assert!(sender.frame_done());
        assert!(!sender.is_building());

        assert_eq!(drain(&mut tx), expected(&[&[b'b', 0x7E, 0x7D, 0x00, 0x7F]]));
    }

    #[test]
    fn builder_overflow_drops_the_whole_packet() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        assert!(sender.frame_send(b"keep"));
        let before = sender.snapshot();

        sender.frame_start();
        for i in 0..40u8 {
            sender.frame_append_u8(i);
        }
        assert!(!sender.is_building());
        // appends after the abort are ignored
        sender.frame_append_u16(0xBEEF);
        assert!(!sender.frame_done());
        assert_eq!(sender.snapshot(), before);

        assert!(sender.frame_send(b"next"));
        assert_eq!(drain(&mut tx), expected(&[b"keep", b"next"]));
    }

    #[test]
    fn build_can_fill_the_ring_to_the_last_byte() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        let before = sender.snapshot();
        sender.frame_start();
        sender.frame_append(&[0x55; 29]);
        assert!(sender.is_building());
        sender.frame_append_u8(0x01);
        assert!(!sender.is_building());
        assert!(!sender.frame_done());
        assert_eq!(sender.snapshot(), before);

        sender.frame_start();
        sender.frame_append(&[0x55; 29]);
        assert!(sender.frame_done());
        assert_eq!(sender.snapshot().bytes, 31);
        assert_eq!(drain(&mut tx), expected(&[&[0x55; 29]]));
    }

    #[test]
    fn appends_before_start_are_ignored() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, _c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);

        sender.frame_append_u8(1);
        sender.frame_append_u16(2);
        assert!(!sender.frame_done());
        assert_eq!(sender.snapshot().packets, 0);

        sender.frame_start();
        assert!(!sender.frame_done(), "empty build");
        assert_eq!(sender.snapshot().packets, 0);
    }

    #[test]
    fn frame_send_abandons_an_open_build() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        sender.frame_start();
        sender.frame_append_u8(0xAA);
        assert!(sender.frame_send(&[0x01]));
        assert!(!sender.frame_done());
        assert_eq!(drain(&mut tx), expected(&[&[0x01]]));
    }

    #[test]
    fn draining_frees_room_for_more() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        for round in 0..10u8 {
            let data = [round; 20];
            assert!(sender.frame_send(&data), "round {round}");
            assert_eq!(drain(&mut tx), expected(&[&data]));
        }
    }

    #[test]
    fn late_lock_holds_packets_until_the_next_send() {
        let notify = SoftNotify::new();
        let buf = PacketBuffer::<32, 8>::new();
        let (p, c) = buf.try_split().unwrap();
        let mut sender = Sender::new(p, &notify);
        let mut tx = Transmitter::new(c, &notify);

        assert!(sender.frame_send(b"a"));
        // driver saw an empty ring before the commit, masks after it
        notify.lock();
        assert!(!notify.is_unlocked());
        assert_eq!(tx.snapshot().packets, 1);

        assert!(sender.frame_send(b"b"));
        assert!(notify.is_unlocked());
        assert_eq!(drain(&mut tx), expected(&[b"a", b"b"]));
        assert!(!notify.is_unlocked());
    }

    #[test]
    fn encode_frame_reports_short_output() {
        let mut out = [0u8; 5];
        assert!(matches!(encode_frame(&[1, 2, 3], &mut out), Err(Error::PacketTooLong)));
        let mut out = [0u8; 7];
        assert_eq!(encode_frame(&[1, 2, 3], &mut out).unwrap(), 7);
        assert_eq!(out, [START, 1, 2, 3, 0xC4, 0x62, START]);
    }
}
