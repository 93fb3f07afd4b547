//! Dual-ring packet buffer
//!
//! ```text
//! bounds: | b0 | b1 | b2 | b3 | .. |        bytes: | .. p0 .. | .. p1 .. | tentative | free |
//!           ^tail     ^head ^head+1                 ^b0        ^b1        ^b2         ^b3
//! ```
//!
//! `bounds[i]..bounds[i + 1]` is packet `i`. `bounds[tail]` doubles as the consumer's read
//! cursor and `bounds[head + 1]` as the producer's running write position. A packet is
//! published by a single store of `head`; nothing the producer writes beyond it is visible.
//!
//! The slot after `head` is always owned by the producer, so at most `BOUNDS - 2` packets can
//! be queued, and at most `BYTES - 1` bytes.
//!
//! The buffer is split once into a [`Producer`] and a [`Consumer`]. Each side only stores to
//! its own index and to the boundary slots it owns; the payload bytes themselves are plain,
//! non-atomic memory ordered by the index stores.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering, compiler_fence};

use crate::Error;
use crate::circ::{advance, assert_ring_size, count, count_to_end, next, space, space_to_end};

pub struct PacketBuffer<const BYTES: usize, const BOUNDS: usize> {
    bytes: UnsafeCell<[u8; BYTES]>,
    bounds: [AtomicU8; BOUNDS],
    head: AtomicU8,
    tail: AtomicU8,
    taken: AtomicBool,
}

// Safety: the byte array is only touched through `Producer` and `Consumer`, of which at most
// one each exists, and their regions are disjoint as long as the index protocol holds.
unsafe impl<const BYTES: usize, const BOUNDS: usize> Sync for PacketBuffer<BYTES, BOUNDS> {}

/// Point-in-time view of a ring, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingState {
    pub head: u8,
    pub tail: u8,
    /// Committed packets not yet advanced past.
    pub packets: u8,
    /// Committed bytes not yet read, trailers included.
    pub bytes: u8,
}

impl<const BYTES: usize, const BOUNDS: usize> Default for PacketBuffer<BYTES, BOUNDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BYTES: usize, const BOUNDS: usize> PacketBuffer<BYTES, BOUNDS> {
    pub const fn new() -> Self {
        const {
            assert_ring_size(BYTES);
            assert_ring_size(BOUNDS);
        }

        Self {
            bytes: UnsafeCell::new([0; BYTES]),
            bounds: [const { AtomicU8::new(0) }; BOUNDS],
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            taken: AtomicBool::new(false),
        }
    }

    /// Hands out the two halves. Only succeeds once per buffer.
    pub fn try_split(
        &self,
    ) -> Result<(Producer<'_, BYTES, BOUNDS>, Consumer<'_, BYTES, BOUNDS>), Error> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }

        Ok((Producer { buf: self }, Consumer { buf: self, consumed: 0 }))
    }

    pub fn snapshot(&self) -> RingState {
        let head = self.head();
        let tail = self.tail();
        RingState {
            head: head as u8,
            tail: tail as u8,
            packets: count(head, tail, BOUNDS) as u8,
            bytes: count(self.bound(head), self.bound(tail), BYTES) as u8,
        }
    }

    #[inline(always)]
    fn head(&self) -> usize {
        self.head.load(Ordering::Acquire) as usize
    }

    #[inline(always)]
    fn tail(&self) -> usize {
        self.tail.load(Ordering::Acquire) as usize
    }

    #[inline(always)]
    fn bound(&self, i: usize) -> usize {
        self.bounds[i].load(Ordering::Acquire) as usize
    }

    #[inline(always)]
    fn set_bound(&self, i: usize, offset: usize) {
        self.bounds[i].store(offset as u8, Ordering::Release);
    }

    #[inline(always)]
    fn byte_ptr(&self) -> *mut u8 {
        self.bytes.get().cast::<u8>()
    }

    /// Safety: `at` must lie in a region owned by the caller.
    #[inline(always)]
    unsafe fn read_byte(&self, at: usize) -> u8 {
        debug_assert!(at < BYTES);
        unsafe { ptr::read(self.byte_ptr().add(at)) }
    }

    /// Safety: `at` must lie in a region owned by the caller.
    #[inline(always)]
    unsafe fn write_byte(&self, at: usize, byte: u8) {
        debug_assert!(at < BYTES);
        unsafe { ptr::write(self.byte_ptr().add(at), byte) }
    }

    /// Copies `dst.len()` bytes starting at `from`; the first `first` of them are contiguous,
    /// the rest continue at offset 0.
    ///
    /// Safety: the whole range must be owned by the caller.
    unsafe fn read_wrapping(&self, from: usize, dst: &mut [u8], first: usize) {
        let base = self.byte_ptr();
        unsafe {
            ptr::copy_nonoverlapping(base.add(from), dst.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }

    /// Copies `src` to `at`, wrapping after `first` bytes.
    ///
    /// Safety: the whole range must be owned by the caller.
    unsafe fn write_wrapping(&self, at: usize, src: &[u8], first: usize) {
        let base = self.byte_ptr();
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), base.add(at), first);
            ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        }
    }
}

/// Writing half. Owns `head` and the tentative region past it.
pub struct Producer<'a, const BYTES: usize, const BOUNDS: usize> {
    buf: &'a PacketBuffer<BYTES, BOUNDS>,
}

impl<const BYTES: usize, const BOUNDS: usize> Producer<'_, BYTES, BOUNDS> {
    #[inline(always)]
    fn write_slot(&self) -> usize {
        next(self.buf.head.load(Ordering::Relaxed) as usize, BOUNDS)
    }

    /// Bytes written to the packet in progress.
    pub fn tentative_len(&self) -> usize {
        let head = self.buf.head.load(Ordering::Relaxed) as usize;
        count(self.buf.bound(next(head, BOUNDS)), self.buf.bound(head), BYTES)
    }

    /// Bytes that can still be appended to the packet in progress.
    pub fn free_bytes(&self) -> usize {
        let end = self.buf.bound(self.write_slot());
        let read = self.buf.bound(self.buf.tail());
        space(end, read, BYTES)
    }

    /// Whether a boundary slot is left for one more committed packet.
    pub fn can_commit(&self) -> bool {
        next(self.write_slot(), BOUNDS) != self.buf.tail()
    }

    /// Appends one byte to the packet in progress. Returns `false` when the byte ring is full,
    /// in which case nothing is written.
    pub fn push(&mut self, byte: u8) -> bool {
        let slot = self.write_slot();
        let end = self.buf.bound(slot);
        let new_end = next(end, BYTES);
        if new_end == self.buf.bound(self.buf.tail()) {
            return false;
        }

        // Safety: `end` is past the committed region and short of the read cursor.
        unsafe { self.buf.write_byte(end, byte) };
        self.buf.set_bound(slot, new_end);
        true
    }

    /// Appends all of `data`, or nothing if it does not fit.
    pub fn push_slice(&mut self, data: &[u8]) -> bool {
        let slot = self.write_slot();
        let end = self.buf.bound(slot);
        let read = self.buf.bound(self.buf.tail());
        if data.len() > space(end, read, BYTES) {
            return false;
        }

        let first = data.len().min(space_to_end(end, read, BYTES));
        // Safety: the whole range was checked against the free space above.
        unsafe { self.buf.write_wrapping(end, data, first) };
        self.buf.set_bound(slot, advance(end, data.len(), BYTES));
        true
    }

    /// Takes the last `n` bytes back off the packet in progress. Returns `false`, leaving the
    /// packet untouched, if it is shorter than that.
    pub fn trim(&mut self, n: usize) -> bool {
        if self.tentative_len() < n {
            return false;
        }
        let slot = self.write_slot();
        let end = self.buf.bound(slot);
        self.buf.set_bound(slot, advance(end, BYTES - n, BYTES));
        true
    }

    /// Publishes the packet in progress.
    ///
    /// When no boundary slot is left the packet is rolled back instead and `false` is returned.
    pub fn commit(&mut self) -> bool {
        if !self.can_commit() {
            self.rollback();
            return false;
        }

        let slot = self.write_slot();
        // The next packet starts where this one ends.
        self.buf.set_bound(next(slot, BOUNDS), self.buf.bound(slot));

        compiler_fence(Ordering::Release);
        self.buf.head.store(slot as u8, Ordering::Release);
        true
    }

    /// Forgets everything written since the last commit.
    pub fn rollback(&mut self) {
        let head = self.buf.head.load(Ordering::Relaxed) as usize;
        self.buf.set_bound(next(head, BOUNDS), self.buf.bound(head));
    }

    pub fn snapshot(&self) -> RingState {
        self.buf.snapshot()
    }
}

/// Reading half. Owns `tail` and the read cursor at `bounds[tail]`.
pub struct Consumer<'a, const BYTES: usize, const BOUNDS: usize> {
    buf: &'a PacketBuffer<BYTES, BOUNDS>,
    // bytes already read from the oldest packet
    consumed: usize,
}

impl<const BYTES: usize, const BOUNDS: usize> Consumer<'_, BYTES, BOUNDS> {
    #[inline(always)]
    fn tail(&self) -> usize {
        self.buf.tail.load(Ordering::Relaxed) as usize
    }

    /// `(read cursor, packet end)` of the oldest packet, if any.
    #[inline(always)]
    fn front(&self) -> Option<(usize, usize)> {
        let tail = self.tail();
        if tail == self.buf.head() {
            return None;
        }
        Some((self.buf.bound(tail), self.buf.bound(next(tail, BOUNDS))))
    }

    /// Number of complete packets queued, including the one being read.
    pub fn packet_count(&self) -> usize {
        count(self.buf.head(), self.tail(), BOUNDS)
    }

    pub fn has_packet(&self) -> bool {
        self.tail() != self.buf.head()
    }

    /// Total length of the oldest packet, or 0 when the queue is empty.
    ///
    /// Does not change while the packet is being read.
    pub fn current_packet_length(&self) -> usize {
        match self.front() {
            Some((cursor, end)) => self.consumed + count(end, cursor, BYTES),
            None => 0,
        }
    }

    /// Bytes of the oldest packet not read yet.
    pub fn remaining(&self) -> usize {
        match self.front() {
            Some((cursor, end)) => count(end, cursor, BYTES),
            None => 0,
        }
    }

    /// Next unread byte of the oldest packet, or 0 when there is none.
    ///
    /// A zero byte is a valid payload value; use [`Self::remaining`] or
    /// [`Self::current_packet_length`] to tell the two apart.
    pub fn peek_byte(&mut self) -> u8 {
        match self.front() {
            Some((cursor, end)) if cursor != end => {
                // Safety: `cursor` lies inside a committed packet.
                let byte = unsafe { self.buf.read_byte(cursor) };
                self.buf.set_bound(self.tail(), next(cursor, BYTES));
                self.consumed += 1;
                byte
            }
            _ => 0,
        }
    }

    /// Copies up to `dst.len()` unread bytes of the oldest packet into `dst`.
    ///
    /// Returns the total length of the packet, which may exceed what was copied; 0 when the
    /// queue is empty.
    pub fn copy_packet(&mut self, dst: &mut [u8]) -> usize {
        let Some((cursor, end)) = self.front() else {
            return 0;
        };
        let remaining = count(end, cursor, BYTES);
        let n = dst.len().min(remaining);

        let first = n.min(count_to_end(end, cursor, BYTES));
        // Safety: `cursor..cursor + n` lies inside a committed packet.
        unsafe { self.buf.read_wrapping(cursor, &mut dst[..n], first) };

        let total = self.consumed + remaining;
        self.buf.set_bound(self.tail(), advance(cursor, n, BYTES));
        self.consumed += n;
        total
    }

    /// Releases the oldest packet.
    ///
    /// Only meaningful after [`Self::packet_count`] (or a non-zero copy) showed a packet; on an
    /// empty queue this does nothing.
    pub fn advance_to_next_packet(&mut self) {
        let tail = self.tail();
        if tail == self.buf.head() {
            return;
        }
        self.consumed = 0;
        self.buf.tail.store(next(tail, BOUNDS) as u8, Ordering::Release);
    }

    /// Unread byte at the cursor, without moving it.
    pub(crate) fn unread_byte(&self) -> Option<u8> {
        match self.front() {
            // Safety: `cursor` lies inside a committed packet.
            Some((cursor, end)) if cursor != end => Some(unsafe { self.buf.read_byte(cursor) }),
            _ => None,
        }
    }

    /// Overwrites the unread byte at the cursor. The committed region belongs to the consumer,
    /// so the producer never observes this.
    pub(crate) fn replace_unread_byte(&mut self, byte: u8) {
        if let Some((cursor, end)) = self.front() {
            if cursor != end {
                // Safety: as in `unread_byte`.
                unsafe { self.buf.write_byte(cursor, byte) };
            }
        }
    }

    pub fn snapshot(&self) -> RingState {
        self.buf.snapshot()
    }
}
