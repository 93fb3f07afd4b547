//! Circular index arithmetic over power-of-two regions
//!
//! `head` is where the producer writes next, `tail` is where the consumer reads next. One slot
//! is always left unused so that `head == tail` can only mean "empty".
//!
//! Every modulus `n` must be a power of two; the wrap is a bitmask, not a division.

/// Checks at compile time that `n` can be used as a ring modulus with `u8` offsets.
pub(crate) const fn assert_ring_size(n: usize) {
    assert!(n.is_power_of_two(), "ring size must be a power of two");
    assert!(n >= 2, "ring size must be at least 2");
    assert!(n <= 256, "ring size must fit u8 offsets");
}

#[inline(always)]
const fn mask(n: usize) -> usize {
    n - 1
}

/// `(i + 1) mod n`
#[inline(always)]
pub const fn next(i: usize, n: usize) -> usize {
    (i + 1) & mask(n)
}

/// `(i + by) mod n`
#[inline(always)]
pub const fn advance(i: usize, by: usize, n: usize) -> usize {
    (i + by) & mask(n)
}

/// Number of elements in `[tail, head)`.
#[inline(always)]
pub const fn count(head: usize, tail: usize, n: usize) -> usize {
    head.wrapping_sub(tail) & mask(n)
}

/// Number of free elements, keeping one slot in reserve.
#[inline(always)]
pub const fn space(head: usize, tail: usize, n: usize) -> usize {
    count(tail, head + 1, n)
}

/// Like [`count`], but only up to the physical end of the array.
#[inline(always)]
pub const fn count_to_end(head: usize, tail: usize, n: usize) -> usize {
    let end = n - tail;
    let c = (head + end) & mask(n);
    if c < end { c } else { end }
}

/// Like [`space`], but only up to the physical end of the array.
#[inline(always)]
pub const fn space_to_end(head: usize, tail: usize, n: usize) -> usize {
    let end = n - 1 - head;
    let s = (end + tail) & mask(n);
    if s <= end { s } else { end + 1 }
}
