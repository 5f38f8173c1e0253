//! Modulo-256 sequence-number arithmetic.
//!
//! Sequence numbers are a single byte and wrap from 255 back to 0. Every
//! comparison is expressed as the signed 8-bit distance `seq - base`, which is
//! unambiguous as long as the window never exceeds half the sequence space
//! ([`MAX_WINDOW`]).

/// Largest window for which signed 8-bit distances stay unambiguous.
pub const MAX_WINDOW: usize = 128;

/// Signed distance from `base` to `seq` in wrap-around space.
///
/// Negative values mean `seq` precedes `base`.
#[inline]
pub fn seq_offset(seq: u8, base: u8) -> i8 {
    seq.wrapping_sub(base) as i8
}

/// Unsigned distance from `base` forward to `seq`, in `0..256`.
#[inline]
pub fn seq_distance(seq: u8, base: u8) -> usize {
    usize::from(seq.wrapping_sub(base))
}

/// `true` when `seq` lies in `[base, base + size)` modulo 256.
#[inline]
pub fn in_window(seq: u8, base: u8, size: usize) -> bool {
    seq_distance(seq, base) < size
}

/// A contiguous range `[base, base + size)` of sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub base: u8,
    pub size: usize,
}

impl Window {
    pub fn new(base: u8, size: usize) -> Self {
        debug_assert!(
            size > 0 && size <= MAX_WINDOW,
            "window size {size} outside 1..={MAX_WINDOW}"
        );
        Self { base, size }
    }

    pub fn contains(&self, seq: u8) -> bool {
        in_window(seq, self.base, self.size)
    }
}
