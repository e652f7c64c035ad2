//! Sequence numbers and serial-number comparison.
//!
//! Sequence numbers are `u32` and wrap modulo 2^32. Ordering uses serial
//! arithmetic: `a` is newer than `b` when `a - b (mod 2^32)` lies in
//! `1..2^31`, so comparisons stay correct across the wrap.

/// Half of the sequence space; distances at or beyond this are ambiguous.
const HALF_RANGE: u32 = 1 << 31;

/// Whether `a` is strictly newer than `b` in serial-number order.
#[inline]
pub fn seq_newer(a: u32, b: u32) -> bool {
    let distance = a.wrapping_sub(b);
    distance != 0 && distance < HALF_RANGE
}

/// Forward distance from `from` to `to`, modulo 2^32.
#[inline]
pub fn seq_distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}

/// Per-agent monotonic sequence counter.
///
/// Owned by the telemetry encoder. Never reset during the agent's lifetime;
/// wraps from `u32::MAX` to 0 and counts the wrap.
#[derive(Debug, Clone)]
pub struct SeqCounter {
    next: u32,
    wraps: u64,
}

impl SeqCounter {
    /// Counter whose first issued value is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Counter whose first issued value is `first`.
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: first,
            wraps: 0,
        }
    }

    /// Value the next call to [`advance`](Self::advance) will return.
    #[inline]
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Number of times the counter wrapped past `u32::MAX`.
    #[inline]
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    /// Issue the next sequence number.
    pub fn advance(&mut self) -> u32 {
        let seq = self.next;
        self.next = seq.wrapping_add(1);
        if self.next == 0 {
            self.wraps += 1;
            tracing::info!(wraps = self.wraps, "sequence counter wrapped");
        }
        seq
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}
