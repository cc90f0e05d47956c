//! Sliding window over stream or frame numbers.
//!
//! The window covers `[base, base + REORDERING_WINDOW_SIZE)`, where `base`
//! is the lowest number not yet seen. Bit `i` of the bitmap records whether
//! `base + i` has been seen. Numbers below `base` are all seen; numbers at or
//! above the top of the window are not yet acceptable.
//!
//! The same structure tracks incoming stream numbers per temporary secret
//! (persisted with the secret) and incoming frame numbers per stream.

use crate::core::{CryptoError, REORDERING_WINDOW_SIZE};

const WINDOW: u64 = REORDERING_WINDOW_SIZE as u64;

/// Base-anchored reordering window of `REORDERING_WINDOW_SIZE` numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReorderingWindow {
    base: u64,
    bitmap: u32,
}

impl ReorderingWindow {
    /// Create an empty window starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a window from its persisted parts.
    ///
    /// A bitmap whose lowest bit is set is normalized by sliding the base.
    pub fn from_parts(base: u64, bitmap: u32) -> Self {
        let mut window = Self { base, bitmap };
        window.slide();
        window
    }

    /// Lowest number not yet seen.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Seen-bits relative to [`base`](Self::base).
    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    /// Check if `number` lies inside the window.
    pub fn contains(&self, number: u64) -> bool {
        number >= self.base && number - self.base < WINDOW
    }

    /// Check if `number` has been seen. Numbers below the window count as seen.
    pub fn is_seen(&self, number: u64) -> bool {
        if number < self.base {
            return true;
        }
        let offset = number - self.base;
        offset < WINDOW && self.bitmap & (1 << offset) != 0
    }

    /// Numbers inside the window that have not been seen, in ascending order.
    pub fn unseen(&self) -> impl Iterator<Item = u64> + '_ {
        (0..WINDOW)
            .filter(|offset| self.bitmap & (1 << offset) == 0)
            .filter_map(|offset| self.base.checked_add(offset))
    }

    /// Mark `number` as seen.
    ///
    /// Returns the numbers that entered the top of the window because the
    /// base slid forward (empty if it did not move).
    pub fn mark_seen(&mut self, number: u64) -> Result<Vec<u64>, CryptoError> {
        if !self.contains(number) || self.is_seen(number) {
            return Err(CryptoError::ReplayDetected);
        }

        let old_top = self.base.saturating_add(WINDOW);
        self.bitmap |= 1 << (number - self.base);
        self.slide();
        let new_top = self.base.saturating_add(WINDOW);

        Ok((old_top..new_top).collect())
    }

    fn slide(&mut self) {
        let shift = self.bitmap.trailing_ones();
        if shift == 0 {
            return;
        }
        self.base = self.base.saturating_add(u64::from(shift));
        self.bitmap = self.bitmap.checked_shr(shift).unwrap_or(0);
    }
}
