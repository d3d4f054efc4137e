// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Growable, page-granular linear memory.
//!
//! Addresses are effective addresses (base plus static offset) and every
//! access is bounds checked against the current byte length. Accessors
//! return `Option`; the interpreter turns `None` into a trap.

use alloc::vec;
use alloc::vec::Vec;

/// Bytes per linear-memory page.
pub const PAGE_SIZE: u32 = 65_536;

/// Hard ceiling on page count (a 32-bit address space).
pub const MAX_PAGES: u32 = 65_536;

/// A bounds-checked linear memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearMemory {
    data: Vec<u8>,
    max_pages: u32,
}

impl LinearMemory {
    /// Creates a memory with `initial_pages` zeroed pages, growable up to
    /// `max_pages` (clamped to [`MAX_PAGES`], and never below the initial
    /// size).
    #[must_use]
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let max_pages = max_pages.clamp(initial_pages, MAX_PAGES);
        let initial_pages = initial_pages.min(max_pages);
        Self {
            data: vec![0; initial_pages as usize * PAGE_SIZE as usize],
            max_pages,
        }
    }

    /// Returns the current size in pages.
    #[must_use]
    pub fn size_pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE as usize) as u32
    }

    /// Returns the declared maximum size in pages.
    #[must_use]
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Returns the current size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the memory has zero pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw contents mutably.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grows the memory by `delta` pages, zero-filling the new region.
    ///
    /// Returns the previous page count, or `None` when growth would exceed
    /// the declared maximum. On failure the memory is unchanged.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old_pages = self.size_pages();
        let new_pages = old_pages.checked_add(delta)?;
        if new_pages > self.max_pages {
            return None;
        }
        self.data
            .resize(new_pages as usize * PAGE_SIZE as usize, 0);
        Some(old_pages)
    }

    fn range(&self, addr: u64, len: usize) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let end = start.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        Some(start..end)
    }

    /// Loads a byte.
    #[must_use]
    pub fn load_u8(&self, addr: u64) -> Option<u8> {
        let r = self.range(addr, 1)?;
        Some(self.data[r.start])
    }

    /// Loads a little-endian `u16`.
    #[must_use]
    pub fn load_u16(&self, addr: u64) -> Option<u16> {
        let r = self.range(addr, 2)?;
        let b = &self.data[r];
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Loads a little-endian `u32`.
    #[must_use]
    pub fn load_u32(&self, addr: u64) -> Option<u32> {
        let r = self.range(addr, 4)?;
        let b = &self.data[r];
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Loads a little-endian `u64`.
    #[must_use]
    pub fn load_u64(&self, addr: u64) -> Option<u64> {
        let r = self.range(addr, 8)?;
        let b = &self.data[r];
        Some(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Stores a byte.
    #[must_use]
    pub fn store_u8(&mut self, addr: u64, v: u8) -> bool {
        match self.range(addr, 1) {
            Some(r) => {
                self.data[r.start] = v;
                true
            }
            None => false,
        }
    }

    /// Stores a little-endian `u16`.
    #[must_use]
    pub fn store_u16(&mut self, addr: u64, v: u16) -> bool {
        match self.range(addr, 2) {
            Some(r) => {
                self.data[r].copy_from_slice(&v.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Stores a little-endian `u32`.
    #[must_use]
    pub fn store_u32(&mut self, addr: u64, v: u32) -> bool {
        match self.range(addr, 4) {
            Some(r) => {
                self.data[r].copy_from_slice(&v.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Stores a little-endian `u64`.
    #[must_use]
    pub fn store_u64(&mut self, addr: u64, v: u64) -> bool {
        match self.range(addr, 8) {
            Some(r) => {
                self.data[r].copy_from_slice(&v.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Fills `len` bytes at `addr` with `value`.
    #[must_use]
    pub fn fill(&mut self, addr: u64, value: u8, len: u64) -> bool {
        let len = match usize::try_from(len) {
            Ok(l) => l,
            Err(_) => return false,
        };
        match self.range(addr, len) {
            Some(r) => {
                self.data[r].fill(value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memory_is_zeroed() {
        let m = LinearMemory::new(1, 2);
        assert_eq!(m.size_pages(), 1);
        assert_eq!(m.len(), PAGE_SIZE as usize);
        assert!(m.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn grow_preserves_and_zero_fills() {
        let mut m = LinearMemory::new(1, 4);
        assert!(m.store_u32(100, 0xdead_beef));
        assert_eq!(m.grow(2), Some(1));
        assert_eq!(m.size_pages(), 3);
        assert_eq!(m.load_u32(100), Some(0xdead_beef));
        assert_eq!(m.load_u64(u64::from(PAGE_SIZE) * 2), Some(0));
    }

    #[test]
    fn grow_past_max_fails_without_change() {
        let mut m = LinearMemory::new(1, 2);
        assert_eq!(m.grow(2), None);
        assert_eq!(m.size_pages(), 1);
        assert_eq!(m.grow(1), Some(1));
        assert_eq!(m.grow(1), None);
    }

    #[test]
    fn grow_by_zero_reports_current_size() {
        let mut m = LinearMemory::new(3, 3);
        assert_eq!(m.grow(0), Some(3));
    }

    #[test]
    fn loads_are_little_endian() {
        let mut m = LinearMemory::new(1, 1);
        assert!(m.store_u8(0, 0x01));
        assert!(m.store_u8(1, 0x02));
        assert_eq!(m.load_u16(0), Some(0x0201));
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let mut m = LinearMemory::new(1, 1);
        let last = u64::from(PAGE_SIZE) - 1;
        assert_eq!(m.load_u8(last), Some(0));
        assert_eq!(m.load_u8(last + 1), None);
        // A multi-byte access straddling the end fails entirely.
        assert_eq!(m.load_u32(last - 2), None);
        assert!(!m.store_u64(last, 1));
        assert!(!m.store_u8(u64::from(u32::MAX) + 5, 1));
    }

    #[test]
    fn fill_and_bounds() {
        let mut m = LinearMemory::new(1, 1);
        assert!(m.fill(10, 0xab, 4));
        assert_eq!(m.load_u32(10), Some(0xabab_abab));
        assert!(!m.fill(u64::from(PAGE_SIZE) - 2, 0, 4));
    }
}
