// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Function signatures and byte-slot layout.
//!
//! The interpreter keeps all operands on one contiguous byte stack, so a
//! signature is more than a type list: it fixes the byte offset of every
//! parameter and result slot. Offsets accumulate left to right in a single
//! pass; a slot with offset `o` and size `s` lives at `frame_top - o - s`,
//! where `frame_top` is the high end of the activation frame. Locals extend
//! the same accumulation past the parameters.

use alloc::vec::Vec;

/// The kind of a numeric value slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit IEEE 754 float.
    F32,
    /// 64-bit IEEE 754 float.
    F64,
}

impl ValueKind {
    /// Returns the slot size in bytes: 4 for 32-bit kinds, 8 for 64-bit.
    #[must_use]
    pub fn byte_size(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Returns `true` for the float kinds.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Decodes a binary-format value type byte.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x7f => Some(Self::I32),
            0x7e => Some(Self::I64),
            0x7d => Some(Self::F32),
            0x7c => Some(Self::F64),
            _ => None,
        }
    }
}

/// A typed slot at a fixed byte offset within a frame region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    /// Value kind stored in the slot.
    pub kind: ValueKind,
    /// Accumulated byte offset of the slot within its region.
    pub offset: u32,
}

/// An ordered slot region with precomputed offsets and total size.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Layout {
    slots: Vec<Slot>,
    byte_size: u32,
}

impl Layout {
    /// Computes the layout of `kinds` in declaration order.
    #[must_use]
    pub fn compute(kinds: &[ValueKind]) -> Self {
        let mut slots = Vec::with_capacity(kinds.len());
        let mut running = 0u32;
        for &kind in kinds {
            slots.push(Slot {
                kind,
                offset: running,
            });
            running += kind.byte_size();
        }
        Self {
            slots,
            byte_size: running,
        }
    }

    /// Returns the slots in declaration order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when the layout has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the total byte size of the region.
    #[must_use]
    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    /// Returns the kinds in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = ValueKind> + '_ {
        self.slots.iter().map(|s| s.kind)
    }
}

/// A function signature with parameter and result slot layouts.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Signature {
    /// Parameter slot region.
    pub params: Layout,
    /// Result slot region.
    pub results: Layout,
}

impl Signature {
    /// Builds a signature from parameter and result kind lists.
    #[must_use]
    pub fn new(params: &[ValueKind], results: &[ValueKind]) -> Self {
        Self {
            params: Layout::compute(params),
            results: Layout::compute(results),
        }
    }

    /// Returns the total parameter byte size.
    #[must_use]
    pub fn param_size(&self) -> u32 {
        self.params.byte_size()
    }

    /// Returns the total result byte size.
    #[must_use]
    pub fn result_size(&self) -> u32 {
        self.results.byte_size()
    }
}
