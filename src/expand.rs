// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-pass validation and expansion of function bodies.
//!
//! One left-to-right pass over the wire bytes both type-checks the body and
//! emits the internal instruction stream. The validator keeps two stacks:
//! operand types (with an `Unknown` element for the polymorphic stack after
//! an unconditional branch) and control frames. Forward jump targets are
//! recorded as patch sites on the frame they branch to and resolved when
//! that frame's `end` is reached; branches to a `loop` resolve immediately
//! to its head.
//!
//! Alongside each operand type the expander tracks the operand stack's byte
//! height, measured from the function frame's bottom. Branch instructions
//! are emitted with the keep/discard byte counts derived from these static
//! heights, so the interpreter unwinds without any type information.
//!
//! Validation is fatal: any error discards the partial stream.

use alloc::vec::Vec;
use core::fmt;

use crate::format::{DecodeError, Reader};
use crate::instr::{BranchTarget, Op};
use crate::module::{IndexEntry, Module};
use crate::opcode::{ExtOpcode, Opcode, EXTENDED_PREFIX};
use crate::sig::{Layout, ValueKind};

/// A validation error for a function body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// The body's wire bytes were malformed.
    Decode(DecodeError),
    /// An opcode byte is not in the instruction set.
    UnknownOpcode {
        /// The raw opcode byte.
        byte: u8,
    },
    /// An extended sub-opcode is not in the instruction set.
    UnknownExtOpcode {
        /// The decoded sub-opcode value.
        sub: u32,
    },
    /// A block type is not supported (only empty and single-result block
    /// types are).
    UnsupportedBlockType {
        /// The raw block type byte.
        code: u8,
    },
    /// An operand had the wrong type.
    TypeMismatch,
    /// An instruction popped from an empty operand stack.
    StackUnderflow,
    /// `end` or `else` without a matching open frame.
    UnbalancedControl,
    /// `else` outside an `if` frame.
    ElseWithoutIf,
    /// A branch label depth exceeded the open frame count.
    BadLabelDepth {
        /// The offending relative depth.
        depth: u32,
    },
    /// `br_table` labels do not share one arity.
    LabelArityMismatch,
    /// A local index was out of range for the function frame.
    BadLocalIndex {
        /// The offending index.
        index: u32,
    },
    /// A global index was out of range.
    BadGlobalIndex {
        /// The offending index.
        index: u32,
    },
    /// `global.set` on an immutable global.
    ImmutableGlobal {
        /// The global index.
        index: u32,
    },
    /// A function index was out of range.
    BadFunctionIndex {
        /// The offending index.
        index: u32,
    },
    /// A type index was out of range.
    BadTypeIndex {
        /// The offending index.
        index: u32,
    },
    /// A memory instruction in a module with no memory.
    NoMemory,
    /// An alignment hint exceeded the access's natural alignment.
    InvalidAlignment {
        /// The declared log2 alignment.
        align: u32,
    },
    /// A reserved immediate byte was not zero.
    NonZeroReservedByte {
        /// The raw byte.
        byte: u8,
    },
    /// A frame ended with operands beyond its declared results.
    ResultMismatch,
    /// Bytes remained after the function's final `end`.
    TrailingBytes,
    /// The module was already expanded.
    AlreadyExpanded,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "malformed body: {e}"),
            Self::UnknownOpcode { byte } => write!(f, "unknown opcode 0x{byte:02x}"),
            Self::UnknownExtOpcode { sub } => write!(f, "unknown extended opcode {sub}"),
            Self::UnsupportedBlockType { code } => {
                write!(f, "unsupported block type 0x{code:02x}")
            }
            Self::TypeMismatch => write!(f, "operand type mismatch"),
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::UnbalancedControl => write!(f, "unbalanced control instruction"),
            Self::ElseWithoutIf => write!(f, "else outside an if"),
            Self::BadLabelDepth { depth } => write!(f, "bad label depth {depth}"),
            Self::LabelArityMismatch => write!(f, "br_table label arity mismatch"),
            Self::BadLocalIndex { index } => write!(f, "bad local index {index}"),
            Self::BadGlobalIndex { index } => write!(f, "bad global index {index}"),
            Self::ImmutableGlobal { index } => write!(f, "global {index} is immutable"),
            Self::BadFunctionIndex { index } => write!(f, "bad function index {index}"),
            Self::BadTypeIndex { index } => write!(f, "bad type index {index}"),
            Self::NoMemory => write!(f, "module has no memory"),
            Self::InvalidAlignment { align } => write!(f, "invalid alignment 2^{align}"),
            Self::NonZeroReservedByte { byte } => {
                write!(f, "reserved byte must be zero, got 0x{byte:02x}")
            }
            Self::ResultMismatch => write!(f, "frame results do not match"),
            Self::TrailingBytes => write!(f, "trailing bytes after final end"),
            Self::AlreadyExpanded => write!(f, "module already expanded"),
        }
    }
}

impl core::error::Error for ValidationError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for ValidationError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

const PLACEHOLDER: u32 = u32::MAX;

/// An operand type on the validator's stack. `Unknown` appears only in
/// unreachable code and type-checks against anything.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OpdType {
    I32,
    I64,
    F32,
    F64,
    Unknown,
}

impl From<ValueKind> for OpdType {
    fn from(k: ValueKind) -> Self {
        match k {
            ValueKind::I32 => Self::I32,
            ValueKind::I64 => Self::I64,
            ValueKind::F32 => Self::F32,
            ValueKind::F64 => Self::F64,
        }
    }
}

impl OpdType {
    /// `Unknown` contributes no bytes; heights in unreachable code are
    /// never executed.
    fn byte_size(self) -> u32 {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
            Self::Unknown => 0,
        }
    }

    fn matches(self, kind: ValueKind) -> bool {
        self == Self::Unknown || self == OpdType::from(kind)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FrameKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Copy, Clone, Debug)]
enum PatchSlot {
    Single,
    Table(usize),
    TableDefault,
}

#[derive(Copy, Clone, Debug)]
struct PatchSite {
    op: usize,
    slot: PatchSlot,
}

struct CtrlFrame {
    kind: FrameKind,
    end_kinds: Vec<ValueKind>,
    /// Operand type-stack height at frame entry.
    height: usize,
    /// Operand byte height at frame entry, from the function frame bottom.
    byte_height: u32,
    unreachable: bool,
    /// Branch sites to resolve to this frame's end.
    patches: Vec<PatchSite>,
    /// Instruction index at frame entry; branch target for `loop`.
    head: u32,
    /// Forward jump emitted by `if`, patched at `else` or `end`.
    if_site: Option<usize>,
}

fn apply_patch(op: &mut Op, slot: PatchSlot, target: u32) {
    match (op, slot) {
        (Op::Goto { target: t } | Op::IfZero { target: t }, PatchSlot::Single) => *t = target,
        (Op::Br(bt) | Op::BrIf(bt), PatchSlot::Single) => bt.target = target,
        (Op::BrTable { targets, .. }, PatchSlot::Table(i)) => {
            if let Some(bt) = targets.get_mut(i) {
                bt.target = target;
            }
        }
        (Op::BrTable { default, .. }, PatchSlot::TableDefault) => default.target = target,
        _ => debug_assert!(false, "patch slot does not match op shape"),
    }
}

/// Validates `raw` (the body of local function `func`) and returns its
/// expanded instruction stream.
pub(crate) fn expand_function(
    module: &Module,
    func: usize,
    raw: &[u8],
) -> Result<Vec<Op>, ValidationError> {
    let f = &module.functions[func];
    let sig = module
        .types
        .get(f.type_idx as usize)
        .ok_or(ValidationError::BadTypeIndex { index: f.type_idx })?;

    let mut ex = Expander {
        module,
        frame: &f.frame,
        results: &sig.results,
        opds: Vec::new(),
        byte_height: 0,
        ctrls: Vec::new(),
        ops: Vec::new(),
    };
    ex.ctrls.push(CtrlFrame {
        kind: FrameKind::Func,
        end_kinds: sig.results.kinds().collect(),
        height: 0,
        byte_height: 0,
        unreachable: false,
        patches: Vec::new(),
        head: 0,
        if_site: None,
    });

    let mut r = Reader::new(raw);
    while !ex.ctrls.is_empty() {
        let byte = r.read_u8()?;
        if byte == EXTENDED_PREFIX {
            ex.extended(&mut r)?;
            continue;
        }
        let op = Opcode::from_u8(byte).ok_or(ValidationError::UnknownOpcode { byte })?;
        ex.step(op, &mut r)?;
    }
    if !r.is_empty() {
        return Err(ValidationError::TrailingBytes);
    }
    Ok(ex.ops)
}

struct Expander<'m> {
    module: &'m Module,
    /// Function frame layout: parameter slots then local slots.
    frame: &'m Layout,
    results: &'m Layout,
    opds: Vec<OpdType>,
    byte_height: u32,
    ctrls: Vec<CtrlFrame>,
    ops: Vec<Op>,
}

impl Expander<'_> {
    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn push_opd(&mut self, t: OpdType) {
        self.byte_height += t.byte_size();
        self.opds.push(t);
    }

    fn pop_opd(&mut self) -> Result<OpdType, ValidationError> {
        let (height, unreachable) = match self.ctrls.last() {
            Some(f) => (f.height, f.unreachable),
            None => (0, false),
        };
        if self.opds.len() == height {
            return if unreachable {
                Ok(OpdType::Unknown)
            } else {
                Err(ValidationError::StackUnderflow)
            };
        }
        let t = self.opds.pop().ok_or(ValidationError::StackUnderflow)?;
        self.byte_height = self.byte_height.saturating_sub(t.byte_size());
        Ok(t)
    }

    fn pop_expect(&mut self, kind: ValueKind) -> Result<(), ValidationError> {
        let t = self.pop_opd()?;
        if !t.matches(kind) {
            return Err(ValidationError::TypeMismatch);
        }
        Ok(())
    }

    fn set_unreachable(&mut self) {
        if let Some(frame) = self.ctrls.last_mut() {
            self.opds.truncate(frame.height);
            self.byte_height = frame.byte_height;
            frame.unreachable = true;
        }
    }

    fn push_ctrl(&mut self, kind: FrameKind, result: Option<ValueKind>, if_site: Option<usize>) {
        self.ctrls.push(CtrlFrame {
            kind,
            end_kinds: result.into_iter().collect(),
            height: self.opds.len(),
            byte_height: self.byte_height,
            unreachable: false,
            patches: Vec::new(),
            head: self.ops.len() as u32,
            if_site,
        });
    }

    fn pop_ctrl(&mut self) -> Result<CtrlFrame, ValidationError> {
        let (end_kinds, height) = match self.ctrls.last() {
            Some(f) => (f.end_kinds.clone(), f.height),
            None => return Err(ValidationError::UnbalancedControl),
        };
        for &k in end_kinds.iter().rev() {
            self.pop_expect(k)?;
        }
        if self.opds.len() != height {
            return Err(ValidationError::ResultMismatch);
        }
        let frame = self
            .ctrls
            .pop()
            .ok_or(ValidationError::UnbalancedControl)?;
        self.byte_height = frame.byte_height;
        Ok(frame)
    }

    fn read_block_type(&self, r: &mut Reader<'_>) -> Result<Option<ValueKind>, ValidationError> {
        let code = r.read_u8()?;
        if code == 0x40 {
            return Ok(None);
        }
        ValueKind::from_code(code)
            .map(Some)
            .ok_or(ValidationError::UnsupportedBlockType { code })
    }

    /// Resolves label `depth`, type-checks the label values, and builds the
    /// branch edge with static keep/discard byte counts. Loop labels
    /// resolve to the loop head; all others leave a patch site on the
    /// target frame keyed by `site`.
    fn branch_edge(
        &mut self,
        depth: u32,
        site: usize,
        slot: PatchSlot,
    ) -> Result<BranchTarget, ValidationError> {
        let idx = self
            .ctrls
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or(ValidationError::BadLabelDepth { depth })?;
        let (label, is_loop, frame_byte_height, head) = {
            let f = &self.ctrls[idx];
            let label = if f.kind == FrameKind::Loop {
                Vec::new()
            } else {
                f.end_kinds.clone()
            };
            (label, f.kind == FrameKind::Loop, f.byte_height, f.head)
        };
        for &k in label.iter().rev() {
            self.pop_expect(k)?;
        }
        let keep: u32 = label.iter().map(|k| k.byte_size()).sum();
        let drop = self.byte_height.saturating_sub(frame_byte_height);
        // Label values stay on the conceptual stack across the branch.
        for &k in &label {
            self.push_opd(k.into());
        }
        let target = if is_loop {
            head
        } else {
            self.ctrls[idx].patches.push(PatchSite { op: site, slot });
            PLACEHOLDER
        };
        Ok(BranchTarget { target, drop, keep })
    }

    fn label_kinds(&self, depth: u32) -> Result<Vec<ValueKind>, ValidationError> {
        let idx = self
            .ctrls
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or(ValidationError::BadLabelDepth { depth })?;
        let f = &self.ctrls[idx];
        Ok(if f.kind == FrameKind::Loop {
            Vec::new()
        } else {
            f.end_kinds.clone()
        })
    }

    fn unary(&mut self, kind: ValueKind, op: Op) -> Result<(), ValidationError> {
        self.pop_expect(kind)?;
        self.push_opd(kind.into());
        self.emit(op);
        Ok(())
    }

    fn binary(&mut self, kind: ValueKind, op: Op) -> Result<(), ValidationError> {
        self.pop_expect(kind)?;
        self.pop_expect(kind)?;
        self.push_opd(kind.into());
        self.emit(op);
        Ok(())
    }

    fn compare(&mut self, kind: ValueKind, op: Op) -> Result<(), ValidationError> {
        self.pop_expect(kind)?;
        self.pop_expect(kind)?;
        self.push_opd(OpdType::I32);
        self.emit(op);
        Ok(())
    }

    fn test(&mut self, kind: ValueKind, op: Op) -> Result<(), ValidationError> {
        self.pop_expect(kind)?;
        self.push_opd(OpdType::I32);
        self.emit(op);
        Ok(())
    }

    fn convert(&mut self, from: ValueKind, to: ValueKind, op: Op) -> Result<(), ValidationError> {
        self.pop_expect(from)?;
        self.push_opd(to.into());
        self.emit(op);
        Ok(())
    }

    /// Reinterpret casts re-tag the operand; the bit pattern on the byte
    /// stack is already right, so nothing is emitted.
    fn reinterpret(&mut self, from: ValueKind, to: ValueKind) -> Result<(), ValidationError> {
        self.pop_expect(from)?;
        self.push_opd(to.into());
        Ok(())
    }

    fn mem_immediates(
        &mut self,
        r: &mut Reader<'_>,
        natural: u32,
    ) -> Result<u32, ValidationError> {
        if !self.module.has_memory() {
            return Err(ValidationError::NoMemory);
        }
        let align = r.read_uleb128_u32()?;
        if align > natural {
            return Err(ValidationError::InvalidAlignment { align });
        }
        r.read_uleb128_u32().map_err(Into::into)
    }

    fn load(
        &mut self,
        r: &mut Reader<'_>,
        kind: ValueKind,
        natural: u32,
        make: fn(u32) -> Op,
    ) -> Result<(), ValidationError> {
        let offset = self.mem_immediates(r, natural)?;
        self.pop_expect(ValueKind::I32)?;
        self.push_opd(kind.into());
        self.emit(make(offset));
        Ok(())
    }

    fn store(
        &mut self,
        r: &mut Reader<'_>,
        kind: ValueKind,
        natural: u32,
        make: fn(u32) -> Op,
    ) -> Result<(), ValidationError> {
        let offset = self.mem_immediates(r, natural)?;
        self.pop_expect(kind)?;
        self.pop_expect(ValueKind::I32)?;
        self.emit(make(offset));
        Ok(())
    }

    fn reserved_zero(&mut self, r: &mut Reader<'_>) -> Result<(), ValidationError> {
        let byte = r.read_u8()?;
        if byte != 0 {
            return Err(ValidationError::NonZeroReservedByte { byte });
        }
        Ok(())
    }

    fn step(&mut self, op: Opcode, r: &mut Reader<'_>) -> Result<(), ValidationError> {
        use ValueKind::{F32, F64, I32, I64};
        match op {
            Opcode::Unreachable => {
                self.emit(Op::Unreachable);
                self.set_unreachable();
            }
            Opcode::Nop => {}

            Opcode::Block => {
                let bt = self.read_block_type(r)?;
                self.push_ctrl(FrameKind::Block, bt, None);
            }
            Opcode::Loop => {
                let bt = self.read_block_type(r)?;
                self.push_ctrl(FrameKind::Loop, bt, None);
            }
            Opcode::If => {
                let bt = self.read_block_type(r)?;
                self.pop_expect(I32)?;
                let site = self.ops.len();
                self.emit(Op::IfZero { target: PLACEHOLDER });
                self.push_ctrl(FrameKind::If, bt, Some(site));
            }
            Opcode::Else => {
                match self.ctrls.last().map(|f| f.kind) {
                    Some(FrameKind::If) => {}
                    Some(_) => return Err(ValidationError::ElseWithoutIf),
                    None => return Err(ValidationError::UnbalancedControl),
                }
                let frame = self.pop_ctrl()?;
                let goto_site = self.ops.len();
                self.emit(Op::Goto { target: PLACEHOLDER });
                if let Some(site) = frame.if_site {
                    let target = self.ops.len() as u32;
                    if let Some(op) = self.ops.get_mut(site) {
                        apply_patch(op, PatchSlot::Single, target);
                    }
                }
                let mut patches = frame.patches;
                patches.push(PatchSite {
                    op: goto_site,
                    slot: PatchSlot::Single,
                });
                self.ctrls.push(CtrlFrame {
                    kind: FrameKind::Else,
                    end_kinds: frame.end_kinds,
                    height: frame.height,
                    byte_height: frame.byte_height,
                    unreachable: false,
                    patches,
                    head: self.ops.len() as u32,
                    if_site: None,
                });
            }
            Opcode::End => {
                let frame = self.pop_ctrl()?;
                if frame.kind == FrameKind::If && !frame.end_kinds.is_empty() {
                    // An if without an else cannot produce values.
                    return Err(ValidationError::TypeMismatch);
                }
                let target = self.ops.len() as u32;
                for p in &frame.patches {
                    if let Some(op) = self.ops.get_mut(p.op) {
                        apply_patch(op, p.slot, target);
                    }
                }
                if let Some(site) = frame.if_site {
                    if let Some(op) = self.ops.get_mut(site) {
                        apply_patch(op, PatchSlot::Single, target);
                    }
                }
                if self.ctrls.is_empty() {
                    // Function end: slide results over the frame and return.
                    let result = self.results.byte_size();
                    if result > 0 {
                        self.emit(Op::ShiftResult {
                            shift: self.frame.byte_size(),
                            result,
                        });
                    }
                    self.emit(Op::Return);
                } else {
                    for &k in &frame.end_kinds {
                        self.push_opd(k.into());
                    }
                }
            }

            Opcode::Br => {
                let depth = r.read_uleb128_u32()?;
                let site = self.ops.len();
                let edge = self.branch_edge(depth, site, PatchSlot::Single)?;
                self.emit(Op::Br(edge));
                self.set_unreachable();
            }
            Opcode::BrIf => {
                let depth = r.read_uleb128_u32()?;
                self.pop_expect(I32)?;
                let site = self.ops.len();
                let edge = self.branch_edge(depth, site, PatchSlot::Single)?;
                self.emit(Op::BrIf(edge));
            }
            Opcode::BrTable => {
                let count = r.read_uleb128_u32()?;
                let mut depths = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    depths.push(r.read_uleb128_u32()?);
                }
                let default_depth = r.read_uleb128_u32()?;
                self.pop_expect(I32)?;
                // Every label must agree with the default's arity.
                let expect = self.label_kinds(default_depth)?;
                for &d in &depths {
                    if self.label_kinds(d)? != expect {
                        return Err(ValidationError::LabelArityMismatch);
                    }
                }
                let site = self.ops.len();
                let mut targets = Vec::with_capacity(depths.len());
                for (i, &d) in depths.iter().enumerate() {
                    // branch_edge restores the label values, so every edge
                    // sees the same pre-branch stack.
                    targets.push(self.branch_edge(d, site, PatchSlot::Table(i))?);
                }
                let default = self.branch_edge(default_depth, site, PatchSlot::TableDefault)?;
                self.emit(Op::BrTable { targets, default });
                self.set_unreachable();
            }
            Opcode::Return => {
                let result_kinds: Vec<ValueKind> = self.results.kinds().collect();
                for &k in result_kinds.iter().rev() {
                    self.pop_expect(k)?;
                }
                let result = self.results.byte_size();
                if result > 0 {
                    // Residual operands beneath the results are released by
                    // widening the shift.
                    self.emit(Op::ShiftResult {
                        shift: self.frame.byte_size() + self.byte_height,
                        result,
                    });
                }
                self.emit(Op::Return);
                self.set_unreachable();
            }
            Opcode::Call => {
                let index = r.read_uleb128_u32()?;
                let entry = *self
                    .module
                    .function_index
                    .get(index as usize)
                    .ok_or(ValidationError::BadFunctionIndex { index })?;
                let sig = self
                    .module
                    .signature(index)
                    .ok_or(ValidationError::BadFunctionIndex { index })?;
                for s in sig.params.slots().iter().rev() {
                    self.pop_expect(s.kind)?;
                }
                let result_kinds: Vec<ValueKind> = sig.results.kinds().collect();
                for k in result_kinds {
                    self.push_opd(k.into());
                }
                self.emit(match entry {
                    IndexEntry::Local(func) => Op::CallLocal { func },
                    IndexEntry::Import(import) => Op::CallImport { import },
                });
            }
            Opcode::CallIndirect => {
                let type_idx = r.read_uleb128_u32()?;
                self.reserved_zero(r)?;
                let sig = self
                    .module
                    .types
                    .get(type_idx as usize)
                    .ok_or(ValidationError::BadTypeIndex { index: type_idx })?;
                self.pop_expect(I32)?;
                for s in sig.params.slots().iter().rev() {
                    self.pop_expect(s.kind)?;
                }
                let result_kinds: Vec<ValueKind> = sig.results.kinds().collect();
                for k in result_kinds {
                    self.push_opd(k.into());
                }
                self.emit(Op::CallIndirect { type_idx });
            }

            Opcode::Drop => {
                let t = self.pop_opd()?;
                match t.byte_size() {
                    4 => self.emit(Op::Drop32),
                    8 => self.emit(Op::Drop64),
                    _ => {} // unreachable code, nothing will run
                }
            }
            Opcode::Select => {
                self.pop_expect(I32)?;
                let t2 = self.pop_opd()?;
                let t1 = self.pop_opd()?;
                let t = match (t1, t2) {
                    (OpdType::Unknown, x) | (x, OpdType::Unknown) => x,
                    (a, b) if a == b => a,
                    _ => return Err(ValidationError::TypeMismatch),
                };
                self.push_opd(t);
                match t.byte_size() {
                    4 => self.emit(Op::Select32),
                    8 => self.emit(Op::Select64),
                    _ => {}
                }
            }

            Opcode::LocalGet => {
                let index = r.read_uleb128_u32()?;
                let slot = *self
                    .frame
                    .slots()
                    .get(index as usize)
                    .ok_or(ValidationError::BadLocalIndex { index })?;
                self.push_opd(slot.kind.into());
                self.emit(if slot.kind.byte_size() == 4 {
                    Op::LocalGet32 {
                        offset: slot.offset,
                    }
                } else {
                    Op::LocalGet64 {
                        offset: slot.offset,
                    }
                });
            }
            Opcode::LocalSet => {
                let index = r.read_uleb128_u32()?;
                let slot = *self
                    .frame
                    .slots()
                    .get(index as usize)
                    .ok_or(ValidationError::BadLocalIndex { index })?;
                self.pop_expect(slot.kind)?;
                self.emit(if slot.kind.byte_size() == 4 {
                    Op::LocalSet32 {
                        offset: slot.offset,
                    }
                } else {
                    Op::LocalSet64 {
                        offset: slot.offset,
                    }
                });
            }
            Opcode::LocalTee => {
                let index = r.read_uleb128_u32()?;
                let slot = *self
                    .frame
                    .slots()
                    .get(index as usize)
                    .ok_or(ValidationError::BadLocalIndex { index })?;
                self.pop_expect(slot.kind)?;
                self.push_opd(slot.kind.into());
                self.emit(if slot.kind.byte_size() == 4 {
                    Op::LocalTee32 {
                        offset: slot.offset,
                    }
                } else {
                    Op::LocalTee64 {
                        offset: slot.offset,
                    }
                });
            }
            Opcode::GlobalGet => {
                let index = r.read_uleb128_u32()?;
                let g = self
                    .module
                    .globals
                    .get(index as usize)
                    .ok_or(ValidationError::BadGlobalIndex { index })?;
                let (kind, offset) = (g.kind, g.offset);
                self.push_opd(kind.into());
                self.emit(if kind.byte_size() == 4 {
                    Op::GlobalGet32 { offset }
                } else {
                    Op::GlobalGet64 { offset }
                });
            }
            Opcode::GlobalSet => {
                let index = r.read_uleb128_u32()?;
                let g = self
                    .module
                    .globals
                    .get(index as usize)
                    .ok_or(ValidationError::BadGlobalIndex { index })?;
                if !g.mutable {
                    return Err(ValidationError::ImmutableGlobal { index });
                }
                let (kind, offset) = (g.kind, g.offset);
                self.pop_expect(kind)?;
                self.emit(if kind.byte_size() == 4 {
                    Op::GlobalSet32 { offset }
                } else {
                    Op::GlobalSet64 { offset }
                });
            }

            Opcode::I32Load => self.load(r, I32, 2, |offset| Op::I32Load { offset })?,
            Opcode::I64Load => self.load(r, I64, 3, |offset| Op::I64Load { offset })?,
            Opcode::F32Load => self.load(r, F32, 2, |offset| Op::F32Load { offset })?,
            Opcode::F64Load => self.load(r, F64, 3, |offset| Op::F64Load { offset })?,
            Opcode::I32Load8S => self.load(r, I32, 0, |offset| Op::I32Load8S { offset })?,
            Opcode::I32Load8U => self.load(r, I32, 0, |offset| Op::I32Load8U { offset })?,
            Opcode::I32Load16S => self.load(r, I32, 1, |offset| Op::I32Load16S { offset })?,
            Opcode::I32Load16U => self.load(r, I32, 1, |offset| Op::I32Load16U { offset })?,
            Opcode::I64Load8S => self.load(r, I64, 0, |offset| Op::I64Load8S { offset })?,
            Opcode::I64Load8U => self.load(r, I64, 0, |offset| Op::I64Load8U { offset })?,
            Opcode::I64Load16S => self.load(r, I64, 1, |offset| Op::I64Load16S { offset })?,
            Opcode::I64Load16U => self.load(r, I64, 1, |offset| Op::I64Load16U { offset })?,
            Opcode::I64Load32S => self.load(r, I64, 2, |offset| Op::I64Load32S { offset })?,
            Opcode::I64Load32U => self.load(r, I64, 2, |offset| Op::I64Load32U { offset })?,
            Opcode::I32Store => self.store(r, I32, 2, |offset| Op::I32Store { offset })?,
            Opcode::I64Store => self.store(r, I64, 3, |offset| Op::I64Store { offset })?,
            Opcode::F32Store => self.store(r, F32, 2, |offset| Op::F32Store { offset })?,
            Opcode::F64Store => self.store(r, F64, 3, |offset| Op::F64Store { offset })?,
            Opcode::I32Store8 => self.store(r, I32, 0, |offset| Op::I32Store8 { offset })?,
            Opcode::I32Store16 => self.store(r, I32, 1, |offset| Op::I32Store16 { offset })?,
            Opcode::I64Store8 => self.store(r, I64, 0, |offset| Op::I64Store8 { offset })?,
            Opcode::I64Store16 => self.store(r, I64, 1, |offset| Op::I64Store16 { offset })?,
            Opcode::I64Store32 => self.store(r, I64, 2, |offset| Op::I64Store32 { offset })?,
            Opcode::MemorySize => {
                if !self.module.has_memory() {
                    return Err(ValidationError::NoMemory);
                }
                self.reserved_zero(r)?;
                self.push_opd(OpdType::I32);
                self.emit(Op::MemorySize);
            }
            Opcode::MemoryGrow => {
                if !self.module.has_memory() {
                    return Err(ValidationError::NoMemory);
                }
                self.reserved_zero(r)?;
                self.pop_expect(I32)?;
                self.push_opd(OpdType::I32);
                self.emit(Op::MemoryGrow);
            }

            Opcode::I32Const => {
                let v = r.read_sleb128_i32()?;
                self.push_opd(OpdType::I32);
                self.emit(Op::I32Const(v));
            }
            Opcode::I64Const => {
                let v = r.read_sleb128_i64()?;
                self.push_opd(OpdType::I64);
                self.emit(Op::I64Const(v));
            }
            Opcode::F32Const => {
                let v = r.read_f32_le()?;
                self.push_opd(OpdType::F32);
                self.emit(Op::F32Const(v));
            }
            Opcode::F64Const => {
                let v = r.read_f64_le()?;
                self.push_opd(OpdType::F64);
                self.emit(Op::F64Const(v));
            }

            Opcode::I32Eqz => self.test(I32, Op::I32Eqz)?,
            Opcode::I32Eq => self.compare(I32, Op::I32Eq)?,
            Opcode::I32Ne => self.compare(I32, Op::I32Ne)?,
            Opcode::I32LtS => self.compare(I32, Op::I32LtS)?,
            Opcode::I32LtU => self.compare(I32, Op::I32LtU)?,
            Opcode::I32GtS => self.compare(I32, Op::I32GtS)?,
            Opcode::I32GtU => self.compare(I32, Op::I32GtU)?,
            Opcode::I32LeS => self.compare(I32, Op::I32LeS)?,
            Opcode::I32LeU => self.compare(I32, Op::I32LeU)?,
            Opcode::I32GeS => self.compare(I32, Op::I32GeS)?,
            Opcode::I32GeU => self.compare(I32, Op::I32GeU)?,
            Opcode::I64Eqz => self.test(I64, Op::I64Eqz)?,
            Opcode::I64Eq => self.compare(I64, Op::I64Eq)?,
            Opcode::I64Ne => self.compare(I64, Op::I64Ne)?,
            Opcode::I64LtS => self.compare(I64, Op::I64LtS)?,
            Opcode::I64LtU => self.compare(I64, Op::I64LtU)?,
            Opcode::I64GtS => self.compare(I64, Op::I64GtS)?,
            Opcode::I64GtU => self.compare(I64, Op::I64GtU)?,
            Opcode::I64LeS => self.compare(I64, Op::I64LeS)?,
            Opcode::I64LeU => self.compare(I64, Op::I64LeU)?,
            Opcode::I64GeS => self.compare(I64, Op::I64GeS)?,
            Opcode::I64GeU => self.compare(I64, Op::I64GeU)?,
            Opcode::F32Eq => self.compare(F32, Op::F32Eq)?,
            Opcode::F32Ne => self.compare(F32, Op::F32Ne)?,
            Opcode::F32Lt => self.compare(F32, Op::F32Lt)?,
            Opcode::F32Gt => self.compare(F32, Op::F32Gt)?,
            Opcode::F32Le => self.compare(F32, Op::F32Le)?,
            Opcode::F32Ge => self.compare(F32, Op::F32Ge)?,
            Opcode::F64Eq => self.compare(F64, Op::F64Eq)?,
            Opcode::F64Ne => self.compare(F64, Op::F64Ne)?,
            Opcode::F64Lt => self.compare(F64, Op::F64Lt)?,
            Opcode::F64Gt => self.compare(F64, Op::F64Gt)?,
            Opcode::F64Le => self.compare(F64, Op::F64Le)?,
            Opcode::F64Ge => self.compare(F64, Op::F64Ge)?,

            Opcode::I32Clz => self.unary(I32, Op::I32Clz)?,
            Opcode::I32Ctz => self.unary(I32, Op::I32Ctz)?,
            Opcode::I32Popcnt => self.unary(I32, Op::I32Popcnt)?,
            Opcode::I32Add => self.binary(I32, Op::I32Add)?,
            Opcode::I32Sub => self.binary(I32, Op::I32Sub)?,
            Opcode::I32Mul => self.binary(I32, Op::I32Mul)?,
            Opcode::I32DivS => self.binary(I32, Op::I32DivS)?,
            Opcode::I32DivU => self.binary(I32, Op::I32DivU)?,
            Opcode::I32RemS => self.binary(I32, Op::I32RemS)?,
            Opcode::I32RemU => self.binary(I32, Op::I32RemU)?,
            Opcode::I32And => self.binary(I32, Op::I32And)?,
            Opcode::I32Or => self.binary(I32, Op::I32Or)?,
            Opcode::I32Xor => self.binary(I32, Op::I32Xor)?,
            Opcode::I32Shl => self.binary(I32, Op::I32Shl)?,
            Opcode::I32ShrS => self.binary(I32, Op::I32ShrS)?,
            Opcode::I32ShrU => self.binary(I32, Op::I32ShrU)?,
            Opcode::I32Rotl => self.binary(I32, Op::I32Rotl)?,
            Opcode::I32Rotr => self.binary(I32, Op::I32Rotr)?,
            Opcode::I64Clz => self.unary(I64, Op::I64Clz)?,
            Opcode::I64Ctz => self.unary(I64, Op::I64Ctz)?,
            Opcode::I64Popcnt => self.unary(I64, Op::I64Popcnt)?,
            Opcode::I64Add => self.binary(I64, Op::I64Add)?,
            Opcode::I64Sub => self.binary(I64, Op::I64Sub)?,
            Opcode::I64Mul => self.binary(I64, Op::I64Mul)?,
            Opcode::I64DivS => self.binary(I64, Op::I64DivS)?,
            Opcode::I64DivU => self.binary(I64, Op::I64DivU)?,
            Opcode::I64RemS => self.binary(I64, Op::I64RemS)?,
            Opcode::I64RemU => self.binary(I64, Op::I64RemU)?,
            Opcode::I64And => self.binary(I64, Op::I64And)?,
            Opcode::I64Or => self.binary(I64, Op::I64Or)?,
            Opcode::I64Xor => self.binary(I64, Op::I64Xor)?,
            Opcode::I64Shl => self.binary(I64, Op::I64Shl)?,
            Opcode::I64ShrS => self.binary(I64, Op::I64ShrS)?,
            Opcode::I64ShrU => self.binary(I64, Op::I64ShrU)?,
            Opcode::I64Rotl => self.binary(I64, Op::I64Rotl)?,
            Opcode::I64Rotr => self.binary(I64, Op::I64Rotr)?,

            Opcode::F32Abs => self.unary(F32, Op::F32Abs)?,
            Opcode::F32Neg => self.unary(F32, Op::F32Neg)?,
            Opcode::F32Ceil => self.unary(F32, Op::F32Ceil)?,
            Opcode::F32Floor => self.unary(F32, Op::F32Floor)?,
            Opcode::F32Trunc => self.unary(F32, Op::F32Trunc)?,
            Opcode::F32Nearest => self.unary(F32, Op::F32Nearest)?,
            Opcode::F32Sqrt => self.unary(F32, Op::F32Sqrt)?,
            Opcode::F32Add => self.binary(F32, Op::F32Add)?,
            Opcode::F32Sub => self.binary(F32, Op::F32Sub)?,
            Opcode::F32Mul => self.binary(F32, Op::F32Mul)?,
            Opcode::F32Div => self.binary(F32, Op::F32Div)?,
            Opcode::F32Min => self.binary(F32, Op::F32Min)?,
            Opcode::F32Max => self.binary(F32, Op::F32Max)?,
            Opcode::F32Copysign => self.binary(F32, Op::F32Copysign)?,
            Opcode::F64Abs => self.unary(F64, Op::F64Abs)?,
            Opcode::F64Neg => self.unary(F64, Op::F64Neg)?,
            Opcode::F64Ceil => self.unary(F64, Op::F64Ceil)?,
            Opcode::F64Floor => self.unary(F64, Op::F64Floor)?,
            Opcode::F64Trunc => self.unary(F64, Op::F64Trunc)?,
            Opcode::F64Nearest => self.unary(F64, Op::F64Nearest)?,
            Opcode::F64Sqrt => self.unary(F64, Op::F64Sqrt)?,
            Opcode::F64Add => self.binary(F64, Op::F64Add)?,
            Opcode::F64Sub => self.binary(F64, Op::F64Sub)?,
            Opcode::F64Mul => self.binary(F64, Op::F64Mul)?,
            Opcode::F64Div => self.binary(F64, Op::F64Div)?,
            Opcode::F64Min => self.binary(F64, Op::F64Min)?,
            Opcode::F64Max => self.binary(F64, Op::F64Max)?,
            Opcode::F64Copysign => self.binary(F64, Op::F64Copysign)?,

            Opcode::I32WrapI64 => self.convert(I64, I32, Op::I32WrapI64)?,
            Opcode::I32TruncF32S => self.convert(F32, I32, Op::I32TruncF32S)?,
            Opcode::I32TruncF32U => self.convert(F32, I32, Op::I32TruncF32U)?,
            Opcode::I32TruncF64S => self.convert(F64, I32, Op::I32TruncF64S)?,
            Opcode::I32TruncF64U => self.convert(F64, I32, Op::I32TruncF64U)?,
            Opcode::I64ExtendI32S => self.convert(I32, I64, Op::I64ExtendI32S)?,
            Opcode::I64ExtendI32U => self.convert(I32, I64, Op::I64ExtendI32U)?,
            Opcode::I64TruncF32S => self.convert(F32, I64, Op::I64TruncF32S)?,
            Opcode::I64TruncF32U => self.convert(F32, I64, Op::I64TruncF32U)?,
            Opcode::I64TruncF64S => self.convert(F64, I64, Op::I64TruncF64S)?,
            Opcode::I64TruncF64U => self.convert(F64, I64, Op::I64TruncF64U)?,
            Opcode::F32ConvertI32S => self.convert(I32, F32, Op::F32ConvertI32S)?,
            Opcode::F32ConvertI32U => self.convert(I32, F32, Op::F32ConvertI32U)?,
            Opcode::F32ConvertI64S => self.convert(I64, F32, Op::F32ConvertI64S)?,
            Opcode::F32ConvertI64U => self.convert(I64, F32, Op::F32ConvertI64U)?,
            Opcode::F32DemoteF64 => self.convert(F64, F32, Op::F32DemoteF64)?,
            Opcode::F64ConvertI32S => self.convert(I32, F64, Op::F64ConvertI32S)?,
            Opcode::F64ConvertI32U => self.convert(I32, F64, Op::F64ConvertI32U)?,
            Opcode::F64ConvertI64S => self.convert(I64, F64, Op::F64ConvertI64S)?,
            Opcode::F64ConvertI64U => self.convert(I64, F64, Op::F64ConvertI64U)?,
            Opcode::F64PromoteF32 => self.convert(F32, F64, Op::F64PromoteF32)?,
            Opcode::I32ReinterpretF32 => self.reinterpret(F32, I32)?,
            Opcode::I64ReinterpretF64 => self.reinterpret(F64, I64)?,
            Opcode::F32ReinterpretI32 => self.reinterpret(I32, F32)?,
            Opcode::F64ReinterpretI64 => self.reinterpret(I64, F64)?,

            Opcode::I32Extend8S => self.unary(I32, Op::I32Extend8S)?,
            Opcode::I32Extend16S => self.unary(I32, Op::I32Extend16S)?,
            Opcode::I64Extend8S => self.unary(I64, Op::I64Extend8S)?,
            Opcode::I64Extend16S => self.unary(I64, Op::I64Extend16S)?,
            Opcode::I64Extend32S => self.unary(I64, Op::I64Extend32S)?,
        }
        Ok(())
    }

    fn extended(&mut self, r: &mut Reader<'_>) -> Result<(), ValidationError> {
        use ValueKind::{F32, F64, I32, I64};
        let sub = r.read_uleb128_u32()?;
        let op = ExtOpcode::from_u32(sub).ok_or(ValidationError::UnknownExtOpcode { sub })?;
        match op {
            ExtOpcode::I32TruncSatF32S => self.convert(F32, I32, Op::I32TruncSatF32S)?,
            ExtOpcode::I32TruncSatF32U => self.convert(F32, I32, Op::I32TruncSatF32U)?,
            ExtOpcode::I32TruncSatF64S => self.convert(F64, I32, Op::I32TruncSatF64S)?,
            ExtOpcode::I32TruncSatF64U => self.convert(F64, I32, Op::I32TruncSatF64U)?,
            ExtOpcode::I64TruncSatF32S => self.convert(F32, I64, Op::I64TruncSatF32S)?,
            ExtOpcode::I64TruncSatF32U => self.convert(F32, I64, Op::I64TruncSatF32U)?,
            ExtOpcode::I64TruncSatF64S => self.convert(F64, I64, Op::I64TruncSatF64S)?,
            ExtOpcode::I64TruncSatF64U => self.convert(F64, I64, Op::I64TruncSatF64U)?,
            ExtOpcode::MemoryFill => {
                if !self.module.has_memory() {
                    return Err(ValidationError::NoMemory);
                }
                self.reserved_zero(r)?;
                self.pop_expect(I32)?; // length
                self.pop_expect(I32)?; // fill value
                self.pop_expect(I32)?; // destination
                self.emit(Op::MemoryFill);
            }
        }
        Ok(())
    }
}
