// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The internal instruction stream produced by expansion.
//!
//! Surface opcodes are rewritten into [`Op`] values with every operand
//! resolved up front: jump targets are indices into the expanded stream,
//! local and global accesses carry byte offsets instead of indices, and
//! immediates are decoded once. The interpreter never re-reads wire bytes.
//!
//! Branches carry the byte counts needed to unwind the operand stack at run
//! time: `keep` label-arity bytes are slid up over `drop` discarded bytes.
//! Both counts are fixed during expansion from the validator's static stack
//! heights.

use alloc::vec::Vec;

/// One resolved branch edge: where to jump and how to unwind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct BranchTarget {
    /// Index of the destination instruction in the expanded stream.
    pub target: u32,
    /// Operand bytes discarded beneath the kept label values.
    pub drop: u32,
    /// Label-arity bytes kept across the branch.
    pub keep: u32,
}

/// An expanded instruction.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Op {
    Unreachable,

    /// Unconditional jump to an instruction index.
    Goto { target: u32 },
    /// Pops an `i32`; jumps to `target` when it is zero.
    IfZero { target: u32 },
    Br(BranchTarget),
    /// Pops an `i32` condition; branches when non-zero.
    BrIf(BranchTarget),
    /// Pops an `i32` selector; picks `targets[sel]` or `default`.
    BrTable {
        targets: Vec<BranchTarget>,
        default: BranchTarget,
    },
    /// Slides `result` bytes from the stack top up by `shift`, releasing the
    /// frame (and any residual operands) beneath them. Always followed by
    /// [`Op::Return`].
    ShiftResult { shift: u32, result: u32 },
    Return,
    /// Calls a function defined in this module (index into the local list).
    CallLocal { func: u32 },
    /// Calls an imported function (index into the import list).
    CallImport { import: u32 },
    /// Validated `call_indirect`; table dispatch is not provided, so this
    /// traps when reached.
    CallIndirect { type_idx: u32 },

    Drop32,
    Drop64,
    /// Pops an `i32` condition and two 4-byte operands; keeps the first when
    /// the condition is non-zero.
    Select32,
    Select64,

    LocalGet32 { offset: u32 },
    LocalGet64 { offset: u32 },
    LocalSet32 { offset: u32 },
    LocalSet64 { offset: u32 },
    LocalTee32 { offset: u32 },
    LocalTee64 { offset: u32 },
    GlobalGet32 { offset: u32 },
    GlobalGet64 { offset: u32 },
    GlobalSet32 { offset: u32 },
    GlobalSet64 { offset: u32 },

    I32Load { offset: u32 },
    I64Load { offset: u32 },
    F32Load { offset: u32 },
    F64Load { offset: u32 },
    I32Load8S { offset: u32 },
    I32Load8U { offset: u32 },
    I32Load16S { offset: u32 },
    I32Load16U { offset: u32 },
    I64Load8S { offset: u32 },
    I64Load8U { offset: u32 },
    I64Load16S { offset: u32 },
    I64Load16U { offset: u32 },
    I64Load32S { offset: u32 },
    I64Load32U { offset: u32 },
    I32Store { offset: u32 },
    I64Store { offset: u32 },
    F32Store { offset: u32 },
    F64Store { offset: u32 },
    I32Store8 { offset: u32 },
    I32Store16 { offset: u32 },
    I64Store8 { offset: u32 },
    I64Store16 { offset: u32 },
    I64Store32 { offset: u32 },
    MemorySize,
    MemoryGrow,
    MemoryFill,

    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),

    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,

    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
}
