// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary-format opcode numbering.
//!
//! These are the surface opcodes as they appear in function bodies on the
//! wire. Expansion rewrites them into the internal instruction stream
//! ([`crate::instr`]); nothing here survives to execution.

/// Magic header of a WebAssembly binary module (`\0asm`, little-endian).
pub const WASM_MAGIC: u32 = 0x6d73_6100;

/// Binary format version this crate understands.
pub const WASM_VERSION: u32 = 1;

/// Prefix byte introducing the extended (ULEB-selected) opcode space.
pub const EXTENDED_PREFIX: u8 = 0xfc;

/// A surface opcode byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0b,
    Br = 0x0c,
    BrIf = 0x0d,
    BrTable = 0x0e,
    Return = 0x0f,
    Call = 0x10,
    CallIndirect = 0x11,

    Drop = 0x1a,
    Select = 0x1b,

    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,

    I32Load = 0x28,
    I64Load = 0x29,
    F32Load = 0x2a,
    F64Load = 0x2b,
    I32Load8S = 0x2c,
    I32Load8U = 0x2d,
    I32Load16S = 0x2e,
    I32Load16U = 0x2f,
    I64Load8S = 0x30,
    I64Load8U = 0x31,
    I64Load16S = 0x32,
    I64Load16U = 0x33,
    I64Load32S = 0x34,
    I64Load32U = 0x35,
    I32Store = 0x36,
    I64Store = 0x37,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3a,
    I32Store16 = 0x3b,
    I64Store8 = 0x3c,
    I64Store16 = 0x3d,
    I64Store32 = 0x3e,
    MemorySize = 0x3f,
    MemoryGrow = 0x40,

    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,

    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4a,
    I32GtU = 0x4b,
    I32LeS = 0x4c,
    I32LeU = 0x4d,
    I32GeS = 0x4e,
    I32GeU = 0x4f,
    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5a,
    F32Eq = 0x5b,
    F32Ne = 0x5c,
    F32Lt = 0x5d,
    F32Gt = 0x5e,
    F32Le = 0x5f,
    F32Ge = 0x60,
    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,

    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6a,
    I32Sub = 0x6b,
    I32Mul = 0x6c,
    I32DivS = 0x6d,
    I32DivU = 0x6e,
    I32RemS = 0x6f,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,
    I64Clz = 0x79,
    I64Ctz = 0x7a,
    I64Popcnt = 0x7b,
    I64Add = 0x7c,
    I64Sub = 0x7d,
    I64Mul = 0x7e,
    I64DivS = 0x7f,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8a,

    F32Abs = 0x8b,
    F32Neg = 0x8c,
    F32Ceil = 0x8d,
    F32Floor = 0x8e,
    F32Trunc = 0x8f,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F32Min = 0x96,
    F32Max = 0x97,
    F32Copysign = 0x98,
    F64Abs = 0x99,
    F64Neg = 0x9a,
    F64Ceil = 0x9b,
    F64Floor = 0x9c,
    F64Trunc = 0x9d,
    F64Nearest = 0x9e,
    F64Sqrt = 0x9f,
    F64Add = 0xa0,
    F64Sub = 0xa1,
    F64Mul = 0xa2,
    F64Div = 0xa3,
    F64Min = 0xa4,
    F64Max = 0xa5,
    F64Copysign = 0xa6,

    I32WrapI64 = 0xa7,
    I32TruncF32S = 0xa8,
    I32TruncF32U = 0xa9,
    I32TruncF64S = 0xaa,
    I32TruncF64U = 0xab,
    I64ExtendI32S = 0xac,
    I64ExtendI32U = 0xad,
    I64TruncF32S = 0xae,
    I64TruncF32U = 0xaf,
    I64TruncF64S = 0xb0,
    I64TruncF64U = 0xb1,
    F32ConvertI32S = 0xb2,
    F32ConvertI32U = 0xb3,
    F32ConvertI64S = 0xb4,
    F32ConvertI64U = 0xb5,
    F32DemoteF64 = 0xb6,
    F64ConvertI32S = 0xb7,
    F64ConvertI32U = 0xb8,
    F64ConvertI64S = 0xb9,
    F64ConvertI64U = 0xba,
    F64PromoteF32 = 0xbb,
    I32ReinterpretF32 = 0xbc,
    I64ReinterpretF64 = 0xbd,
    F32ReinterpretI32 = 0xbe,
    F64ReinterpretI64 = 0xbf,

    I32Extend8S = 0xc0,
    I32Extend16S = 0xc1,
    I64Extend8S = 0xc2,
    I64Extend16S = 0xc3,
    I64Extend32S = 0xc4,
}

impl Opcode {
    /// Decodes a surface opcode byte. The [`EXTENDED_PREFIX`] byte is not an
    /// opcode and returns `None`.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Unreachable,
            0x01 => Self::Nop,
            0x02 => Self::Block,
            0x03 => Self::Loop,
            0x04 => Self::If,
            0x05 => Self::Else,
            0x0b => Self::End,
            0x0c => Self::Br,
            0x0d => Self::BrIf,
            0x0e => Self::BrTable,
            0x0f => Self::Return,
            0x10 => Self::Call,
            0x11 => Self::CallIndirect,
            0x1a => Self::Drop,
            0x1b => Self::Select,
            0x20 => Self::LocalGet,
            0x21 => Self::LocalSet,
            0x22 => Self::LocalTee,
            0x23 => Self::GlobalGet,
            0x24 => Self::GlobalSet,
            0x28 => Self::I32Load,
            0x29 => Self::I64Load,
            0x2a => Self::F32Load,
            0x2b => Self::F64Load,
            0x2c => Self::I32Load8S,
            0x2d => Self::I32Load8U,
            0x2e => Self::I32Load16S,
            0x2f => Self::I32Load16U,
            0x30 => Self::I64Load8S,
            0x31 => Self::I64Load8U,
            0x32 => Self::I64Load16S,
            0x33 => Self::I64Load16U,
            0x34 => Self::I64Load32S,
            0x35 => Self::I64Load32U,
            0x36 => Self::I32Store,
            0x37 => Self::I64Store,
            0x38 => Self::F32Store,
            0x39 => Self::F64Store,
            0x3a => Self::I32Store8,
            0x3b => Self::I32Store16,
            0x3c => Self::I64Store8,
            0x3d => Self::I64Store16,
            0x3e => Self::I64Store32,
            0x3f => Self::MemorySize,
            0x40 => Self::MemoryGrow,
            0x41 => Self::I32Const,
            0x42 => Self::I64Const,
            0x43 => Self::F32Const,
            0x44 => Self::F64Const,
            0x45 => Self::I32Eqz,
            0x46 => Self::I32Eq,
            0x47 => Self::I32Ne,
            0x48 => Self::I32LtS,
            0x49 => Self::I32LtU,
            0x4a => Self::I32GtS,
            0x4b => Self::I32GtU,
            0x4c => Self::I32LeS,
            0x4d => Self::I32LeU,
            0x4e => Self::I32GeS,
            0x4f => Self::I32GeU,
            0x50 => Self::I64Eqz,
            0x51 => Self::I64Eq,
            0x52 => Self::I64Ne,
            0x53 => Self::I64LtS,
            0x54 => Self::I64LtU,
            0x55 => Self::I64GtS,
            0x56 => Self::I64GtU,
            0x57 => Self::I64LeS,
            0x58 => Self::I64LeU,
            0x59 => Self::I64GeS,
            0x5a => Self::I64GeU,
            0x5b => Self::F32Eq,
            0x5c => Self::F32Ne,
            0x5d => Self::F32Lt,
            0x5e => Self::F32Gt,
            0x5f => Self::F32Le,
            0x60 => Self::F32Ge,
            0x61 => Self::F64Eq,
            0x62 => Self::F64Ne,
            0x63 => Self::F64Lt,
            0x64 => Self::F64Gt,
            0x65 => Self::F64Le,
            0x66 => Self::F64Ge,
            0x67 => Self::I32Clz,
            0x68 => Self::I32Ctz,
            0x69 => Self::I32Popcnt,
            0x6a => Self::I32Add,
            0x6b => Self::I32Sub,
            0x6c => Self::I32Mul,
            0x6d => Self::I32DivS,
            0x6e => Self::I32DivU,
            0x6f => Self::I32RemS,
            0x70 => Self::I32RemU,
            0x71 => Self::I32And,
            0x72 => Self::I32Or,
            0x73 => Self::I32Xor,
            0x74 => Self::I32Shl,
            0x75 => Self::I32ShrS,
            0x76 => Self::I32ShrU,
            0x77 => Self::I32Rotl,
            0x78 => Self::I32Rotr,
            0x79 => Self::I64Clz,
            0x7a => Self::I64Ctz,
            0x7b => Self::I64Popcnt,
            0x7c => Self::I64Add,
            0x7d => Self::I64Sub,
            0x7e => Self::I64Mul,
            0x7f => Self::I64DivS,
            0x80 => Self::I64DivU,
            0x81 => Self::I64RemS,
            0x82 => Self::I64RemU,
            0x83 => Self::I64And,
            0x84 => Self::I64Or,
            0x85 => Self::I64Xor,
            0x86 => Self::I64Shl,
            0x87 => Self::I64ShrS,
            0x88 => Self::I64ShrU,
            0x89 => Self::I64Rotl,
            0x8a => Self::I64Rotr,
            0x8b => Self::F32Abs,
            0x8c => Self::F32Neg,
            0x8d => Self::F32Ceil,
            0x8e => Self::F32Floor,
            0x8f => Self::F32Trunc,
            0x90 => Self::F32Nearest,
            0x91 => Self::F32Sqrt,
            0x92 => Self::F32Add,
            0x93 => Self::F32Sub,
            0x94 => Self::F32Mul,
            0x95 => Self::F32Div,
            0x96 => Self::F32Min,
            0x97 => Self::F32Max,
            0x98 => Self::F32Copysign,
            0x99 => Self::F64Abs,
            0x9a => Self::F64Neg,
            0x9b => Self::F64Ceil,
            0x9c => Self::F64Floor,
            0x9d => Self::F64Trunc,
            0x9e => Self::F64Nearest,
            0x9f => Self::F64Sqrt,
            0xa0 => Self::F64Add,
            0xa1 => Self::F64Sub,
            0xa2 => Self::F64Mul,
            0xa3 => Self::F64Div,
            0xa4 => Self::F64Min,
            0xa5 => Self::F64Max,
            0xa6 => Self::F64Copysign,
            0xa7 => Self::I32WrapI64,
            0xa8 => Self::I32TruncF32S,
            0xa9 => Self::I32TruncF32U,
            0xaa => Self::I32TruncF64S,
            0xab => Self::I32TruncF64U,
            0xac => Self::I64ExtendI32S,
            0xad => Self::I64ExtendI32U,
            0xae => Self::I64TruncF32S,
            0xaf => Self::I64TruncF32U,
            0xb0 => Self::I64TruncF64S,
            0xb1 => Self::I64TruncF64U,
            0xb2 => Self::F32ConvertI32S,
            0xb3 => Self::F32ConvertI32U,
            0xb4 => Self::F32ConvertI64S,
            0xb5 => Self::F32ConvertI64U,
            0xb6 => Self::F32DemoteF64,
            0xb7 => Self::F64ConvertI32S,
            0xb8 => Self::F64ConvertI32U,
            0xb9 => Self::F64ConvertI64S,
            0xba => Self::F64ConvertI64U,
            0xbb => Self::F64PromoteF32,
            0xbc => Self::I32ReinterpretF32,
            0xbd => Self::I64ReinterpretF64,
            0xbe => Self::F32ReinterpretI32,
            0xbf => Self::F64ReinterpretI64,
            0xc0 => Self::I32Extend8S,
            0xc1 => Self::I32Extend16S,
            0xc2 => Self::I64Extend8S,
            0xc3 => Self::I64Extend16S,
            0xc4 => Self::I64Extend32S,
            _ => return None,
        })
    }
}

/// An extended opcode selected by ULEB128 after [`EXTENDED_PREFIX`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ExtOpcode {
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,
    MemoryFill,
}

impl ExtOpcode {
    /// Decodes an extended sub-opcode value.
    #[must_use]
    pub fn from_u32(sub: u32) -> Option<Self> {
        Some(match sub {
            0 => Self::I32TruncSatF32S,
            1 => Self::I32TruncSatF32U,
            2 => Self::I32TruncSatF64S,
            3 => Self::I32TruncSatF64U,
            4 => Self::I64TruncSatF32S,
            5 => Self::I64TruncSatF32U,
            6 => Self::I64TruncSatF64S,
            7 => Self::I64TruncSatF64U,
            11 => Self::MemoryFill,
            _ => return None,
        })
    }
}
