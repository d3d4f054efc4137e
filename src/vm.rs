// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The byte-stack interpreter.
//!
//! Execution state is a single contiguous byte stack. The stack pointer
//! starts at the high end and decreases on push, so an activation frame's
//! slots sit at `frame_top - offset - size` and pushing arguments left to
//! right lands each one exactly in its parameter slot. Calls are native
//! recursion: the callee allocates its locals below the arguments, runs,
//! slides its results over the frame, and the caller resets the stack
//! pointer to `frame_top - result_size`.
//!
//! All operands live on the stack as little-endian bytes; types were fully
//! resolved during expansion, so dispatch is on [`Op`] alone.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::host::{Host, HostError};
use crate::imports::{ImportKind, Imports};
use crate::instr::{BranchTarget, Op};
use crate::memory::LinearMemory;
use crate::module::{IndexEntry, Instance, InstantiateError, Module};
use crate::sig::{Signature, ValueKind};
use crate::value::Value;

/// A run-time trap. Traps abort the whole invocation; no resumption.
#[derive(Clone, Debug, PartialEq)]
pub enum Trap {
    /// An `unreachable` instruction was executed.
    Unreachable,
    /// The value stack ran out of space.
    StackExhausted,
    /// The call depth limit was exceeded.
    CallDepthExceeded,
    /// Integer division or remainder by zero.
    DivideByZero,
    /// Signed division overflow (`MIN / -1`).
    IntegerOverflow,
    /// A float-to-integer truncation of NaN or an out-of-range value.
    InvalidConversion,
    /// A linear-memory access fell outside the current bounds.
    MemoryOutOfBounds,
    /// A memory instruction ran in an instance without memory.
    NoMemory,
    /// A global access fell outside the instance's global region.
    GlobalOutOfBounds,
    /// `call_indirect` was executed; table dispatch is not provided.
    IndirectCallUnsupported,
    /// The module has not been expanded.
    NotExpanded,
    /// A function index was out of range.
    BadFunctionIndex {
        /// The offending index.
        index: u32,
    },
    /// The invocation supplied the wrong number of arguments.
    ArgCountMismatch {
        /// Parameters declared by the signature.
        expected: usize,
        /// Arguments supplied.
        actual: usize,
    },
    /// A host call failed.
    HostFailed(HostError),
    /// A host call returned results not matching the import's signature.
    HostResultMismatch {
        /// Results declared by the signature.
        expected: usize,
        /// Results returned by the host.
        actual: usize,
    },
    /// A jump target fell outside the instruction stream.
    InvalidTarget,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => write!(f, "unreachable executed"),
            Self::StackExhausted => write!(f, "value stack exhausted"),
            Self::CallDepthExceeded => write!(f, "call depth limit exceeded"),
            Self::DivideByZero => write!(f, "integer division by zero"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidConversion => write!(f, "invalid float to integer conversion"),
            Self::MemoryOutOfBounds => write!(f, "memory access out of bounds"),
            Self::NoMemory => write!(f, "instance has no memory"),
            Self::GlobalOutOfBounds => write!(f, "global access out of bounds"),
            Self::IndirectCallUnsupported => write!(f, "indirect call is not supported"),
            Self::NotExpanded => write!(f, "module is not expanded"),
            Self::BadFunctionIndex { index } => write!(f, "bad function index {index}"),
            Self::ArgCountMismatch { expected, actual } => {
                write!(f, "expected {expected} arguments, got {actual}")
            }
            Self::HostFailed(e) => write!(f, "host call failed: {e}"),
            Self::HostResultMismatch { expected, actual } => {
                write!(f, "host returned {actual} results, signature declares {expected}")
            }
            Self::InvalidTarget => write!(f, "jump target out of range"),
        }
    }
}

impl core::error::Error for Trap {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::HostFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Execution resource limits.
#[derive(Copy, Clone, Debug)]
pub struct Limits {
    /// Value stack size in bytes.
    pub stack_bytes: usize,
    /// Maximum nested call depth.
    pub max_call_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            stack_bytes: 1 << 20,
            max_call_depth: 256,
        }
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Per-invocation execution state: the byte stack, the stack pointer, and
/// the call depth.
struct ExecutionContext {
    stack: Vec<u8>,
    /// Grows downward; `stack[sp..]` holds live operand and frame bytes.
    sp: usize,
    depth: u32,
}

impl ExecutionContext {
    fn new(stack_bytes: usize) -> Self {
        Self {
            stack: vec![0; stack_bytes],
            sp: stack_bytes,
            depth: 0,
        }
    }

    fn read_u32_at(&self, at: usize) -> Result<u32, Trap> {
        self.stack
            .get(at..at + 4)
            .map(read_u32)
            .ok_or(Trap::StackExhausted)
    }

    fn read_u64_at(&self, at: usize) -> Result<u64, Trap> {
        self.stack
            .get(at..at + 8)
            .map(read_u64)
            .ok_or(Trap::StackExhausted)
    }

    fn write_u32_at(&mut self, at: usize, v: u32) -> Result<(), Trap> {
        self.stack
            .get_mut(at..at + 4)
            .ok_or(Trap::StackExhausted)?
            .copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn write_u64_at(&mut self, at: usize, v: u64) -> Result<(), Trap> {
        self.stack
            .get_mut(at..at + 8)
            .ok_or(Trap::StackExhausted)?
            .copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn push_u32(&mut self, v: u32) -> Result<(), Trap> {
        self.sp = self.sp.checked_sub(4).ok_or(Trap::StackExhausted)?;
        self.write_u32_at(self.sp, v)
    }

    fn push_u64(&mut self, v: u64) -> Result<(), Trap> {
        self.sp = self.sp.checked_sub(8).ok_or(Trap::StackExhausted)?;
        self.write_u64_at(self.sp, v)
    }

    fn pop_u32(&mut self) -> Result<u32, Trap> {
        let v = self.read_u32_at(self.sp)?;
        self.sp += 4;
        Ok(v)
    }

    fn pop_u64(&mut self) -> Result<u64, Trap> {
        let v = self.read_u64_at(self.sp)?;
        self.sp += 8;
        Ok(v)
    }

    fn push_i32(&mut self, v: i32) -> Result<(), Trap> {
        self.push_u32(v as u32)
    }

    fn push_i64(&mut self, v: i64) -> Result<(), Trap> {
        self.push_u64(v as u64)
    }

    fn push_f32(&mut self, v: f32) -> Result<(), Trap> {
        self.push_u32(v.to_bits())
    }

    fn push_f64(&mut self, v: f64) -> Result<(), Trap> {
        self.push_u64(v.to_bits())
    }

    fn push_bool(&mut self, v: bool) -> Result<(), Trap> {
        self.push_i32(i32::from(v))
    }

    fn pop_i32(&mut self) -> Result<i32, Trap> {
        Ok(self.pop_u32()? as i32)
    }

    fn pop_i64(&mut self) -> Result<i64, Trap> {
        Ok(self.pop_u64()? as i64)
    }

    fn pop_f32(&mut self) -> Result<f32, Trap> {
        Ok(f32::from_bits(self.pop_u32()?))
    }

    fn pop_f64(&mut self) -> Result<f64, Trap> {
        Ok(f64::from_bits(self.pop_u64()?))
    }

    fn push_value(&mut self, v: Value) -> Result<(), Trap> {
        match v {
            Value::I32(v) => self.push_i32(v),
            Value::I64(v) => self.push_i64(v),
            Value::F32(v) => self.push_f32(v),
            Value::F64(v) => self.push_f64(v),
        }
    }

    fn read_value_at(&self, at: usize, kind: ValueKind) -> Result<Value, Trap> {
        Ok(match kind {
            ValueKind::I32 => Value::I32(self.read_u32_at(at)? as i32),
            ValueKind::I64 => Value::I64(self.read_u64_at(at)? as i64),
            ValueKind::F32 => Value::F32(f32::from_bits(self.read_u32_at(at)?)),
            ValueKind::F64 => Value::F64(f64::from_bits(self.read_u64_at(at)?)),
        })
    }

    fn write_value_at(&mut self, at: usize, v: Value) -> Result<(), Trap> {
        match v {
            Value::I32(v) => self.write_u32_at(at, v as u32),
            Value::I64(v) => self.write_u64_at(at, v as u64),
            Value::F32(v) => self.write_u32_at(at, v.to_bits()),
            Value::F64(v) => self.write_u64_at(at, v.to_bits()),
        }
    }

    /// Unwinds for a taken branch: `keep` label bytes slide up over `drop`
    /// discarded bytes.
    fn unwind(&mut self, bt: &BranchTarget) {
        let keep = bt.keep as usize;
        let drop = bt.drop as usize;
        if keep > 0 && drop > 0 {
            self.stack.copy_within(self.sp..self.sp + keep, self.sp + drop);
        }
        self.sp += drop;
    }

    fn bin_i32(&mut self, f: impl FnOnce(i32, i32) -> i32) -> Result<(), Trap> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(f(a, b))
    }

    fn try_bin_i32(&mut self, f: impl FnOnce(i32, i32) -> Result<i32, Trap>) -> Result<(), Trap> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_i32(f(a, b)?)
    }

    fn cmp_i32(&mut self, f: impl FnOnce(i32, i32) -> bool) -> Result<(), Trap> {
        let b = self.pop_i32()?;
        let a = self.pop_i32()?;
        self.push_bool(f(a, b))
    }

    fn un_i32(&mut self, f: impl FnOnce(i32) -> i32) -> Result<(), Trap> {
        let a = self.pop_i32()?;
        self.push_i32(f(a))
    }

    fn bin_i64(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Result<(), Trap> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(f(a, b))
    }

    fn try_bin_i64(&mut self, f: impl FnOnce(i64, i64) -> Result<i64, Trap>) -> Result<(), Trap> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_i64(f(a, b)?)
    }

    fn cmp_i64(&mut self, f: impl FnOnce(i64, i64) -> bool) -> Result<(), Trap> {
        let b = self.pop_i64()?;
        let a = self.pop_i64()?;
        self.push_bool(f(a, b))
    }

    fn un_i64(&mut self, f: impl FnOnce(i64) -> i64) -> Result<(), Trap> {
        let a = self.pop_i64()?;
        self.push_i64(f(a))
    }

    fn bin_f32(&mut self, f: impl FnOnce(f32, f32) -> f32) -> Result<(), Trap> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_f32(f(a, b))
    }

    fn cmp_f32(&mut self, f: impl FnOnce(f32, f32) -> bool) -> Result<(), Trap> {
        let b = self.pop_f32()?;
        let a = self.pop_f32()?;
        self.push_bool(f(a, b))
    }

    fn un_f32(&mut self, f: impl FnOnce(f32) -> f32) -> Result<(), Trap> {
        let a = self.pop_f32()?;
        self.push_f32(f(a))
    }

    fn bin_f64(&mut self, f: impl FnOnce(f64, f64) -> f64) -> Result<(), Trap> {
        let b = self.pop_f64()?;
        let a = self.pop_f64()?;
        self.push_f64(f(a, b))
    }

    fn cmp_f64(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<(), Trap> {
        let b = self.pop_f64()?;
        let a = self.pop_f64()?;
        self.push_bool(f(a, b))
    }

    fn un_f64(&mut self, f: impl FnOnce(f64) -> f64) -> Result<(), Trap> {
        let a = self.pop_f64()?;
        self.push_f64(f(a))
    }
}

fn div_s_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    if a == i32::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a.wrapping_div(b))
}

fn rem_s_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    // MIN % -1 is defined as 0.
    Ok(a.wrapping_rem(b))
}

fn div_u_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u32) / (b as u32)) as i32)
}

fn rem_u_i32(a: i32, b: i32) -> Result<i32, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u32) % (b as u32)) as i32)
}

fn div_s_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(a.wrapping_div(b))
}

fn rem_s_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(a.wrapping_rem(b))
}

fn div_u_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u64) / (b as u64)) as i64)
}

fn rem_u_i64(a: i64, b: i64) -> Result<i64, Trap> {
    if b == 0 {
        return Err(Trap::DivideByZero);
    }
    Ok(((a as u64) % (b as u64)) as i64)
}

// IEEE min/max with the WebAssembly NaN and signed-zero rules: any NaN
// operand produces NaN, and equal operands (the +-0 pair) resolve by sign.

fn min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else if a < b {
        a
    } else {
        b
    }
}

fn max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else if a > b {
        a
    } else {
        b
    }
}

fn min_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() {
            a
        } else {
            b
        }
    } else if a < b {
        a
    } else {
        b
    }
}

fn max_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() {
            a
        } else {
            b
        }
    } else if a > b {
        a
    } else {
        b
    }
}

// Trapping float-to-integer truncations. The truncated value must land in
// the target range; NaN and out-of-range inputs trap. The bounds are exact
// powers of two, representable in both float widths.

fn trunc_f32_i32(f: f32) -> Result<i32, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::truncf(f);
    if t >= 2_147_483_648.0 || t < -2_147_483_648.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as i32)
}

fn trunc_f32_u32(f: f32) -> Result<u32, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::truncf(f);
    if t >= 4_294_967_296.0 || t <= -1.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as u32)
}

fn trunc_f32_i64(f: f32) -> Result<i64, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::truncf(f);
    if t >= 9_223_372_036_854_775_808.0 || t < -9_223_372_036_854_775_808.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as i64)
}

fn trunc_f32_u64(f: f32) -> Result<u64, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::truncf(f);
    if t >= 18_446_744_073_709_551_616.0 || t <= -1.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as u64)
}

fn trunc_f64_i32(f: f64) -> Result<i32, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::trunc(f);
    if t >= 2_147_483_648.0 || t < -2_147_483_648.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as i32)
}

fn trunc_f64_u32(f: f64) -> Result<u32, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::trunc(f);
    if t >= 4_294_967_296.0 || t <= -1.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as u32)
}

fn trunc_f64_i64(f: f64) -> Result<i64, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::trunc(f);
    if t >= 9_223_372_036_854_775_808.0 || t < -9_223_372_036_854_775_808.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as i64)
}

fn trunc_f64_u64(f: f64) -> Result<u64, Trap> {
    if f.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let t = libm::trunc(f);
    if t >= 18_446_744_073_709_551_616.0 || t <= -1.0 {
        return Err(Trap::InvalidConversion);
    }
    Ok(t as u64)
}

/// The interpreter, generic over the host ABI implementation.
#[derive(Debug)]
pub struct Vm<H: Host> {
    host: H,
    limits: Limits,
}

impl<H: Host> Vm<H> {
    /// Creates a VM with default [`Limits`].
    pub fn new(host: H) -> Self {
        Self::with_limits(host, Limits::default())
    }

    /// Creates a VM with explicit limits.
    pub fn with_limits(host: H, limits: Limits) -> Self {
        Self { host, limits }
    }

    /// Returns the host.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Returns the host mutably.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Binds `imports`, builds an [`Instance`], and runs the start function
    /// if the module declares one.
    pub fn instantiate(
        &mut self,
        module: &Module,
        imports: &Imports,
    ) -> Result<Instance, InstantiateError> {
        let mut instance = module.instantiate(imports)?;
        if let Some(start) = module.start() {
            self.invoke(module, &mut instance, start, &[])
                .map_err(InstantiateError::StartTrapped)?;
        }
        Ok(instance)
    }

    /// Invokes function `func` (an index into the module's function index
    /// space) with `args`, returning the result values.
    ///
    /// Each argument is converted to the signature's declared parameter kind
    /// before the call.
    pub fn invoke(
        &mut self,
        module: &Module,
        instance: &mut Instance,
        func: u32,
        args: &[Value],
    ) -> Result<Vec<Value>, Trap> {
        if !module.is_expanded() {
            return Err(Trap::NotExpanded);
        }
        let sig = module
            .signature(func)
            .ok_or(Trap::BadFunctionIndex { index: func })?;
        if args.len() != sig.params.len() {
            return Err(Trap::ArgCountMismatch {
                expected: sig.params.len(),
                actual: args.len(),
            });
        }
        let args: Vec<Value> = sig
            .params
            .slots()
            .iter()
            .zip(args)
            .map(|(slot, arg)| arg.convert_to(slot.kind))
            .collect();
        log::trace!("invoke function {func} with {} args", args.len());

        let entry = *module
            .function_index
            .get(func as usize)
            .ok_or(Trap::BadFunctionIndex { index: func })?;
        let local = match entry {
            IndexEntry::Local(i) => i,
            IndexEntry::Import(i) => {
                // Invoking an import directly goes straight to the host.
                let decl = &module.imports[i as usize];
                let results = self
                    .host
                    .call(&decl.module, &decl.field, sig, &args)
                    .map_err(Trap::HostFailed)?;
                check_host_results(sig, &results)?;
                return Ok(results);
            }
        };

        let mut ctx = ExecutionContext::new(self.limits.stack_bytes);
        for &arg in &args {
            ctx.push_value(arg)?;
        }
        let top = ctx.sp + sig.param_size() as usize;
        self.run(module, instance, &mut ctx, local)?;
        ctx.sp = top
            .checked_sub(sig.result_size() as usize)
            .ok_or(Trap::StackExhausted)?;

        let mut results = Vec::with_capacity(sig.results.len());
        for slot in sig.results.slots() {
            let at = top - slot.offset as usize - slot.kind.byte_size() as usize;
            results.push(ctx.read_value_at(at, slot.kind)?);
        }
        Ok(results)
    }

    /// Runs local function `func`. On entry the arguments are already on
    /// the stack; on exit the result bytes sit at the stack top and the
    /// caller resets the stack pointer from the callee's frame top.
    fn run(
        &mut self,
        module: &Module,
        instance: &mut Instance,
        ctx: &mut ExecutionContext,
        func: u32,
    ) -> Result<(), Trap> {
        ctx.depth += 1;
        if ctx.depth > self.limits.max_call_depth {
            return Err(Trap::CallDepthExceeded);
        }
        let f = module
            .functions
            .get(func as usize)
            .ok_or(Trap::BadFunctionIndex { index: func })?;
        let sig = module
            .types
            .get(f.type_idx as usize)
            .ok_or(Trap::BadFunctionIndex { index: func })?;

        let frame_top = ctx.sp + sig.param_size() as usize;
        let local_bytes = (f.frame_size() - sig.param_size()) as usize;
        ctx.sp = ctx
            .sp
            .checked_sub(local_bytes)
            .ok_or(Trap::StackExhausted)?;
        ctx.stack[ctx.sp..ctx.sp + local_bytes].fill(0);

        let mut pc = 0usize;
        loop {
            let op = f.ops.get(pc).ok_or(Trap::InvalidTarget)?;
            pc += 1;
            match *op {
                Op::Unreachable => return Err(Trap::Unreachable),

                Op::Goto { target } => pc = target as usize,
                Op::IfZero { target } => {
                    if ctx.pop_i32()? == 0 {
                        pc = target as usize;
                    }
                }
                Op::Br(ref bt) => {
                    ctx.unwind(bt);
                    pc = bt.target as usize;
                }
                Op::BrIf(ref bt) => {
                    if ctx.pop_i32()? != 0 {
                        ctx.unwind(bt);
                        pc = bt.target as usize;
                    }
                }
                Op::BrTable {
                    ref targets,
                    ref default,
                } => {
                    let sel = ctx.pop_u32()? as usize;
                    let bt = targets.get(sel).unwrap_or(default);
                    ctx.unwind(bt);
                    pc = bt.target as usize;
                }
                Op::ShiftResult { shift, result } => {
                    let shift = shift as usize;
                    let result = result as usize;
                    if shift > 0 && result > 0 {
                        ctx.stack
                            .copy_within(ctx.sp..ctx.sp + result, ctx.sp + shift);
                    }
                    ctx.sp += shift;
                }
                Op::Return => break,
                Op::CallLocal { func: callee } => {
                    let cf = module
                        .functions
                        .get(callee as usize)
                        .ok_or(Trap::BadFunctionIndex { index: callee })?;
                    let csig = module
                        .types
                        .get(cf.type_idx as usize)
                        .ok_or(Trap::BadFunctionIndex { index: callee })?;
                    let top = ctx.sp + csig.param_size() as usize;
                    self.run(module, instance, ctx, callee)?;
                    ctx.sp = top
                        .checked_sub(csig.result_size() as usize)
                        .ok_or(Trap::StackExhausted)?;
                }
                Op::CallImport { import } => {
                    self.call_import(module, ctx, import)?;
                }
                Op::CallIndirect { .. } => return Err(Trap::IndirectCallUnsupported),

                ref op => execute(op, ctx, instance, frame_top)?,
            }
        }

        ctx.depth -= 1;
        Ok(())
    }

    /// Marshals a host call: arguments are read out of the caller's pushed
    /// parameter slots, the host runs, and its results are written back at
    /// the slot addresses the calling convention assigns them.
    fn call_import(
        &mut self,
        module: &Module,
        ctx: &mut ExecutionContext,
        import: u32,
    ) -> Result<(), Trap> {
        let decl = module
            .imports
            .get(import as usize)
            .ok_or(Trap::BadFunctionIndex { index: import })?;
        let type_idx = match decl.kind {
            ImportKind::Function { type_idx } => type_idx,
            _ => return Err(Trap::BadFunctionIndex { index: import }),
        };
        let sig = module
            .types
            .get(type_idx as usize)
            .ok_or(Trap::BadFunctionIndex { index: import })?;

        let top = ctx.sp + sig.param_size() as usize;
        let mut args = Vec::with_capacity(sig.params.len());
        for slot in sig.params.slots() {
            let at = top - slot.offset as usize - slot.kind.byte_size() as usize;
            args.push(ctx.read_value_at(at, slot.kind)?);
        }

        let results = self
            .host
            .call(&decl.module, &decl.field, sig, &args)
            .map_err(Trap::HostFailed)?;
        check_host_results(sig, &results)?;

        ctx.sp = top
            .checked_sub(sig.result_size() as usize)
            .ok_or(Trap::StackExhausted)?;
        for (slot, v) in sig.results.slots().iter().zip(&results) {
            let at = top - slot.offset as usize - slot.kind.byte_size() as usize;
            ctx.write_value_at(at, *v)?;
        }
        Ok(())
    }
}

/// Executes one straight-line op. Control flow (branches, calls, return)
/// stays in the fetch loop; everything dispatched here is kept out of line
/// so the recursing loop's native frame stays small.
#[inline(never)]
fn execute(
    op: &Op,
    ctx: &mut ExecutionContext,
    instance: &mut Instance,
    frame_top: usize,
) -> Result<(), Trap> {
    match *op {
        Op::Drop32 => {
            ctx.pop_u32()?;
        }
        Op::Drop64 => {
            ctx.pop_u64()?;
        }
        Op::Select32 => {
            let cond = ctx.pop_i32()?;
            let b = ctx.pop_u32()?;
            let a = ctx.pop_u32()?;
            ctx.push_u32(if cond != 0 { a } else { b })?;
        }
        Op::Select64 => {
            let cond = ctx.pop_i32()?;
            let b = ctx.pop_u64()?;
            let a = ctx.pop_u64()?;
            ctx.push_u64(if cond != 0 { a } else { b })?;
        }

        Op::LocalGet32 { offset } => {
            let v = ctx.read_u32_at(frame_top - offset as usize - 4)?;
            ctx.push_u32(v)?;
        }
        Op::LocalGet64 { offset } => {
            let v = ctx.read_u64_at(frame_top - offset as usize - 8)?;
            ctx.push_u64(v)?;
        }
        Op::LocalSet32 { offset } => {
            let v = ctx.pop_u32()?;
            ctx.write_u32_at(frame_top - offset as usize - 4, v)?;
        }
        Op::LocalSet64 { offset } => {
            let v = ctx.pop_u64()?;
            ctx.write_u64_at(frame_top - offset as usize - 8, v)?;
        }
        Op::LocalTee32 { offset } => {
            let v = ctx.read_u32_at(ctx.sp)?;
            ctx.write_u32_at(frame_top - offset as usize - 4, v)?;
        }
        Op::LocalTee64 { offset } => {
            let v = ctx.read_u64_at(ctx.sp)?;
            ctx.write_u64_at(frame_top - offset as usize - 8, v)?;
        }
        Op::GlobalGet32 { offset } => {
            let v = global(instance, offset, 4).map(read_u32)?;
            ctx.push_u32(v)?;
        }
        Op::GlobalGet64 { offset } => {
            let v = global(instance, offset, 8).map(read_u64)?;
            ctx.push_u64(v)?;
        }
        Op::GlobalSet32 { offset } => {
            let v = ctx.pop_u32()?;
            global_mut(instance, offset, 4)?.copy_from_slice(&v.to_le_bytes());
        }
        Op::GlobalSet64 { offset } => {
            let v = ctx.pop_u64()?;
            global_mut(instance, offset, 8)?.copy_from_slice(&v.to_le_bytes());
        }

        Op::I32Load { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u32(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u32(v)?;
        }
        Op::I64Load { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u64(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u64(v)?;
        }
        Op::F32Load { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u32(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u32(v)?;
        }
        Op::F64Load { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u64(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u64(v)?;
        }
        Op::I32Load8S { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u8(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_i32(i32::from(v as i8))?;
        }
        Op::I32Load8U { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u8(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u32(u32::from(v))?;
        }
        Op::I32Load16S { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u16(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_i32(i32::from(v as i16))?;
        }
        Op::I32Load16U { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u16(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u32(u32::from(v))?;
        }
        Op::I64Load8S { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u8(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_i64(i64::from(v as i8))?;
        }
        Op::I64Load8U { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u8(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u64(u64::from(v))?;
        }
        Op::I64Load16S { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u16(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_i64(i64::from(v as i16))?;
        }
        Op::I64Load16U { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u16(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u64(u64::from(v))?;
        }
        Op::I64Load32S { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u32(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_i64(i64::from(v as i32))?;
        }
        Op::I64Load32U { offset } => {
            let addr = effective_address(ctx.pop_u32()?, offset);
            let v = memory(instance)?
                .load_u32(addr)
                .ok_or(Trap::MemoryOutOfBounds)?;
            ctx.push_u64(u64::from(v))?;
        }
        Op::I32Store { offset } => {
            let v = ctx.pop_u32()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u32(addr, v) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I64Store { offset } => {
            let v = ctx.pop_u64()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u64(addr, v) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::F32Store { offset } => {
            let v = ctx.pop_u32()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u32(addr, v) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::F64Store { offset } => {
            let v = ctx.pop_u64()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u64(addr, v) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I32Store8 { offset } => {
            let v = ctx.pop_u32()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u8(addr, v as u8) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I32Store16 { offset } => {
            let v = ctx.pop_u32()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u16(addr, v as u16) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I64Store8 { offset } => {
            let v = ctx.pop_u64()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u8(addr, v as u8) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I64Store16 { offset } => {
            let v = ctx.pop_u64()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u16(addr, v as u16) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::I64Store32 { offset } => {
            let v = ctx.pop_u64()?;
            let addr = effective_address(ctx.pop_u32()?, offset);
            if !memory(instance)?.store_u32(addr, v as u32) {
                return Err(Trap::MemoryOutOfBounds);
            }
        }
        Op::MemorySize => {
            let pages = memory(instance)?.size_pages();
            ctx.push_u32(pages)?;
        }
        Op::MemoryGrow => {
            let delta = ctx.pop_u32()?;
            // Failure reports -1 and leaves the memory unchanged.
            let prior = match memory(instance)?.grow(delta) {
                Some(pages) => pages,
                None => u32::MAX,
            };
            ctx.push_u32(prior)?;
        }
        Op::MemoryFill => {
            let len = ctx.pop_u32()?;
            let value = ctx.pop_u32()?;
            let dest = ctx.pop_u32()?;
            let ok = memory(instance)?.fill(u64::from(dest), value as u8, u64::from(len));
            if !ok {
                return Err(Trap::MemoryOutOfBounds);
            }
        }

        Op::I32Const(v) => ctx.push_i32(v)?,
        Op::I64Const(v) => ctx.push_i64(v)?,
        Op::F32Const(v) => ctx.push_f32(v)?,
        Op::F64Const(v) => ctx.push_f64(v)?,

        Op::I32Eqz => {
            let a = ctx.pop_i32()?;
            ctx.push_bool(a == 0)?;
        }
        Op::I32Eq => ctx.cmp_i32(|a, b| a == b)?,
        Op::I32Ne => ctx.cmp_i32(|a, b| a != b)?,
        Op::I32LtS => ctx.cmp_i32(|a, b| a < b)?,
        Op::I32LtU => ctx.cmp_i32(|a, b| (a as u32) < (b as u32))?,
        Op::I32GtS => ctx.cmp_i32(|a, b| a > b)?,
        Op::I32GtU => ctx.cmp_i32(|a, b| (a as u32) > (b as u32))?,
        Op::I32LeS => ctx.cmp_i32(|a, b| a <= b)?,
        Op::I32LeU => ctx.cmp_i32(|a, b| (a as u32) <= (b as u32))?,
        Op::I32GeS => ctx.cmp_i32(|a, b| a >= b)?,
        Op::I32GeU => ctx.cmp_i32(|a, b| (a as u32) >= (b as u32))?,
        Op::I64Eqz => {
            let a = ctx.pop_i64()?;
            ctx.push_bool(a == 0)?;
        }
        Op::I64Eq => ctx.cmp_i64(|a, b| a == b)?,
        Op::I64Ne => ctx.cmp_i64(|a, b| a != b)?,
        Op::I64LtS => ctx.cmp_i64(|a, b| a < b)?,
        Op::I64LtU => ctx.cmp_i64(|a, b| (a as u64) < (b as u64))?,
        Op::I64GtS => ctx.cmp_i64(|a, b| a > b)?,
        Op::I64GtU => ctx.cmp_i64(|a, b| (a as u64) > (b as u64))?,
        Op::I64LeS => ctx.cmp_i64(|a, b| a <= b)?,
        Op::I64LeU => ctx.cmp_i64(|a, b| (a as u64) <= (b as u64))?,
        Op::I64GeS => ctx.cmp_i64(|a, b| a >= b)?,
        Op::I64GeU => ctx.cmp_i64(|a, b| (a as u64) >= (b as u64))?,
        Op::F32Eq => ctx.cmp_f32(|a, b| a == b)?,
        Op::F32Ne => ctx.cmp_f32(|a, b| a != b)?,
        Op::F32Lt => ctx.cmp_f32(|a, b| a < b)?,
        Op::F32Gt => ctx.cmp_f32(|a, b| a > b)?,
        Op::F32Le => ctx.cmp_f32(|a, b| a <= b)?,
        Op::F32Ge => ctx.cmp_f32(|a, b| a >= b)?,
        Op::F64Eq => ctx.cmp_f64(|a, b| a == b)?,
        Op::F64Ne => ctx.cmp_f64(|a, b| a != b)?,
        Op::F64Lt => ctx.cmp_f64(|a, b| a < b)?,
        Op::F64Gt => ctx.cmp_f64(|a, b| a > b)?,
        Op::F64Le => ctx.cmp_f64(|a, b| a <= b)?,
        Op::F64Ge => ctx.cmp_f64(|a, b| a >= b)?,

        Op::I32Clz => ctx.un_i32(|a| a.leading_zeros() as i32)?,
        Op::I32Ctz => ctx.un_i32(|a| a.trailing_zeros() as i32)?,
        Op::I32Popcnt => ctx.un_i32(|a| a.count_ones() as i32)?,
        Op::I32Add => ctx.bin_i32(i32::wrapping_add)?,
        Op::I32Sub => ctx.bin_i32(i32::wrapping_sub)?,
        Op::I32Mul => ctx.bin_i32(i32::wrapping_mul)?,
        Op::I32DivS => ctx.try_bin_i32(div_s_i32)?,
        Op::I32DivU => ctx.try_bin_i32(div_u_i32)?,
        Op::I32RemS => ctx.try_bin_i32(rem_s_i32)?,
        Op::I32RemU => ctx.try_bin_i32(rem_u_i32)?,
        Op::I32And => ctx.bin_i32(|a, b| a & b)?,
        Op::I32Or => ctx.bin_i32(|a, b| a | b)?,
        Op::I32Xor => ctx.bin_i32(|a, b| a ^ b)?,
        Op::I32Shl => ctx.bin_i32(|a, b| a.wrapping_shl(b as u32))?,
        Op::I32ShrS => ctx.bin_i32(|a, b| a.wrapping_shr(b as u32))?,
        Op::I32ShrU => ctx.bin_i32(|a, b| ((a as u32).wrapping_shr(b as u32)) as i32)?,
        Op::I32Rotl => ctx.bin_i32(|a, b| a.rotate_left(b as u32 & 31))?,
        Op::I32Rotr => ctx.bin_i32(|a, b| a.rotate_right(b as u32 & 31))?,
        Op::I64Clz => ctx.un_i64(|a| i64::from(a.leading_zeros()))?,
        Op::I64Ctz => ctx.un_i64(|a| i64::from(a.trailing_zeros()))?,
        Op::I64Popcnt => ctx.un_i64(|a| i64::from(a.count_ones()))?,
        Op::I64Add => ctx.bin_i64(i64::wrapping_add)?,
        Op::I64Sub => ctx.bin_i64(i64::wrapping_sub)?,
        Op::I64Mul => ctx.bin_i64(i64::wrapping_mul)?,
        Op::I64DivS => ctx.try_bin_i64(div_s_i64)?,
        Op::I64DivU => ctx.try_bin_i64(div_u_i64)?,
        Op::I64RemS => ctx.try_bin_i64(rem_s_i64)?,
        Op::I64RemU => ctx.try_bin_i64(rem_u_i64)?,
        Op::I64And => ctx.bin_i64(|a, b| a & b)?,
        Op::I64Or => ctx.bin_i64(|a, b| a | b)?,
        Op::I64Xor => ctx.bin_i64(|a, b| a ^ b)?,
        Op::I64Shl => ctx.bin_i64(|a, b| a.wrapping_shl(b as u32))?,
        Op::I64ShrS => ctx.bin_i64(|a, b| a.wrapping_shr(b as u32))?,
        Op::I64ShrU => ctx.bin_i64(|a, b| ((a as u64).wrapping_shr(b as u32)) as i64)?,
        Op::I64Rotl => ctx.bin_i64(|a, b| a.rotate_left(b as u32 & 63))?,
        Op::I64Rotr => ctx.bin_i64(|a, b| a.rotate_right(b as u32 & 63))?,

        Op::F32Abs => ctx.un_f32(libm::fabsf)?,
        Op::F32Neg => ctx.un_f32(|a| -a)?,
        Op::F32Ceil => ctx.un_f32(libm::ceilf)?,
        Op::F32Floor => ctx.un_f32(libm::floorf)?,
        Op::F32Trunc => ctx.un_f32(libm::truncf)?,
        Op::F32Nearest => ctx.un_f32(libm::rintf)?,
        Op::F32Sqrt => ctx.un_f32(libm::sqrtf)?,
        Op::F32Add => ctx.bin_f32(|a, b| a + b)?,
        Op::F32Sub => ctx.bin_f32(|a, b| a - b)?,
        Op::F32Mul => ctx.bin_f32(|a, b| a * b)?,
        Op::F32Div => ctx.bin_f32(|a, b| a / b)?,
        Op::F32Min => ctx.bin_f32(min_f32)?,
        Op::F32Max => ctx.bin_f32(max_f32)?,
        Op::F32Copysign => ctx.bin_f32(libm::copysignf)?,
        Op::F64Abs => ctx.un_f64(libm::fabs)?,
        Op::F64Neg => ctx.un_f64(|a| -a)?,
        Op::F64Ceil => ctx.un_f64(libm::ceil)?,
        Op::F64Floor => ctx.un_f64(libm::floor)?,
        Op::F64Trunc => ctx.un_f64(libm::trunc)?,
        Op::F64Nearest => ctx.un_f64(libm::rint)?,
        Op::F64Sqrt => ctx.un_f64(libm::sqrt)?,
        Op::F64Add => ctx.bin_f64(|a, b| a + b)?,
        Op::F64Sub => ctx.bin_f64(|a, b| a - b)?,
        Op::F64Mul => ctx.bin_f64(|a, b| a * b)?,
        Op::F64Div => ctx.bin_f64(|a, b| a / b)?,
        Op::F64Min => ctx.bin_f64(min_f64)?,
        Op::F64Max => ctx.bin_f64(max_f64)?,
        Op::F64Copysign => ctx.bin_f64(libm::copysign)?,

        Op::I32WrapI64 => {
            let a = ctx.pop_i64()?;
            ctx.push_i32(a as i32)?;
        }
        Op::I32TruncF32S => {
            let a = ctx.pop_f32()?;
            ctx.push_i32(trunc_f32_i32(a)?)?;
        }
        Op::I32TruncF32U => {
            let a = ctx.pop_f32()?;
            ctx.push_u32(trunc_f32_u32(a)?)?;
        }
        Op::I32TruncF64S => {
            let a = ctx.pop_f64()?;
            ctx.push_i32(trunc_f64_i32(a)?)?;
        }
        Op::I32TruncF64U => {
            let a = ctx.pop_f64()?;
            ctx.push_u32(trunc_f64_u32(a)?)?;
        }
        Op::I64ExtendI32S => {
            let a = ctx.pop_i32()?;
            ctx.push_i64(i64::from(a))?;
        }
        Op::I64ExtendI32U => {
            let a = ctx.pop_u32()?;
            ctx.push_u64(u64::from(a))?;
        }
        Op::I64TruncF32S => {
            let a = ctx.pop_f32()?;
            ctx.push_i64(trunc_f32_i64(a)?)?;
        }
        Op::I64TruncF32U => {
            let a = ctx.pop_f32()?;
            ctx.push_u64(trunc_f32_u64(a)?)?;
        }
        Op::I64TruncF64S => {
            let a = ctx.pop_f64()?;
            ctx.push_i64(trunc_f64_i64(a)?)?;
        }
        Op::I64TruncF64U => {
            let a = ctx.pop_f64()?;
            ctx.push_u64(trunc_f64_u64(a)?)?;
        }
        Op::F32ConvertI32S => {
            let a = ctx.pop_i32()?;
            ctx.push_f32(a as f32)?;
        }
        Op::F32ConvertI32U => {
            let a = ctx.pop_u32()?;
            ctx.push_f32(a as f32)?;
        }
        Op::F32ConvertI64S => {
            let a = ctx.pop_i64()?;
            ctx.push_f32(a as f32)?;
        }
        Op::F32ConvertI64U => {
            let a = ctx.pop_u64()?;
            ctx.push_f32(a as f32)?;
        }
        Op::F32DemoteF64 => {
            let a = ctx.pop_f64()?;
            ctx.push_f32(a as f32)?;
        }
        Op::F64ConvertI32S => {
            let a = ctx.pop_i32()?;
            ctx.push_f64(f64::from(a))?;
        }
        Op::F64ConvertI32U => {
            let a = ctx.pop_u32()?;
            ctx.push_f64(f64::from(a))?;
        }
        Op::F64ConvertI64S => {
            let a = ctx.pop_i64()?;
            ctx.push_f64(a as f64)?;
        }
        Op::F64ConvertI64U => {
            let a = ctx.pop_u64()?;
            ctx.push_f64(a as f64)?;
        }
        Op::F64PromoteF32 => {
            let a = ctx.pop_f32()?;
            ctx.push_f64(f64::from(a))?;
        }

        Op::I32Extend8S => ctx.un_i32(|a| i32::from(a as i8))?,
        Op::I32Extend16S => ctx.un_i32(|a| i32::from(a as i16))?,
        Op::I64Extend8S => ctx.un_i64(|a| i64::from(a as i8))?,
        Op::I64Extend16S => ctx.un_i64(|a| i64::from(a as i16))?,
        Op::I64Extend32S => ctx.un_i64(|a| i64::from(a as i32))?,

        // Saturating truncations lean on Rust's saturating float
        // casts: NaN becomes zero, out-of-range clamps.
        Op::I32TruncSatF32S => {
            let a = ctx.pop_f32()?;
            ctx.push_i32(a as i32)?;
        }
        Op::I32TruncSatF32U => {
            let a = ctx.pop_f32()?;
            ctx.push_u32(a as u32)?;
        }
        Op::I32TruncSatF64S => {
            let a = ctx.pop_f64()?;
            ctx.push_i32(a as i32)?;
        }
        Op::I32TruncSatF64U => {
            let a = ctx.pop_f64()?;
            ctx.push_u32(a as u32)?;
        }
        Op::I64TruncSatF32S => {
            let a = ctx.pop_f32()?;
            ctx.push_i64(a as i64)?;
        }
        Op::I64TruncSatF32U => {
            let a = ctx.pop_f32()?;
            ctx.push_u64(a as u64)?;
        }
        Op::I64TruncSatF64S => {
            let a = ctx.pop_f64()?;
            ctx.push_i64(a as i64)?;
        }
        Op::I64TruncSatF64U => {
            let a = ctx.pop_f64()?;
            ctx.push_u64(a as u64)?;
        }

        _ => debug_assert!(false, "control op reached straight-line dispatch"),
    }
    Ok(())
}

fn check_host_results(sig: &Signature, results: &[Value]) -> Result<(), Trap> {
    if results.len() != sig.results.len()
        || sig
            .results
            .slots()
            .iter()
            .zip(results)
            .any(|(slot, v)| v.kind() != slot.kind)
    {
        return Err(Trap::HostResultMismatch {
            expected: sig.results.len(),
            actual: results.len(),
        });
    }
    Ok(())
}

fn memory(instance: &mut Instance) -> Result<&mut LinearMemory, Trap> {
    instance.memory.as_mut().ok_or(Trap::NoMemory)
}

// Expansion resolves global offsets against the defining module, so a miss
// here means the instance was built from a different module.
fn global(instance: &Instance, offset: u32, size: usize) -> Result<&[u8], Trap> {
    let off = offset as usize;
    instance
        .globals
        .get(off..off + size)
        .ok_or(Trap::GlobalOutOfBounds)
}

fn global_mut(instance: &mut Instance, offset: u32, size: usize) -> Result<&mut [u8], Trap> {
    let off = offset as usize;
    instance
        .globals
        .get_mut(off..off + size)
        .ok_or(Trap::GlobalOutOfBounds)
}

fn effective_address(base: u32, offset: u32) -> u64 {
    u64::from(base) + u64::from(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let l = Limits::default();
        assert_eq!(l.stack_bytes, 1 << 20);
        assert_eq!(l.max_call_depth, 256);
    }

    #[test]
    fn signed_division_edge_cases() {
        assert_eq!(div_s_i32(7, -2), Ok(-3));
        assert_eq!(div_s_i32(1, 0), Err(Trap::DivideByZero));
        assert_eq!(div_s_i32(i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(rem_s_i32(i32::MIN, -1), Ok(0));
        assert_eq!(rem_s_i32(-7, 2), Ok(-1));
        assert_eq!(div_s_i64(i64::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(div_u_i32(-2, 3), Ok(((u32::MAX - 1) / 3) as i32));
    }

    #[test]
    fn trapping_truncation_bounds() {
        assert_eq!(trunc_f64_i32(2_147_483_647.5), Ok(i32::MAX));
        assert_eq!(
            trunc_f64_i32(2_147_483_648.0),
            Err(Trap::InvalidConversion)
        );
        assert_eq!(trunc_f64_i32(-2_147_483_648.9), Ok(i32::MIN));
        assert_eq!(
            trunc_f64_i32(-2_147_483_649.0),
            Err(Trap::InvalidConversion)
        );
        assert_eq!(trunc_f64_i32(f64::NAN), Err(Trap::InvalidConversion));
        assert_eq!(trunc_f64_u32(-0.5), Ok(0));
        assert_eq!(trunc_f64_u32(-1.0), Err(Trap::InvalidConversion));
        assert_eq!(trunc_f64_u32(4_294_967_295.9), Ok(u32::MAX));
        assert_eq!(trunc_f32_i32(f32::INFINITY), Err(Trap::InvalidConversion));
        assert_eq!(trunc_f32_u64(-0.9), Ok(0));
        assert_eq!(
            trunc_f64_i64(9_223_372_036_854_775_808.0),
            Err(Trap::InvalidConversion)
        );
    }

    #[test]
    fn float_min_max_zero_and_nan() {
        assert!(min_f32(f32::NAN, 1.0).is_nan());
        assert!(max_f64(2.0, f64::NAN).is_nan());
        assert!(min_f64(0.0, -0.0).is_sign_negative());
        assert!(max_f32(-0.0, 0.0).is_sign_positive());
        assert_eq!(min_f32(-1.5, 2.0), -1.5);
        assert_eq!(max_f64(-1.5, 2.0), 2.0);
    }
}
