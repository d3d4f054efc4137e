// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `wasm_tape`: an embeddable interpreter for a WebAssembly subset.
//!
//! A [`module::Module`] is built from declarations and raw function bodies
//! in the WebAssembly binary instruction encoding. [`module::Module::expand`]
//! validates every body in a single pass and rewrites it into an internal
//! instruction stream with jump targets, byte offsets, and immediates all
//! resolved. Instantiation binds imports into an [`module::Instance`], and a
//! [`vm::Vm`] executes expanded functions over one contiguous byte stack.
//!
//! ## Example
//!
//! ```no_run
//! extern crate alloc;
//!
//! use wasm_tape::format::Writer;
//! use wasm_tape::host::NoHost;
//! use wasm_tape::imports::Imports;
//! use wasm_tape::module::Module;
//! use wasm_tape::opcode::Opcode;
//! use wasm_tape::sig::{Signature, ValueKind};
//! use wasm_tape::value::Value;
//! use wasm_tape::vm::Vm;
//!
//! // (func (param i32 i32) (result i32) local.get 0 local.get 1 i32.add)
//! let mut module = Module::new();
//! let ty = module.add_type(Signature::new(
//!     &[ValueKind::I32, ValueKind::I32],
//!     &[ValueKind::I32],
//! ));
//! let mut body = Writer::new();
//! body.write_u8(Opcode::LocalGet as u8);
//! body.write_uleb128_u32(0);
//! body.write_u8(Opcode::LocalGet as u8);
//! body.write_uleb128_u32(1);
//! body.write_u8(Opcode::I32Add as u8);
//! body.write_u8(Opcode::End as u8);
//! let add = module.add_function(ty, &[], body.into_vec())?;
//!
//! module.expand()?;
//!
//! let mut vm = Vm::new(NoHost);
//! let mut instance = vm.instantiate(&module, &Imports::new())?;
//! let out = vm
//!     .invoke(&module, &mut instance, add, &[Value::I32(10), Value::I32(25)])
//!     .unwrap();
//! assert_eq!(out, [Value::I32(35)]);
//! # Ok::<(), alloc::boxed::Box<dyn core::error::Error>>(())
//! ```

#![no_std]

extern crate alloc;

pub mod expand;
pub mod format;
pub mod host;
pub mod imports;
pub(crate) mod instr;
pub mod memory;
pub mod module;
pub mod opcode;
pub mod sig;
pub mod value;
pub mod vm;
