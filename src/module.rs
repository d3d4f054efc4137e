// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Module structure: types, functions, globals, memory, and index spaces.
//!
//! Imported and locally defined entities share one index space per kind,
//! imports first by convention of declaration order. A function body starts
//! life as raw wire bytes and is rewritten exactly once by
//! [`Module::expand`]; the raw form is consumed in the process, so a module
//! cannot be expanded twice and an expanded body cannot be re-validated
//! against different module state.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::expand::{self, ValidationError};
use crate::imports::{Extern, ImportDecl, ImportKind, Imports};
use crate::instr::Op;
use crate::memory::LinearMemory;
use crate::sig::{Layout, Signature, ValueKind};
use crate::value::Value;

/// An entry in a shared index space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexEntry {
    /// Index into the module's locally defined entities.
    Local(u32),
    /// Index into the module's import declarations.
    Import(u32),
}

/// A locally defined memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryDecl {
    /// Initial size in pages.
    pub initial_pages: u32,
    /// Maximum size in pages.
    pub max_pages: u32,
}

#[derive(Clone, Debug)]
pub(crate) enum MemorySource {
    Local(MemoryDecl),
    Import(u32),
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum GlobalSource {
    Local { init: Value },
    Import(u32),
}

/// A global variable in the shared global index space.
#[derive(Clone, Debug)]
pub struct GlobalDecl {
    /// Value kind of the global.
    pub kind: ValueKind,
    /// Whether the module may write it.
    pub mutable: bool,
    pub(crate) source: GlobalSource,
    /// Byte offset into the instance's flat global region.
    pub(crate) offset: u32,
}

/// A function defined in this module.
#[derive(Clone, Debug)]
pub struct Function {
    pub(crate) type_idx: u32,
    /// Parameter slots followed by local slots, one accumulation.
    pub(crate) frame: Layout,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) ops: Vec<Op>,
}

impl Function {
    /// Returns the total frame size (parameters plus locals) in bytes.
    #[must_use]
    pub fn frame_size(&self) -> u32 {
        self.frame.byte_size()
    }
}

/// A build- or lifecycle-stage module error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleError {
    /// A type index did not name a declared signature.
    BadTypeIndex {
        /// The offending index.
        index: u32,
    },
    /// A function index was outside the function index space.
    BadFunctionIndex {
        /// The offending index.
        index: u32,
    },
    /// A global initializer's kind did not match the declaration.
    GlobalInitKind,
    /// The module already has a memory.
    DuplicateMemory,
    /// The start function must take no parameters and return nothing.
    StartSignature,
    /// A declared size exceeded the addressable range.
    SizeOverflow,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTypeIndex { index } => write!(f, "bad type index {index}"),
            Self::BadFunctionIndex { index } => write!(f, "bad function index {index}"),
            Self::GlobalInitKind => write!(f, "global initializer kind mismatch"),
            Self::DuplicateMemory => write!(f, "module already has a memory"),
            Self::StartSignature => write!(f, "start function signature is not empty"),
            Self::SizeOverflow => write!(f, "declared size overflows"),
        }
    }
}

impl core::error::Error for ModuleError {}

/// An error raised while binding imports into a new [`Instance`].
#[derive(Clone, Debug, PartialEq)]
pub enum InstantiateError {
    /// The module has not been expanded yet.
    NotExpanded,
    /// No binding was supplied for an import.
    UnboundImport {
        /// Providing module name.
        module: String,
        /// Field name.
        field: String,
    },
    /// The binding supplied for an import has the wrong kind.
    ImportKindMismatch {
        /// Providing module name.
        module: String,
        /// Field name.
        field: String,
    },
    /// An imported memory is smaller than the declared initial size.
    MemoryTooSmall {
        /// Declared initial size in pages.
        declared: u32,
        /// Bound memory size in pages.
        bound: u32,
    },
    /// The start function trapped.
    StartTrapped(crate::vm::Trap),
}

impl fmt::Display for InstantiateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExpanded => write!(f, "module is not expanded"),
            Self::UnboundImport { module, field } => {
                write!(f, "unbound import {module}/{field}")
            }
            Self::ImportKindMismatch { module, field } => {
                write!(f, "import kind mismatch for {module}/{field}")
            }
            Self::MemoryTooSmall { declared, bound } => {
                write!(f, "imported memory has {bound} pages, needs {declared}")
            }
            Self::StartTrapped(trap) => write!(f, "start function trapped: {trap}"),
        }
    }
}

impl core::error::Error for InstantiateError {}

/// A module: declarations plus (after expansion) executable instruction
/// streams.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub(crate) types: Vec<Signature>,
    pub(crate) imports: Vec<ImportDecl>,
    pub(crate) functions: Vec<Function>,
    pub(crate) function_index: Vec<IndexEntry>,
    pub(crate) globals: Vec<GlobalDecl>,
    globals_size: u32,
    pub(crate) memory: Option<MemorySource>,
    start: Option<u32>,
    expanded: bool,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a signature and returns its type index.
    pub fn add_type(&mut self, sig: Signature) -> u32 {
        self.types.push(sig);
        (self.types.len() - 1) as u32
    }

    /// Defines a function from raw wire body bytes and returns its index in
    /// the function index space.
    ///
    /// `locals` lists the function's declared locals; the frame layout is
    /// the parameter slots followed by the local slots in one accumulation.
    pub fn add_function(
        &mut self,
        type_idx: u32,
        locals: &[ValueKind],
        body: Vec<u8>,
    ) -> Result<u32, ModuleError> {
        let sig = self
            .types
            .get(type_idx as usize)
            .ok_or(ModuleError::BadTypeIndex { index: type_idx })?;
        let mut kinds: Vec<ValueKind> = sig.params.kinds().collect();
        kinds.extend_from_slice(locals);
        let frame = Layout::compute(&kinds);
        self.functions.push(Function {
            type_idx,
            frame,
            body: Some(body),
            ops: Vec::new(),
        });
        self.function_index
            .push(IndexEntry::Local((self.functions.len() - 1) as u32));
        Ok((self.function_index.len() - 1) as u32)
    }

    /// Declares a function import and returns its index in the function
    /// index space.
    pub fn import_function(
        &mut self,
        module: &str,
        field: &str,
        type_idx: u32,
    ) -> Result<u32, ModuleError> {
        if type_idx as usize >= self.types.len() {
            return Err(ModuleError::BadTypeIndex { index: type_idx });
        }
        self.imports.push(ImportDecl {
            module: module.into(),
            field: field.into(),
            kind: ImportKind::Function { type_idx },
        });
        self.function_index
            .push(IndexEntry::Import((self.imports.len() - 1) as u32));
        Ok((self.function_index.len() - 1) as u32)
    }

    /// Defines a global and returns its index in the global index space.
    pub fn add_global(
        &mut self,
        kind: ValueKind,
        mutable: bool,
        init: Value,
    ) -> Result<u32, ModuleError> {
        if init.kind() != kind {
            return Err(ModuleError::GlobalInitKind);
        }
        self.push_global(kind, mutable, GlobalSource::Local { init })
    }

    /// Declares a global import and returns its index in the global index
    /// space.
    pub fn import_global(
        &mut self,
        module: &str,
        field: &str,
        kind: ValueKind,
        mutable: bool,
    ) -> Result<u32, ModuleError> {
        self.imports.push(ImportDecl {
            module: module.into(),
            field: field.into(),
            kind: ImportKind::Global { kind, mutable },
        });
        self.push_global(kind, mutable, GlobalSource::Import((self.imports.len() - 1) as u32))
    }

    fn push_global(
        &mut self,
        kind: ValueKind,
        mutable: bool,
        source: GlobalSource,
    ) -> Result<u32, ModuleError> {
        let offset = self.globals_size;
        self.globals_size = self
            .globals_size
            .checked_add(kind.byte_size())
            .ok_or(ModuleError::SizeOverflow)?;
        self.globals.push(GlobalDecl {
            kind,
            mutable,
            source,
            offset,
        });
        Ok((self.globals.len() - 1) as u32)
    }

    /// Declares the module's (single) memory.
    pub fn set_memory(&mut self, decl: MemoryDecl) -> Result<(), ModuleError> {
        if self.memory.is_some() {
            return Err(ModuleError::DuplicateMemory);
        }
        self.memory = Some(MemorySource::Local(decl));
        Ok(())
    }

    /// Declares the module's memory as imported.
    pub fn import_memory(
        &mut self,
        module: &str,
        field: &str,
        initial_pages: u32,
    ) -> Result<(), ModuleError> {
        if self.memory.is_some() {
            return Err(ModuleError::DuplicateMemory);
        }
        self.imports.push(ImportDecl {
            module: module.into(),
            field: field.into(),
            kind: ImportKind::Memory { initial_pages },
        });
        self.memory = Some(MemorySource::Import((self.imports.len() - 1) as u32));
        Ok(())
    }

    /// Marks `func` (a function index) as the start function, invoked by
    /// [`crate::vm::Vm::instantiate`]. It must take and return nothing.
    pub fn set_start(&mut self, func: u32) -> Result<(), ModuleError> {
        let sig = self
            .signature(func)
            .ok_or(ModuleError::BadFunctionIndex { index: func })?;
        if !sig.params.is_empty() || !sig.results.is_empty() {
            return Err(ModuleError::StartSignature);
        }
        self.start = Some(func);
        Ok(())
    }

    /// Returns the start function index, if one is set.
    #[must_use]
    pub fn start(&self) -> Option<u32> {
        self.start
    }

    /// Returns the signature of `func` in the function index space,
    /// resolving through imports.
    #[must_use]
    pub fn signature(&self, func: u32) -> Option<&Signature> {
        let type_idx = match *self.function_index.get(func as usize)? {
            IndexEntry::Local(i) => self.functions.get(i as usize)?.type_idx,
            IndexEntry::Import(i) => match self.imports.get(i as usize)?.kind {
                ImportKind::Function { type_idx } => type_idx,
                _ => return None,
            },
        };
        self.types.get(type_idx as usize)
    }

    /// Returns `true` once every function body has been expanded.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Returns `true` when the module declares a memory (local or imported).
    #[must_use]
    pub(crate) fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    /// Validates and expands every function body, consuming the raw bytes.
    ///
    /// Expansion happens exactly once; calling this again returns
    /// [`ValidationError::AlreadyExpanded`]. On any validation failure no
    /// partial instruction stream is kept.
    pub fn expand(&mut self) -> Result<(), ValidationError> {
        if self.expanded {
            return Err(ValidationError::AlreadyExpanded);
        }
        for i in 0..self.functions.len() {
            let raw = match self.functions[i].body.take() {
                Some(raw) => raw,
                None => return Err(ValidationError::AlreadyExpanded),
            };
            let ops = expand::expand_function(self, i, &raw)?;
            log::trace!("expanded function {i}: {} ops", ops.len());
            self.functions[i].ops = ops;
        }
        self.expanded = true;
        Ok(())
    }

    /// Binds `imports` and builds a fresh [`Instance`].
    ///
    /// This does not run the start function; use
    /// [`crate::vm::Vm::instantiate`] for the full sequence.
    pub fn instantiate(&self, imports: &Imports) -> Result<Instance, InstantiateError> {
        if !self.expanded {
            return Err(InstantiateError::NotExpanded);
        }

        let mut globals = vec![0u8; self.globals_size as usize];
        for g in &self.globals {
            let value = match g.source {
                GlobalSource::Local { init } => init,
                GlobalSource::Import(i) => {
                    let decl = &self.imports[i as usize];
                    match imports.get(&decl.module, &decl.field) {
                        Some(Extern::Global(v)) if v.kind() == g.kind => *v,
                        Some(_) => {
                            return Err(InstantiateError::ImportKindMismatch {
                                module: decl.module.clone(),
                                field: decl.field.clone(),
                            })
                        }
                        None => {
                            return Err(InstantiateError::UnboundImport {
                                module: decl.module.clone(),
                                field: decl.field.clone(),
                            })
                        }
                    }
                }
            };
            let off = g.offset as usize;
            match value {
                Value::I32(v) => globals[off..off + 4].copy_from_slice(&v.to_le_bytes()),
                Value::F32(v) => {
                    globals[off..off + 4].copy_from_slice(&v.to_bits().to_le_bytes());
                }
                Value::I64(v) => globals[off..off + 8].copy_from_slice(&v.to_le_bytes()),
                Value::F64(v) => {
                    globals[off..off + 8].copy_from_slice(&v.to_bits().to_le_bytes());
                }
            }
        }

        let memory = match &self.memory {
            None => None,
            Some(MemorySource::Local(decl)) => {
                Some(LinearMemory::new(decl.initial_pages, decl.max_pages))
            }
            Some(MemorySource::Import(i)) => {
                let decl = &self.imports[*i as usize];
                let declared = match decl.kind {
                    ImportKind::Memory { initial_pages } => initial_pages,
                    _ => 0,
                };
                match imports.get(&decl.module, &decl.field) {
                    Some(Extern::Memory(m)) => {
                        if m.size_pages() < declared {
                            return Err(InstantiateError::MemoryTooSmall {
                                declared,
                                bound: m.size_pages(),
                            });
                        }
                        Some(m.clone())
                    }
                    Some(_) => {
                        return Err(InstantiateError::ImportKindMismatch {
                            module: decl.module.clone(),
                            field: decl.field.clone(),
                        })
                    }
                    None => {
                        return Err(InstantiateError::UnboundImport {
                            module: decl.module.clone(),
                            field: decl.field.clone(),
                        })
                    }
                }
            }
        };

        Ok(Instance { memory, globals })
    }
}

/// Mutable per-instantiation state: linear memory and the global region.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub(crate) memory: Option<LinearMemory>,
    pub(crate) globals: Vec<u8>,
}

impl Instance {
    /// Returns the instance's linear memory, if the module declares one.
    #[must_use]
    pub fn memory(&self) -> Option<&LinearMemory> {
        self.memory.as_ref()
    }

    /// Returns the instance's linear memory mutably.
    pub fn memory_mut(&mut self) -> Option<&mut LinearMemory> {
        self.memory.as_mut()
    }

    /// Reads the current value of global `index` in `module`'s global index
    /// space.
    #[must_use]
    pub fn read_global(&self, module: &Module, index: u32) -> Option<Value> {
        let g = module.globals.get(index as usize)?;
        let off = g.offset as usize;
        Some(match g.kind {
            ValueKind::I32 => Value::I32(i32::from_le_bytes(
                self.globals.get(off..off + 4)?.try_into().ok()?,
            )),
            ValueKind::F32 => Value::F32(f32::from_bits(u32::from_le_bytes(
                self.globals.get(off..off + 4)?.try_into().ok()?,
            ))),
            ValueKind::I64 => Value::I64(i64::from_le_bytes(
                self.globals.get(off..off + 8)?.try_into().ok()?,
            )),
            ValueKind::F64 => Value::F64(f64::from_bits(u64::from_le_bytes(
                self.globals.get(off..off + 8)?.try_into().ok()?,
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn empty_body() -> Vec<u8> {
        vec![Opcode::End as u8]
    }

    #[test]
    fn index_spaces_are_shared_with_imports() {
        let mut m = Module::new();
        let t = m.add_type(Signature::new(&[], &[]));
        let imported = m.import_function("env", "first", t).unwrap();
        let local = m.add_function(t, &[], empty_body()).unwrap();
        assert_eq!(imported, 0);
        assert_eq!(local, 1);
        assert_eq!(m.function_index[0], IndexEntry::Import(0));
        assert_eq!(m.function_index[1], IndexEntry::Local(0));
    }

    #[test]
    fn global_offsets_accumulate() {
        let mut m = Module::new();
        let a = m.add_global(ValueKind::I32, true, Value::I32(0)).unwrap();
        let b = m.add_global(ValueKind::F64, true, Value::F64(0.0)).unwrap();
        assert_eq!(m.globals[a as usize].offset, 0);
        assert_eq!(m.globals[b as usize].offset, 4);
    }

    #[test]
    fn global_init_kind_must_match() {
        let mut m = Module::new();
        assert_eq!(
            m.add_global(ValueKind::I32, true, Value::F32(0.0)),
            Err(ModuleError::GlobalInitKind)
        );
    }

    #[test]
    fn only_one_memory() {
        let mut m = Module::new();
        m.set_memory(MemoryDecl {
            initial_pages: 1,
            max_pages: 1,
        })
        .unwrap();
        assert_eq!(
            m.import_memory("env", "mem", 1),
            Err(ModuleError::DuplicateMemory)
        );
    }

    #[test]
    fn start_requires_empty_signature() {
        let mut m = Module::new();
        let t0 = m.add_type(Signature::new(&[], &[]));
        let t1 = m.add_type(Signature::new(&[ValueKind::I32], &[]));
        let ok = m.add_function(t0, &[], empty_body()).unwrap();
        let bad = m
            .add_function(t1, &[], vec![Opcode::Drop as u8, Opcode::End as u8])
            .unwrap();
        assert_eq!(m.set_start(bad), Err(ModuleError::StartSignature));
        m.set_start(ok).unwrap();
        assert_eq!(m.start(), Some(ok));
    }

    #[test]
    fn expand_is_once_only() {
        let mut m = Module::new();
        let t = m.add_type(Signature::new(&[], &[]));
        m.add_function(t, &[], empty_body()).unwrap();
        m.expand().unwrap();
        assert!(m.is_expanded());
        assert_eq!(m.expand(), Err(ValidationError::AlreadyExpanded));
    }

    #[test]
    fn instantiate_requires_expansion() {
        let m = Module::new();
        assert_eq!(
            m.instantiate(&Imports::new()),
            Err(InstantiateError::NotExpanded)
        );
    }

    #[test]
    fn unbound_global_import_is_reported() {
        let mut m = Module::new();
        m.import_global("env", "g", ValueKind::I32, false).unwrap();
        m.expand().unwrap();
        assert_eq!(
            m.instantiate(&Imports::new()),
            Err(InstantiateError::UnboundImport {
                module: "env".into(),
                field: "g".into(),
            })
        );
    }
}
