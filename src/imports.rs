// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Import declarations and the binding registry.
//!
//! A module declares imports by two-level name; imported entries share the
//! index spaces with locally defined ones, in declaration order. Globals
//! and memories are bound to concrete values when a module is instantiated.
//! Imported functions stay name-addressed and dispatch through
//! [`crate::host::Host`] at run time.

use alloc::string::String;

use hashbrown::HashMap;

use crate::memory::LinearMemory;
use crate::sig::ValueKind;
use crate::value::Value;

/// What an import declaration names.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportKind {
    /// A function with a signature from the module's type list.
    Function {
        /// Type index of the function signature.
        type_idx: u32,
    },
    /// A global variable.
    Global {
        /// Value kind of the global.
        kind: ValueKind,
        /// Whether the module may write it.
        mutable: bool,
    },
    /// A linear memory.
    Memory {
        /// Required initial size in pages.
        initial_pages: u32,
    },
}

/// A declared import: a two-level name plus the expected kind.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportDecl {
    /// Providing module name.
    pub module: String,
    /// Field name within the providing module.
    pub field: String,
    /// Expected kind of the imported entity.
    pub kind: ImportKind,
}

/// A concrete value supplied for an import at instantiation.
#[derive(Clone, Debug)]
pub enum Extern {
    /// Initial value for an imported global.
    Global(Value),
    /// Backing store for an imported memory.
    Memory(LinearMemory),
}

/// A registry of bindings for global and memory imports, keyed by
/// two-level name.
#[derive(Clone, Debug, Default)]
pub struct Imports {
    map: HashMap<(String, String), Extern>,
}

impl Imports {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `module`/`field` to a global's initial value.
    pub fn bind_global(&mut self, module: &str, field: &str, value: Value) {
        self.map
            .insert((module.into(), field.into()), Extern::Global(value));
    }

    /// Binds `module`/`field` to a linear memory.
    pub fn bind_memory(&mut self, module: &str, field: &str, memory: LinearMemory) {
        self.map
            .insert((module.into(), field.into()), Extern::Memory(memory));
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, module: &str, field: &str) -> Option<&Extern> {
        self.map.get(&(module.into(), field.into()))
    }
}
