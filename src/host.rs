// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host ABI for imported functions.
//!
//! Imported functions are not resolved to anything at expansion time; each
//! call reaches the embedder through [`Host`] with the import's two-level
//! name and declared signature. The interpreter marshals arguments out of
//! the byte stack and writes the returned values back using the signature's
//! slot offsets.

use alloc::vec::Vec;
use core::fmt;

use crate::sig::Signature;
use crate::value::Value;

/// Errors a host call can return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostError {
    /// The import name is unknown to the host.
    UnknownImport,
    /// The host failed during execution.
    Failed,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownImport => write!(f, "unknown import"),
            Self::Failed => write!(f, "host call failed"),
        }
    }
}

impl core::error::Error for HostError {}

/// Host call interface.
///
/// The host must return exactly the values declared by `sig.results`, in
/// order; a mismatch traps the calling execution.
pub trait Host {
    /// Performs a host call for the import named `module`/`field`.
    fn call(
        &mut self,
        module: &str,
        field: &str,
        sig: &Signature,
        args: &[Value],
    ) -> Result<Vec<Value>, HostError>;
}

/// A host that rejects every call. Suitable for modules without function
/// imports.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHost;

impl Host for NoHost {
    fn call(
        &mut self,
        _module: &str,
        _field: &str,
        _sig: &Signature,
        _args: &[Value],
    ) -> Result<Vec<Value>, HostError> {
        Err(HostError::UnknownImport)
    }
}
