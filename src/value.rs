// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime values crossing the embedding boundary.

use crate::sig::ValueKind;

/// A WebAssembly numeric value.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit IEEE 754 float.
    F32(f32),
    /// 64-bit IEEE 754 float.
    F64(f64),
}

impl Value {
    /// Returns the value's kind tag.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
        }
    }

    /// Returns the value as `i32`, converting across kinds.
    ///
    /// Floats truncate toward zero and saturate at the type bounds.
    #[must_use]
    pub fn as_i32(&self) -> i32 {
        match *self {
            Self::I32(v) => v,
            Self::I64(v) => v as i32,
            Self::F32(v) => v as i32,
            Self::F64(v) => v as i32,
        }
    }

    /// Returns the value as `i64`, converting across kinds.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::I32(v) => i64::from(v),
            Self::I64(v) => v,
            Self::F32(v) => v as i64,
            Self::F64(v) => v as i64,
        }
    }

    /// Returns the value as `f32`, converting across kinds.
    #[must_use]
    pub fn as_f32(&self) -> f32 {
        match *self {
            Self::I32(v) => v as f32,
            Self::I64(v) => v as f32,
            Self::F32(v) => v,
            Self::F64(v) => v as f32,
        }
    }

    /// Returns the value as `f64`, converting across kinds.
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::I32(v) => f64::from(v),
            Self::I64(v) => v as f64,
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }

    /// Converts the value to `kind`, reusing the [`Value::as_i32`] family.
    #[must_use]
    pub fn convert_to(&self, kind: ValueKind) -> Value {
        match kind {
            ValueKind::I32 => Self::I32(self.as_i32()),
            ValueKind::I64 => Self::I64(self.as_i64()),
            ValueKind::F32 => Self::F32(self.as_f32()),
            ValueKind::F64 => Self::F64(self.as_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_cross_kinds() {
        assert_eq!(Value::F64(2.75).as_i32(), 2);
        assert_eq!(Value::I32(-3).as_f64(), -3.0);
        assert_eq!(Value::I64(1 << 40).as_i32(), 0);
        assert_eq!(Value::F32(1.5).convert_to(ValueKind::I64), Value::I64(1));
    }
}
