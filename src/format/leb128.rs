// Copyright 2026 the Wasm Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! LEB128 variable-length integer codec.
//!
//! Each byte carries seven payload bits, least significant group first; the
//! high bit marks continuation. Signed values sign-extend from the final
//! payload group. Encodings longer than the target width allows, or whose
//! spare bits disagree with the value's sign, are rejected.

use alloc::vec::Vec;

use super::DecodeError;

/// Reads an unsigned LEB128 `u32` from `bytes` at `*offset`, advancing the
/// offset past the consumed bytes.
pub fn read_uleb128_u32(bytes: &[u8], offset: &mut usize) -> Result<u32, DecodeError> {
    let mut result: u32 = 0;
    let mut shift: u32 = 0;
    loop {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        // The fifth byte may only contribute the low four bits.
        if shift == 28 && b & 0x70 != 0 {
            return Err(DecodeError::InvalidVarint);
        }
        result |= u32::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(DecodeError::InvalidVarint);
        }
    }
}

/// Reads an unsigned LEB128 `u64` from `bytes` at `*offset`.
pub fn read_uleb128_u64(bytes: &[u8], offset: &mut usize) -> Result<u64, DecodeError> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        // The tenth byte may only contribute its low bit.
        if shift == 63 && b & 0x7e != 0 {
            return Err(DecodeError::InvalidVarint);
        }
        result |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(DecodeError::InvalidVarint);
        }
    }
}

/// Reads a signed LEB128 `i32` from `bytes` at `*offset`.
pub fn read_sleb128_i32(bytes: &[u8], offset: &mut usize) -> Result<i32, DecodeError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        result |= i64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            if b & 0x40 != 0 {
                result |= -1_i64 << shift;
            }
            // Spare bits in the final group must match the sign.
            return i32::try_from(result).map_err(|_| DecodeError::InvalidVarint);
        }
        if shift >= 35 {
            return Err(DecodeError::InvalidVarint);
        }
    }
}

/// Reads a signed LEB128 `i64` from `bytes` at `*offset`.
pub fn read_sleb128_i64(bytes: &[u8], offset: &mut usize) -> Result<i64, DecodeError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    loop {
        let b = *bytes.get(*offset).ok_or(DecodeError::UnexpectedEof)?;
        *offset += 1;
        if shift == 63 {
            // Tenth byte: one payload bit, the rest must sign-fill.
            let expect = if b & 1 == 1 { 0x7f } else { 0x00 };
            if b != expect {
                return Err(DecodeError::InvalidVarint);
            }
            result |= i64::from(b & 1) << 63;
            return Ok(result);
        }
        result |= i64::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            if b & 0x40 != 0 {
                result |= -1_i64 << shift;
            }
            return Ok(result);
        }
    }
}

/// Appends the unsigned LEB128 encoding of `v` to `out`.
pub fn write_uleb128_u32(out: &mut Vec<u8>, v: u32) {
    write_uleb128_u64(out, u64::from(v));
}

/// Appends the unsigned LEB128 encoding of `v` to `out`.
pub fn write_uleb128_u64(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Appends the signed LEB128 encoding of `v` to `out`.
pub fn write_sleb128_i32(out: &mut Vec<u8>, v: i32) {
    write_sleb128_i64(out, i64::from(v));
}

/// Appends the signed LEB128 encoding of `v` to `out`.
pub fn write_sleb128_i64(out: &mut Vec<u8>, mut v: i64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (v == 0 && sign_clear) || (v == -1 && !sign_clear) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn round_trip_u32(v: u32) -> u32 {
        let mut buf = Vec::new();
        write_uleb128_u32(&mut buf, v);
        let mut off = 0;
        let got = read_uleb128_u32(&buf, &mut off).unwrap();
        assert_eq!(off, buf.len());
        got
    }

    fn round_trip_i32(v: i32) -> i32 {
        let mut buf = Vec::new();
        write_sleb128_i32(&mut buf, v);
        let mut off = 0;
        let got = read_sleb128_i32(&buf, &mut off).unwrap();
        assert_eq!(off, buf.len());
        got
    }

    fn round_trip_u64(v: u64) -> u64 {
        let mut buf = Vec::new();
        write_uleb128_u64(&mut buf, v);
        let mut off = 0;
        let got = read_uleb128_u64(&buf, &mut off).unwrap();
        assert_eq!(off, buf.len());
        got
    }

    fn round_trip_i64(v: i64) -> i64 {
        let mut buf = Vec::new();
        write_sleb128_i64(&mut buf, v);
        let mut off = 0;
        let got = read_sleb128_i64(&buf, &mut off).unwrap();
        assert_eq!(off, buf.len());
        got
    }

    #[test]
    fn unsigned_boundaries() {
        for v in [
            0,
            1,
            127,
            128,
            300,
            u32::from(u16::MAX),
            i32::MAX as u32,
            u32::MAX,
        ] {
            assert_eq!(round_trip_u32(v), v);
        }
        for v in [0, 127, 128, u64::from(u32::MAX), i64::MAX as u64, u64::MAX] {
            assert_eq!(round_trip_u64(v), v);
        }
    }

    #[test]
    fn signed_boundaries() {
        for v in [0, 1, -1, 63, 64, -64, -65, i32::MAX, i32::MIN] {
            assert_eq!(round_trip_i32(v), v);
        }
        for v in [0, -1, i64::from(i32::MIN), i64::MAX, i64::MIN] {
            assert_eq!(round_trip_i64(v), v);
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = Vec::new();
        write_uleb128_u32(&mut buf, 624485);
        assert_eq!(buf, [0xe5, 0x8e, 0x26]);

        buf.clear();
        write_sleb128_i32(&mut buf, -123456);
        assert_eq!(buf, [0xc0, 0xbb, 0x78]);
    }

    #[test]
    fn single_byte_values_use_one_byte() {
        let mut buf = Vec::new();
        write_uleb128_u32(&mut buf, 127);
        assert_eq!(buf.len(), 1);
        buf.clear();
        write_sleb128_i32(&mut buf, -64);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn non_shortest_encodings_accepted() {
        // 0x80 0x00 is a padded but valid encoding of zero.
        let mut off = 0;
        assert_eq!(read_uleb128_u32(&[0x80, 0x00], &mut off), Ok(0));
        // -1 padded out to the full five bytes.
        let mut off = 0;
        assert_eq!(
            read_sleb128_i32(&[0xff, 0xff, 0xff, 0xff, 0x7f], &mut off),
            Ok(-1)
        );
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut off = 0;
        assert_eq!(
            read_uleb128_u32(&[0x80, 0x80], &mut off),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn overlong_encodings_rejected() {
        // Six continuation groups exceed 32 bits of payload.
        let mut off = 0;
        assert_eq!(
            read_uleb128_u32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01], &mut off),
            Err(DecodeError::InvalidVarint)
        );
        // Fifth byte carrying bits past bit 31.
        let mut off = 0;
        assert_eq!(
            read_uleb128_u32(&[0x80, 0x80, 0x80, 0x80, 0x7f], &mut off),
            Err(DecodeError::InvalidVarint)
        );
        // Spare sign bits disagreeing with the value.
        let mut off = 0;
        assert_eq!(
            read_sleb128_i32(&[0xff, 0xff, 0xff, 0xff, 0x0f], &mut off),
            Err(DecodeError::InvalidVarint)
        );
    }

    #[test]
    fn max_u32_is_five_bytes() {
        let mut buf = Vec::new();
        write_uleb128_u32(&mut buf, u32::MAX);
        assert_eq!(buf, [0xff, 0xff, 0xff, 0xff, 0x0f]);
    }
}
