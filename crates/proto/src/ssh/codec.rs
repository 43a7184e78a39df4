//! SSH2 binary data reader and writer (RFC 4251 Section 5).
//!
//! # Encodings
//!
//! ```text
//! uint32 / uint64   big-endian
//! boolean           one byte, non-zero is true
//! string            uint32 length || bytes
//! mpint             uint32 byte length || two's complement big-endian bytes
//! bits-integer      uint32 bit count || ceil(bits / 8) big-endian bytes
//! ```
//!
//! The bit-count prefixed integer only appears inside ssh.com key files; the
//! wire protocol always uses `mpint`.
//!
//! # Example
//!
//! ```rust
//! use burrow_proto::ssh::codec::{DataReader, DataWriter};
//! use num_bigint::BigUint;
//!
//! let mut writer = DataWriter::new();
//! writer.write_string("ssh-rsa");
//! writer.write_bigint(&BigUint::from(0x80u32));
//!
//! let bytes = writer.into_bytes();
//! let mut reader = DataReader::new(&bytes);
//! assert_eq!(reader.read_string().unwrap(), b"ssh-rsa");
//! assert_eq!(reader.read_mpint().unwrap(), BigUint::from(0x80u32));
//! ```

use burrow_platform::{BurrowError, BurrowResult};
use bytes::{BufMut, BytesMut};
use num_bigint::BigUint;
use num_traits::Zero;
use zeroize::Zeroize;

/// Sequential reader over a bounded byte slice.
///
/// Every read checks against the limit and fails with
/// [`BurrowError::UnexpectedEof`] instead of truncating.
#[derive(Debug, Clone)]
pub struct DataReader<'a> {
    data: &'a [u8],
    offset: usize,
    limit: usize,
}

impl<'a> DataReader<'a> {
    /// Creates a reader over the whole slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            limit: data.len(),
        }
    }

    /// Creates a reader over `data[offset..offset + len]`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::UnexpectedEof`] if the range is outside `data`.
    pub fn with_range(data: &'a [u8], offset: usize, len: usize) -> BurrowResult<Self> {
        match offset.checked_add(len) {
            Some(limit) if limit <= data.len() => Ok(Self {
                data,
                offset,
                limit,
            }),
            _ => Err(BurrowError::UnexpectedEof {
                offset,
                wanted: len,
                available: data.len().saturating_sub(offset),
            }),
        }
    }

    /// Current read position within the underlying slice.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes left before the limit.
    pub fn rest(&self) -> usize {
        self.limit - self.offset
    }

    /// Unread bytes, without consuming them.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..self.limit]
    }

    fn take(&mut self, len: usize) -> BurrowResult<&'a [u8]> {
        if len > self.rest() {
            return Err(BurrowError::UnexpectedEof {
                offset: self.offset,
                wanted: len,
                available: self.rest(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Reads a big-endian `uint32`.
    pub fn read_u32(&mut self) -> BurrowResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian `uint32` reinterpreted as signed.
    pub fn read_i32(&mut self) -> BurrowResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a big-endian `uint64`.
    pub fn read_u64(&mut self) -> BurrowResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Reads a big-endian `uint64` reinterpreted as signed.
    pub fn read_i64(&mut self) -> BurrowResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> BurrowResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean (any non-zero byte is true).
    pub fn read_bool(&mut self) -> BurrowResult<bool> {
        Ok(self.read_byte()? != 0)
    }

    /// Reads exactly `len` raw bytes.
    pub fn read(&mut self, len: usize) -> BurrowResult<&'a [u8]> {
        self.take(len)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_string(&mut self) -> BurrowResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    /// Reads a length-prefixed string and decodes it as UTF-8.
    pub fn read_utf8(&mut self) -> BurrowResult<String> {
        let bytes = self.read_string()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BurrowError::Protocol("String contains invalid UTF-8".to_string()))
    }

    /// Consumes every remaining byte.
    pub fn read_all(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.offset..self.limit];
        self.offset = self.limit;
        bytes
    }

    /// Reads an SSH `mpint`.
    ///
    /// # Errors
    ///
    /// Negative values are rejected with [`BurrowError::Protocol`]; key
    /// material is never negative.
    pub fn read_mpint(&mut self) -> BurrowResult<BigUint> {
        let bytes = self.read_string()?;
        if bytes.first().is_some_and(|b| b & 0x80 != 0) {
            return Err(BurrowError::Protocol(
                "Negative mpint where a non-negative integer was expected".to_string(),
            ));
        }
        Ok(BigUint::from_bytes_be(bytes))
    }

    /// Reads a bit-count prefixed integer (ssh.com key files only).
    pub fn read_bigint_with_bits(&mut self) -> BurrowResult<BigUint> {
        let bits = self.read_u32()? as usize;
        let bytes = self.take(bits.div_ceil(8))?;
        Ok(BigUint::from_bytes_be(bytes))
    }
}

/// Growable SSH2 writer.
///
/// The buffer is wiped when the writer is dropped, so it can hold private
/// key material while a key file is being assembled.
#[derive(Debug, Default)]
pub struct DataWriter {
    buf: BytesMut,
}

impl DataWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Appends raw bytes.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Appends a single byte.
    pub fn write_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Appends a boolean as `0` or `1`.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Appends a big-endian `uint32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Appends a signed 32-bit value in `uint32` form.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Appends a big-endian `uint64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Appends a signed 64-bit value in `uint64` form.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_as_string(value.as_bytes());
    }

    /// Appends a length-prefixed byte string.
    pub fn write_as_string(&mut self, data: &[u8]) {
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
    }

    /// Appends an SSH `mpint`.
    ///
    /// A leading zero byte is inserted when the most significant byte has its
    /// high bit set, so the value is never read back as negative. Zero is
    /// encoded as an empty string.
    pub fn write_bigint(&mut self, value: &BigUint) {
        if value.is_zero() {
            self.buf.put_u32(0);
            return;
        }
        let mut bytes = value.to_bytes_be();
        if bytes[0] & 0x80 != 0 {
            self.buf.put_u32(bytes.len() as u32 + 1);
            self.buf.put_u8(0);
        } else {
            self.buf.put_u32(bytes.len() as u32);
        }
        self.buf.put_slice(&bytes);
        bytes.zeroize();
    }

    /// Appends a bit-count prefixed integer (ssh.com key files only).
    pub fn write_bigint_with_bits(&mut self, value: &BigUint) {
        self.buf.put_u32(value.bits() as u32);
        if !value.is_zero() {
            let mut bytes = value.to_bytes_be();
            self.buf.put_slice(&bytes);
            bytes.zeroize();
        }
    }

    /// Overwrites four already-written bytes at `pos` with `value`.
    ///
    /// Used to back-fill length fields once the payload size is known.
    ///
    /// # Panics
    ///
    /// Panics if `pos + 4` exceeds the written length.
    pub fn set_u32_at(&mut self, pos: usize, value: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Returns a copy of the written bytes and wipes the writer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

impl Drop for DataWriter {
    fn drop(&mut self) {
        self.buf.as_mut().zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers() {
        let data = [
            0x00, 0x00, 0x01, 0x02, // u32
            0xff, 0xff, 0xff, 0xfe, // i32 = -2
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, // u64
            0x07, // byte
            0x02, // bool
        ];
        let mut reader = DataReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x0102);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert_eq!(reader.read_u64().unwrap(), (1u64 << 32) | 2);
        assert_eq!(reader.read_byte().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.rest(), 0);
    }

    #[test]
    fn test_read_past_limit_fails() {
        let data = [0x00, 0x00, 0x00];
        let mut reader = DataReader::new(&data);

        let err = reader.read_u32().unwrap_err();
        assert!(matches!(
            err,
            BurrowError::UnexpectedEof {
                offset: 0,
                wanted: 4,
                available: 3
            }
        ));
        // Failed reads do not consume anything
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_string_length_beyond_limit() {
        let data = [0x00, 0x00, 0x00, 0x10, b'a', b'b'];
        let mut reader = DataReader::new(&data);
        assert!(matches!(
            reader.read_string(),
            Err(BurrowError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_with_range_respects_limit() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut reader = DataReader::with_range(&data, 1, 3).unwrap();
        assert_eq!(reader.read(3).unwrap(), &[2, 3, 4]);
        assert!(reader.read_byte().is_err());

        assert!(DataReader::with_range(&data, 4, 3).is_err());
    }

    #[test]
    fn test_mpint_high_bit_gets_zero_prefix() {
        let mut writer = DataWriter::new();
        writer.write_bigint(&BigUint::from(0x80u32));
        assert_eq!(writer.as_slice(), &[0, 0, 0, 2, 0x00, 0x80]);

        let mut writer = DataWriter::new();
        writer.write_bigint(&BigUint::from(0x7fu32));
        assert_eq!(writer.as_slice(), &[0, 0, 0, 1, 0x7f]);
    }

    #[test]
    fn test_mpint_zero_is_empty() {
        let mut writer = DataWriter::new();
        writer.write_bigint(&BigUint::zero());
        assert_eq!(writer.as_slice(), &[0, 0, 0, 0]);

        let bytes = writer.into_bytes();
        let mut reader = DataReader::new(&bytes);
        assert!(reader.read_mpint().unwrap().is_zero());
    }

    #[test]
    fn test_mpint_large_values_round_trip() {
        // 2^1023 has its top bit set in the leading byte
        let values = [
            BigUint::from(1u32) << 1023,
            (BigUint::from(1u32) << 2048) - 1u32,
            BigUint::parse_bytes(b"00ff00ff00ff00ff00ff", 16).unwrap(),
        ];

        for value in &values {
            let mut writer = DataWriter::new();
            writer.write_bigint(value);
            let bytes = writer.into_bytes();
            let mut reader = DataReader::new(&bytes);
            assert_eq!(&reader.read_mpint().unwrap(), value);
            assert_eq!(reader.rest(), 0);
        }
    }

    #[test]
    fn test_negative_mpint_rejected() {
        let data = [0, 0, 0, 1, 0x80];
        let mut reader = DataReader::new(&data);
        assert!(matches!(
            reader.read_mpint(),
            Err(BurrowError::Protocol(_))
        ));
    }

    #[test]
    fn test_bigint_with_bits() {
        // 0x01ff uses 9 bits, so two bytes follow the count
        let mut writer = DataWriter::new();
        writer.write_bigint_with_bits(&BigUint::from(0x01ffu32));
        assert_eq!(writer.as_slice(), &[0, 0, 0, 9, 0x01, 0xff]);

        let bytes = writer.into_bytes();
        let mut reader = DataReader::new(&bytes);
        assert_eq!(reader.read_bigint_with_bits().unwrap(), BigUint::from(0x01ffu32));
    }

    #[test]
    fn test_bigint_with_bits_truncated() {
        let data = [0, 0, 0, 64, 1, 2, 3];
        let mut reader = DataReader::new(&data);
        assert!(matches!(
            reader.read_bigint_with_bits(),
            Err(BurrowError::UnexpectedEof { wanted: 8, .. })
        ));
    }

    #[test]
    fn test_set_u32_at() {
        let mut writer = DataWriter::new();
        writer.write_u32(0);
        writer.write_string("abc");
        writer.set_u32_at(0, writer.len() as u32);
        assert_eq!(&writer.as_slice()[..4], &[0, 0, 0, 11]);
    }

    #[test]
    fn test_read_utf8_and_all() {
        let mut writer = DataWriter::new();
        writer.write_string("none");
        writer.write(&[9, 9]);
        let bytes = writer.into_bytes();

        let mut reader = DataReader::new(&bytes);
        assert_eq!(reader.read_utf8().unwrap(), "none");
        assert_eq!(reader.remaining(), &[9, 9]);
        assert_eq!(reader.read_all(), &[9, 9]);
        assert_eq!(reader.rest(), 0);
    }
}
