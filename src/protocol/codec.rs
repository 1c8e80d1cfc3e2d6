//! Primitive value encoding for message headers.
//!
//! [`WireWriter`] appends values to a growable header buffer and
//! [`WireReader`] consumes them from a received header. Conventions:
//!
//! - integers are 4-byte two's complement, Big Endian
//! - booleans are integers, 0 = false, anything else = true
//! - times are two integers: tens of seconds, then the remainder in
//!   units of ten microseconds
//! - byte strings and text are an integer length followed by the raw bytes;
//!   length 0 is the "absent" sentinel
//! - arrays are an integer count followed by the elements

use bytes::{BufMut, BytesMut};

use super::wire_format::limits;
use crate::error::{EnsembleError, Result};
use crate::view::ViewId;

/// Initial capacity of a header buffer.
pub const INITIAL_HEADER_CAPACITY: usize = 1024;

const USEC_PER_SEC: f64 = 1_000_000.0;

/// Split a time in seconds into its two wire integers.
#[inline]
pub fn time_to_wire(seconds: f64) -> (i32, i32) {
    let tens = seconds / 10.0;
    let sec10 = tens.trunc();
    let usec10 = (tens - sec10) * USEC_PER_SEC;
    (sec10 as i32, usec10 as i32)
}

/// Rebuild a time in seconds from its two wire integers.
#[inline]
pub fn time_from_wire(sec10: i32, usec10: i32) -> f64 {
    sec10 as f64 * 10.0 + usec10 as f64 * 10.0 / USEC_PER_SEC
}

/// Appends header values to a growable buffer.
#[derive(Debug)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Create a writer with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_HEADER_CAPACITY)
    }

    /// Create a writer with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current buffer capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Discard written bytes, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Replace the buffer with a fresh one of `capacity` bytes.
    pub fn shrink_to(&mut self, capacity: usize) {
        self.buf = BytesMut::with_capacity(capacity);
    }

    /// Grow by doubling until `additional` more bytes fit.
    fn ensure(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed <= self.buf.capacity() {
            return;
        }
        let mut target = self.buf.capacity().max(INITIAL_HEADER_CAPACITY);
        while target < needed {
            target *= 2;
        }
        self.buf.reserve(target - self.buf.len());
    }

    pub fn write_int32(&mut self, value: i32) {
        self.ensure(4);
        self.buf.put_i32(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_int32(value as i32);
    }

    pub fn write_time(&mut self, seconds: f64) {
        let (sec10, usec10) = time_to_wire(seconds);
        self.write_int32(sec10);
        self.write_int32(usec10);
    }

    /// Write a length-prefixed byte string, rejecting anything over `max`.
    pub fn write_bytes(&mut self, field: &str, data: &[u8], max: usize) -> Result<()> {
        if data.len() > max {
            return Err(EnsembleError::InvalidArgument(format!(
                "{} is {} bytes, maximum is {}",
                field,
                data.len(),
                max
            )));
        }
        self.ensure(4 + data.len());
        self.buf.put_i32(data.len() as i32);
        self.buf.put_slice(data);
        Ok(())
    }

    /// Write single-byte text. The empty string encodes as absent.
    pub fn write_string(&mut self, field: &str, text: &str, max: usize) -> Result<()> {
        if !text.is_ascii() {
            return Err(EnsembleError::InvalidArgument(format!(
                "{} must be ASCII",
                field
            )));
        }
        self.write_bytes(field, text.as_bytes(), max)
    }

    pub fn write_opt_string(&mut self, field: &str, text: Option<&str>, max: usize) -> Result<()> {
        self.write_string(field, text.unwrap_or(""), max)
    }

    pub fn write_int32_array(&mut self, values: &[i32]) {
        self.ensure(4 * (values.len() + 1));
        self.buf.put_i32(values.len() as i32);
        for &v in values {
            self.buf.put_i32(v);
        }
    }

    pub fn write_string_array<S: AsRef<str>>(
        &mut self,
        field: &str,
        items: &[S],
        max: usize,
    ) -> Result<()> {
        self.write_int32(items.len() as i32);
        for item in items {
            self.write_string(field, item.as_ref(), max)?;
        }
        Ok(())
    }

    /// Write a security key, or the absent sentinel.
    pub fn write_key(&mut self, key: Option<&[u8; limits::KEY]>) -> Result<()> {
        match key {
            Some(k) => self.write_bytes("key", k, limits::KEY),
            None => {
                self.write_int32(0);
                Ok(())
            }
        }
    }

    pub fn write_view_id(&mut self, id: &ViewId) -> Result<()> {
        self.write_int32(id.ltime);
        self.write_string("view id endpoint", &id.coordinator, limits::ENDPOINT)
    }

    pub fn write_view_id_array(&mut self, ids: &[ViewId]) -> Result<()> {
        self.write_int32(ids.len() as i32);
        for id in ids {
            self.write_view_id(id)?;
        }
        Ok(())
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumes header values from a received buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(EnsembleError::Protocol(format!(
                "Header truncated: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_int32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_int32()? != 0)
    }

    pub fn read_time(&mut self) -> Result<f64> {
        let sec10 = self.read_int32()?;
        let usec10 = self.read_int32()?;
        Ok(time_from_wire(sec10, usec10))
    }

    /// Read a non-negative rank.
    pub fn read_rank(&mut self, field: &str) -> Result<usize> {
        let rank = self.read_int32()?;
        if rank < 0 {
            return Err(EnsembleError::Protocol(format!(
                "{} is negative: {}",
                field, rank
            )));
        }
        Ok(rank as usize)
    }

    fn read_len(&mut self, field: &str, max: usize) -> Result<usize> {
        let len = self.read_int32()?;
        if len < 0 {
            return Err(EnsembleError::Protocol(format!(
                "{} has negative length {}",
                field, len
            )));
        }
        let len = len as usize;
        if len > max {
            return Err(EnsembleError::Protocol(format!(
                "{} is {} bytes, maximum is {}",
                field, len, max
            )));
        }
        Ok(len)
    }

    pub fn read_bytes(&mut self, field: &str, max: usize) -> Result<&'a [u8]> {
        let len = self.read_len(field, max)?;
        self.take(len)
    }

    /// Read single-byte text; invalid bytes are replaced, never rejected.
    pub fn read_string(&mut self, field: &str, max: usize) -> Result<String> {
        let raw = self.read_bytes(field, max)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Read an array count, bounded by what the header can still hold.
    fn read_count(&mut self, field: &str) -> Result<usize> {
        let count = self.read_int32()?;
        if count < 0 || count as usize > self.remaining() / 4 {
            return Err(EnsembleError::Protocol(format!(
                "{} has invalid element count {}",
                field, count
            )));
        }
        Ok(count as usize)
    }

    pub fn read_string_array(&mut self, field: &str, max: usize) -> Result<Vec<String>> {
        let count = self.read_count(field)?;
        (0..count).map(|_| self.read_string(field, max)).collect()
    }

    pub fn read_int32_array(&mut self, field: &str) -> Result<Vec<i32>> {
        let count = self.read_count(field)?;
        (0..count).map(|_| self.read_int32()).collect()
    }

    /// Read a security key: absent, or exactly [`limits::KEY`] bytes.
    pub fn read_key(&mut self) -> Result<Option<[u8; limits::KEY]>> {
        let raw = self.read_bytes("key", limits::KEY)?;
        match raw.len() {
            0 => Ok(None),
            limits::KEY => {
                let mut key = [0u8; limits::KEY];
                key.copy_from_slice(raw);
                Ok(Some(key))
            }
            n => Err(EnsembleError::Protocol(format!(
                "key must be 0 or {} bytes, got {}",
                limits::KEY,
                n
            ))),
        }
    }

    pub fn read_view_id(&mut self) -> Result<ViewId> {
        let ltime = self.read_int32()?;
        let coordinator = self.read_string("view id endpoint", limits::ENDPOINT)?;
        Ok(ViewId { ltime, coordinator })
    }

    pub fn read_view_id_array(&mut self) -> Result<Vec<ViewId>> {
        let count = self.read_count("view id array")?;
        (0..count).map(|_| self.read_view_id()).collect()
    }

    /// Check that the whole header was consumed.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(EnsembleError::Protocol(format!(
                "Header has {} unread bytes",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}
