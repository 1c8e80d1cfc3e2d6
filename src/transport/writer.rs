//! Outbound framing.
//!
//! A [`FrameWriter`] accumulates one message at a time: the caller encodes
//! the header through [`FrameWriter::header_mut`], optionally attaches a
//! payload, then calls [`FrameWriter::write_end`] which emits
//!
//! ```text
//! [precursor][header][payload]
//! ```
//!
//! with scatter/gather I/O and flushes before returning. Callers serialize
//! access, so every message is contiguous on the wire.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{EnsembleError, Result};
use crate::protocol::{Precursor, WireWriter, INITIAL_HEADER_CAPACITY};

/// Header buffers that grew past this are released after the write.
pub const SHRINK_THRESHOLD: usize = 64 * 1024;

/// Capacity a header buffer is shrunk back to.
pub const SHRUNK_CAPACITY: usize = 4096;

/// Writes framed messages to the service.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    header: WireWriter,
    payload: Bytes,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            header: WireWriter::with_capacity(INITIAL_HEADER_CAPACITY),
            payload: Bytes::new(),
        }
    }

    /// Header of the message being built.
    #[inline]
    pub fn header_mut(&mut self) -> &mut WireWriter {
        &mut self.header
    }

    /// Attach bulk data to the message being built.
    pub fn attach_payload(&mut self, payload: Bytes) -> Result<()> {
        if payload.len() > i32::MAX as usize {
            return Err(EnsembleError::InvalidArgument(format!(
                "payload of {} bytes is too large",
                payload.len()
            )));
        }
        self.payload = payload;
        Ok(())
    }

    /// Drop the message being built.
    pub fn reset(&mut self) {
        self.header.clear();
        self.payload = Bytes::new();
        if self.header.capacity() > SHRINK_THRESHOLD {
            self.header.shrink_to(SHRUNK_CAPACITY);
        }
    }

    /// Emit the message being built and flush.
    pub async fn write_end(&mut self) -> Result<()> {
        let result = self.write_message().await;
        self.reset();
        result
    }

    async fn write_message(&mut self) -> Result<()> {
        let precursor =
            Precursor::new(self.header.len() as i32, self.payload.len() as i32).encode();
        let parts: [&[u8]; 3] = [&precursor, self.header.as_slice(), &self.payload];

        tracing::trace!(
            "Writing frame: header {} bytes, payload {} bytes",
            self.header.len(),
            self.payload.len()
        );

        write_all_vectored(&mut self.inner, &parts).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Write every part, continuing after partial vectored writes.
async fn write_all_vectored<W>(writer: &mut W, parts: &[&[u8]]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = parts.iter().map(|p| p.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(parts, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(EnsembleError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    Ok(())
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices<'a>(parts: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(parts.len());
    let mut skipped = 0;

    for part in parts {
        let start = skipped;
        let end = skipped + part.len();
        if !part.is_empty() && skip_bytes < end {
            slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(start)..]));
        }
        skipped = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_write_end_frames_message() {
        let (client, mut server) = duplex(4096);
        let mut writer = FrameWriter::new(client);

        writer.header_mut().write_int32(1);
        writer.header_mut().write_int32(1);
        writer.attach_payload(Bytes::from_static(b"Hello")).unwrap();
        writer.write_end().await.unwrap();

        let mut buf = vec![0u8; 21];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..8], &[0, 0, 0, 8, 0, 0, 0, 5]);
        assert_eq!(&buf[8..16], &[0, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(&buf[16..], b"Hello");
    }

    #[tokio::test]
    async fn test_write_end_resets_state() {
        let (client, mut server) = duplex(4096);
        let mut writer = FrameWriter::new(client);

        writer.header_mut().write_int32(9);
        writer.attach_payload(Bytes::from_static(b"x")).unwrap();
        writer.write_end().await.unwrap();
        writer.header_mut().write_int32(9);
        writer.write_end().await.unwrap();

        let mut buf = vec![0u8; 13 + 12];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[13..21], &[0, 0, 0, 4, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_large_header_buffer_shrinks() {
        let (client, mut server) = duplex(256 * 1024);
        let mut writer = FrameWriter::new(client);

        for _ in 0..20_000 {
            writer.header_mut().write_int32(0);
        }
        assert!(writer.header_mut().capacity() > SHRINK_THRESHOLD);
        writer.write_end().await.unwrap();
        assert!(writer.header_mut().capacity() <= SHRINK_THRESHOLD);

        let mut buf = vec![0u8; 8 + 80_000];
        server.read_exact(&mut buf).await.unwrap();
    }

    /// Accepts at most 3 bytes per call.
    struct Trickle(Vec<u8>);

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(3);
            self.0.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_partial_writes_continue() {
        let mut writer = FrameWriter::new(Trickle(Vec::new()));
        writer.header_mut().write_int32(5);
        writer.attach_payload(Bytes::from_static(b"abcdefg")).unwrap();
        writer.write_end().await.unwrap();

        let out = writer.into_inner().0;
        assert_eq!(out.len(), 8 + 4 + 7);
        assert_eq!(&out[12..], b"abcdefg");
    }

    #[test]
    fn test_build_remaining_slices() {
        let parts: [&[u8]; 3] = [b"abcd", b"", b"efg"];
        let slices = build_remaining_slices(&parts, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"cd");
        let slices = build_remaining_slices(&parts, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"fg");
    }
}
