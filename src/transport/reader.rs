//! Inbound framing.
//!
//! Reads one `[precursor][header][payload]` message at a time. The header
//! lands in a reusable buffer that grows by doubling; payloads are read into
//! fresh buffers so they can be handed to the application.

use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::{EnsembleError, Result};
use crate::protocol::{
    Precursor, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, INITIAL_HEADER_CAPACITY,
    PRECURSOR_SIZE,
};

/// Reads framed messages from the service.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
    header: Vec<u8>,
    header_len: usize,
    max_header_size: u32,
    max_payload_size: u32,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self::with_limits(inner, DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_limits(inner: R, max_header_size: u32, max_payload_size: u32) -> Self {
        Self {
            inner: BufReader::new(inner),
            header: vec![0u8; INITIAL_HEADER_CAPACITY],
            header_len: 0,
            max_header_size,
            max_payload_size,
        }
    }

    /// Read the next message. Its header is then available from
    /// [`FrameReader::header`]; the payload is returned (empty if absent).
    pub async fn read_begin(&mut self) -> Result<Bytes> {
        self.header_len = 0;

        let mut buf = [0u8; PRECURSOR_SIZE];
        self.read_exact(&mut buf).await?;
        let precursor = Precursor::decode(&buf)
            .ok_or_else(|| EnsembleError::Protocol("Short precursor".to_string()))?;
        precursor.validate(self.max_header_size, self.max_payload_size)?;

        let header_len = precursor.header_len as usize;
        if header_len > self.header.len() {
            let mut size = self.header.len().max(INITIAL_HEADER_CAPACITY);
            while size < header_len {
                size *= 2;
            }
            self.header.resize(size, 0);
        }

        let mut header = std::mem::take(&mut self.header);
        let result = self.read_exact(&mut header[..header_len]).await;
        self.header = header;
        result?;
        self.header_len = header_len;

        let payload_len = precursor.payload_len as usize;
        let payload = if payload_len > 0 {
            let mut payload = BytesMut::zeroed(payload_len);
            self.read_exact(&mut payload).await?;
            payload.freeze()
        } else {
            Bytes::new()
        };

        tracing::trace!(
            "Read frame: header {} bytes, payload {} bytes",
            header_len,
            payload_len
        );
        Ok(payload)
    }

    /// Header of the last message read.
    #[inline]
    pub fn header(&self) -> &[u8] {
        &self.header[..self.header_len]
    }

    /// Whether a read would make progress right now: buffered bytes,
    /// readable bytes, end of stream, or a pending error. Never waits.
    pub async fn has_input(&mut self) -> bool {
        let inner = &mut self.inner;
        poll_fn(|cx| match Pin::new(&mut *inner).poll_fill_buf(cx) {
            Poll::Ready(_) => Poll::Ready(true),
            Poll::Pending => Poll::Ready(false),
        })
        .await
    }

    /// Wait until a read would make progress, consuming nothing.
    ///
    /// Safe to cancel. End of stream returns `Ok` so the following
    /// [`read_begin`](Self::read_begin) reports it.
    pub async fn wait_for_input(&mut self) -> Result<()> {
        self.inner.fill_buf().await?;
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(EnsembleError::ConnectionClosed)
            }
            Err(e) => Err(EnsembleError::Io(e)),
        }
    }
}
