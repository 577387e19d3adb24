//! Blocking writer that feeds a streaming request body

use bytes::{Bytes, BytesMut};
use std::io::{self, ErrorKind, Write};
use tokio::sync::mpsc;

/// Item type of the request body stream
pub type BodyChunk = io::Result<Bytes>;

/// [`Write`] adapter that batches bytes and sends them over a bounded channel
///
/// `write` blocks while the channel is full, which is what keeps memory
/// bounded when the network is slower than the encoder. It must not be used
/// from inside an async task.
pub struct ChannelWriter {
    tx: Option<mpsc::Sender<BodyChunk>>,
    buffer: BytesMut,
    chunk_size: usize,
}

impl ChannelWriter {
    /// Writer that emits chunks of about `chunk_size` bytes into `tx`
    pub fn new(tx: mpsc::Sender<BodyChunk>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx: Some(tx),
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "request body already closed"))?;
        tx.blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "request body receiver closed"))
    }

    /// Flush pending bytes and end the stream
    pub fn close(&mut self) -> io::Result<()> {
        let flushed = self.flush();
        self.tx = None;
        flushed
    }

    /// End the stream with an error so the request is torn down instead of
    /// completing with a truncated body
    pub fn abort(&mut self) {
        self.buffer.clear();
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(Err(io::Error::other("upload aborted")));
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.buffer.is_empty() && buf.len() >= self.chunk_size {
            self.send(Bytes::copy_from_slice(buf))?;
            return Ok(buf.len());
        }

        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= self.chunk_size {
            let chunk = self.buffer.split().freeze();
            self.send(chunk)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        self.send(chunk)
    }
}
