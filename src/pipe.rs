use crate::error::StreamError;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Create a synchronous, unbuffered byte stream.
///
/// Every write hands its bytes directly to a reader blocked on the other end,
/// so a slow reader stalls its writer. Dropping or closing the writer ends the
/// stream; dropping the reader makes further writes fail with a broken pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel::bounded(0);
    let stalls = Arc::new(AtomicU64::new(0));
    (
        PipeWriter {
            tx: Some(tx),
            stalls: Arc::clone(&stalls),
        },
        PipeReader {
            rx,
            pending: Vec::new(),
            pos: 0,
            stalls,
        },
    )
}

/// Write end of a rendezvous stream
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<Sender<Vec<u8>>>,
    stalls: Arc<AtomicU64>,
}

impl PipeWriter {
    /// Hand one chunk to the reader, blocking until it is taken
    pub fn send(&mut self, chunk: Vec<u8>) -> Result<(), StreamError> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        match tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) => {
                // No reader waiting yet
                self.stalls.fetch_add(1, Ordering::Relaxed);
                tx.send(chunk).map_err(|_| StreamError::BrokenPipe)
            }
            Err(TrySendError::Disconnected(_)) => Err(StreamError::BrokenPipe),
        }
    }

    /// Close the stream. Calling it again has no effect.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Number of writes that had to wait for the reader
    pub fn stall_count(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(buf.to_vec())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read end of a rendezvous stream
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
    stalls: Arc<AtomicU64>,
}

impl PipeReader {
    /// Receive the next chunk, blocking until one is written.
    ///
    /// Fails with [`StreamError::EndOfStream`] once the writer has closed and
    /// nothing is left to read.
    pub fn recv(&mut self) -> Result<Vec<u8>, StreamError> {
        if self.pos < self.pending.len() {
            let rest = self.pending.split_off(self.pos);
            self.pending.clear();
            self.pos = 0;
            return Ok(rest);
        }
        loop {
            match self.rx.recv() {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => return Ok(chunk),
                Err(_) => return Err(StreamError::EndOfStream),
            }
        }
    }

    /// Number of writes that had to wait for this reader
    pub fn stall_count(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.pending.len() {
            match self.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                // std::io reports end of stream as a zero-length read
                Err(StreamError::EndOfStream) => return Ok(0),
                Err(err) => return Err(err.into()),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
