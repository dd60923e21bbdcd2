//! Scripted byte streams for driving socket I/O in tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use dbridge_core::stream::ByteStream;

/// One step of a stream's read script.
#[derive(Debug, Clone)]
enum ReadStep {
    Data(Vec<u8>),
    Eof,
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Inner {
    reads: VecDeque<ReadStep>,
    written: Vec<u8>,
    write_budget: usize,
    write_error: Option<io::ErrorKind>,
}

/// Inspection handle shared with a [`ScriptedStream`].
///
/// The stream itself is boxed into the multiplexer; the handle stays with
/// the test to feed reads, adjust the write budget, and inspect output.
#[derive(Debug, Clone, Default)]
pub struct StreamHandle {
    inner: Arc<Mutex<Inner>>,
}

impl StreamHandle {
    /// Queue bytes for the next reads.
    pub fn push_read(&self, data: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .reads
            .push_back(ReadStep::Data(data.to_vec()));
    }

    /// Queue an end-of-stream.
    pub fn push_eof(&self) {
        self.inner.lock().unwrap().reads.push_back(ReadStep::Eof);
    }

    /// Queue a read error.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.inner
            .lock()
            .unwrap()
            .reads
            .push_back(ReadStep::Error(kind));
    }

    /// Grow the write budget; writes past it report `WouldBlock`.
    pub fn grow_write_budget(&self, bytes: usize) {
        self.inner.lock().unwrap().write_budget += bytes;
    }

    /// Accept writes without limit.
    pub fn unlimited_writes(&self) {
        self.inner.lock().unwrap().write_budget = usize::MAX;
    }

    /// Fail every subsequent write with `kind`.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.inner.lock().unwrap().write_error = Some(kind);
    }

    /// Everything written to the stream so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }
}

/// A [`ByteStream`] driven by a [`StreamHandle`].
///
/// Reads pop scripted steps (an exhausted script reports `WouldBlock`);
/// writes consume the budget and are captured for inspection.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedStream {
    /// Create a stream that blocks on read and accepts all writes, plus
    /// its inspection handle.
    pub fn new() -> (Self, StreamHandle) {
        let handle = StreamHandle::default();
        handle.unlimited_writes();
        let stream = Self {
            inner: handle.inner.clone(),
        };
        (stream, handle)
    }

    /// Create a stream whose write side starts blocked.
    pub fn blocked_writes() -> (Self, StreamHandle) {
        let handle = StreamHandle::default();
        let stream = Self {
            inner: handle.inner.clone(),
        };
        (stream, handle)
    }
}

impl ByteStream for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        match inner.reads.pop_front() {
            Some(ReadStep::Data(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    inner.reads.push_front(ReadStep::Data(chunk));
                }
                Ok(n)
            }
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::Error(kind)) => Err(kind.into()),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(kind) = inner.write_error {
            return Err(kind.into());
        }
        let n = buf.len().min(inner.write_budget);
        if n == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if inner.write_budget != usize::MAX {
            inner.write_budget -= n;
        }
        inner.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}
