//! Byte stream abstraction for the local side of a socket.
//!
//! A local socket bridges a byte stream (a connection accepted from a
//! client, a service pipe, a PTY) to its peer. The multiplexer never blocks
//! on stream I/O: both operations are non-blocking, and
//! [`std::io::ErrorKind::WouldBlock`] is the "try again when the event loop
//! says so" signal.

use std::io;

/// A non-blocking bidirectional byte stream.
///
/// Contract:
/// - `read` returning `Ok(0)` means end of stream.
/// - `write` returning `Ok(0)` is treated as a write failure by the caller.
/// - `Err(WouldBlock)` from either side means the operation should be
///   retried once the owning socket's readiness event fires.
///
/// Implementations wrap real fds in production and scripted buffers in
/// tests; dropping the stream releases the underlying resource.
pub trait ByteStream: Send {
    /// Read available bytes into `buf`, without blocking.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes from `buf`, without blocking.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl ByteStream for Box<dyn ByteStream> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(Vec<u8>);

    impl ByteStream for Echo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.0.len().min(buf.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0.drain(..n);
            Ok(n)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[test]
    fn boxed_stream_delegates() {
        let mut stream: Box<dyn ByteStream> = Box::new(Echo(Vec::new()));
        assert_eq!(stream.write(b"ping").unwrap(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");
    }
}
