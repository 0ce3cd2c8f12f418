//! Blocking TCP transport shared by the SLMP and R3 clients.
//!
//! This is intentionally the thinnest layer in the crate: a single TCP
//! socket with a configurable receive timeout. Protocol clients are
//! responsible for serializing access to it (see `slmp::client::SlmpClient`
//! and `r3::client::R3Client`, both of which wrap their transport in a
//! `parking_lot::Mutex` to guard a full send/recv round trip).

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::TransportError;

/// A blocking, synchronous TCP connection to a device.
///
/// `Transport` does not classify failures beyond success/failure: any I/O
/// error is reported to the caller, which is responsible for treating it as
/// a disconnect (per spec §4.1 / §7).
pub struct Transport {
    stream: Option<TcpStream>,
    addr: Option<SocketAddr>,
    recv_timeout: Duration,
}

impl Transport {
    /// Create an unconnected transport. `recv_timeout` of zero means no
    /// timeout is applied (matches the C++ original's `timeout_ms = 0`
    /// default, which callers should avoid in production).
    pub fn new() -> Self {
        Self {
            stream: None,
            addr: None,
            recv_timeout: Duration::ZERO,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect to `host:port`, applying `recv_timeout` to the socket.
    pub fn connect(
        &mut self,
        host: &str,
        port: u16,
        recv_timeout: Duration,
    ) -> Result<(), TransportError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("could not resolve {host}:{port}"),
            )))?;
        let stream = TcpStream::connect(addr)?;
        if !recv_timeout.is_zero() {
            stream.set_read_timeout(Some(recv_timeout))?;
        } else {
            stream.set_read_timeout(None)?;
        }
        stream.set_nodelay(true).ok();
        self.stream = Some(stream);
        self.addr = Some(addr);
        self.recv_timeout = recv_timeout;
        Ok(())
    }

    /// Send the full buffer. A short write is treated as success only if
    /// the OS confirms all bytes were written (`write_all`).
    pub fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(data)?;
        Ok(data.len())
    }

    /// Read up to `buffer.len()` bytes, returning the number actually read.
    pub fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let n = stream.read(buffer)?;
        if n == 0 {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed connection",
            )));
        }
        Ok(n)
    }

    pub fn close(&mut self) {
        self.stream = None;
        self.addr = None;
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn connect_send_recv_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });

        let mut transport = Transport::new();
        transport
            .connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .unwrap();
        transport.send(b"hello").unwrap();
        let mut buf = [0u8; 5];
        let n = transport.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        server.join().unwrap();
    }

    #[test]
    fn send_without_connect_fails() {
        let mut transport = Transport::new();
        assert!(transport.send(b"x").is_err());
    }
}
