//! Stateful R3 client: one transport, one lock around a full
//! command/answer round trip, and a typed `get` surface built on
//! `r3::extract`.
//!
//! Mirrors `R3::get_answer`'s mutex-guarded send/recv and its `QoK`/`Qok`
//! acknowledgement check in `examples/original_source/include/r3.h`.

use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::error::R3Error;
use crate::r3::extract;
use crate::transport::Transport;

/// Fixed receive buffer size, matching the reference client's
/// `static constexpr size_t size = 400`.
const RECV_BUFFER_SIZE: usize = 400;

pub struct R3Client {
    inner: Mutex<ClientState>,
}

struct ClientState {
    transport: Transport,
}

impl R3Client {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ClientState {
                transport: Transport::new(),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().transport.is_connected()
    }

    pub fn connect(&self, host: &str, port: u16, recv_timeout: Duration) -> Result<(), R3Error> {
        let mut state = self.inner.lock();
        state.transport.connect(host, port, recv_timeout)?;
        Ok(())
    }

    pub fn close(&self) {
        self.inner.lock().transport.close();
    }

    /// Send `command`, read the reply, and strip its `QoK`/`Qok`
    /// acknowledgement prefix. An unacknowledged reply is
    /// [`R3Error::NotAcknowledged`], matching `get_answer` returning an
    /// empty `optional`. Any I/O failure closes the transport so a
    /// subsequent `is_connected()` reports Disconnected (spec §7); a
    /// missing acknowledgement is a protocol error and leaves the
    /// connection up.
    fn get_answer(&self, command: &str) -> Result<String, R3Error> {
        let mut state = self.inner.lock();
        if let Err(err) = state.transport.send(command.as_bytes()) {
            state.transport.close();
            return Err(err.into());
        }
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let n = match state.transport.recv(&mut buf) {
            Ok(n) => n,
            Err(err) => {
                state.transport.close();
                return Err(err.into());
            }
        };
        drop(state);
        debug!(%command, bytes = n, "r3 response received");
        let reply = &buf[..n];
        if !(reply.starts_with(b"QoK") || reply.starts_with(b"Qok")) {
            return Err(R3Error::NotAcknowledged);
        }
        let body = &reply[3..];
        let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
        Ok(String::from_utf8_lossy(&body[..end]).into_owned())
    }

    /// Send a command expecting no typed reply, just an acknowledgement.
    pub fn execute(&self, command: &str) -> Result<(), R3Error> {
        self.get_answer(command)?;
        Ok(())
    }

    /// The acknowledged reply body, unparsed.
    pub fn get_string(&self, command: &str) -> Result<String, R3Error> {
        self.get_answer(command)
    }

    fn get_match(&self, command: &str, pattern: &Regex) -> Result<String, R3Error> {
        let answer = self.get_answer(command)?;
        extract::extract_string(&answer, pattern)
    }

    pub fn get_f64(&self, command: &str, pattern: &Regex) -> Result<f64, R3Error> {
        let text = self.get_match(command, pattern)?;
        if text.is_empty() {
            return Ok(0.0);
        }
        text.parse().map_err(|_| R3Error::NoMatch(pattern.as_str().to_string()))
    }

    pub fn get_f32(&self, command: &str, pattern: &Regex) -> Result<f32, R3Error> {
        Ok(self.get_f64(command, pattern)? as f32)
    }

    pub fn get_i64(&self, command: &str, pattern: &Regex) -> Result<i64, R3Error> {
        let answer = self.get_answer(command)?;
        extract::extract_i64(&answer, pattern)
    }

    pub fn get_u64(&self, command: &str, pattern: &Regex) -> Result<u64, R3Error> {
        let answer = self.get_answer(command)?;
        extract::extract_u64(&answer, pattern)
    }

    pub fn get_i32(&self, command: &str, pattern: &Regex) -> Result<i32, R3Error> {
        Ok(self.get_i64(command, pattern)? as i32)
    }

    pub fn get_u32(&self, command: &str, pattern: &Regex) -> Result<u32, R3Error> {
        Ok(self.get_u64(command, pattern)? as u32)
    }

    pub fn get_hex_i64(&self, command: &str, pattern: &Regex) -> Result<i64, R3Error> {
        let answer = self.get_answer(command)?;
        extract::extract_hex_i64(&answer, pattern)
    }

    pub fn get_hex_i32(&self, command: &str, pattern: &Regex) -> Result<i32, R3Error> {
        Ok(self.get_hex_i64(command, pattern)? as i32)
    }

    /// `match` empty means "reply non-empty, first byte non-zero"; a
    /// non-empty `match` means "parse as `HexInt32`, test bit `position`",
    /// per `R3::get<bool>`.
    pub fn get_bool(&self, command: &str, pattern: Option<&Regex>, position: u32) -> Result<bool, R3Error> {
        match pattern {
            None => {
                let answer = self.get_answer(command)?;
                Ok(extract::extract_bool_presence(&answer))
            }
            Some(pattern) => {
                let answer = self.get_answer(command)?;
                extract::extract_bool_bit(&answer, pattern, position)
            }
        }
    }

    pub fn get_position(&self, command: &str, pattern: &Regex) -> Result<[f64; 10], R3Error> {
        let text = self.get_match(command, pattern)?;
        Ok(extract::extract_position(&text))
    }

    pub fn get_joint(&self, command: &str, pattern: &Regex) -> Result<[f64; 8], R3Error> {
        let text = self.get_match(command, pattern)?;
        Ok(extract::extract_joint(&text))
    }
}

impl Default for R3Client {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::thread;

    /// Spawn a loopback server replying once with `reply`, then return a
    /// client already connected to it.
    fn stub_robot(reply: &'static [u8]) -> (R3Client, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = sock.read(&mut buf).unwrap();
            assert!(n > 0);
            sock.write_all(reply).unwrap();
        });
        let client = R3Client::new();
        client
            .connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .unwrap();
        (client, server)
    }

    #[test]
    fn accepts_upper_k_acknowledgement() {
        let (client, server) = stub_robot(b"QoK3.14");
        let pattern = Regex::new(r"(-?\d+\.\d+)").unwrap();
        assert_eq!(client.get_f64("1;1;VAL1", &pattern).unwrap(), 3.14);
        server.join().unwrap();
    }

    #[test]
    fn accepts_lower_k_acknowledgement() {
        let (client, server) = stub_robot(b"Qok42");
        let pattern = Regex::new(r"(\d+)").unwrap();
        assert_eq!(client.get_i64("1;1;VAL1", &pattern).unwrap(), 42);
        server.join().unwrap();
    }

    #[test]
    fn unacknowledged_reply_is_an_error() {
        let (client, server) = stub_robot(b"ERR");
        let pattern = Regex::new(r"(\d+)").unwrap();
        assert!(matches!(
            client.get_i64("1;1;VAL1", &pattern),
            Err(R3Error::NotAcknowledged)
        ));
        server.join().unwrap();
    }

    #[test]
    fn reads_position_from_acknowledged_reply() {
        let (client, server) = stub_robot(b"QoK(1,2,3)");
        let pattern = Regex::new(r"(\(.*\))").unwrap();
        let position = client.get_position("1;1;POSGET", &pattern).unwrap();
        assert_eq!(&position[..3], &[1.0, 2.0, 3.0]);
        server.join().unwrap();
    }
}
