//! Stateful SLMP client: a `Transport` plus a request/response round trip
//! serialized by a single lock, and a typed `get`/`write` surface over it.
//!
//! Mirrors `SLMP`'s combination of a fixed-size scratch buffer and a single
//! socket in `examples/original_source/include/slmp.h`, replacing its
//! template-heavy `get<Type>`/`write<Type>` with one method per concrete
//! type the tag model actually needs.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::SlmpError;
use crate::slmp::device::{Device, DeviceExtension};
use crate::slmp::frame::{
    self, FrameHeader, RequestCommand, Subcommand,
};
use crate::transport::Transport;

/// Fixed receive buffer size, matching the reference client's
/// `buffer_size = 400`.
const RECV_BUFFER_SIZE: usize = 400;

/// What a binding addresses: a fixed device-memory range, or a named
/// global label resolved by the PLC itself (mirrors `SLMP::Command`'s
/// `is_label` discriminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Device {
        device: Device,
        extension: DeviceExtension,
        head_no: u32,
    },
    Label {
        name: String,
    },
}

/// A connected (or not-yet-connected) SLMP 3E client for one PLC.
///
/// All request/response round trips go through `inner`'s lock, so a single
/// `SlmpClient` can be shared across threads (the supervisor's per-device
/// task owns one, but nothing prevents additional callers).
pub struct SlmpClient {
    header: FrameHeader,
    inner: Mutex<ClientState>,
}

struct ClientState {
    transport: Transport,
}

impl SlmpClient {
    pub fn new(header: FrameHeader) -> Self {
        Self {
            header,
            inner: Mutex::new(ClientState {
                transport: Transport::new(),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().transport.is_connected()
    }

    pub fn connect(&self, host: &str, port: u16, recv_timeout: Duration) -> Result<(), SlmpError> {
        let mut state = self.inner.lock();
        state.transport.connect(host, port, recv_timeout)?;
        Ok(())
    }

    pub fn close(&self) {
        self.inner.lock().transport.close();
    }

    /// Send `frame` and read the reply, closing the transport on any I/O
    /// failure so a subsequent `is_connected()` reports Disconnected (spec
    /// §7: "I/O failure mid-request: the protocol client transitions to
    /// Disconnected"). A non-zero end code is a protocol error, not an I/O
    /// failure, and is handled by the caller without touching the
    /// connection.
    fn round_trip(
        &self,
        command: RequestCommand,
        subcommand: Subcommand,
        payload: &[u8],
    ) -> Result<Vec<u8>, SlmpError> {
        let frame = frame::build_request(&self.header, command, subcommand, payload);
        let mut state = self.inner.lock();
        if let Err(err) = state.transport.send(&frame) {
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
        debug!(bytes = n, "slmp response received");
        Ok(buf[..n].to_vec())
    }

    /// Read `word_count` 16-bit words starting at `head_no` and return the
    /// raw little-endian bytes.
    pub fn read_device_words(
        &self,
        device: Device,
        extension: DeviceExtension,
        head_no: u32,
        word_count: u16,
    ) -> Result<Vec<u8>, SlmpError> {
        let payload = frame::device_read_payload(device, extension, head_no, word_count);
        let subcommand = frame::device_subcommand(extension, false);
        let response = self.round_trip(RequestCommand::Read, subcommand, &payload)?;
        Ok(frame::parse_response(&response)?.payload.to_vec())
    }

    pub fn write_device_words(
        &self,
        device: Device,
        extension: DeviceExtension,
        head_no: u32,
        data: &[u8],
    ) -> Result<(), SlmpError> {
        let payload = frame::device_write_word_payload(device, extension, head_no, data);
        let subcommand = frame::device_subcommand(extension, false);
        let response = self.round_trip(RequestCommand::Write, subcommand, &payload)?;
        frame::parse_response(&response)?;
        Ok(())
    }

    pub fn write_device_bits(
        &self,
        device: Device,
        extension: DeviceExtension,
        head_no: u32,
        bits: &[bool],
    ) -> Result<(), SlmpError> {
        let payload = frame::device_write_bit_payload(device, extension, head_no, bits);
        let response = self.round_trip(RequestCommand::Write, Subcommand::Bit, &payload)?;
        frame::parse_response(&response)?;
        Ok(())
    }

    /// Random label read of one or more named global labels; returns one
    /// raw value per name, in the same order.
    pub fn read_labels(&self, names: &[String]) -> Result<Vec<Vec<u8>>, SlmpError> {
        let payload = frame::label_read_payload(names);
        let response = self.round_trip(RequestCommand::RandomLabelRead, Subcommand::Word, &payload)?;
        let parsed = frame::parse_response(&response)?;
        frame::parse_label_read_response(parsed.payload)
    }

    pub fn write_labels(&self, names: &[String], values: &[Vec<u8>]) -> Result<(), SlmpError> {
        let payload = frame::label_write_payload(names, values);
        let response = self.round_trip(RequestCommand::RandomLabelWrite, Subcommand::Word, &payload)?;
        frame::parse_response(&response)?;
        Ok(())
    }

    /// Read a single label, returning its first (only) value.
    fn read_label(&self, name: &str) -> Result<Vec<u8>, SlmpError> {
        let mut values = self.read_labels(std::slice::from_ref(&name.to_string()))?;
        values
            .pop()
            .ok_or_else(|| SlmpError::ShortResponse(0))
    }

    /// Typed scalar read dispatching on [`Command`].
    pub fn get_u16(&self, command: &Command) -> Result<u16, SlmpError> {
        let bytes = self.get_raw(command, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get_i16(&self, command: &Command) -> Result<i16, SlmpError> {
        Ok(self.get_u16(command)? as i16)
    }

    pub fn get_u32(&self, command: &Command) -> Result<u32, SlmpError> {
        let bytes = self.get_raw(command, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_i32(&self, command: &Command) -> Result<i32, SlmpError> {
        Ok(self.get_u32(command)? as i32)
    }

    pub fn get_f32(&self, command: &Command) -> Result<f32, SlmpError> {
        let bytes = self.get_raw(command, 4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn get_f64(&self, command: &Command) -> Result<f64, SlmpError> {
        let bytes = self.get_raw(command, 8)?;
        Ok(f64::from_le_bytes(bytes[..8].try_into().expect("8 bytes")))
    }

    /// Bool scalar = `get<uint16>` tested non-zero, per spec §4.2 and the
    /// original `SLMP::get<bool>` — a word read, not a bit-subcommand read.
    pub fn get_bool(&self, command: &Command) -> Result<bool, SlmpError> {
        Ok(self.get_u16(command)? != 0)
    }

    pub fn get_string(&self, command: &Command, length_words: u16) -> Result<String, SlmpError> {
        let bytes = match command {
            Command::Device {
                device,
                extension,
                head_no,
            } => self.read_device_words(*device, *extension, *head_no, length_words)?,
            Command::Label { name } => self.read_label(name)?,
        };
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Raw byte read shared by the scalar getters: `byte_len` bytes, rounded
    /// up to a whole number of words for device-memory access.
    fn get_raw(&self, command: &Command, byte_len: usize) -> Result<Vec<u8>, SlmpError> {
        match command {
            Command::Device {
                device,
                extension,
                head_no,
            } => {
                let word_count = ((byte_len + 1) / 2) as u16;
                self.read_device_words(*device, *extension, *head_no, word_count)
            }
            Command::Label { name } => self.read_label(name),
        }
    }

    pub fn write_u16(&self, command: &Command, value: u16) -> Result<(), SlmpError> {
        self.write_raw(command, &value.to_le_bytes())
    }

    pub fn write_i16(&self, command: &Command, value: i16) -> Result<(), SlmpError> {
        self.write_u16(command, value as u16)
    }

    pub fn write_u32(&self, command: &Command, value: u32) -> Result<(), SlmpError> {
        self.write_raw(command, &value.to_le_bytes())
    }

    pub fn write_i32(&self, command: &Command, value: i32) -> Result<(), SlmpError> {
        self.write_u32(command, value as u32)
    }

    pub fn write_f32(&self, command: &Command, value: f32) -> Result<(), SlmpError> {
        self.write_raw(command, &value.to_le_bytes())
    }

    pub fn write_f64(&self, command: &Command, value: f64) -> Result<(), SlmpError> {
        self.write_raw(command, &value.to_le_bytes())
    }

    pub fn write_bool(&self, command: &Command, value: bool) -> Result<(), SlmpError> {
        match command {
            Command::Device {
                device,
                extension,
                head_no,
            } => self.write_device_bits(*device, *extension, *head_no, &[value]),
            Command::Label { name } => self.write_u16(&Command::Label { name: name.clone() }, value as u16),
        }
    }

    pub fn write_string(&self, command: &Command, value: &str) -> Result<(), SlmpError> {
        self.write_raw(command, value.as_bytes())
    }

    fn write_raw(&self, command: &Command, data: &[u8]) -> Result<(), SlmpError> {
        match command {
            Command::Device {
                device,
                extension,
                head_no,
            } => self.write_device_words(*device, *extension, *head_no, data),
            Command::Label { name } => self.write_labels(std::slice::from_ref(&name.clone()), &[data.to_vec()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::thread;

    fn default_header() -> FrameHeader {
        FrameHeader {
            network_no: 0x00,
            station_no: 0xFF,
            module_io: 0x03FF,
            multidrop_station_no: 0x00,
        }
    }

    /// Spawn a loopback server that replies to one request with a
    /// success end code and the given payload, then returns the client
    /// already connected to it.
    fn stub_device(reply_payload: Vec<u8>) -> (SlmpClient, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut request_len = [0u8; 1024];
            let n = sock.read(&mut request_len).unwrap();
            assert!(n > 0);
            let mut response = vec![0u8; 9];
            response.extend_from_slice(&0u16.to_le_bytes()); // end code success
            response.extend_from_slice(&reply_payload);
            sock.write_all(&response).unwrap();
        });
        let client = SlmpClient::new(default_header());
        client
            .connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .unwrap();
        (client, server)
    }

    #[test]
    fn reads_u16_from_device_memory() {
        let (client, server) = stub_device(vec![0x34, 0x12]);
        let command = Command::Device {
            device: Device::D,
            extension: DeviceExtension::None,
            head_no: 100,
        };
        assert_eq!(client.get_u16(&command).unwrap(), 0x1234);
        server.join().unwrap();
    }

    #[test]
    fn reads_bool_from_device_memory_as_word_read() {
        let (client, server) = stub_device(vec![0x01, 0x00]);
        let command = Command::Device {
            device: Device::M,
            extension: DeviceExtension::None,
            head_no: 100,
        };
        assert!(client.get_bool(&command).unwrap());
        server.join().unwrap();
    }

    #[test]
    fn reads_bool_from_label() {
        let mut payload = vec![0x01, 0x00, 0x00]; // label count 1, reserved byte
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        let (client, server) = stub_device(payload);
        let command = Command::Label {
            name: "Global1".to_string(),
        };
        assert!(client.get_bool(&command).unwrap());
        server.join().unwrap();
    }

    #[test]
    fn write_u16_succeeds_on_zero_end_code() {
        let (client, server) = stub_device(Vec::new());
        let command = Command::Device {
            device: Device::D,
            extension: DeviceExtension::None,
            head_no: 100,
        };
        client.write_u16(&command, 42).unwrap();
        server.join().unwrap();
    }
}
