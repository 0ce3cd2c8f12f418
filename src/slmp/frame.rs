//! MELSEC 3E binary frame encoding and response parsing.
//!
//! Wire layout mirrors `SLMP::request()` / `SLMP::read_request()` /
//! `SLMP::write_request()` in the reference implementation
//! (`examples/original_source/include/slmp.h`), generalized from its
//! fixed-size `std::vector<std::byte>` scratch buffer into plain
//! `Vec<u8>` construction. Everything is little-endian; nothing here
//! relies on host byte order.

use crate::error::SlmpError;
use crate::slmp::device::{Device, DeviceExtension};

/// Fixed serial number placed in every request (the original never varies
/// it, so there is no reason for callers to either).
const SERIAL_NO: u16 = 0x0050;

/// The 3E frame request command codes this client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RequestCommand {
    Read = 0x0401,
    Write = 0x1401,
    RandomLabelRead = 0x041C,
    RandomLabelWrite = 0x141B,
}

/// Device-access subcommands. `BitLong`/`WordLong` (0x0003/0x0002) exist on
/// the wire but this client never emits them — device-extension access
/// always goes through `WordLongDeviceExtension` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Subcommand {
    Word = 0x0000,
    Bit = 0x0001,
    WordLongDeviceExtension = 0x0082,
}

/// Connection parameters fixed at construction time (§6 `clients.json`
/// PLC-only fields).
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub network_no: u8,
    pub station_no: u8,
    pub module_io: u16,
    pub multidrop_station_no: u8,
}

/// Assemble a full request frame: fixed header, command/subcommand, and a
/// pre-built payload. `data_length` covers the monitoring timer plus
/// command, subcommand and payload, per the wire protocol (the monitoring
/// timer field itself is always zero here — no per-request timeout is
/// negotiated above the transport's receive timeout, per §4.5).
pub fn build_request(
    header: &FrameHeader,
    command: RequestCommand,
    subcommand: Subcommand,
    payload: &[u8],
) -> Vec<u8> {
    let data_length = payload.len() as u16 + 6;
    let mut frame = Vec::with_capacity(15 + payload.len());
    frame.extend_from_slice(&SERIAL_NO.to_le_bytes());
    frame.push(header.network_no);
    frame.push(header.station_no);
    frame.extend_from_slice(&header.module_io.to_le_bytes());
    frame.push(header.multidrop_station_no);
    frame.extend_from_slice(&data_length.to_le_bytes());
    frame.extend_from_slice(&0u16.to_le_bytes()); // monitoring timer
    frame.extend_from_slice(&(command as u16).to_le_bytes());
    frame.extend_from_slice(&(subcommand as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A parsed response: the end code and a view of the payload bytes that
/// follow it (empty on failure).
pub struct Response<'a> {
    pub end_code: u16,
    pub payload: &'a [u8],
}

/// Parse a response frame. Per §4.2: the first 9 bytes echo the client
/// header, bytes 9-10 are the little-endian end code, and on success the
/// payload begins at byte 11.
pub fn parse_response(buf: &[u8]) -> Result<Response<'_>, SlmpError> {
    if buf.len() < 11 {
        return Err(SlmpError::ShortResponse(buf.len()));
    }
    let end_code = u16::from_le_bytes([buf[9], buf[10]]);
    if end_code != 0 {
        return Err(SlmpError::EndCode(end_code));
    }
    Ok(Response {
        end_code,
        payload: &buf[11..],
    })
}

/// Build the device-addressing prefix (no trailing count) for a
/// device-memory access, selecting the short or extended form per §4.2.
fn device_address_bytes(device: Device, extension: DeviceExtension, head_no: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12);
    if extension.is_none() {
        let head = head_no.to_le_bytes();
        bytes.extend_from_slice(&head[..3]);
        bytes.push(device.code());
    } else {
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&head_no.to_le_bytes());
        bytes.extend_from_slice(&(device as u16).to_le_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&extension.wire_value().to_le_bytes());
        bytes.push(extension.access_kind());
    }
    bytes
}

/// Which subcommand a device-memory access uses: word access (plain or
/// extended) or bit access.
pub fn device_subcommand(extension: DeviceExtension, bit: bool) -> Subcommand {
    if bit {
        Subcommand::Bit
    } else if extension.is_none() {
        Subcommand::Word
    } else {
        Subcommand::WordLongDeviceExtension
    }
}

/// Payload for a device-memory read: address bytes followed by a 2-byte
/// device count (words or bits depending on the subcommand).
pub fn device_read_payload(
    device: Device,
    extension: DeviceExtension,
    head_no: u32,
    device_count: u16,
) -> Vec<u8> {
    let mut payload = device_address_bytes(device, extension, head_no);
    payload.extend_from_slice(&device_count.to_le_bytes());
    payload
}

/// Payload for a device-memory word write: address bytes, word count, then
/// the raw little-endian word data.
pub fn device_write_word_payload(
    device: Device,
    extension: DeviceExtension,
    head_no: u32,
    data: &[u8],
) -> Vec<u8> {
    let word_count = ((data.len() + 1) / 2) as u16;
    let mut payload = device_address_bytes(device, extension, head_no);
    payload.extend_from_slice(&word_count.to_le_bytes());
    payload.extend_from_slice(data);
    payload
}

/// Payload for a device-memory bit write: address bytes, bit count, then
/// bits packed two per byte (bit `2i` in the high nibble, `2i+1` low).
pub fn device_write_bit_payload(
    device: Device,
    extension: DeviceExtension,
    head_no: u32,
    bits: &[bool],
) -> Vec<u8> {
    let mut payload = device_address_bytes(device, extension, head_no);
    payload.extend_from_slice(&(bits.len() as u16).to_le_bytes());
    for pair in bits.chunks(2) {
        let hi = pair[0] as u8;
        let lo = pair.get(1).copied().unwrap_or(false) as u8;
        payload.push((hi << 4) | lo);
    }
    payload
}

/// Payload for a random label read: label count, reserved, then per label a
/// UTF-16LE name length (code units) and the name itself.
pub fn label_read_payload(names: &[String]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(names.len() as u16).to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    for name in names {
        let units: Vec<u16> = name.encode_utf16().collect();
        payload.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
    }
    payload
}

/// Payload for a random label write: as [`label_read_payload`], but each
/// label is followed by a 2-byte value length (in bytes, padded to an even
/// count) and the value bytes themselves.
pub fn label_write_payload(names: &[String], values: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&(names.len() as u16).to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    for (name, value) in names.iter().zip(values) {
        let units: Vec<u16> = name.encode_utf16().collect();
        payload.extend_from_slice(&(units.len() as u16).to_le_bytes());
        for unit in units {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        let padded_len = value.len() + (value.len() % 2);
        payload.extend_from_slice(&(padded_len as u16).to_le_bytes());
        payload.extend_from_slice(value);
        if padded_len != value.len() {
            payload.push(0);
        }
    }
    payload
}

/// Parse a random-label-read response payload (the bytes after the end
/// code, i.e. `Response::payload`) into one raw value per requested label.
///
/// Per the reference implementation's `SLMP::response` for
/// `RandomLabelRead`: a 2-byte label count, then per label a reserved byte,
/// a 2-byte little-endian value length, and the value bytes themselves.
pub fn parse_label_read_response(payload: &[u8]) -> Result<Vec<Vec<u8>>, SlmpError> {
    if payload.len() < 2 {
        return Err(SlmpError::ShortResponse(payload.len()));
    }
    let label_count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let mut values = Vec::with_capacity(label_count);
    let mut offset = 2;
    for _ in 0..label_count {
        if payload.len() < offset + 3 {
            return Err(SlmpError::ShortResponse(payload.len()));
        }
        let data_size = u16::from_le_bytes([payload[offset + 1], payload[offset + 2]]) as usize;
        let start = offset + 3;
        if payload.len() < start + data_size {
            return Err(SlmpError::ShortResponse(payload.len()));
        }
        values.push(payload[start..start + data_size].to_vec());
        offset = start + data_size;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_header() -> FrameHeader {
        FrameHeader {
            network_no: 0x00,
            station_no: 0xFF,
            module_io: 0x03FF,
            multidrop_station_no: 0x00,
        }
    }

    #[test]
    fn word_read_no_extension_frame() {
        // device=D, extension=None, head=0x000100, length=2 words.
        // payload: head (3 bytes LE) | device code (1 byte) | count (2 bytes LE)
        let payload = [0x00, 0x01, 0x00, 0xA8, 0x02, 0x00];
        let frame = build_request(
            &default_header(),
            RequestCommand::Read,
            Subcommand::Word,
            &payload,
        );
        assert_eq!(
            frame,
            vec![
                0x50, 0x00, // serial
                0x00, // network
                0xFF, // station
                0xFF, 0x03, // module io
                0x00, // multidrop
                0x0C, 0x00, // data length = 6 (monitor+cmd+subcmd) + 6 (payload)
                0x00, 0x00, // monitor timer
                0x01, 0x04, // command Read
                0x00, 0x00, // subcommand Word
                0x00, 0x01, 0x00, 0xA8, 0x02, 0x00, // payload
            ]
        );
    }

    #[test]
    fn word_read_cpu1_extension_frame() {
        // device=G, extension=CPUNo1, head=0x1000, length=1 word.
        // payload: 0x0000 | head[0..4] | device[0..2] | 0x0000 | extension[0..2] | access_kind
        let payload: Vec<u8> = {
            let mut p = vec![0x00, 0x00];
            p.extend_from_slice(&0x1000u32.to_le_bytes());
            p.extend_from_slice(&0x00ABu16.to_le_bytes()); // Device::G
            p.extend_from_slice(&[0x00, 0x00]);
            p.extend_from_slice(&0x03E0u16.to_le_bytes()); // CPUNo1
            p.push(0xFA); // access kind
            p.extend_from_slice(&1u16.to_le_bytes()); // count
            p
        };
        let frame = build_request(
            &default_header(),
            RequestCommand::Read,
            Subcommand::WordLongDeviceExtension,
            &payload,
        );
        assert_eq!(&frame[11..13], &[0x82, 0x00]); // subcommand 0x0082
        assert_eq!(frame[frame.len() - 3], 0xFA); // access kind byte precedes count
    }

    #[test]
    fn bit_write_single_true_frame() {
        // device=M, head=0x100, value=true: subcommand Bit, device count 1,
        // payload byte 0x10 (bit 0 in the high nibble).
        let mut payload = vec![0x00, 0x01, 0x00, 0x90]; // head + device M
        payload.extend_from_slice(&1u16.to_le_bytes()); // device count = 1 bit
        payload.push(0x10);
        let frame = build_request(
            &default_header(),
            RequestCommand::Write,
            Subcommand::Bit,
            &payload,
        );
        assert_eq!(&frame[11..13], &[0x01, 0x14]); // command Write = 0x1401
        assert_eq!(&frame[13..15], &[0x01, 0x00]); // subcommand Bit
        assert_eq!(frame.last(), Some(&0x10));
    }

    #[test]
    fn parses_success_response() {
        let mut buf = vec![0u8; 11];
        buf.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        let response = parse_response(&buf).unwrap();
        assert_eq!(response.end_code, 0);
        assert_eq!(response.payload, &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn non_zero_end_code_is_an_error() {
        let mut buf = vec![0u8; 11];
        buf[9] = 0x59;
        buf[10] = 0xC0; // WrongCommand = 0xC059
        assert!(matches!(
            parse_response(&buf),
            Err(SlmpError::EndCode(0xC059))
        ));
    }

    #[test]
    fn short_response_is_an_error() {
        assert!(matches!(
            parse_response(&[0u8; 5]),
            Err(SlmpError::ShortResponse(5))
        ));
    }

    #[test]
    fn label_read_single_label_payload() {
        let payload = label_read_payload(&["D1".to_string()]);
        assert_eq!(
            payload,
            vec![
                0x01, 0x00, // label count = 1
                0x00, 0x00, // reserved
                0x02, 0x00, // name length = 2 code units
                b'D', 0x00, b'1', 0x00, // "D1" as UTF-16LE
            ]
        );
    }

    #[test]
    fn label_read_two_label_batch_payload() {
        let payload = label_read_payload(&["D1".to_string(), "D2".to_string()]);
        assert_eq!(
            payload,
            vec![
                0x02, 0x00, // label count = 2
                0x00, 0x00, // reserved
                0x02, 0x00, b'D', 0x00, b'1', 0x00, // "D1"
                0x02, 0x00, b'D', 0x00, b'2', 0x00, // "D2"
            ]
        );
    }

    #[test]
    fn label_write_string_value_is_padded_to_even_length() {
        // "hi!" is 3 bytes, an odd length, so a trailing zero pad byte is
        // appended and the recorded length still reflects the padded size.
        let payload = label_write_payload(
            &["Greeting".to_string()],
            &[b"hi!".to_vec()],
        );
        let mut expected = vec![
            0x01, 0x00, // label count = 1
            0x00, 0x00, // reserved
        ];
        let name_units: Vec<u16> = "Greeting".encode_utf16().collect();
        expected.extend_from_slice(&(name_units.len() as u16).to_le_bytes());
        for unit in &name_units {
            expected.extend_from_slice(&unit.to_le_bytes());
        }
        expected.extend_from_slice(&4u16.to_le_bytes()); // padded value length
        expected.extend_from_slice(b"hi!");
        expected.push(0x00); // pad byte
        assert_eq!(payload, expected);
    }

    #[test]
    fn label_write_even_length_value_has_no_pad_byte() {
        let payload = label_write_payload(&["D1".to_string()], &[b"ab".to_vec()]);
        assert_eq!(payload.last(), Some(&b'b'));
    }

    #[test]
    fn parses_label_read_response_single_label() {
        let mut payload = vec![0x01, 0x00]; // label count = 1
        payload.push(0x00); // reserved
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&[0x34, 0x12]);
        let values = parse_label_read_response(&payload).unwrap();
        assert_eq!(values, vec![vec![0x34, 0x12]]);
    }

    #[test]
    fn parses_label_read_response_two_labels() {
        let mut payload = vec![0x02, 0x00];
        payload.push(0x00);
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&[0x01, 0x00]);
        payload.push(0x00);
        payload.extend_from_slice(&4u16.to_le_bytes());
        payload.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        let values = parse_label_read_response(&payload).unwrap();
        assert_eq!(values, vec![vec![0x01, 0x00], vec![0xAA, 0xBB, 0xCC, 0xDD]]);
    }
}
