//! PLC schema loader: walks a `plc-specification.json`-shaped `Nodes`
//! array and a device's `UserNodes` entries, producing a [`TagNode`] tree
//! bound to live [`SlmpClient`] reads/writes.
//!
//! Mirrors `parse_plc_node` / `parse_plc_user_node` in
//! `examples/original_source/include/plc.h`, generalizing the OPC-UA
//! `addVariableNode` calls into [`TagNode::leaf`] construction and
//! `read_plc_value`/`write_plc_value`'s datatype dispatch into a closure
//! built once per node instead of one shared callback switching on a
//! stored datatype string.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::error::SpecError;
use crate::slmp::client::{Command, SlmpClient};
use crate::slmp::device::decode_device_name;
use crate::tag::{DataType, TagNode, TagValue};

fn require_str<'a>(node: &'a Value, field: &'static str) -> Result<&'a str, SpecError> {
    node.get(field)
        .and_then(Value::as_str)
        .ok_or(SpecError::MissingField(field))
}

fn node_type(node: &Value) -> Result<&str, SpecError> {
    require_str(node, "Type")
}

fn node_name(node: &Value) -> Result<&str, SpecError> {
    require_str(node, "Name")
}

fn node_count(node: &Value) -> u32 {
    node.get("Count").and_then(Value::as_u64).unwrap_or(0) as u32
}

fn datatype_from(name: &str) -> Option<DataType> {
    match name {
        "Bool" => Some(DataType::Bool),
        "Word" => Some(DataType::Word),
        "DWord" => Some(DataType::DWord),
        "Int" => Some(DataType::Int16),
        "DInt" => Some(DataType::Int32),
        "Float" => Some(DataType::Float),
        "Double" => Some(DataType::Double),
        "String" => Some(DataType::String),
        _ => None,
    }
}

fn read_length_words(read_command: &Value) -> u16 {
    read_command.get("Length").and_then(Value::as_u64).unwrap_or(1) as u16
}

/// Resolve a `ReadCommand` object into an SLMP binding. Returns `None` (a
/// configuration error, logged by the caller) if the device string is
/// unrecognised, per spec §4.4.
fn resolve_command(read_command: &Value, device_field: &str, is_label: bool) -> Option<Command> {
    if is_label {
        let name = read_command.get(device_field)?.as_str()?.to_string();
        return Some(Command::Label { name });
    }
    let device_name = read_command.get(device_field)?.as_str()?;
    let (device, extension) = decode_device_name(device_name)?;
    let head_no = read_command.get("Head no")?.as_u64()? as u32;
    Some(Command::Device {
        device,
        extension,
        head_no,
    })
}

/// Build the read (and, if `writeable`, write) closures for a scalar leaf.
fn bind_scalar(
    client: Arc<SlmpClient>,
    command: Command,
    datatype: DataType,
    length_words: u16,
    writeable: bool,
) -> (
    Option<crate::tag::ReadCallback>,
    Option<crate::tag::WriteCallback>,
) {
    let read_command = command.clone();
    let read_client = Arc::clone(&client);
    let read: crate::tag::ReadCallback = Box::new(move || {
        let result = match datatype {
            DataType::Bool => read_client.get_bool(&read_command).map(TagValue::Bool),
            DataType::Word => read_client.get_u16(&read_command).map(TagValue::Word),
            DataType::Int16 => read_client.get_i16(&read_command).map(TagValue::Int16),
            DataType::DWord => read_client.get_u32(&read_command).map(TagValue::DWord),
            DataType::Int32 => read_client.get_i32(&read_command).map(TagValue::Int32),
            DataType::Float => read_client.get_f32(&read_command).map(TagValue::Float),
            DataType::Double => read_client.get_f64(&read_command).map(TagValue::Double),
            DataType::String => read_client
                .get_string(&read_command, length_words)
                .map(TagValue::String),
            _ => return Err(crate::error::DeviceFailure),
        };
        result.map_err(|_| crate::error::DeviceFailure)
    });

    if !writeable {
        return (Some(read), None);
    }
    let write_command = command;
    let write: crate::tag::WriteCallback = Box::new(move |value| {
        let result = match (&value, datatype) {
            (TagValue::Bool(v), DataType::Bool) => client.write_bool(&write_command, *v),
            (TagValue::Word(v), DataType::Word) => client.write_u16(&write_command, *v),
            (TagValue::Int16(v), DataType::Int16) => client.write_i16(&write_command, *v),
            (TagValue::DWord(v), DataType::DWord) => client.write_u32(&write_command, *v),
            (TagValue::Int32(v), DataType::Int32) => client.write_i32(&write_command, *v),
            (TagValue::Float(v), DataType::Float) => client.write_f32(&write_command, *v),
            (TagValue::Double(v), DataType::Double) => client.write_f64(&write_command, *v),
            (TagValue::String(v), DataType::String) => client.write_string(&write_command, v),
            _ => return Err(crate::error::DeviceFailure),
        };
        result.map_err(|_| crate::error::DeviceFailure)
    });
    (Some(read), Some(write))
}

/// Build the read closure for an array leaf (`count > 1`). Only device
/// bindings are supported, per spec §4.2: one read, `device count in words
/// = N * ceil(sizeof(T)/2)`.
fn bind_array(client: Arc<SlmpClient>, command: Command, datatype: DataType, count: u32) -> crate::tag::ReadCallback {
    let (device, extension, head_no) = match &command {
        Command::Device {
            device,
            extension,
            head_no,
        } => (*device, *extension, *head_no),
        Command::Label { .. } => {
            return Box::new(|| Err(crate::error::DeviceFailure));
        }
    };
    Box::new(move || {
        if datatype == DataType::Bool {
            // Bool array = read ceil(N/16) words via the word subcommand;
            // bit k is (byte[k/8] >> (k%8)) & 1, 8 bits per byte, per spec
            // §4.2 and the original `get<uint8_t>`.
            let words = (count as u16 + 15) / 16;
            let bytes = client
                .read_device_words(device, extension, head_no, words)
                .map_err(|_| crate::error::DeviceFailure)?;
            let mut bits = Vec::with_capacity(count as usize);
            for k in 0..count as usize {
                let byte = match bytes.get(k / 8) {
                    Some(b) => *b,
                    None => break,
                };
                bits.push((byte >> (k % 8)) & 1 != 0);
            }
            return Ok(TagValue::BoolArray(bits));
        }
        let element_words: u16 = match datatype {
            DataType::Word | DataType::Int16 => 1,
            DataType::DWord | DataType::Int32 | DataType::Float => 2,
            DataType::Double => 4,
            DataType::String => 1,
            _ => return Err(crate::error::DeviceFailure),
        };
        let words = element_words.saturating_mul(count as u16);
        let bytes = client
            .read_device_words(device, extension, head_no, words)
            .map_err(|_| crate::error::DeviceFailure)?;
        let chunk = element_words as usize * 2;
        let result = match datatype {
            DataType::Word => TagValue::WordArray(
                bytes
                    .chunks(chunk)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            DataType::Int16 => TagValue::Int16Array(
                bytes
                    .chunks(chunk)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            DataType::DWord => TagValue::DWordArray(
                bytes
                    .chunks(chunk)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Int32 => TagValue::Int32Array(
                bytes
                    .chunks(chunk)
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Float => TagValue::FloatArray(
                bytes
                    .chunks(chunk)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::String => TagValue::StringArray(
                bytes
                    .chunks(chunk)
                    .map(|c| {
                        let end = c.iter().position(|&b| b == 0).unwrap_or(c.len());
                        String::from_utf8_lossy(&c[..end]).into_owned()
                    })
                    .collect(),
            ),
            _ => unreachable!(),
        };
        Ok(result)
    })
}

fn register_device_leaf(
    client: &Arc<SlmpClient>,
    parent: &mut TagNode,
    name: String,
    node: &Value,
    device_field: &str,
    is_label: bool,
) {
    let count = node_count(node);
    let writeable = node.get("Writeable").and_then(Value::as_bool).unwrap_or(false) && count <= 1;
    let datatype_name = node.get("Datatype").and_then(Value::as_str).unwrap_or_default();
    let datatype = match datatype_from(datatype_name) {
        Some(dt) => dt,
        None => {
            warn!(node = %name, datatype = datatype_name, "unknown PLC datatype, registering inert leaf");
            parent.add_child(TagNode::leaf(name, DataType::Word, count, false, None, None));
            return;
        }
    };
    let read_command = node.get("ReadCommand");
    let command = read_command.and_then(|rc| resolve_command(rc, device_field, is_label));
    let command = match command {
        Some(c) => c,
        None => {
            let device_name = read_command
                .and_then(|rc| rc.get(device_field))
                .and_then(Value::as_str)
                .unwrap_or("<missing>");
            warn!(node = %name, device = device_name, "not a valid SLMP device, registering inert leaf");
            parent.add_child(TagNode::leaf(name, datatype, count, false, None, None));
            return;
        }
    };

    if count > 1 {
        let read = bind_array(Arc::clone(client), command, datatype, count);
        parent.add_child(TagNode::leaf(name, datatype, count, false, Some(read), None));
    } else {
        let length_words = read_command.map(read_length_words).unwrap_or(1);
        let (read, write) = bind_scalar(Arc::clone(client), command, datatype, length_words, writeable);
        parent.add_child(TagNode::leaf(name, datatype, count, writeable, read, write));
    }
}

pub fn parse_plc_node(client: &Arc<SlmpClient>, parent: &mut TagNode, node: &Value) -> Result<(), SpecError> {
    let type_ = node_type(node)?;
    let name = node_name(node)?.to_string();
    match type_ {
        "Object" => {
            let has_container = parent.find_child(&name).is_some();
            if !has_container {
                parent.add_child(TagNode::container(name.clone()));
            }
            let container = parent.find_child_mut(&name).expect("just ensured present");
            for child in node.get("Children").and_then(Value::as_array).into_iter().flatten() {
                parse_plc_node(client, container, child)?;
            }
        }
        "Property" => {
            let read_command = node
                .get("ReadCommand")
                .ok_or(SpecError::MissingField("ReadCommand"))?;
            let command = resolve_command(read_command, "Device", false);
            let length_words = read_length_words(read_command);
            let value = match &command {
                Some(cmd) => client.get_string(cmd, length_words).unwrap_or_default(),
                None => String::new(),
            };
            parent.add_child(TagNode::leaf(
                name,
                DataType::String,
                0,
                false,
                Some(Box::new(move || Ok(TagValue::String(value.clone())))),
                None,
            ));
        }
        "Device" => register_device_leaf(client, parent, name, node, "Device", false),
        "GlobalLabel" => register_device_leaf(client, parent, name, node, "Label", true),
        other => return Err(SpecError::UnknownNodeType(other.to_string())),
    }
    Ok(())
}

/// Graft one `UserNodes` entry under `base`, creating any missing `/`
/// separated intermediate containers, per spec §4.4 "User nodes".
pub fn parse_plc_user_node(client: &Arc<SlmpClient>, base: &mut TagNode, node: &Value) -> Result<(), SpecError> {
    let name = node_name(node)?.to_string();
    let parent_path = require_str(node, "Parent")?.to_string();

    let mut cursor = base;
    for segment in parent_path.split('/').filter(|s| !s.is_empty()) {
        if cursor.find_child(segment).is_none() {
            cursor.add_child(TagNode::container(segment.to_string()));
        }
        cursor = cursor.find_child_mut(segment).expect("just ensured present");
    }

    let type_ = node_type(node)?;
    let device_field = if type_ == "GlobalLabel" { "Label" } else { "Device" };
    let is_label = type_ == "GlobalLabel";
    register_device_leaf(client, cursor, name, node, device_field, is_label);
    Ok(())
}

/// Build the full tag tree for one PLC device: the static schema's
/// `Nodes`, then the device's `UserNodes` grafted on top.
pub fn build_device_tree(
    client: &Arc<SlmpClient>,
    device_name: &str,
    schema: &Value,
    user_nodes: &[Value],
) -> Result<TagNode, SpecError> {
    let mut root = TagNode::container(device_name.to_string());
    for node in schema
        .get("Nodes")
        .and_then(Value::as_array)
        .ok_or(SpecError::MissingField("Nodes"))?
    {
        parse_plc_node(client, &mut root, node)?;
    }
    for node in user_nodes {
        parse_plc_user_node(client, &mut root, node)?;
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn client() -> Arc<SlmpClient> {
        use crate::slmp::frame::FrameHeader;
        Arc::new(SlmpClient::new(FrameHeader {
            network_no: 0,
            station_no: 0xFF,
            module_io: 0x3FF,
            multidrop_station_no: 0,
        }))
    }

    /// Spawn a loopback server that replies to one request with a success
    /// end code and the given payload, then returns a client connected to
    /// it (mirrors `slmp::client::tests::stub_device`).
    fn connected_client(reply_payload: Vec<u8>) -> (Arc<SlmpClient>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = sock.read(&mut buf).unwrap();
            assert!(n > 0);
            let mut response = vec![0u8; 9];
            response.extend_from_slice(&0u16.to_le_bytes());
            response.extend_from_slice(&reply_payload);
            sock.write_all(&response).unwrap();
        });
        let client = client();
        client
            .connect("127.0.0.1", addr.port(), Duration::from_secs(1))
            .unwrap();
        (client, server)
    }

    #[test]
    fn bool_array_decodes_eight_bits_per_byte_from_a_word_read() {
        // count = 10 bits needs ceil(10/16) = 1 word read back as one byte
        // (0x05 = bits 0 and 2 set) followed by a second all-zero byte.
        let (client, server) = connected_client(vec![0b0000_0101, 0x00]);
        let command = Command::Device {
            device: crate::slmp::device::Device::M,
            extension: crate::slmp::device::DeviceExtension::None,
            head_no: 0,
        };
        let read = bind_array(Arc::clone(&client), command, DataType::Bool, 10);
        let value = read().unwrap();
        match value {
            TagValue::BoolArray(bits) => {
                assert_eq!(bits.len(), 10);
                assert_eq!(
                    bits,
                    vec![true, false, true, false, false, false, false, false, false, false]
                );
            }
            other => panic!("expected BoolArray, got {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn object_nodes_dedupe_by_name() {
        let client = client();
        let mut root = TagNode::container("root");
        let node: Value = serde_json::json!({"Type": "Object", "Name": "Group", "Children": []});
        parse_plc_node(&client, &mut root, &node).unwrap();
        parse_plc_node(&client, &mut root, &node).unwrap();
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn unknown_device_code_registers_inert_leaf() {
        let client = client();
        let mut root = TagNode::container("root");
        let node: Value = serde_json::json!({
            "Type": "Device",
            "Name": "Bogus",
            "Datatype": "Word",
            "ReadCommand": {"Device": "NOTADEVICE", "Head no": 0}
        });
        parse_plc_node(&client, &mut root, &node).unwrap();
        let leaf = root.find_child("Bogus").unwrap();
        assert_eq!(leaf.read(), Err(crate::error::DeviceFailure));
    }

    #[test]
    fn user_node_creates_missing_parent_path() {
        let client = client();
        let mut root = TagNode::container("root");
        let node: Value = serde_json::json!({
            "Name": "Leaf",
            "Parent": "A/B",
            "Type": "Device",
            "Datatype": "Word",
            "ReadCommand": {"Device": "D", "Head no": 100}
        });
        parse_plc_user_node(&client, &mut root, &node).unwrap();
        let a = root.find_child("A").unwrap();
        let b = a.find_child("B").unwrap();
        assert!(b.find_child("Leaf").is_some());
    }

    #[test]
    fn unknown_node_type_is_an_error() {
        let client = client();
        let mut root = TagNode::container("root");
        let node: Value = serde_json::json!({"Type": "Bogus", "Name": "X"});
        assert!(matches!(
            parse_plc_node(&client, &mut root, &node),
            Err(SpecError::UnknownNodeType(_))
        ));
    }
}
