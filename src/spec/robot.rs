//! Robot schema loader: walks a `robot-specification.json`-shaped `Nodes`
//! array and a device's `UserNodes` entries, producing a [`TagNode`] tree
//! bound to live [`R3Client`] reads/writes.
//!
//! Mirrors `parse_robot_node` / `parse_robot_user_node` in
//! `examples/original_source/include/robot.h`: `Folder`'s dynamic-count
//! probing, `Object`'s `Condition` gate, `Property`'s one-shot value
//! (literal, parent-name override, or probed), `EnumProperty`'s case
//! lookup with two hard-coded overrides, and the terminal live leaf with
//! its read/write command templates.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::{DeviceFailure, SpecError};
use crate::r3::client::R3Client;
use crate::r3::extract::EnumCase;
use crate::r3::{extract, template_fmt};
use crate::tag::{DataType, ReadCallback, TagNode, TagValue, WriteCallback};

fn require_str<'a>(node: &'a Value, field: &'static str) -> Result<&'a str, SpecError> {
    node.get(field)
        .and_then(Value::as_str)
        .ok_or(SpecError::MissingField(field))
}

/// A read (or write) command template plus the replication indices it is
/// instantiated with, mirroring `R3::Command`.
#[derive(Clone)]
struct CommandTemplate {
    body: String,
    pattern: String,
    mecha_no: i64,
    task_slot_no: i64,
    id: i64,
}

impl CommandTemplate {
    fn format(&self, j: i64) -> (String, String) {
        let command = template_fmt::format_command(&self.body, self.mecha_no, self.task_slot_no, self.id, j);
        let pattern = template_fmt::format_match(&self.pattern, self.id);
        (command, pattern)
    }
}

fn command_template(read_command: &Value, mecha_no: i64, task_slot_no: i64, id: i64) -> Result<CommandTemplate, SpecError> {
    Ok(CommandTemplate {
        body: require_str(read_command, "Command")?.to_string(),
        pattern: read_command.get("Match").and_then(Value::as_str).unwrap_or("").to_string(),
        mecha_no,
        task_slot_no,
        id,
    })
}

fn probe_string(client: &R3Client, template: &CommandTemplate) -> String {
    let (command, pattern) = template.format(0);
    let regex = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return String::new(),
    };
    client.get_string(&command).ok().and_then(|answer| {
        extract::extract_string(&answer, &regex).ok()
    }).unwrap_or_default()
}

fn probe_matches(client: &R3Client, template: &CommandTemplate) -> bool {
    let (command, pattern) = template.format(0);
    let regex = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return false,
    };
    client
        .get_string(&command)
        .map(|answer| regex.is_match(&answer))
        .unwrap_or(false)
}

fn datatype_from(name: &str) -> Option<DataType> {
    match name {
        "Double" => Some(DataType::Double),
        "Float" => Some(DataType::Float),
        "Int32" | "HexInt32" => Some(DataType::Int32),
        "Int64" => Some(DataType::Int64),
        "UInt32" => Some(DataType::UInt32),
        "UInt64" => Some(DataType::UInt64),
        "Bool" => Some(DataType::Bool),
        "String" | "LocalizedText" => Some(DataType::String),
        "Enum" => Some(DataType::Enum),
        "Position" => Some(DataType::Position),
        "Joint" => Some(DataType::Joint),
        _ => None,
    }
}

fn bind_scalar_read(
    client: Arc<R3Client>,
    template: CommandTemplate,
    datatype_name: String,
    position: u32,
    cases: Vec<EnumCase>,
) -> ReadCallback {
    Box::new(move || {
        let (command, pattern) = template.format(0);
        let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
        match datatype_name.as_str() {
            "Double" => client.get_f64(&command, &regex).map(TagValue::Double).map_err(|_| DeviceFailure),
            "Float" => client.get_f32(&command, &regex).map(TagValue::Float).map_err(|_| DeviceFailure),
            "Int32" => client.get_i32(&command, &regex).map(TagValue::Int32).map_err(|_| DeviceFailure),
            "HexInt32" => client.get_hex_i32(&command, &regex).map(TagValue::Int32).map_err(|_| DeviceFailure),
            "Int64" => client.get_i64(&command, &regex).map(TagValue::Int64).map_err(|_| DeviceFailure),
            "UInt32" => client.get_u32(&command, &regex).map(TagValue::UInt32).map_err(|_| DeviceFailure),
            "UInt64" => client.get_u64(&command, &regex).map(TagValue::UInt64).map_err(|_| DeviceFailure),
            "Bool" => {
                let has_match = !pattern.is_empty();
                client
                    .get_bool(&command, has_match.then_some(&regex), position)
                    .map(TagValue::Bool)
                    .map_err(|_| DeviceFailure)
            }
            "String" | "LocalizedText" => client
                .get_string(&command)
                .map_err(|_| DeviceFailure)
                .and_then(|answer| extract::extract_string(&answer, &regex).map_err(|_| DeviceFailure))
                .map(TagValue::String),
            "Enum" => {
                let answer = client.get_string(&command).map_err(|_| DeviceFailure)?;
                let captured = extract::extract_string(&answer, &regex).unwrap_or(answer);
                let default = cases
                    .iter()
                    .find(|c| c.pattern == "Default")
                    .cloned()
                    .unwrap_or(EnumCase { pattern: String::new(), label: "Default".to_string(), value: -1 });
                let non_default: Vec<EnumCase> = cases.iter().filter(|c| c.pattern != "Default").cloned().collect();
                let (label, value) = extract::resolve_enum(&captured, &non_default, &default).map_err(|_| DeviceFailure)?;
                Ok(TagValue::Enum { label, value })
            }
            _ => Err(DeviceFailure),
        }
    })
}

fn bind_array_read(client: Arc<R3Client>, template: CommandTemplate, datatype_name: String, count: u32) -> ReadCallback {
    Box::new(move || match datatype_name.as_str() {
        "Position" => {
            let (command, pattern) = template.format(0);
            let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
            client.get_position(&command, &regex).map(TagValue::Position).map_err(|_| DeviceFailure)
        }
        "Joint" => {
            let (command, pattern) = template.format(0);
            let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
            client.get_joint(&command, &regex).map(TagValue::Joint).map_err(|_| DeviceFailure)
        }
        "Double" => {
            let mut values = Vec::with_capacity(count as usize);
            for j in 1..=count as i64 {
                let (command, pattern) = template.format(j);
                let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
                values.push(client.get_f64(&command, &regex).map_err(|_| DeviceFailure)?);
            }
            Ok(TagValue::DoubleArray(values))
        }
        "Int32" => {
            let mut values = Vec::with_capacity(count as usize);
            for j in 1..=count as i64 {
                let (command, pattern) = template.format(j);
                let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
                values.push(client.get_i32(&command, &regex).map_err(|_| DeviceFailure)?);
            }
            Ok(TagValue::Int32Array(values))
        }
        "String" => {
            let mut values = Vec::with_capacity(count as usize);
            for j in 1..=count as i64 {
                let (command, pattern) = template.format(j);
                let regex = Regex::new(&pattern).map_err(|_| DeviceFailure)?;
                let answer = client.get_string(&command).map_err(|_| DeviceFailure)?;
                values.push(extract::extract_string(&answer, &regex).unwrap_or(answer));
            }
            Ok(TagValue::StringArray(values))
        }
        _ => Err(DeviceFailure),
    })
}

fn bind_write(client: Arc<R3Client>, template: CommandTemplate) -> WriteCallback {
    Box::new(move |value| {
        let rendered = match value {
            TagValue::Double(v) => v.to_string(),
            TagValue::Int32(v) => v.to_string(),
            TagValue::UInt32(v) => v.to_string(),
            _ => return Err(DeviceFailure),
        };
        let command = template_fmt::format_write_command(&template.body, template.mecha_no, template.task_slot_no, template.id, &rendered);
        client.execute(&command).map_err(|_| DeviceFailure)
    })
}

/// Parse the terminal (non-Folder/Object/Property/EnumProperty) leaf
/// shared by the schema and user-node loaders. The write command's
/// mecha/task-slot numbers are threaded independently from the read
/// command's: the schema loader always writes with `task_slot_no = 1`
/// (the original's write-side `R3::Command` never threads it), while the
/// user-node loader parses both sides out of their own command strings.
#[allow(clippy::too_many_arguments)]
fn register_terminal_leaf(
    client: &Arc<R3Client>,
    parent: &mut TagNode,
    name: String,
    node: &Value,
    mecha_no: i64,
    task_slot_no: i64,
    id: i64,
    write_mecha_no: i64,
    write_task_slot_no: i64,
) -> Result<(), SpecError> {
    let count = node.get("Count").and_then(Value::as_u64).unwrap_or(0) as u32;
    let datatype_name = require_str(node, "Datatype")?.to_string();
    let datatype = datatype_from(&datatype_name).unwrap_or(DataType::String);
    let (count, is_fixed_array) = match datatype_name.as_str() {
        "Position" => (10, true),
        "Joint" => (8, true),
        _ => (count, false),
    };
    let read_command = node.get("ReadCommand").ok_or(SpecError::MissingField("ReadCommand"))?;
    let template = command_template(read_command, mecha_no, task_slot_no, id)?;
    let position = node.get("Position").and_then(Value::as_u64).unwrap_or(0) as u32;
    let cases = node
        .get("Cases")
        .and_then(Value::as_object)
        .map(|cases| {
            cases
                .iter()
                .map(|(key, value)| EnumCase {
                    pattern: key.clone(),
                    label: value.get("EnumString").and_then(Value::as_str).unwrap_or_default().to_string(),
                    value: value.get("Value").and_then(Value::as_i64).unwrap_or(-1),
                })
                .collect()
        })
        .unwrap_or_default();

    let writeable = node.get("Writeable").and_then(Value::as_bool).unwrap_or(false) && count == 0;
    let write = if writeable {
        let write_command = node.get("WriteCommand").ok_or(SpecError::MissingField("WriteCommand"))?;
        let write_template = CommandTemplate {
            body: require_str(write_command, "Command")?.to_string(),
            pattern: String::new(),
            mecha_no,
            task_slot_no: 1,
            id,
        };
        Some(bind_write(Arc::clone(client), write_template))
    } else {
        None
    };

    let read = if is_fixed_array || count > 1 {
        Some(bind_array_read(Arc::clone(client), template, datatype_name, count))
    } else {
        Some(bind_scalar_read(Arc::clone(client), template, datatype_name, position, cases))
    };

    parent.add_child(TagNode::leaf(name, datatype, count, writeable, read, write));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn parse_robot_node(
    client: &Arc<R3Client>,
    parent: &mut TagNode,
    node: &Value,
    mecha_no: &mut i64,
    task_slot_no: &mut i64,
    id: i64,
) -> Result<(), SpecError> {
    let type_ = require_str(node, "Type")?;
    let raw_name = require_str(node, "Name")?;
    let name = template_fmt::format_name(raw_name, id);

    match type_ {
        "Folder" => {
            if name == "AdditionalComponents" && *mecha_no != 1 {
                return Ok(());
            }
            parent.add_child(TagNode::container(name.clone()));
            let count = if node.get("Count").map(Value::is_object).unwrap_or(false) {
                let count_spec = node.get("Count").expect("checked above");
                let template = command_template(count_spec, *mecha_no, *task_slot_no, 0)?;
                let (command, pattern) = template.format(0);
                let regex = Regex::new(&pattern).map_err(|_| SpecError::MissingField("Match"))?;
                let datatype = count_spec.get("Datatype").and_then(Value::as_str).unwrap_or("");
                match datatype {
                    "BitCount" => client
                        .get_hex_i64(&command, &regex)
                        .map(|v| (v as u16).count_ones() as u32)
                        .unwrap_or(0),
                    "HexUInt" => client.get_hex_i64(&command, &regex).unwrap_or(0) as u32,
                    _ => client.get_u64(&command, &regex).unwrap_or(0) as u32,
                }
            } else {
                node.get("Count").and_then(Value::as_u64).unwrap_or(0) as u32
            };
            let folder_child = node.get("FolderChild").ok_or(SpecError::MissingField("FolderChild"))?;
            let container = parent.find_child_mut(&name).expect("just added");
            for i in 0..count {
                parse_robot_node(client, container, folder_child, mecha_no, task_slot_no, i as i64 + 1)?;
                if name == "MotionDevices" {
                    *mecha_no += 1;
                } else if name == "TaskControls" {
                    *task_slot_no += 1;
                }
            }
        }
        "Object" => {
            if let Some(condition) = node.get("Condition") {
                let template = command_template(condition, *mecha_no, *task_slot_no, id)?;
                if !probe_matches(client, &template) {
                    return Ok(());
                }
            }
            parent.add_child(TagNode::container(name.clone()));
            let container = parent.find_child_mut(&name).expect("just added");
            for child in node.get("Children").and_then(Value::as_array).into_iter().flatten() {
                parse_robot_node(client, container, child, mecha_no, task_slot_no, id)?;
            }
        }
        "Property" => {
            let value = if let Some(literal) = node.get("Value").and_then(Value::as_str) {
                template_fmt::render(literal, &[("i", id.to_string())])
            } else if name == "Model" && parent.name.contains("MotionDevice_") && parent.name != "MotionDevice_1" {
                "USER".to_string()
            } else {
                let read_command = node.get("ReadCommand").ok_or(SpecError::MissingField("ReadCommand"))?;
                let template = command_template(read_command, *mecha_no, *task_slot_no, id)?;
                probe_string(client, &template)
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
        "EnumProperty" => {
            let read_command = node.get("ReadCommand").ok_or(SpecError::MissingField("ReadCommand"))?;
            let template = command_template(read_command, *mecha_no, *task_slot_no, id)?;
            let answer = probe_string(client, &template);
            let cases = node.get("Cases").ok_or(SpecError::MissingField("Cases"))?;
            let (label, value) = if name == "MotionProfile" && *mecha_no == 1 && id == 3 && Regex::new("^[rR][hH]").unwrap().is_match(&answer) {
                ("LINEAR".to_string(), 3)
            } else if name == "MotionDeviceCategory" && *mecha_no != 1 {
                ("OTHER".to_string(), 0)
            } else {
                let mut resolved = None;
                if let Some(obj) = cases.as_object() {
                    for (key, case_value) in obj {
                        if key == "Default" {
                            continue;
                        }
                        if Regex::new(key).map(|re| re.is_match(&answer)).unwrap_or(false) {
                            resolved = Some((
                                case_value.get("EnumString").and_then(Value::as_str).unwrap_or_default().to_string(),
                                case_value.get("Value").and_then(Value::as_i64).unwrap_or(-1),
                            ));
                            break;
                        }
                    }
                }
                resolved.unwrap_or_else(|| {
                    let default = &cases["Default"];
                    (
                        default.get("EnumString").and_then(Value::as_str).unwrap_or_default().to_string(),
                        default.get("Value").and_then(Value::as_i64).unwrap_or(-1),
                    )
                })
            };
            parent.add_child(TagNode::leaf(
                name,
                DataType::Enum,
                0,
                false,
                Some(Box::new(move || Ok(TagValue::Enum { label: label.clone(), value }))),
                None,
            ));
        }
        "" => unreachable!(),
        _ => {
            register_terminal_leaf(client, parent, name, node, *mecha_no, *task_slot_no, id)?;
        }
    }
    Ok(())
}

/// Extract a leading `"{mecha};{slot};"` prefix from a command string,
/// defaulting to `(1, 1)` when absent, per spec §4.4 "User nodes".
fn leading_mecha_slot(command: &str) -> (i64, i64) {
    static DEFAULT: (i64, i64) = (1, 1);
    let re = match Regex::new(r"^(\d{1,2});(\d{1,2});") {
        Ok(re) => re,
        Err(_) => return DEFAULT,
    };
    match re.captures(command) {
        Some(caps) => {
            let mecha = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            let slot = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(1);
            (mecha, slot)
        }
        None => DEFAULT,
    }
}

pub fn parse_robot_user_node(client: &Arc<R3Client>, base: &mut TagNode, node: &Value) -> Result<(), SpecError> {
    let name = require_str(node, "Name")?.to_string();
    let parent_path = require_str(node, "Parent")?.to_string();

    let mut cursor = base;
    for segment in parent_path.split('/').filter(|s| !s.is_empty()) {
        if cursor.find_child(segment).is_none() {
            cursor.add_child(TagNode::container(segment.to_string()));
        }
        cursor = cursor.find_child_mut(segment).expect("just ensured present");
    }

    let read_command = node.get("ReadCommand").ok_or(SpecError::MissingField("ReadCommand"))?;
    let read_body = require_str(read_command, "Command")?;
    let (mecha_no, task_slot_no) = leading_mecha_slot(read_body);
    register_terminal_leaf(client, cursor, name, node, mecha_no, task_slot_no, 0)
}

/// Build the full tag tree for one robot device.
pub fn build_device_tree(client: &Arc<R3Client>, device_name: &str, schema: &Value, user_nodes: &[Value]) -> Result<TagNode, SpecError> {
    let mut root = TagNode::container(device_name.to_string());
    let mut mecha_no = 1i64;
    let mut task_slot_no = 1i64;
    for node in schema.get("Nodes").and_then(Value::as_array).ok_or(SpecError::MissingField("Nodes"))? {
        mecha_no = 1;
        task_slot_no = 1;
        parse_robot_node(client, &mut root, node, &mut mecha_no, &mut task_slot_no, 0)?;
    }
    for node in user_nodes {
        if let Err(err) = parse_robot_user_node(client, &mut root, node) {
            warn!(device = device_name, error = %err, "skipping malformed robot user node");
        }
    }
    Ok(root)
}
