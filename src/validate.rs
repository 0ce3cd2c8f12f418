//! Static, connection-free validation of `clients.json` and the per-type
//! schema documents, driving the `--validate` CLI flag.
//!
//! This checks only what does not require a live device: JSON structure,
//! required fields per node `Type`, and SLMP device-code decoding. Anything
//! a probe read would resolve at tree-build time — `Folder` dynamic
//! counts, `Object` `Condition` gates, `Property` probes — is left
//! unresolved and reported as skipped, per spec §9 design note (b).

use serde_json::Value;

use crate::slmp::device::decode_device_name;

/// One finding from a validation pass: either a hard configuration error
/// (the schema is malformed) or an informational note about what could
/// not be checked without a live device.
#[derive(Debug, Clone)]
pub struct Finding {
    pub path: String,
    pub message: String,
    pub is_error: bool,
}

fn finding(path: &str, message: impl Into<String>, is_error: bool) -> Finding {
    Finding {
        path: path.to_string(),
        message: message.into(),
        is_error,
    }
}

fn require_field<'a>(node: &'a Value, path: &str, field: &str, findings: &mut Vec<Finding>) -> Option<&'a Value> {
    match node.get(field) {
        Some(value) => Some(value),
        None => {
            findings.push(finding(path, format!("missing required field {field:?}"), true));
            None
        }
    }
}

pub fn validate_plc_schema(schema: &Value) -> Vec<Finding> {
    let mut findings = Vec::new();
    let Some(nodes) = schema.get("Nodes").and_then(Value::as_array) else {
        findings.push(finding("$", "missing required field \"Nodes\"", true));
        return findings;
    };
    for (i, node) in nodes.iter().enumerate() {
        validate_plc_node(node, &format!("Nodes[{i}]"), &mut findings);
    }
    findings
}

fn validate_plc_node(node: &Value, path: &str, findings: &mut Vec<Finding>) {
    let Some(type_) = require_field(node, path, "Type", findings).and_then(Value::as_str) else {
        return;
    };
    require_field(node, path, "Name", findings);
    match type_ {
        "Object" => {
            if let Some(children) = node.get("Children").and_then(Value::as_array) {
                for (i, child) in children.iter().enumerate() {
                    validate_plc_node(child, &format!("{path}.Children[{i}]"), findings);
                }
            }
        }
        "Property" => {
            require_field(node, path, "ReadCommand", findings);
        }
        "Device" | "GlobalLabel" => {
            let device_field = if type_ == "GlobalLabel" { "Label" } else { "Device" };
            require_field(node, path, "Datatype", findings);
            if let Some(read_command) = require_field(node, path, "ReadCommand", findings) {
                if type_ == "Device" {
                    match read_command.get(device_field).and_then(Value::as_str) {
                        Some(device_name) if decode_device_name(device_name).is_none() => {
                            findings.push(finding(
                                path,
                                format!("unknown SLMP device code {device_name:?}"),
                                true,
                            ));
                        }
                        Some(_) => {}
                        None => {
                            findings.push(finding(path, "missing ReadCommand.Device", true));
                        }
                    }
                }
            }
        }
        other => findings.push(finding(path, format!("unknown node type {other:?}"), true)),
    }
}

pub fn validate_robot_schema(schema: &Value) -> Vec<Finding> {
    let mut findings = Vec::new();
    let Some(nodes) = schema.get("Nodes").and_then(Value::as_array) else {
        findings.push(finding("$", "missing required field \"Nodes\"", true));
        return findings;
    };
    for (i, node) in nodes.iter().enumerate() {
        validate_robot_node(node, &format!("Nodes[{i}]"), findings.len(), &mut findings);
    }
    findings
}

fn validate_robot_node(node: &Value, path: &str, _depth: usize, findings: &mut Vec<Finding>) {
    let Some(type_) = require_field(node, path, "Type", findings).and_then(Value::as_str) else {
        return;
    };
    require_field(node, path, "Name", findings);
    match type_ {
        "Folder" => {
            if node.get("Count").map(Value::is_object).unwrap_or(false) {
                findings.push(finding(
                    path,
                    "Count is probe-resolved; child instantiation skipped without a live device",
                    false,
                ));
            }
            require_field(node, path, "FolderChild", findings);
        }
        "Object" => {
            if node.get("Condition").is_some() {
                findings.push(finding(
                    path,
                    "Condition is probe-resolved; subtree may be skipped at connect time",
                    false,
                ));
            }
            if let Some(children) = node.get("Children").and_then(Value::as_array) {
                for (i, child) in children.iter().enumerate() {
                    validate_robot_node(child, &format!("{path}.Children[{i}]"), 0, findings);
                }
            }
        }
        "Property" => {
            if node.get("Value").is_none() && node.get("ReadCommand").is_none() {
                findings.push(finding(path, "Property has neither Value nor ReadCommand", true));
            }
        }
        "EnumProperty" => {
            require_field(node, path, "ReadCommand", findings);
            require_field(node, path, "Cases", findings);
        }
        _ => {
            require_field(node, path, "Datatype", findings);
            require_field(node, path, "ReadCommand", findings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_unknown_plc_device_code() {
        let schema = serde_json::json!({
            "Nodes": [{
                "Type": "Device", "Name": "Bogus", "Datatype": "Word",
                "ReadCommand": {"Device": "NOTADEVICE", "Head no": 0}
            }]
        });
        let findings = validate_plc_schema(&schema);
        assert!(findings.iter().any(|f| f.is_error && f.message.contains("unknown SLMP device code")));
    }

    #[test]
    fn accepts_well_formed_plc_schema() {
        let schema = serde_json::json!({
            "Nodes": [{
                "Type": "Device", "Name": "Ok", "Datatype": "Word",
                "ReadCommand": {"Device": "D", "Head no": 0}
            }]
        });
        let findings = validate_plc_schema(&schema);
        assert!(findings.iter().all(|f| !f.is_error));
    }

    #[test]
    fn notes_probe_resolved_robot_folder_count_without_failing() {
        let schema = serde_json::json!({
            "Nodes": [{
                "Type": "Folder", "Name": "MotionDevices",
                "Count": {"Command": "1;1;MECHA", "Match": "(\\d+)", "Datatype": "Decimal"},
                "FolderChild": {"Type": "Property", "Name": "X", "Value": "{i}"}
            }]
        });
        let findings = validate_robot_schema(&schema);
        assert!(findings.iter().all(|f| !f.is_error));
        assert!(findings.iter().any(|f| f.message.contains("probe-resolved")));
    }

    #[test]
    fn rejects_unknown_node_type() {
        let schema = serde_json::json!({"Nodes": [{"Type": "Bogus", "Name": "X"}]});
        let findings = validate_plc_schema(&schema);
        assert!(findings.iter().any(|f| f.is_error && f.message.contains("unknown node type")));
    }
}
