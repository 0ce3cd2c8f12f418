//! `clients.json` loading: a hand-rolled `//` / `/* */` comment stripper
//! in front of `serde_json`, mirroring `nlohmann::json::parse(..., true)`'s
//! comment-tolerant mode in `original_source` without pulling in a second
//! JSON engine.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SpecError;

/// Strip `//line` and `/* block */` comments that fall outside string
/// literals, leaving everything else — including newlines, for accurate
/// error line numbers — untouched.
pub fn strip_json_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some((_, c)) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                chars.next();
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn load_json_with_comments(path: &Path) -> Result<Value, SpecError> {
    let raw = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stripped = strip_json_comments(&raw);
    serde_json::from_str(&stripped).map_err(|source| SpecError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientsFile {
    #[serde(rename = "Clients")]
    pub clients: Vec<ClientEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    #[serde(rename = "Type")]
    pub kind: ClientKind,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Ip")]
    pub ip: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Destination network No.")]
    pub network_no: Option<u8>,
    #[serde(rename = "Destination station No.")]
    pub station_no: Option<u8>,
    #[serde(rename = "Destination Module I/O")]
    pub module_io: Option<u16>,
    #[serde(rename = "Destination multidrop station No.")]
    pub multidrop_station_no: Option<u8>,
    #[serde(rename = "UserNodes", default)]
    pub user_nodes: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ClientKind {
    #[serde(rename = "Robot")]
    Robot,
    #[serde(rename = "PLC")]
    Plc,
}

pub fn load_clients_file(path: &Path) -> Result<ClientsFile, SpecError> {
    let value = load_json_with_comments(path)?;
    serde_json::from_value(value).map_err(|source| SpecError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_and_block_comments_outside_strings() {
        let input = "{\n  // a comment\n  \"a\": 1, /* block */ \"b\": \"http://not-a-comment\"\n}";
        let stripped = strip_json_comments(input);
        let value: Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["b"], "http://not-a-comment");
    }

    #[test]
    fn parses_minimal_clients_file() {
        let input = r#"{
            "Clients": [
                { "Type": "PLC", "Name": "Line1", "Ip": "10.0.0.1", "Port": 5000 }
            ]
        }"#;
        let value: Value = serde_json::from_str(input).unwrap();
        let clients: ClientsFile = serde_json::from_value(value).unwrap();
        assert_eq!(clients.clients.len(), 1);
        assert_eq!(clients.clients[0].kind, ClientKind::Plc);
    }
}
