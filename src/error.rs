//! Crate-wide error types.
//!
//! Each subsystem gets its own `thiserror` enum rather than one giant error
//! type, mirroring how the teacher crate separates `IpcError` (transport)
//! from `AgentError`-style per-binary errors.

use thiserror::Error;

/// Errors from the blocking transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the SLMP client.
#[derive(Debug, Error)]
pub enum SlmpError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("response too short ({0} bytes)")]
    ShortResponse(usize),
    #[error("device answered with non-zero end code {0:#06x}")]
    EndCode(u16),
    #[error("unknown device code {0:?}")]
    UnknownDevice(String),
}

/// Errors from the R3 client.
#[derive(Debug, Error)]
pub enum R3Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("reply did not start with QoK/Qok")]
    NotAcknowledged,
    #[error("response did not match pattern {0:?}")]
    NoMatch(String),
}

/// Errors from loading `clients.json` and the per-type schema documents.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json in {path}: {source}")]
    Json {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing required field {0:?}")]
    MissingField(&'static str),
    #[error("unknown node type {0:?}")]
    UnknownNodeType(String),
}

/// Errors surfaced by the device supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// The status a tag-server read/write callback returns instead of a value
/// when the owning device cannot service the request (disconnected, a
/// protocol error, or a write type the binding doesn't accept). Distinct
/// from the protocol-level error enums above: those carry diagnostic
/// detail for logging, this is the opaque status the external caller sees.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("device failure")]
pub struct DeviceFailure;
