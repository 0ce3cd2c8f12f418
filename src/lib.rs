//! # gatectl
//!
//! A gateway exposing MELSEC SLMP PLCs and R3 robot controllers through a
//! single, unified tag tree: a blocking SLMP client for the binary 3E
//! frame protocol, a blocking R3 client for the ASCII robot-controller
//! protocol, and a device supervisor that builds each device's subtree
//! from a declarative JSON specification document and keeps it live.

pub mod cli;
pub mod error;
pub mod logging;
pub mod r3;
pub mod slmp;
pub mod spec;
pub mod supervisor;
pub mod tag;
pub mod tagserver;
pub mod transport;
pub mod validate;

pub use error::{DeviceFailure, SlmpError, SpecError, SupervisorError, TransportError, R3Error};
pub use supervisor::Supervisor;
pub use tag::{DataType, ReadCallback, TagKind, TagNode, TagValue, WriteCallback};
pub use tagserver::{memory::MemoryTagServer, NodeId, TagServer};
pub use transport::Transport;

/// The current version of gatectl.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
