//! The tag-server trait boundary: four operations the spec requires of the
//! (external, not-implemented-here) collaborator that exposes the unified
//! tag tree to supervisory clients, per spec §6 "Tag-server surface".
//!
//! `memory` provides an in-process reference implementation sufficient for
//! tests and for running the gateway standalone without a real upstream
//! server attached.

pub mod memory;

use crate::error::DeviceFailure;
use crate::tag::{DataType, ReadCallback, TagValue, WriteCallback};

/// Opaque handle to a registered node, assigned by the tag-server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// The operations a device supervisor needs from the tag-server.
///
/// Implementors must be `Send + Sync` and serialize their own mutations
/// (spec §5: "mutation must be serialised with a process-wide lock held
/// for the duration of each add/delete operation").
pub trait TagServer: Send + Sync {
    /// The tag-server's own root node, the ancestor of every device root.
    fn root(&self) -> NodeId;

    fn add_container(&self, parent: NodeId, name: &str, is_folder: bool) -> NodeId;

    #[allow(clippy::too_many_arguments)]
    fn add_variable(
        &self,
        parent: NodeId,
        name: &str,
        datatype: DataType,
        count: u32,
        writeable: bool,
        read: Option<ReadCallback>,
        write: Option<WriteCallback>,
    ) -> NodeId;

    fn delete_node(&self, node: NodeId, recursive: bool);

    /// Look up `node`'s registered read callback and invoke it, mirroring
    /// an external client's read dispatch.
    fn dispatch_read(&self, node: NodeId) -> Result<TagValue, DeviceFailure>;

    /// As [`TagServer::dispatch_read`], for writes.
    fn dispatch_write(&self, node: NodeId, value: TagValue) -> Result<(), DeviceFailure>;
}
