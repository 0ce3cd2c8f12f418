//! In-memory reference `TagServer`, used by tests and by the gateway when
//! run standalone with no real upstream server attached (spec §9's "exists
//! only to keep children owned for teardown", generalized into an
//! id-keyed arena per that section's "alternative" note).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::DeviceFailure;
use crate::tag::{DataType, ReadCallback, TagValue, WriteCallback};
use crate::tagserver::{NodeId, TagServer};

struct Entry {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    #[allow(dead_code)]
    name: String,
    writeable: bool,
    read: Option<ReadCallback>,
    write: Option<WriteCallback>,
}

struct Arena {
    next_id: u64,
    entries: HashMap<NodeId, Entry>,
}

/// A single process-wide lock guards the whole arena: every add/delete
/// takes it for the duration of the call, per spec §5.
pub struct MemoryTagServer {
    root: NodeId,
    arena: Mutex<Arena>,
}

impl MemoryTagServer {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut entries = HashMap::new();
        entries.insert(
            root,
            Entry {
                parent: None,
                children: Vec::new(),
                name: String::new(),
                writeable: false,
                read: None,
                write: None,
            },
        );
        Self {
            root,
            arena: Mutex::new(Arena {
                next_id: 1,
                entries,
            }),
        }
    }

    fn insert(
        &self,
        parent: NodeId,
        name: &str,
        writeable: bool,
        read: Option<ReadCallback>,
        write: Option<WriteCallback>,
    ) -> NodeId {
        let mut arena = self.arena.lock();
        let id = NodeId(arena.next_id);
        arena.next_id += 1;
        arena.entries.insert(
            id,
            Entry {
                parent: Some(parent),
                children: Vec::new(),
                name: name.to_string(),
                writeable,
                read,
                write,
            },
        );
        if let Some(parent_entry) = arena.entries.get_mut(&parent) {
            parent_entry.children.push(id);
        }
        id
    }
}

impl Default for MemoryTagServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TagServer for MemoryTagServer {
    fn root(&self) -> NodeId {
        self.root
    }

    fn add_container(&self, parent: NodeId, name: &str, _is_folder: bool) -> NodeId {
        self.insert(parent, name, false, None, None)
    }

    fn add_variable(
        &self,
        parent: NodeId,
        name: &str,
        _datatype: DataType,
        count: u32,
        writeable: bool,
        read: Option<ReadCallback>,
        write: Option<WriteCallback>,
    ) -> NodeId {
        let writeable = writeable && write.is_some() && count <= 1;
        self.insert(parent, name, writeable, read, write)
    }

    fn delete_node(&self, node: NodeId, recursive: bool) {
        let mut arena = self.arena.lock();
        let children = arena
            .entries
            .get(&node)
            .map(|entry| entry.children.clone())
            .unwrap_or_default();
        if recursive {
            for child in children {
                drop(arena);
                self.delete_node(child, true);
                arena = self.arena.lock();
            }
        }
        if let Some(entry) = arena.entries.remove(&node) {
            if let Some(parent) = entry.parent {
                if let Some(parent_entry) = arena.entries.get_mut(&parent) {
                    parent_entry.children.retain(|id| *id != node);
                }
            }
        }
    }

    fn dispatch_read(&self, node: NodeId) -> Result<TagValue, DeviceFailure> {
        let callback = {
            let arena = self.arena.lock();
            match arena.entries.get(&node) {
                Some(entry) => entry.read.as_ref().map(|_| ()),
                None => None,
            }
        };
        if callback.is_none() {
            return Err(DeviceFailure);
        }
        // Re-acquire without holding the lock across the callback: the
        // callback talks to a protocol client over the network and must
        // not block other tag-server mutations while it runs.
        let arena = self.arena.lock();
        let entry = arena.entries.get(&node).ok_or(DeviceFailure)?;
        match &entry.read {
            Some(cb) => cb(),
            None => Err(DeviceFailure),
        }
    }

    fn dispatch_write(&self, node: NodeId, value: TagValue) -> Result<(), DeviceFailure> {
        let arena = self.arena.lock();
        let entry = arena.entries.get(&node).ok_or(DeviceFailure)?;
        if !entry.writeable {
            return Err(DeviceFailure);
        }
        match &entry.write {
            Some(cb) => cb(value),
            None => Err(DeviceFailure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_dispatch_read() {
        let server = MemoryTagServer::new();
        let device_root = server.add_container(server.root(), "Device1", false);
        let leaf = server.add_variable(
            device_root,
            "Counter",
            DataType::Word,
            1,
            false,
            Some(Box::new(|| Ok(TagValue::Word(42)))),
            None,
        );
        assert_eq!(server.dispatch_read(leaf), Ok(TagValue::Word(42)));
    }

    #[test]
    fn write_without_binding_fails() {
        let server = MemoryTagServer::new();
        let leaf = server.add_variable(server.root(), "ReadOnly", DataType::Word, 1, false, None, None);
        assert_eq!(
            server.dispatch_write(leaf, TagValue::Word(1)),
            Err(DeviceFailure)
        );
    }

    #[test]
    fn delete_recursive_removes_descendants() {
        let server = MemoryTagServer::new();
        let device_root = server.add_container(server.root(), "Device1", false);
        let child = server.add_container(device_root, "Sub", false);
        let leaf = server.add_variable(child, "X", DataType::Word, 1, false, None, None);
        server.delete_node(device_root, true);
        assert_eq!(server.dispatch_read(leaf), Err(DeviceFailure));
    }
}
