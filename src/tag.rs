//! The tag tree node model shared by both protocol loaders.
//!
//! A stripped-down version of `PLCNode`/`RobotNode` in
//! `examples/original_source/include/{plc,robot}.h`: those store a live
//! `UA_NodeId` plus a recursive `children` vector and look nodes up by
//! open62541 identifier. Here identity and storage belong to the
//! `tagserver` module (the external collaborator this crate only stubs);
//! `TagNode` itself stays a plain, owned description of one point in the
//! tree, per design note §9 ("the in-core tree exists only to keep
//! children owned for teardown").

use crate::error::DeviceFailure;
use crate::tagserver::{NodeId, TagServer};

/// What a leaf carries and how an external client should interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Bool,
    Int16,
    Word,
    Int32,
    DWord,
    Float,
    Double,
    String,
    Int64,
    UInt32,
    UInt64,
    Position,
    Joint,
    Enum,
}

/// A read or write result carried across the tag-server boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Int16(i16),
    Word(u16),
    Int32(i32),
    DWord(u32),
    Float(f32),
    Double(f64),
    String(String),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    /// `(a, b, c, ...)` with the last two slots reserved for trailing
    /// `(fl1, fl2)` flags, present only if the device sent them.
    Position([f64; 10]),
    Joint([f64; 8]),
    Enum { label: String, value: i64 },

    // Array leaves (`count > 1`): one callback invocation returns every
    // element, per spec §4.2's "Numeric scalar/array" and §4.3's
    // per-element array read loop.
    BoolArray(Vec<bool>),
    Int16Array(Vec<i16>),
    WordArray(Vec<u16>),
    Int32Array(Vec<i32>),
    DWordArray(Vec<u32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
}

pub type ReadCallback = Box<dyn Fn() -> Result<TagValue, DeviceFailure> + Send + Sync>;
pub type WriteCallback = Box<dyn Fn(TagValue) -> Result<(), DeviceFailure> + Send + Sync>;

/// What kind of node this is: a pure grouping node, or a leaf bound to
/// protocol callbacks (scalar or array, per its `count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Container,
    ScalarLeaf,
    ArrayLeaf,
}

/// One node in a device's tag tree.
///
/// `id` is the external tag-server's handle, assigned when the node is
/// registered; it has no meaning before registration (default zero). The
/// callbacks are `None` for containers and for leaves that were skipped due
/// to a configuration error (per spec §4.4/§7: the tag still exists, reads
/// on it just always fail).
pub struct TagNode {
    pub id: u64,
    pub name: String,
    pub kind: TagKind,
    pub datatype: Option<DataType>,
    pub count: u32,
    pub writeable: bool,
    pub read: Option<ReadCallback>,
    pub write: Option<WriteCallback>,
    pub children: Vec<TagNode>,
}

impl TagNode {
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            kind: TagKind::Container,
            datatype: None,
            count: 0,
            writeable: false,
            read: None,
            write: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(
        name: impl Into<String>,
        datatype: DataType,
        count: u32,
        writeable: bool,
        read: Option<ReadCallback>,
        write: Option<WriteCallback>,
    ) -> Self {
        let writeable = writeable && write.is_some() && count <= 1;
        Self {
            id: 0,
            name: name.into(),
            kind: if count > 1 {
                TagKind::ArrayLeaf
            } else {
                TagKind::ScalarLeaf
            },
            datatype: Some(datatype),
            count,
            writeable,
            read,
            write,
            children: Vec::new(),
        }
    }

    /// First child with this name, per spec §3: "lookup-by-name returns
    /// the first match" — duplicates are a configuration concern for the
    /// loader, not for this lookup.
    pub fn find_child(&self, name: &str) -> Option<&TagNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut TagNode> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    pub fn add_child(&mut self, child: TagNode) -> &mut TagNode {
        self.children.push(child);
        self.children.last_mut().expect("just pushed")
    }

    /// Invoke the read callback, or the spec's "benign default" for a leaf
    /// with none (e.g. a binding skipped for an unknown device code).
    pub fn read(&self) -> Result<TagValue, DeviceFailure> {
        match &self.read {
            Some(cb) => cb(),
            None => Err(DeviceFailure),
        }
    }

    pub fn write_value(&self, value: TagValue) -> Result<(), DeviceFailure> {
        if !self.writeable {
            return Err(DeviceFailure);
        }
        match &self.write {
            Some(cb) => cb(value),
            None => Err(DeviceFailure),
        }
    }

    /// Consume a loader-built tree, registering every node under `parent`
    /// with `server` and returning the freshly assigned root id.
    ///
    /// This is the bridge between the loader modules (`spec::plc`,
    /// `spec::robot`), which build a plain owned `TagNode` tree, and the
    /// external tag-server boundary, which assigns real ids and owns
    /// structure for teardown (design note §9: "the in-core tree exists
    /// only to keep children owned for teardown").
    pub fn register(self, server: &dyn TagServer, parent: NodeId) -> NodeId {
        match self.kind {
            TagKind::Container => {
                let id = server.add_container(parent, &self.name, true);
                for child in self.children {
                    child.register(server, id);
                }
                id
            }
            TagKind::ScalarLeaf | TagKind::ArrayLeaf => server.add_variable(
                parent,
                &self.name,
                self.datatype.unwrap_or(DataType::Word),
                self.count,
                self.writeable,
                self.read,
                self.write,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagserver::memory::MemoryTagServer;

    #[test]
    fn register_walks_containers_and_invokes_leaf_reads() {
        let mut root = TagNode::container("Device1");
        let mut group = TagNode::container("Group");
        group.add_child(TagNode::leaf(
            "Counter",
            DataType::Word,
            1,
            false,
            Some(Box::new(|| Ok(TagValue::Word(7)))),
            None,
        ));
        root.add_child(group);

        let server = MemoryTagServer::new();
        let device_root = root.register(&server, server.root());
        // MemoryTagServer assigns ids sequentially depth-first as nodes
        // are registered: 1 = Device1, 2 = Group, 3 = Counter.
        assert_eq!(device_root.0, 1);
        assert_eq!(server.dispatch_read(NodeId(3)), Ok(TagValue::Word(7)));
    }

    #[test]
    fn find_child_returns_first_match() {
        let mut root = TagNode::container("root");
        root.add_child(TagNode::container("dup"));
        root.add_child(TagNode::container("dup"));
        assert_eq!(root.children.len(), 2);
        assert!(root.find_child("dup").is_some());
        assert!(root.find_child("missing").is_none());
    }

    #[test]
    fn leaf_is_writeable_only_with_write_binding_and_scalar_count() {
        let writeable_leaf = TagNode::leaf(
            "x",
            DataType::Word,
            1,
            true,
            None,
            Some(Box::new(|_| Ok(()))),
        );
        assert!(writeable_leaf.writeable);

        let array_leaf = TagNode::leaf(
            "y",
            DataType::Word,
            4,
            true,
            None,
            Some(Box::new(|_| Ok(()))),
        );
        assert!(!array_leaf.writeable);

        let no_write_cb = TagNode::leaf("z", DataType::Word, 1, true, None, None);
        assert!(!no_write_cb.writeable);
    }

    #[test]
    fn read_with_no_binding_is_a_device_failure() {
        let leaf = TagNode::leaf("unbound", DataType::Word, 1, false, None, None);
        assert_eq!(leaf.read(), Err(DeviceFailure));
    }
}
