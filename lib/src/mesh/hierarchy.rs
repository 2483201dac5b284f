//! Object tree built from decoded 3DS objects.

use glam::Vec3;
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{DecodeError, Result},
    mesh::{buffers::MeshBuffers, face::DerivedFace},
};

/// Number of slots in a bone-index chain.
pub const BONE_CHAIN_LEN: usize = 4;

/// Nested object-index description of the tree.
///
/// `[parent, child, [parent2, grandchild], ...]`: the head of a list is the
/// parent of every following element; a bare index is a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoneTree {
    Index(u32),
    List(Vec<BoneTree>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(usize);

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: String,
    /// Decoder-assigned object ordinal
    pub index: u32,
    pub center: Vec3,
    pub faces: Vec<DerivedFace>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(index: u32, name: impl Into<String>, center: Vec3, faces: Vec<DerivedFace>) -> Self {
        Self { name: name.into(), index, center, faces, parent: None, children: vec![] }
    }
}

/// Arena of nodes. Parents own their children through `children`;
/// `parent` is a plain index back-reference.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Hierarchy {
    /// Places every object directly under a synthetic empty `root`.
    pub fn flat(objects: Vec<Node>) -> Self {
        let mut hierarchy =
            Self { nodes: vec![Node::new(0, "root", Vec3::ZERO, vec![])], root: NodeId(0) };
        for object in objects {
            let id = hierarchy.push(object);
            hierarchy.attach(hierarchy.root, id);
        }
        hierarchy
    }

    /// Builds the tree described by `bones`. Objects not mentioned are dropped.
    pub fn from_bones(bones: &BoneTree, objects: Vec<Node>) -> Result<Self> {
        let mut pool: Vec<Option<Node>> = objects.into_iter().map(Some).collect();
        let mut hierarchy = Self { nodes: Vec::with_capacity(pool.len()), root: NodeId(0) };
        hierarchy.root = hierarchy.walk(bones, &mut pool)?;
        Ok(hierarchy)
    }

    fn walk(&mut self, bones: &BoneTree, pool: &mut [Option<Node>]) -> Result<NodeId> {
        match bones {
            BoneTree::Index(index) => self.take(*index, pool),
            BoneTree::List(list) => {
                let Some((head, rest)) = list.split_first() else {
                    return Err(DecodeError::MalformedHierarchy("empty list".into()));
                };
                let BoneTree::Index(index) = head else {
                    return Err(DecodeError::MalformedHierarchy(format!(
                        "list must start with an object index, found {head:?}"
                    )));
                };
                let parent = self.take(*index, pool)?;
                for item in rest {
                    let child = self.walk(item, pool)?;
                    self.attach(parent, child);
                }
                Ok(parent)
            }
        }
    }

    fn take(&mut self, index: u32, pool: &mut [Option<Node>]) -> Result<NodeId> {
        let count = pool.len();
        match pool.get_mut(index as usize) {
            Some(slot) => match slot.take() {
                Some(node) => Ok(self.push(node)),
                None => Err(DecodeError::MalformedHierarchy(format!(
                    "object {index} appears more than once"
                ))),
            },
            None => Err(DecodeError::MalformedHierarchy(format!(
                "object {index} does not exist ({count} decoded)"
            ))),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    #[inline]
    pub fn root(&self) -> NodeId { self.root }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node { &self.nodes[id.0] }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Node ids in depth-first pre-order, children in insertion order.
    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev());
        }
        out
    }

    /// Ancestors of `id`, root first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(id).parent;
        while let Some(parent) = cur {
            out.push(parent);
            cur = self.node(parent).parent;
        }
        out.reverse();
        out
    }

    /// Offset from the parent's center, scaled. Zero at the root.
    pub fn local_offset(&self, id: NodeId, scale: f32) -> Vec3 {
        let node = self.node(id);
        match node.parent {
            Some(parent) => (node.center - self.node(parent).center) * scale,
            None => Vec3::ZERO,
        }
    }

    /// Ancestor indices root first, zero-padded to [`BONE_CHAIN_LEN`] slots.
    ///
    /// Chains longer than the slot count keep only their first three entries.
    pub fn bone_chain(&self, id: NodeId) -> [u32; BONE_CHAIN_LEN] {
        let ancestors = self.ancestors(id);
        let keep = if ancestors.len() > BONE_CHAIN_LEN {
            BONE_CHAIN_LEN - 1
        } else {
            ancestors.len()
        };
        let mut chain = [0u32; BONE_CHAIN_LEN];
        for (slot, ancestor) in chain.iter_mut().zip(&ancestors[..keep]) {
            *slot = self.node(*ancestor).index;
        }
        chain
    }

    /// Appends every face, depth-first, re-centered on its node's pivot.
    pub fn write_buffers(&self, scale: f32, out: &mut MeshBuffers) {
        for id in self.pre_order() {
            let node = self.node(id);
            let center = node.center * scale;
            let chain = self.bone_chain(id).map(|i| i as f32);
            for face in &node.faces {
                for corner in &face.corners {
                    out.push_corner(corner, corner.position * scale - center);
                    out.push_bone(chain);
                }
            }
        }
    }

    /// Name-keyed nested description of the tree. Non-root entries carry
    /// `offset` and `index` next to their children.
    pub fn parts(&self, scale: f32) -> Map<String, Value> { self.parts_of(self.root, scale) }

    fn parts_of(&self, id: NodeId, scale: f32) -> Map<String, Value> {
        let node = self.node(id);
        let mut out = Map::new();
        if node.parent.is_some() {
            let offset = self.local_offset(id, scale);
            out.insert("offset".into(), json!([offset.x, offset.y, offset.z]));
            out.insert("index".into(), json!(node.index));
        }
        for &child in &node.children {
            out.insert(self.node(child).name.clone(), Value::Object(self.parts_of(child, scale)));
        }
        out
    }

    /// Renders node names as an indented tree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_into(self.root, 0, &mut out);
        out
    }

    fn outline_into(&self, id: NodeId, indent: usize, out: &mut String) {
        out.push_str(&"  ".repeat(indent));
        out.push_str(&self.node(id).name);
        out.push('\n');
        for &child in &self.node(id).children {
            self.outline_into(child, indent + 1, out);
        }
    }
}
