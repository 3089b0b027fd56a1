//! Schema-typed instance data trees
//!
//! Nodes live in a flat arena owned by the tree and refer to each other by
//! index; the whole tree is freed as a unit. Every walk over it is iterative.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde_json::{Map, Value};

use crate::error::{NetconfError, Result};
use crate::schema::{NodeKind, SchemaNode};
use crate::types::{YangType, cast_leaf_value};

/// Index of a node inside its [`InstanceTree`]
pub type NodeId = usize;

/// One instance data node
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceNode {
    pub name: String,
    pub kind: NodeKind,
    /// Module defining the node
    pub module: String,
    pub namespace: String,
    pub value: Option<String>,
    pub yang_type: Option<YangType>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl InstanceNode {
    /// A node for `schema`, in namespace `namespace`, without a value
    pub fn from_schema(schema: &SchemaNode, namespace: &str) -> Self {
        Self {
            name: schema.name.clone(),
            kind: schema.kind,
            module: schema.module.clone(),
            namespace: namespace.to_string(),
            value: None,
            yang_type: schema.yang_type.clone(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Leaf value rendered according to its type
    pub fn typed_value(&self) -> Value {
        match (&self.value, &self.yang_type) {
            (Some(v), Some(t)) => cast_leaf_value(v, t),
            (Some(v), None) => Value::String(v.clone()),
            (None, _) => Value::Null,
        }
    }
}

/// An ownership tree of instance nodes; may have several roots
#[derive(Debug, Clone, Default)]
pub struct InstanceTree {
    nodes: Vec<InstanceNode>,
    roots: Vec<NodeId>,
}

impl InstanceTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, mut node: InstanceNode) -> NodeId {
        node.parent = None;
        let id = self.nodes.len();
        self.nodes.push(node);
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, mut node: InstanceNode) -> NodeId {
        node.parent = Some(parent);
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn get(&self, id: NodeId) -> &InstanceNode {
        &self.nodes[id]
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        self.nodes[id].value = Some(value.into());
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Serialize the whole tree
    pub fn to_xml(&self) -> Result<String> {
        self.nodes_to_xml(&self.roots)
    }

    /// Serialize the given nodes and their subtrees as sibling XML.
    ///
    /// A node declares its namespace when it differs from its parent's.
    pub fn nodes_to_xml(&self, ids: &[NodeId]) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        let mut work: Vec<(NodeId, bool)> = ids.iter().rev().map(|id| (*id, false)).collect();

        while let Some((id, closing)) = work.pop() {
            let node = &self.nodes[id];
            if closing {
                writer
                    .write_event(Event::End(BytesEnd::new(node.name.as_str())))
                    .map_err(encode_err)?;
                continue;
            }

            let mut start = BytesStart::new(node.name.as_str());
            let inherited = if ids.contains(&id) {
                None
            } else {
                node.parent.map(|p| self.nodes[p].namespace.as_str())
            };
            if inherited != Some(node.namespace.as_str()) && !node.namespace.is_empty() {
                start.push_attribute(("xmlns", node.namespace.as_str()));
            }

            match &node.value {
                Some(value) if node.children.is_empty() && !value.is_empty() => {
                    writer.write_event(Event::Start(start)).map_err(encode_err)?;
                    writer
                        .write_event(Event::Text(BytesText::new(value)))
                        .map_err(encode_err)?;
                    writer
                        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
                        .map_err(encode_err)?;
                }
                _ if node.children.is_empty() => {
                    writer.write_event(Event::Empty(start)).map_err(encode_err)?;
                }
                _ => {
                    writer.write_event(Event::Start(start)).map_err(encode_err)?;
                    work.push((id, true));
                    work.extend(node.children.iter().rev().map(|c| (*c, false)));
                }
            }
        }

        String::from_utf8(writer.into_inner()).map_err(encode_err)
    }

    /// Render a node as JSON: leaves as typed values, interior nodes as
    /// objects, repeated list / leaf-list entries as arrays
    pub fn to_json(&self, id: NodeId) -> Value {
        // pre-order, reversed: every node comes after all of its descendants
        let mut order = Vec::new();
        let mut work = vec![id];
        while let Some(n) = work.pop() {
            order.push(n);
            work.extend(self.nodes[n].children.iter().copied());
        }

        let mut rendered: Vec<Option<Value>> = vec![None; self.nodes.len()];
        for &n in order.iter().rev() {
            let node = &self.nodes[n];
            if node.kind.is_leaf_like() {
                rendered[n] = Some(node.typed_value());
                continue;
            }

            let mut map = Map::new();
            for &child in &node.children {
                let c = &self.nodes[child];
                let value = rendered[child].take().unwrap_or(Value::Null);
                if matches!(c.kind, NodeKind::List | NodeKind::LeafList) {
                    match map
                        .entry(c.name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()))
                    {
                        Value::Array(items) => items.push(value),
                        other => *other = Value::Array(vec![other.take(), value]),
                    }
                } else {
                    map.insert(c.name.clone(), value);
                }
            }
            rendered[n] = Some(Value::Object(map));
        }
        rendered[id].take().unwrap_or(Value::Null)
    }
}

fn encode_err(e: impl std::fmt::Display) -> NetconfError {
    NetconfError::PathEncoding(e.to_string())
}
