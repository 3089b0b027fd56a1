//! Reply decoder
//!
//! A reply is read in two passes: first as plain XML, then, after the
//! `<data>` envelope is stripped and its children re-serialized, against the
//! schema registry as instance data. The requested path is then looked up in
//! the resulting instance tree.

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::error::{NetconfError, Result};
use crate::instance_id::{InstancePath, Segment};
use crate::registry::SchemaRegistry;
use crate::schema::{NodeKind, SchemaNode};
use crate::tree::{InstanceNode, InstanceTree, NodeId};
use crate::xml::{ElementId, XmlDocument};

/// Which operation produced the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// `get`: configuration and state data
    Get,
    /// `get-config`: state (`config false`) data is rejected
    GetConfig,
}

/// Outcome of a successful decode
#[derive(Debug, Clone)]
pub enum Decoded {
    /// One or more instances matched the path
    Matches(Selection),
    /// The path is valid but the reply holds nothing at it
    NoData,
}

impl Decoded {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Decoded::NoData)
    }
}

/// The matched nodes together with the tree that owns them
#[derive(Debug, Clone)]
pub struct Selection {
    tree: InstanceTree,
    nodes: Vec<NodeId>,
}

impl Selection {
    pub fn tree(&self) -> &InstanceTree {
        &self.tree
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Matched nodes as JSON; a single match is returned bare
    pub fn to_json(&self) -> Value {
        match self.nodes.as_slice() {
            [single] => self.tree.to_json(*single),
            many => Value::Array(many.iter().map(|id| self.tree.to_json(*id)).collect()),
        }
    }

    /// One entry per match: `name = value` for leaves, XML for subtrees
    pub fn render(&self) -> Result<String> {
        let mut lines = Vec::with_capacity(self.nodes.len());
        for &id in &self.nodes {
            let node = self.tree.get(id);
            if node.kind.is_leaf_like() {
                lines.push(format!("{} = {}", node.name, node.value.as_deref().unwrap_or_default()));
            } else {
                lines.push(self.tree.nodes_to_xml(&[id])?);
            }
        }
        Ok(lines.join("\n"))
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::NoData => f.write_str("no data"),
            Decoded::Matches(selection) => match selection.render() {
                Ok(text) => f.write_str(&text),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

/// The `<data>` element of a reply, inside `<rpc-reply>` or at top level
pub fn payload_root(doc: &XmlDocument) -> Option<ElementId> {
    let first = *doc.roots().first()?;
    if doc.get(first).name == "rpc-reply" {
        doc.child(first, "data")
    } else {
        doc.roots()
            .iter()
            .copied()
            .find(|id| doc.get(*id).name == "data")
    }
}

/// Message of the first `<rpc-error>` in a reply
pub fn rpc_error(doc: &XmlDocument) -> Option<String> {
    let error = doc.descendants_named("rpc-error").into_iter().next()?;
    let message = doc
        .child_text(error, "error-message")
        .filter(|m| !m.is_empty())
        .or_else(|| doc.child_text(error, "error-tag"))
        .unwrap_or("unspecified rpc-error");
    Some(message.to_string())
}

/// Decode a read reply and select the instances at `path`
pub fn decode(
    raw: &str,
    path: &InstancePath,
    registry: &SchemaRegistry,
    mode: DecodeMode,
) -> Result<Decoded> {
    let doc = XmlDocument::parse(raw).map_err(NetconfError::ReplyParse)?;
    if let Some(message) = rpc_error(&doc) {
        return Err(NetconfError::RpcError(message));
    }

    let payload = match payload_root(&doc) {
        Some(data) => doc.get(data).children.clone(),
        None => doc.roots().to_vec(),
    };
    let body = doc.write_siblings(&payload).map_err(NetconfError::ReplyParse)?;
    let instance = XmlDocument::parse(&body).map_err(NetconfError::SchemaReparse)?;
    let tree = reparse(&instance, registry, mode)?;

    registry.schema_path(path).map_err(|i| {
        NetconfError::PathLookup(format!("{}: schema has no node {}", path, path.segments()[i]))
    })?;

    let nodes = lookup(&tree, path, registry);
    debug!(%path, matches = nodes.len(), "decoded reply");
    if nodes.is_empty() {
        Ok(Decoded::NoData)
    } else {
        Ok(Decoded::Matches(Selection { tree, nodes }))
    }
}

/// Build a schema-typed instance tree from generic XML
fn reparse(doc: &XmlDocument, registry: &SchemaRegistry, mode: DecodeMode) -> Result<InstanceTree> {
    let mut tree = InstanceTree::new();
    let mut work: Vec<(ElementId, Option<(NodeId, &SchemaNode)>)> =
        doc.roots().iter().rev().map(|id| (*id, None)).collect();

    while let Some((element_id, parent)) = work.pop() {
        let element = doc.get(element_id);
        let module = match &element.namespace {
            Some(ns) => match registry.module_for_namespace(ns) {
                Some(module) => Some(module),
                None => {
                    debug!(element = %element.name, namespace = %ns, "skipping data from unknown namespace");
                    continue;
                }
            },
            None => None,
        };

        let schema = match parent {
            Some((_, parent_schema)) => {
                match parent_schema.child(&element.name, module.map(|m| m.name.as_str())) {
                    Some(schema) => schema,
                    None => {
                        debug!(parent = %parent_schema.name, element = %element.name, "skipping element not in the schema");
                        continue;
                    }
                }
            }
            None => {
                let found = match module {
                    Some(m) => m.node(&element.name),
                    None => registry
                        .resolve(&element.name)
                        .and_then(|m| m.node(&element.name)),
                };
                match (found, module) {
                    (Some(schema), _) => schema,
                    (None, Some(m)) => {
                        return Err(NetconfError::SchemaReparse(format!(
                            "module {} has no top-level node {}",
                            m.name, element.name
                        )));
                    }
                    (None, None) => {
                        debug!(element = %element.name, "skipping unqualified unknown element");
                        continue;
                    }
                }
            }
        };

        if mode == DecodeMode::GetConfig && !schema.config {
            return Err(NetconfError::SchemaReparse(format!(
                "state data {} in a get-config reply",
                element.name
            )));
        }

        let namespace = registry.namespace_of(&schema.module).unwrap_or_default();
        let mut node = InstanceNode::from_schema(schema, namespace);
        match schema.kind {
            NodeKind::Leaf | NodeKind::LeafList => {
                if !element.children.is_empty() {
                    return Err(NetconfError::SchemaReparse(format!(
                        "leaf {} has element content",
                        element.name
                    )));
                }
                node.value = Some(element.text.clone());
            }
            NodeKind::AnyData => {
                let content = doc
                    .write_siblings(&element.children)
                    .map_err(NetconfError::SchemaReparse)?;
                node.value = Some(format!("{}{}", element.text.trim(), content));
            }
            NodeKind::Container | NodeKind::List => {}
        }

        let id = match parent {
            Some((p, _)) => tree.add_child(p, node),
            None => tree.add_root(node),
        };
        if !schema.kind.is_leaf_like() {
            work.extend(element.children.iter().rev().map(|c| (*c, Some((id, schema)))));
        }
    }

    Ok(tree)
}

/// All nodes of `tree` addressed by `path`, in document order
fn lookup(tree: &InstanceTree, path: &InstancePath, registry: &SchemaRegistry) -> Vec<NodeId> {
    let mut current: Vec<NodeId> = tree.roots().to_vec();
    for (depth, segment) in path.segments().iter().enumerate() {
        let candidates: Vec<NodeId> = if depth == 0 {
            current
        } else {
            current
                .iter()
                .flat_map(|id| tree.get(*id).children.iter().copied())
                .collect()
        };
        current = candidates
            .into_iter()
            .filter(|id| matches_segment(tree, *id, segment, registry))
            .collect();
        if current.is_empty() {
            break;
        }
    }
    current
}

fn matches_segment(tree: &InstanceTree, id: NodeId, segment: &Segment, registry: &SchemaRegistry) -> bool {
    let node = tree.get(id);
    if node.name != segment.name {
        return false;
    }
    if let Some(qualifier) = &segment.prefix {
        if registry
            .module_by_qualifier(qualifier)
            .is_none_or(|m| m.name != node.module)
        {
            return false;
        }
    }

    segment.predicates.iter().all(|p| {
        if p.key == "." {
            return node.value.as_deref().map(str::trim) == Some(p.value.as_str());
        }
        node.children.iter().any(|c| {
            let key = tree.get(*c);
            key.name == p.key && key.value.as_deref().map(str::trim) == Some(p.value.as_str())
        })
    })
}
