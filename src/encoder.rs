//! Path-to-tree encoder
//!
//! Turns an instance path (plus a value, for edits) into a minimal instance
//! tree shaped by the schema, and serializes it as the XML body of an RPC.

use tracing::debug;

use crate::error::{NetconfError, Result};
use crate::instance_id::{InstancePath, Segment};
use crate::registry::SchemaRegistry;
use crate::schema::{NodeKind, SchemaNode};
use crate::tree::{InstanceNode, InstanceTree, NodeId};

/// How much of the path ends up in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Every segment, down to a leaf carrying the value (edit-config)
    Exact,
    /// The deepest constructible prefix ending at a non-leaf node (subtree filters)
    Filter,
}

/// Builds instance trees against a schema registry
#[derive(Debug, Clone, Copy)]
pub struct Encoder<'r> {
    registry: &'r SchemaRegistry,
}

impl<'r> Encoder<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Encode `path` as XML: exact mode with a value, filter mode without
    pub fn build_fragment(&self, path: &InstancePath, value: Option<&str>) -> Result<String> {
        let tree = match value {
            Some(v) => self.build_exact(path, v)?,
            None => self.build_filter(path)?,
        };
        tree.to_xml()
    }

    /// Tree containing exactly the path's nodes, the last one holding `value`
    pub fn build_exact(&self, path: &InstancePath, value: &str) -> Result<InstanceTree> {
        let chain = self.registry.schema_path(path).map_err(|i| {
            NetconfError::PathEncoding(format!(
                "{}: no schema node for {}",
                path,
                path.segments()[i]
            ))
        })?;
        let leaf = chain[chain.len() - 1];
        if !leaf.kind.is_leaf_like() {
            return Err(NetconfError::PathEncoding(format!(
                "{}: {} is not a leaf and cannot hold a value",
                path, leaf.name
            )));
        }

        self.build(path.segments(), &chain, EncodeMode::Exact, Some(value))
            .map_err(|reason| NetconfError::PathEncoding(format!("{}: {}", path, reason)))
    }

    /// Deepest subtree-filter tree for `path`.
    ///
    /// Prefixes of the path are tried from the root down; the last one that
    /// builds and ends at a container or list wins.
    pub fn build_filter(&self, path: &InstancePath) -> Result<InstanceTree> {
        let (chain, usable) = match self.registry.schema_path_prefix(path) {
            (chain, None) => {
                let n = chain.len();
                (chain, n)
            }
            (chain, Some(failed)) => (chain, failed),
        };

        let mut best = None;
        for depth in 1..=usable {
            if chain[depth - 1].kind.is_leaf_like() {
                continue;
            }
            match self.build(&path.segments()[..depth], &chain[..depth], EncodeMode::Filter, None) {
                Ok(tree) => best = Some(tree),
                Err(reason) => {
                    debug!(%path, depth, %reason, "filter prefix not constructible");
                }
            }
        }

        best.ok_or_else(|| {
            NetconfError::PathEncoding(format!("{}: no container prefix can be built", path))
        })
    }

    fn build(
        &self,
        segments: &[Segment],
        chain: &[&SchemaNode],
        mode: EncodeMode,
        value: Option<&str>,
    ) -> std::result::Result<InstanceTree, String> {
        let mut tree = InstanceTree::new();
        let mut parent: Option<NodeId> = None;
        let last = segments.len() - 1;

        for (i, (segment, schema)) in segments.iter().zip(chain).enumerate() {
            let id = self.attach(&mut tree, parent, schema);

            match schema.kind {
                NodeKind::List => self.add_keys(&mut tree, id, segment, schema, mode)?,
                NodeKind::LeafList => {
                    if let Some(entry) = segment.predicate(".") {
                        tree.set_value(id, entry);
                    }
                    reject_keys(segment, &["."])?;
                }
                _ => reject_keys(segment, &[])?,
            }

            if i == last {
                if let Some(v) = value {
                    // a key leaf already carries the value of its list predicate
                    if let Some(fixed) = tree.get(id).value.as_deref() {
                        if fixed != v {
                            return Err(format!(
                                "{} is a list key fixed to '{}' by the path",
                                schema.name, fixed
                            ));
                        }
                    }
                    tree.set_value(id, v);
                }
            }
            parent = Some(id);
        }

        Ok(tree)
    }

    /// Add a node for `schema` under `parent`, reusing a key leaf created from
    /// a predicate of the parent list
    fn attach(&self, tree: &mut InstanceTree, parent: Option<NodeId>, schema: &SchemaNode) -> NodeId {
        let namespace = self.registry.namespace_of(&schema.module).unwrap_or_default();
        match parent {
            None => tree.add_root(InstanceNode::from_schema(schema, namespace)),
            Some(p) => {
                let existing = tree
                    .get(p)
                    .children
                    .iter()
                    .copied()
                    .find(|c| tree.get(*c).name == schema.name);
                match existing {
                    Some(id) => id,
                    None => tree.add_child(p, InstanceNode::from_schema(schema, namespace)),
                }
            }
        }
    }

    fn add_keys(
        &self,
        tree: &mut InstanceTree,
        entry: NodeId,
        segment: &Segment,
        list: &SchemaNode,
        mode: EncodeMode,
    ) -> std::result::Result<(), String> {
        let keys: Vec<&str> = list.keys.iter().map(String::as_str).collect();
        reject_keys(segment, &keys)?;

        for key in &list.keys {
            match segment.predicate(key) {
                Some(value) => {
                    let schema = list
                        .child(key, None)
                        .ok_or_else(|| format!("list {} has no key leaf {}", list.name, key))?;
                    let id = self.attach(tree, Some(entry), schema);
                    tree.set_value(id, value);
                }
                None if mode == EncodeMode::Exact => {
                    return Err(format!("list {} needs a value for key {}", list.name, key));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// `xmlns:<module>='<namespace>'` for the module of every schema node on
    /// the path, in path order. Segments past the resolvable prefix are skipped.
    pub fn namespace_declarations(&self, path: &InstancePath) -> String {
        let (chain, _) = self.registry.schema_path_prefix(path);
        let mut decls: Vec<String> = Vec::new();
        for node in chain {
            if let Some(namespace) = self.registry.namespace_of(&node.module) {
                let decl = format!("xmlns:{}='{}'", node.module, namespace);
                if !decls.contains(&decl) {
                    decls.push(decl);
                }
            }
        }
        decls.join(" ")
    }
}

fn reject_keys(segment: &Segment, allowed: &[&str]) -> std::result::Result<(), String> {
    match segment
        .predicates
        .iter()
        .find(|p| !allowed.contains(&p.key.as_str()))
    {
        Some(p) => Err(format!("{} has no key {}", segment.name, p.key)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::*;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register_source(IETF_INTERFACES).unwrap();
        registry.register_source(IETF_IP).unwrap();
        registry
    }

    fn path(p: &str) -> InstancePath {
        InstancePath::parse(p).unwrap()
    }

    const IF_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-interfaces";

    #[test]
    fn test_exact_leaf_under_keyed_list() {
        let registry = registry();
        let xml = Encoder::new(&registry)
            .build_fragment(&path("/interfaces/interface[name='eth0']/enabled"), Some("true"))
            .unwrap();
        assert_eq!(
            xml,
            format!(
                "<interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name><enabled>true</enabled></interface></interfaces>"
            )
        );
    }

    #[test]
    fn test_exact_augmented_leaf_switches_namespace() {
        let registry = registry();
        let xml = Encoder::new(&registry)
            .build_fragment(
                &path("/interfaces/interface[name='eth0']/ipv4/forwarding"),
                Some("false"),
            )
            .unwrap();
        assert!(xml.contains(
            "<ipv4 xmlns=\"urn:ietf:params:xml:ns:yang:ietf-ip\"><forwarding>false</forwarding></ipv4>"
        ));
    }

    #[test]
    fn test_exact_key_leaf_is_not_duplicated() {
        let registry = registry();
        let tree = Encoder::new(&registry)
            .build_exact(&path("/interfaces/interface[name='eth0']/name"), "eth0")
            .unwrap();
        let entry = tree.get(tree.roots()[0]).children[0];
        assert_eq!(tree.get(entry).children.len(), 1);
    }

    #[test]
    fn test_exact_rejects_changing_list_key() {
        let registry = registry();
        let err = Encoder::new(&registry)
            .build_exact(&path("/interfaces/interface[name='eth0']/name"), "eth1")
            .unwrap_err();
        assert!(matches!(err, NetconfError::PathEncoding(ref m) if m.contains("list key")));
    }

    #[test]
    fn test_exact_errors() {
        let registry = registry();
        let encoder = Encoder::new(&registry);
        for (p, why) in [
            ("/interfaces/interface/enabled", "missing key"),
            ("/interfaces/interface[name='eth0']", "not a leaf"),
            ("/interfaces/interface[name='eth0']/bogus", "unknown node"),
            ("/interfaces/interface[nope='x']/enabled", "unknown key"),
        ] {
            assert!(
                matches!(encoder.build_exact(&path(p), "v"), Err(NetconfError::PathEncoding(_))),
                "{why}"
            );
        }
    }

    #[test]
    fn test_filter_stops_at_nearest_container() {
        let registry = registry();
        let xml = Encoder::new(&registry)
            .build_fragment(&path("/interfaces/interface[name='eth0']/enabled"), None)
            .unwrap();
        assert_eq!(
            xml,
            format!("<interfaces xmlns=\"{IF_NS}\"><interface><name>eth0</name></interface></interfaces>")
        );
    }

    #[test]
    fn test_filter_never_ends_at_leaf() {
        let registry = registry();
        let encoder = Encoder::new(&registry);
        for (p, leaf, expected_tail) in [
            ("/interfaces/interface[name='eth0']/mtu", "<mtu", "<name>eth0</name></interface>"),
            ("/interfaces/interface[name='eth0']/tag", "<tag", "<name>eth0</name></interface>"),
            (
                "/interfaces/interface[name='eth0']/statistics/in-octets",
                "<in-octets",
                "<statistics/></interface>",
            ),
            (
                "/interfaces/interface[name='eth0']/ipv4/forwarding",
                "<forwarding",
                "<ipv4 xmlns=\"urn:ietf:params:xml:ns:yang:ietf-ip\"/></interface>",
            ),
        ] {
            let xml = encoder.build_fragment(&path(p), None).unwrap();
            assert!(!xml.contains(leaf), "{p}: {xml}");
            assert!(xml.ends_with(&format!("{expected_tail}</interfaces>")), "{p}: {xml}");
        }
    }

    #[test]
    fn test_filter_keeps_longest_resolvable_prefix() {
        let registry = registry();
        let xml = Encoder::new(&registry)
            .build_fragment(&path("/interfaces/interface/no-such-node/deeper"), None)
            .unwrap();
        assert_eq!(
            xml,
            format!("<interfaces xmlns=\"{IF_NS}\"><interface/></interfaces>")
        );
    }

    #[test]
    fn test_filter_without_any_container_fails() {
        let registry = registry();
        let err = Encoder::new(&registry)
            .build_filter(&path("/unknown/path"))
            .unwrap_err();
        assert!(matches!(err, NetconfError::PathEncoding(_)));
    }

    #[test]
    fn test_namespace_declarations() {
        let registry = registry();
        let decls = Encoder::new(&registry).namespace_declarations(&path(
            "/interfaces/interface[name='eth0']/ipv4/unknown-leaf",
        ));
        assert_eq!(
            decls,
            format!(
                "xmlns:ietf-interfaces='{IF_NS}' xmlns:ietf-ip='urn:ietf:params:xml:ns:yang:ietf-ip'"
            )
        );
    }

    #[test]
    fn test_namespace_declarations_follow_schema_nodes() {
        let mut registry = registry();
        // example-system reuses the counters grouping, so it defines in-octets too
        registry.register_source(SYSTEM).unwrap();
        let decls = Encoder::new(&registry).namespace_declarations(&path(
            "/interfaces/interface[name='eth0']/statistics/in-octets",
        ));
        assert_eq!(decls, format!("xmlns:ietf-interfaces='{IF_NS}'"));
    }
}
