//! Schema registry and runtime schema discovery
//!
//! The registry owns every YANG module loaded for the current session. It is
//! filled once by [`SchemaRegistry::discover`], which asks the device for its
//! `netconf-state/schemas` list and fetches each YANG module with
//! `get-schema`, and is read-only afterwards except for [`SchemaRegistry::register`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use quick_xml::escape::escape;
use tracing::{debug, info, warn};

use crate::decoder::{payload_root, rpc_error};
use crate::error::{NetconfError, Result};
use crate::instance_id::{InstancePath, Segment};
use crate::schema::{Compiler, Module, SchemaNode, augment_target, find_node};
use crate::session::SharedSession;
use crate::xml::XmlDocument;

/// Namespace of the ietf-netconf-monitoring module
pub const MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

/// Modules describing the schema list itself; never fetched
const SKIPPED_MODULES: [&str; 2] = ["ietf-yang-library", "ietf-netconf-monitoring"];

const GET_SCHEMAS: &str = concat!(
    "<get><filter type=\"subtree\">",
    "<netconf-state xmlns=\"urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring\"><schemas/></netconf-state>",
    "</filter></get>"
);

/// Discovery behaviour
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Log per-module fetch and parse problems at `warn` instead of `debug`
    pub verbose_schema_logs: bool,
}

/// One entry of the device's schema list
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaInfo {
    pub identifier: String,
    pub version: String,
    pub format: String,
    pub namespace: String,
    pub location: String,
}

impl SchemaInfo {
    fn get_schema_rpc(&self) -> String {
        format!(
            "<get-schema xmlns=\"{}\"><identifier>{}</identifier><version>{}</version><format>{}</format></get-schema>",
            MONITORING_NS,
            escape(self.identifier.as_str()),
            escape(self.version.as_str()),
            escape(self.format.as_str()),
        )
    }
}

/// Loaded YANG modules, by name
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    modules: BTreeMap<String, Module>,
    /// Schema node name -> owning module, shallowest definition first
    owners: HashMap<String, String>,
    /// `(module, augment index)` pairs already applied or rejected
    applied_augments: HashSet<(String, usize)>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover and load the device's YANG modules.
    ///
    /// Fails only if the schema list itself cannot be fetched or read; a module
    /// that cannot be fetched or parsed is logged and skipped.
    pub async fn discover(session: &SharedSession, options: &DiscoveryOptions) -> Result<Self> {
        let reply = session
            .execute(GET_SCHEMAS)
            .await
            .map_err(|e| NetconfError::SchemaFetch(e.to_string()))?;
        let schemas = parse_schema_list(&reply.data)?;
        info!(count = schemas.len(), "device announced schemas");

        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        for schema in schemas {
            if schema.format != "yang" || SKIPPED_MODULES.contains(&schema.identifier.as_str()) {
                continue;
            }
            if !seen.insert((schema.identifier.clone(), schema.version.clone())) {
                debug!(module = %schema.identifier, version = %schema.version, "duplicate schema entry");
                continue;
            }

            match fetch_module(session, &schema).await {
                Ok(module) => modules.push(module),
                Err(e) => log_problem(options, &schema.identifier, &e),
            }
        }

        let mut registry = Self::new();
        for (name, err) in registry.load(modules) {
            log_problem(options, &name, &err);
        }
        info!(modules = registry.len(), "schema registry ready");
        Ok(registry)
    }

    /// Register one more module (and apply pending augments)
    pub fn register(&mut self, module: Module) -> Result<()> {
        match self.load(vec![module]).into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }

    /// Parse and register a module from YANG source
    pub fn register_source(&mut self, source: &str) -> Result<()> {
        self.register(Module::from_source(source)?)
    }

    /// Insert and compile a batch of modules. Returns the modules that failed.
    fn load(&mut self, modules: Vec<Module>) -> Vec<(String, NetconfError)> {
        let mut failures = Vec::new();
        let mut added = Vec::new();
        for module in modules {
            if self.modules.contains_key(&module.name) {
                debug!(module = %module.name, "module already registered");
                continue;
            }
            added.push(module.name.clone());
            self.modules.insert(module.name.clone(), module);
        }

        let compiled: Vec<(String, std::result::Result<Vec<SchemaNode>, String>)> = {
            let compiler = Compiler::new(&self.modules);
            added
                .iter()
                .map(|name| (name.clone(), compiler.compile_module(&self.modules[name])))
                .collect()
        };
        for (name, result) in compiled {
            match result {
                Ok(nodes) => {
                    if let Some(module) = self.modules.get_mut(&name) {
                        module.nodes = nodes;
                    }
                }
                Err(reason) => {
                    self.modules.remove(&name);
                    failures.push((
                        name.clone(),
                        NetconfError::SchemaParse {
                            module: name,
                            reason,
                        },
                    ));
                }
            }
        }

        for (name, err) in self.apply_augments() {
            failures.push((name, err));
        }
        self.rebuild_index();
        failures
    }

    /// Apply every augment whose target module is loaded
    fn apply_augments(&mut self) -> Vec<(String, NetconfError)> {
        let mut failures = Vec::new();
        let pending: Vec<(String, usize)> = self
            .modules
            .values()
            .flat_map(|m| (0..m.augments().count()).map(move |i| (m.name.clone(), i)))
            .filter(|key| !self.applied_augments.contains(key))
            .collect();

        for (name, index) in pending {
            let planned = {
                let module = &self.modules[&name];
                let Some(augment) = module.augments().nth(index) else {
                    continue;
                };
                let steps = match augment_target(module, augment.arg()) {
                    Ok(steps) => steps,
                    Err(reason) => {
                        self.applied_augments.insert((name.clone(), index));
                        failures.push((name.clone(), NetconfError::SchemaParse { module: name, reason }));
                        continue;
                    }
                };
                let Some((target_module, _)) = steps.first() else {
                    continue;
                };
                if !self.modules.contains_key(target_module) {
                    // retried when the target module is registered
                    continue;
                }
                let target_config = match self.navigate_steps(&steps) {
                    Some(node) => node.config,
                    None => {
                        self.applied_augments.insert((name.clone(), index));
                        failures.push((
                            name.clone(),
                            NetconfError::SchemaParse {
                                module: name,
                                reason: format!("augment target {} not found", augment.arg()),
                            },
                        ));
                        continue;
                    }
                };
                Compiler::new(&self.modules)
                    .compile_augment(module, augment, target_config)
                    .map(|nodes| (steps, nodes))
            };

            self.applied_augments.insert((name.clone(), index));
            match planned {
                Ok((steps, nodes)) => {
                    if let Some(target) = self.navigate_steps_mut(&steps) {
                        debug!(module = %name, count = nodes.len(), "applied augment");
                        target.children.extend(nodes);
                    }
                }
                Err(reason) => failures.push((name.clone(), NetconfError::SchemaParse { module: name, reason })),
            }
        }
        failures
    }

    fn navigate_steps(&self, steps: &[(String, String)]) -> Option<&SchemaNode> {
        let (first_module, first) = steps.first()?;
        let mut node = self.modules.get(first_module)?.node(first)?;
        for (module, name) in &steps[1..] {
            // choice and case names do not exist in the compiled tree
            if let Some(child) = node.child(name, Some(module)) {
                node = child;
            }
        }
        Some(node)
    }

    fn navigate_steps_mut(&mut self, steps: &[(String, String)]) -> Option<&mut SchemaNode> {
        let (first_module, first) = steps.first()?;
        let module = self.modules.get_mut(first_module)?;
        let mut node = module.nodes.iter_mut().find(|n| &n.name == first)?;
        for (module, name) in &steps[1..] {
            let position = node
                .children
                .iter()
                .position(|c| &c.name == name && &c.module == module);
            if let Some(i) = position {
                node = &mut node.children[i];
            }
        }
        Some(node)
    }

    fn rebuild_index(&mut self) {
        self.owners.clear();
        let mut queue: VecDeque<&SchemaNode> =
            self.modules.values().flat_map(|m| m.nodes.iter()).collect();
        while let Some(node) = queue.pop_front() {
            self.owners
                .entry(node.name.clone())
                .or_insert_with(|| node.module.clone());
            queue.extend(node.children.iter());
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Module by name
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Module by name, or by its own prefix
    pub fn module_by_qualifier(&self, qualifier: &str) -> Option<&Module> {
        self.modules
            .get(qualifier)
            .or_else(|| self.modules.values().find(|m| m.prefix == qualifier))
    }

    /// The module owning a schema node name (`name`, `module:name`, or a full
    /// path segment with predicates). A miss only means the name cannot be
    /// namespace-qualified.
    pub fn resolve(&self, segment: &str) -> Option<&Module> {
        let head = segment.split('[').next().unwrap_or(segment).trim();
        match head.split_once(':') {
            Some((qualifier, _)) => self.module_by_qualifier(qualifier),
            None => self.owners.get(head).and_then(|m| self.modules.get(m)),
        }
    }

    /// Schema nodes for every segment of `path`, or the index of the first
    /// segment the schema does not define
    pub fn schema_path(&self, path: &InstancePath) -> std::result::Result<Vec<&SchemaNode>, usize> {
        match self.schema_path_prefix(path) {
            (chain, None) => Ok(chain),
            (_, Some(failed)) => Err(failed),
        }
    }

    /// Schema nodes for the longest resolvable prefix of `path`, plus the
    /// index of the first unresolvable segment if there is one
    pub fn schema_path_prefix(&self, path: &InstancePath) -> (Vec<&SchemaNode>, Option<usize>) {
        let mut chain: Vec<&SchemaNode> = Vec::with_capacity(path.len());
        for (i, segment) in path.segments().iter().enumerate() {
            let qualifier = match &segment.prefix {
                Some(q) => match self.module_by_qualifier(q) {
                    Some(module) => Some(module.name.as_str()),
                    None => return (chain, Some(i)),
                },
                None => None,
            };
            let node = match chain.last() {
                Some(parent) => parent.child(&segment.name, qualifier),
                None => self.top_level(segment, qualifier),
            };
            match node {
                Some(node) => chain.push(node),
                None => return (chain, Some(i)),
            }
        }
        (chain, None)
    }

    fn top_level(&self, segment: &Segment, qualifier: Option<&str>) -> Option<&SchemaNode> {
        match qualifier {
            Some(module) => self.modules.get(module).and_then(|m| m.node(&segment.name)),
            None => self
                .modules
                .values()
                .find_map(|m| find_node(&m.nodes, &segment.name, None)),
        }
    }

    /// XML namespace of a module
    pub fn namespace_of(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(|m| m.namespace.as_str())
    }

    /// Module owning a namespace URI
    pub fn module_for_namespace(&self, namespace: &str) -> Option<&Module> {
        self.modules.values().find(|m| m.namespace == namespace)
    }
}

fn log_problem(options: &DiscoveryOptions, module: &str, err: &NetconfError) {
    if options.verbose_schema_logs {
        warn!(module, error = %err, "skipping YANG module");
    } else {
        debug!(module, error = %err, "skipping YANG module");
    }
}

/// Read the `netconf-state/schemas` reply
pub fn parse_schema_list(xml: &str) -> Result<Vec<SchemaInfo>> {
    let doc = XmlDocument::parse(xml).map_err(|reason| NetconfError::SchemaParse {
        module: "ietf-netconf-monitoring".into(),
        reason,
    })?;
    if let Some(message) = rpc_error(&doc) {
        return Err(NetconfError::SchemaFetch(message));
    }

    Ok(doc
        .descendants_named("schema")
        .into_iter()
        .filter_map(|id| {
            let text = |name: &str| doc.child_text(id, name).unwrap_or_default().to_string();
            let identifier = text("identifier");
            (!identifier.is_empty()).then(|| SchemaInfo {
                identifier,
                version: text("version"),
                format: text("format"),
                namespace: text("namespace"),
                location: text("location"),
            })
        })
        .collect())
}

async fn fetch_module(session: &SharedSession, schema: &SchemaInfo) -> Result<Module> {
    debug!(
        module = %schema.identifier,
        version = %schema.version,
        namespace = %schema.namespace,
        location = %schema.location,
        "fetching schema"
    );
    let reply = session
        .execute(&schema.get_schema_rpc())
        .await
        .map_err(|e| NetconfError::SchemaFetch(format!("{}: {}", schema.identifier, e)))?;

    let parse_err = |reason: String| NetconfError::SchemaParse {
        module: schema.identifier.clone(),
        reason,
    };
    let doc = XmlDocument::parse(&reply.data).map_err(parse_err)?;
    if let Some(message) = rpc_error(&doc) {
        return Err(NetconfError::SchemaFetch(format!("{}: {}", schema.identifier, message)));
    }
    let root = payload_root(&doc).ok_or_else(|| parse_err("empty get-schema reply".into()))?;
    Module::from_source(&doc.get(root).text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::*;
    use crate::session::{Reply, TransportError};
    use crate::testing::MockSession;
    use quick_xml::escape::escape;
    use std::sync::Arc;

    fn schema_entry(id: &str, version: &str, format: &str) -> String {
        format!(
            "<schema><identifier>{id}</identifier><version>{version}</version><format>{format}</format>\
             <namespace>urn:{id}</namespace><location>NETCONF</location></schema>"
        )
    }

    fn schema_list(entries: &[String]) -> Reply {
        Reply::new(format!(
            "<data><netconf-state xmlns=\"{MONITORING_NS}\"><schemas>{}</schemas></netconf-state></data>",
            entries.concat()
        ))
    }

    fn schema_source(source: &str) -> Reply {
        Reply::new(format!(
            "<data xmlns=\"{MONITORING_NS}\">{}</data>",
            escape(source)
        ))
    }

    fn registry_with(sources: &[&str]) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        for src in sources {
            registry.register_source(src).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_discover_registers_yang_modules() {
        let mock = Arc::new(MockSession::new());
        mock.on(
            "<schemas/>",
            schema_list(&[
                schema_entry("ietf-interfaces", "2018-02-20", "yang"),
                schema_entry("ietf-interfaces", "2018-02-20", "yin"),
                schema_entry("ietf-ip", "2018-02-22", "yang"),
                schema_entry("ietf-yang-library", "2019-01-04", "yang"),
            ]),
        );
        mock.on("<identifier>ietf-interfaces<", schema_source(IETF_INTERFACES));
        mock.on("<identifier>ietf-ip<", schema_source(IETF_IP));

        let session = SharedSession::new(mock.clone());
        let registry = SchemaRegistry::discover(&session, &DiscoveryOptions::default())
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(mock.count("<get-schema"), 2);
        assert_eq!(mock.count("ietf-yang-library"), 0);
        let interface = registry
            .module("ietf-interfaces")
            .and_then(|m| m.node("interfaces"))
            .and_then(|n| n.child("interface", None))
            .unwrap();
        let ipv4 = interface.child("ipv4", Some("ietf-ip")).unwrap();
        assert_eq!(ipv4.module, "ietf-ip");
    }

    #[tokio::test]
    async fn test_discover_fetches_duplicates_once() {
        let mock = Arc::new(MockSession::new());
        let entry = schema_entry("ietf-interfaces", "2018-02-20", "yang");
        mock.on("<schemas/>", schema_list(&[entry.clone(), entry]));
        mock.on("<get-schema", schema_source(IETF_INTERFACES));

        let session = SharedSession::new(mock.clone());
        let registry = SchemaRegistry::discover(&session, &DiscoveryOptions::default())
            .await
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(mock.count("<get-schema"), 1);
    }

    #[tokio::test]
    async fn test_discover_skips_broken_module() {
        let mock = Arc::new(MockSession::new());
        mock.on(
            "<schemas/>",
            schema_list(&[
                schema_entry("broken", "1", "yang"),
                schema_entry("unreachable", "1", "yang"),
                schema_entry("ietf-interfaces", "2018-02-20", "yang"),
            ]),
        );
        mock.on("<identifier>broken<", schema_source("module broken {"));
        mock.fail_on("<identifier>unreachable<", TransportError::Io("reset".into()));
        mock.on("<identifier>ietf-interfaces<", schema_source(IETF_INTERFACES));

        let session = SharedSession::new(mock.clone());
        let options = DiscoveryOptions {
            verbose_schema_logs: true,
        };
        let registry = SchemaRegistry::discover(&session, &options).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.module("ietf-interfaces").is_some());
    }

    #[tokio::test]
    async fn test_discover_fails_without_schema_list() {
        let mock = Arc::new(MockSession::new());
        mock.fail_on("<schemas/>", TransportError::Closed);
        let session = SharedSession::new(mock);

        let err = SchemaRegistry::discover(&session, &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::SchemaFetch(_)));
    }

    #[tokio::test]
    async fn test_discover_rejects_malformed_schema_list() {
        let mock = Arc::new(MockSession::new());
        mock.on("<schemas/>", Reply::new("<data><netconf-state>"));
        let session = SharedSession::new(mock);

        let err = SchemaRegistry::discover(&session, &DiscoveryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::SchemaParse { .. }));
    }

    #[test]
    fn test_augment_applied_when_target_arrives_later() {
        let registry = registry_with(&[IETF_IP, IETF_INTERFACES]);
        let path = InstancePath::parse("/interfaces/interface/ipv4/forwarding").unwrap();
        let chain = registry.schema_path(&path).unwrap();
        assert_eq!(chain[2].module, "ietf-ip");
        assert_eq!(chain[3].name, "forwarding");
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = registry_with(&[IETF_INTERFACES]);
        registry
            .register_source("module ietf-interfaces { namespace urn:other; prefix o; }")
            .unwrap();
        assert_eq!(
            registry.namespace_of("ietf-interfaces"),
            Some("urn:ietf:params:xml:ns:yang:ietf-interfaces")
        );
    }

    #[test]
    fn test_resolve() {
        let registry = registry_with(&[IETF_INTERFACES, IETF_IP]);
        assert_eq!(registry.resolve("interfaces").unwrap().name, "ietf-interfaces");
        assert_eq!(
            registry.resolve("interface[name='eth0']").unwrap().name,
            "ietf-interfaces"
        );
        assert_eq!(registry.resolve("ipv4").unwrap().name, "ietf-ip");
        assert_eq!(registry.resolve("ip:anything").unwrap().name, "ietf-ip");
        assert!(registry.resolve("nonexistent").is_none());
    }

    #[test]
    fn test_schema_path_reports_failing_segment() {
        let registry = registry_with(&[IETF_INTERFACES]);
        let path = InstancePath::parse("/interfaces/interface/bogus").unwrap();
        assert_eq!(registry.schema_path(&path).unwrap_err(), 2);

        let qualified = InstancePath::parse("/nope:interfaces").unwrap();
        assert_eq!(registry.schema_path(&qualified).unwrap_err(), 0);
    }

    #[test]
    fn test_parse_schema_list() {
        let reply = schema_list(&[schema_entry("a", "1", "yang")]);
        let list = parse_schema_list(&reply.data).unwrap();
        assert_eq!(
            list,
            vec![SchemaInfo {
                identifier: "a".into(),
                version: "1".into(),
                format: "yang".into(),
                namespace: "urn:a".into(),
                location: "NETCONF".into(),
            }]
        );
    }
}
