//! Compiled YANG schema model
//!
//! A [`Module`] is parsed from YANG source once and never changes afterwards,
//! except for nodes contributed to its tree by other modules' `augment`
//! statements. Only data-definition statements are compiled; groupings are
//! expanded in place and `choice`/`case` levels are flattened because they do
//! not appear in instance data.

use std::collections::{BTreeMap, HashMap};

use crate::error::{NetconfError, Result};
use crate::types::YangType;
use crate::yang::{self, Statement};

const MAX_USES_DEPTH: usize = 32;

/// Kind of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    /// `anydata`/`anyxml`: opaque content
    AnyData,
}

impl NodeKind {
    /// Whether the node carries a scalar value rather than children
    pub fn is_leaf_like(self) -> bool {
        matches!(self, NodeKind::Leaf | NodeKind::LeafList | NodeKind::AnyData)
    }
}

/// A data-definition node in a compiled module tree
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub name: String,
    pub kind: NodeKind,
    /// Module that defines this node; determines its XML namespace
    pub module: String,
    /// `false` for state data
    pub config: bool,
    /// List keys in declaration order
    pub keys: Vec<String>,
    pub yang_type: Option<YangType>,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// Find a child by name, optionally restricted to the defining module
    pub fn child(&self, name: &str, module: Option<&str>) -> Option<&SchemaNode> {
        find_node(&self.children, name, module)
    }
}

pub(crate) fn find_node<'a>(
    nodes: &'a [SchemaNode],
    name: &str,
    module: Option<&str>,
) -> Option<&'a SchemaNode> {
    nodes
        .iter()
        .find(|n| n.name == name && module.is_none_or(|m| n.module == m))
}

/// A loaded YANG module
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    /// Latest revision date, used as the module version
    pub revision: Option<String>,
    pub namespace: String,
    pub prefix: String,
    /// Import prefix -> module name
    pub imports: HashMap<String, String>,
    /// Top-level data nodes (including nodes augmented in by other modules)
    pub nodes: Vec<SchemaNode>,
    statement: Statement,
}

impl Module {
    /// Parse module source text. Data nodes are compiled on registration.
    pub fn from_source(source: &str) -> Result<Self> {
        let statement = yang::parse(source).map_err(|e| NetconfError::SchemaParse {
            module: guess_name(source),
            reason: e.to_string(),
        })?;
        let parse_err = |reason: &str| NetconfError::SchemaParse {
            module: statement.arg().to_string(),
            reason: reason.to_string(),
        };

        match statement.keyword.as_str() {
            "module" => {}
            "submodule" => return Err(parse_err("submodules are not supported")),
            other => return Err(parse_err(&format!("unexpected top-level statement {}", other))),
        }

        let namespace = statement
            .find_arg("namespace")
            .ok_or_else(|| parse_err("missing namespace"))?
            .to_string();
        let prefix = statement
            .find_arg("prefix")
            .ok_or_else(|| parse_err("missing prefix"))?
            .to_string();
        let revision = statement.find_arg("revision").map(str::to_string);
        let imports = statement
            .all("import")
            .filter_map(|imp| imp.find_arg("prefix").map(|p| (p.to_string(), imp.arg().to_string())))
            .collect();

        Ok(Self {
            name: statement.arg().to_string(),
            revision,
            namespace,
            prefix,
            imports,
            nodes: Vec::new(),
            statement,
        })
    }

    /// Module version: its latest revision, or empty when unrevisioned
    pub fn version(&self) -> &str {
        self.revision.as_deref().unwrap_or("")
    }

    /// Map a prefix used inside this module to a module name
    pub fn module_for_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == self.prefix {
            Some(&self.name)
        } else {
            self.imports.get(prefix).map(String::as_str)
        }
    }

    /// Top-level data node by name
    pub fn node(&self, name: &str) -> Option<&SchemaNode> {
        find_node(&self.nodes, name, None)
    }

    pub(crate) fn augments(&self) -> impl Iterator<Item = &Statement> {
        self.statement.all("augment")
    }

    fn grouping(&self, name: &str) -> Option<&Statement> {
        self.statement.all("grouping").find(|g| g.arg() == name)
    }
}

fn guess_name(source: &str) -> String {
    source
        .split_whitespace()
        .nth(1)
        .map(|s| s.trim_end_matches(['{', ';']).to_string())
        .unwrap_or_default()
}

/// Compiles data-definition statements against a set of loaded modules
pub(crate) struct Compiler<'a> {
    modules: &'a BTreeMap<String, Module>,
}

/// Lexical context: the module whose prefixes apply, plus enclosing
/// statements that may define groupings.
#[derive(Clone)]
struct Scope<'a> {
    module: &'a Module,
    ancestors: Vec<&'a Statement>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(modules: &'a BTreeMap<String, Module>) -> Self {
        Self { modules }
    }

    /// Compile the top-level data nodes of `module`
    pub(crate) fn compile_module(&self, module: &'a Module) -> std::result::Result<Vec<SchemaNode>, String> {
        let scope = Scope {
            module,
            ancestors: vec![&module.statement],
        };
        self.compile_children(&module.statement, &scope, &module.name, true, 0)
    }

    /// Compile the body of an `augment` statement owned by `module`
    pub(crate) fn compile_augment(
        &self,
        module: &'a Module,
        augment: &'a Statement,
        config: bool,
    ) -> std::result::Result<Vec<SchemaNode>, String> {
        let scope = Scope {
            module,
            ancestors: vec![&module.statement, augment],
        };
        self.compile_children(augment, &scope, &module.name, config, 0)
    }

    fn compile_children(
        &self,
        parent: &'a Statement,
        scope: &Scope<'a>,
        owner: &str,
        config: bool,
        depth: usize,
    ) -> std::result::Result<Vec<SchemaNode>, String> {
        let mut nodes = Vec::new();
        for stmt in &parent.substatements {
            self.compile_statement(stmt, scope, owner, config, depth, &mut nodes)?;
        }
        Ok(nodes)
    }

    fn compile_statement(
        &self,
        stmt: &'a Statement,
        scope: &Scope<'a>,
        owner: &str,
        config: bool,
        depth: usize,
        out: &mut Vec<SchemaNode>,
    ) -> std::result::Result<(), String> {
        let kind = match stmt.keyword.as_str() {
            "container" => NodeKind::Container,
            "list" => NodeKind::List,
            "leaf" => NodeKind::Leaf,
            "leaf-list" => NodeKind::LeafList,
            "anydata" | "anyxml" => NodeKind::AnyData,
            "choice" | "case" => {
                let inner = scope.enter(stmt);
                for child in &stmt.substatements {
                    self.compile_statement(child, &inner, owner, config, depth, out)?;
                }
                return Ok(());
            }
            "uses" => {
                if depth >= MAX_USES_DEPTH {
                    return Err(format!("uses nesting too deep at {}", stmt.arg()));
                }
                let (grouping, grouping_scope) = self.resolve_grouping(stmt.arg(), scope)?;
                let inner = grouping_scope.enter(grouping);
                for child in &grouping.substatements {
                    self.compile_statement(child, &inner, owner, config, depth + 1, out)?;
                }
                return Ok(());
            }
            _ => return Ok(()),
        };

        let config = config && stmt.find_arg("config") != Some("false");
        let keys = stmt
            .find_arg("key")
            .map(|k| k.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let yang_type = stmt.find("type").map(YangType::from_statement);
        let children = if kind.is_leaf_like() {
            Vec::new()
        } else {
            self.compile_children(stmt, &scope.enter(stmt), owner, config, depth)?
        };

        out.push(SchemaNode {
            name: stmt.arg().to_string(),
            kind,
            module: owner.to_string(),
            config,
            keys,
            yang_type,
            children,
        });
        Ok(())
    }

    fn resolve_grouping(
        &self,
        reference: &str,
        scope: &Scope<'a>,
    ) -> std::result::Result<(&'a Statement, Scope<'a>), String> {
        let (prefix, name) = match reference.split_once(':') {
            Some((p, n)) => (Some(p), n),
            None => (None, reference),
        };

        let local = prefix.is_none_or(|p| p == scope.module.prefix);
        if local {
            for (i, &ancestor) in scope.ancestors.iter().enumerate().rev() {
                if let Some(g) = ancestor.all("grouping").find(|g| g.arg() == name) {
                    let outer = Scope {
                        module: scope.module,
                        ancestors: scope.ancestors[..=i].to_vec(),
                    };
                    return Ok((g, outer));
                }
            }
            return Err(format!("grouping {} not found", reference));
        }

        let module_name = prefix
            .and_then(|p| scope.module.module_for_prefix(p))
            .ok_or_else(|| format!("unknown prefix in uses {}", reference))?;
        let modules: &'a BTreeMap<String, Module> = self.modules;
        let module = modules
            .get(module_name)
            .ok_or_else(|| format!("grouping {} needs module {}", reference, module_name))?;
        let grouping = module
            .grouping(name)
            .ok_or_else(|| format!("grouping {} not found in {}", name, module_name))?;
        Ok((
            grouping,
            Scope {
                module,
                ancestors: vec![&module.statement],
            },
        ))
    }
}

impl<'a> Scope<'a> {
    fn enter(&self, stmt: &'a Statement) -> Scope<'a> {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(stmt);
        Scope {
            module: self.module,
            ancestors,
        }
    }
}

/// Resolve an absolute augment target (`/p:a/p:b`) into `(module, name)` steps
pub(crate) fn augment_target(module: &Module, target: &str) -> std::result::Result<Vec<(String, String)>, String> {
    target
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|step| match step.split_once(':') {
            Some((prefix, name)) => module
                .module_for_prefix(prefix)
                .map(|m| (m.to_string(), name.to_string()))
                .ok_or_else(|| format!("unknown prefix {} in augment {}", prefix, target)),
            None => Ok((module.name.clone(), step.to_string())),
        })
        .collect()
}
