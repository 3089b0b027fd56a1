//! Generic XML element trees
//!
//! Replies are first read without any schema knowledge: this module parses
//! (possibly multi-rooted) XML into an index-based element arena with
//! namespaces resolved, and writes element subtrees back out.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

/// Index of an element inside its [`XmlDocument`]
pub type ElementId = usize;

/// One XML element
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Local name, without prefix
    pub name: String,
    /// Resolved namespace URI
    pub namespace: Option<String>,
    /// Attributes other than namespace declarations, by qualified name
    pub attributes: Vec<(String, String)>,
    /// Prefixed namespace declarations (`xmlns:p`) found on this element
    pub prefix_decls: Vec<(String, String)>,
    /// Concatenated character data directly inside the element
    pub text: String,
    pub children: Vec<ElementId>,
}

/// A parsed XML fragment; may have several root elements
#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    elements: Vec<XmlElement>,
    roots: Vec<ElementId>,
}

impl XmlDocument {
    /// Parse an XML fragment, allowing multiple root siblings
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        let mut doc = XmlDocument::default();
        // open elements, each with the namespace scope it introduced
        let mut stack: Vec<(ElementId, HashMap<String, String>)> = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;
            match event {
                Event::Start(start) => {
                    let id = doc.open(&start, &stack)?;
                    let scope = doc.scope_of(id);
                    stack.push((id, scope));
                }
                Event::Empty(start) => {
                    doc.open(&start, &stack)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| e.to_string())?;
                    match stack.last() {
                        Some((id, _)) => doc.elements[*id].text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => return Err(format!("text outside of any element: {}", text.trim())),
                    }
                }
                Event::CData(data) => {
                    if let Some((id, _)) = stack.last() {
                        let raw = data.into_inner();
                        doc.elements[*id].text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some((id, _)) = stack.last() {
            return Err(format!("unclosed element <{}>", doc.elements[*id].name));
        }
        Ok(doc)
    }

    fn open(
        &mut self,
        start: &BytesStart<'_>,
        stack: &[(ElementId, HashMap<String, String>)],
    ) -> Result<ElementId, String> {
        let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let (prefix, name) = match qname.split_once(':') {
            Some((p, n)) => (Some(p.to_string()), n.to_string()),
            None => (None, qname.clone()),
        };

        let mut element = XmlElement {
            name,
            ..Default::default()
        };
        let mut default_ns = None;
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
            if key == "xmlns" {
                default_ns = Some(value);
            } else if let Some(p) = key.strip_prefix("xmlns:") {
                element.prefix_decls.push((p.to_string(), value));
            } else {
                element.attributes.push((key, value));
            }
        }

        let lookup = |key: &str| -> Option<String> {
            stack
                .iter()
                .rev()
                .find_map(|(_, scope)| scope.get(key).cloned())
        };
        element.namespace = match &prefix {
            Some(p) => element
                .prefix_decls
                .iter()
                .find(|(decl, _)| decl == p)
                .map(|(_, uri)| uri.clone())
                .or_else(|| lookup(p)),
            None => default_ns.clone().or_else(|| lookup("")),
        }
        .filter(|ns| !ns.is_empty());
        if let Some(ns) = default_ns {
            // remembered so children inherit it through scope_of
            element.prefix_decls.push((String::new(), ns));
        }

        let id = self.elements.len();
        self.elements.push(element);
        match stack.last() {
            Some((parent, _)) => self.elements[*parent].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    fn scope_of(&self, id: ElementId) -> HashMap<String, String> {
        self.elements[id].prefix_decls.iter().cloned().collect()
    }

    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    pub fn get(&self, id: ElementId) -> &XmlElement {
        &self.elements[id]
    }

    /// First direct child with the given local name
    pub fn child(&self, id: ElementId, name: &str) -> Option<ElementId> {
        self.elements[id]
            .children
            .iter()
            .copied()
            .find(|c| self.elements[*c].name == name)
    }

    /// Trimmed text of the first direct child with the given local name
    pub fn child_text(&self, id: ElementId, name: &str) -> Option<&str> {
        self.child(id, name).map(|c| self.elements[c].text.trim())
    }

    /// All elements with the given local name, in document order
    pub fn descendants_named(&self, name: &str) -> Vec<ElementId> {
        let mut found = Vec::new();
        let mut work: Vec<ElementId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = work.pop() {
            if self.elements[id].name == name {
                found.push(id);
            }
            work.extend(self.elements[id].children.iter().rev().copied());
        }
        found
    }

    /// Serialize the given elements (and their subtrees) as sibling XML
    pub fn write_siblings(&self, ids: &[ElementId]) -> Result<String, String> {
        let mut writer = Writer::new(Vec::new());
        // (element, parent namespace, closing?)
        let mut work: Vec<(ElementId, Option<&str>, bool)> =
            ids.iter().rev().map(|id| (*id, None, false)).collect();

        while let Some((id, parent_ns, closing)) = work.pop() {
            let element = &self.elements[id];
            if closing {
                writer
                    .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                    .map_err(|e| e.to_string())?;
                continue;
            }

            let mut start = BytesStart::new(element.name.as_str());
            if element.namespace.as_deref() != parent_ns {
                if let Some(ns) = &element.namespace {
                    start.push_attribute(("xmlns", ns.as_str()));
                }
            }
            for (prefix, uri) in element.prefix_decls.iter().filter(|(p, _)| !p.is_empty()) {
                start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
            }
            for (key, value) in &element.attributes {
                start.push_attribute((key.as_str(), value.as_str()));
            }

            let text = if element.children.is_empty() {
                element.text.as_str()
            } else {
                element.text.trim()
            };
            if element.children.is_empty() && text.is_empty() {
                writer
                    .write_event(Event::Empty(start))
                    .map_err(|e| e.to_string())?;
                continue;
            }

            writer
                .write_event(Event::Start(start))
                .map_err(|e| e.to_string())?;
            if !text.is_empty() {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(|e| e.to_string())?;
            }
            work.push((id, None, true));
            let ns = element.namespace.as_deref();
            work.extend(element.children.iter().rev().map(|c| (*c, ns, false)));
        }

        String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
    }
}
