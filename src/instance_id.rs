//! XPath-style instance identifiers
//!
//! An instance path is a slash-separated list of schema node names, each
//! optionally qualified by a module name or prefix (`ietf-interfaces:interfaces`)
//! and optionally followed by key predicates (`interface[name='eth0']`, or
//! `[.='value']` for a leaf-list entry).

use std::fmt;
use std::str::FromStr;

use crate::error::{NetconfError, Result};

/// Key predicate selecting a list or leaf-list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Key leaf name, or `.` for a leaf-list value
    pub key: String,
    pub value: String,
}

/// One step of an instance path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Module name or prefix, when qualified
    pub prefix: Option<String>,
    pub name: String,
    pub predicates: Vec<Predicate>,
}

impl Segment {
    /// Value of the predicate on `key`, if present
    pub fn predicate(&self, key: &str) -> Option<&str> {
        self.predicates
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{}:", prefix)?;
        }
        f.write_str(&self.name)?;
        for p in &self.predicates {
            let quote = if p.value.contains('\'') { '"' } else { '\'' };
            write!(f, "[{}={}{}{}]", p.key, quote, p.value, quote)?;
        }
        Ok(())
    }
}

/// A parsed, non-empty instance path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePath {
    raw: String,
    segments: Vec<Segment>,
}

impl InstancePath {
    /// Parse a path like `/interfaces/interface[name='eth0']/enabled`
    pub fn parse(path: &str) -> Result<Self> {
        let raw = path.trim();
        let body = raw.strip_prefix('/').unwrap_or(raw);
        if body.is_empty() {
            return Err(NetconfError::InvalidInput("empty path".into()));
        }

        let segments = split_segments(body)?
            .into_iter()
            .map(parse_segment)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path exactly as given by the user
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false: empty paths are rejected by [`InstancePath::parse`]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment of the path
    pub fn last(&self) -> &Segment {
        // non-empty by construction
        &self.segments[self.segments.len() - 1]
    }
}

impl FromStr for InstancePath {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

fn invalid(path: &str, reason: &str) -> NetconfError {
    NetconfError::InvalidInput(format!("invalid path {}: {}", path, reason))
}

/// Split on `/` outside of predicates and quoted strings
fn split_segments(body: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(body, "unbalanced ']'"))?;
            }
            (None, '/') if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(invalid(body, "unterminated quote"));
    }
    if depth != 0 {
        return Err(invalid(body, "unbalanced '['"));
    }
    parts.push(&body[start..]);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid(body, "empty segment"));
    }
    Ok(parts)
}

fn parse_segment(text: &str) -> Result<Segment> {
    let text = text.trim();
    let (head, mut rest) = match text.find('[') {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    };

    let (prefix, name) = match head.split_once(':') {
        Some((p, n)) => (Some(p.to_string()), n),
        None => (None, head),
    };
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(invalid(text, "bad node name"));
    }

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let body_end = predicate_end(rest).ok_or_else(|| invalid(text, "bad predicate"))?;
        let body = &rest[1..body_end];
        rest = rest[body_end + 1..].trim_start();

        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| invalid(text, "positional predicates are not supported"))?;
        let key = key.trim();
        let key = key.split_once(':').map_or(key, |(_, k)| k);
        predicates.push(Predicate {
            key: key.to_string(),
            value: unquote(value.trim()).to_string(),
        });
    }

    Ok(Segment {
        prefix,
        name: name.to_string(),
        predicates,
    })
}

/// Index of the `]` closing the predicate that starts at `text[0] == '['`
fn predicate_end(text: &str) -> Option<usize> {
    if !text.starts_with('[') {
        return None;
    }
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    for q in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
}
