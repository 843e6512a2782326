use serde_json::Value;

use crate::{fields::Field, parser::FieldMatch, paths::IndexedPath};

/// What a [Node] holds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal passthrough text.
    Text,
    /// A recognized `key: value` / `key:: value` occurrence. `field` is set when the occurrence
    /// binds to a declared field of the document.
    Field {
        matched: FieldMatch,
        field: Option<Field>,
        indexed_path: Option<IndexedPath>,
        value: Option<Value>,
    },
    /// A `- value` sequence item under a frontmatter field.
    Item { value: String },
}

/// A byte span of a [super::Line].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub start: usize,
    pub raw: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn text<S: Into<String>>(start: usize, raw: S) -> Node {
        Node {
            start,
            raw: raw.into(),
            kind: NodeKind::Text,
        }
    }

    pub fn field(matched: FieldMatch, raw: &str) -> Node {
        Node {
            start: matched.start,
            raw: raw[matched.start..matched.end()].to_string(),
            kind: NodeKind::Field {
                matched,
                field: None,
                indexed_path: None,
                value: None,
            },
        }
    }

    pub fn item<S: Into<String>>(start: usize, value: S) -> Node {
        let value = value.into();
        Node {
            start,
            raw: value.clone(),
            kind: NodeKind::Item { value },
        }
    }

    pub fn length(&self) -> usize {
        self.raw.len()
    }

    pub fn end(&self) -> usize {
        self.start + self.length()
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, NodeKind::Field { .. })
    }

    pub fn matched(&self) -> Option<&FieldMatch> {
        match &self.kind {
            NodeKind::Field { matched, .. } => Some(matched),
            _ => None,
        }
    }

    pub fn bound_field(&self) -> Option<&Field> {
        match &self.kind {
            NodeKind::Field { field, .. } => field.as_ref(),
            _ => None,
        }
    }

    pub fn indexed_path(&self) -> Option<&IndexedPath> {
        match &self.kind {
            NodeKind::Field { indexed_path, .. } => indexed_path.as_ref(),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Field { value, .. } => value.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn bind(&mut self, bound: Field, path: IndexedPath, bound_value: Option<Value>) {
        if let NodeKind::Field {
            field,
            indexed_path,
            value,
            ..
        } = &mut self.kind
        {
            *field = Some(bound);
            *indexed_path = Some(path);
            *value = bound_value;
        }
    }
}
