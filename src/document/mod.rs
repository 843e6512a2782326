//! Positional document model: Document → [Line] → [Node].
//!
//! A [Document] is built from raw text against the document's resolved field set. Every line is
//! tagged [Position::Frontmatter] or [Position::Body] and decomposed into nodes; field nodes bind
//! to declared fields by name and, for nested frontmatter structures, by the container field of
//! their structural parent line.
//!
//! Lines live in one vector owned by the document; parents are referenced by index. Edits are
//! computed against a copy of the raw lines and the document is rebuilt from the result, so a
//! failed edit leaves the document untouched and unmodified lines keep their exact bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    error::BuildonomyError,
    fields::{
        render::{frontmatter_value, inline_value, validate, Rendered},
        Field, FieldKind,
    },
    parser::{parse_yaml_block, split_frontmatter, FieldMatch, FRONTMATTER_DELIMITER},
    paths::IndexedPath,
};

pub mod line;
pub mod node;


pub use line::{Line, Position};
pub use node::{Node, NodeKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOptions {
    /// Body lines are kept as literal text and never receive field inserts.
    pub frontmatter_only: bool,
    /// Render multi-valued fields without a display mode as indented lists.
    pub indented_list_default: bool,
}

/// A declared field present in a document, with its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingField {
    pub field: Field,
    pub value: Value,
    pub indexed_path: IndexedPath,
}

/// Where a new body field is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyInsert {
    /// Line number the new line takes; later lines shift down.
    pub line: usize,
    pub as_list: bool,
    pub as_blockquote: bool,
}

/// Placement of a field that does not exist in the document yet. Frontmatter-only kinds and
/// nested fields always go to the frontmatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertTarget {
    #[default]
    Frontmatter,
    Body(BodyInsert),
}

#[derive(Debug, Clone)]
pub struct Document {
    path: String,
    fields: Vec<Field>,
    options: DocumentOptions,
    built: bool,
    frontmatter: Map<String, Value>,
    frontmatter_bounds: Option<(usize, usize)>,
    lines: Vec<Line>,
    existing: Vec<ExistingField>,
}

/// Walk the frontmatter object along an indexed path, mapping field ids to names.
pub fn value_at(
    frontmatter: &Map<String, Value>,
    fields: &[Field],
    path: &IndexedPath,
) -> Option<Value> {
    let mut current: Option<&Value> = None;
    for (depth, segment) in path.segments().iter().enumerate() {
        let name = &fields.iter().find(|f| f.id == segment.field_id)?.name;
        let next = if depth == 0 {
            frontmatter.get(name)
        } else {
            current?.get(name)
        };
        current = match segment.index {
            Some(idx) => next?.get(idx),
            None => next,
        };
    }
    current.cloned()
}

impl Document {
    /// An unbuilt document.
    pub fn new<S: Into<String>>(path: S, fields: Vec<Field>, options: DocumentOptions) -> Document {
        Document {
            path: path.into(),
            fields,
            options,
            built: false,
            frontmatter: Map::new(),
            frontmatter_bounds: None,
            lines: vec![],
            existing: vec![],
        }
    }

    /// Build a document from its text in one step.
    pub fn parse<S: Into<String>>(
        path: S,
        text: &str,
        fields: Vec<Field>,
        options: DocumentOptions,
    ) -> Document {
        let mut doc = Document::new(path, fields, options);
        doc.build(text);
        doc
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, number: usize) -> Option<&Line> {
        self.lines.get(number)
    }

    pub fn frontmatter(&self) -> &Map<String, Value> {
        &self.frontmatter
    }

    /// Line numbers of the opening and closing delimiters.
    pub fn frontmatter_bounds(&self) -> Option<(usize, usize)> {
        self.frontmatter_bounds
    }

    pub fn existing_fields(&self) -> &[ExistingField] {
        &self.existing
    }

    pub fn existing_field(&self, path: &IndexedPath) -> Option<&ExistingField> {
        self.existing.iter().find(|ef| &ef.indexed_path == path)
    }

    /// A declared field by name, top-level (`parent == None`) or nested in the given container.
    pub fn field_by_name(&self, name: &str, parent: Option<&str>) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.path.as_deref() == parent)
    }

    /// Drop the line tree.
    pub fn discard(&mut self) {
        self.lines.clear();
        self.existing.clear();
        self.frontmatter.clear();
        self.frontmatter_bounds = None;
        self.built = false;
    }

    /// Serialize the document back to text.
    pub fn render(&self) -> String {
        self.raw_lines().join("\n")
    }

    pub fn build(&mut self, text: &str) {
        let raw_lines = text.split('\n').collect::<Vec<&str>>();
        let bounds = split_frontmatter(&raw_lines);
        let mut lines = Vec::with_capacity(raw_lines.len());
        let mut in_fence = false;
        for (number, raw) in raw_lines.iter().enumerate() {
            let line = match bounds {
                Some((open, close)) if number == open || number == close => {
                    Line::delimiter(number, raw)
                }
                Some((_, close)) if number < close => Line::frontmatter(number, raw),
                _ => {
                    let trimmed = raw.trim_start();
                    let fence = trimmed.starts_with("```") || trimmed.starts_with("~~~");
                    if fence {
                        in_fence = !in_fence;
                    }
                    Line::body(
                        number,
                        raw,
                        !self.options.frontmatter_only && !in_fence && !fence,
                    )
                }
            };
            lines.push(line);
        }
        self.frontmatter = bounds
            .map(|(open, close)| parse_yaml_block(&raw_lines[open + 1..close].join("\n")))
            .unwrap_or_default();
        self.frontmatter_bounds = bounds;
        self.lines = lines;
        self.link_structure();
        for idx in 0..self.lines.len() {
            match self.lines[idx].position {
                _ if self.lines[idx].delimiter => {}
                Position::Frontmatter => self.bind_frontmatter_line(idx),
                Position::Body => self.bind_body_line(idx),
            }
        }
        self.collect_existing();
        self.built = true;
    }

    fn raw_lines(&self) -> Vec<String> {
        self.lines.iter().map(Line::raw).collect()
    }

    fn rebuild(&mut self, lines: Vec<String>) {
        let text = lines.join("\n");
        self.build(&text);
    }

    fn frontmatter_close(&self) -> usize {
        self.frontmatter_bounds.map(|(_, close)| close).unwrap_or(0)
    }

    /// Assign structural parents and object-list item indices to frontmatter lines.
    fn link_structure(&mut self) {
        let Some((open, close)) = self.frontmatter_bounds else {
            return;
        };
        let mut item_counts: std::collections::HashMap<usize, usize> = Default::default();
        for idx in open + 1..close {
            if self.lines[idx].is_blank() {
                continue;
            }
            let key_indent = self.lines[idx].key_indent;
            let parent = (open + 1..idx)
                .rev()
                .find(|&j| self.lines[j].structural && self.lines[j].key_indent < key_indent);
            let item_index = parent.and_then(|p| {
                if self.lines[idx].item_marker {
                    let count = item_counts.entry(p).or_insert(0);
                    *count += 1;
                    Some(*count - 1)
                } else {
                    item_counts.get(&p).map(|count| count - 1)
                }
            });
            self.lines[idx].parent = parent;
            self.lines[idx].item_index = item_index;
        }
    }

    fn bind_frontmatter_line(&mut self, idx: usize) {
        let item_index = self.lines[idx].item_index;
        let parent = self.lines[idx].parent.map(|p| {
            (
                self.lines[p].bound_field().cloned(),
                self.lines[p].context.clone(),
            )
        });
        let inherited = match &parent {
            None => None,
            Some((Some(container), Some(path))) if container.kind() == FieldKind::ObjectList => {
                item_index.map(|item| path.with_index(item))
            }
            Some((_, context)) => context.clone(),
        };
        let attribute = self.lines[idx]
            .field_node()
            .and_then(|n| n.matched())
            .map(|m| m.attribute.clone());
        let binding = attribute.and_then(|attr| match &parent {
            None => self
                .field_by_name(&attr, None)
                .map(|f| (f.clone(), IndexedPath::root(&f.id))),
            Some((Some(container), Some(container_path))) if container.kind().is_container() => {
                let child = self.field_by_name(&attr, Some(&container.id))?;
                if !child.fits_in(container) {
                    return None;
                }
                let base = if container.kind() == FieldKind::ObjectList {
                    container_path.with_index(item_index?)
                } else {
                    container_path.clone()
                };
                Some((child.clone(), base.child(&child.id)))
            }
            _ => None,
        });
        match binding {
            Some((field, path)) => {
                let value = value_at(&self.frontmatter, &self.fields, &path);
                self.lines[idx].context = Some(path.clone());
                if let Some(node) = self.lines[idx].nodes.iter_mut().find(|n| n.is_field()) {
                    node.bind(field, path, value);
                }
            }
            None => self.lines[idx].context = inherited,
        }
    }

    fn bind_body_line(&mut self, idx: usize) {
        let bindings = self.lines[idx]
            .nodes
            .iter()
            .map(|node| {
                node.matched()
                    .and_then(|m| self.field_by_name(&m.attribute, None))
                    .filter(|f| !f.kind().frontmatter_only())
                    .map(|f| (f.clone(), IndexedPath::root(&f.id)))
            })
            .collect::<Vec<_>>();
        let mut context = None;
        for (node, binding) in self.lines[idx].nodes.iter_mut().zip(bindings) {
            if let Some((field, path)) = binding {
                let value = node
                    .matched()
                    .map(|m| Value::String(m.raw_value.trim().to_string()));
                if context.is_none() {
                    context = Some(path.clone());
                }
                node.bind(field, path, value);
            }
        }
        self.lines[idx].context = context;
    }

    fn collect_existing(&mut self) {
        let mut existing: Vec<ExistingField> = Vec::new();
        for node in self.lines.iter().flat_map(|l| l.nodes.iter()) {
            let (Some(field), Some(path)) = (node.bound_field(), node.indexed_path()) else {
                continue;
            };
            if existing.iter().any(|ef| &ef.indexed_path == path) {
                continue;
            }
            existing.push(ExistingField {
                field: field.clone(),
                value: node.value().cloned().unwrap_or(Value::Null),
                indexed_path: path.clone(),
            });
        }
        self.existing = existing;
    }

    fn is_descendant(&self, idx: usize, ancestor: usize) -> bool {
        let mut cursor = self.lines[idx].parent;
        while let Some(p) = cursor {
            if p == ancestor {
                return true;
            }
            cursor = self.lines[p].parent;
        }
        false
    }

    /// Last line of the frontmatter subtree rooted at `idx`.
    fn subtree_end(&self, idx: usize) -> usize {
        let mut end = idx;
        for j in idx + 1..self.frontmatter_close() {
            if self.is_descendant(j, idx) {
                end = j;
            } else if !self.lines[j].is_blank() {
                break;
            }
        }
        end
    }

    /// Item marker lines of an object-list header, in order.
    fn items_of(&self, header: usize) -> Vec<usize> {
        (header + 1..=self.subtree_end(header))
            .filter(|&j| self.lines[j].parent == Some(header) && self.lines[j].item_marker)
            .collect()
    }

    /// First and last line of item `item` under an object-list header.
    fn item_range(&self, header: usize, item: usize) -> Option<(usize, usize)> {
        let items = self.items_of(header);
        let start = *items.get(item)?;
        let mut end = match items.get(item + 1) {
            Some(next) => next - 1,
            None => self.subtree_end(header),
        };
        while end > start && self.lines[end].is_blank() {
            end -= 1;
        }
        Some((start, end))
    }

    /// Line and node index of the first occurrence bound to `path`.
    fn locate(&self, path: &IndexedPath) -> Option<(usize, usize)> {
        self.lines.iter().enumerate().find_map(|(i, line)| {
            line.nodes
                .iter()
                .position(|n| n.indexed_path() == Some(path))
                .map(|n| (i, n))
        })
    }

    fn locate_frontmatter(&self, path: &IndexedPath) -> Result<usize, BuildonomyError> {
        self.locate(path)
            .map(|(i, _)| i)
            .filter(|i| self.lines[*i].position == Position::Frontmatter)
            .ok_or_else(|| {
                BuildonomyError::Write(format!(
                    "Parent field {path} not found in frontmatter of {}",
                    self.path
                ))
            })
    }

    fn ensure_built(&self) -> Result<(), BuildonomyError> {
        if self.built {
            Ok(())
        } else {
            Err(BuildonomyError::Write(format!(
                "Document {} is not built",
                self.path
            )))
        }
    }

    fn field_for(&self, path: &IndexedPath) -> Result<Field, BuildonomyError> {
        let id = path
            .field_id()
            .ok_or_else(|| BuildonomyError::Write("Empty indexed path".to_string()))?;
        self.fields
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| {
                BuildonomyError::Write(format!("Field {id} is not declared for {}", self.path))
            })
    }

    /// Lines for a frontmatter field written after `head_prefix`, with children indented under
    /// `key_col`.
    fn render_field_lines(
        &self,
        head_prefix: &str,
        key_col: usize,
        matched: Option<&FieldMatch>,
        field: &Field,
        value: &Value,
    ) -> Vec<String> {
        let head = |scalar: &str| match matched {
            Some(m) => m.with_value(scalar),
            None if scalar.is_empty() => format!("{}:", field.name),
            None => format!("{}: {}", field.name, scalar),
        };
        let child_indent = " ".repeat(key_col + 2);
        match frontmatter_value(field, value, self.options.indented_list_default) {
            Rendered::Scalar(scalar) => vec![format!("{head_prefix}{}", head(&scalar))],
            Rendered::Items(items) => std::iter::once(format!("{head_prefix}{}", head("")))
                .chain(items.iter().map(|item| format!("{child_indent}- {item}")))
                .collect(),
            Rendered::Block(block) => std::iter::once(format!("{head_prefix}{}", head("")))
                .chain(block.iter().map(|l| format!("{child_indent}{l}")))
                .collect(),
        }
    }

    /// Header line with any inline value (`[]`, `{}`, `null`) cleared, if it needs clearing.
    fn cleared_header(&self, header: usize) -> Option<String> {
        let line = &self.lines[header];
        line.field_node()
            .and_then(|n| n.matched())
            .filter(|m| !m.raw_value.trim().is_empty())
            .map(|m| format!("{}{}", line.prefix(), m.with_value("")))
    }

    /// Write `value` at `indexed_path`: replace the existing occurrence, or insert a new one.
    #[tracing::instrument(skip_all, fields(doc = %self.path, field = %indexed_path))]
    pub fn upsert(
        &mut self,
        indexed_path: &IndexedPath,
        value: &Value,
        target: InsertTarget,
    ) -> Result<(), BuildonomyError> {
        self.ensure_built()?;
        let field = self.field_for(indexed_path)?;
        validate(&field, value)?;
        let mut lines = self.raw_lines();
        match self.locate(indexed_path) {
            Some((idx, node)) => self.replace_at(&mut lines, idx, node, &field, value),
            None if indexed_path.depth() > 1 => {
                self.insert_nested(&mut lines, indexed_path, &field, value)?
            }
            None => self.insert_top_level(&mut lines, &field, value, target),
        }
        self.rebuild(lines);
        Ok(())
    }

    fn replace_at(
        &self,
        lines: &mut Vec<String>,
        idx: usize,
        node_idx: usize,
        field: &Field,
        value: &Value,
    ) {
        let line = &self.lines[idx];
        match line.position {
            Position::Frontmatter => {
                let rendered = self.render_field_lines(
                    &line.prefix(),
                    line.key_indent,
                    line.nodes[node_idx].matched(),
                    field,
                    value,
                );
                let end = self.subtree_end(idx);
                lines.splice(idx..=end, rendered);
            }
            Position::Body => {
                let text = inline_value(field, value);
                lines[idx] = line
                    .nodes
                    .iter()
                    .enumerate()
                    .map(|(k, node)| match node.matched() {
                        Some(m) if k == node_idx => m.with_value(&text),
                        _ => node.raw.clone(),
                    })
                    .collect();
            }
        }
    }

    fn insert_top_level(
        &self,
        lines: &mut Vec<String>,
        field: &Field,
        value: &Value,
        target: InsertTarget,
    ) {
        let body = match target {
            InsertTarget::Body(insert)
                if !self.options.frontmatter_only && !field.kind().frontmatter_only() =>
            {
                Some(insert)
            }
            _ => None,
        };
        match body {
            None => {
                let at = match self.frontmatter_bounds {
                    Some((_, close)) => close,
                    None => {
                        lines.insert(0, FRONTMATTER_DELIMITER.to_string());
                        lines.insert(1, FRONTMATTER_DELIMITER.to_string());
                        1
                    }
                };
                let rendered = self.render_field_lines("", 0, None, field, value);
                lines.splice(at..at, rendered);
            }
            Some(insert) => {
                let first_body = self.frontmatter_bounds.map(|(_, c)| c + 1).unwrap_or(0);
                let at = insert.line.clamp(first_body, lines.len());
                let mut prefix = String::new();
                if insert.as_blockquote {
                    prefix.push_str("> ");
                }
                if insert.as_list {
                    prefix.push_str("- ");
                }
                let text = inline_value(field, value);
                let line = if text.is_empty() {
                    format!("{prefix}{}::", field.name)
                } else {
                    format!("{prefix}{}:: {text}", field.name)
                };
                lines.insert(at, line);
            }
        }
    }

    fn insert_nested(
        &self,
        lines: &mut Vec<String>,
        indexed_path: &IndexedPath,
        field: &Field,
        value: &Value,
    ) -> Result<(), BuildonomyError> {
        let parent_path = indexed_path.parent().ok_or_else(|| {
            BuildonomyError::Write(format!("{indexed_path} has no parent field"))
        })?;
        let header = self.locate_frontmatter(&parent_path.without_index())?;
        let container = self.lines[header].bound_field().cloned().ok_or_else(|| {
            BuildonomyError::Write(format!("Parent of {indexed_path} is not a declared field"))
        })?;
        if !field.fits_in(&container) {
            return Err(BuildonomyError::Write(format!(
                "Field '{}' cannot be nested in '{}' ({})",
                field.name,
                container.name,
                container.kind()
            )));
        }
        let cleared = self.cleared_header(header);
        match container.kind() {
            FieldKind::Object => {
                let end = self.subtree_end(header);
                let key_col = (header + 1..=end)
                    .find(|&j| self.lines[j].parent == Some(header) && self.lines[j].structural)
                    .map(|j| self.lines[j].key_indent)
                    .unwrap_or(self.lines[header].key_indent + 2);
                let rendered =
                    self.render_field_lines(&" ".repeat(key_col), key_col, None, field, value);
                lines.splice(end + 1..end + 1, rendered);
            }
            FieldKind::ObjectList => {
                let item = parent_path.index().ok_or_else(|| {
                    BuildonomyError::Write(format!(
                        "{indexed_path} does not designate an item of '{}'",
                        container.name
                    ))
                })?;
                let items = self.items_of(header);
                match item.cmp(&items.len()) {
                    Ordering::Less => {
                        let (start, end) = self.item_range(header, item).ok_or_else(|| {
                            BuildonomyError::Write(format!("Item {parent_path} not found"))
                        })?;
                        let marker = &self.lines[start];
                        let empty_marker = start == end
                            && marker.nodes.iter().all(|n| matches!(n.kind, NodeKind::Text));
                        if empty_marker {
                            let prefix = format!("{}- ", " ".repeat(marker.indent));
                            let rendered = self.render_field_lines(
                                &prefix,
                                marker.key_indent,
                                None,
                                field,
                                value,
                            );
                            lines.splice(start..=start, rendered);
                        } else {
                            let key_col = marker.key_indent;
                            let rendered = self.render_field_lines(
                                &" ".repeat(key_col),
                                key_col,
                                None,
                                field,
                                value,
                            );
                            lines.splice(end + 1..end + 1, rendered);
                        }
                    }
                    Ordering::Equal => {
                        let marker_indent = items
                            .first()
                            .map(|&i| self.lines[i].indent)
                            .unwrap_or(self.lines[header].key_indent + 2);
                        let prefix = format!("{}- ", " ".repeat(marker_indent));
                        let at = self.subtree_end(header) + 1;
                        let rendered = self.render_field_lines(
                            &prefix,
                            marker_indent + 2,
                            None,
                            field,
                            value,
                        );
                        lines.splice(at..at, rendered);
                    }
                    Ordering::Greater => {
                        return Err(BuildonomyError::Write(format!(
                            "Item index {item} out of range for '{}' ({} items)",
                            container.name,
                            items.len()
                        )))
                    }
                }
            }
            other => {
                return Err(BuildonomyError::Write(format!(
                    "'{}' is a {other} field and cannot hold nested fields",
                    container.name
                )))
            }
        }
        if let Some(cleared) = cleared {
            lines[header] = cleared;
        }
        Ok(())
    }

    /// Append an empty item to an object-list field and return the item's indexed path.
    pub fn add_object_list_item(
        &mut self,
        list_path: &IndexedPath,
    ) -> Result<IndexedPath, BuildonomyError> {
        self.ensure_built()?;
        let header_path = list_path.without_index();
        let header = self.locate_frontmatter(&header_path)?;
        match self.lines[header].bound_field() {
            Some(f) if f.kind() == FieldKind::ObjectList => {}
            _ => {
                return Err(BuildonomyError::Write(format!(
                    "{header_path} is not an object list"
                )))
            }
        }
        let items = self.items_of(header);
        let marker_indent = items
            .first()
            .map(|&i| self.lines[i].indent)
            .unwrap_or(self.lines[header].key_indent + 2);
        let mut lines = self.raw_lines();
        let at = self.subtree_end(header) + 1;
        lines.insert(at, format!("{}-", " ".repeat(marker_indent)));
        if let Some(cleared) = self.cleared_header(header) {
            lines[header] = cleared;
        }
        self.rebuild(lines);
        Ok(header_path.with_index(items.len()))
    }

    /// Remove the occurrence(s) at `indexed_path` and everything nested under them.
    ///
    /// A path ending in an item index removes that object-list item; remaining items are
    /// re-indexed contiguously from zero.
    #[tracing::instrument(skip_all, fields(doc = %self.path, field = %indexed_path))]
    pub fn remove(&mut self, indexed_path: &IndexedPath) -> Result<(), BuildonomyError> {
        self.ensure_built()?;
        let mut lines = self.raw_lines();
        if let Some(item) = indexed_path.index() {
            let header = self.locate_frontmatter(&indexed_path.without_index())?;
            let (start, end) = self.item_range(header, item).ok_or_else(|| {
                BuildonomyError::NotFound(format!("{indexed_path} not found in {}", self.path))
            })?;
            lines.drain(start..=end);
        } else {
            let mut occurrences: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for (i, line) in self.lines.iter().enumerate() {
                for (n, node) in line.nodes.iter().enumerate() {
                    if node.indexed_path() == Some(indexed_path) {
                        occurrences.entry(i).or_default().push(n);
                    }
                }
            }
            if occurrences.is_empty() {
                return Err(BuildonomyError::NotFound(format!(
                    "{indexed_path} not found in {}",
                    self.path
                )));
            }
            for (idx, nodes) in occurrences.into_iter().rev() {
                let line = &self.lines[idx];
                match line.position {
                    Position::Frontmatter => {
                        let end = self.subtree_end(idx);
                        if line.item_marker {
                            self.keep_item_open(&mut lines, idx, end);
                        }
                        lines.drain(idx..=end);
                    }
                    Position::Body if line.is_single_field() => {
                        lines.remove(idx);
                    }
                    Position::Body => lines[idx] = without_nodes(line, &nodes),
                }
            }
        }
        self.rebuild(lines);
        Ok(())
    }

    /// Before dropping lines `idx..=end` that open an object-list item, hand the item marker to
    /// the next line of the item, or leave an empty marker when nothing else remains.
    fn keep_item_open(&self, lines: &mut Vec<String>, idx: usize, end: usize) {
        let line = &self.lines[idx];
        let marker = line.prefix();
        let item_end = line
            .parent
            .zip(line.item_index)
            .and_then(|(header, item)| self.item_range(header, item))
            .map(|(_, e)| e)
            .unwrap_or(end);
        let next = (end + 1..=item_end).find(|&j| !self.lines[j].is_blank());
        match next {
            Some(j) => {
                let col = marker.len();
                let text = &lines[j];
                if text.get(..col).is_some_and(|lead| lead.trim().is_empty()) {
                    let promoted = format!("{marker}{}", &text[col..]);
                    lines[j] = promoted;
                    // Blank lines between the marker and its first remaining field go with it.
                    lines.drain(end + 1..j);
                }
            }
            None => lines.insert(end + 1, marker.trim_end().to_string()),
        }
    }
}

/// Text of `line` with the nodes at `removed` dropped, along with their enclosure characters.
fn without_nodes(line: &Line, removed: &[usize]) -> String {
    let enclosure = |k: usize| {
        if removed.contains(&k) {
            line.nodes.get(k).and_then(|n| n.matched()).and_then(|m| m.enclosure)
        } else {
            None
        }
    };
    let mut out = String::new();
    for (k, node) in line.nodes.iter().enumerate() {
        if removed.contains(&k) {
            continue;
        }
        let mut kept = node.raw.as_str();
        if let Some(enc) = enclosure(k + 1) {
            kept = kept.strip_suffix(enc.open()).unwrap_or(kept);
        }
        if let Some(enc) = k.checked_sub(1).and_then(enclosure) {
            kept = kept.strip_prefix(enc.close()).unwrap_or(kept);
        }
        out.push_str(kept);
    }
    out
}
