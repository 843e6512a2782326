use serde::{Deserialize, Serialize};

use super::node::Node;
use crate::{
    fields::Field,
    parser::{parse_frontmatter_item, parse_frontmatter_line, parse_inline_fields},
    paths::IndexedPath,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Frontmatter,
    Body,
}

/// One line of a [super::Document].
///
/// Lines reference their structural parent by index into the document's line vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub position: Position,
    pub nodes: Vec<Node>,
    /// Leading whitespace width.
    pub indent: usize,
    /// Column where the line's key (or item value) starts: indentation plus any `- ` marker.
    pub key_indent: usize,
    /// The line opens a frontmatter sequence item.
    pub item_marker: bool,
    /// Whether the line may act as a structural parent (frontmatter keys and items).
    pub structural: bool,
    /// The frontmatter delimiter lines.
    pub delimiter: bool,
    /// Nearest preceding line with a strictly smaller `key_indent`.
    pub parent: Option<usize>,
    /// Object-list item this line belongs to, when its parent is an object-list field.
    pub item_index: Option<usize>,
    /// Indexed path of the field this line belongs to, own or inherited from its parent.
    pub context: Option<IndexedPath>,
}

fn leading_whitespace(raw: &str) -> usize {
    raw.len() - raw.trim_start_matches([' ', '\t']).len()
}

impl Line {
    fn plain(number: usize, position: Position, raw: &str) -> Line {
        let indent = leading_whitespace(raw);
        Line {
            number,
            position,
            nodes: if raw.is_empty() {
                vec![]
            } else {
                vec![Node::text(0, raw)]
            },
            indent,
            key_indent: indent,
            item_marker: false,
            structural: false,
            delimiter: false,
            parent: None,
            item_index: None,
            context: None,
        }
    }

    pub fn delimiter(number: usize, raw: &str) -> Line {
        let mut line = Line::plain(number, Position::Frontmatter, raw);
        line.delimiter = true;
        line
    }

    /// Decompose a line between the frontmatter delimiters.
    pub fn frontmatter(number: usize, raw: &str) -> Line {
        if let Some(m) = parse_frontmatter_line(raw) {
            let mut nodes = Vec::with_capacity(2);
            if m.field.start > 0 {
                nodes.push(Node::text(0, &raw[..m.field.start]));
            }
            let key_indent = m.field.start;
            nodes.push(Node::field(m.field, raw));
            return Line {
                number,
                position: Position::Frontmatter,
                nodes,
                indent: m.indent.len(),
                key_indent,
                item_marker: m.item_marker.is_some(),
                structural: true,
                delimiter: false,
                parent: None,
                item_index: None,
                context: None,
            };
        }
        if let Some((indent, value)) = parse_frontmatter_item(raw) {
            let value_start = raw.len() - value.len();
            let mut nodes = vec![Node::text(0, &raw[..value_start])];
            if !value.is_empty() {
                nodes.push(Node::item(value_start, value));
            }
            return Line {
                number,
                position: Position::Frontmatter,
                nodes,
                indent: indent.len(),
                key_indent: indent.len() + 2,
                item_marker: true,
                structural: true,
                delimiter: false,
                parent: None,
                item_index: None,
                context: None,
            };
        }
        Line::plain(number, Position::Frontmatter, raw)
    }

    /// Decompose a body line. With `parse_fields` unset the line is kept as literal text.
    pub fn body(number: usize, raw: &str, parse_fields: bool) -> Line {
        let mut line = Line::plain(number, Position::Body, raw);
        if !parse_fields {
            return line;
        }
        let matches = parse_inline_fields(raw);
        if matches.is_empty() {
            return line;
        }
        let mut nodes = Vec::with_capacity(matches.len() * 2 + 1);
        let mut cursor = 0;
        for m in matches {
            if m.start > cursor {
                nodes.push(Node::text(cursor, &raw[cursor..m.start]));
            }
            cursor = m.end();
            nodes.push(Node::field(m, raw));
        }
        if cursor < raw.len() {
            nodes.push(Node::text(cursor, &raw[cursor..]));
        }
        line.nodes = nodes;
        line
    }

    /// Text of the line, reassembled from its nodes.
    pub fn raw(&self) -> String {
        self.nodes.iter().map(|n| n.raw.as_str()).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|n| n.raw.trim().is_empty())
    }

    /// First field node of the line.
    pub fn field_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_field())
    }

    pub fn bound_field(&self) -> Option<&Field> {
        self.field_node().and_then(|n| n.bound_field())
    }

    /// Text preceding the first field node: indentation, list and quote markers.
    pub fn prefix(&self) -> String {
        self.nodes
            .iter()
            .take_while(|n| !n.is_field())
            .map(|n| n.raw.as_str())
            .collect()
    }

    /// Whether the line holds nothing but one field (after its prefix).
    pub fn is_single_field(&self) -> bool {
        let fields = self.nodes.iter().filter(|n| n.is_field()).count();
        fields == 1
            && self
                .nodes
                .iter()
                .skip_while(|n| !n.is_field())
                .skip(1)
                .all(|n| n.raw.trim().is_empty())
            && self.field_node().and_then(|n| n.matched()).is_some_and(|m| m.enclosure.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_line_shapes() {
        let line = Line::frontmatter(1, "  - name: Taki");
        assert!(line.item_marker);
        assert!(line.structural);
        assert_eq!(line.indent, 2);
        assert_eq!(line.key_indent, 4);
        assert_eq!(line.prefix(), "  - ");
        assert_eq!(line.raw(), "  - name: Taki");

        let item = Line::frontmatter(2, "  - Drama");
        assert!(item.item_marker);
        assert!(item.field_node().is_none());
        assert_eq!(item.raw(), "  - Drama");

        let comment = Line::frontmatter(3, "# note");
        assert!(!comment.structural);
        assert_eq!(comment.raw(), "# note");
    }

    #[test]
    fn test_body_line_nodes_roundtrip() {
        let raw = "Watched [rating:: 5] and (mood:: calm) today";
        let line = Line::body(7, raw, true);
        assert_eq!(line.nodes.iter().filter(|n| n.is_field()).count(), 2);
        assert_eq!(line.raw(), raw);
        assert!(!line.is_single_field());

        let line = Line::body(8, "> - status:: done", true);
        assert!(line.is_single_field());
        assert_eq!(line.prefix(), "> - ");

        let line = Line::body(9, "status:: done", false);
        assert!(line.field_node().is_none());
        assert_eq!(line.raw(), "status:: done");
    }
}
