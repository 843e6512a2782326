//! Line-level recognition of field syntax.
//!
//! Two syntaxes are recognized:
//!
//! - frontmatter: `<indent><"- "?><name><spacer>:<spacer><value>`, anchored at the start of the
//!   line,
//! - inline: `<name>::<spacer><value>`, either occupying the whole line (after optional blockquote
//!   and list markers) or embedded in `[name:: value]` / `(name:: value)` enclosures.
//!
//! Every [FieldMatch] carries byte offsets into the line it was parsed from so callers can split
//! the line into passthrough text and field text and reassemble it byte-for-byte.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BuildonomyError;

/// Block delimiter opening and closing the frontmatter.
pub const FRONTMATTER_DELIMITER: &str = "---";

const DECORATIONS: &[char] = &['*', '_', '`', '~'];

static FRONTMATTER_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<item>-(?:[ \t]+|$))?(?P<attr>[^:\s#\-][^:]*?)(?P<sep>[ \t]*:(?:[ \t]+|$))(?P<value>.*)$")
        .expect("frontmatter field regex")
});

static FRONTMATTER_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)-(?:[ \t]+(?P<value>.*))?$").expect("frontmatter item regex")
});

static FULL_LINE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<prefix>(?:[ \t]*>)*[ \t]*(?:(?:[-*+]|\d+[.)])[ \t]+(?:\[.\][ \t]+)?)?)(?P<attr>[_*~`]*[\w][\w \t\-]*?[_*~`]*)(?P<sep>[ \t]*::[ \t]*)(?P<value>.*)$",
    )
    .expect("inline field regex")
});

static BRACKET_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?P<attr>[_*~`]*[\w][\w \t\-]*?[_*~`]*)(?P<sep>[ \t]*::[ \t]*)(?P<value>[^\]]*)\]")
        .expect("bracket field regex")
});

static PAREN_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((?P<attr>[_*~`]*[\w][\w \t\-]*?[_*~`]*)(?P<sep>[ \t]*::[ \t]*)(?P<value>[^)]*)\)")
        .expect("parenthesis field regex")
});

static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[\[[^\]\n]*\]\]").expect("wikilink regex"));

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s(\[,])#(?P<tag>[\w\-/]*[A-Za-z_\-/][\w\-/]*)").expect("tag regex")
});

/// Inline enclosure markers around an embedded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Enclosure {
    Brackets,
    Parenthesis,
}

impl Enclosure {
    pub fn open(&self) -> char {
        match self {
            Enclosure::Brackets => '[',
            Enclosure::Parenthesis => '(',
        }
    }

    pub fn close(&self) -> char {
        match self {
            Enclosure::Brackets => ']',
            Enclosure::Parenthesis => ')',
        }
    }
}

/// A recognized field occurrence within one line.
///
/// `start..start + length` spans `raw_attribute`, `separator` and `raw_value`. Frontmatter
/// indentation and list markers, inline line prefixes and enclosure characters lie outside that
/// span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Logical field name: decorations and surrounding whitespace stripped.
    pub attribute: String,
    /// Field name exactly as written.
    pub raw_attribute: String,
    /// `:` or `::` with its surrounding spacing.
    pub separator: String,
    pub raw_value: String,
    pub start: usize,
    pub length: usize,
    pub enclosure: Option<Enclosure>,
}

impl FieldMatch {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Text of the match with a different value, keeping name decorations and spacing.
    pub fn with_value(&self, value: &str) -> String {
        let separator = if value.is_empty() {
            self.separator.trim_end().to_string()
        } else if self.separator.ends_with(char::is_whitespace) {
            self.separator.clone()
        } else if self.separator.trim() == ":" {
            format!("{} ", self.separator.trim_end())
        } else {
            self.separator.clone()
        };
        format!("{}{}{}", self.raw_attribute, separator, value)
    }
}

/// A frontmatter field line: indentation, optional list marker and the field itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterMatch {
    pub indent: String,
    pub item_marker: Option<String>,
    pub field: FieldMatch,
}

/// Strip decoration markers from a raw attribute to obtain the logical field name.
pub fn strip_decorations(raw_attribute: &str) -> String {
    raw_attribute
        .trim()
        .trim_matches(|c| DECORATIONS.contains(&c))
        .trim()
        .to_string()
}

/// Recognize a frontmatter `key: value` line.
pub fn parse_frontmatter_line(line: &str) -> Option<FrontmatterMatch> {
    let caps = FRONTMATTER_FIELD.captures(line)?;
    let indent = caps.name("indent")?;
    let attr = caps.name("attr")?;
    let sep = caps.name("sep")?;
    let value = caps.name("value")?;
    let attribute = strip_decorations(attr.as_str());
    if attribute.is_empty() {
        return None;
    }
    Some(FrontmatterMatch {
        indent: indent.as_str().to_string(),
        item_marker: caps.name("item").map(|m| m.as_str().to_string()),
        field: FieldMatch {
            attribute,
            raw_attribute: attr.as_str().to_string(),
            separator: sep.as_str().to_string(),
            raw_value: value.as_str().to_string(),
            start: attr.start(),
            length: value.end() - attr.start(),
            enclosure: None,
        },
    })
}

/// Recognize a frontmatter sequence item (`- value`) that is not itself a `key: value` pair.
/// Returns the indentation and the item value.
pub fn parse_frontmatter_item(line: &str) -> Option<(String, String)> {
    if parse_frontmatter_line(line).is_some() {
        return None;
    }
    let caps = FRONTMATTER_ITEM.captures(line)?;
    Some((
        caps.name("indent")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        caps.name("value")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    ))
}

/// Replace every wikilink with a same-length string free of enclosure characters, so that
/// link text never collides with field delimiters. Offsets into the masked string are offsets
/// into `line`.
fn mask_links(line: &str) -> String {
    let mut masked = line.to_string();
    for link in WIKILINK.find_iter(line) {
        let replacement = link
            .as_str()
            .chars()
            .map(|c| match c {
                '[' => '\u{1}',
                ']' => '\u{2}',
                '(' => '\u{3}',
                ')' => '\u{4}',
                other => other,
            })
            .collect::<String>();
        masked.replace_range(link.range(), &replacement);
    }
    masked
}

/// Recognize inline `name:: value` fields in a body line, ordered by offset and non-overlapping.
pub fn parse_inline_fields(line: &str) -> Vec<FieldMatch> {
    let masked = mask_links(line);

    if let Some(caps) = FULL_LINE_FIELD.captures(&masked) {
        if let (Some(attr), Some(sep), Some(value)) =
            (caps.name("attr"), caps.name("sep"), caps.name("value"))
        {
            let attribute = strip_decorations(&line[attr.range()]);
            if !attribute.is_empty() {
                return vec![FieldMatch {
                    attribute,
                    raw_attribute: line[attr.range()].to_string(),
                    separator: line[sep.range()].to_string(),
                    raw_value: line[value.range()].to_string(),
                    start: attr.start(),
                    length: value.end() - attr.start(),
                    enclosure: None,
                }];
            }
        }
    }

    let mut matches = Vec::new();
    for (regex, enclosure) in [
        (&*BRACKET_FIELD, Enclosure::Brackets),
        (&*PAREN_FIELD, Enclosure::Parenthesis),
    ] {
        for caps in regex.captures_iter(&masked) {
            let (Some(attr), Some(sep), Some(value)) =
                (caps.name("attr"), caps.name("sep"), caps.name("value"))
            else {
                continue;
            };
            let attribute = strip_decorations(&line[attr.range()]);
            if attribute.is_empty() {
                continue;
            }
            matches.push(FieldMatch {
                attribute,
                raw_attribute: line[attr.range()].to_string(),
                separator: line[sep.range()].to_string(),
                raw_value: line[value.range()].to_string(),
                start: attr.start(),
                length: value.end() - attr.start(),
                enclosure: Some(enclosure),
            });
        }
    }
    matches.sort_by_key(|m| m.start);
    // enclosures of one kind may nest inside the other; keep the outermost, first match
    let mut kept: Vec<FieldMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        if kept.last().is_some_and(|prev| m.start <= prev.end() + 1) {
            continue;
        }
        kept.push(m);
    }
    kept
}

/// Line bounds `(open, close)` of the frontmatter block: the first line must be the delimiter
/// and a closing delimiter must follow.
pub fn split_frontmatter<S: AsRef<str>>(lines: &[S]) -> Option<(usize, usize)> {
    let is_delimiter = |line: &str| line.trim_end() == FRONTMATTER_DELIMITER;
    if !lines.first().is_some_and(|l| is_delimiter(l.as_ref())) {
        return None;
    }
    lines
        .iter()
        .skip(1)
        .position(|l| is_delimiter(l.as_ref()))
        .map(|idx| (0, idx + 1))
}

/// Parse the text between frontmatter delimiters into a JSON object.
///
/// Malformed YAML yields an empty object; the error is logged, never propagated.
pub fn parse_yaml_block(block: &str) -> Map<String, Value> {
    if block.trim().is_empty() {
        return Map::new();
    }
    match serde_yaml::from_str::<serde_yaml::Value>(block)
        .map_err(BuildonomyError::from)
        .and_then(|yaml| serde_json::to_value(yaml).map_err(BuildonomyError::from))
    {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!("Frontmatter is not a mapping: {:?}", other);
            Map::new()
        }
        Err(e) => {
            tracing::warn!("Malformed frontmatter treated as empty: {}", e);
            Map::new()
        }
    }
}

/// Tags of a document: the `tags`/`tag` frontmatter entries plus `#tag` occurrences in the body.
/// Returned without the leading `#`, de-duplicated, in order of appearance.
pub fn extract_tags(frontmatter: &Map<String, Value>, body: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: &str| {
        let tag = tag.trim().trim_start_matches('#');
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };
    for key in ["tags", "tag"] {
        match frontmatter.get(key) {
            Some(Value::String(s)) => s.split([',', ' ']).for_each(&mut push),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str())
                .for_each(&mut push),
            _ => {}
        }
    }
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        for caps in TAG.captures_iter(line) {
            if let Some(tag) = caps.name("tag") {
                push(tag.as_str());
            }
        }
    }
    tags
}

/// Wikilinks appearing anywhere in the text, brackets included.
pub fn extract_links(text: &str) -> Vec<String> {
    WIKILINK
        .find_iter(text)
        .map(|m| m.as_str().trim_start_matches('!').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_lines() {
        let m = parse_frontmatter_line("title: Kimi no Na Wa").unwrap();
        assert_eq!(m.field.attribute, "title");
        assert_eq!(m.field.raw_value, "Kimi no Na Wa");
        assert_eq!(m.field.start, 0);
        assert_eq!(m.field.length, "title: Kimi no Na Wa".len());

        let m = parse_frontmatter_line("  - name: Taki").unwrap();
        assert_eq!(m.indent, "  ");
        assert_eq!(m.item_marker.as_deref(), Some("- "));
        assert_eq!(m.field.attribute, "name");
        assert_eq!(m.field.start, 4);

        let m = parse_frontmatter_line("url: http://example.com").unwrap();
        assert_eq!(m.field.attribute, "url");
        assert_eq!(m.field.raw_value, "http://example.com");

        let m = parse_frontmatter_line("genres:").unwrap();
        assert_eq!(m.field.raw_value, "");
        assert_eq!(m.field.separator, ":");

        assert!(parse_frontmatter_line("---").is_none());
        assert!(parse_frontmatter_line("  - Drama").is_none());
        assert!(parse_frontmatter_line("# comment: here").is_none());
        assert_eq!(
            parse_frontmatter_item("  - Drama"),
            Some(("  ".to_string(), "Drama".to_string()))
        );
        assert_eq!(parse_frontmatter_item("  - name: x"), None);
    }

    #[test]
    fn test_full_line_inline_fields() {
        let line = "> - **status**:: done";
        let matches = parse_inline_fields(line);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.attribute, "status");
        assert_eq!(m.raw_attribute, "**status**");
        assert_eq!(m.raw_value, "done");
        assert_eq!(&line[m.start..m.end()], "**status**:: done");
        assert_eq!(m.enclosure, None);
    }

    #[test]
    fn test_enclosed_inline_fields() {
        let line = "Met [[Taki (a:: b)|Taki]] (mood:: happy) and [rating:: 5] [[Mitsuha]]";
        let matches = parse_inline_fields(line);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].attribute, "mood");
        assert_eq!(matches[0].enclosure, Some(Enclosure::Parenthesis));
        assert_eq!(&line[matches[0].start..matches[0].end()], "mood:: happy");
        assert_eq!(matches[1].attribute, "rating");
        assert_eq!(matches[1].raw_value, "5");
        assert_eq!(matches[1].enclosure, Some(Enclosure::Brackets));
        assert!(matches[0].start < matches[1].start);
    }

    #[test]
    fn test_links_never_split_fields() {
        let line = "related:: [[A (draft)]], [[B]]";
        let matches = parse_inline_fields(line);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].raw_value, "[[A (draft)]], [[B]]");
        assert!(parse_inline_fields("just a [[link:: not a field]]").is_empty());
    }

    #[test]
    fn test_frontmatter_split_and_yaml() {
        let lines = vec!["---", "a: 1", "---", "body"];
        assert_eq!(split_frontmatter(&lines), Some((0, 2)));
        assert_eq!(split_frontmatter(&["---", "a: 1"]), None);
        assert_eq!(split_frontmatter(&["body", "---"]), None);
        let map = parse_yaml_block("a: 1\nb: [x, y]");
        assert_eq!(map.get("a"), Some(&Value::from(1)));
        assert!(parse_yaml_block("a: [unclosed").is_empty());
    }

    #[test]
    fn test_tags_and_links() {
        let fm = parse_yaml_block("tags: [anime, media/film]");
        let tags = extract_tags(&fm, "text #draft and #anime\n```\n#notatag\n```\nissue #12");
        assert_eq!(tags, vec!["anime", "media/film", "draft"]);
        assert_eq!(
            extract_links("see [[A]] and ![[img.png]]"),
            vec!["[[A]]", "[[img.png]]"]
        );
    }
}
