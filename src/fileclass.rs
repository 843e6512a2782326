//! Class definitions ("fileClasses"): named, inheritable bundles of field declarations.
//!
//! A class is declared by a document in the class folder; its file stem is the class name and
//! its frontmatter carries the declarations:
//!
//! ```yaml
//! ---
//! extends: Media
//! excludes: [cover]
//! mapWithTag: true
//! tagNames: [anime]
//! filesPaths: [movies]
//! bookmarksGroups: [watchlist]
//! savedQuery: "#film and not \"archive\""
//! fields:
//!   - name: rating
//!     type: Number
//!     options: {min: 0, max: 10}
//! ---
//! ```

use serde_json::{Map, Value};

use crate::{
    fields::{Field, FieldDecl},
    paths::{link_target, VaultPath},
    vault::DocumentMeta,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileClass {
    pub name: String,
    /// Path of the defining document, when the class comes from the vault.
    pub path: Option<String>,
    pub fields: Vec<Field>,
    pub extends: Option<String>,
    /// Names of inherited fields this class suppresses.
    pub excludes: Vec<String>,
    /// Bind the class to the tag named after it.
    pub map_with_tag: bool,
    pub tag_names: Vec<String>,
    pub files_paths: Vec<String>,
    pub bookmarks_groups: Vec<String>,
    pub saved_query: Option<String>,
}

/// A string, comma separated string or list of strings.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    };
    match value {
        Some(Value::String(s)) => s.split(',').for_each(&mut push),
        Some(Value::Array(items)) => items.iter().for_each(|item| match item {
            Value::String(s) => push(s),
            // `[[Class]]` written without quotes parses as a nested list
            Value::Array(inner) => inner.iter().filter_map(Value::as_str).for_each(&mut push),
            _ => {}
        }),
        _ => {}
    }
    out
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl FileClass {
    pub fn new<S: Into<String>>(name: S) -> FileClass {
        FileClass {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a class from the frontmatter of its defining document.
    pub fn from_meta(meta: &DocumentMeta) -> FileClass {
        let name = VaultPath::new(&meta.path).filestem().to_string();
        let mut class = FileClass::from_frontmatter(&name, &meta.frontmatter);
        class.path = Some(meta.path.clone());
        class
    }

    pub fn from_frontmatter(name: &str, frontmatter: &Map<String, Value>) -> FileClass {
        let mut fields = Vec::new();
        if let Some(decls) = frontmatter.get("fields") {
            match decls {
                Value::Array(decls) => {
                    for raw in decls {
                        match serde_json::from_value::<FieldDecl>(raw.clone()) {
                            Ok(decl) => fields.push(Field::from_decl(&decl, Some(name))),
                            Err(e) => tracing::warn!(
                                "Skipping malformed field declaration in class {}: {}",
                                name,
                                e
                            ),
                        }
                    }
                }
                other => tracing::warn!("Class {} has non-list fields: {}", name, other),
            }
        }
        let extends = string_list(frontmatter.get("extends"))
            .first()
            .map(|parent| link_target(parent).to_string())
            .filter(|parent| parent != name);
        FileClass {
            name: name.to_string(),
            path: None,
            fields,
            extends,
            excludes: string_list(frontmatter.get("excludes")),
            map_with_tag: frontmatter
                .get("mapWithTag")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            tag_names: string_list(frontmatter.get("tagNames"))
                .into_iter()
                .map(|tag| tag.trim_start_matches('#').to_string())
                .collect(),
            files_paths: string_list(frontmatter.get("filesPaths")),
            bookmarks_groups: string_list(frontmatter.get("bookmarksGroups")),
            saved_query: non_empty(frontmatter.get("savedQuery")),
        }
    }

    /// Tags bound to this class.
    pub fn binding_tags(&self) -> Vec<String> {
        let mut tags = self.tag_names.clone();
        if self.map_with_tag && !tags.iter().any(|t| t == &self.name) {
            tags.insert(0, self.name.clone());
        }
        tags
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name && f.path.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldKind, FieldOptions};

    const MOVIE: &str = "---
extends: \"[[Media]]\"
excludes: cover, poster
mapWithTag: true
tagNames: [\"#anime\", film]
filesPaths: movies
savedQuery: \" \"
fields:
  - name: rating
    type: Number
    options: {min: 0, max: 10}
  - name: cast
    type: ObjectList
    id: c1
  - name: actor
    type: File
    path: c1
  - name: broken
    type: NotAKind
---
";

    #[test]
    fn test_class_from_document() {
        let class = FileClass::from_meta(&DocumentMeta::from_text("fileClasses/Movie.md", MOVIE));
        assert_eq!(class.name, "Movie");
        assert_eq!(class.extends.as_deref(), Some("Media"));
        assert_eq!(class.excludes, vec!["cover", "poster"]);
        assert_eq!(class.binding_tags(), vec!["Movie", "anime", "film"]);
        assert_eq!(class.files_paths, vec!["movies"]);
        assert_eq!(class.saved_query, None);
        assert_eq!(class.fields.len(), 3);

        let rating = class.field("rating").unwrap();
        assert_eq!(rating.kind(), FieldKind::Number);
        assert_eq!(rating.file_class_name.as_deref(), Some("Movie"));
        match &rating.options {
            FieldOptions::Number(opts) => assert_eq!(opts.max, Some(10.0)),
            other => panic!("unexpected options {other:?}"),
        }
        let actor = &class.fields[2];
        assert!(actor.fits_in(&class.fields[1]));
        assert!(class.field("actor").is_none());
    }

    #[test]
    fn test_self_extension_is_ignored() {
        let mut fm = Map::new();
        fm.insert("extends".to_string(), Value::String("Loop".to_string()));
        assert_eq!(FileClass::from_frontmatter("Loop", &fm).extends, None);
    }
}
