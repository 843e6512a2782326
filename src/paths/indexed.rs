use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::BuildonomyError;

/// One step of an [IndexedPath]: a field id, plus the item index when the step passes through an
/// object-list item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathSegment {
    pub field_id: String,
    pub index: Option<usize>,
}

/// Fully-qualified location of a field occurrence inside nested object/object-list structures.
///
/// Rendered as `list[0]/child`: segments separated by `/`, object-list item indices in brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexedPath(Vec<PathSegment>);

impl IndexedPath {
    pub fn root<S: Into<String>>(field_id: S) -> IndexedPath {
        IndexedPath(vec![PathSegment {
            field_id: field_id.into(),
            index: None,
        }])
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Id of the field the path points at.
    pub fn field_id(&self) -> Option<&str> {
        self.0.last().map(|seg| seg.field_id.as_str())
    }

    /// Item index on the last segment, when the path designates an object-list item.
    pub fn index(&self) -> Option<usize> {
        self.0.last().and_then(|seg| seg.index)
    }

    pub fn child<S: Into<String>>(&self, field_id: S) -> IndexedPath {
        let mut segments = self.0.clone();
        segments.push(PathSegment {
            field_id: field_id.into(),
            index: None,
        });
        IndexedPath(segments)
    }

    /// Same path with the item index of the last segment set.
    pub fn with_index(&self, index: usize) -> IndexedPath {
        let mut segments = self.0.clone();
        if let Some(last) = segments.last_mut() {
            last.index = Some(index);
        }
        IndexedPath(segments)
    }

    /// Same path with the item index of the last segment cleared.
    pub fn without_index(&self) -> IndexedPath {
        let mut segments = self.0.clone();
        if let Some(last) = segments.last_mut() {
            last.index = None;
        }
        IndexedPath(segments)
    }

    /// The enclosing path: `list[0]/child` has parent `list[0]`.
    pub fn parent(&self) -> Option<IndexedPath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(IndexedPath(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl Display for IndexedPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|seg| match seg.index {
                Some(idx) => format!("{}[{}]", seg.field_id, idx),
                None => seg.field_id.clone(),
            })
            .collect::<Vec<String>>()
            .join("/");
        write!(f, "{rendered}")
    }
}

impl FromStr for IndexedPath {
    type Err = BuildonomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for raw in s.split('/').filter(|raw| !raw.is_empty()) {
            let segment = match raw.strip_suffix(']').and_then(|rest| rest.rsplit_once('[')) {
                Some((field_id, idx)) => PathSegment {
                    field_id: field_id.to_string(),
                    index: Some(idx.parse::<usize>().map_err(|e| {
                        BuildonomyError::Serialization(format!(
                            "Invalid item index in indexed path '{s}': {e}"
                        ))
                    })?),
                },
                None => PathSegment {
                    field_id: raw.to_string(),
                    index: None,
                },
            };
            segments.push(segment);
        }
        Ok(IndexedPath(segments))
    }
}

impl Serialize for IndexedPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IndexedPath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        IndexedPath::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_path_display_and_parse() {
        let path = IndexedPath::root("people").with_index(1).child("name");
        assert_eq!(path.to_string(), "people[1]/name");
        let parsed = IndexedPath::from_str("people[1]/name").unwrap();
        assert_eq!(parsed, path);
        assert_eq!(parsed.field_id(), Some("name"));
        assert_eq!(parsed.parent().unwrap().to_string(), "people[1]");
        assert_eq!(parsed.parent().unwrap().index(), Some(1));
        assert!(IndexedPath::from_str("people[x]").is_err());
    }
}
