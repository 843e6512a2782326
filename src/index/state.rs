use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    time::SystemTime,
};

use crate::{fields::Field, fileclass::FileClass, resolver::Bindings};

/// Identity of a computed field of one document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    pub path: String,
    pub class_name: Option<String>,
    pub field_name: String,
}

impl FieldKey {
    pub fn new(path: &str, field: &Field) -> FieldKey {
        FieldKey {
            path: path.to_string(),
            class_name: field.file_class_name.clone(),
            field_name: field.name.clone(),
        }
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.class_name {
            Some(class) => write!(f, "{}#{}.{}", self.path, class, self.field_name),
            None => write!(f, "{}#{}", self.path, self.field_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldStatus {
    UpToDate,
    Changed,
    Error(String),
}

/// Everything the [super::FieldIndex] knows, split into what survives between passes and what
/// every pass rebuilds from scratch.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    /// Resolved field list per document.
    pub fields: BTreeMap<String, Vec<Field>>,
    /// Classes applied per document, in priority order.
    pub classes_by_path: BTreeMap<String, Vec<String>>,
    /// Field ids of the previous pass, for change detection.
    pub previous: BTreeMap<String, Vec<String>>,
    pub last_change: BTreeMap<String, SystemTime>,
    /// Top-level lookup and formula fields per document.
    pub lookups: BTreeMap<String, Vec<Field>>,
    /// Last value computed for every lookup/formula field.
    pub lookup_values: BTreeMap<FieldKey, Value>,
    pub field_status: BTreeMap<FieldKey, FieldStatus>,
    /// Raw query results by query id.
    pub lookup_results: BTreeMap<String, BTreeSet<String>>,

    // Rebuilt every pass
    pub classes: BTreeMap<String, FileClass>,
    pub ancestors: BTreeMap<String, Vec<String>>,
    pub bindings: Bindings,
    pub query_matches: BTreeMap<String, BTreeSet<String>>,
}

impl IndexState {
    pub fn flush_transient(&mut self) {
        self.classes.clear();
        self.ancestors.clear();
        self.bindings = Bindings::default();
        self.query_matches.clear();
    }

    /// Forget every per-document entry of `path`.
    pub fn purge_path(&mut self, path: &str) {
        self.fields.remove(path);
        self.classes_by_path.remove(path);
        self.previous.remove(path);
        self.last_change.remove(path);
        self.lookups.remove(path);
        self.lookup_values.retain(|key, _| key.path != path);
        self.field_status.retain(|key, _| key.path != path);
    }

    /// Drop computed values and statuses of fields no longer among the document's lookups.
    pub fn prune_orphans(&mut self) -> usize {
        let lookups = &self.lookups;
        let live = |key: &FieldKey| {
            lookups.get(&key.path).is_some_and(|fields| {
                fields.iter().any(|f| {
                    f.name == key.field_name && f.file_class_name == key.class_name
                })
            })
        };
        let before = self.lookup_values.len() + self.field_status.len();
        self.lookup_values.retain(|key, _| live(key));
        self.field_status.retain(|key, _| live(key));
        before - self.lookup_values.len() - self.field_status.len()
    }

    /// Move every per-document entry of `from` to `to`.
    pub fn rename_path(&mut self, from: &str, to: &str) {
        fn take<V>(map: &mut BTreeMap<String, V>, from: &str, to: &str) {
            if let Some(value) = map.remove(from) {
                map.insert(to.to_string(), value);
            }
        }
        fn rekey<V>(map: &mut BTreeMap<FieldKey, V>, from: &str, to: &str) {
            let moved: Vec<FieldKey> = map.keys().filter(|k| k.path == from).cloned().collect();
            for key in moved {
                if let Some(value) = map.remove(&key) {
                    map.insert(
                        FieldKey {
                            path: to.to_string(),
                            ..key
                        },
                        value,
                    );
                }
            }
        }
        take(&mut self.fields, from, to);
        take(&mut self.classes_by_path, from, to);
        take(&mut self.previous, from, to);
        take(&mut self.last_change, from, to);
        take(&mut self.lookups, from, to);
        rekey(&mut self.lookup_values, from, to);
        rekey(&mut self.field_status, from, to);
    }

    /// Paths of every document with a resolved field list.
    pub fn indexed_paths(&self) -> BTreeSet<String> {
        self.fields.keys().cloned().collect()
    }
}
