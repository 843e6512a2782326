//! Contracts of the external collaborators the index consumes, plus an in-memory vault.
//!
//! A host supplies a [DocumentStore] (document text) and a [MetadataCache] (parsed frontmatter,
//! tags, links and a resolution progress counter). [MemoryVault] implements both and is what the
//! tests and embedders without their own host use.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::{mpsc::UnboundedSender, watch};

use crate::{
    error::BuildonomyError,
    event::VaultEvent,
    parser::{extract_links, extract_tags, parse_inline_fields, parse_yaml_block, split_frontmatter},
    paths::{as_wikilink, VaultPath},
};

/// What the metadata cache knows about one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub path: String,
    pub frontmatter: Map<String, Value>,
    /// Line numbers of the opening and closing frontmatter delimiters.
    pub frontmatter_bounds: Option<(usize, usize)>,
    /// Tags without the leading `#`.
    pub tags: Vec<String>,
    /// Wikilinks found anywhere in the document, brackets included.
    pub links: Vec<String>,
    /// Body `key:: value` fields. The first occurrence of a name wins.
    pub inline: Map<String, Value>,
}

impl DocumentMeta {
    pub fn from_text<S: Into<String>>(path: S, text: &str) -> DocumentMeta {
        let path = path.into();
        let lines: Vec<&str> = text.split('\n').collect();
        let frontmatter_bounds = split_frontmatter(&lines);
        let (frontmatter, body_start) = match frontmatter_bounds {
            Some((open, close)) => (parse_yaml_block(&lines[open + 1..close].join("\n")), close + 1),
            None => (Map::new(), 0),
        };
        let body = lines.get(body_start..).unwrap_or_default().join("\n");
        let mut inline = Map::new();
        for line in lines.iter().skip(body_start) {
            for m in parse_inline_fields(line) {
                if !inline.contains_key(&m.attribute) {
                    inline.insert(m.attribute, Value::String(m.raw_value.trim().to_string()));
                }
            }
        }
        DocumentMeta {
            tags: extract_tags(&frontmatter, &body),
            links: extract_links(text),
            path,
            frontmatter,
            frontmatter_bounds,
            inline,
        }
    }

    /// Value of a field by name: frontmatter first, then inline fields.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.frontmatter
            .get(name)
            .or_else(|| self.inline.get(name))
    }

    /// Evaluation context for formulas: every field value plus a `file` object.
    pub fn fields_context(&self) -> Map<String, Value> {
        let mut context = self.inline.clone();
        for (key, value) in self.frontmatter.iter() {
            context.insert(key.clone(), value.clone());
        }
        let vp = VaultPath::new(&self.path);
        let mut file = Map::new();
        file.insert("path".to_string(), Value::String(self.path.clone()));
        file.insert("name".to_string(), Value::String(vp.filestem().to_string()));
        file.insert("folder".to_string(), Value::String(vp.dir().to_string()));
        file.insert("link".to_string(), Value::String(as_wikilink(&self.path)));
        file.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        context.insert("file".to_string(), Value::Object(file));
        context
    }
}

/// Full-text access to the documents of a vault.
pub trait DocumentStore: Sync {
    fn read(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<String, BuildonomyError>> + Send;

    fn write(
        &self,
        path: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), BuildonomyError>> + Send;

    /// All document paths, sorted.
    fn list(&self) -> Vec<String>;

    fn exists(&self, path: &str) -> bool;
}

/// The host's parsed view of the vault.
pub trait MetadataCache: Sync {
    fn metadata(&self, path: &str) -> Option<DocumentMeta>;

    /// Number of documents whose metadata is still being resolved.
    fn in_progress(&self) -> usize;

    /// Receiver observing the in-progress count; the count reaching zero is the readiness signal.
    fn resolution(&self) -> watch::Receiver<usize>;

    /// Bookmark group path mapped to the document paths bookmarked in it.
    fn bookmark_groups(&self) -> BTreeMap<String, Vec<String>>;
}

/// Documents and their metadata held in memory.
#[derive(Debug)]
pub struct MemoryVault {
    docs: RwLock<BTreeMap<String, String>>,
    meta: RwLock<BTreeMap<String, DocumentMeta>>,
    bookmarks: RwLock<BTreeMap<String, Vec<String>>>,
    progress: watch::Sender<usize>,
    events: RwLock<Option<UnboundedSender<VaultEvent>>>,
    hold_writes: RwLock<bool>,
}

impl Default for MemoryVault {
    fn default() -> Self {
        let (progress, _) = watch::channel(0);
        MemoryVault {
            docs: RwLock::default(),
            meta: RwLock::default(),
            bookmarks: RwLock::default(),
            progress,
            events: RwLock::default(),
            hold_writes: RwLock::default(),
        }
    }
}

impl MemoryVault {
    pub fn new() -> MemoryVault {
        MemoryVault::default()
    }

    /// Forward every document change to `tx`.
    pub fn watch_events(&self, tx: UnboundedSender<VaultEvent>) {
        *self.events.write() = Some(tx);
    }

    fn emit(&self, event: VaultEvent) {
        if let Some(tx) = self.events.read().as_ref() {
            if let Err(e) = tx.send(event) {
                tracing::debug!("Vault event receiver dropped: {}", e);
            }
        }
    }

    /// Create or replace a document.
    pub fn insert<P: Into<String>>(&self, path: P, text: &str) {
        let path = path.into();
        self.meta
            .write()
            .insert(path.clone(), DocumentMeta::from_text(path.clone(), text));
        self.docs.write().insert(path.clone(), text.to_string());
        self.emit(VaultEvent::Modified(path));
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), BuildonomyError> {
        let text = self
            .docs
            .write()
            .remove(from)
            .ok_or_else(|| BuildonomyError::NotFound(from.to_string()))?;
        self.meta.write().remove(from);
        self.meta
            .write()
            .insert(to.to_string(), DocumentMeta::from_text(to, &text));
        self.docs.write().insert(to.to_string(), text);
        for paths in self.bookmarks.write().values_mut() {
            for path in paths.iter_mut().filter(|p| p.as_str() == from) {
                *path = to.to_string();
            }
        }
        self.emit(VaultEvent::Renamed {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    pub fn delete(&self, path: &str) -> Result<(), BuildonomyError> {
        self.docs
            .write()
            .remove(path)
            .ok_or_else(|| BuildonomyError::NotFound(path.to_string()))?;
        self.meta.write().remove(path);
        self.emit(VaultEvent::Deleted(path.to_string()));
        Ok(())
    }

    pub fn set_bookmarks<G: Into<String>>(&self, group: G, paths: Vec<String>) {
        self.bookmarks.write().insert(group.into(), paths);
    }

    /// Mark one more document as mid-resolution.
    pub fn hold_resolution(&self) {
        self.progress.send_modify(|count| *count += 1);
    }

    /// Mark one pending resolution as finished.
    pub fn release_resolution(&self) {
        self.progress
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    /// Leave every document written through [DocumentStore::write] mid-resolution until a
    /// matching [MemoryVault::release_resolution], as a host re-parsing in the background would.
    pub fn hold_on_write(&self, hold: bool) {
        *self.hold_writes.write() = hold;
    }

    /// Stored text, synchronously.
    pub fn text(&self, path: &str) -> Option<String> {
        self.docs.read().get(path).cloned()
    }
}

impl DocumentStore for MemoryVault {
    async fn read(&self, path: &str) -> Result<String, BuildonomyError> {
        self.text(path)
            .ok_or_else(|| BuildonomyError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), BuildonomyError> {
        if !self.exists(path) {
            return Err(BuildonomyError::NotFound(path.to_string()));
        }
        if *self.hold_writes.read() {
            self.hold_resolution();
        }
        self.insert(path, text);
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        self.docs.read().keys().cloned().collect()
    }

    fn exists(&self, path: &str) -> bool {
        self.docs.read().contains_key(path)
    }
}

impl MetadataCache for MemoryVault {
    fn metadata(&self, path: &str) -> Option<DocumentMeta> {
        self.meta.read().get(path).cloned()
    }

    fn in_progress(&self) -> usize {
        *self.progress.borrow()
    }

    fn resolution(&self) -> watch::Receiver<usize> {
        self.progress.subscribe()
    }

    fn bookmark_groups(&self) -> BTreeMap<String, Vec<String>> {
        self.bookmarks.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOTE: &str = "---\ntags: [media/anime]\nfileClass: Movie\n---\nSee [[Taki]] #favorite\nrating:: 5\n";

    #[test]
    fn test_meta_from_text() {
        let meta = DocumentMeta::from_text("movies/Your Name.md", NOTE);
        assert_eq!(meta.frontmatter_bounds, Some((0, 3)));
        assert_eq!(meta.frontmatter.get("fileClass"), Some(&json!("Movie")));
        assert_eq!(meta.tags, vec!["media/anime", "favorite"]);
        assert_eq!(meta.links, vec!["[[Taki]]"]);
        assert_eq!(meta.field("rating"), Some(&json!("5")));

        let ctx = meta.fields_context();
        assert_eq!(ctx["file"]["name"], json!("Your Name"));
        assert_eq!(ctx["file"]["link"], json!("[[movies/Your Name]]"));
    }

    #[tokio::test]
    async fn test_memory_vault() {
        let vault = MemoryVault::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        vault.watch_events(tx);
        vault.insert("a.md", NOTE);
        assert_eq!(vault.read("a.md").await.unwrap(), NOTE);
        assert!(vault.write("missing.md", "x").await.is_err());
        vault.rename("a.md", "b.md").unwrap();
        assert!(!vault.exists("a.md"));
        assert!(vault.metadata("b.md").is_some());
        vault.delete("b.md").unwrap();
        assert!(vault.list().is_empty());

        assert_eq!(rx.recv().await, Some(VaultEvent::Modified("a.md".into())));
        assert_eq!(
            rx.recv().await,
            Some(VaultEvent::Renamed {
                from: "a.md".into(),
                to: "b.md".into()
            })
        );
        assert_eq!(rx.recv().await, Some(VaultEvent::Deleted("b.md".into())));

        let mut resolution = vault.resolution();
        vault.hold_resolution();
        assert_eq!(vault.in_progress(), 1);
        vault.release_resolution();
        resolution.wait_for(|n| *n == 0).await.unwrap();
    }
}
