use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc, time::SystemTime};
use tokio::sync::mpsc::UnboundedSender;

use super::state::{FieldKey, FieldStatus, IndexState};
use crate::{
    config::{ExcludedPattern, IndexSettings},
    document::{Document, ExistingField, InsertTarget},
    error::BuildonomyError,
    event::{send_event, IndexEvent, VaultEvent},
    fields::Field,
    fileclass::FileClass,
    lookup::{self, LookupReport},
    paths::{IndexedPath, VaultPath},
    resolver::{ancestor_chains, Bindings, Resolver},
    store::FieldValueStore,
    vault::{DocumentMeta, DocumentStore, MetadataCache},
};

/// One edit of [FieldIndex::write_fields]. A `None` value removes the occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWrite {
    pub path: IndexedPath,
    pub value: Option<Value>,
    pub target: InsertTarget,
}

impl FieldWrite {
    pub fn set(path: IndexedPath, value: Value) -> FieldWrite {
        FieldWrite {
            path,
            value: Some(value),
            target: InsertTarget::Frontmatter,
        }
    }

    pub fn remove(path: IndexedPath) -> FieldWrite {
        FieldWrite {
            path,
            value: None,
            target: InsertTarget::Frontmatter,
        }
    }

    pub fn at(mut self, target: InsertTarget) -> FieldWrite {
        self.target = target;
        self
    }
}

/// Owns the [IndexState] of one vault and runs indexing passes over it.
pub struct FieldIndex<V, S> {
    vault: Arc<V>,
    store: Arc<S>,
    settings: IndexSettings,
    excluded: ExcludedPattern,
    state: IndexState,
    tx: Option<UnboundedSender<IndexEvent>>,
}

impl<V, S> FieldIndex<V, S>
where
    V: DocumentStore + MetadataCache,
    S: FieldValueStore,
{
    pub fn new(vault: Arc<V>, store: Arc<S>, settings: IndexSettings) -> FieldIndex<V, S> {
        FieldIndex {
            vault,
            store,
            excluded: settings.excluded_pattern(),
            settings,
            state: IndexState::default(),
            tx: None,
        }
    }

    /// Emit [IndexEvent]s on `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<IndexEvent>) -> FieldIndex<V, S> {
        self.tx = Some(tx);
        self
    }

    pub fn vault(&self) -> &Arc<V> {
        &self.vault
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Replace the settings. Takes effect on the next pass.
    pub fn set_settings(&mut self, settings: IndexSettings) {
        self.excluded = settings.excluded_pattern();
        self.settings = settings;
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn is_indexable(&self, path: &str) -> bool {
        self.settings.is_indexable_with(path, &self.excluded)
    }

    fn corpus(&self) -> Vec<DocumentMeta> {
        self.vault
            .list()
            .into_iter()
            .filter(|path| self.is_indexable(path))
            .filter_map(|path| {
                let meta = self.vault.metadata(&path);
                if meta.is_none() {
                    tracing::debug!("No metadata for {} yet, skipped", path);
                }
                meta
            })
            .collect()
    }

    fn load_classes(&mut self, corpus: &[DocumentMeta]) {
        self.state.flush_transient();
        let class_paths = self
            .vault
            .list()
            .into_iter()
            .filter(|path| {
                self.settings.is_class_file(path)
                    && VaultPath::new(path).ext() == self.settings.extension
            });
        let mut classes = BTreeMap::new();
        for path in class_paths {
            let Some(meta) = self.vault.metadata(&path) else {
                tracing::debug!("No metadata for class file {} yet, skipped", path);
                continue;
            };
            let class = FileClass::from_meta(&meta);
            if let Some(previous) = classes.insert(class.name.clone(), class) {
                tracing::warn!(
                    "Class {} defined twice, {:?} is shadowed by {}",
                    previous.name,
                    previous.path,
                    path
                );
            }
        }
        self.state.ancestors = ancestor_chains(&classes);
        self.state.bindings = Bindings::collect(&classes, &self.settings);
        self.state.query_matches = self.state.bindings.match_queries(corpus);
        self.state.classes = classes;
    }

    /// Recompute the resolved field list of every indexable document. Lookups are not evaluated.
    ///
    /// Returns the number of indexed documents.
    #[tracing::instrument(skip_all)]
    pub fn index_fields(&mut self) -> usize {
        let corpus = self.corpus();
        self.load_classes(&corpus);
        let bookmark_groups = self.vault.bookmark_groups();
        let resolver = Resolver {
            classes: &self.state.classes,
            ancestors: &self.state.ancestors,
            bindings: &self.state.bindings,
            query_matches: &self.state.query_matches,
            bookmark_groups: &bookmark_groups,
            settings: &self.settings,
        };
        let resolved: BTreeMap<String, _> = corpus
            .iter()
            .map(|meta| (meta.path.clone(), resolver.resolve(meta)))
            .collect();

        for stale in self
            .state
            .indexed_paths()
            .into_iter()
            .filter(|path| !resolved.contains_key(path))
        {
            tracing::debug!("{} is no longer indexed", stale);
            self.state.purge_path(&stale);
        }

        let now = SystemTime::now();
        let mut changed = 0;
        for (path, resolution) in resolved {
            let ids: Vec<String> = resolution.fields.iter().map(|f| f.id.clone()).collect();
            if self.state.previous.get(&path) != Some(&ids) {
                changed += 1;
                tracing::debug!(
                    "Field set of {} changed: classes {:?}, {} fields",
                    path,
                    resolution.classes,
                    ids.len()
                );
                self.state.last_change.insert(path.clone(), now);
                send_event(self.tx.as_ref(), IndexEvent::FieldsChanged(path.clone()));
            }
            self.state.previous.insert(path.clone(), ids);
            self.state.lookups.insert(
                path.clone(),
                resolution
                    .fields
                    .iter()
                    .filter(|f| f.path.is_none() && f.kind().is_computed())
                    .cloned()
                    .collect(),
            );
            self.state
                .classes_by_path
                .insert(path.clone(), resolution.classes);
            self.state.fields.insert(path, resolution.fields);
        }
        let orphans = self.state.prune_orphans();
        if orphans > 0 {
            tracing::debug!("Dropped {} values and statuses of undeclared fields", orphans);
        }
        let count = self.state.fields.len();
        tracing::info!(
            "Indexed fields of {} documents ({} changed, {} classes)",
            count,
            changed,
            self.state.classes.len()
        );
        count
    }

    /// Resolves once the metadata cache reports no document mid-resolution.
    pub async fn wait_for_resolution(&self) -> Result<(), BuildonomyError> {
        let mut resolution = self.vault.resolution();
        if *resolution.borrow() > 0 {
            tracing::debug!("Waiting for {} documents to resolve", *resolution.borrow());
        }
        resolution
            .wait_for(|count| *count == 0)
            .await
            .map(|_| ())
            .map_err(|e| BuildonomyError::Cache(format!("Metadata cache closed: {e}")))
    }

    /// Full pipeline: resolve field lists, then evaluate lookups and formulas once the metadata
    /// cache is settled, write results back and prune persisted records of documents that left
    /// the index. With `force_all`, every computed field is rewritten even when unchanged.
    ///
    /// Returns the number of indexed documents.
    #[tracing::instrument(skip_all, fields(force_all = force_all))]
    pub async fn full_index(&mut self, force_all: bool) -> Result<usize, BuildonomyError> {
        let count = self.index_fields();
        self.wait_for_resolution().await?;
        let corpus = self.corpus();
        let report = lookup::resolve(
            &mut self.state,
            self.vault.as_ref(),
            self.store.as_ref(),
            &self.settings,
            &corpus,
            force_all,
            self.tx.as_ref(),
        )
        .await;
        self.prune_store().await;
        let LookupReport {
            computed,
            changed,
            written,
            errors,
        } = report;
        tracing::info!(
            "Full index of {} documents: {} computed fields, {} changed, {} documents written, {} errors",
            count,
            computed,
            changed,
            written,
            errors
        );
        send_event(self.tx.as_ref(), IndexEvent::Indexed(count));
        Ok(count)
    }

    /// Delete persisted records whose document or field left the index. Store failures are
    /// logged; memory stays authoritative.
    async fn prune_store(&self) {
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Could not list persisted field values: {}", e);
                return;
            }
        };
        for record in records {
            let live = self
                .state
                .lookups
                .get(&record.path)
                .is_some_and(|fields| fields.iter().any(|f| f.id == record.field_id));
            if !live {
                tracing::debug!("Pruning persisted value {}", record.id);
                if let Err(e) = self.store.delete(&record.id).await {
                    tracing::error!("Could not prune persisted value {}: {}", record.id, e);
                }
            }
        }
    }

    pub fn fields_for(&self, path: &str) -> &[Field] {
        self.state
            .fields
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn classes_for(&self, path: &str) -> &[String] {
        self.state
            .classes_by_path
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Lookup and formula fields of a document.
    pub fn lookups_for(&self, path: &str) -> &[Field] {
        self.state
            .lookups
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn field_status(&self, key: &FieldKey) -> Option<&FieldStatus> {
        self.state.field_status.get(key)
    }

    pub fn statuses_for(&self, path: &str) -> Vec<(&FieldKey, &FieldStatus)> {
        self.state
            .field_status
            .iter()
            .filter(|(key, _)| key.path == path)
            .collect()
    }

    /// Last computed value of a lookup or formula field.
    pub fn computed_value(&self, key: &FieldKey) -> Option<&Value> {
        self.state.lookup_values.get(key)
    }

    /// When the resolved field set of `path` last changed.
    pub fn last_change(&self, path: &str) -> Option<SystemTime> {
        self.state.last_change.get(path).copied()
    }

    /// Indexed path of a top-level field of a document, by name.
    pub fn field_path(&self, path: &str, name: &str) -> Option<IndexedPath> {
        self.fields_for(path)
            .iter()
            .find(|f| f.name == name && f.path.is_none())
            .map(|f| IndexedPath::root(f.id.clone()))
    }

    /// Build the document model of `path` against its resolved fields.
    pub async fn document(&self, path: &str) -> Result<Document, BuildonomyError> {
        let text = self.vault.read(path).await?;
        Ok(Document::parse(
            path,
            &text,
            self.fields_for(path).to_vec(),
            self.settings.document_options(),
        ))
    }

    pub async fn existing_fields(&self, path: &str) -> Result<Vec<ExistingField>, BuildonomyError> {
        Ok(self.document(path).await?.existing_fields().to_vec())
    }

    /// Apply `writes` to one document. Either every write applies and the document is saved
    /// once, or the first failure is returned and nothing is saved.
    #[tracing::instrument(skip_all, fields(path = %path))]
    pub async fn write_fields(
        &mut self,
        path: &str,
        writes: Vec<FieldWrite>,
    ) -> Result<(), BuildonomyError> {
        if !self.state.fields.contains_key(path) {
            return Err(BuildonomyError::NotFound(format!("{path} is not indexed")));
        }
        let text = self.vault.read(path).await?;
        let mut doc = Document::parse(
            path,
            &text,
            self.fields_for(path).to_vec(),
            self.settings.document_options(),
        );
        for write in writes.iter() {
            match &write.value {
                Some(value) => doc.upsert(&write.path, value, write.target)?,
                None => doc.remove(&write.path)?,
            }
        }
        let rendered = doc.render();
        doc.discard();
        if rendered != text {
            self.vault.write(path, &rendered).await?;
            tracing::debug!("Wrote {} field edits to {}", writes.len(), path);
        }
        Ok(())
    }

    async fn move_records(&self, from: &str, to: &str) -> Result<(), BuildonomyError> {
        for record in self.store.get_all_by_path(from).await? {
            self.store.put(record.moved(to)).await?;
            self.store.delete(&record.id).await?;
        }
        Ok(())
    }

    async fn delete_records(&self, path: &str) -> Result<(), BuildonomyError> {
        for record in self.store.get_all_by_path(path).await? {
            self.store.delete(&record.id).await?;
        }
        Ok(())
    }

    /// React to a document store notification. In-memory state is updated first; a persisted
    /// store failure is logged and returned afterwards.
    #[tracing::instrument(skip_all, fields(event = %event))]
    pub async fn handle_event(&mut self, event: &VaultEvent) -> Result<(), BuildonomyError> {
        match event {
            VaultEvent::Modified(path) => {
                if self.settings.is_class_file(path) || self.is_indexable(path) {
                    self.index_fields();
                }
                Ok(())
            }
            VaultEvent::Renamed { from, to } => {
                self.state.rename_path(from, to);
                self.index_fields();
                self.move_records(from, to).await.inspect_err(|e| {
                    tracing::error!("Could not move persisted values {} -> {}: {}", from, to, e)
                })
            }
            VaultEvent::Deleted(path) => {
                let was_class = self.settings.is_class_file(path);
                self.state.purge_path(path);
                if was_class {
                    self.index_fields();
                }
                self.delete_records(path).await.inspect_err(|e| {
                    tracing::error!("Could not delete persisted values of {}: {}", path, e)
                })
            }
        }
    }
}
