//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use noet_fields::{config::IndexSettings, index::FieldIndex, store::MemoryStore, vault::MemoryVault};
use std::sync::Arc;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A small library vault: a `Book` class bound to the `library` folder, an `Author` class bound
/// by tag whose `books` lookup lists the books written by the author, and a `pageCount` summary.
#[allow(dead_code)]
pub fn library_vault() -> Arc<MemoryVault> {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/Book.md",
        "---
filesPaths: library
fields:
  - {name: author, type: File}
  - {name: pages, type: Number, options: {min: 0}}
  - {name: genres, type: Multi, options: {display: indentedList}}
---
",
    );
    vault.insert(
        "fileClasses/Author.md",
        "---
mapWithTag: true
fields:
  - {name: books, type: Lookup, options: {query: '\"library\"', targetFieldName: author, output: LinksBulletList}}
  - {name: pageCount, type: Lookup, options: {query: '\"library\"', targetFieldName: author, output: BuiltinSummarizing, builtinSummary: Sum, summarizedFieldName: pages}}
---
",
    );
    vault.insert("authors/Herbert.md", "---\ntags: [Author]\n---\n");
    vault.insert(
        "library/Dune.md",
        "---\nauthor: \"[[Herbert]]\"\npages: 412\n---\n# Dune\n",
    );
    vault.insert(
        "library/Children of Dune.md",
        "---\nauthor: \"[[authors/Herbert]]\"\n---\npages:: 444\n",
    );
    vault.insert("library/Emma.md", "---\nauthor: \"[[Austen]]\"\npages: 300\n---\n");
    vault
}

#[allow(dead_code)]
pub fn memory_index(vault: Arc<MemoryVault>) -> FieldIndex<MemoryVault, MemoryStore> {
    FieldIndex::new(vault, Arc::new(MemoryStore::new()), IndexSettings::default())
}
