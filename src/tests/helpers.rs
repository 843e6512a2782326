//! Shared test utilities for index, resolver and lookup tests

use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    config::IndexSettings,
    fields::{FieldDecl, FieldKind},
    index::FieldIndex,
    store::MemoryStore,
    vault::MemoryVault,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn decl(name: &str, kind: FieldKind, options: Value) -> FieldDecl {
    FieldDecl {
        id: None,
        name: name.to_string(),
        kind,
        options,
        path: None,
    }
}

pub fn input_decl(name: &str) -> FieldDecl {
    decl(name, FieldKind::Input, Value::Null)
}

/// Frontmatter of a class document declaring `fields` (already YAML list items) and any
/// `extra` top-level keys.
pub fn class_doc(extra: &str, fields: &[&str]) -> String {
    let mut text = String::from("---\n");
    for line in extra.lines().filter(|l| !l.trim().is_empty()) {
        text.push_str(line);
        text.push('\n');
    }
    if !fields.is_empty() {
        text.push_str("fields:\n");
        for field in fields {
            text.push_str(&format!("  - {field}\n"));
        }
    }
    text.push_str("---\n");
    text
}

/// A people vault: a `Person` class with a `related` lookup of everyone managed by the
/// document, and three people of which only A reports to Boss.
pub fn people_vault() -> Arc<MemoryVault> {
    init_logging();
    let vault = Arc::new(MemoryVault::new());
    vault.insert(
        "fileClasses/Person.md",
        &class_doc(
            "mapWithTag: true",
            &[
                "{name: manager, type: File}",
                "{name: related, type: Lookup, options: {query: \"#Person\", targetFieldName: manager}}",
            ],
        ),
    );
    vault.insert("people/Boss.md", "---\ntags: [Person]\n---\nBoss page\n");
    vault.insert(
        "people/A.md",
        "---\ntags: [Person]\nmanager: \"[[people/Boss]]\"\n---\n",
    );
    vault.insert(
        "people/B.md",
        "---\ntags: [Person]\nmanager: \"[[Someone Else]]\"\n---\n",
    );
    vault
}

pub fn memory_index(vault: Arc<MemoryVault>) -> FieldIndex<MemoryVault, MemoryStore> {
    FieldIndex::new(vault, Arc::new(MemoryStore::new()), IndexSettings::default())
}

pub fn number_options(min: f64, max: f64) -> Value {
    json!({"min": min, "max": max})
}
