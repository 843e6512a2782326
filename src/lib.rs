//! # noet-fields
//!
//! A typed metadata layer for vaults of Markdown notes.
//!
//! Notes carry fields in two places: YAML frontmatter, and `key:: value` inline fields in the
//! body (bare, as list items, or inside blockquotes and callouts). noet-fields declares those
//! fields through **classes** (documents in a class folder listing typed field declarations),
//! binds classes to notes (by explicit membership, tag, folder, bookmark group or saved query),
//! resolves every note's effective field list, and keeps computed fields (lookups and formulas)
//! written back into the notes.
//!
//! ## Overview
//!
//! - **[`fields`]**: the [`fields::Field`] sum type, per-kind options and value rendering
//! - **[`parser`]**: line-level syntax (frontmatter split, inline fields, tags, links)
//! - **[`document`]**: the positional line/node model used to read and surgically edit a note
//!   while leaving every other byte untouched
//! - **[`fileclass`]** and **[`resolver`]**: class definitions, inheritance and bindings
//! - **[`index`]**: [`index::FieldIndex`], the per-vault index and its passes
//! - **[`lookup`]**, **[`query`]**, **[`formula`]**: computed field evaluation
//! - **[`queue`]**: serialized task execution gated on metadata cache readiness
//! - **[`vault`]** and **[`store`]**: contracts of the document store, metadata cache and
//!   persisted value store, with in-memory implementations
//! - **[`config`]**: [`config::IndexSettings`] and its TOML provider
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use noet_fields::{
//!     config::IndexSettings, index::FieldIndex, store::MemoryStore, vault::MemoryVault,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = Arc::new(MemoryVault::new());
//!     vault.insert(
//!         "fileClasses/Book.md",
//!         "---\nmapWithTag: true\nfields:\n  - {name: pages, type: Number}\n---\n",
//!     );
//!     vault.insert("library/Dune.md", "---\ntags: [Book]\n---\npages:: 412\n");
//!
//!     let mut index = FieldIndex::new(vault, Arc::new(MemoryStore::new()), IndexSettings::default());
//!     index.full_index(false).await?;
//!     for field in index.fields_for("library/Dune.md") {
//!         println!("{} ({})", field.name, field.kind());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `service`: [`db::SqliteStore`], a SQLite backed [`store::FieldValueStore`]

pub mod config;
#[cfg(feature = "service")]
pub mod db;
pub mod document;
pub mod error;
pub mod event;
pub mod fields;
pub mod fileclass;
pub mod formula;
pub mod index;
pub mod lookup;
pub mod parser;
pub mod paths;
pub mod query;
pub mod queue;
pub mod resolver;
pub mod store;
#[cfg(test)]
mod tests;
pub mod vault;

pub use error::*;
