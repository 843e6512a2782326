//! Field index: the per-vault answer to "which fields does this document have".
//!
//! # Module Organization
//!
//! - [`state`]: [IndexState], the maps owned by the index, split into state that survives between
//!   passes and state every pass rebuilds
//! - [`base`]: [FieldIndex], the passes (`index_fields`, `full_index`), accessors, writes and
//!   vault event handling
//!
//! Class resolution lives in [crate::resolver], lookup and formula evaluation in
//! [crate::lookup].

mod base;
pub mod state;

#[cfg(test)]
mod tests;

pub use base::{FieldIndex, FieldWrite};
pub use state::{FieldKey, FieldStatus, IndexState};
