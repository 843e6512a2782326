use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::UnboundedSender;

use crate::index::{FieldKey, FieldStatus};

/// Signals emitted by the [crate::index::FieldIndex] for UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEvent {
    /// A full indexing pass completed. Carries the number of indexed documents.
    Indexed(usize),
    /// The resolved field set of a document changed even if its text did not.
    FieldsChanged(String),
    /// A lookup/formula field changed status during a pass.
    FieldStatus(FieldKey, FieldStatus),
}

impl Display for IndexEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            IndexEvent::Indexed(count) => write!(f, "Indexed({count})"),
            IndexEvent::FieldsChanged(path) => write!(f, "FieldsChanged({path})"),
            IndexEvent::FieldStatus(key, status) => write!(f, "FieldStatus({key}: {status:?})"),
        }
    }
}

/// Send `event` when someone is listening. A dropped receiver is not an error for the index.
pub fn send_event(tx: Option<&UnboundedSender<IndexEvent>>, event: IndexEvent) {
    if let Some(tx) = tx {
        if let Err(e) = tx.send(event) {
            tracing::debug!("Index event receiver dropped: {}", e);
        }
    }
}

/// Document store notifications observed by the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultEvent {
    Modified(String),
    Renamed { from: String, to: String },
    Deleted(String),
}

impl VaultEvent {
    /// Path the event leaves behind in the vault, if any.
    pub fn current_path(&self) -> Option<&str> {
        match self {
            VaultEvent::Modified(path) => Some(path),
            VaultEvent::Renamed { to, .. } => Some(to),
            VaultEvent::Deleted(_) => None,
        }
    }
}

impl Display for VaultEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VaultEvent::Modified(path) => write!(f, "Modified({path})"),
            VaultEvent::Renamed { from, to } => write!(f, "Renamed({from} -> {to})"),
            VaultEvent::Deleted(path) => write!(f, "Deleted({path})"),
        }
    }
}
