use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

#[cfg(feature = "service")]
use sqlx::Error as SqlxError;

use crate::event::IndexEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum BuildonomyError {
    #[error("Field value cache error: {0}")]
    Cache(String),
    #[error("Field syntax error: {0}")]
    Codec(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Invalid query or formula: {0}")]
    Query(String),
    #[error("Class resolution error: {0}")]
    Resolution(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Persisted store error: {0}")]
    Store(String),
    #[error("Document write aborted: {0}")]
    Write(String),
}

impl BuildonomyError {
    /// Whether the error should be surfaced to the user as a notice rather than only logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BuildonomyError::Write(_) | BuildonomyError::Query(_) | BuildonomyError::NotFound(_)
        )
    }
}

impl From<StripPrefixError> for BuildonomyError {
    fn from(src: StripPrefixError) -> BuildonomyError {
        BuildonomyError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for BuildonomyError {
    fn from(src: toml::de::Error) -> BuildonomyError {
        BuildonomyError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for BuildonomyError {
    fn from(src: toml::ser::Error) -> BuildonomyError {
        BuildonomyError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for BuildonomyError {
    fn from(src: JsonError) -> BuildonomyError {
        BuildonomyError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for BuildonomyError {
    fn from(src: YamlError) -> BuildonomyError {
        BuildonomyError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<io::Error> for BuildonomyError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => BuildonomyError::NotFound(format!("{x}")),
            _ => BuildonomyError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for BuildonomyError {
    fn from(x: fmt::Error) -> Self {
        BuildonomyError::Codec(format!("{x}"))
    }
}

impl From<RegexError> for BuildonomyError {
    fn from(x: RegexError) -> Self {
        BuildonomyError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<TokioSendError<IndexEvent>> for BuildonomyError {
    fn from(x: TokioSendError<IndexEvent>) -> Self {
        BuildonomyError::Io(format!(
            "Channel update send Error, could not transmit index event {:?}",
            x.0
        ))
    }
}

#[cfg(feature = "service")]
impl From<SqlxError> for BuildonomyError {
    fn from(db_error: SqlxError) -> Self {
        BuildonomyError::Store(format!("database error: {db_error:?}"))
    }
}
