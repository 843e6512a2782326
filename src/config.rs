use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::PathBuf,
};

use crate::{
    document::DocumentOptions,
    error::BuildonomyError,
    fields::{Field, FieldDecl},
    paths::{normalize_folder, VaultPath},
};

pub const SETTINGS_FILE: &str = "settings.toml";

/// A saved query binding documents matching `query` to `class`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassQuery {
    pub query: String,
    pub class: String,
}

/// Settings of a [crate::index::FieldIndex].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Folder holding class definition documents. Documents in it are never indexed.
    pub class_files_path: String,
    /// Frontmatter key naming the classes a document declares for itself.
    pub class_attribute: String,
    /// Class applied to every indexed document, below all bound classes.
    pub global_class: Option<String>,
    /// Fields applied to every indexed document, below every class.
    pub preset_fields: Vec<FieldDecl>,
    /// Query bindings, in priority order.
    pub class_queries: Vec<ClassQuery>,
    pub excluded_folders: Vec<String>,
    /// Path suffixes excluded from indexing, e.g. `.excalidraw.md`.
    pub excluded_extensions: Vec<String>,
    /// Regular expression over the vault path. A malformed pattern excludes every document.
    pub excluded_regex: Option<String>,
    pub frontmatter_only: bool,
    /// Extension of indexable documents.
    pub extension: String,
    pub indented_list_default: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        IndexSettings {
            class_files_path: "fileClasses".to_string(),
            class_attribute: "fileClass".to_string(),
            global_class: None,
            preset_fields: vec![],
            class_queries: vec![],
            excluded_folders: vec![],
            excluded_extensions: vec![],
            excluded_regex: None,
            frontmatter_only: false,
            extension: "md".to_string(),
            indented_list_default: false,
        }
    }
}

impl IndexSettings {
    pub fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            frontmatter_only: self.frontmatter_only,
            indented_list_default: self.indented_list_default,
        }
    }

    pub fn preset_fields(&self) -> Vec<Field> {
        self.preset_fields
            .iter()
            .map(|decl| Field::from_decl(decl, None))
            .collect()
    }

    /// Whether `path` lies in the class definition folder.
    pub fn is_class_file(&self, path: &str) -> bool {
        let folder = normalize_folder(&self.class_files_path);
        !folder.is_empty() && VaultPath::new(path).is_under(&folder)
    }

    /// Compile `excluded_regex`. A malformed pattern is reported here, once.
    pub fn excluded_pattern(&self) -> ExcludedPattern {
        match self.excluded_regex.as_deref().filter(|re| !re.is_empty()) {
            None => ExcludedPattern::Unset,
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => ExcludedPattern::Compiled(re),
                Err(e) => {
                    tracing::warn!(
                        "Malformed exclusion pattern {:?} excludes every document: {}",
                        pattern,
                        e
                    );
                    ExcludedPattern::Malformed
                }
            },
        }
    }

    /// Whether a document takes part in indexing. Compiles `excluded_regex` on every call; use
    /// [IndexSettings::is_indexable_with] when checking many paths.
    pub fn is_indexable(&self, path: &str) -> bool {
        self.is_indexable_with(path, &self.excluded_pattern())
    }

    /// [IndexSettings::is_indexable] against an already compiled [ExcludedPattern].
    pub fn is_indexable_with(&self, path: &str, excluded: &ExcludedPattern) -> bool {
        let vp = VaultPath::new(path);
        if vp.ext() != self.extension || self.is_class_file(path) {
            return false;
        }
        if self
            .excluded_folders
            .iter()
            .filter(|folder| !normalize_folder(folder).is_empty())
            .any(|folder| vp.is_under(folder))
        {
            return false;
        }
        if self
            .excluded_extensions
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .any(|suffix| path.ends_with(suffix.as_str()))
        {
            return false;
        }
        !excluded.excludes(path)
    }
}

/// The compiled form of [IndexSettings::excluded_regex].
#[derive(Debug, Clone, Default)]
pub enum ExcludedPattern {
    #[default]
    Unset,
    Compiled(Regex),
    /// Excludes every document.
    Malformed,
}

impl ExcludedPattern {
    pub fn excludes(&self, path: &str) -> bool {
        match self {
            ExcludedPattern::Unset => false,
            ExcludedPattern::Compiled(re) => re.is_match(path),
            ExcludedPattern::Malformed => true,
        }
    }
}

pub trait SettingsProvider: Send + Sync {
    fn get_settings(&self) -> Result<IndexSettings, BuildonomyError>;
    fn set_settings(&self, settings: &IndexSettings) -> Result<(), BuildonomyError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlSettingsProvider {
    path: PathBuf,
}

impl TomlSettingsProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlSettingsProvider { path }
    }
}

impl SettingsProvider for TomlSettingsProvider {
    fn get_settings(&self) -> Result<IndexSettings, BuildonomyError> {
        tracing::debug!("Attempting to read settings from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Settings file not found, using defaults.");
            return Ok(IndexSettings::default());
        }
        let content = read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn set_settings(&self, settings: &IndexSettings) -> Result<(), BuildonomyError> {
        tracing::debug!("Attempting to write settings to: {:?}", &self.path);
        let toml_string = toml::to_string(settings)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
