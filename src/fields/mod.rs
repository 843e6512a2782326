//! Typed field declarations.
//!
//! A [Field] is a single sum type: shared identity (`id`, `name`, nesting `path`, owning class)
//! plus a [FieldOptions] payload tagged by kind. Behaviour that differs per kind (rendering,
//! validation, which containers may hold the field) dispatches on [FieldKind] with `match`,
//! see [render].

use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod options;
pub mod render;

pub use options::*;

/// Namespace for field ids derived from (class, parent, name) when a declaration carries none.
const UUID_NAMESPACE_FIELDS: Uuid = Uuid::from_bytes([
    0x7c, 0x3d, 0x21, 0x54, 0xc0, 0xa9, 0x43, 0x7b, 0x93, 0x24, 0x5f, 0x62, 0xad, 0xeb, 0x9a, 0x45,
]);

#[derive(Debug, Hash, PartialOrd, Ord, EnumSetType, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum FieldKind {
    Input,
    Number,
    Boolean,
    Date,
    DateTime,
    Time,
    Select,
    Cycle,
    Multi,
    File,
    MultiFile,
    Media,
    MultiMedia,
    Lookup,
    Formula,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "YAML")]
    Yaml,
    Object,
    ObjectList,
}

impl FieldKind {
    /// Kinds holding several values.
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            FieldKind::Multi | FieldKind::MultiFile | FieldKind::MultiMedia
        )
    }

    /// Kinds whose values are wikilinks.
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            FieldKind::File | FieldKind::MultiFile | FieldKind::Media | FieldKind::MultiMedia
        )
    }

    /// Kinds that own nested fields.
    pub fn is_container(&self) -> bool {
        matches!(self, FieldKind::Object | FieldKind::ObjectList)
    }

    /// Kinds whose value is computed by the lookup/formula engine.
    pub fn is_computed(&self) -> bool {
        matches!(self, FieldKind::Lookup | FieldKind::Formula)
    }

    /// Kinds that can only live in frontmatter: they need YAML structure to be expressed.
    pub fn frontmatter_only(&self) -> bool {
        matches!(
            self,
            FieldKind::Json | FieldKind::Yaml | FieldKind::Object | FieldKind::ObjectList
        )
    }

    /// Container kinds allowed to hold a field of this kind.
    pub fn compatible_parents(&self) -> EnumSet<FieldKind> {
        match self {
            FieldKind::Lookup | FieldKind::Formula => EnumSet::empty(),
            _ => FieldKind::Object | FieldKind::ObjectList,
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Kind-tagged option payload of a [Field].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOptions {
    Input(InputOptions),
    Number(NumberOptions),
    Boolean,
    Date(DateOptions),
    DateTime(DateOptions),
    Time(DateOptions),
    Select(SelectOptions),
    Cycle(CycleOptions),
    Multi(MultiOptions),
    File(LinkOptions),
    MultiFile(LinkOptions),
    Media(MediaOptions),
    MultiMedia(MediaOptions),
    Lookup(LookupOptions),
    Formula(FormulaOptions),
    Json,
    Yaml,
    Object(ObjectOptions),
    ObjectList(ObjectOptions),
}

impl FieldOptions {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldOptions::Input(_) => FieldKind::Input,
            FieldOptions::Number(_) => FieldKind::Number,
            FieldOptions::Boolean => FieldKind::Boolean,
            FieldOptions::Date(_) => FieldKind::Date,
            FieldOptions::DateTime(_) => FieldKind::DateTime,
            FieldOptions::Time(_) => FieldKind::Time,
            FieldOptions::Select(_) => FieldKind::Select,
            FieldOptions::Cycle(_) => FieldKind::Cycle,
            FieldOptions::Multi(_) => FieldKind::Multi,
            FieldOptions::File(_) => FieldKind::File,
            FieldOptions::MultiFile(_) => FieldKind::MultiFile,
            FieldOptions::Media(_) => FieldKind::Media,
            FieldOptions::MultiMedia(_) => FieldKind::MultiMedia,
            FieldOptions::Lookup(_) => FieldKind::Lookup,
            FieldOptions::Formula(_) => FieldKind::Formula,
            FieldOptions::Json => FieldKind::Json,
            FieldOptions::Yaml => FieldKind::Yaml,
            FieldOptions::Object(_) => FieldKind::Object,
            FieldOptions::ObjectList(_) => FieldKind::ObjectList,
        }
    }

    /// Default options for a kind.
    pub fn default_for(kind: FieldKind) -> FieldOptions {
        FieldOptions::parse(kind, &serde_json::Value::Null).0
    }

    /// Deserialize the `options` table of a declaration for `kind`.
    ///
    /// Malformed options fall back to the kind's defaults; the second element carries the
    /// reason so callers can log it.
    pub fn parse(kind: FieldKind, raw: &serde_json::Value) -> (FieldOptions, Option<String>) {
        fn de<T: Default + serde::de::DeserializeOwned>(
            raw: &serde_json::Value,
            warning: &mut Option<String>,
        ) -> T {
            if raw.is_null() {
                return T::default();
            }
            match serde_json::from_value::<T>(raw.clone()) {
                Ok(opts) => opts,
                Err(e) => {
                    *warning = Some(e.to_string());
                    T::default()
                }
            }
        }
        let mut warning = None;
        let options = match kind {
            FieldKind::Input => FieldOptions::Input(de(raw, &mut warning)),
            FieldKind::Number => FieldOptions::Number(de(raw, &mut warning)),
            FieldKind::Boolean => FieldOptions::Boolean,
            FieldKind::Date => FieldOptions::Date(de(raw, &mut warning)),
            FieldKind::DateTime => FieldOptions::DateTime(de(raw, &mut warning)),
            FieldKind::Time => FieldOptions::Time(de(raw, &mut warning)),
            FieldKind::Select => FieldOptions::Select(de(raw, &mut warning)),
            FieldKind::Cycle => FieldOptions::Cycle(de(raw, &mut warning)),
            FieldKind::Multi => FieldOptions::Multi(de(raw, &mut warning)),
            FieldKind::File => FieldOptions::File(de(raw, &mut warning)),
            FieldKind::MultiFile => FieldOptions::MultiFile(de(raw, &mut warning)),
            FieldKind::Media => FieldOptions::Media(de(raw, &mut warning)),
            FieldKind::MultiMedia => FieldOptions::MultiMedia(de(raw, &mut warning)),
            FieldKind::Lookup => FieldOptions::Lookup(de(raw, &mut warning)),
            FieldKind::Formula => FieldOptions::Formula(de(raw, &mut warning)),
            FieldKind::Json => FieldOptions::Json,
            FieldKind::Yaml => FieldOptions::Yaml,
            FieldKind::Object => FieldOptions::Object(de(raw, &mut warning)),
            FieldKind::ObjectList => FieldOptions::ObjectList(de(raw, &mut warning)),
        };
        (options, warning)
    }

    /// Display mode of multi-valued kinds, if one is configured.
    pub fn display(&self) -> Option<DisplayMode> {
        match self {
            FieldOptions::Multi(opts) => opts.display,
            FieldOptions::MultiFile(opts) => opts.display,
            FieldOptions::MultiMedia(opts) => opts.display,
            FieldOptions::Lookup(opts) => match opts.output {
                LookupOutput::LinksBulletList | LookupOutput::CustomBulletList => {
                    Some(DisplayMode::IndentedList)
                }
                LookupOutput::LinksList | LookupOutput::CustomList => Some(DisplayMode::Inline),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Serialized form of a field, as written in class definitions and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
    /// Id of the parent field. Class files write `""` for top-level fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A typed metadata declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub options: FieldOptions,
    /// Id of the parent [FieldKind::Object]/[FieldKind::ObjectList] field when nested.
    pub path: Option<String>,
    /// Owning class, `None` for global preset fields.
    pub file_class_name: Option<String>,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, options: FieldOptions) -> Field {
        let name = name.into();
        Field {
            id: derive_field_id(None, None, &name),
            name,
            options,
            path: None,
            file_class_name: None,
        }
    }

    /// Builder-style helpers used when declaring fields in code.
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Field {
        self.id = id.into();
        self
    }

    pub fn with_parent<S: Into<String>>(mut self, parent_id: S) -> Field {
        self.path = Some(parent_id.into());
        self
    }

    pub fn with_class<S: Into<String>>(mut self, class: S) -> Field {
        self.file_class_name = Some(class.into());
        self
    }

    pub fn from_decl(decl: &FieldDecl, file_class_name: Option<&str>) -> Field {
        let (options, warning) = FieldOptions::parse(decl.kind, &decl.options);
        if let Some(warning) = warning {
            tracing::warn!(
                "Field '{}' ({}) of class {:?} has malformed options, using defaults: {}",
                decl.name,
                decl.kind,
                file_class_name,
                warning
            );
        }
        let path = decl.path.clone().filter(|p| !p.trim().is_empty());
        let id = decl
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| derive_field_id(file_class_name, path.as_deref(), &decl.name));
        Field {
            id,
            name: decl.name.trim().to_string(),
            options,
            path,
            file_class_name: file_class_name.map(String::from),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.options.kind()
    }

    /// Identity used for de-duplication within a resolved field set.
    pub fn name_path(&self) -> (&str, Option<&str>) {
        (self.name.as_str(), self.path.as_deref())
    }

    /// Whether this field may be nested inside `parent`.
    pub fn fits_in(&self, parent: &Field) -> bool {
        self.path.as_deref() == Some(parent.id.as_str())
            && self.kind().compatible_parents().contains(parent.kind())
    }
}

fn derive_field_id(class: Option<&str>, parent: Option<&str>, name: &str) -> String {
    let seed = format!(
        "{}/{}/{}",
        class.unwrap_or_default(),
        parent.unwrap_or_default(),
        name
    );
    Uuid::new_v5(&UUID_NAMESPACE_FIELDS, seed.as_bytes())
        .simple()
        .to_string()[..6]
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decl_parsing_with_defaults() {
        let decl: FieldDecl = serde_yaml::from_str(
            "name: genres\ntype: Multi\noptions:\n  valuesList:\n    \"1\": Drama\n    \"2\": Comedy\n  display: indentedList\npath: \"\"\n",
        )
        .unwrap();
        let field = Field::from_decl(&decl, Some("anime"));
        assert_eq!(field.kind(), FieldKind::Multi);
        assert_eq!(field.path, None);
        assert_eq!(field.file_class_name.as_deref(), Some("anime"));
        match &field.options {
            FieldOptions::Multi(opts) => {
                assert_eq!(opts.values_list.values(), vec!["Drama", "Comedy"]);
                assert_eq!(opts.display, Some(DisplayMode::IndentedList));
            }
            other => panic!("unexpected options {other:?}"),
        }
        // Derived ids are stable across parses
        assert_eq!(Field::from_decl(&decl, Some("anime")).id, field.id);
        assert_ne!(Field::from_decl(&decl, Some("manga")).id, field.id);
    }

    #[test]
    fn test_malformed_options_fall_back() {
        let (options, warning) = FieldOptions::parse(FieldKind::Number, &json!({"step": "big"}));
        assert_eq!(options, FieldOptions::Number(NumberOptions::default()));
        assert!(warning.is_some());
    }

    #[test]
    fn test_compatible_parents() {
        let object = Field::new("address", FieldOptions::default_for(FieldKind::Object));
        let street = Field::new("street", FieldOptions::default_for(FieldKind::Input))
            .with_parent(object.id.clone());
        let lookup = Field::new("related", FieldOptions::default_for(FieldKind::Lookup))
            .with_parent(object.id.clone());
        assert!(street.fits_in(&object));
        assert!(!lookup.fits_in(&object));
        assert!(FieldKind::ObjectList.frontmatter_only());
        assert!(!FieldKind::Input.frontmatter_only());
    }
}
