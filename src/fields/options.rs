//! Kind-specific option payloads, deserialized from the `options` table of a field declaration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How multi-valued fields are written into frontmatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayMode {
    /// `genres: [Drama, Supernatural]`
    #[default]
    Inline,
    /// `genres:` followed by one indented `- value` line per item.
    IndentedList,
}

/// Allowed values for select-like fields. Class files write either a list or an
/// index-keyed table (`{"1": "Drama", "2": "Comedy"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValuesList {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl Default for ValuesList {
    fn default() -> Self {
        ValuesList::List(vec![])
    }
}

impl ValuesList {
    pub fn values(&self) -> Vec<String> {
        match self {
            ValuesList::List(values) => values.clone(),
            ValuesList::Map(map) => {
                let mut entries = map.iter().collect::<Vec<_>>();
                // numeric keys sort numerically, others lexically
                entries.sort_by(|(a, _), (b, _)| match (a.parse::<i64>(), b.parse::<i64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => a.cmp(b),
                });
                entries.into_iter().map(|(_, v)| v.clone()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputOptions {
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberOptions {
    pub step: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DateOptions {
    pub date_format: Option<String>,
    pub default_insert_as_link: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectOptions {
    pub values_list: ValuesList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CycleOptions {
    pub values_list: ValuesList,
    pub allow_null: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiOptions {
    pub values_list: ValuesList,
    pub display: Option<DisplayMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkOptions {
    /// Query restricting the documents a link may point at.
    #[serde(alias = "dvQueryString")]
    pub query: Option<String>,
    pub display: Option<DisplayMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaOptions {
    pub folders: Vec<String>,
    pub display: Option<DisplayMode>,
}

/// Builtin reductions for summarizing lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Summary {
    #[default]
    Count,
    Sum,
    Average,
    Max,
    Min,
}

/// How a lookup renders the related documents it found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupOutput {
    /// Inline list of links to the related documents.
    #[default]
    LinksList,
    /// Indented list of links.
    LinksBulletList,
    /// A single value reduced with a [Summary].
    BuiltinSummarizing,
    /// Inline list of `custom_list_function` results, one per related document.
    CustomList,
    /// Indented list of `custom_list_function` results.
    CustomBulletList,
    /// A single value computed by `custom_summarizing_function`.
    CustomSummarizing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupOptions {
    #[serde(alias = "dvQueryString")]
    pub query: String,
    pub target_field_name: String,
    #[serde(alias = "outputType")]
    pub output: LookupOutput,
    #[serde(alias = "builtinSummarizingFunction")]
    pub builtin_summary: Summary,
    pub summarized_field_name: Option<String>,
    pub custom_list_function: Option<String>,
    pub custom_summarizing_function: Option<String>,
    pub auto_update: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        LookupOptions {
            query: String::new(),
            target_field_name: String::new(),
            output: LookupOutput::default(),
            builtin_summary: Summary::default(),
            summarized_field_name: None,
            custom_list_function: None,
            custom_summarizing_function: None,
            auto_update: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormulaOptions {
    pub formula: String,
    pub auto_update: bool,
}

impl Default for FormulaOptions {
    fn default() -> Self {
        FormulaOptions {
            formula: String::new(),
            auto_update: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectOptions {
    pub display_template: Option<String>,
}
