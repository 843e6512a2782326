//! Per-kind value rendering and validation.
//!
//! Values travel through the crate as [serde_json::Value]; these functions decide how a value is
//! spelled for one [Field] in frontmatter (scalar, item list, YAML block) or inline in the body.

use serde_json::Value;

use super::{DisplayMode, Field, FieldKind, FieldOptions};
use crate::{error::BuildonomyError, paths::link_target};

/// Frontmatter spelling of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Written after the separator on the field's own line.
    Scalar(String),
    /// One `- item` child line per value, indented under the field line.
    Items(Vec<String>),
    /// Raw child lines indented under the field line.
    Block(Vec<String>),
}

/// Plain string form of a value, as used for comparisons, formulas and inline output.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<String>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Flatten a value into its items: arrays yield their members, comma separated strings are split,
/// null yields nothing.
pub fn value_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => vec![],
        Value::Array(items) => items.clone(),
        Value::String(s) if s.trim().is_empty() => vec![],
        Value::String(s) if is_link_list(s) || !s.contains("[[") => s
            .split(',')
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect(),
        other => vec![other.clone()],
    }
}

fn is_link_list(s: &str) -> bool {
    s.split(',')
        .all(|item| item.trim().starts_with("[[") && item.trim().ends_with("]]"))
}

/// Normalize a link value to `[[target]]`.
pub fn as_link(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.starts_with("[[") && trimmed.ends_with("]]") {
        trimmed.to_string()
    } else {
        format!("[[{}]]", link_target(trimmed))
    }
}

/// Block-context YAML scalar.
pub fn yaml_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s.is_empty() => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end_matches('\n').to_string())
            .unwrap_or_else(|_| display_value(other)),
    }
}

/// Flow-context YAML scalar: anything that could break a `[a, b]` sequence is double quoted.
fn flow_scalar(value: &Value) -> String {
    match value {
        Value::String(s)
            if s.contains(|c| matches!(c, ',' | '[' | ']' | '{' | '}' | '#' | ':' | '"')) =>
        {
            serde_json::to_string(s).unwrap_or_else(|_| s.clone())
        }
        other => yaml_scalar(other),
    }
}

fn link_scalar(value: &Value) -> String {
    format!("\"{}\"", as_link(&display_value(value)))
}

/// Render `value` for `field` in frontmatter. `indented_default` applies to multi-valued kinds
/// with no configured display mode.
pub fn frontmatter_value(field: &Field, value: &Value, indented_default: bool) -> Rendered {
    let kind = field.kind();
    match kind {
        FieldKind::Json => Rendered::Scalar(match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        FieldKind::Yaml => match value {
            Value::Null => Rendered::Scalar(String::new()),
            Value::String(s) => Rendered::Block(s.lines().map(String::from).collect()),
            other => Rendered::Block(
                serde_yaml::to_string(other)
                    .unwrap_or_default()
                    .lines()
                    .map(String::from)
                    .collect(),
            ),
        },
        FieldKind::Object | FieldKind::ObjectList => Rendered::Scalar(String::new()),
        FieldKind::File | FieldKind::Media => match value {
            Value::Null => Rendered::Scalar(String::new()),
            other => Rendered::Scalar(link_scalar(other)),
        },
        _ if kind.is_multi() || (kind == FieldKind::Lookup && value.is_array()) => {
            let items = value_items(value);
            let mode = field.options.display().unwrap_or(if indented_default {
                DisplayMode::IndentedList
            } else {
                DisplayMode::Inline
            });
            let item_text = |item: &Value| {
                // lookup items are links unless a custom function produced plain text
                let link = kind.is_link()
                    || (kind == FieldKind::Lookup
                        && display_value(item).trim_start().starts_with("[["));
                if link {
                    link_scalar(item)
                } else {
                    flow_scalar(item)
                }
            };
            match mode {
                DisplayMode::IndentedList if !items.is_empty() => {
                    Rendered::Items(items.iter().map(item_text).collect())
                }
                _ if items.is_empty() => Rendered::Scalar(String::new()),
                _ => Rendered::Scalar(format!(
                    "[{}]",
                    items.iter().map(item_text).collect::<Vec<String>>().join(", ")
                )),
            }
        }
        _ => Rendered::Scalar(yaml_scalar(value)),
    }
}

/// Render `value` for an inline `name:: value` field in the body.
pub fn inline_value(field: &Field, value: &Value) -> String {
    let kind = field.kind();
    if kind.is_link() {
        return value_items(value)
            .iter()
            .map(|item| as_link(&display_value(item)))
            .collect::<Vec<String>>()
            .join(", ");
    }
    match value {
        Value::Object(_) => value.to_string(),
        other => display_value(other),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Check a value against the declared options of `field` before it is written.
pub fn validate(field: &Field, value: &Value) -> Result<(), BuildonomyError> {
    let invalid = |reason: String| {
        Err(BuildonomyError::Write(format!(
            "Invalid value for field '{}': {reason}",
            field.name
        )))
    };
    if value.is_null() {
        return Ok(());
    }
    match &field.options {
        FieldOptions::Number(opts) => {
            let Some(n) = as_number(value) else {
                return invalid(format!("{value} is not a number"));
            };
            if opts.min.is_some_and(|min| n < min) || opts.max.is_some_and(|max| n > max) {
                return invalid(format!("{n} outside of [{:?}, {:?}]", opts.min, opts.max));
            }
        }
        FieldOptions::Boolean => match value {
            Value::Bool(_) => {}
            Value::String(s) if s == "true" || s == "false" => {}
            _ => return invalid(format!("{value} is not a boolean")),
        },
        FieldOptions::Select(opts) => {
            let allowed = opts.values_list.values();
            let v = display_value(value);
            if !allowed.is_empty() && !allowed.contains(&v) {
                return invalid(format!("'{v}' not in {allowed:?}"));
            }
        }
        FieldOptions::Cycle(opts) => {
            let allowed = opts.values_list.values();
            let v = display_value(value);
            if !allowed.is_empty() && !allowed.contains(&v) {
                return invalid(format!("'{v}' not in {allowed:?}"));
            }
        }
        FieldOptions::Multi(opts) => {
            let allowed = opts.values_list.values();
            if !allowed.is_empty() {
                for item in value_items(value) {
                    let v = display_value(&item);
                    if !allowed.contains(&v) {
                        return invalid(format!("'{v}' not in {allowed:?}"));
                    }
                }
            }
        }
        FieldOptions::Json => {
            if let Value::String(s) = value {
                if let Err(e) = serde_json::from_str::<Value>(s) {
                    return invalid(format!("not valid JSON: {e}"));
                }
            }
        }
        FieldOptions::Object(_) | FieldOptions::ObjectList(_) => {
            return invalid("container fields are written through their children".to_string());
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldOptions, MultiOptions};
    use serde_json::json;

    fn multi(display: Option<DisplayMode>) -> Field {
        Field::new(
            "genres",
            FieldOptions::Multi(MultiOptions {
                display,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_multi_rendering_modes() {
        let value = json!(["Drama", "Supernatural"]);
        assert_eq!(
            frontmatter_value(&multi(Some(DisplayMode::IndentedList)), &value, false),
            Rendered::Items(vec!["Drama".to_string(), "Supernatural".to_string()])
        );
        assert_eq!(
            frontmatter_value(&multi(None), &value, false),
            Rendered::Scalar("[Drama, Supernatural]".to_string())
        );
        assert_eq!(
            frontmatter_value(&multi(None), &value, true),
            Rendered::Items(vec!["Drama".to_string(), "Supernatural".to_string()])
        );
        assert_eq!(
            frontmatter_value(&multi(None), &json!(["a, b"]), false),
            Rendered::Scalar("[\"a, b\"]".to_string())
        );
    }

    #[test]
    fn test_scalar_and_link_rendering() {
        let title = Field::new("title", FieldOptions::default_for(FieldKind::Input));
        assert_eq!(
            frontmatter_value(&title, &json!("Kimi no Na Wa"), false),
            Rendered::Scalar("Kimi no Na Wa".to_string())
        );
        let file = Field::new("manager", FieldOptions::default_for(FieldKind::File));
        assert_eq!(
            frontmatter_value(&file, &json!("Taki"), false),
            Rendered::Scalar("\"[[Taki]]\"".to_string())
        );
        assert_eq!(inline_value(&file, &json!("[[Taki]]")), "[[Taki]]");
    }

    #[test]
    fn test_validation() {
        let number = Field::new("score", FieldOptions::default_for(FieldKind::Number));
        assert!(validate(&number, &json!(3)).is_ok());
        assert!(validate(&number, &json!("3.5")).is_ok());
        assert!(validate(&number, &json!("three")).is_err());
        let object = Field::new("address", FieldOptions::default_for(FieldKind::Object));
        assert!(validate(&object, &json!({"street": "x"})).is_err());
    }
}
