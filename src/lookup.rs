//! Lookup and formula evaluation.
//!
//! A pass runs every distinct lookup query once against the corpus, narrows the results per
//! document to the related documents (those whose target field points back at it), renders
//! them per output mode, then evaluates formulas over the document's own fields with the fresh
//! lookup values in scope. Changed values of `auto_update` fields are written back through the
//! [Document] model, one write per document.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    config::IndexSettings,
    document::{Document, InsertTarget},
    error::BuildonomyError,
    event::{send_event, IndexEvent},
    fields::{
        render::{display_value, value_items},
        Field, FieldOptions, LookupOptions, LookupOutput, Summary,
    },
    formula::{as_number, number_value, Formula},
    index::{FieldKey, FieldStatus, IndexState},
    paths::{as_wikilink, link_target, IndexedPath, VaultPath},
    query::Query,
    store::{FieldValueRecord, FieldValueStore},
    vault::{DocumentMeta, DocumentStore},
};

/// Counters of one lookup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupReport {
    pub computed: usize,
    pub changed: usize,
    /// Documents whose text was rewritten.
    pub written: usize,
    pub errors: usize,
}

/// Whether `value` (a link, a list of links or a comma separated string of links) designates
/// `path`.
pub fn references(value: &Value, path: &str) -> bool {
    let target = VaultPath::new(path);
    match value {
        Value::Array(items) => items.iter().any(|item| references(item, path)),
        Value::String(_) => value_items(value)
            .iter()
            .any(|item| target.is_link_target(link_target(&display_value(item)))),
        _ => false,
    }
}

fn related<'a>(
    path: &str,
    opts: &LookupOptions,
    results: &BTreeSet<String>,
    by_path: &BTreeMap<&str, &'a DocumentMeta>,
) -> Vec<&'a DocumentMeta> {
    results
        .iter()
        .filter(|candidate| candidate.as_str() != path)
        .filter_map(|candidate| by_path.get(candidate.as_str()).copied())
        .filter(|meta| {
            opts.target_field_name.trim().is_empty()
                || meta
                    .field(opts.target_field_name.trim())
                    .is_some_and(|value| references(value, path))
        })
        .collect()
}

fn summarize(
    summary: Summary,
    field: Option<&str>,
    pages: &[&DocumentMeta],
) -> Result<Value, BuildonomyError> {
    if summary == Summary::Count {
        return Ok(Value::from(pages.len()));
    }
    let field = field.filter(|f| !f.trim().is_empty()).ok_or_else(|| {
        BuildonomyError::Query(format!("{summary:?} needs a summarized field name"))
    })?;
    let numbers: Vec<f64> = pages
        .iter()
        .filter_map(|meta| meta.field(field))
        .flat_map(|value| match value {
            Value::Array(_) => value_items(value),
            other => vec![other.clone()],
        })
        .filter_map(|value| as_number(&value))
        .collect();
    Ok(match summary {
        Summary::Count => Value::from(pages.len()),
        Summary::Sum => number_value(numbers.iter().sum()),
        Summary::Average if numbers.is_empty() => Value::Null,
        Summary::Average => number_value(numbers.iter().sum::<f64>() / numbers.len() as f64),
        Summary::Max => numbers
            .iter()
            .copied()
            .reduce(f64::max)
            .map(number_value)
            .unwrap_or(Value::Null),
        Summary::Min => numbers
            .iter()
            .copied()
            .reduce(f64::min)
            .map(number_value)
            .unwrap_or(Value::Null),
    })
}

fn required_function<'a>(source: &'a Option<String>, what: &str) -> Result<&'a str, BuildonomyError> {
    source
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| BuildonomyError::Query(format!("{what} output needs a function")))
}

/// Render the related documents of a lookup per its output mode.
pub fn lookup_value(opts: &LookupOptions, pages: &[&DocumentMeta]) -> Result<Value, BuildonomyError> {
    match opts.output {
        LookupOutput::LinksList | LookupOutput::LinksBulletList => Ok(Value::Array(
            pages
                .iter()
                .map(|meta| Value::String(as_wikilink(&meta.path)))
                .collect(),
        )),
        LookupOutput::BuiltinSummarizing => summarize(
            opts.builtin_summary,
            opts.summarized_field_name.as_deref(),
            pages,
        ),
        LookupOutput::CustomList | LookupOutput::CustomBulletList => {
            let formula = Formula::parse(required_function(&opts.custom_list_function, "List")?)?;
            let mut items = Vec::with_capacity(pages.len());
            for meta in pages {
                let value = formula.eval(&meta.fields_context())?;
                items.push(Value::String(display_value(&value)));
            }
            Ok(Value::Array(items))
        }
        LookupOutput::CustomSummarizing => {
            let formula = Formula::parse(required_function(
                &opts.custom_summarizing_function,
                "Summarizing",
            )?)?;
            let mut context = Map::new();
            context.insert(
                "pages".to_string(),
                Value::Array(
                    pages
                        .iter()
                        .map(|meta| Value::Object(meta.fields_context()))
                        .collect(),
                ),
            );
            formula.eval(&context)
        }
    }
}

struct Computed {
    field: Field,
    value: Value,
    write: bool,
}

/// Evaluate every lookup and formula field of the indexed documents, write back changed values
/// and keep `state` free of entries for fields that are no longer declared.
#[tracing::instrument(skip_all, fields(documents = corpus.len(), force_all = force_all))]
pub async fn resolve<V, S>(
    state: &mut IndexState,
    vault: &V,
    store: &S,
    settings: &IndexSettings,
    corpus: &[DocumentMeta],
    force_all: bool,
    events: Option<&UnboundedSender<IndexEvent>>,
) -> LookupReport
where
    V: DocumentStore,
    S: FieldValueStore,
{
    let mut report = LookupReport::default();
    let by_path: BTreeMap<&str, &DocumentMeta> =
        corpus.iter().map(|meta| (meta.path.as_str(), meta)).collect();
    let previous_status = state.field_status.clone();

    let mut queries: BTreeMap<String, Result<Query, BuildonomyError>> = BTreeMap::new();
    for fields in state.lookups.values() {
        for field in fields {
            if let FieldOptions::Lookup(opts) = &field.options {
                if !queries.contains_key(&opts.query) {
                    let parsed = Query::parse(&opts.query);
                    if let Err(e) = &parsed {
                        tracing::warn!("Lookup {} has an invalid query: {}", field.name, e);
                    }
                    queries.insert(opts.query.clone(), parsed);
                }
            }
        }
    }
    state.lookup_results = queries
        .values()
        .filter_map(|q| q.as_ref().ok())
        .map(|q| (q.id.clone(), q.eval(corpus)))
        .collect();

    let mut declared: BTreeSet<FieldKey> = BTreeSet::new();
    let mut pending: BTreeMap<String, Vec<Computed>> = BTreeMap::new();
    let lookups = state.lookups.clone();
    for (path, fields) in lookups.iter() {
        let Some(meta) = by_path.get(path.as_str()) else {
            continue;
        };
        let mut context = meta.fields_context();
        let (lookup_fields, formula_fields): (Vec<&Field>, Vec<&Field>) = fields
            .iter()
            .partition(|f| matches!(f.options, FieldOptions::Lookup(_)));
        for field in lookup_fields.into_iter().chain(formula_fields) {
            let key = FieldKey::new(path, field);
            declared.insert(key.clone());
            report.computed += 1;
            let (computed, auto_update) = match &field.options {
                FieldOptions::Lookup(opts) => {
                    let computed = match queries.get(&opts.query) {
                        Some(Ok(query)) => {
                            let empty = BTreeSet::new();
                            let results = state.lookup_results.get(&query.id).unwrap_or(&empty);
                            lookup_value(opts, &related(path, opts, results, &by_path))
                        }
                        Some(Err(e)) => Err(e.clone()),
                        None => Err(BuildonomyError::Query(format!("{} has no query", field.name))),
                    };
                    (computed, opts.auto_update)
                }
                FieldOptions::Formula(opts) => (
                    Formula::parse(&opts.formula).and_then(|f| f.eval(&context)),
                    opts.auto_update,
                ),
                _ => continue,
            };
            let value = match computed {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Could not compute {}: {}", key, e);
                    report.errors += 1;
                    state.lookup_values.remove(&key);
                    state.field_status.insert(key, FieldStatus::Error(e.to_string()));
                    continue;
                }
            };
            context.insert(field.name.clone(), value.clone());
            if !force_all && state.lookup_values.get(&key) == Some(&value) {
                state
                    .field_status
                    .entry(key)
                    .or_insert(FieldStatus::UpToDate);
                continue;
            }
            tracing::debug!("{} changed to {}", key, value);
            report.changed += 1;
            state.lookup_values.insert(key.clone(), value.clone());
            state.field_status.insert(key, FieldStatus::Changed);
            pending.entry(path.clone()).or_default().push(Computed {
                field: field.clone(),
                value,
                write: auto_update,
            });
        }
    }

    for (path, computed) in pending {
        let writes: Vec<&Computed> = computed.iter().filter(|c| c.write).collect();
        if !writes.is_empty() {
            match write_back(vault, settings, state, &path, &writes).await {
                Ok(written) => {
                    if written {
                        report.written += 1;
                    }
                    for c in writes.iter() {
                        state
                            .field_status
                            .insert(FieldKey::new(&path, &c.field), FieldStatus::UpToDate);
                    }
                }
                Err(e) => {
                    tracing::warn!("Could not write computed fields of {}: {}", path, e);
                    report.errors += 1;
                    for c in writes.iter() {
                        let key = FieldKey::new(&path, &c.field);
                        state.lookup_values.remove(&key);
                        state.field_status.insert(key, FieldStatus::Error(e.to_string()));
                    }
                    continue;
                }
            }
        }
        for c in computed {
            let record = FieldValueRecord::new(&path, &c.field.id, &c.field.name, c.field.kind(), c.value);
            if let Err(e) = store.put(record).await {
                tracing::error!("Could not persist {} of {}: {}", c.field.name, path, e);
            }
        }
    }

    state.lookup_values.retain(|key, _| declared.contains(key));
    state.field_status.retain(|key, _| declared.contains(key));
    for (key, status) in state.field_status.iter() {
        if previous_status.get(key) != Some(status) {
            send_event(events, IndexEvent::FieldStatus(key.clone(), status.clone()));
        }
    }
    report
}

/// Apply `writes` to the document at `path`. Returns whether the text changed.
async fn write_back<V: DocumentStore>(
    vault: &V,
    settings: &IndexSettings,
    state: &IndexState,
    path: &str,
    writes: &[&Computed],
) -> Result<bool, BuildonomyError> {
    let text = vault.read(path).await?;
    let fields = state.fields.get(path).cloned().unwrap_or_default();
    let mut doc = Document::parse(path, &text, fields, settings.document_options());
    for c in writes {
        doc.upsert(
            &IndexedPath::root(c.field.id.clone()),
            &c.value,
            InsertTarget::Frontmatter,
        )?;
    }
    let rendered = doc.render();
    if rendered == text {
        return Ok(false);
    }
    vault.write(path, &rendered).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(path: &str, text: &str) -> DocumentMeta {
        DocumentMeta::from_text(path, text)
    }

    #[test]
    fn test_references() {
        assert!(references(&json!("[[people/Boss]]"), "people/Boss.md"));
        assert!(references(&json!("[[Boss|the boss]]"), "people/Boss.md"));
        assert!(references(&json!([["Boss"]]), "people/Boss.md"));
        assert!(references(&json!("[[X]], [[Boss]]"), "people/Boss.md"));
        assert!(!references(&json!("[[Bossy]]"), "people/Boss.md"));
        assert!(!references(&json!(3), "people/Boss.md"));
    }

    #[test]
    fn test_builtin_summaries() {
        let a = page("a.md", "---\npages: 10\n---\n");
        let b = page("b.md", "---\npages: \"5\"\n---\n");
        let c = page("c.md", "no frontmatter\n");
        let pages = vec![&a, &b, &c];
        assert_eq!(summarize(Summary::Count, None, &pages).unwrap(), json!(3));
        assert_eq!(summarize(Summary::Sum, Some("pages"), &pages).unwrap(), json!(15));
        assert_eq!(summarize(Summary::Average, Some("pages"), &pages).unwrap(), json!(7.5));
        assert_eq!(summarize(Summary::Max, Some("pages"), &pages).unwrap(), json!(10));
        assert_eq!(summarize(Summary::Min, Some("pages"), &pages).unwrap(), json!(5));
        assert_eq!(summarize(Summary::Sum, Some("pages"), &[]).unwrap(), json!(0));
        assert_eq!(summarize(Summary::Average, Some("pages"), &[]).unwrap(), Value::Null);
        assert!(summarize(Summary::Sum, None, &pages).is_err());
    }

    #[test]
    fn test_custom_outputs() {
        let a = page("books/A.md", "---\ntitle: Dune\npages: 412\n---\n");
        let b = page("books/B.md", "---\ntitle: Emma\npages: 300\n---\n");
        let pages = vec![&a, &b];
        let list = LookupOptions {
            output: LookupOutput::CustomList,
            custom_list_function: Some("upper(title)".to_string()),
            ..Default::default()
        };
        assert_eq!(lookup_value(&list, &pages).unwrap(), json!(["DUNE", "EMMA"]));

        let summary = LookupOptions {
            output: LookupOutput::CustomSummarizing,
            custom_summarizing_function: Some("sum(pages.pages)".to_string()),
            ..Default::default()
        };
        assert_eq!(lookup_value(&summary, &pages).unwrap(), json!(712));

        let links = LookupOptions::default();
        assert_eq!(
            lookup_value(&links, &pages).unwrap(),
            json!(["[[books/A]]", "[[books/B]]"])
        );

        let missing = LookupOptions {
            output: LookupOutput::CustomList,
            ..Default::default()
        };
        assert!(matches!(
            lookup_value(&missing, &pages),
            Err(BuildonomyError::Query(_))
        ));
    }
}
