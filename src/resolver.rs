//! Class and binding resolution: which classes, and therefore which fields, apply to a document.
//!
//! Classes contribute in this order, and the first field seen for a `(name, path)` pair wins:
//!
//! 1. classes the document declares itself under the class attribute, in the order listed
//! 2. tag bindings, then folder bindings, then bookmark-group bindings, each in class-name order
//! 3. query bindings: settings queries in settings order, then class saved queries by class name
//! 4. the global class
//! 5. the global preset fields
//!
//! Each class contributes its own fields followed by those of its ancestors, minus whatever a
//! descendant in the chain excludes.

use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use std::{
    collections::{BTreeMap, BTreeSet},
    iter::once,
};

use crate::{
    config::IndexSettings,
    fields::Field,
    fileclass::{string_list, FileClass},
    paths::{link_target, VaultPath},
    query::{tag_matches, Query},
    vault::DocumentMeta,
};

/// Binding criteria collected from class definitions and settings, each paired with the bound
/// class name, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub tags: Vec<(String, String)>,
    pub paths: Vec<(String, String)>,
    pub bookmarks: Vec<(String, String)>,
    pub queries: Vec<(Query, String)>,
}

impl Bindings {
    pub fn collect(classes: &BTreeMap<String, FileClass>, settings: &IndexSettings) -> Bindings {
        let mut bindings = Bindings::default();
        for (name, class) in classes.iter() {
            for tag in class.binding_tags() {
                bindings.tags.push((tag, name.clone()));
            }
            for folder in class.files_paths.iter() {
                bindings.paths.push((folder.clone(), name.clone()));
            }
            for group in class.bookmarks_groups.iter() {
                bindings.bookmarks.push((group.clone(), name.clone()));
            }
        }
        let saved = classes
            .values()
            .filter_map(|class| class.saved_query.as_ref().map(|q| (q, &class.name)));
        let from_settings = settings.class_queries.iter().map(|cq| (&cq.query, &cq.class));
        for (source, class) in from_settings.chain(saved) {
            if !classes.contains_key(class) {
                tracing::warn!("Query {:?} is bound to unknown class {}, skipped", source, class);
                continue;
            }
            match Query::parse(source) {
                Ok(query) => bindings.queries.push((query, class.clone())),
                Err(e) => tracing::warn!(
                    "Malformed saved query for class {} skipped: {}",
                    class,
                    e
                ),
            }
        }
        bindings
    }

    /// Run every query binding once against the corpus. Results are keyed by query id.
    pub fn match_queries(&self, corpus: &[DocumentMeta]) -> BTreeMap<String, BTreeSet<String>> {
        let mut matches = BTreeMap::new();
        for (query, _) in self.queries.iter() {
            if !matches.contains_key(&query.id) {
                matches.insert(query.id.clone(), query.eval(corpus));
            }
        }
        matches
    }
}

/// Ancestors of every class, nearest first. A chain stops at a missing parent or at the first
/// class that repeats, so a class never lists itself as its own ancestor.
pub fn ancestor_chains(classes: &BTreeMap<String, FileClass>) -> BTreeMap<String, Vec<String>> {
    let mut graph = DiGraphMap::<&str, ()>::new();
    for (name, class) in classes.iter() {
        graph.add_node(name.as_str());
        if let Some(parent) = class.extends.as_deref() {
            if classes.contains_key(parent) {
                graph.add_edge(name.as_str(), parent, ());
            } else {
                tracing::warn!(
                    "Class {} extends unknown class {}, treated as having no parent",
                    name,
                    parent
                );
            }
        }
    }
    for cycle in tarjan_scc(&graph).into_iter().filter(|scc| scc.len() > 1) {
        tracing::warn!("Inheritance cycle between classes {:?}", cycle);
    }
    classes
        .keys()
        .map(|name| {
            let mut chain = Vec::new();
            let mut visited = BTreeSet::from([name.as_str()]);
            let mut current = name.as_str();
            while let Some(parent) = graph.neighbors(current).next() {
                if !visited.insert(parent) {
                    break;
                }
                chain.push(parent.to_string());
                current = parent;
            }
            (name.clone(), chain)
        })
        .collect()
}

/// Keep the first field of every `(name, path)` pair, then drop nested fields whose parent did
/// not survive.
pub fn dedup_fields(fields: Vec<Field>) -> Vec<Field> {
    let mut seen = BTreeSet::new();
    let mut kept: Vec<Field> = fields
        .into_iter()
        .filter(|f| seen.insert((f.name.clone(), f.path.clone())))
        .collect();
    loop {
        let ids: BTreeSet<String> = kept.iter().map(|f| f.id.clone()).collect();
        let before = kept.len();
        kept.retain(|f| f.path.as_ref().is_none_or(|parent| ids.contains(parent)));
        if kept.len() == before {
            return kept;
        }
    }
}

/// Fields of a class including inherited ones.
pub fn class_fields(
    name: &str,
    classes: &BTreeMap<String, FileClass>,
    ancestors: &BTreeMap<String, Vec<String>>,
) -> Vec<Field> {
    let mut excluded: BTreeSet<&str> = BTreeSet::new();
    let mut fields = Vec::new();
    let chain = once(name).chain(
        ancestors
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str),
    );
    for class_name in chain {
        let Some(class) = classes.get(class_name) else {
            continue;
        };
        fields.extend(
            class
                .fields
                .iter()
                .filter(|f| !excluded.contains(f.name.as_str()))
                .cloned(),
        );
        excluded.extend(class.excludes.iter().map(String::as_str));
    }
    dedup_fields(fields)
}

/// Class names a document declares in its own frontmatter.
pub fn inner_classes(meta: &DocumentMeta, attribute: &str) -> Vec<String> {
    string_list(meta.frontmatter.get(attribute))
        .iter()
        .map(|name| link_target(name).to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn group_matches(group: &str, binding: &str) -> bool {
    let group = group.trim_matches('/');
    let binding = binding.trim_matches('/');
    group == binding || group.starts_with(&format!("{binding}/"))
}

/// Classes and fields resolved for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub classes: Vec<String>,
    pub fields: Vec<Field>,
}

/// Per-pass view over the class definitions and binding matches.
pub struct Resolver<'a> {
    pub classes: &'a BTreeMap<String, FileClass>,
    pub ancestors: &'a BTreeMap<String, Vec<String>>,
    pub bindings: &'a Bindings,
    pub query_matches: &'a BTreeMap<String, BTreeSet<String>>,
    pub bookmark_groups: &'a BTreeMap<String, Vec<String>>,
    pub settings: &'a IndexSettings,
}

impl<'a> Resolver<'a> {
    fn bound_classes(&self, meta: &DocumentMeta) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !matched.iter().any(|m| m == name) {
                matched.push(name.to_string());
            }
        };
        for name in inner_classes(meta, &self.settings.class_attribute) {
            if self.classes.contains_key(&name) {
                push(&name);
            } else {
                tracing::warn!("{} declares unknown class {}", meta.path, name);
            }
        }
        for (tag, class) in self.bindings.tags.iter() {
            if meta.tags.iter().any(|t| tag_matches(t, tag)) {
                push(class);
            }
        }
        let vp = VaultPath::new(&meta.path);
        for (folder, class) in self.bindings.paths.iter() {
            if vp.is_under(folder) {
                push(class);
            }
        }
        for (binding, class) in self.bindings.bookmarks.iter() {
            if self
                .bookmark_groups
                .iter()
                .any(|(group, paths)| group_matches(group, binding) && paths.contains(&meta.path))
            {
                push(class);
            }
        }
        for (query, class) in self.bindings.queries.iter() {
            if self
                .query_matches
                .get(&query.id)
                .is_some_and(|paths| paths.contains(&meta.path))
            {
                push(class);
            }
        }
        if let Some(global) = self.settings.global_class.as_deref() {
            if self.classes.contains_key(global) {
                push(global);
            } else {
                tracing::warn!("Global class {} is not defined", global);
            }
        }
        matched
    }

    pub fn resolve(&self, meta: &DocumentMeta) -> Resolution {
        let classes = self.bound_classes(meta);
        let fields = classes
            .iter()
            .flat_map(|name| class_fields(name, self.classes, self.ancestors))
            .chain(self.settings.preset_fields())
            .collect();
        Resolution {
            fields: dedup_fields(fields),
            classes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldOptions, InputOptions};

    fn input(name: &str, class: &str) -> Field {
        Field::new(name, FieldOptions::Input(InputOptions::default()))
            .with_id(format!("{class}-{name}"))
            .with_class(class)
    }

    fn class(name: &str, extends: Option<&str>, fields: &[&str]) -> FileClass {
        FileClass {
            extends: extends.map(String::from),
            fields: fields.iter().map(|f| input(f, name)).collect(),
            ..FileClass::new(name)
        }
    }

    fn classes(list: Vec<FileClass>) -> BTreeMap<String, FileClass> {
        list.into_iter().map(|c| (c.name.clone(), c)).collect()
    }

    #[test]
    fn test_cyclic_inheritance_terminates() {
        let classes = classes(vec![
            class("A", Some("B"), &["a"]),
            class("B", Some("A"), &["b"]),
            class("C", Some("Missing"), &["c"]),
        ]);
        let chains = ancestor_chains(&classes);
        assert_eq!(chains["A"], vec!["B"]);
        assert_eq!(chains["B"], vec!["A"]);
        assert!(chains["C"].is_empty());
        let names: Vec<String> = class_fields("A", &classes, &chains)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_excludes_drop_inherited_fields_and_children() {
        let mut base = class("Base", None, &["cover", "title"]);
        base.fields
            .push(input("url", "Base").with_parent("Base-cover"));
        let mut child = class("Child", Some("Base"), &["title"]);
        child.excludes = vec!["cover".to_string()];
        let classes = classes(vec![base, child]);
        let chains = ancestor_chains(&classes);
        let fields = class_fields("Child", &classes, &chains);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id, "Child-title");
    }

    #[test]
    fn test_binding_priority() {
        let mut tagged = class("Tagged", None, &["x", "t"]);
        tagged.tag_names = vec!["media".to_string()];
        let mut foldered = class("Foldered", None, &["x", "f"]);
        foldered.files_paths = vec!["movies".to_string()];
        let mut queried = class("Queried", None, &["x", "q"]);
        queried.saved_query = Some("rating".to_string());
        let global = class("Global", None, &["x", "g"]);
        let inner = class("Inner", None, &["i"]);
        let classes = classes(vec![tagged, foldered, queried, global, inner]);
        let settings = IndexSettings {
            global_class: Some("Global".to_string()),
            ..Default::default()
        };
        let ancestors = ancestor_chains(&classes);
        let bindings = Bindings::collect(&classes, &settings);
        let corpus = vec![DocumentMeta::from_text(
            "movies/Your Name.md",
            "---\nfileClass: Inner\ntags: [media/anime]\nrating: 9\n---\n",
        )];
        let query_matches = bindings.match_queries(&corpus);
        let bookmark_groups = BTreeMap::new();
        let resolver = Resolver {
            classes: &classes,
            ancestors: &ancestors,
            bindings: &bindings,
            query_matches: &query_matches,
            bookmark_groups: &bookmark_groups,
            settings: &settings,
        };
        let resolution = resolver.resolve(&corpus[0]);
        assert_eq!(
            resolution.classes,
            vec!["Inner", "Tagged", "Foldered", "Queried", "Global"]
        );
        let x = resolution.fields.iter().find(|f| f.name == "x").unwrap();
        assert_eq!(x.file_class_name.as_deref(), Some("Tagged"));
        assert_eq!(resolution.fields.len(), 6);
    }

    #[test]
    fn test_malformed_saved_query_is_skipped() {
        let mut broken = class("Broken", None, &["x"]);
        broken.saved_query = Some("(unclosed".to_string());
        let classes = classes(vec![broken]);
        let bindings = Bindings::collect(&classes, &IndexSettings::default());
        assert!(bindings.queries.is_empty());
    }
}
