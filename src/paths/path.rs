use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Vault-relative document path split into directory, stem and extension.
///
/// Vault paths always use `/` separators and never start with `/`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VaultPath<'a> {
    pub path: &'a str,
    /// Index of '/' separating dir from file
    dir_sep: Option<usize>,
    /// Index of '.' separating filestem from extension
    ext_sep: Option<usize>,
}

impl<'a> VaultPath<'a> {
    pub fn new(path: &'a str) -> VaultPath<'a> {
        let dir_sep = path.rfind('/');
        let name_start = dir_sep.map(|sep| sep + 1).unwrap_or(0);
        let ext_sep = path[name_start..]
            .rfind('.')
            // hidden files have no extension
            .filter(|idx| *idx > 0)
            .map(|idx| idx + name_start);
        VaultPath {
            path,
            dir_sep,
            ext_sep,
        }
    }

    pub fn dir(&self) -> &'a str {
        &self.path[0..self.dir_sep.unwrap_or(0)]
    }

    pub fn filename(&self) -> &'a str {
        &self.path[self.dir_sep.map(|sep| sep + 1).unwrap_or(0)..]
    }

    pub fn filestem(&self) -> &'a str {
        let start_idx = self.dir_sep.map(|sep| sep + 1).unwrap_or(0);
        &self.path[start_idx..self.ext_sep.unwrap_or(self.path.len())]
    }

    pub fn ext(&self) -> &'a str {
        self.ext_sep
            .map(|idx| &self.path[idx + 1..])
            .unwrap_or_default()
    }

    /// The path without its extension, as written in a wikilink.
    pub fn without_ext(&self) -> &'a str {
        &self.path[0..self.ext_sep.unwrap_or(self.path.len())]
    }

    /// Whether the path lives inside `folder` (at any depth).
    pub fn is_under(&self, folder: &str) -> bool {
        let folder = normalize_folder(folder);
        if folder.is_empty() {
            return true;
        }
        self.path.starts_with(&folder)
    }

    /// Whether a wikilink target (already stripped of brackets, alias and heading) designates
    /// this path. Links may name the full path, the path without extension, or only the stem.
    pub fn is_link_target(&self, target: &str) -> bool {
        let target = target.trim().trim_start_matches('/');
        !target.is_empty()
            && (target == self.path || target == self.without_ext() || target == self.filestem())
    }

    pub fn replace_extension(&self, new_extension: &str) -> String {
        format!("{}.{}", self.without_ext(), new_extension)
    }
}

impl<'a, T: AsRef<str> + ?Sized> From<&'a T> for VaultPath<'a> {
    fn from(s: &'a T) -> VaultPath<'a> {
        VaultPath::new(s.as_ref())
    }
}

impl<'a> AsRef<str> for VaultPath<'a> {
    fn as_ref(&self) -> &str {
        self.path
    }
}

impl<'a> Display for VaultPath<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Strip leading slashes and make sure a non-empty folder ends with exactly one '/'.
pub fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Extract the target of a wikilink: `[[dir/note#heading|Alias]]` becomes `dir/note`.
///
/// Accepts bare targets as well, so values written without brackets still resolve.
pub fn link_target(link: &str) -> &str {
    let inner = link
        .trim()
        .trim_start_matches('!')
        .trim_start_matches("[[")
        .trim_end_matches("]]");
    let inner = inner.split('|').next().unwrap_or(inner);
    inner.split('#').next().unwrap_or(inner).trim()
}

/// Render a vault path as a wikilink the way hosts do: without the markdown extension.
pub fn as_wikilink(path: &str) -> String {
    let vp = VaultPath::new(path);
    if vp.ext() == "md" {
        format!("[[{}]]", vp.without_ext())
    } else {
        format!("[[{}]]", vp.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_path_parsing() {
        let vp = VaultPath::from("dir/sub/file.md");
        assert_eq!(vp.dir(), "dir/sub");
        assert_eq!(vp.filename(), "file.md");
        assert_eq!(vp.filestem(), "file");
        assert_eq!(vp.ext(), "md");
        assert_eq!(vp.without_ext(), "dir/sub/file");

        let vp = VaultPath::from("file");
        assert_eq!(vp.dir(), "");
        assert_eq!(vp.filestem(), "file");
        assert_eq!(vp.ext(), "");

        let vp = VaultPath::from("dir/.hidden");
        assert_eq!(vp.filestem(), ".hidden");
        assert_eq!(vp.ext(), "");
    }

    #[test]
    fn test_is_under() {
        let vp = VaultPath::from("Anime/Shows/Your Name.md");
        assert!(vp.is_under("Anime"));
        assert!(vp.is_under("/Anime/"));
        assert!(vp.is_under("Anime/Shows"));
        assert!(!vp.is_under("Anim"));
        assert!(vp.is_under(""));
    }

    #[test]
    fn test_link_targets() {
        assert_eq!(link_target("[[People/Taki|Taki]]"), "People/Taki");
        assert_eq!(link_target("[[Taki#Bio]]"), "Taki");
        assert_eq!(link_target("Taki"), "Taki");
        let vp = VaultPath::from("People/Taki.md");
        assert!(vp.is_link_target(link_target("[[Taki]]")));
        assert!(vp.is_link_target(link_target("[[People/Taki]]")));
        assert!(!vp.is_link_target(link_target("[[Mitsuha]]")));
        assert_eq!(as_wikilink("People/Taki.md"), "[[People/Taki]]");
        assert_eq!(as_wikilink("img/cover.png"), "[[img/cover.png]]");
    }
}
