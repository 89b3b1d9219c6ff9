//! File extension sets in leading-dot form.

use std::path::Path;

/// An ordered, de-duplicated set of extensions such as `.html` or `.md`.
///
/// Items are coerced the same way the `--exts` flag is: surrounding spaces and
/// dots are trimmed and a single leading dot is added. Items may themselves be
/// comma-separated lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    exts: Vec<String>,
}

impl ExtensionSet {
    /// Build a set from raw items.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exts: Vec<String> = Vec::new();
        for item in items {
            for ext in item.as_ref().split(',').filter_map(Self::normalize) {
                if !exts.contains(&ext) {
                    exts.push(ext);
                }
            }
        }
        Self { exts }
    }

    /// Parse a comma-separated list such as `"html, txt, md"`.
    pub fn parse(list: &str) -> Self {
        Self::new([list])
    }

    /// Coerce one extension into leading-dot form; `None` when nothing is left.
    pub fn normalize(ext: &str) -> Option<String> {
        let trimmed = ext.trim_matches(|c: char| c == '.' || c.is_whitespace());
        (!trimmed.is_empty()).then(|| format!(".{trimmed}"))
    }

    /// Whether `ext` (with or without its leading dot) is in the set.
    pub fn contains(&self, ext: &str) -> bool {
        Self::normalize(ext).is_some_and(|ext| self.exts.contains(&ext))
    }

    /// Whether the last extension of `path` is in the set.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.contains(ext))
    }

    /// Whether every extension here is also in `other`.
    pub fn is_subset_of(&self, other: &ExtensionSet) -> bool {
        self.exts.iter().all(|ext| other.exts.contains(ext))
    }

    pub fn is_empty(&self) -> bool {
        self.exts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.exts.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.exts
    }
}
