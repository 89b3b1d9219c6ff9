//! Element cascade: fragments inherited from ancestor directories.
//!
//! A [`Cascade`] maps fragment names to bodies. It is extended one directory
//! at a time while descending a path, and every extension returns a new value:
//! a directory hands each subdirectory its own copy, so sibling subtrees can
//! never observe each other's fragments.

use std::{
    collections::BTreeMap,
    path::{Component, Path},
    sync::Arc,
};

use strata_core::Listing;

use crate::{
    error::GenerateError,
    fragment::{ContentStore, Fragment},
};

/// What happens when a directory defines a fragment an ancestor already defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePolicy {
    /// The deeper directory's fragment replaces the ancestor's.
    #[default]
    Overwrite,
    /// The first-seen (ancestor) fragment wins.
    KeepFirst,
}

impl OverridePolicy {
    /// Map an `overwrite` flag onto a policy.
    pub fn from_overwrite(overwrite: bool) -> Self {
        if overwrite {
            Self::Overwrite
        } else {
            Self::KeepFirst
        }
    }
}

/// Fragment name to body mapping accumulated along a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cascade {
    fragments: BTreeMap<String, Arc<str>>,
}

/// Result of extending a cascade with one directory.
#[derive(Debug)]
pub struct CascadeStep {
    /// The extended cascade.
    pub cascade: Cascade,
    /// Whether the directory holds at least one fragment file.
    pub contributed: bool,
    /// Fragments (or the directory itself) that could not be read.
    pub errors: Vec<GenerateError>,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fragments.get(name).map(AsRef::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// A copy of this cascade with one more fragment, applied under `policy`.
    #[must_use]
    pub fn with(&self, fragment: Fragment, policy: OverridePolicy) -> Self {
        let mut next = self.clone();
        next.insert(fragment, policy);
        next
    }

    fn insert(&mut self, fragment: Fragment, policy: OverridePolicy) {
        match policy {
            OverridePolicy::Overwrite => {
                self.fragments.insert(fragment.name, fragment.body);
            }
            OverridePolicy::KeepFirst => {
                self.fragments.entry(fragment.name).or_insert(fragment.body);
            }
        }
    }

    /// Extend with the fragments of `dir`, listing it through the store.
    ///
    /// An unlistable directory contributes nothing and records a read error.
    #[must_use]
    pub fn extend(&self, dir: &Path, store: &ContentStore, policy: OverridePolicy) -> CascadeStep {
        match store.fs().list(dir) {
            Ok(listing) => self.extend_listed(dir, &listing, store, policy),
            Err(source) => CascadeStep {
                cascade: self.clone(),
                contributed: false,
                errors: vec![GenerateError::read(dir, source)],
            },
        }
    }

    /// Extend with the fragments of `dir` given its listing.
    ///
    /// Files are applied in listing (name) order, so two fragments sharing a
    /// base name in one directory resolve the same way on every run.
    #[must_use]
    pub fn extend_listed(
        &self,
        dir: &Path,
        listing: &Listing,
        store: &ContentStore,
        policy: OverridePolicy,
    ) -> CascadeStep {
        let mut cascade = self.clone();
        let mut contributed = false;
        let mut errors = Vec::new();

        for file in &listing.files {
            let path = dir.join(file);
            if !store.is_parsable(&path) {
                continue;
            }
            contributed = true;

            if policy == OverridePolicy::KeepFirst && cascade.contains(Fragment::name_of(file)) {
                continue;
            }

            match store.load(&path) {
                Ok(fragment) => cascade.insert(fragment, policy),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable fragment");
                    errors.push(e);
                }
            }
        }

        CascadeStep {
            cascade,
            contributed,
            errors,
        }
    }

    /// Build the cascade for `target` by extending at `start` and at every
    /// directory below it down to `target`, ancestors first.
    ///
    /// `contributed` describes `target` alone. When `target` is not below
    /// `start` only `target` itself is read.
    pub fn build(
        start: &Path,
        target: &Path,
        store: &ContentStore,
        policy: OverridePolicy,
    ) -> CascadeStep {
        let mut dirs = Vec::new();
        match target.strip_prefix(start) {
            Ok(relative) => {
                let mut current = start.to_path_buf();
                dirs.push(current.clone());
                for component in relative.components() {
                    if let Component::Normal(segment) = component {
                        current.push(segment);
                        dirs.push(current.clone());
                    }
                }
            }
            Err(_) => dirs.push(target.to_path_buf()),
        }

        let mut step = CascadeStep {
            cascade: Cascade::new(),
            contributed: false,
            errors: Vec::new(),
        };
        for dir in dirs {
            let next = step.cascade.extend(&dir, store, policy);
            step.errors.extend(next.errors);
            step.cascade = next.cascade;
            step.contributed = next.contributed;
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use strata_core::{ExtensionSet, LocalFs};
    use tempfile::TempDir;

    use super::*;

    fn store() -> ContentStore {
        ContentStore::new(
            Arc::new(LocalFs),
            ExtensionSet::parse("html, txt, md"),
            ExtensionSet::parse("md"),
        )
    }

    /// root: index, nav, footer; root/child: nav, body; root/child/leaf: (none)
    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("child/leaf")).unwrap();
        fs::write(root.join("index.html"), "{{> nav}}{{> body}}").unwrap();
        fs::write(root.join("nav.html"), "root-nav").unwrap();
        fs::write(root.join("footer.txt"), "root-footer").unwrap();
        fs::write(root.join("logo.png"), "png").unwrap();
        fs::write(root.join("child/nav.html"), "child-nav").unwrap();
        fs::write(root.join("child/body.html"), "child-body").unwrap();
        fs::write(root.join("child/leaf/photo.jpg"), "jpg").unwrap();
        dir
    }

    #[test]
    fn test_extend_adds_parsable_only() {
        let dir = site();
        let step = Cascade::new().extend(dir.path(), &store(), OverridePolicy::Overwrite);
        assert!(step.contributed);
        assert!(step.errors.is_empty());
        assert_eq!(step.cascade.names().collect::<Vec<_>>(), ["footer", "index", "nav"]);
    }

    #[test]
    fn test_extend_does_not_mutate_original() {
        let dir = site();
        let base = Cascade::new().with(Fragment::new("nav", "base", ".html"), OverridePolicy::Overwrite);
        let step = base.extend(&dir.path().join("child"), &store(), OverridePolicy::Overwrite);
        assert_eq!(base.get("nav"), Some("base"));
        assert_eq!(base.len(), 1);
        assert_eq!(step.cascade.get("nav"), Some("child-nav"));
    }

    #[test]
    fn test_build_overwrite_prefers_descendant() {
        let dir = site();
        let step = Cascade::build(
            dir.path(),
            &dir.path().join("child"),
            &store(),
            OverridePolicy::Overwrite,
        );
        assert!(step.contributed);
        assert_eq!(step.cascade.get("nav"), Some("child-nav"));
        assert_eq!(step.cascade.get("footer"), Some("root-footer"));
        assert_eq!(step.cascade.get("body"), Some("child-body"));
    }

    #[test]
    fn test_build_keep_first_prefers_ancestor() {
        let dir = site();
        let step = Cascade::build(
            dir.path(),
            &dir.path().join("child"),
            &store(),
            OverridePolicy::KeepFirst,
        );
        assert!(step.contributed);
        assert_eq!(step.cascade.get("nav"), Some("root-nav"));
        assert_eq!(step.cascade.get("body"), Some("child-body"));
    }

    #[test]
    fn test_build_reports_target_contribution_only() {
        let dir = site();
        let step = Cascade::build(
            dir.path(),
            &dir.path().join("child/leaf"),
            &store(),
            OverridePolicy::Overwrite,
        );
        assert!(!step.contributed);
        assert_eq!(step.cascade.len(), 4);
    }

    #[test]
    fn test_build_missing_target_records_error() {
        let dir = site();
        let step = Cascade::build(
            dir.path(),
            &dir.path().join("nope"),
            &store(),
            OverridePolicy::KeepFirst,
        );
        assert!(!step.contributed);
        assert_eq!(step.errors.len(), 1);
        assert_eq!(step.cascade.get("nav"), Some("root-nav"));
    }

    #[test]
    fn test_same_name_in_one_directory_is_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("nav.html"), "from-html").unwrap();
        fs::write(dir.path().join("nav.txt"), "from-txt").unwrap();

        let overwrite = Cascade::new().extend(dir.path(), &store(), OverridePolicy::Overwrite);
        assert_eq!(overwrite.cascade.get("nav"), Some("from-txt"));

        let keep = Cascade::new().extend(dir.path(), &store(), OverridePolicy::KeepFirst);
        assert_eq!(keep.cascade.get("nav"), Some("from-html"));
    }

    #[test]
    fn test_policy_from_overwrite() {
        assert_eq!(OverridePolicy::from_overwrite(true), OverridePolicy::Overwrite);
        assert_eq!(OverridePolicy::from_overwrite(false), OverridePolicy::KeepFirst);
    }
}
