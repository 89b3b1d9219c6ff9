//! Incremental maintenance of a compiled site.
//!
//! [`LiveSite`] turns batches of debounced [`Change`]s into output removals,
//! static file copies and scoped regenerations. Removals and copies run first,
//! in order; regenerations then run concurrently and the batch completes only
//! once all of them finished.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use strata_core::fs::is_hidden_below;
use tracing::{debug, info, trace};

use crate::{
    build::{BuildJob, BuildReport, Builder, Failure},
    cascade::OverridePolicy,
    debounce::{Change, ChangeKind},
    error::GenerateError,
};

/// Effect of one applied batch.
#[derive(Debug, Default)]
pub struct LiveUpdate {
    /// Directories that appeared and should be watched.
    pub subscribe: Vec<PathBuf>,
    /// Directories that disappeared and should no longer be watched.
    pub unsubscribe: Vec<PathBuf>,
    pub report: BuildReport,
}

/// How much of a directory to regenerate. Ordered by coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Regen {
    /// The directory's own page.
    Page,
    /// Pages of the directory and everything below it.
    Pages,
    /// Pages and static files of the directory and everything below it.
    Tree,
}

impl Regen {
    fn job(self, dir: &Path) -> BuildJob {
        match self {
            Self::Page => BuildJob::page(dir),
            Self::Pages => BuildJob::pages(dir),
            Self::Tree => BuildJob::tree(dir),
        }
    }

    /// Whether regenerating `self` at `dir` also regenerates `other` at `other_dir`.
    fn covers(self, dir: &Path, other: Regen, other_dir: &Path) -> bool {
        if self < other {
            return false;
        }
        other_dir == dir || (self != Regen::Page && other_dir.starts_with(dir))
    }
}

/// Source tree kept in sync with its output while files change.
#[derive(Debug)]
pub struct LiveSite {
    builder: Builder,
    policy: OverridePolicy,
    directories: BTreeSet<PathBuf>,
}

impl LiveSite {
    /// Track the current directories of the builder's source tree.
    pub fn new(builder: Builder, policy: OverridePolicy) -> Self {
        let source = builder.options().source.clone();
        let mut directories = BTreeSet::new();
        directories.insert(source.clone());
        directories.extend(
            builder
                .fs()
                .explore(&source)
                .into_iter()
                .filter(|dir| !builder.is_output_path(dir)),
        );

        Self {
            builder,
            policy,
            directories,
        }
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Known source directories, sorted.
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.directories.iter().map(PathBuf::as_path)
    }

    /// Apply one batch of changes.
    pub fn apply(&mut self, changes: &[Change]) -> LiveUpdate {
        let mut update = LiveUpdate::default();
        let mut regen: BTreeMap<PathBuf, Regen> = BTreeMap::new();
        let mut schedule = |dir: &Path, scope: Regen| {
            let entry = regen.entry(dir.to_path_buf()).or_insert(scope);
            *entry = (*entry).max(scope);
        };

        for change in changes {
            if !self.is_relevant(&change.path) {
                trace!(path = %change.path.display(), "ignoring change");
                continue;
            }
            debug!(path = %change.path.display(), kind = ?change.kind, "applying change");

            let path = &change.path;
            let parent = path.parent().filter(|p| self.directories.contains(*p));

            match change.kind {
                ChangeKind::Removed if self.directories.contains(path) => {
                    update.unsubscribe.extend(self.forget(path));
                    self.remove_output(path, &mut update.report);
                    if let Some(parent) = parent {
                        schedule(parent, Regen::Page);
                    }
                }
                ChangeKind::Removed => {
                    if let Some(dir) = parent {
                        if self.builder.store().is_parsable(path) {
                            if let Some(page) = self.builder.page_path(dir) {
                                self.remove_output(&page, &mut update.report);
                            }
                            schedule(dir, Regen::Pages);
                        } else if let Some(target) = self.builder.output_dir_for(path) {
                            self.remove_output(&target, &mut update.report);
                        }
                    }
                }
                ChangeKind::Created | ChangeKind::Modified if self.builder.fs().is_dir(path) => {
                    if self.directories.contains(path) {
                        // Possibly deleted and recreated: the old watches went
                        // with the old directory and its output may be stale.
                        update.unsubscribe.extend(self.forget(path));
                        self.remove_output(path, &mut update.report);
                    } else if let Some(parent) = parent {
                        schedule(parent, Regen::Page);
                    }
                    self.directories.insert(path.clone());
                    update.subscribe.push(path.clone());
                    for dir in self.builder.fs().explore(path) {
                        if !self.builder.is_output_path(&dir) && self.directories.insert(dir.clone())
                        {
                            update.subscribe.push(dir);
                        }
                    }
                    schedule(path, Regen::Tree);
                }
                ChangeKind::Created | ChangeKind::Modified if self.builder.fs().is_file(path) => {
                    let Some(dir) = parent else {
                        continue;
                    };
                    if self.builder.store().is_parsable(path) {
                        schedule(dir, Regen::Pages);
                    } else {
                        self.copy_asset(path, &mut update.report);
                    }
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    trace!(path = %path.display(), "changed path no longer exists");
                }
            }
        }

        let jobs = subsume(regen);
        let handles: Vec<_> = jobs
            .iter()
            .filter(|(dir, _)| self.directories.contains(dir))
            .map(|(dir, scope)| {
                trace!(dir = %dir.display(), scope = ?scope, "regenerating");
                self.builder.spawn(scope.job(dir).with_policy(self.policy))
            })
            .collect();

        for handle in handles {
            match handle.wait() {
                Ok(report) => update.report.merge(report),
                Err(e) => tracing::error!(error = %e, "regeneration did not complete"),
            }
        }

        if !changes.is_empty() {
            info!(
                changes = changes.len(),
                pages = update.report.pages,
                assets = update.report.assets,
                failures = update.report.failures.len(),
                "applied changes"
            );
        }
        update
    }

    /// Drop `dir` and every known directory below it, returning them.
    fn forget(&mut self, dir: &Path) -> Vec<PathBuf> {
        let gone: Vec<PathBuf> = self
            .directories
            .iter()
            .filter(|known| known.starts_with(dir))
            .cloned()
            .collect();
        for known in &gone {
            self.directories.remove(known);
        }
        gone
    }

    /// Changes outside the source, inside the output or on hidden paths are
    /// not part of the site.
    fn is_relevant(&self, path: &Path) -> bool {
        let source = &self.builder.options().source;
        path.starts_with(source)
            && path != source
            && !self.builder.is_output_path(path)
            && !is_hidden_below(path, source)
    }

    fn remove_output(&self, source_or_output: &Path, report: &mut BuildReport) {
        let target = if self.builder.is_output_path(source_or_output) {
            Some(source_or_output.to_path_buf())
        } else {
            self.builder.output_dir_for(source_or_output)
        };
        let Some(target) = target else {
            return;
        };
        debug!(path = %target.display(), "removing output");
        if let Err(source) = self.builder.fs().remove_all(&target) {
            report.failures.push(Failure {
                path: target.clone(),
                error: GenerateError::write(target, source),
            });
        }
    }

    fn copy_asset(&self, path: &Path, report: &mut BuildReport) {
        let Some(to) = self.builder.output_dir_for(path) else {
            return;
        };
        match self.builder.fs().copy(path, &to) {
            Ok(()) => report.assets += 1,
            Err(source) => report.failures.push(Failure {
                path: path.to_path_buf(),
                error: GenerateError::Copy {
                    from: path.to_path_buf(),
                    to,
                    source,
                },
            }),
        }
    }
}

/// Drop regenerations already covered by another one in the same batch.
fn subsume(regen: BTreeMap<PathBuf, Regen>) -> Vec<(PathBuf, Regen)> {
    let all: Vec<(PathBuf, Regen)> = regen.into_iter().collect();
    all.iter()
        .filter(|(dir, scope)| {
            !all.iter().any(|(other_dir, other)| {
                other_dir != dir && other.covers(other_dir, *scope, dir)
            })
        })
        .cloned()
        .collect()
}
