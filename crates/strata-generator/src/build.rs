//! Build orchestration.
//!
//! Walks the source tree on a dedicated rayon pool. Every directory is one
//! scoped task: it extends the cascade it inherited, renders its page when it
//! holds fragments, copies its static files and hands each subdirectory its
//! own copy of the cascade.

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, mpsc},
    time::Instant,
};

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use strata_core::{Config, ExtensionSet, FileSystem, Listing, LocalFs, RenderOrder};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    cascade::{Cascade, OverridePolicy},
    context::{PageContext, url_for},
    error::GenerateError,
    fragment::ContentStore,
    merge::{DEFAULT_MERGE_LIMIT, merge},
    render::{HandlebarsRenderer, Renderer},
};

/// Build errors.
///
/// These abort a whole run. Problems with single directories or files are
/// collected in [`BuildReport::failures`] instead.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The run ended without producing a report.
    #[error("build was interrupted before it finished")]
    Interrupted,
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Settings of a builder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Absolute source directory.
    pub source: PathBuf,
    /// Absolute output directory.
    pub output: PathBuf,
    /// File name of each generated page.
    pub save_as: String,
    /// Extensions of fragment files.
    pub extensions: ExtensionSet,
    /// Extensions converted from markdown.
    pub markdown_extensions: ExtensionSet,
    /// Fragment every page is expanded from.
    pub root_fragment: String,
    /// Worker threads, 0 for one per CPU.
    pub jobs: usize,
    /// Cap on include substitutions per page.
    pub merge_limit: usize,
    pub render_order: RenderOrder,
}

impl BuildOptions {
    /// Options with default settings for the given directories.
    pub fn new(source: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            source: absolute(source.as_ref())?,
            output: absolute(output.as_ref())?,
            save_as: "index.html".to_string(),
            extensions: ExtensionSet::parse("html, txt, md"),
            markdown_extensions: ExtensionSet::parse("md"),
            root_fragment: "index".to_string(),
            jobs: 0,
            merge_limit: DEFAULT_MERGE_LIMIT,
            render_order: RenderOrder::default(),
        })
    }

    /// Options taken from a loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            source: absolute(&config.site.source)?,
            output: absolute(&config.site.output)?,
            save_as: config.site.save_as.clone(),
            extensions: config.extensions(),
            markdown_extensions: config.markdown_extensions(),
            root_fragment: config.site.root_fragment.clone(),
            jobs: config.build.jobs,
            merge_limit: config.build.merge_limit,
            render_order: config.build.render_order,
        })
    }
}

/// Make a path absolute and lexically resolve `.` and `..`.
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)?;
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

/// Lifecycle of one directory within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    Pending,
    Cascading,
    Rendering,
    Writing,
    Done,
    Failed,
}

impl DirectoryState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for DirectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Cascading => "cascading",
            Self::Rendering => "rendering",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failure recorded against one path.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub error: GenerateError,
}

/// Outcome of a run.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Pages written.
    pub pages: usize,
    /// Static files copied.
    pub assets: usize,
    pub failures: Vec<Failure>,
    /// Final state of every visited directory.
    pub states: BTreeMap<PathBuf, DirectoryState>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl BuildReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: BuildReport) {
        self.pages += other.pages;
        self.assets += other.assets;
        self.failures.extend(other.failures);
        self.states.extend(other.states);
        self.duration_ms = self.duration_ms.max(other.duration_ms);
    }

    /// Whether nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Directories that ended in [`DirectoryState::Failed`].
    pub fn failed_dirs(&self) -> impl Iterator<Item = &Path> {
        self.states
            .iter()
            .filter(|(_, state)| **state == DirectoryState::Failed)
            .map(|(dir, _)| dir.as_path())
    }

    fn fail(&mut self, path: &Path, error: GenerateError) {
        warn!(path = %path.display(), error = %error, "generation failure");
        self.failures.push(Failure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// A unit of work for [`Builder::spawn`].
#[derive(Debug, Clone)]
pub struct BuildJob {
    /// Directory the job starts at.
    pub dir: PathBuf,
    /// Cascade inherited from the ancestors of `dir`. When absent it is read
    /// from the source tree.
    pub cascade: Option<Cascade>,
    pub policy: OverridePolicy,
    /// Whether subdirectories are visited.
    pub recursive: bool,
    /// Whether pages are rendered.
    pub pages: bool,
    /// Whether static files are copied.
    pub assets: bool,
}

impl BuildJob {
    fn new(dir: impl Into<PathBuf>, recursive: bool, pages: bool, assets: bool) -> Self {
        Self {
            dir: dir.into(),
            cascade: None,
            policy: OverridePolicy::Overwrite,
            recursive,
            pages,
            assets,
        }
    }

    /// Pages and static files of a whole subtree.
    pub fn tree(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, true, true, true)
    }

    /// Pages of a whole subtree.
    pub fn pages(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, true, true, false)
    }

    /// The page of one directory.
    pub fn page(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, false, true, false)
    }

    /// Static files of a whole subtree.
    pub fn assets(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, true, false, true)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: OverridePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = Some(cascade);
        self
    }
}

/// Handle on a spawned run.
#[derive(Debug)]
pub struct BuildHandle {
    rx: mpsc::Receiver<BuildReport>,
}

impl BuildHandle {
    /// Block until the run has finished.
    pub fn wait(self) -> Result<BuildReport> {
        self.rx.recv().map_err(|_| BuildError::Interrupted)
    }
}

#[derive(Debug, Clone, Copy)]
struct Plan {
    policy: OverridePolicy,
    recursive: bool,
    pages: bool,
    assets: bool,
}

struct Inner {
    options: BuildOptions,
    store: ContentStore,
    renderer: Arc<dyn Renderer>,
}

/// Site builder.
#[derive(Clone)]
pub struct Builder {
    inner: Arc<Inner>,
    pool: Arc<ThreadPool>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("options", &self.inner.options)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a builder on the local filesystem with the handlebars renderer.
    pub fn new(options: BuildOptions) -> Result<Self> {
        Self::with_backends(options, Arc::new(LocalFs), Arc::new(HandlebarsRenderer::new()))
    }

    /// Create a builder with explicit filesystem and renderer.
    pub fn with_backends(
        options: BuildOptions,
        fs: Arc<dyn FileSystem>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.jobs)
            .thread_name(|i| format!("strata-gen-{i}"))
            .panic_handler(|_| tracing::error!("generation task panicked"))
            .build()?;

        let store = ContentStore::new(
            fs,
            options.extensions.clone(),
            options.markdown_extensions.clone(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                store,
                renderer,
            }),
            pool: Arc::new(pool),
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.inner.options
    }

    pub fn store(&self) -> &ContentStore {
        &self.inner.store
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.inner.store.fs()
    }

    /// Output directory mirroring a source directory or file.
    pub fn output_dir_for(&self, source_path: &Path) -> Option<PathBuf> {
        self.inner.output_dir_for(source_path)
    }

    /// Output page of a source directory.
    pub fn page_path(&self, dir: &Path) -> Option<PathBuf> {
        self.inner.page_path(dir)
    }

    /// Whether a path lies in the output directory.
    pub fn is_output_path(&self, path: &Path) -> bool {
        self.inner.is_output_path(path)
    }

    /// Start a run on the worker pool.
    pub fn spawn(&self, job: BuildJob) -> BuildHandle {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);

        self.pool.spawn(move || {
            let start = Instant::now();
            let plan = Plan {
                policy: job.policy,
                recursive: job.recursive,
                pages: job.pages,
                assets: job.assets,
            };
            let cascade = match job.cascade {
                Some(cascade) => cascade,
                None => inner.inherited(&job.dir, job.policy),
            };
            let report = Mutex::new(BuildReport::default());

            let inner = inner.as_ref();
            rayon::scope(|scope| inner.visit(scope, job.dir, cascade, plan, &report));

            let mut report = report.into_inner().unwrap_or_else(PoisonError::into_inner);
            report.duration_ms = start.elapsed().as_millis() as u64;
            // The caller may have dropped the handle.
            let _ = tx.send(report);
        });

        BuildHandle { rx }
    }

    /// Clean the output directory and generate the whole site.
    pub fn build(&self) -> Result<BuildReport> {
        let options = &self.inner.options;
        if !self.fs().is_dir(&options.source) {
            return Err(BuildError::Config(format!(
                "source directory not found: {}",
                options.source.display()
            )));
        }
        if options.source.starts_with(&options.output) {
            return Err(BuildError::Config(format!(
                "output directory {} contains the source directory {}",
                options.output.display(),
                options.source.display()
            )));
        }

        info!(
            source = %options.source.display(),
            output = %options.output.display(),
            "starting build"
        );

        debug!(dir = %options.output.display(), "cleaning output directory");
        self.fs().remove_all(&options.output)?;

        let report = self.spawn(BuildJob::tree(&options.source)).wait()?;

        info!(
            pages = report.pages,
            assets = report.assets,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "build complete"
        );
        Ok(report)
    }

    /// Merge and render the page of `dir` from a complete cascade.
    pub fn render_page(
        &self,
        dir: &Path,
        cascade: &Cascade,
    ) -> std::result::Result<String, GenerateError> {
        let context = self.page_context(dir)?;
        self.inner.render(dir, cascade, &context)
    }

    /// Page context of a source directory.
    pub fn page_context(&self, dir: &Path) -> std::result::Result<PageContext, GenerateError> {
        let listing = self
            .fs()
            .list(dir)
            .map_err(|source| GenerateError::read(dir, source))?;
        Ok(self.inner.context_for(dir, &listing))
    }
}

impl Inner {
    fn output_dir_for(&self, source_path: &Path) -> Option<PathBuf> {
        let relative = source_path.strip_prefix(&self.options.source).ok()?;
        Some(self.options.output.join(relative))
    }

    fn page_path(&self, dir: &Path) -> Option<PathBuf> {
        Some(self.output_dir_for(dir)?.join(&self.options.save_as))
    }

    fn is_output_path(&self, path: &Path) -> bool {
        path.starts_with(&self.options.output)
    }

    /// Cascade contributed by the ancestors of `dir`, excluding `dir` itself.
    fn inherited(&self, dir: &Path, policy: OverridePolicy) -> Cascade {
        let source = &self.options.source;
        match dir.parent() {
            Some(parent) if dir != source && parent.starts_with(source) => {
                let step = Cascade::build(source, parent, &self.store, policy);
                for error in &step.errors {
                    debug!(error = %error, "ancestor fragment unavailable");
                }
                step.cascade
            }
            _ => Cascade::new(),
        }
    }

    fn context_for(&self, dir: &Path, listing: &Listing) -> PageContext {
        let relative = dir.strip_prefix(&self.options.source).unwrap_or(Path::new(""));
        let children: Vec<&String> = listing
            .dirs
            .iter()
            .filter(|name| !self.is_output_path(&dir.join(name)))
            .collect();
        PageContext::new(&url_for(relative), &children)
    }

    fn render(
        &self,
        dir: &Path,
        cascade: &Cascade,
        context: &PageContext,
    ) -> std::result::Result<String, GenerateError> {
        let outcome = merge(cascade, &self.options.root_fragment, self.options.merge_limit);
        if outcome.missing_root {
            debug!(dir = %dir.display(), root = %self.options.root_fragment, "no root fragment");
        }
        if !outcome.unresolved.is_empty() {
            debug!(dir = %dir.display(), names = ?outcome.unresolved, "unresolved includes");
        }
        self.renderer
            .render(&outcome.body, context)
            .map_err(|e| GenerateError::Render {
                dir: dir.to_path_buf(),
                message: e.message,
            })
    }

    fn visit<'s>(
        &'s self,
        scope: &Scope<'s>,
        dir: PathBuf,
        inherited: Cascade,
        plan: Plan,
        report: &'s Mutex<BuildReport>,
    ) {
        let mut state = DirectoryState::Pending;
        let mut advance = |next: DirectoryState| {
            trace!(dir = %dir.display(), from = %state, to = %next, "directory state");
            state = next;
        };

        if self.is_output_path(&dir) {
            return;
        }

        advance(DirectoryState::Cascading);
        let listing = match self.store.fs().list(&dir) {
            Ok(listing) => listing,
            Err(source) => {
                advance(DirectoryState::Failed);
                let mut report = lock(report);
                report.fail(&dir, GenerateError::read(&dir, source));
                report.states.insert(dir, DirectoryState::Failed);
                return;
            }
        };
        let step = inherited.extend_listed(&dir, &listing, &self.store, plan.policy);
        if !step.errors.is_empty() {
            let mut report = lock(report);
            for error in step.errors {
                report.fail(&dir, error);
            }
        }

        if plan.assets {
            let dir = dir.clone();
            let files = listing.files.clone();
            scope.spawn(move |_| self.copy_assets(&dir, &files, report));
        }

        let children: Vec<PathBuf> = if plan.recursive {
            listing
                .dirs
                .iter()
                .map(|name| dir.join(name))
                .filter(|child| !self.is_output_path(child))
                .collect()
        } else {
            Vec::new()
        };

        if self.options.render_order == RenderOrder::ChildrenFirst {
            self.fan_out(scope, children.clone(), &step.cascade, plan, report);
        }

        let mut final_state = DirectoryState::Done;
        if plan.pages && step.contributed {
            advance(DirectoryState::Rendering);
            let context = self.context_for(&dir, &listing);
            let written = self.render(&dir, &step.cascade, &context).and_then(|page| {
                advance(DirectoryState::Writing);
                self.write_page(&dir, &page)
            });
            match written {
                Ok(path) => {
                    debug!(path = %path.display(), "wrote page");
                    lock(report).pages += 1;
                }
                Err(error) => {
                    final_state = DirectoryState::Failed;
                    lock(report).fail(&dir, error);
                }
            }
        }

        if self.options.render_order == RenderOrder::ParentFirst {
            self.fan_out(scope, children, &step.cascade, plan, report);
        }

        advance(final_state);
        lock(report).states.insert(dir, final_state);
    }

    fn fan_out<'s>(
        &'s self,
        scope: &Scope<'s>,
        children: Vec<PathBuf>,
        cascade: &Cascade,
        plan: Plan,
        report: &'s Mutex<BuildReport>,
    ) {
        for child in children {
            let cascade = cascade.clone();
            scope.spawn(move |scope| self.visit(scope, child, cascade, plan, report));
        }
    }

    fn write_page(&self, dir: &Path, page: &str) -> std::result::Result<PathBuf, GenerateError> {
        let path = self.page_path(dir).ok_or_else(|| {
            GenerateError::write(
                dir,
                io::Error::new(io::ErrorKind::InvalidInput, "directory is outside the source tree"),
            )
        })?;
        self.store
            .fs()
            .write(&path, page.as_bytes())
            .map_err(|source| GenerateError::write(&path, source))?;
        Ok(path)
    }

    fn copy_assets(&self, dir: &Path, files: &[String], report: &Mutex<BuildReport>) {
        let Some(target) = self.output_dir_for(dir) else {
            return;
        };
        let mut copied = 0;
        let mut failures = Vec::new();
        for file in files {
            let from = dir.join(file);
            if self.store.is_parsable(&from) {
                continue;
            }
            let to = target.join(file);
            match self.store.fs().copy(&from, &to) {
                Ok(()) => {
                    trace!(from = %from.display(), to = %to.display(), "copied static file");
                    copied += 1;
                }
                Err(source) => failures.push(GenerateError::Copy { from, to, source }),
            }
        }

        let mut report = lock(report);
        report.assets += copied;
        for error in failures {
            report.fail(dir, error);
        }
    }
}

fn lock(report: &Mutex<BuildReport>) -> std::sync::MutexGuard<'_, BuildReport> {
    report.lock().unwrap_or_else(PoisonError::into_inner)
}
