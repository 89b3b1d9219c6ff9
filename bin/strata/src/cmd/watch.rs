//! Interactive mode - compiles, then keeps the output in sync with the source

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use color_eyre::eyre::{Result, WrapErr};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use strata_core::Config;
use strata_generator::{ChangeKind, EventDebouncer, LiveSite, LiveUpdate, OverridePolicy};
use tokio::sync::mpsc;

use super::build::{builder, print_report};

/// One non-recursive watch per known source directory.
#[derive(Debug)]
pub struct DirectoryWatches<W: Watcher> {
    watcher: W,
    watched: BTreeSet<PathBuf>,
}

impl<W: Watcher> DirectoryWatches<W> {
    pub fn new(watcher: W) -> Self {
        Self {
            watcher,
            watched: BTreeSet::new(),
        }
    }

    /// Start watching `dir`. Failures are logged and leave `dir` unwatched.
    pub fn add(&mut self, dir: &Path) -> bool {
        if self.watched.contains(dir) {
            return false;
        }
        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tracing::debug!(dir = %dir.display(), "watching directory");
                self.watched.insert(dir.to_path_buf());
                true
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to watch directory");
                false
            }
        }
    }

    /// Stop watching `dir`.
    pub fn remove(&mut self, dir: &Path) -> bool {
        if !self.watched.remove(dir) {
            return false;
        }
        // The OS drops watches of deleted directories on its own.
        if let Err(e) = self.watcher.unwatch(dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "unwatch failed");
        }
        true
    }

    /// Follow the directory changes of an applied batch.
    pub fn apply(&mut self, update: &LiveUpdate) {
        for dir in &update.unsubscribe {
            self.remove(dir);
        }
        for dir in &update.subscribe {
            self.add(dir);
        }
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }
}

/// Map a raw notify event onto debouncer input.
pub fn classify(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let all = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Created),
        EventKind::Remove(_) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                changes.push((from.clone(), ChangeKind::Removed));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((to.clone(), ChangeKind::Created));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Removed
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => all(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Run interactive mode until Ctrl-C.
pub async fn run(config: &Config) -> Result<()> {
    let builder = builder(config)?;

    tracing::info!("running initial build");
    let initial = {
        let builder = builder.clone();
        tokio::task::spawn_blocking(move || builder.build())
            .await
            .wrap_err("Initial build panicked")?
            .wrap_err("Initial build failed")?
    };
    print_report(&initial);

    let policy = OverridePolicy::from_overwrite(config.watch.overwrite);
    if policy == OverridePolicy::KeepFirst {
        tracing::warn!("watch.overwrite is off, rebuilt pages may differ from a full build");
    }
    let site = Arc::new(Mutex::new(LiveSite::new(builder, policy)));

    let (tx, mut rx) = mpsc::channel::<Event>(256);
    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        // The receiver is gone during shutdown.
        Ok(event) => {
            let _ = tx.blocking_send(event);
        }
        Err(e) => tracing::warn!(error = %e, "watch error"),
    })
    .wrap_err("Failed to create file watcher")?;

    let mut watches = DirectoryWatches::new(watcher);
    {
        let site = site.lock().unwrap_or_else(PoisonError::into_inner);
        for dir in site.directories() {
            watches.add(dir);
        }
    }

    let debouncer = Arc::new(EventDebouncer::new(Duration::from_millis(
        config.watch.debounce_ms,
    )));
    let recorder = Arc::clone(&debouncer);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            for (path, kind) in classify(&event) {
                tracing::trace!(path = %path.display(), ?kind, "recorded filesystem event");
                recorder.record(path, kind);
            }
        }
    });

    println!("  Watching {} directories", watches.len());
    println!("  Press Ctrl+C to stop");
    println!();

    let mut interval = tokio::time::interval(Duration::from_millis(config.watch.poll_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                println!();
                println!("  Stopping");
                break;
            }
            _ = interval.tick() => {
                let changes = debouncer.drain_ready();
                if changes.is_empty() {
                    continue;
                }

                // One batch at a time: the next drain waits for this one.
                let site = Arc::clone(&site);
                let update = tokio::task::spawn_blocking(move || {
                    site.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .apply(&changes)
                })
                .await
                .wrap_err("Rebuild panicked")?;

                watches.apply(&update);
                println!(
                    "  ✓ Rebuilt {} pages, copied {} files in {}ms",
                    update.report.pages, update.report.assets, update.report.duration_ms
                );
                for failure in &update.report.failures {
                    eprintln!("  ✗ {}", failure.error);
                }
            }
        }
    }

    Ok(())
}
