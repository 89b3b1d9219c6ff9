//! Per-request page generation with nothing written to disk.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use strata_core::fs::is_hidden;

use crate::{
    build::Builder,
    cascade::{Cascade, OverridePolicy},
    error::GenerateError,
};

/// What a request path maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A rendered page.
    Page(String),
    /// A static file to serve as is.
    Asset(PathBuf),
    NotFound,
}

/// Resolves request paths against the source tree.
///
/// The cascade is rebuilt from the filesystem for every request with the
/// ancestor-wins policy, so a leaf cannot mask a shared ancestor fragment.
#[derive(Debug, Clone)]
pub struct OnDemand {
    builder: Builder,
}

impl OnDemand {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }

    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// Resolve a URL path such as `/docs/guide/` or `/img/logo.png`.
    pub fn resolve(&self, request_path: &str) -> Result<Resolution, GenerateError> {
        let decoded = percent_decode_str(request_path).decode_utf8_lossy();
        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Ok(Resolution::NotFound),
                s if is_hidden(s) || s.contains('\\') => return Ok(Resolution::NotFound),
                s => segments.push(s),
            }
        }

        // Directories win over extensions: `/v1.2` and `/v1.2/` are pages.
        let source = &self.builder.options().source;
        let names_dir =
            decoded.ends_with('/') || self.builder.fs().is_dir(&join(source, &segments));
        if let Some(&last) = segments.last() {
            if !names_dir && Path::new(last).extension().is_some() {
                let store = self.builder.store();
                if store.is_parsable(Path::new(last)) {
                    segments.pop();
                } else {
                    let file = join(source, &segments);
                    if self.builder.fs().is_file(&file) && !self.builder.is_output_path(&file) {
                        return Ok(Resolution::Asset(file));
                    }
                    return Ok(Resolution::NotFound);
                }
            }
        }

        let dir = join(source, &segments);
        if !self.builder.fs().is_dir(&dir) || self.builder.is_output_path(&dir) {
            return Ok(Resolution::NotFound);
        }

        let step = Cascade::build(source, &dir, self.builder.store(), OverridePolicy::KeepFirst);
        for error in &step.errors {
            tracing::warn!(error = %error, "fragment unavailable");
        }
        if !step.contributed {
            tracing::debug!(dir = %dir.display(), "no fragments, not found");
            return Ok(Resolution::NotFound);
        }

        let page = self.builder.render_page(&dir, &step.cascade)?;
        Ok(Resolution::Page(page))
    }
}

fn join(source: &Path, segments: &[&str]) -> PathBuf {
    segments.iter().fold(source.to_path_buf(), |path, s| path.join(s))
}
