//! Content store: loads single fragments from disk.

use std::{fmt, path::Path, sync::Arc};

use strata_core::{ExtensionSet, FileSystem};
use strata_parser::ParserRegistry;

use crate::error::GenerateError;

/// A named piece of content loaded from one file.
///
/// `body` holds the post-conversion text and is shared, so copying a cascade
/// never copies fragment bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub body: Arc<str>,
    pub extension: String,
}

impl Fragment {
    pub fn new(
        name: impl Into<String>,
        body: impl Into<Arc<str>>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            extension: extension.into(),
        }
    }

    /// Fragment name for a file name: the name without its last extension.
    pub fn name_of(file_name: &str) -> &str {
        match file_name.rfind('.') {
            Some(0) | None => file_name,
            Some(dot) => &file_name[..dot],
        }
    }
}

/// Loads fragments, converting markdown sources on the way in.
#[derive(Clone)]
pub struct ContentStore {
    fs: Arc<dyn FileSystem>,
    parser: ParserRegistry,
    extensions: ExtensionSet,
}

impl fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStore")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl ContentStore {
    /// Create a store reading through `fs`.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        extensions: ExtensionSet,
        markdown_extensions: ExtensionSet,
    ) -> Self {
        Self {
            fs,
            parser: ParserRegistry::new(markdown_extensions),
            extensions,
        }
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Whether a file is a fragment (as opposed to a static asset).
    pub fn is_parsable(&self, path: &Path) -> bool {
        self.extensions.matches(path)
    }

    /// Load one fragment.
    pub fn load(&self, path: &Path) -> Result<Fragment, GenerateError> {
        let raw = self
            .fs
            .read(path)
            .map_err(|source| GenerateError::read(path, source))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = Fragment::name_of(&file_name).to_string();
        let extension = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let body = self.parser.convert(path, &raw);
        tracing::trace!(path = %path.display(), name = %name, bytes = body.len(), "loaded fragment");

        Ok(Fragment::new(name, body, extension))
    }
}
