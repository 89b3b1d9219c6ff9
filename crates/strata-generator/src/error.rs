//! Errors raised while generating a single directory or file.
//!
//! None of these abort a run: they are recorded in the run's report and the
//! affected entity is skipped.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Per-entity generation errors.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// A fragment, static file or directory could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An output file or directory could not be created, written or removed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A static file could not be copied into the output tree.
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The template engine rejected the merged template of a directory.
    #[error("failed to render {}: {message}", .dir.display())]
    Render { dir: PathBuf, message: String },
}

impl GenerateError {
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = GenerateError::read(
            "/src/about/nav.html",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to read /src/about/nav.html: denied");

        let err = GenerateError::Render {
            dir: PathBuf::from("/src/blog"),
            message: "unexpected end of template".to_string(),
        };
        assert!(err.to_string().contains("/src/blog"));
    }
}
