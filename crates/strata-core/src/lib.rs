//! strata core library
//!
//! Configuration, error handling, extension sets and filesystem access shared
//! by the generator and the command-line binary.

pub mod config;
pub mod error;
pub mod extensions;
pub mod fs;

pub use config::{Config, Mode, Overrides, RenderOrder};
pub use error::{CoreError, Result};
pub use extensions::ExtensionSet;
pub use fs::{FileSystem, Listing, LocalFs};
