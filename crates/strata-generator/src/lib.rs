//! strata generator library
//!
//! Cascading template composition and concurrent generation engine.
//!
//! # Modules
//!
//! - [`fragment`] - Loading single fragments from disk
//! - [`cascade`] - Fragments inherited from ancestor directories
//! - [`merge`] - Include marker expansion
//! - [`context`] - Per-page template variables
//! - [`render`] - Template execution
//! - [`build`] - Build orchestration on a worker pool
//! - [`debounce`] - Filesystem event coalescing
//! - [`live`] - Incremental rebuilds after changes
//! - [`on_demand`] - Per-request rendering

pub mod build;
pub mod cascade;
pub mod context;
pub mod debounce;
pub mod error;
pub mod fragment;
pub mod live;
pub mod merge;
pub mod on_demand;
pub mod render;

pub use build::{
    BuildError, BuildHandle, BuildJob, BuildOptions, BuildReport, Builder, DirectoryState, Failure,
};
pub use cascade::{Cascade, CascadeStep, OverridePolicy};
pub use context::{PageContext, PageLink};
pub use debounce::{Change, ChangeKind, EventDebouncer};
pub use error::GenerateError;
pub use fragment::{ContentStore, Fragment};
pub use live::{LiveSite, LiveUpdate};
pub use merge::{DEFAULT_MERGE_LIMIT, MergeOutcome, merge};
pub use on_demand::{OnDemand, Resolution};
pub use render::{HandlebarsRenderer, RenderError, Renderer};
