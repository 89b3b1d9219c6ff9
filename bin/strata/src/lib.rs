//! strata CLI library
//!
//! Mode implementations behind the `strata` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Compiled, interactive and dynamic modes
//! - [`server`] - HTTP front end of the dynamic mode
//!
//! # Example
//!
//! ```no_run
//! use strata::Config;
//!
//! let mut config = Config::default();
//! config.site.source = "site".into();
//! config.site.output = "public".into();
//! strata::cmd::build::run(&config).unwrap();
//! ```

pub mod cmd;
pub mod server;

pub use strata_core::{Config, Mode};
pub use strata_generator::{BuildReport, Builder, LiveSite, OnDemand};

/// Initialize tracing with the specified verbosity level.
///
/// `verbose` maps 0 to WARN, 1 to INFO, 2 to DEBUG and anything above to
/// TRACE. `RUST_LOG` directives are honoured on top.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

/// Print the startup banner.
pub fn print_header(config: &Config, mode: Mode) {
    println!();
    println!("  strata {}", env!("CARGO_PKG_VERSION"));
    println!("  ─────────────────────────────────");
    println!("  Mode:    {mode}");
    println!("  Source:  {}", config.site.source.display());
    if mode != Mode::Dynamic {
        println!("  Output:  {}", config.site.output.display());
    }
    println!();
}
