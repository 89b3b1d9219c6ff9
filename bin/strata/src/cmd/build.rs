//! Compiled mode - generates the whole site once

use color_eyre::eyre::{Result, WrapErr, eyre};
use strata_core::Config;
use strata_generator::{BuildOptions, BuildReport, Builder};

/// Create a builder from the loaded configuration.
pub fn builder(config: &Config) -> Result<Builder> {
    let options = BuildOptions::from_config(config).wrap_err("Invalid site directories")?;
    tracing::debug!(?options, "build options");
    Builder::new(options).wrap_err("Failed to create builder")
}

/// Run compiled mode.
///
/// Per-directory failures do not stop the run; they are listed afterwards and
/// turn the exit status into an error.
pub fn run(config: &Config) -> Result<BuildReport> {
    let builder = builder(config)?;
    let report = builder.build().wrap_err("Build failed")?;

    print_report(&report);

    if report.is_clean() {
        Ok(report)
    } else {
        Err(eyre!(
            "generation finished with {} failure(s)",
            report.failures.len()
        ))
    }
}

/// Print build statistics in a user-friendly format.
pub fn print_report(report: &BuildReport) {
    println!("  Build Statistics:");
    println!("  ─────────────────────────────────");
    println!("  Pages:        {:>6}", report.pages);
    println!("  Assets:       {:>6}", report.assets);
    println!("  Directories:  {:>6}", report.states.len());
    println!("  Failures:     {:>6}", report.failures.len());
    println!("  Duration:     {:>6}ms", report.duration_ms);
    println!();

    for failure in &report.failures {
        eprintln!("  ✗ {}", failure.error);
    }
}
