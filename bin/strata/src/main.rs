//! strata CLI
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use strata_core::{Config, Mode, Overrides};

/// Command-line interface for strata.
#[derive(Parser)]
#[command(
    name = "strata",
    version,
    about = "Compose pages from fragments cascading down a directory tree"
)]
struct Cli {
    /// Path to configuration file [default: strata.toml when present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Operating mode: compiled, interactive or dynamic
    #[arg(long)]
    mode: Option<String>,

    /// Source directory
    #[arg(long)]
    source: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Port to listen on in dynamic mode
    #[arg(long)]
    port: Option<u16>,

    /// Parsable extensions, comma separated (e.g. "html, txt, md")
    #[arg(long)]
    exts: Option<String>,

    /// File name of each generated page
    #[arg(long = "saveAs", alias = "save-as")]
    save_as: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode: self.mode.clone(),
            source: self.source.clone(),
            output: self.output.clone(),
            port: self.port,
            extensions: self.exts.clone().map(|list| vec![list]),
            save_as: self.save_as.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    strata::init_tracing(cli.verbose);

    let config = Config::load_layered(cli.config.as_deref(), &cli.overrides())
        .wrap_err("Failed to load configuration")?;
    let mode = config.mode()?;
    tracing::debug!(?config, "loaded configuration");

    strata::print_header(&config, mode);

    match mode {
        Mode::Compiled => {
            strata::cmd::build::run(&config)?;
        }
        Mode::Interactive => {
            strata::cmd::watch::run(&config).await?;
        }
        Mode::Dynamic => {
            strata::cmd::serve::run(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["strata"]);
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);

        let overrides = cli.overrides();
        assert!(overrides.mode.is_none());
        assert!(overrides.source.is_none());
        assert!(overrides.extensions.is_none());
    }

    #[test]
    fn test_cli_all_flags() {
        let cli = Cli::parse_from([
            "strata",
            "--mode",
            "dynamic",
            "--source",
            "site",
            "--output",
            "public",
            "--port",
            "9000",
            "--exts",
            "html, md",
            "--saveAs",
            "page.html",
        ]);

        let overrides = cli.overrides();
        assert_eq!(overrides.mode.as_deref(), Some("dynamic"));
        assert_eq!(overrides.source, Some(PathBuf::from("site")));
        assert_eq!(overrides.output, Some(PathBuf::from("public")));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.extensions, Some(vec!["html, md".to_string()]));
        assert_eq!(overrides.save_as.as_deref(), Some("page.html"));
    }

    #[test]
    fn test_cli_save_as_alias() {
        let cli = Cli::parse_from(["strata", "--save-as", "home.htm"]);
        assert_eq!(cli.save_as.as_deref(), Some("home.htm"));
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let cli = Cli::parse_from(["strata", "-vvv"]);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_custom_config_path() {
        let cli = Cli::parse_from(["strata", "--config", "site.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::parse_from(["strata", "--mode", "interactive", "--exts", ".html,txt"]);
        let mut config = Config::default();
        config.apply(&cli.overrides());
        config.normalize();

        assert_eq!(config.mode().unwrap(), Mode::Interactive);
        assert_eq!(config.site.extensions, [".html", ".txt"]);
    }
}
