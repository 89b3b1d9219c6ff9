//! Site configuration management.
//!
//! Configuration is layered: built-in defaults, an optional TOML file,
//! `STRATA__SECTION__KEY` environment variables and finally command-line
//! [`Overrides`].

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    extensions::ExtensionSet,
};

/// Configuration file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "STRATA";

/// Main configuration structure for strata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode: `compiled`, `interactive` or `dynamic`.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Source/output layout and fragment settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Generation settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Live rebuild settings.
    #[serde(default)]
    pub watch: WatchConfig,

    /// On-demand server settings.
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One-shot batch compilation.
    Compiled,
    /// Compilation followed by incremental rebuilds on filesystem changes.
    Interactive,
    /// Per-request rendering over HTTP, nothing persisted.
    Dynamic,
}

impl Mode {
    /// The name used on the command line and in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compiled => "compiled",
            Self::Interactive => "interactive",
            Self::Dynamic => "dynamic",
        }
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "compiled" => Ok(Self::Compiled),
            "interactive" => Ok(Self::Interactive),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(CoreError::config(format!(
                "invalid mode {other:?} (expected compiled, interactive or dynamic)"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source tree layout and fragment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory holding the content fragments.
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Directory receiving the generated tree.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// File name of the page written for each generated directory.
    #[serde(default = "default_save_as")]
    pub save_as: String,

    /// Extensions whose files are fragments rather than static assets.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extensions converted from markdown before merging.
    #[serde(default = "default_markdown_extensions")]
    pub markdown_extensions: Vec<String>,

    /// Fragment the merge starts from.
    #[serde(default = "default_root_fragment")]
    pub root_fragment: String,
}

/// Generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Maximum directories generated concurrently (0 = one per CPU).
    #[serde(default)]
    pub jobs: usize,

    /// Maximum include substitutions per merged page.
    #[serde(default = "default_merge_limit")]
    pub merge_limit: usize,

    /// Whether a directory renders its page before or after spawning children.
    #[serde(default)]
    pub render_order: RenderOrder,
}

/// Scheduling of a directory's own page relative to its subdirectories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderOrder {
    /// Render the page, then spawn subdirectory tasks.
    #[default]
    ParentFirst,
    /// Spawn subdirectory tasks, then render the page.
    ChildrenFirst,
}

/// Live rebuild settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period before a changed path is processed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How often ripe events are collected.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Whether deeper fragments override ancestors when rebuilding a subtree.
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

/// On-demand server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Values given on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<String>,
    pub source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub port: Option<u16>,
    pub extensions: Option<Vec<String>>,
    pub save_as: Option<String>,
}

// Default value functions
fn default_mode() -> String {
    Mode::Compiled.as_str().to_string()
}

fn default_source() -> PathBuf {
    PathBuf::from("./source")
}

fn default_output() -> PathBuf {
    PathBuf::from("./out")
}

fn default_save_as() -> String {
    "index.html".to_string()
}

fn default_extensions() -> Vec<String> {
    vec![".html".to_string(), ".txt".to_string(), ".md".to_string()]
}

fn default_markdown_extensions() -> Vec<String> {
    vec![".md".to_string()]
}

fn default_root_fragment() -> String {
    "index".to_string()
}

fn default_merge_limit() -> usize {
    4000
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_poll_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            site: SiteConfig::default(),
            build: BuildConfig::default(),
            watch: WatchConfig::default(),
            serve: ServeConfig::default(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            output: default_output(),
            save_as: default_save_as(),
            extensions: default_extensions(),
            markdown_extensions: default_markdown_extensions(),
            root_fragment: default_root_fragment(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            merge_limit: default_merge_limit(),
            render_order: RenderOrder::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_ms: default_poll_ms(),
            overwrite: true,
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load every configuration layer and apply command-line overrides.
    ///
    /// An explicitly named file must exist; without one, [`DEFAULT_CONFIG_FILE`]
    /// is used when present.
    pub fn load_layered(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(path) if !path.exists() => {
                return Err(CoreError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut builder = config::Config::builder();
        if let Some(ref path) = file {
            tracing::debug!(path = %path.display(), "reading configuration file");
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("site.extensions")
                    .with_list_parse_key("site.markdown_extensions"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply(overrides);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(ref mode) = overrides.mode {
            self.mode.clone_from(mode);
        }
        if let Some(ref source) = overrides.source {
            self.site.source.clone_from(source);
        }
        if let Some(ref output) = overrides.output {
            self.site.output.clone_from(output);
        }
        if let Some(port) = overrides.port {
            self.serve.port = port;
        }
        if let Some(ref extensions) = overrides.extensions {
            self.site.extensions.clone_from(extensions);
        }
        if let Some(ref save_as) = overrides.save_as {
            self.site.save_as.clone_from(save_as);
        }
    }

    /// Rewrite extension lists into their leading-dot form.
    pub fn normalize(&mut self) {
        self.site.extensions = self.extensions().into_vec();
        self.site.markdown_extensions = self.markdown_extensions().into_vec();
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.mode()?;

        if self.site.save_as.is_empty() || self.site.save_as.contains(['/', '\\']) {
            return Err(CoreError::config(format!(
                "site.save_as must be a plain file name, got {:?}",
                self.site.save_as
            )));
        }

        if self.extensions().is_empty() {
            return Err(CoreError::config("site.extensions cannot be empty"));
        }

        if self.site.root_fragment.is_empty() {
            return Err(CoreError::config("site.root_fragment cannot be empty"));
        }

        if self.build.merge_limit == 0 {
            return Err(CoreError::config("build.merge_limit must be positive"));
        }

        if !self.markdown_extensions().is_subset_of(&self.extensions()) {
            tracing::warn!(
                "some markdown extensions are not parsable and will be copied verbatim"
            );
        }

        Ok(())
    }

    /// The validated operating mode.
    pub fn mode(&self) -> Result<Mode> {
        self.mode.parse()
    }

    /// Parsable extensions.
    pub fn extensions(&self) -> ExtensionSet {
        ExtensionSet::new(&self.site.extensions)
    }

    /// Extensions converted from markdown.
    pub fn markdown_extensions(&self) -> ExtensionSet {
        ExtensionSet::new(&self.site.markdown_extensions)
    }
}
