//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the `--config` command-line argument
//! 2. `$THREADBOOK_CONFIG` (environment variable)
//! 3. `./threadbook.toml`
//! 4. `~/.config/threadbook/config.toml` (Linux/macOS)
//!    `%APPDATA%\threadbook\config.toml` (Windows)
//! 5. Built-in defaults
//!
//! Relative paths in `[paths]` are resolved against the working directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the project-local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "threadbook.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Input, intermediate and output locations.
    pub paths: PathsConfig,
    /// Final document labels.
    pub publish: PublishConfig,
    /// Curator API settings.
    pub server: ServerConfig,
    /// Redaction settings.
    pub redact: RedactConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Where every artifact of the pipeline lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// MBOX file or directory of `.eml` files to normalize.
    pub mbox: PathBuf,
    /// Directory receiving normalized thread documents and the `images/` store.
    pub content_dir: PathBuf,
    /// Campaign database XML export holding the notes.
    pub notes_xml: PathBuf,
    /// Normalized notes document.
    pub notes_doc: PathBuf,
    /// Ordered inclusion list.
    pub order_file: PathBuf,
    /// Message-level exclusion list.
    pub exclusions_file: PathBuf,
    /// Directory receiving the published artifact.
    pub output_dir: PathBuf,
}

/// Labels used by the assembled document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub title: String,
    pub subtitle: String,
    pub footer: String,
}

/// Curator API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8000`.
    pub bind: String,
}

/// Redaction settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactConfig {
    /// Name patterns (regular expressions) applied after the built-in patterns, in order.
    pub names: Vec<NameReplacement>,
}

/// One caller-supplied redaction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameReplacement {
    pub pattern: String,
    pub replacement: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            mbox: PathBuf::from("export.mbox"),
            content_dir: PathBuf::from("cleaned_emails"),
            notes_xml: PathBuf::from("db.xml"),
            notes_doc: PathBuf::from("player_notes.json"),
            order_file: PathBuf::from("content_order.json"),
            exclusions_file: PathBuf::from("message_exclusions.json"),
            output_dir: PathBuf::from("public"),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            title: "Campaign Chronicle".to_string(),
            subtitle: "Collected from the mail archive".to_string(),
            footer: "Generated from email archives".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl PathsConfig {
    /// Directory of the content-addressed image store.
    pub fn images_dir(&self) -> PathBuf {
        self.content_dir.join(crate::store::images::IMAGES_DIR_NAME)
    }

    /// Final HTML document.
    pub fn output_html(&self) -> PathBuf {
        self.output_dir.join(crate::assemble::publish::INDEX_FILE)
    }
}

impl Config {
    /// Configuration rooted in `root`: every default path is joined onto it.
    ///
    /// Used by tests and by callers that keep a whole project in one directory.
    pub fn rooted_at(root: &Path) -> Self {
        let defaults = PathsConfig::default();
        Self {
            paths: PathsConfig {
                mbox: root.join(defaults.mbox),
                content_dir: root.join(defaults.content_dir),
                notes_xml: root.join(defaults.notes_xml),
                notes_doc: root.join(defaults.notes_doc),
                order_file: root.join(defaults.order_file),
                exclusions_file: root.join(defaults.exclusions_file),
                output_dir: root.join(defaults.output_dir),
            },
            ..Self::default()
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration.
///
/// An explicit path must exist and parse. Otherwise standard locations are
/// searched and the defaults are returned if no file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config '{}': {e}", path.display()))?;
        let cfg = toml::from_str::<Config>(&contents)
            .map_err(|e| anyhow::anyhow!("Cannot parse config '{}': {e}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded config");
        return Ok(cfg);
    }

    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return Ok(cfg);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Ok(Config::default())
}

/// Save configuration to `path`.
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (env var, then project-local file, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("THREADBOOK_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    dirs::config_dir().map(|d| d.join("threadbook").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("threadbook")
}
