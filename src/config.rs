//! Configuration loading, default creation and path resolution.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::rules::ProcessRuleSet;

/// Directory name under the user's configuration home.
pub const APP_DIR: &str = "profile-focusd";

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.json";

/// Minimum delay between two device commands, in milliseconds.
///
/// The keyboard drops or misapplies commands sent back to back.
pub const DEFAULT_SEND_SLEEP_MS: u64 = 10;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to parse config document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Malformed config document: {0}")]
    Malformed(String),
}

/// On-disk configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Raw rule entries, validated one by one into a [`ProcessRuleSet`].
    pub process_list: Vec<Value>,

    /// Delay between device commands (default: 10).
    #[serde(default = "default_send_sleep_ms")]
    pub send_sleep_ms: u64,
}

fn default_send_sleep_ms() -> u64 {
    DEFAULT_SEND_SLEEP_MS
}

impl ConfigDocument {
    /// Parse a document, requiring `process_list` to be an array.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text)?;

        match value.get("process_list") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(ConfigError::Malformed(
                    "'process_list' is not an array".to_string(),
                ));
            }
            None if value.is_object() => {
                return Err(ConfigError::Malformed(
                    "missing 'process_list'".to_string(),
                ));
            }
            None => {
                return Err(ConfigError::Malformed(
                    "document is not an object".to_string(),
                ));
            }
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Default document with illustrative, platform-specific rules.
    pub fn platform_default() -> Self {
        let process_list = if cfg!(target_os = "windows") {
            vec![
                json!({"process_name": "Isaac", "profile_index": 1}),
                json!({"process_name": "isaac-ng.exe", "profile_index": 2}),
            ]
        } else if cfg!(target_os = "macos") {
            vec![
                json!({"process_name": "The Binding of Isaac", "profile_index": 1}),
                json!({"process_name": "Steam", "profile_index": 2}),
            ]
        } else {
            vec![
                // Binding of Isaac under Steam/Proton
                json!({"process_name": "steam_app_250900", "profile_index": 1}),
                json!({"process_name": "isaac-ng.exe", "profile_index": 2}),
            ]
        };

        Self {
            process_list,
            send_sleep_ms: DEFAULT_SEND_SLEEP_MS,
        }
    }
}

/// Loaded configuration ready for the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Validated rules.
    pub rules: ProcessRuleSet,

    /// Delay between device commands.
    pub send_sleep: Duration,

    /// File the configuration came from (or was written to).
    pub path: PathBuf,

    /// True when the file was malformed and built-in defaults are in use.
    pub using_fallback: bool,
}

impl Config {
    fn from_document(document: &ConfigDocument, path: PathBuf, using_fallback: bool) -> Self {
        Self {
            rules: ProcessRuleSet::from_entries(&document.process_list),
            send_sleep: Duration::from_millis(document.send_sleep_ms),
            path,
            using_fallback,
        }
    }

    /// Load configuration from `path`, creating a default file if absent.
    ///
    /// A malformed document is not fatal: the built-in defaults are used and
    /// a warning is logged.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_fallback(path, Path::new(CONFIG_FILE))
    }

    /// Like [`Self::load`], writing the default to `fallback` when `path`
    /// cannot be created.
    fn load_with_fallback(path: &Path, fallback: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (document, written) = persist_default(path, fallback)?;
                return Ok(Self::from_document(&document, written, false));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        match ConfigDocument::parse(&text) {
            Ok(document) => Ok(Self::from_document(&document, path.to_path_buf(), false)),
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                warn!("Temporarily using the default process list");
                Ok(Self::from_document(
                    &ConfigDocument::platform_default(),
                    path.to_path_buf(),
                    true,
                ))
            }
        }
    }

    /// Load from an explicit path, or from the resolved default location.
    pub fn load_or_create(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve_path(path, dirs::config_dir());
        info!("Using config file: {}", path.display());
        Self::load(&path)
    }
}

/// Resolve the configuration file path.
///
/// Explicit path first, then `<config_dir>/profile-focusd/config.json`, then
/// `./config.json`.
pub fn resolve_path(explicit: Option<&Path>, config_dir: Option<PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    match config_dir {
        Some(dir) => dir.join(APP_DIR).join(CONFIG_FILE),
        None => PathBuf::from(CONFIG_FILE),
    }
}

/// Write the default document to `path`, or to `fallback` if that fails.
///
/// Returns the document and the path it was written to.
fn persist_default(
    path: &Path,
    fallback: &Path,
) -> Result<(ConfigDocument, PathBuf), ConfigError> {
    let document = ConfigDocument::platform_default();

    match write_document(&document, path) {
        Ok(()) => {
            info!("Created default config at {}", path.display());
            Ok((document, path.to_path_buf()))
        }
        Err(e) if path != fallback => {
            warn!("{}", e);
            write_document(&document, fallback)?;
            info!("Created default config at {}", fallback.display());
            Ok((document, fallback.to_path_buf()))
        }
        Err(e) => Err(e),
    }
}

fn write_document(document: &ConfigDocument, path: &Path) -> Result<(), ConfigError> {
    let to_write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(to_write_error)?;
    }

    let text = serde_json::to_string_pretty(document)?;
    fs::write(path, text).map_err(to_write_error)
}
