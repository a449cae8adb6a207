use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialConfig;
use crate::duration::{deserialize_duration, serialize_duration};

/// Default PayTrust login page.
pub const DEFAULT_URL: &str = "https://login.billscenter.paytrust.com/3004/";

const CONFIG_FILE_NAME: &str = "paytrust-exporter.toml";

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Browser launch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a visible window. The site's phone verification step
    /// still needs the terminal.
    pub headless: bool,

    /// Explicit Chrome/Chromium binary. Detected when unset.
    pub chrome_executable: Option<PathBuf>,

    /// Persistent profile directory. A throwaway profile is used when unset.
    pub profile_dir: Option<PathBuf>,
}

/// Wait timeouts for page interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Quick checks right after a click (login form transitions).
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub short: Duration,

    /// Element waits.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub default: Duration,

    /// Report loads and bill modals.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub long: Duration,

    /// Interval between element lookups while waiting.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(3),
            default: Duration::from_secs(10),
            long: Duration::from_secs(30),
            poll: Duration::from_millis(250),
        }
    }
}

/// What to do when a single bill fails to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillErrorPolicy {
    /// Log the failure, close the modal and continue with the next bill.
    #[default]
    Skip,
    /// Stop the run.
    Abort,
}

/// Which bills get exported and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillSettings {
    /// Payee names never exported. Matched case-insensitively against the
    /// scraped label and the derived file name.
    pub skip_payees: Vec<String>,

    /// Export each payee once per run.
    pub skip_duplicates: bool,

    pub on_error: BillErrorPolicy,

    /// Replace statements already present in the output directory.
    pub overwrite: bool,
}

impl Default for BillSettings {
    fn default() -> Self {
        Self {
            skip_payees: Vec::new(),
            skip_duplicates: true,
            on_error: BillErrorPolicy::Skip,
            overwrite: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Login page.
    #[serde(default = "default_url")]
    pub url: String,

    /// Directory statements are written to. If relative, resolved from the
    /// current directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    pub browser: BrowserSettings,

    pub credentials: CredentialConfig,

    pub timeouts: Timeouts,

    pub bills: BillSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            output_dir: default_output_dir(),
            browser: BrowserSettings::default(),
            credentials: CredentialConfig::default(),
            timeouts: Timeouts::default(),
            bills: BillSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Render as TOML, with secrets blanked.
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if let CredentialConfig::Plain { password, .. } = &mut shown.credentials {
            *password = "********".to_string();
        }
        toml::to_string_pretty(&shown).context("Failed to render config")
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./paytrust-exporter.toml` if it exists in current directory
/// 2. `~/.config/paytrust-exporter/config.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("paytrust-exporter").join("config.toml");
    }

    local_config
}
