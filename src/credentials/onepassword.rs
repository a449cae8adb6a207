//! 1Password (`op` CLI) credential backend.
//!
//! Everything goes through the `op` binary: item listings are read as JSON,
//! single fields through `op read op://<vault>/<item>/<field>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use super::otp::{parse_otp_uri, OtpAccount, OtpUriError};
use super::CredentialStore;

const OP_PROGRAM: &str = "op";
const OTP_FIELD: &str = "one-time password";

#[derive(Debug, Error)]
pub enum OnePasswordError {
    #[error("1Password CLI `op` not found on PATH")]
    NotInstalled(#[source] which::Error),
    #[error("failed to run {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("op {command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("op {command} returned invalid JSON")]
    Json {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("op {command} returned invalid UTF-8")]
    Utf8 { command: String },
    #[error("no 1Password item in vault {vault:?} tagged {tags:?}")]
    NoMatchingEntry { vault: String, tags: String },
    #[error("no 1Password item titled {0:?}")]
    EntryNotFound(String),
    #[error("invalid one-time password URI for {title:?}")]
    Otp {
        title: String,
        #[source]
        source: OtpUriError,
    },
}

/// Global options passed to every `op` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    pub account: Option<String>,
    pub cache: Option<bool>,
    pub config: Option<String>,
    pub session: Option<String>,
}

/// Thin wrapper over the `op` executable.
#[derive(Debug, Clone)]
pub struct OnePasswordClient {
    program: PathBuf,
    args: Vec<String>,
}

impl OnePasswordClient {
    /// Locate `op` on PATH and prepare the global flags.
    pub fn new(options: &ClientOptions) -> Result<Self, OnePasswordError> {
        let program = which::which(OP_PROGRAM).map_err(OnePasswordError::NotInstalled)?;
        Ok(Self::with_program(program, options))
    }

    /// Use an explicit `op` binary (or a stand-in for it).
    pub fn with_program(program: impl Into<PathBuf>, options: &ClientOptions) -> Self {
        let mut args: Vec<String> = ["--format", "json", "--iso-timestamps", "--no-color"]
            .into_iter()
            .map(String::from)
            .collect();

        if let Some(account) = &options.account {
            args.extend(["--account".to_string(), account.clone()]);
        }
        if let Some(cache) = options.cache {
            args.extend(["--cache".to_string(), cache.to_string()]);
        }
        if let Some(config) = &options.config {
            args.extend(["--config".to_string(), config.clone()]);
        }
        if let Some(session) = &options.session {
            args.extend(["--session".to_string(), session.clone()]);
        }

        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Flags placed before every subcommand.
    pub fn global_args(&self) -> &[String] {
        &self.args
    }

    /// Run a subcommand and return its stdout.
    pub fn run_plain(&self, args: &[&str]) -> Result<String, OnePasswordError> {
        let command = args.join(" ");
        debug!(command = %command, "running op");

        let output = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .output()
            .map_err(|source| OnePasswordError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(OnePasswordError::Command { command, stderr });
        }

        String::from_utf8(output.stdout).map_err(|_| OnePasswordError::Utf8 { command })
    }

    /// Run a subcommand and parse its stdout as JSON.
    pub fn get_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, OnePasswordError> {
        let output = self.run_plain(args)?;
        serde_json::from_str(&output).map_err(|source| OnePasswordError::Json {
            command: args.join(" "),
            source,
        })
    }

    /// Items in `vault` carrying `tags`.
    pub fn list_entries(&self, vault: &str, tags: &str) -> Result<Vec<VaultEntry>, OnePasswordError> {
        self.get_json(&["item", "list", "--tags", tags, "--vault", vault])
    }

    /// Read a secret reference such as `op://Personal/abc123/password`.
    pub fn read(&self, reference: &str) -> Result<SecretString, OnePasswordError> {
        let output = self.run_plain(&["read", reference])?;
        Ok(SecretString::from(output.trim().to_string()))
    }

    pub fn read_field(
        &self,
        vault: &str,
        item_id: &str,
        field: &str,
    ) -> Result<SecretString, OnePasswordError> {
        self.read(&secret_reference(vault, item_id, field))
    }

    /// Whether the item has a one-time password configured.
    pub fn has_otp(&self, entry: &VaultEntry) -> bool {
        self.run_plain(&["item", "get", &entry.id, "--otp"]).is_ok()
    }

    pub fn password_for_title(
        &self,
        vault: &str,
        title: &str,
        entries: &[VaultEntry],
    ) -> Result<SecretString, OnePasswordError> {
        let entry = find_by_title(entries, title)
            .ok_or_else(|| OnePasswordError::EntryNotFound(title.to_string()))?;
        self.read_field(vault, &entry.id, "password")
    }

    /// Account id and secret from the item's one-time password URI.
    pub fn otp_for_title(
        &self,
        vault: &str,
        title: &str,
        entries: &[VaultEntry],
    ) -> Result<OtpAccount, OnePasswordError> {
        let entry = find_by_title(entries, title)
            .ok_or_else(|| OnePasswordError::EntryNotFound(title.to_string()))?;
        let uri = self.read_field(vault, &entry.id, OTP_FIELD)?;
        parse_otp_uri(uri.expose_secret()).map_err(|source| OnePasswordError::Otp {
            title: title.to_string(),
            source,
        })
    }
}

pub fn secret_reference(vault: &str, item_id: &str, field: &str) -> String {
    format!("op://{vault}/{item_id}/{field}")
}

pub fn find_by_title<'a>(entries: &'a [VaultEntry], title: &str) -> Option<&'a VaultEntry> {
    entries.iter().find(|entry| entry.title == title)
}

/// An item as listed by `op item list --format json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultEntry {
    pub id: String,
    pub title: String,
    pub version: i64,
    pub vault: VaultRef,
    pub category: String,
    pub last_edited_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub additional_information: String,
    pub urls: Vec<VaultUrl>,
    pub tags: Vec<String>,
    pub favorite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultUrl {
    pub label: String,
    pub primary: bool,
    pub href: String,
}

/// Which vault items to read login credentials from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnePasswordConfig {
    /// Vault name.
    #[serde(default = "default_vault")]
    pub vault: String,

    /// Tag that marks the login item. The first match wins.
    #[serde(default = "default_tags")]
    pub tags: String,

    #[serde(default)]
    pub options: ClientOptions,

    /// Mapping from logical key names to item field names.
    /// If not specified, the logical key name is used as-is.
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

fn default_vault() -> String {
    "Personal".to_string()
}

fn default_tags() -> String {
    "Paytrust".to_string()
}

impl Default for OnePasswordConfig {
    fn default() -> Self {
        Self {
            vault: default_vault(),
            tags: default_tags(),
            options: ClientOptions::default(),
            fields: HashMap::new(),
        }
    }
}

/// Credential store backed by the first item matching a vault and tag.
pub struct OnePasswordStore {
    client: OnePasswordClient,
    config: OnePasswordConfig,
    entry: OnceCell<VaultEntry>,
}

impl OnePasswordStore {
    pub fn new(client: OnePasswordClient, config: OnePasswordConfig) -> Self {
        Self {
            client,
            config,
            entry: OnceCell::new(),
        }
    }

    /// Build a store using the `op` found on PATH.
    pub fn from_config(config: OnePasswordConfig) -> Result<Self, OnePasswordError> {
        let client = OnePasswordClient::new(&config.options)?;
        Ok(Self::new(client, config))
    }

    fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config
            .fields
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(key)
    }

    /// The matched item, listed once and reused.
    pub async fn entry(&self) -> Result<&VaultEntry, OnePasswordError> {
        self.entry
            .get_or_try_init(|| async {
                let entries = self
                    .client
                    .list_entries(&self.config.vault, &self.config.tags)?;
                debug!(
                    vault = %self.config.vault,
                    tags = %self.config.tags,
                    count = entries.len(),
                    "listed vault entries"
                );
                entries
                    .into_iter()
                    .next()
                    .ok_or_else(|| OnePasswordError::NoMatchingEntry {
                        vault: self.config.vault.clone(),
                        tags: self.config.tags.clone(),
                    })
            })
            .await
    }
}

#[async_trait]
impl CredentialStore for OnePasswordStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.entry().await?;
        let field = self.field_name(key);
        // `op read` cannot tell a missing field from a locked vault, so both are errors.
        let value = self
            .client
            .read_field(&self.config.vault, &entry.id, field)?;
        Ok(Some(value))
    }

    fn describe(&self) -> String {
        format!(
            "1Password vault {:?} (tags {:?})",
            self.config.vault, self.config.tags
        )
    }
}
