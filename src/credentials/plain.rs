//! Credentials passed directly on the command line or in the config file.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

use super::CredentialStore;

/// Fixed key/value credentials.
#[derive(Default)]
pub struct StaticCredentialStore {
    values: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// A username/password pair.
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new()
            .with(super::USERNAME, username)
            .with(super::PASSWORD, password)
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self
            .values
            .get(key)
            .map(|v| SecretString::from(v.clone())))
    }

    fn describe(&self) -> String {
        "command-line credentials".to_string()
    }
}

/// Fixed values in front of another store. Keys found in `top` never reach
/// `base`.
pub struct LayeredStore {
    top: StaticCredentialStore,
    base: Box<dyn CredentialStore>,
}

impl LayeredStore {
    pub fn new(top: StaticCredentialStore, base: Box<dyn CredentialStore>) -> Self {
        Self { top, base }
    }
}

#[async_trait]
impl CredentialStore for LayeredStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        match self.top.get(key).await? {
            Some(value) => Ok(Some(value)),
            None => self.base.get(key).await,
        }
    }

    fn describe(&self) -> String {
        format!("{} with command-line overrides", self.base.describe())
    }
}
