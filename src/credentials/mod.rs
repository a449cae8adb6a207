//! Credential retrieval.
//!
//! Login credentials come either straight from the command line or from a
//! 1Password item located by vault and tag. Both sit behind
//! [`CredentialStore`] so the login flow only ever asks for `username` and
//! `password`.

mod config;
pub mod onepassword;
pub mod otp;
mod plain;

pub use config::CredentialConfig;
pub use onepassword::{
    ClientOptions, OnePasswordClient, OnePasswordConfig, OnePasswordError, OnePasswordStore,
    VaultEntry,
};
pub use otp::{parse_otp_uri, OtpAccount, OtpUriError};
pub use plain::{LayeredStore, StaticCredentialStore};

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";

/// A read-only key-value store for credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    /// Returns `Err` if there was an error accessing the backend.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Resolved login credentials.
pub struct LoginCredentials {
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginCredentials {
    /// Read `username` and `password` from a store. Both must be present.
    pub async fn load(store: &dyn CredentialStore) -> Result<Self> {
        let source = store.describe();
        let username = store
            .get(USERNAME)
            .await
            .with_context(|| format!("Failed to read username from {source}"))?
            .with_context(|| format!("No username in {source}"))?;
        let password = store
            .get(PASSWORD)
            .await
            .with_context(|| format!("Failed to read password from {source}"))?
            .with_context(|| format!("No password in {source}"))?;

        let username = username.expose_secret().trim().to_string();
        if username.is_empty() {
            anyhow::bail!("Empty username in {source}");
        }

        Ok(Self { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_requires_both_fields() {
        let store = StaticCredentialStore::new().with(USERNAME, "jane");
        let err = LoginCredentials::load(&store).await.unwrap_err();
        assert!(err.to_string().contains("No password"));
    }

    #[tokio::test]
    async fn test_load_pair() -> Result<()> {
        let store = StaticCredentialStore::login(" jane ", "hunter2");
        let creds = LoginCredentials::load(&store).await?;
        assert_eq!(creds.username, "jane");
        assert_eq!(creds.password.expose_secret(), "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let store = StaticCredentialStore::login("  ", "hunter2");
        assert!(LoginCredentials::load(&store).await.is_err());
    }
}
