//! Credential configuration.
//!
//! The `[credentials]` table of the config file picks the backend the
//! login username and password come from.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::onepassword::{OnePasswordConfig, OnePasswordStore};
use super::plain::StaticCredentialStore;
use super::CredentialStore;

/// Configuration for a credential store.
///
/// # Example
///
/// ```toml
/// [credentials]
/// backend = "onepassword"
/// vault = "Personal"
/// tags = "Paytrust"
///
/// [credentials.fields]
/// username = "email"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// 1Password CLI backend.
    OnePassword {
        #[serde(flatten)]
        config: OnePasswordConfig,
    },
    /// Literal values.
    Plain { username: String, password: String },
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::OnePassword {
            config: OnePasswordConfig::default(),
        }
    }
}

impl CredentialConfig {
    /// Build a credential store from this configuration.
    pub fn build(&self) -> Result<Box<dyn CredentialStore>> {
        match self {
            CredentialConfig::OnePassword { config } => {
                Ok(Box::new(OnePasswordStore::from_config(config.clone())?))
            }
            CredentialConfig::Plain { username, password } => Ok(Box::new(
                StaticCredentialStore::login(username.clone(), password.clone()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        credentials: CredentialConfig,
    }

    #[test]
    fn test_parse_onepassword_config() {
        let parsed: Wrapper = toml::from_str(
            r#"
[credentials]
backend = "onepassword"
vault = "Household"
tags = "Bills"

[credentials.options]
account = "family.1password.com"

[credentials.fields]
username = "email"
"#,
        )
        .unwrap();

        match parsed.credentials {
            CredentialConfig::OnePassword { config } => {
                assert_eq!(config.vault, "Household");
                assert_eq!(config.tags, "Bills");
                assert_eq!(
                    config.options.account.as_deref(),
                    Some("family.1password.com")
                );
                assert_eq!(config.fields.get("username"), Some(&"email".to_string()));
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_onepassword_defaults() {
        let parsed: Wrapper = toml::from_str(
            r#"
[credentials]
backend = "onepassword"
"#,
        )
        .unwrap();
        assert_eq!(parsed.credentials, CredentialConfig::default());
    }

    #[test]
    fn test_parse_plain_config() {
        let parsed: Wrapper = toml::from_str(
            r#"
[credentials]
backend = "plain"
username = "jane"
password = "hunter2"
"#,
        )
        .unwrap();
        assert_eq!(
            parsed.credentials,
            CredentialConfig::Plain {
                username: "jane".to_string(),
                password: "hunter2".to_string(),
            }
        );
    }
}
