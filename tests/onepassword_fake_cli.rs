#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use paytrust_exporter::credentials::{
    ClientOptions, LoginCredentials, OnePasswordClient, OnePasswordConfig, OnePasswordError,
    OnePasswordStore,
};
use secrecy::ExposeSecret;
use tempfile::TempDir;

const ITEMS_JSON: &str = r#"[
  {
    "id": "abc123",
    "title": "PayTrust",
    "version": 4,
    "vault": {"id": "v1", "name": "Personal"},
    "category": "LOGIN",
    "last_edited_by": "USER1",
    "created_at": "2023-02-01T10:00:00Z",
    "updated_at": "2024-05-06T07:08:09Z",
    "additional_information": "jane@example.com",
    "urls": [{"label": "website", "primary": true, "href": "https://login.billscenter.paytrust.com/3004/"}],
    "tags": ["Paytrust"]
  },
  {
    "id": "otp999",
    "title": "AWS root",
    "vault": {"id": "v1", "name": "Personal"},
    "category": "LOGIN",
    "tags": ["Paytrust"]
  }
]"#;

/// Write a stand-in `op` that logs its arguments and answers a few commands.
fn fake_op(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let log = dir.join("op.log");
    let script = dir.join("op");
    let body = format!(
        r#"#!/bin/sh
echo "$*" >> "{log}"
case "$*" in
  *"item list --tags Paytrust --vault Personal")
    cat <<'JSON'
{items}
JSON
    ;;
  *"item list --tags Empty --vault Personal")
    echo "[]"
    ;;
  *"read op://Personal/abc123/username")
    echo "jane@example.com"
    ;;
  *"read op://Personal/abc123/password")
    echo "hunter2"
    ;;
  *"item get otp999 --otp")
    echo "123456"
    ;;
  *"read op://Personal/otp999/one-time password")
    echo "otpauth://totp/AWS:root@111122223333?secret=JBSWY3DPEHPK3PXP&issuer=Amazon"
    ;;
  *)
    echo "[ERROR] 2024/01/01 00:00:00 \"$*\" isn't an item" >&2
    exit 1
    ;;
esac
"#,
        log = log.display(),
        items = ITEMS_JSON,
    );
    std::fs::write(&script, body)?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
    Ok((script, log))
}

#[test]
fn lists_entries_with_global_flags() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, log) = fake_op(dir.path())?;
    let options = ClientOptions {
        account: Some("my.1password.com".to_string()),
        ..ClientOptions::default()
    };
    let client = OnePasswordClient::with_program(op, &options);

    let entries = client.list_entries("Personal", "Paytrust")?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "abc123");
    assert_eq!(entries[0].vault.name, "Personal");
    assert_eq!(entries[0].urls[0].href, "https://login.billscenter.paytrust.com/3004/");
    assert!(entries[0].updated_at.is_some());
    assert!(entries[1].created_at.is_none());

    let logged = std::fs::read_to_string(log)?;
    assert_eq!(
        logged.trim(),
        "--format json --iso-timestamps --no-color --account my.1password.com item list --tags Paytrust --vault Personal"
    );
    Ok(())
}

#[test]
fn failing_command_reports_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, _) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());

    let err = client.read_field("Personal", "nope", "password").unwrap_err();
    match err {
        OnePasswordError::Command { command, stderr } => {
            assert_eq!(command, "read op://Personal/nope/password");
            assert!(stderr.contains("isn't an item"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn reads_otp_account_by_title() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, _) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());

    let entries = client.list_entries("Personal", "Paytrust")?;
    let account = client.otp_for_title("Personal", "AWS root", &entries)?;
    assert_eq!(account.account_id, "111122223333");
    assert_eq!(account.secret, "JBSWY3DPEHPK3PXP");

    assert!(matches!(
        client.otp_for_title("Personal", "Missing", &entries),
        Err(OnePasswordError::EntryNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn store_resolves_login_from_first_tagged_item() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, log) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());
    let store = OnePasswordStore::new(client, OnePasswordConfig::default());

    let credentials = LoginCredentials::load(&store).await?;
    assert_eq!(credentials.username, "jane@example.com");
    assert_eq!(credentials.password.expose_secret(), "hunter2");

    // The item list is fetched once for both fields.
    let logged = std::fs::read_to_string(log)?;
    assert_eq!(logged.matches("item list").count(), 1);
    Ok(())
}

#[tokio::test]
async fn store_without_matching_item_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, _) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());
    let config = OnePasswordConfig {
        tags: "Empty".to_string(),
        ..OnePasswordConfig::default()
    };
    let store = OnePasswordStore::new(client, config);

    let err = LoginCredentials::load(&store).await.unwrap_err();
    assert!(format!("{err:#}").contains("Empty"), "unexpected error: {err:#}");
    Ok(())
}

#[test]
fn detects_items_with_one_time_passwords() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, _) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());

    let entries = client.list_entries("Personal", "Paytrust")?;
    let aws = entries.iter().find(|e| e.id == "otp999").expect("otp item");
    let paytrust = entries.iter().find(|e| e.id == "abc123").expect("login item");

    assert!(client.has_otp(aws));
    assert!(!client.has_otp(paytrust));
    Ok(())
}

#[test]
fn reads_password_by_title() -> Result<()> {
    let dir = TempDir::new()?;
    let (op, log) = fake_op(dir.path())?;
    let client = OnePasswordClient::with_program(op, &ClientOptions::default());

    let entries = client.list_entries("Personal", "Paytrust")?;
    let password = client.password_for_title("Personal", "PayTrust", &entries)?;
    assert_eq!(password.expose_secret(), "hunter2");

    let logged = std::fs::read_to_string(log)?;
    assert!(logged.contains("read op://Personal/abc123/password"));

    match client.password_for_title("Personal", "Nope", &entries) {
        Err(OnePasswordError::EntryNotFound(title)) => assert_eq!(title, "Nope"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("found a password for an unknown title"),
    }
    Ok(())
}
