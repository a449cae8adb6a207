use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paytrust_exporter::config::{default_config_path, Config};
use paytrust_exporter::credentials::{
    CredentialConfig, CredentialStore, LayeredStore, OnePasswordClient, OnePasswordConfig,
    StaticCredentialStore, USERNAME,
};
use paytrust_exporter::export::Exporter;
use paytrust_exporter::logging::init_logging;
use paytrust_exporter::prompt::TerminalPrompt;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "paytrust-exporter")]
#[command(about = "Download bill statements from the PayTrust bills center")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// 1Password vault holding the login item [default: Personal]
    #[arg(long)]
    vault: Option<String>,

    /// Tag marking the login item [default: Paytrust]
    #[arg(long)]
    tags: Option<String>,

    /// Login password; skips 1Password. Needs --username.
    #[arg(long, alias = "1password_pass")]
    password: Option<String>,

    /// Login page [default: https://login.billscenter.paytrust.com/3004/]
    #[arg(long)]
    url: Option<String>,

    /// Login username
    #[arg(long)]
    username: Option<String>,

    /// Directory statements are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the configuration after command-line overrides
    Config,
    /// List the vault items matching --vault and --tags
    Entries,
    /// Show the one-time password account of a vault item
    Otp {
        /// Item title
        title: String,

        /// Also print the OTP secret
        #[arg(long)]
        show_secret: bool,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }

        if let Some(password) = &self.password {
            let username = self
                .username
                .clone()
                .or_else(|| match &config.credentials {
                    CredentialConfig::Plain { username, .. } => Some(username.clone()),
                    CredentialConfig::OnePassword { .. } => None,
                })
                .context("--password needs --username")?;
            config.credentials = CredentialConfig::Plain {
                username,
                password: password.clone(),
            };
            return Ok(());
        }

        match &mut config.credentials {
            CredentialConfig::OnePassword { config } => {
                if let Some(vault) = &self.vault {
                    config.vault = vault.clone();
                }
                if let Some(tags) = &self.tags {
                    config.tags = tags.clone();
                }
            }
            CredentialConfig::Plain { username, .. } => {
                if let Some(flag) = &self.username {
                    *username = flag.clone();
                }
                if self.vault.is_some() || self.tags.is_some() {
                    warn!("--vault and --tags are ignored with plain credentials");
                }
            }
        }
        Ok(())
    }

    fn credential_store(&self, config: &Config) -> Result<Box<dyn CredentialStore>> {
        let store = config.credentials.build()?;
        match (&config.credentials, &self.username) {
            (CredentialConfig::OnePassword { .. }, Some(username)) => Ok(Box::new(
                LayeredStore::new(StaticCredentialStore::new().with(USERNAME, username), store),
            )),
            _ => Ok(store),
        }
    }
}

fn onepassword_config(config: &Config) -> Result<&OnePasswordConfig> {
    match &config.credentials {
        CredentialConfig::OnePassword { config } => Ok(config),
        CredentialConfig::Plain { .. } => {
            anyhow::bail!("Credentials are not read from 1Password in this configuration")
        }
    }
}

fn list_entries(config: &Config) -> Result<()> {
    let op = onepassword_config(config)?;
    let client = OnePasswordClient::new(&op.options)?;
    let entries = client.list_entries(&op.vault, &op.tags)?;
    if entries.is_empty() {
        println!("No items in vault {:?} tagged {:?}", op.vault, op.tags);
    }
    for entry in entries {
        let updated = entry
            .updated_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let otp = if client.has_otp(&entry) { "otp" } else { "-" };
        println!(
            "{}  {}  {}  {}  {}",
            entry.id, updated, entry.category, otp, entry.title
        );
    }
    Ok(())
}

fn show_otp(config: &Config, title: &str, show_secret: bool) -> Result<()> {
    let op = onepassword_config(config)?;
    let client = OnePasswordClient::new(&op.options)?;
    let entries = client.list_entries(&op.vault, &op.tags)?;
    let account = client.otp_for_title(&op.vault, title, &entries)?;
    println!("Account: {}", account.account_id);
    if show_secret {
        println!("Secret: {}", account.secret);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    cli.apply(&mut config)?;

    match &cli.command {
        Some(Command::Config) => {
            println!("# Config file: {}", cli.config.display());
            print!("{}", config.to_display_toml()?);
        }
        Some(Command::Entries) => list_entries(&config)?,
        Some(Command::Otp { title, show_secret }) => show_otp(&config, title, *show_secret)?,
        None => {
            let store = cli.credential_store(&config)?;
            let summary = Exporter::new(&config, store.as_ref(), &TerminalPrompt)
                .run()
                .await?;

            println!("{}", summary.totals());
            for path in &summary.downloaded {
                println!("  saved    {}", path.display());
            }
            for skipped in &summary.skipped {
                println!("  skipped  {} ({})", skipped.label, skipped.reason);
            }
            for failed in &summary.failed {
                println!("  failed   {}: {}", failed.label, failed.error);
            }
            if !summary.is_clean() {
                warn!(failed = summary.failed.len(), "some bills were not exported");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.debug, cli.log_json) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "aborted");
            ExitCode::FAILURE
        }
    }
}
