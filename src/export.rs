//! One export run: credentials, login, report, statements.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser::{BrowserSession, SitePage};
use crate::config::Config;
use crate::credentials::{CredentialStore, LoginCredentials};
use crate::download::PdfDownloader;
use crate::filename::PayeeFilter;
use crate::paytrust::{login, open_all_dates_report, BillExporter};
use crate::prompt::ManualStep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBill {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBill {
    pub label: String,
    pub error: String,
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub downloaded: Vec<PathBuf>,
    /// Statements left untouched because they were already saved.
    pub existing: Vec<PathBuf>,
    pub skipped: Vec<SkippedBill>,
    pub failed: Vec<FailedBill>,
}

impl ExportSummary {
    pub fn skip(&mut self, label: &str, reason: String) {
        self.skipped.push(SkippedBill {
            label: label.to_string(),
            reason,
        });
    }

    pub fn fail(&mut self, label: &str, error: String) {
        self.failed.push(FailedBill {
            label: label.to_string(),
            error,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line totals for the end of a run.
    pub fn totals(&self) -> String {
        format!(
            "{} downloaded, {} already present, {} skipped, {} failed",
            self.downloaded.len(),
            self.existing.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// Drives the whole export against one configuration.
pub struct Exporter<'a> {
    config: &'a Config,
    credentials: &'a dyn CredentialStore,
    manual: &'a dyn ManualStep,
}

impl<'a> Exporter<'a> {
    pub fn new(
        config: &'a Config,
        credentials: &'a dyn CredentialStore,
        manual: &'a dyn ManualStep,
    ) -> Self {
        Self {
            config,
            credentials,
            manual,
        }
    }

    fn output_dir(&self) -> Result<PathBuf> {
        let dir = if self.config.output_dir.is_absolute() {
            self.config.output_dir.clone()
        } else {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(&self.config.output_dir)
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output dir: {}", dir.display()))?;
        Ok(dir)
    }

    pub async fn run(&self) -> Result<ExportSummary> {
        let output_dir = self.output_dir()?;
        let credentials = LoginCredentials::load(self.credentials).await?;
        info!(source = %self.credentials.describe(), username = %credentials.username, "credentials resolved");

        let session = BrowserSession::launch(&self.config.browser).await?;
        let result = self.run_in_browser(&session, &credentials, output_dir).await;
        session.close().await;
        result
    }

    async fn run_in_browser(
        &self,
        session: &BrowserSession,
        credentials: &LoginCredentials,
        output_dir: PathBuf,
    ) -> Result<ExportSummary> {
        let timeouts = &self.config.timeouts;
        let page = SitePage::new(session.new_page("about:blank").await?, timeouts.poll);

        login(&page, &self.config.url, credentials, self.manual, timeouts)
            .await
            .context("Login failed")?;
        open_all_dates_report(&page, timeouts)
            .await
            .context("Could not open the payment report")?;

        let cookies = page.cookies().await?;
        if cookies.is_empty() {
            warn!("no session cookies captured; downloads may be rejected");
        }
        let downloader = PdfDownloader::new(&cookies, self.config.bills.overwrite)?;

        let bills = BillExporter {
            session,
            page: &page,
            downloader: &downloader,
            output_dir: &output_dir,
            settings: &self.config.bills,
            timeouts,
        };
        let mut filter = PayeeFilter::new(
            &self.config.bills.skip_payees,
            self.config.bills.skip_duplicates,
        );
        let mut summary = ExportSummary::default();
        bills.run(&mut filter, &mut summary).await?;

        info!(payees = filter.seen(), totals = %summary.totals(), "export finished");
        Ok(summary)
    }
}
