//! Walk the report's bill buttons and save every statement variant.

use std::path::Path;

use anyhow::{Context, Result};
use chromiumoxide::element::Element;
use tracing::{debug, info, warn};

use super::selectors as sel;
use crate::browser::{
    element_bool, element_outer_html, element_string, js_string, BrowserSession, SitePage,
};
use crate::config::{BillErrorPolicy, BillSettings, Timeouts};
use crate::download::{extract_href, extract_pdf_link, resolve_link, PdfDownloader, SaveOutcome};
use crate::export::ExportSummary;
use crate::filename::{statement_file_name, PayeeFilter, SkipReason};

/// Where a statement's PDF was found in the bill modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillSource {
    /// `src` of the embedded frame.
    Frame(String),
    /// Resolved from the "open in new window" link.
    NewWindow(String),
}

impl BillSource {
    pub fn url(&self) -> &str {
        match self {
            BillSource::Frame(url) | BillSource::NewWindow(url) => url,
        }
    }
}

/// Context attached to a bill error when the run stops on it.
#[derive(Debug, thiserror::Error)]
#[error("Exporting {0} failed")]
pub struct BillAborted(pub String);

/// Settle one bill's failure under `policy`.
///
/// `Skip` records it and lets the run go on. `Abort` hands the error back
/// tagged with [`BillAborted`]. An error already tagged is passed through
/// untouched so an inner abort is not wrapped twice.
pub fn apply_policy(
    policy: BillErrorPolicy,
    what: &str,
    err: anyhow::Error,
    summary: &mut ExportSummary,
) -> Result<()> {
    if err.downcast_ref::<BillAborted>().is_some() {
        return Err(err);
    }
    match policy {
        BillErrorPolicy::Skip => {
            warn!(bill = %what, error = %format!("{err:#}"), "bill export failed; continuing");
            summary.fail(what, format!("{err:#}"));
            Ok(())
        }
        BillErrorPolicy::Abort => Err(err.context(BillAborted(what.to_string()))),
    }
}

/// Every row skipped for lack of a label usually means the payee cell
/// selector no longer matches.
pub fn labels_missing(rows: usize, unnamed: usize) -> bool {
    rows > 0 && unnamed == rows
}

/// Options worth exporting: placeholder entries with an empty value are dropped.
pub fn bill_variants(options: Vec<(String, String)>) -> Vec<(String, String)> {
    options
        .into_iter()
        .filter(|(value, _)| !value.trim().is_empty())
        .collect()
}

pub struct BillExporter<'a> {
    pub session: &'a BrowserSession,
    pub page: &'a SitePage,
    pub downloader: &'a PdfDownloader,
    pub output_dir: &'a Path,
    pub settings: &'a BillSettings,
    pub timeouts: &'a Timeouts,
}

impl BillExporter<'_> {
    /// Export every bill listed in the open report.
    pub async fn run(&self, filter: &mut PayeeFilter, summary: &mut ExportSummary) -> Result<()> {
        self.page
            .wait_for(sel::BILL_BUTTONS, "bill buttons", self.timeouts.long)
            .await?;
        let total = self.page.count(sel::BILL_BUTTONS).await?;
        if total == 0 {
            anyhow::bail!("No bill buttons in report");
        }
        info!(count = total, "found bill buttons");

        let mut unnamed = 0;
        for index in 0..total {
            // Re-query each time; opening and closing the modal can re-render rows.
            let buttons = self.page.find_all(sel::BILL_BUTTONS).await?;
            let Some(button) = buttons.get(index) else {
                warn!(index, "bill button disappeared");
                break;
            };

            let label = payee_label(button).await?;
            let payee = match filter.admit(&label) {
                Ok(payee) => payee,
                Err(reason) => {
                    if reason == SkipReason::Unnamed {
                        unnamed += 1;
                    }
                    debug!(label = %label, %reason, "skipping bill");
                    summary.skip(&label, reason.to_string());
                    continue;
                }
            };

            info!(index, payee = %payee, "exporting bills");
            if let Err(err) = self.export_payee(button, &payee, summary).await {
                self.close_modal().await;
                apply_policy(self.settings.on_error, &payee, err, summary)?;
            }
        }

        if labels_missing(total, unnamed) {
            warn!(
                rows = total,
                selector = sel::PAYEE_CELL,
                "no payee names found on any bill row"
            );
        }
        Ok(())
    }

    async fn export_payee(
        &self,
        button: &Element,
        payee: &str,
        summary: &mut ExportSummary,
    ) -> Result<()> {
        debug!(html = %element_outer_html(button).await?, "bill button");
        button.click().await.context("Could not open bill window")?;
        self.page.wait_for_dom_ready(self.timeouts.long).await?;
        self.page
            .wait_for(sel::BILL_MODAL_CLOSE, "bill window close button", self.timeouts.long)
            .await?;

        let select = self
            .page
            .wait_for(sel::BILL_SELECT, "bill selector", self.timeouts.default)
            .await?;
        let selectable = element_bool(&select, "function() { return !this.disabled; }").await?;
        let variants = bill_variants(self.page.select_options(sel::BILL_SELECT).await?);
        debug!(payee, ?variants, selectable, "bill variants");

        if variants.is_empty() {
            summary.skip(payee, "no bills listed".to_string());
        }

        for (value, label) in &variants {
            let name = format!("{payee} / {label}");
            if selectable {
                self.page
                    .select_value(sel::BILL_SELECT, value)
                    .await
                    .with_context(|| format!("Could not select bill {label:?}"))?;
                self.page.wait_for_dom_ready(self.timeouts.default).await?;
            }

            match self.export_variant(payee, label).await {
                Ok(Some(SaveOutcome::Written { path, bytes })) => {
                    info!(path = %path.display(), bytes, "saved statement");
                    summary.downloaded.push(path);
                }
                Ok(Some(SaveOutcome::AlreadyPresent { path })) => {
                    info!(path = %path.display(), "statement already saved");
                    summary.existing.push(path);
                }
                Ok(None) => {
                    debug!(bill = %name, "no bill image");
                    summary.skip(&name, "no bill image".to_string());
                }
                Err(err) => apply_policy(self.settings.on_error, &name, err, summary)?,
            }

            // A disabled selector shows a single bill.
            if !selectable {
                break;
            }
        }

        self.close_modal().await;
        Ok(())
    }

    async fn export_variant(&self, payee: &str, label: &str) -> Result<Option<SaveOutcome>> {
        let Some(source) = self.find_bill_source().await? else {
            return Ok(None);
        };
        debug!(?source, "bill source");

        let path = self.output_dir.join(statement_file_name(payee, label));
        let outcome = match source {
            BillSource::Frame(url) => self.downloader.save(&url, &path).await?,
            BillSource::NewWindow(href) => {
                // The link may serve the document itself or a page wrapping it.
                match self.downloader.save_if_pdf(&href, &path).await? {
                    Some(outcome) => outcome,
                    None => {
                        let pdf = self.pdf_link_from_viewer(&href).await?;
                        self.downloader.save(pdf.url(), &path).await?
                    }
                }
            }
        };
        Ok(Some(outcome))
    }

    async fn find_bill_source(&self) -> Result<Option<BillSource>> {
        let page_url = self.page.url().await?;

        if let Some(frame) = self
            .page
            .wait_for_optional(sel::BILL_FRAME, "bill frame", self.timeouts.short)
            .await?
        {
            if let Some(src) = frame.attribute("src").await?.filter(|s| !s.is_empty()) {
                return Ok(Some(BillSource::Frame(resolve_link(&page_url, &src)?)));
            }
        }

        let Some(link) = self
            .page
            .wait_for_optional(sel::BILL_NEW_WINDOW_LINK, "bill new window link", self.timeouts.short)
            .await?
        else {
            return Ok(None);
        };
        let html = element_outer_html(&link).await?;
        let href = extract_href(&html)
            .with_context(|| format!("No link in bill new window markup: {html}"))?;
        Ok(Some(BillSource::NewWindow(resolve_link(&page_url, &href)?)))
    }

    /// Open a same-site viewer page and pull the document link out of it.
    async fn pdf_link_from_viewer(&self, viewer_url: &str) -> Result<BillSource> {
        let viewer = SitePage::new(self.session.new_page("about:blank").await?, self.timeouts.poll);
        let result = async {
            viewer.goto(viewer_url, self.timeouts.long).await?;
            viewer.wait_for_dom_ready(self.timeouts.long).await?;
            let content = viewer.content().await?;
            let link = extract_pdf_link(&content)
                .with_context(|| format!("No document link in viewer {viewer_url}"))?;
            let base = viewer.url().await?;
            resolve_link(&base, &link)
        }
        .await;

        if let Err(err) = viewer.inner().clone().close().await {
            warn!(error = %err, "viewer page did not close");
        }

        result.map(BillSource::NewWindow)
    }

    async fn close_modal(&self) {
        match self
            .page
            .wait_for_optional(sel::BILL_MODAL_CLOSE, "bill window close button", self.timeouts.short)
            .await
        {
            Ok(Some(button)) => {
                if let Err(err) = button.click().await {
                    warn!(error = %err, "could not close bill window");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "could not find bill window close button"),
        }

        if let Ok(1) = self.page.count(sel::BILL_DIALOG_CLOSE).await {
            if let Err(err) = self.page.click(sel::BILL_DIALOG_CLOSE, "bill dialog close").await {
                warn!(error = %err, "could not close bill dialog");
            }
        }
    }
}

/// Payee text for the report row holding `button`.
async fn payee_label(button: &Element) -> Result<String> {
    let function = format!(
        "function() {{ const row = this.closest('tr'); \
         const cell = row && row.querySelector({cell}); \
         const text = cell ? cell.innerText : (this.getAttribute('title') || this.getAttribute('aria-label') || ''); \
         return text.trim(); }}",
        cell = js_string(sel::PAYEE_CELL)
    );
    element_string(button, &function).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_variants_drop_placeholders() {
        let options = vec![
            (String::new(), "Select a bill".to_string()),
            ("101".to_string(), "01/15/2024".to_string()),
            ("102".to_string(), "02/15/2024".to_string()),
        ];
        let variants = bill_variants(options);
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].0, "101");
    }

    #[test]
    fn test_bill_source_url() {
        assert_eq!(BillSource::Frame("a".to_string()).url(), "a");
        assert_eq!(BillSource::NewWindow("b".to_string()).url(), "b");
    }

    #[test]
    fn test_skip_policy_records_and_continues() {
        let mut summary = ExportSummary::default();
        let err = anyhow::anyhow!("timed out waiting for bill frame");
        apply_policy(BillErrorPolicy::Skip, "Acme Power / Jan", err, &mut summary).unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].label, "Acme Power / Jan");
        assert!(summary.failed[0].error.contains("timed out"));
    }

    #[test]
    fn test_abort_policy_stops_without_recording() {
        let mut summary = ExportSummary::default();
        let err = anyhow::anyhow!("statement request returned 500");
        let err = apply_policy(BillErrorPolicy::Abort, "Acme Power / Jan", err, &mut summary)
            .unwrap_err();

        assert!(summary.failed.is_empty());
        assert!(err.downcast_ref::<BillAborted>().is_some());
        assert_eq!(
            format!("{err:#}"),
            "Exporting Acme Power / Jan failed: statement request returned 500"
        );
    }

    #[test]
    fn test_abort_is_not_wrapped_again_by_the_payee() {
        let mut summary = ExportSummary::default();
        let inner = apply_policy(
            BillErrorPolicy::Abort,
            "Acme Power / Jan",
            anyhow::anyhow!("boom"),
            &mut summary,
        )
        .unwrap_err();
        let outer =
            apply_policy(BillErrorPolicy::Abort, "Acme Power", inner, &mut summary).unwrap_err();

        let message = format!("{outer:#}");
        assert_eq!(message, "Exporting Acme Power / Jan failed: boom");
        assert_eq!(message.matches("Exporting").count(), 1);
    }

    #[test]
    fn test_labels_missing() {
        assert!(labels_missing(3, 3));
        assert!(!labels_missing(3, 2));
        assert!(!labels_missing(0, 0));
    }
}
