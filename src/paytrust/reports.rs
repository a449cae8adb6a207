//! Navigation from the landing page to the all-dates payment report.

use anyhow::{Context, Result};
use tracing::debug;

use super::selectors as sel;
use crate::browser::{element_text, SitePage};
use crate::config::Timeouts;

/// Index of the first dropdown entry whose text contains `wanted`.
pub fn find_report_item<S: AsRef<str>>(texts: &[S], wanted: &str) -> Option<usize> {
    texts.iter().position(|t| t.as_ref().contains(wanted))
}

/// From the landing page, open the payment report covering all dates.
pub async fn open_all_dates_report(page: &SitePage, timeouts: &Timeouts) -> Result<()> {
    page.wait_for(sel::PAYMENT_HISTORY_TAB, "payment history tab", timeouts.default)
        .await?;
    page.click(sel::PAYMENT_HISTORY_TAB, "payment history tab")
        .await?;

    page.wait_for(sel::REPORTS_LINK, "reports link", timeouts.default)
        .await?;
    page.click(sel::REPORTS_LINK, "reports link").await?;

    page.wait_for(sel::REPORT_DROPDOWN, "report options", timeouts.default)
        .await?;
    page.click(sel::REPORT_DROPDOWN, "report options").await?;

    let items = page
        .wait_for_all(sel::REPORT_DROPDOWN_ITEMS, "report dropdown items", timeouts.default)
        .await?;
    let mut texts = Vec::with_capacity(items.len());
    for item in &items {
        texts.push(element_text(item).await?);
    }
    debug!(items = ?texts, "report dropdown items");

    let index = find_report_item(&texts, sel::ALL_DATES)
        .with_context(|| format!("Could not find report for {:?}", sel::ALL_DATES))?;

    // The title is re-rendered when the report reloads; drop the current one
    // so its reappearance marks the new report.
    page.wait_for(sel::REPORT_TITLE, "report title", timeouts.default)
        .await?;
    page.remove_all(sel::REPORT_TITLE).await?;

    items[index]
        .click()
        .await
        .with_context(|| format!("Could not click {:?}", sel::ALL_DATES))?;

    page.wait_for(sel::REPORT_TITLE, "reloaded report title", timeouts.long)
        .await
        .context("Report took too long to load after selecting all dates")?;
    page.wait_for(sel::REPORT_TOTAL, "report total", timeouts.long)
        .await?;
    debug!("all dates report loaded");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_report_item() {
        let texts = ["Last 30 Days", "Year to Date", " Include All Dates "];
        assert_eq!(find_report_item(&texts, sel::ALL_DATES), Some(2));
        assert_eq!(find_report_item(&texts, "Last 90 Days"), None);
    }
}
