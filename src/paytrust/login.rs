//! Sign-in flow, including the operator pause for phone verification.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::selectors as sel;
use crate::browser::{element_outer_html, SitePage};
use crate::config::Timeouts;
use crate::credentials::LoginCredentials;
use crate::prompt::ManualStep;

const PHONE_CALL_TASK: &str = "Phone call received";

/// The phone verification page has a single form whose markup points at
/// the OOBA preview endpoint. The password page has two forms.
pub fn needs_phone_verification(form_count: usize, form_html: &str) -> bool {
    form_count == 1 && form_html.contains(sel::OOBA_MARKER)
}

/// Sign in, pausing for the operator if the site asks for phone verification.
pub async fn login(
    page: &SitePage,
    url: &str,
    credentials: &LoginCredentials,
    manual: &dyn ManualStep,
    timeouts: &Timeouts,
) -> Result<()> {
    page.goto(url, timeouts.long).await?;
    info!(url, "opened login page");

    page.fill(sel::USERNAME_INPUT, "username input", &credentials.username)
        .await?;
    debug!(username = %credentials.username, "username filled in");

    page.click(sel::USERNAME_CONTINUE, "continue button").await?;
    page.wait_for_dom_ready(timeouts.short)
        .await
        .context("Page did not load after continue")?;

    let form = page
        .wait_for(sel::AUTH_FORM, "authentication form", timeouts.short)
        .await?;
    let form_count = page.count(sel::AUTH_FORM).await?;
    if form_count == 1 {
        let html = element_outer_html(&form).await?;
        if needs_phone_verification(form_count, &html) {
            info!("phone verification requested; waiting for operator");
            tokio::task::block_in_place(|| manual.confirm(PHONE_CALL_TASK))?;
        }
    }

    page.wait_for(sel::PASSWORD_INPUT, "password input", timeouts.default)
        .await?;
    page.fill(
        sel::PASSWORD_INPUT,
        "password input",
        credentials.password.expose_secret(),
    )
    .await?;
    debug!("password filled in");

    page.click(sel::SIGN_ON_BUTTON, "sign on button").await?;
    page.wait_for_dom_ready(timeouts.default)
        .await
        .context("Page did not load after sign on")?;

    if let Some(notice) = page
        .wait_for_optional(sel::NOTICE_CLOSE, "notice close button", timeouts.default)
        .await?
    {
        if page.count(sel::NOTICE_CLOSE).await? == 1 {
            notice
                .click()
                .await
                .context("Could not close notice")?;
            debug!("notice cleared");
        }
    }

    info!("logged in");
    Ok(())
}
