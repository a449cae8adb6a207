//! Statement downloads over HTTP, reusing the browser's session cookies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

const PDF_MAGIC: &[u8] = b"%PDF";

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a\s[^>]*?href="([^"]*)""#).expect("valid href regex"));

static PDF_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:embed|iframe|object|a)\s[^>]*?(?:src|data|href)="([^"]+)""#)
        .expect("valid pdf source regex")
});

/// Cookies captured from the browser session.
#[derive(Debug, Clone, Default)]
pub struct SessionCookies {
    cookies: BTreeMap<String, String>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Format cookies as a Cookie header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Result of saving one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Written { path: PathBuf, bytes: usize },
    AlreadyPresent { path: PathBuf },
}

/// HTTP client that fetches statement PDFs as the logged-in user.
pub struct PdfDownloader {
    client: Client,
    overwrite: bool,
}

impl PdfDownloader {
    pub fn new(cookies: &SessionCookies, overwrite: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cookies.is_empty() {
            headers.insert(
                COOKIE,
                HeaderValue::from_str(&cookies.cookie_header())
                    .context("Session cookies are not a valid header value")?,
            );
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, overwrite })
    }

    /// Download `url`, failing on any status other than 200.
    pub async fn fetch(&self, url: &str) -> Result<Document> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            anyhow::bail!("Statement request to {url} returned {status}");
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;
        Ok(Document {
            content_type,
            body: body.to_vec(),
        })
    }

    /// Download `url` into `path`.
    ///
    /// An existing file is left alone unless the downloader overwrites.
    pub async fn save(&self, url: &str, path: &Path) -> Result<SaveOutcome> {
        if let Some(existing) = self.existing(path) {
            return Ok(existing);
        }

        let document = self.fetch(url).await?;
        if !document.is_pdf() {
            warn!(url, bytes = document.body.len(), "statement body does not look like a PDF");
        }
        write_document(path, &document.body).await
    }

    /// Like [`save`](Self::save), but only writes when the response is a PDF.
    ///
    /// `None` means the URL served something else, such as a viewer page.
    pub async fn save_if_pdf(&self, url: &str, path: &Path) -> Result<Option<SaveOutcome>> {
        if let Some(existing) = self.existing(path) {
            return Ok(Some(existing));
        }

        let document = self.fetch(url).await?;
        if !document.is_pdf() {
            debug!(url, content_type = ?document.content_type, "not a PDF response");
            return Ok(None);
        }
        write_document(path, &document.body).await.map(Some)
    }

    fn existing(&self, path: &Path) -> Option<SaveOutcome> {
        if self.overwrite || !path.exists() {
            return None;
        }
        debug!(path = %path.display(), "statement already present");
        Some(SaveOutcome::AlreadyPresent {
            path: path.to_path_buf(),
        })
    }
}

/// A downloaded response body.
#[derive(Debug, Clone)]
pub struct Document {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Document {
    /// PDF by declared type or by magic bytes.
    pub fn is_pdf(&self) -> bool {
        let declared = self
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().starts_with("application/pdf"))
            .unwrap_or(false);
        declared || self.body.starts_with(PDF_MAGIC)
    }
}

async fn write_document(path: &Path, body: &[u8]) -> Result<SaveOutcome> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(SaveOutcome::Written {
        path: path.to_path_buf(),
        bytes: body.len(),
    })
}

/// First `<a href="...">` value in a fragment of markup.
pub fn extract_href(html: &str) -> Option<String> {
    HREF_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| unescape_attribute(m.as_str()))
        .filter(|href| !href.is_empty())
}

/// Link to the PDF inside a viewer page.
///
/// Prefers sources that mention `pdf`, then falls back to the first
/// embedded document.
pub fn extract_pdf_link(html: &str) -> Option<String> {
    let sources: Vec<String> = PDF_SOURCE_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_attribute(m.as_str()))
        .filter(|s| !is_browser_internal(s))
        .collect();

    sources
        .iter()
        .find(|s| s.to_ascii_lowercase().contains("pdf"))
        .or_else(|| sources.first())
        .cloned()
}

/// Anchors, scripts and sources that only exist inside the browser, like
/// the `about:blank` embed of Chrome's own PDF viewer.
fn is_browser_internal(link: &str) -> bool {
    let lower = link.trim().to_ascii_lowercase();
    lower.starts_with('#')
        || ["javascript:", "about:", "blob:", "chrome-extension:", "chrome:", "data:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
}

/// Resolve a possibly relative link against the page it was found on.
pub fn resolve_link(base: &str, link: &str) -> Result<String> {
    let base = Url::parse(base).with_context(|| format!("Invalid page URL: {base}"))?;
    let resolved = base
        .join(link)
        .with_context(|| format!("Invalid link {link:?} on {base}"))?;
    Ok(resolved.to_string())
}

fn unescape_attribute(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_is_sorted() {
        let cookies = SessionCookies::new()
            .with_cookie("session", "abc")
            .with_cookie("auth", "xyz");
        assert_eq!(cookies.cookie_header(), "auth=xyz; session=abc");
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_extract_href() {
        let html = r#"<span class="newWindow"><a href="/3004/Bills/View?id=42&amp;page=1" target="_blank">Open</a></span>"#;
        assert_eq!(
            extract_href(html).as_deref(),
            Some("/3004/Bills/View?id=42&page=1")
        );
        assert_eq!(extract_href("<a>no link</a>"), None);
        assert_eq!(extract_href(r#"<a href="">empty</a>"#), None);
    }

    #[test]
    fn test_extract_pdf_link_prefers_pdf() {
        let html = r##"
            <a href="#top">Top</a>
            <iframe src="/ads/banner"></iframe>
            <embed type="application/pdf" src="/3004/Bills/Document.pdf?id=7">
        "##;
        assert_eq!(
            extract_pdf_link(html).as_deref(),
            Some("/3004/Bills/Document.pdf?id=7")
        );
    }

    #[test]
    fn test_extract_pdf_link_falls_back_to_first_source() {
        let html = r#"<object data="/3004/Bills/Image?id=9"></object>"#;
        assert_eq!(
            extract_pdf_link(html).as_deref(),
            Some("/3004/Bills/Image?id=9")
        );
        assert_eq!(extract_pdf_link("<p>nothing</p>"), None);
    }

    #[test]
    fn test_extract_pdf_link_ignores_chrome_viewer_embed() {
        let viewer = r#"<html><body style="height: 100%; width: 100%; overflow: hidden; margin:0px;"><embed name="B4C2A0F1" style="position:absolute; left: 0; top: 0;" width="100%" height="100%" src="about:blank" type="application/pdf" internalid="B4C2A0F1"></body></html>"#;
        assert_eq!(extract_pdf_link(viewer), None);

        let html = r#"<embed src="about:blank" type="application/pdf"><a href="/3004/Bills/Image?id=42">Download</a>"#;
        assert_eq!(
            extract_pdf_link(html).as_deref(),
            Some("/3004/Bills/Image?id=42")
        );
    }

    #[test]
    fn test_document_is_pdf() {
        let by_type = Document {
            content_type: Some("Application/PDF; charset=binary".to_string()),
            body: b"whatever".to_vec(),
        };
        assert!(by_type.is_pdf());

        let by_magic = Document {
            content_type: Some("application/octet-stream".to_string()),
            body: b"%PDF-1.7".to_vec(),
        };
        assert!(by_magic.is_pdf());

        let html = Document {
            content_type: Some("text/html".to_string()),
            body: b"<html></html>".to_vec(),
        };
        assert!(!html.is_pdf());
    }

    #[test]
    fn test_resolve_link() -> Result<()> {
        assert_eq!(
            resolve_link("https://login.billscenter.paytrust.com/3004/Home", "/3004/Bills/1.pdf")?,
            "https://login.billscenter.paytrust.com/3004/Bills/1.pdf"
        );
        assert_eq!(
            resolve_link("https://a.example/x/", "https://b.example/y.pdf")?,
            "https://b.example/y.pdf"
        );
        assert!(resolve_link("not a url", "/x").is_err());
        Ok(())
    }
}
