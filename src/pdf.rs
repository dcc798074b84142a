use anyhow::{anyhow, Context};
use reqwest::multipart::{Form, Part};
use tracing::debug;

#[async_trait::async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render a full HTML document to PDF bytes.
    async fn render(&self, html: String) -> anyhow::Result<Vec<u8>>;
}

/// Headless Chromium exposed over HTTP (Gotenberg-compatible convert endpoint).
pub struct ChromiumPdf {
    http: reqwest::Client,
    endpoint: String,
}

impl ChromiumPdf {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/forms/chromium/convert/html",
                base_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait::async_trait]
impl PdfRenderer for ChromiumPdf {
    async fn render(&self, html: String) -> anyhow::Result<Vec<u8>> {
        let page = Part::text(html)
            .file_name("index.html")
            .mime_str("text/html")?;
        // A4 in inches
        let form = Form::new()
            .part("files", page)
            .text("paperWidth", "8.27")
            .text("paperHeight", "11.7")
            .text("printBackground", "true");

        let res = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("pdf renderer request")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("pdf renderer error {}: {}", status, body));
        }

        let bytes = res.bytes().await.context("pdf renderer body")?;
        debug!(size = bytes.len(), "pdf rendered");
        Ok(bytes.to_vec())
    }
}
