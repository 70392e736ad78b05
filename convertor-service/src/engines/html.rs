//! HTML to PDF through a headless Chromium.
//!
//! Each render launches its own browser with a throwaway profile directory
//! inside the scratch root, so concurrent renders share nothing.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{HtmlRenderer, ProcessRunner};
use crate::error::{TransformError, TransformResult};
use crate::staging::{StagedFile, StagingStore};

const ENGINE: &str = "HTML rendering";

pub struct ChromiumRenderer {
    chrome_path: Option<PathBuf>,
    staging: StagingStore,
    runner: ProcessRunner,
}

impl ChromiumRenderer {
    pub fn new(chrome_path: Option<PathBuf>, staging: StagingStore, runner: ProcessRunner) -> Self {
        Self {
            chrome_path,
            staging,
            runner,
        }
    }

    async fn render_in_browser(&self, html: &str, output: &StagedFile) -> TransformResult<()> {
        let profile = tempfile::Builder::new()
            .prefix("chrome-profile-")
            .tempdir_in(self.staging.root())
            .map_err(|source| TransformError::StagingIo {
                name: "browser profile".to_string(),
                source,
            })?;

        let mut builder = BrowserConfig::builder()
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .user_data_dir(profile.path());

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| TransformError::engine(ENGINE, format!("browser config: {}", e)))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TransformError::engine(ENGINE, format!("browser launch: {}", e)))?;

        // Drive browser events until the connection closes
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let result = print_page(&browser, html, output).await;

        if let Err(e) = browser.close().await {
            debug!(error = %e, "Browser close failed");
        }
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "Browser wait failed");
        }
        handle.abort();

        if let Err(e) = profile.close() {
            warn!(error = %e, "Failed to delete browser profile directory");
        }

        result
    }
}

async fn print_page(browser: &Browser, html: &str, output: &StagedFile) -> TransformResult<()> {
    let page = browser
        .new_page(CreateTargetParams::new("about:blank"))
        .await
        .map_err(|e| TransformError::engine(ENGINE, format!("new page: {}", e)))?;

    page.set_content(html)
        .await
        .map_err(|e| TransformError::engine(ENGINE, format!("set content: {}", e)))?;

    let params = PrintToPdfParams {
        print_background: Some(true),
        ..Default::default()
    };
    page.save_pdf(params, output.absolute_path())
        .await
        .map_err(|e| TransformError::engine(ENGINE, format!("print: {}", e)))?;

    Ok(())
}

#[async_trait]
impl HtmlRenderer for ChromiumRenderer {
    async fn render(&self, html: &str, output: &StagedFile) -> TransformResult<()> {
        debug!(
            output = %output.staged_path().display(),
            html_len = html.len(),
            "Rendering HTML"
        );

        self.runner
            .run_bounded(ENGINE, self.render_in_browser(html, output))
            .await?;

        if !output.exists() {
            return Err(TransformError::OutputMissing {
                artifact: "Rendered PDF".to_string(),
            });
        }
        Ok(())
    }
}
