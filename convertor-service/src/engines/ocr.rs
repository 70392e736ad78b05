//! Tesseract OCR through its command-line interface.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ProcessRunner, TextRecognizer};
use crate::error::TransformResult;
use crate::staging::StagingStore;

const ENGINE: &str = "OCR";

/// Whether `language` is a safe Tesseract language code such as `eng` or `eng+deu`
pub fn is_valid_language(language: &str) -> bool {
    !language.is_empty()
        && language
            .split('+')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Runs `tesseract <image> stdout -l <language>` on a staged page image
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
    staging: StagingStore,
    runner: ProcessRunner,
}

impl TesseractRecognizer {
    pub fn new(
        binary: PathBuf,
        language: String,
        staging: StagingStore,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            binary,
            language,
            staging,
            runner,
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, png: &[u8]) -> TransformResult<String> {
        let image = self.staging.stage("page.png", png).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg(self.staging.resolve(&image))
            .arg("stdout")
            .arg("-l")
            .arg(&self.language);

        let output = self.runner.run(ENGINE, command).await?;
        self.staging.release(image);

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "Recognized page text");
        Ok(text)
    }
}
