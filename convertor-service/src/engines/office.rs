//! LibreOffice headless conversion.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{OfficeConverter, ProcessRunner};
use crate::error::{TransformError, TransformResult};
use crate::staging::{StagedFile, StagingStore};

const ENGINE: &str = "File conversion";

/// Runs `soffice --headless --convert-to pdf` with the output beside the input
pub struct SofficeConverter {
    binary: PathBuf,
    staging: StagingStore,
    runner: ProcessRunner,
}

impl SofficeConverter {
    pub fn new(binary: PathBuf, staging: StagingStore, runner: ProcessRunner) -> Self {
        Self {
            binary,
            staging,
            runner,
        }
    }

    fn command(&self, input: &Path, outdir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg(input)
            .arg("--outdir")
            .arg(outdir);
        command
    }
}

#[async_trait]
impl OfficeConverter for SofficeConverter {
    async fn convert(&self, input: &StagedFile) -> TransformResult<StagedFile> {
        let input_path = self.staging.resolve(input);
        let outdir = input_path
            .parent()
            .unwrap_or(self.staging.root())
            .to_path_buf();

        // The output would replace the input
        if Path::new(input.file_name()).extension() == Some(OsStr::new("pdf")) {
            return Err(TransformError::validation("File is already a PDF"));
        }
        // soffice names its output after the input stem
        let output = input.sibling_with_extension("pdf");

        debug!(
            binary = %self.binary.display(),
            input = %input.staged_path().display(),
            "Converting office document"
        );
        self.runner
            .run(ENGINE, self.command(input_path, &outdir))
            .await?;

        if !output.exists() {
            return Err(TransformError::OutputMissing {
                artifact: "Converted PDF".to_string(),
            });
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn converter(binary: impl Into<PathBuf>, staging: &StagingStore) -> SofficeConverter {
        SofficeConverter::new(
            binary.into(),
            staging.clone(),
            ProcessRunner::new(2, Duration::from_secs(10)),
        )
    }

    /// A stand-in for soffice that writes `<outdir>/<stem>.pdf`
    fn fake_soffice(dir: &Path) -> PathBuf {
        let script = dir.join("fake-soffice");
        std::fs::write(
            &script,
            "#!/bin/sh\nname=$(basename \"$4\")\nprintf '%%PDF-1.4 fake' > \"$6/${name%.*}.pdf\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    fn test_command_arguments() {
        let staging = StagingStore::new("/scratch");
        let command = converter("soffice", &staging).command(
            Path::new("/scratch/t/report.docx"),
            Path::new("/scratch/t"),
        );

        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--headless",
                "--convert-to",
                "pdf",
                "/scratch/t/report.docx",
                "--outdir",
                "/scratch/t"
            ]
        );
    }

    #[tokio::test]
    async fn test_converts_beside_input() {
        let bin = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        let input = staging.stage("report.docx", b"doc").await.unwrap();
        let output = converter(fake_soffice(bin.path()), &staging)
            .convert(&input)
            .await
            .unwrap();

        assert_eq!(output.file_name(), "report.pdf");
        assert_eq!(
            std::fs::read(output.absolute_path()).unwrap(),
            b"%PDF-1.4 fake"
        );
    }

    #[tokio::test]
    async fn test_truncated_name_finds_output_and_cleans_up() {
        let bin = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        let input = staging.stage(&"a".repeat(200), b"doc").await.unwrap();
        let output = converter(fake_soffice(bin.path()), &staging)
            .convert(&input)
            .await
            .unwrap();

        assert_eq!(output.file_name(), format!("{}.pdf", input.file_name()));
        assert_eq!(
            std::fs::read(output.absolute_path()).unwrap(),
            b"%PDF-1.4 fake"
        );

        staging.release(input);
        staging.release(output);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_output_leaves_no_scratch_behind() {
        let bin = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        // Writes its PDF under a name the adapter does not expect
        let script = bin.path().join("odd-soffice");
        std::fs::write(&script, "#!/bin/sh\nprintf '%%PDF' > \"$6/elsewhere.pdf\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = staging.stage("memo.docx", b"doc").await.unwrap();
        let err = converter(script, &staging).convert(&input).await.unwrap_err();
        assert!(matches!(err, TransformError::OutputMissing { .. }));

        staging.release(input);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_silent_success_without_output_is_missing_output() {
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        let input = staging.stage("sheet.xlsx", b"x").await.unwrap();
        let err = converter("true", &staging)
            .convert(&input)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::OutputMissing { .. }));
    }

    #[tokio::test]
    async fn test_engine_failure_is_reported() {
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        let input = staging.stage("deck.pptx", b"p").await.unwrap();
        let err = converter("false", &staging)
            .convert(&input)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::EngineInvocation { .. }));
        assert!(err.to_string().starts_with("File conversion failed"));
    }

    #[tokio::test]
    async fn test_pdf_input_rejected() {
        let scratch = TempDir::new().unwrap();
        let staging = StagingStore::new(scratch.path());

        let input = staging.stage("already.pdf", b"%PDF").await.unwrap();
        let err = converter("true", &staging)
            .convert(&input)
            .await
            .unwrap_err();

        assert!(matches!(err, TransformError::Validation { .. }));
        assert!(input.exists());
    }
}
