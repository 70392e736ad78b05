//! Scratch-space staging for request payloads and engine outputs.
//!
//! Every staged file lives in its own token directory under the scratch root
//! (`<root>/<uuid>/<name>`), so concurrent requests never share a path. A
//! [`StagedFile`] deletes its file when released or dropped, whichever comes
//! first. The token directory goes away, contents and all, with the last
//! handle that points into it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{TransformError, TransformResult};

/// Longest file name (in chars) kept when sanitizing uploads
const MAX_NAME_CHARS: usize = 150;

/// Fallback when an upload carries no usable file name
const DEFAULT_NAME: &str = "upload";

/// Scratch directory shared by all requests
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the scratch root if it does not exist yet
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `bytes` under a fresh token directory
    pub async fn stage(&self, name: &str, bytes: &[u8]) -> TransformResult<StagedFile> {
        let staged = self.reserve(name).await?;
        tokio::fs::write(&staged.absolute_path, bytes)
            .await
            .map_err(|source| TransformError::StagingIo {
                name: staged.original_name.clone(),
                source,
            })?;

        debug!(
            file = %staged.staged_path.display(),
            original = staged.original_name(),
            size = bytes.len(),
            "Staged payload"
        );
        Ok(staged)
    }

    /// Reserve a unique location without writing to it
    pub async fn reserve(&self, name: &str) -> TransformResult<StagedFile> {
        let file_name = sanitize_file_name(name);
        let token = Uuid::new_v4().to_string();
        let dir = self.root.join(&token);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| TransformError::StagingIo {
                name: file_name.clone(),
                source,
            })?;

        Ok(StagedFile {
            original_name: name.to_string(),
            staged_path: Path::new(&token).join(&file_name),
            absolute_path: dir.join(&file_name),
            token_dir: Arc::new(TokenDir {
                absolute: dir,
                staged: PathBuf::from(token),
            }),
            released: false,
        })
    }

    /// Absolute filesystem location of a live handle
    pub fn resolve<'a>(&self, staged: &'a StagedFile) -> &'a Path {
        &staged.absolute_path
    }

    /// Delete a staged file. Never fails; problems are logged.
    pub fn release(&self, mut staged: StagedFile) {
        staged.remove();
    }

    /// Remove token directories left behind by a previous process.
    ///
    /// Only entries named like a token are touched, so a misconfigured root
    /// never loses unrelated files. Returns how many directories were removed.
    pub async fn purge_stale(&self) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let is_token = entry
                .file_name()
                .to_str()
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
            if !is_token || !entry.file_type().await?.is_dir() {
                continue;
            }

            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    dir = %entry.path().display(),
                    error = %e,
                    "Failed to remove stale staging directory"
                ),
            }
        }

        Ok(removed)
    }
}

/// A token directory, removed with everything in it once no handle uses it
#[derive(Debug)]
struct TokenDir {
    absolute: PathBuf,
    staged: PathBuf,
}

impl Drop for TokenDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.absolute) {
            Ok(()) => debug!(dir = %self.staged.display(), "Removed staging directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                dir = %self.staged.display(),
                error = %e,
                "Failed to delete staging directory"
            ),
        }
    }
}

/// A file in scratch space owned by a single request
#[derive(Debug)]
pub struct StagedFile {
    original_name: String,
    staged_path: PathBuf,
    absolute_path: PathBuf,
    token_dir: Arc<TokenDir>,
    released: bool,
}

impl StagedFile {
    /// Handle for a file an engine writes beside this one, named after this
    /// file with its extension replaced (`report.docx` -> `report.pdf`).
    ///
    /// The name is derived from the already sanitized one and not shortened
    /// again, so it matches what an engine writes for the same input.
    pub fn sibling_with_extension(&self, extension: &str) -> StagedFile {
        let file_name = Path::new(self.file_name()).with_extension(extension);

        StagedFile {
            original_name: file_name.to_string_lossy().into_owned(),
            staged_path: self.token_dir.staged.join(&file_name),
            absolute_path: self.token_dir.absolute.join(&file_name),
            token_dir: Arc::clone(&self.token_dir),
            released: false,
        }
    }

    /// Name the caller supplied, before sanitizing
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Path relative to the scratch root (`<token>/<name>`)
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// File name on disk
    pub fn file_name(&self) -> &str {
        self.absolute_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_NAME)
    }

    pub fn exists(&self) -> bool {
        self.absolute_path.is_file()
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_file(&self.absolute_path) {
            Ok(()) => debug!(file = %self.staged_path.display(), "Released staged file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %self.staged_path.display(), "Staged file already absent");
            }
            Err(e) => warn!(
                file = %self.staged_path.display(),
                error = %e,
                "Failed to delete staged file"
            ),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Reduce an uploaded file name to a single safe path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return DEFAULT_NAME.to_string();
    }

    if trimmed.chars().count() <= MAX_NAME_CHARS {
        return trimmed.to_string();
    }

    // Keep the extension so engines still recognise the format
    let (stem, ext) = match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().count() < 16 => (stem, Some(ext)),
        _ => (trimmed, None),
    };
    let budget = MAX_NAME_CHARS - ext.map(|e| e.chars().count() + 1).unwrap_or(0);
    let short_stem: String = stem.chars().take(budget).collect();
    match ext {
        Some(ext) => format!("{}.{}", short_stem, ext),
        None => short_stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_stage_writes_under_root() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let staged = store.stage("report.docx", b"hello").await.unwrap();
        let path = store.resolve(&staged);

        assert!(path.starts_with(tmp.path()));
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
        assert_eq!(staged.original_name(), "report.docx");
        assert!(staged.staged_path().ends_with("report.docx"));
    }

    #[tokio::test]
    async fn test_same_name_never_collides() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let a = store.stage("same.pdf", b"a").await.unwrap();
        let b = store.stage("same.pdf", b"b").await.unwrap();

        assert_ne!(a.absolute_path(), b.absolute_path());
        assert_eq!(std::fs::read(a.absolute_path()).unwrap(), b"a");
        assert_eq!(std::fs::read(b.absolute_path()).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_release_removes_file_and_token_dir() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let staged = store.stage("x.pdf", b"x").await.unwrap();
        let path = staged.absolute_path().to_path_buf();
        store.release(staged);

        assert!(!path.exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        {
            let _staged = store.stage("x.pdf", b"x").await.unwrap();
            assert_eq!(entries(tmp.path()), 1);
        }

        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let staged = store.stage("x.pdf", b"x").await.unwrap();
        std::fs::remove_file(staged.absolute_path()).unwrap();
        store.release(staged);

        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_sibling_shares_directory() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let input = store.stage("deck.pptx", b"p").await.unwrap();
        let output = input.sibling_with_extension("pdf");
        assert_eq!(output.file_name(), "deck.pdf");
        std::fs::write(output.absolute_path(), b"%PDF").unwrap();
        assert_eq!(
            input.absolute_path().parent(),
            output.absolute_path().parent()
        );

        store.release(input);
        assert!(output.exists());
        assert_eq!(entries(tmp.path()), 1);

        store.release(output);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_sibling_keeps_full_length_name() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let input = store.stage(&"a".repeat(200), b"x").await.unwrap();
        assert_eq!(input.file_name().chars().count(), MAX_NAME_CHARS);

        let output = input.sibling_with_extension("pdf");
        assert_eq!(output.file_name(), format!("{}.pdf", "a".repeat(MAX_NAME_CHARS)));
    }

    #[tokio::test]
    async fn test_last_release_removes_unexpected_files() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let input = store.stage("deck.pptx", b"p").await.unwrap();
        let stray = input.absolute_path().with_file_name("lock.tmp");
        std::fs::write(&stray, b"engine leftovers").unwrap();

        store.release(input);
        assert!(!stray.exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_reserve_does_not_create_file() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let reserved = store.reserve("converted_html.pdf").await.unwrap();
        assert!(!reserved.exists());
        drop(reserved);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_unwritable_root_is_staging_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let store = StagingStore::new(&blocker);

        let err = store.stage("x.pdf", b"x").await.unwrap_err();
        assert!(matches!(err, TransformError::StagingIo { .. }));
    }

    #[tokio::test]
    async fn test_purge_stale_only_touches_token_dirs() {
        let tmp = TempDir::new().unwrap();
        let store = StagingStore::new(tmp.path());

        let leftover = tmp.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir(&leftover).unwrap();
        std::fs::write(leftover.join("old.pdf"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("keep-me")).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(store.purge_stale().await.unwrap(), 1);
        assert!(!leftover.exists());
        assert!(tmp.path().join("keep-me").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\a.docx"), "a.docx");
        assert_eq!(sanitize_file_name("we|rd?.pdf"), "we_rd_.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");

        let long = format!("{}.xlsx", "a".repeat(400));
        let short = sanitize_file_name(&long);
        assert!(short.ends_with(".xlsx"));
        assert_eq!(short.chars().count(), MAX_NAME_CHARS);
    }
}
