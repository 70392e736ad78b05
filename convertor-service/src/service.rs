mod convert;
mod job;
mod matting;
mod ocr;
mod upload;

use std::sync::Arc;

use bytes::Bytes;
use mime::Mime;
use tracing::info;

use crate::config::ServiceConfig;
use crate::engines::{Engines, PageImage};
use crate::error::{StartupError, TransformError, TransformResult};
use crate::staging::{StagedFile, StagingStore};

/// A file received with a request, held in memory until staged
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A finished output file, already read out of scratch space
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: Mime,
    pub file_name: String,
}

impl Artifact {
    fn pdf(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: mime::APPLICATION_PDF,
            file_name: file_name.into(),
        }
    }
}

/// Transform orchestrator.
///
/// Owns the scratch store and the engines; every public operation stages its
/// inputs, drives one engine pipeline and releases all scratch files before
/// returning, on success and failure alike.
pub struct ConvertorService {
    config: Arc<ServiceConfig>,
    staging: StagingStore,
    engines: Engines,
}

impl ConvertorService {
    /// Create the service with production engines
    pub async fn new(config: ServiceConfig) -> Result<Self, StartupError> {
        info!("Initializing convertor service");

        let staging = StagingStore::new(&config.storage.scratch_dir);
        staging.prepare().await.map_err(StartupError::ScratchDir)?;
        let purged = staging.purge_stale().await.map_err(StartupError::ScratchDir)?;
        if purged > 0 {
            info!(purged, "Removed stale staging directories");
        }

        let engines = Engines::from_config(&config, &staging);
        info!(
            scratch_dir = %config.storage.scratch_dir.display(),
            max_concurrent = config.engines.max_concurrent,
            "Convertor service ready"
        );

        Ok(Self::with_engines(config, staging, engines))
    }

    /// Create the service around an explicit set of engines
    pub fn with_engines(config: ServiceConfig, staging: StagingStore, engines: Engines) -> Self {
        Self {
            config: Arc::new(config),
            staging,
            engines,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Read an engine output fully into memory, rejecting empty files
    async fn read_artifact(&self, output: &StagedFile, artifact: &str) -> TransformResult<Vec<u8>> {
        let bytes = match tokio::fs::read(self.staging.resolve(output)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransformError::OutputMissing {
                    artifact: artifact.to_string(),
                });
            }
            Err(source) => {
                return Err(TransformError::StagingIo {
                    name: output.file_name().to_string(),
                    source,
                });
            }
        };

        if bytes.is_empty() {
            return Err(TransformError::OutputMissing {
                artifact: artifact.to_string(),
            });
        }
        Ok(bytes)
    }

    async fn page_count(&self, pdf: &StagedFile) -> TransformResult<usize> {
        let rasterizer = Arc::clone(&self.engines.rasterizer);
        let path = self.staging.resolve(pdf).to_path_buf();
        tokio::task::spawn_blocking(move || rasterizer.page_count(&path)).await?
    }

    async fn rasterize(
        &self,
        pdf: &StagedFile,
        pages: Vec<usize>,
        dpi: f32,
    ) -> TransformResult<Vec<PageImage>> {
        let rasterizer = Arc::clone(&self.engines.rasterizer);
        let path = self.staging.resolve(pdf).to_path_buf();
        tokio::task::spawn_blocking(move || rasterizer.rasterize(&path, &pages, dpi)).await?
    }
}
