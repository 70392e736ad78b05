//! Service configuration.
//!
//! Everything is read once at startup from an optional `config` file and
//! `CONVERTOR__*` environment variables; see [`loader`].

mod loader;

pub use loader::load_config;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// macOS bundle location of the LibreOffice binary
const MACOS_SOFFICE_PATH: &str = "/Applications/LibreOffice.app/Contents/MacOS/soffice";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub engines: EnginesConfig,

    #[serde(default)]
    pub office: OfficeConfig,

    #[serde(default)]
    pub html: HtmlConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub matting: MattingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Scratch storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Client credentials checked on every transform route
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_key: String,

    #[serde(default)]
    pub client_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_key", &"<redacted>")
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Limits shared by every external engine invocation
#[derive(Debug, Clone, Deserialize)]
pub struct EnginesConfig {
    /// Maximum number of engine subprocesses running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Hard timeout for a single engine invocation in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EnginesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Office document converter configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfficeConfig {
    /// Path to the LibreOffice binary. Auto-detected when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

impl OfficeConfig {
    /// Resolve the converter binary: configured path, then the macOS bundle,
    /// then `libreoffice` from `PATH`.
    pub fn resolve_binary(&self) -> PathBuf {
        if let Some(binary) = &self.binary {
            return binary.clone();
        }
        let bundled = Path::new(MACOS_SOFFICE_PATH);
        if bundled.exists() {
            bundled.to_path_buf()
        } else {
            PathBuf::from("libreoffice")
        }
    }
}

/// HTML renderer configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HtmlConfig {
    /// Optional path to Chrome/Chromium executable (uses system default if not set)
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

/// OCR configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_binary")]
    pub tesseract_binary: PathBuf,

    #[serde(default = "default_language")]
    pub language: String,

    /// Rasterization resolution for full-document OCR
    #[serde(default = "default_dpi")]
    pub default_dpi: f32,

    /// Rasterization resolution for page extraction
    #[serde(default = "default_extraction_dpi")]
    pub extraction_dpi: f32,

    /// Directory containing libpdfium. Falls back to ./, vendor/pdfium/lib/, then system paths.
    #[serde(default)]
    pub pdfium_library_dir: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_binary: default_tesseract_binary(),
            language: default_language(),
            default_dpi: default_dpi(),
            extraction_dpi: default_extraction_dpi(),
            pdfium_library_dir: None,
        }
    }
}

/// Background removal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MattingConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Images whose longer edge exceeds this are downsampled before inference
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            max_dimension: default_max_dimension(),
            intra_threads: default_intra_threads(),
        }
    }
}

// ==================== Default value functions ====================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./media/temp")
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_tesseract_binary() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_dpi() -> f32 {
    72.0
}

fn default_extraction_dpi() -> f32 {
    300.0
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./models/u2net.onnx")
}

fn default_max_dimension() -> u32 {
    1500
}

fn default_intra_threads() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.limits.max_upload_bytes, 104_857_600);
        assert_eq!(config.matting.max_dimension, 1500);
        assert_eq!(config.ocr.default_dpi, 72.0);
        assert_eq!(config.engines.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_configured_office_binary_wins() {
        let config = OfficeConfig {
            binary: Some(PathBuf::from("/opt/lo/soffice")),
        };
        assert_eq!(config.resolve_binary(), PathBuf::from("/opt/lo/soffice"));
    }

    #[test]
    fn test_auth_debug_is_redacted() {
        let auth = AuthConfig {
            client_key: "key-value".to_string(),
            client_secret: "secret-value".to_string(),
        };
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("key-value"));
        assert!(!debug.contains("secret-value"));
    }
}
