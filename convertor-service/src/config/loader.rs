//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::engines::ocr::is_valid_language;
use crate::error::StartupError;

use super::ServiceConfig;

/// Rendering resolutions accepted for OCR
const DPI_RANGE: std::ops::RangeInclusive<f32> = 1.0..=1200.0;

/// Load configuration from `config.*` (optional) and `CONVERTOR__*` env vars
pub fn load_config() -> Result<ServiceConfig, StartupError> {
    let config: ServiceConfig = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("CONVERTOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_allowed_origins")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| StartupError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| StartupError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &ServiceConfig) -> Result<(), StartupError> {
    if config.auth.client_key.is_empty() || config.auth.client_secret.is_empty() {
        return Err(StartupError::Config {
            message: "auth.client_key and auth.client_secret must be set".to_string(),
        });
    }
    if config.engines.max_concurrent == 0 {
        return Err(StartupError::Config {
            message: "engines.max_concurrent must be at least 1".to_string(),
        });
    }
    if !is_valid_language(&config.ocr.language) {
        return Err(StartupError::Config {
            message: format!("ocr.language '{}' is not a valid language code", config.ocr.language),
        });
    }
    for (key, dpi) in [
        ("ocr.default_dpi", config.ocr.default_dpi),
        ("ocr.extraction_dpi", config.ocr.extraction_dpi),
    ] {
        if !DPI_RANGE.contains(&dpi) {
            return Err(StartupError::Config {
                message: format!(
                    "{} must be between {} and {}, got {}",
                    key,
                    DPI_RANGE.start(),
                    DPI_RANGE.end(),
                    dpi
                ),
            });
        }
    }
    if config.matting.max_dimension == 0 {
        return Err(StartupError::Config {
            message: "matting.max_dimension must be at least 1".to_string(),
        });
    }
    Ok(())
}
