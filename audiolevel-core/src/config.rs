//! Application configuration
//!
//! AudioLevel has no multi-tier database/TOML configuration — every knob
//! named in the environment surface is a single environment variable with
//! a compiled default, resolved once at startup.

use audiolevel_common::config::{env_list, env_or};
use std::path::PathBuf;

/// Resolved application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub redis_url: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub media_toolchain_path: String,
    pub max_file_size: u64,
    pub file_retention_minutes: u64,
    pub max_concurrent_jobs: usize,
    pub processing_timeout_ms: u64,
    pub final_encode_timeout_ms: u64,
    pub app_env: String,
    pub cors_origins: Vec<String>,
    pub quality_model_path: Option<PathBuf>,
    pub quality_model_weights: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 3000),
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379".to_string()),
            upload_dir: env_or("UPLOAD_DIR", "./uploads".to_string()).into(),
            output_dir: env_or("OUTPUT_DIR", "./output".to_string()).into(),
            scratch_dir: env_or("SCRATCH_DIR", "./scratch".to_string()).into(),
            media_toolchain_path: env_or("MEDIA_TOOLCHAIN_PATH", "ffmpeg".to_string()),
            max_file_size: env_or("MAX_FILE_SIZE", 100 * 1024 * 1024),
            file_retention_minutes: env_or("FILE_RETENTION_MINUTES", 15),
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", 4),
            processing_timeout_ms: env_or("PROCESSING_TIMEOUT_MS", 5 * 60 * 1000),
            final_encode_timeout_ms: env_or("FINAL_ENCODE_TIMEOUT_MS", 60 * 60 * 1000),
            app_env: env_or("APP_ENV", "production".to_string()),
            cors_origins: env_list("CORS_ORIGINS", &[]),
            quality_model_path: std::env::var("QUALITY_MODEL_PATH").ok().map(PathBuf::from),
            quality_model_weights: std::env::var("QUALITY_MODEL_WEIGHTS")
                .ok()
                .map(PathBuf::from),
        }
    }

    pub fn is_pretty_logging(&self) -> bool {
        self.app_env != "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_when_unset() {
        for key in [
            "PORT",
            "REDIS_URL",
            "UPLOAD_DIR",
            "OUTPUT_DIR",
            "MAX_FILE_SIZE",
            "FILE_RETENTION_MINUTES",
            "MAX_CONCURRENT_JOBS",
            "PROCESSING_TIMEOUT_MS",
            "APP_ENV",
            "CORS_ORIGINS",
        ] {
            std::env::remove_var(key);
        }
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.max_concurrent_jobs, 4);
        assert_eq!(cfg.file_retention_minutes, 15);
        assert!(cfg.is_pretty_logging());
    }

    #[test]
    #[serial]
    fn overrides_take_effect() {
        std::env::set_var("PORT", "8080");
        std::env::set_var("APP_ENV", "production");
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.is_pretty_logging());
        std::env::remove_var("PORT");
        std::env::remove_var("APP_ENV");
    }
}
