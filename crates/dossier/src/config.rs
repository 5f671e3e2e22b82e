//! Runtime configuration, loaded from environment variables.
//!
//! Every knob has a default except the AI credentials: a worker process
//! without an API key must refuse to start rather than fail jobs one by one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const ENV_API_KEY: &str = "DOSSIER_AI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_path: PathBuf,
    pub ai: AiConfig,
    pub queues: QueueConfig,
    pub ocr: OcrConfig,
    pub video: VideoConfig,
    pub languages: LanguageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_attempts: u32,
    pub backoff_base_secs: f64,
    /// Responses shorter than this are treated as insufficient content.
    pub min_response_chars: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub document_processing_workers: usize,
    pub user_request_workers: usize,
    pub ai_analysis_workers: usize,
    /// Lease age after which a stuck PROCESSING document is reset by the sweep.
    pub stale_lease_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub workers: usize,
    pub languages: Vec<String>,
    /// Images are downscaled so the longest edge does not exceed this.
    pub max_dimension: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub frame_interval_secs: f64,
    pub max_frames: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// ISO 639-1 code of the primary case language.
    pub primary: String,
    /// ISO 639-1 code of the secondary (translation target) language.
    pub secondary: String,
}

impl Config {
    /// Loads configuration from the environment. Only the AI API key is
    /// required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredentials {
                variable: ENV_API_KEY,
            })?;

        Ok(Self {
            database_path: std::env::var("DOSSIER_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_database_path()),
            ai: AiConfig {
                api_key,
                model: env_or("DOSSIER_AI_MODEL", "claude-sonnet-4-20250514"),
                base_url: env_or("DOSSIER_AI_BASE_URL", "https://api.anthropic.com/v1"),
                max_attempts: env_parse("DOSSIER_AI_MAX_ATTEMPTS", 3)?,
                backoff_base_secs: env_parse("DOSSIER_AI_BACKOFF_BASE_SECS", 2.0)?,
                min_response_chars: env_parse("DOSSIER_AI_MIN_RESPONSE_CHARS", 5)?,
                request_timeout_secs: env_parse("DOSSIER_AI_TIMEOUT_SECS", 120)?,
            },
            queues: QueueConfig {
                document_processing_workers: env_parse("DOSSIER_DOC_WORKERS", 2)?,
                user_request_workers: env_parse("DOSSIER_USER_WORKERS", 5)?,
                ai_analysis_workers: env_parse("DOSSIER_AI_WORKERS", 3)?,
                stale_lease_secs: env_parse("DOSSIER_STALE_LEASE_SECS", 600)?,
            },
            ocr: OcrConfig {
                workers: env_parse("DOSSIER_OCR_WORKERS", 2)?,
                languages: std::env::var("DOSSIER_OCR_LANGUAGES")
                    .map(|v| {
                        v.split('+')
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_else(|_| vec!["eng".to_string(), "ara".to_string()]),
                max_dimension: env_parse("DOSSIER_OCR_MAX_DIMENSION", 2000)?,
            },
            video: VideoConfig {
                ffmpeg_path: env_or("DOSSIER_FFMPEG_PATH", "ffmpeg"),
                ffprobe_path: env_or("DOSSIER_FFPROBE_PATH", "ffprobe"),
                frame_interval_secs: env_parse("DOSSIER_FRAME_INTERVAL_SECS", 2.0)?,
                max_frames: env_parse("DOSSIER_MAX_FRAMES", 10)?,
            },
            languages: LanguageConfig {
                primary: env_or("DOSSIER_PRIMARY_LANGUAGE", "ar"),
                secondary: env_or("DOSSIER_SECONDARY_LANGUAGE", "en"),
            },
        })
    }

    /// A configuration suitable for tests: in-memory-ish defaults, no
    /// environment access, placeholder credentials.
    pub fn for_tests(database_path: PathBuf) -> Self {
        Self {
            database_path,
            ai: AiConfig::for_tests(),
            queues: QueueConfig {
                document_processing_workers: 2,
                user_request_workers: 5,
                ai_analysis_workers: 3,
                stale_lease_secs: 600,
            },
            ocr: OcrConfig {
                workers: 2,
                languages: vec!["eng".to_string()],
                max_dimension: 2000,
            },
            video: VideoConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
                frame_interval_secs: 2.0,
                max_frames: 10,
            },
            languages: LanguageConfig {
                primary: "ar".to_string(),
                secondary: "en".to_string(),
            },
        }
    }
}

impl AiConfig {
    /// Placeholder credentials and near-zero backoff for tests.
    pub fn for_tests() -> Self {
        Self {
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            base_url: "http://localhost:0".to_string(),
            max_attempts: 3,
            backoff_base_secs: 0.01,
            min_response_chars: 5,
            request_timeout_secs: 5,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            variable: name,
            value: raw,
            reason: format!("expected a {}", std::any::type_name::<T>()),
        }),
        Err(_) => Ok(default),
    }
}

/// Returns the canonical database path: `~/.dossier/data/dossier.db`.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dossier")
        .join("data")
        .join("dossier.db")
}
