use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::SequenceFormat;
use crate::error::RetrieverError;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_DELAY_SECONDS: f64 = 0.5;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 30.0;
pub const DEFAULT_MAX_RETRIES: usize = 2;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub input_file_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub delay_between_requests: Option<f64>,
    #[serde(default)]
    pub download_genbank: Option<bool>,
    #[serde(default)]
    pub download_fasta: Option<bool>,
    #[serde(default)]
    pub request_timeout: Option<f64>,
    #[serde(default)]
    pub max_retries: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub email: String,
    pub input_file_path: Utf8PathBuf,
    pub output_path: Utf8PathBuf,
    pub batch_size: usize,
    pub delay: Duration,
    pub formats: Vec<SequenceFormat>,
    pub request_timeout: Duration,
    pub max_retries: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Utf8Path>) -> Result<ResolvedConfig, RetrieverError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        if !config_path.exists() {
            return Err(RetrieverError::ConfigNotFound(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RetrieverError::ConfigRead(config_path.clone()))?;
        let config: RetrieverConfig = serde_yaml::from_str(&content)
            .map_err(|err| RetrieverError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: RetrieverConfig) -> Result<ResolvedConfig, RetrieverError> {
        let email = match config.email {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => {
                return Err(RetrieverError::MissingConfigKey {
                    key: "email",
                    example: "you@university.edu",
                });
            }
        };
        if !email.contains('@') {
            return Err(RetrieverError::InvalidConfigValue {
                key: "email",
                reason: format!("`{email}` is not an email address"),
            });
        }

        let input_file_path = match config.input_file_path {
            Some(value) if !value.trim().is_empty() => Utf8PathBuf::from(value.trim()),
            _ => {
                return Err(RetrieverError::MissingConfigKey {
                    key: "input_file_path",
                    example: "accessions.txt",
                });
            }
        };

        let output_path = config
            .output_path
            .filter(|value| !value.trim().is_empty())
            .map(|value| Utf8PathBuf::from(value.trim()))
            .unwrap_or_else(|| Utf8PathBuf::from("downloads"));

        let batch_size = match config.batch_size {
            None => DEFAULT_BATCH_SIZE,
            Some(value) if value >= 1 => value as usize,
            Some(value) => {
                return Err(RetrieverError::InvalidConfigValue {
                    key: "batch_size",
                    reason: format!("must be at least 1, got {value}"),
                });
            }
        };

        let delay = resolve_seconds(
            "delay_between_requests",
            config.delay_between_requests,
            DEFAULT_DELAY_SECONDS,
            true,
        )?;
        let request_timeout = resolve_seconds(
            "request_timeout",
            config.request_timeout,
            DEFAULT_TIMEOUT_SECONDS,
            false,
        )?;

        let max_retries = match config.max_retries {
            None => DEFAULT_MAX_RETRIES,
            Some(value) if value >= 0 => value as usize,
            Some(value) => {
                return Err(RetrieverError::InvalidConfigValue {
                    key: "max_retries",
                    reason: format!("must not be negative, got {value}"),
                });
            }
        };

        let mut formats = Vec::new();
        if config.download_genbank.unwrap_or(true) {
            formats.push(SequenceFormat::Genbank);
        }
        if config.download_fasta.unwrap_or(true) {
            formats.push(SequenceFormat::Fasta);
        }
        if formats.is_empty() {
            return Err(RetrieverError::NoFormatsEnabled);
        }

        Ok(ResolvedConfig {
            email,
            input_file_path,
            output_path,
            batch_size,
            delay,
            formats,
            request_timeout,
            max_retries,
        })
    }
}

fn resolve_seconds(
    key: &'static str,
    value: Option<f64>,
    default: f64,
    allow_zero: bool,
) -> Result<Duration, RetrieverError> {
    let seconds = value.unwrap_or(default);
    let in_range = seconds.is_finite() && (seconds > 0.0 || (allow_zero && seconds == 0.0));
    if !in_range {
        let bound = if allow_zero { "non-negative" } else { "positive" };
        return Err(RetrieverError::InvalidConfigValue {
            key,
            reason: format!("must be a {bound} number of seconds, got {seconds}"),
        });
    }
    Ok(Duration::from_secs_f64(seconds))
}
