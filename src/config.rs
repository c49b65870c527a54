//! Service configuration, read from the environment (and `.env`) at startup.
//!
//! Nothing here is process-global: `main` builds one [`Config`] and hands the
//! relevant pieces to the gateway, context manager and router.

use std::fmt;

use thiserror::Error;

use crate::inference::LocalApi;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DEEPSEEK_API_KEY must be set when the cloud inference backend is selected")]
    MissingApiKey,

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub inference: InferenceConfig,
    pub max_history: usize,
    pub survey_retry_attempts: u32,
    pub upload: UploadConfig,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub backend: BackendSelection,
}

#[derive(Clone)]
pub enum BackendSelection {
    Local {
        base_url: String,
        model: String,
        api: LocalApi,
    },
    Cloud {
        base_url: String,
        model: String,
        api_key: String,
    },
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelection::Local {
                base_url,
                model,
                api,
            } => f
                .debug_struct("Local")
                .field("base_url", base_url)
                .field("model", model)
                .field("api", api)
                .finish(),
            BackendSelection::Cloud {
                base_url, model, ..
            } => f
                .debug_struct("Cloud")
                .field("base_url", base_url)
                .field("model", model)
                .field("api_key", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Lower-case file extensions without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
    pub max_image_dimension: u32,
}

impl UploadConfig {
    pub fn is_allowed(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: split_list("png,jpg,jpeg,gif"),
            max_bytes: 10 * 1024 * 1024,
            max_image_dimension: 512,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        let use_local = match lookup("USE_LOCAL_INFERENCE") {
            Some(raw) => parse_bool("USE_LOCAL_INFERENCE", &raw)?,
            None => false,
        };

        let backend = if use_local {
            let raw_api = env_or("LOCAL_INFERENCE_API", "chat");
            let api = LocalApi::from_label(&raw_api).ok_or(ConfigError::Invalid {
                key: "LOCAL_INFERENCE_API",
                value: raw_api,
            })?;
            BackendSelection::Local {
                base_url: env_or("INFERENCE_URL", "http://localhost:11434"),
                model: env_or("INFERENCE_MODEL", "deepseek-r1:1.5b"),
                api,
            }
        } else {
            let api_key = lookup("DEEPSEEK_API_KEY")
                .filter(|k| !k.trim().is_empty())
                .ok_or(ConfigError::MissingApiKey)?;
            BackendSelection::Cloud {
                base_url: env_or("DEEPSEEK_BASE_URL", "https://api.deepseek.com"),
                model: env_or("DEEPSEEK_MODEL", "deepseek-chat"),
                api_key,
            }
        };

        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            allowed_extensions: lookup("UPLOAD_ALLOWED_EXTENSIONS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.allowed_extensions),
            max_bytes: parse_num(&lookup, "UPLOAD_MAX_BYTES", defaults.max_bytes)?,
            max_image_dimension: parse_num(
                &lookup,
                "IMAGE_MAX_DIMENSION",
                defaults.max_image_dimension,
            )?,
        };

        Ok(Self {
            bind_address: env_or("PSYCH_BIND", "0.0.0.0:5000"),
            inference: InferenceConfig { backend },
            max_history: parse_num(&lookup, "CHAT_MAX_HISTORY", 8)?,
            survey_retry_attempts: parse_num(&lookup, "SURVEY_RETRY_ATTEMPTS", 3)?,
            upload,
            cors_origins: split_list(&env_or("CORS_ORIGINS", "http://localhost:5173")),
        })
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_owned(),
        }),
    }
}

fn parse_num<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
