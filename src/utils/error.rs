use crate::domain::model::Domain;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Invalid {domain} inputs: {message}")]
    DomainValidation { domain: Domain, message: String },

    #[error("Compute Studio API error for {app}: {message}")]
    DownstreamApi {
        app: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Session token error: {0}")]
    TokenError(#[from] jsonwebtoken::errors::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

impl StitchError {
    pub fn validation(domain: Domain, message: impl Into<String>) -> Self {
        StitchError::DomainValidation {
            domain,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        StitchError::Authentication {
            message: message.into(),
        }
    }

    /// 是否為下游 API 造成的錯誤（fan-out 時只記錄，不中斷）
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            StitchError::DownstreamApi { .. } | StitchError::ApiError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StitchError>;
