use crate::adapters::compute_studio::DEFAULT_BASE_URL;
use crate::utils::error::{Result, StitchError};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_secret,
    validate_url, validate_url_path, Validate,
};
use regex::Regex;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const MIN_SECRET_LEN: usize = 16;

/// 服務設定，來源為環境變數（含 `.env`）或 TOML 檔案
#[derive(Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_cs_base_url")]
    pub cs_base_url: String,
    pub secret_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    #[serde(default = "default_redirect_uri_path")]
    pub redirect_uri_path: String,
    pub frontend_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_oauth_state_ttl_secs")]
    pub oauth_state_ttl_secs: u64,
    #[serde(default = "default_meta_year")]
    pub meta_year: u32,
}

fn default_cs_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_redirect_uri_path() -> String {
    "/oauth2/access/".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_oauth_state_ttl_secs() -> u64 {
    600
}

fn default_meta_year() -> u32 {
    2021
}

// secret 不輸出到日誌
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("cs_base_url", &self.cs_base_url)
            .field("secret_key", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("redirect_uri_path", &self.redirect_uri_path)
            .field("frontend_url", &self.frontend_url)
            .field("listen_addr", &self.listen_addr)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("oauth_state_ttl_secs", &self.oauth_state_ttl_secs)
            .field("meta_year", &self.meta_year)
            .finish()
    }
}

impl Settings {
    /// 先載入 `.env`（若存在），再讀取環境變數
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| StitchError::MissingConfigError {
                    field: key.to_string(),
                })
        };
        let parsed = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| StitchError::InvalidConfigValueError {
                        field: key.to_string(),
                        value: raw.clone(),
                        reason: "Expected a non-negative integer".to_string(),
                    }),
                None => Ok(default),
            }
        };

        let meta_year = parsed("META_YEAR", u64::from(default_meta_year()))?;
        let meta_year = u32::try_from(meta_year).map_err(|_| StitchError::InvalidConfigValueError {
            field: "META_YEAR".to_string(),
            value: meta_year.to_string(),
            reason: "Year is too large".to_string(),
        })?;

        Ok(Self {
            cs_base_url: lookup("CS_BASE_URL").unwrap_or_else(default_cs_base_url),
            secret_key: required("SECRET_KEY")?,
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            api_url: required("API_URL")?,
            redirect_uri_path: lookup("REDIRECT_URI_PATH").unwrap_or_else(default_redirect_uri_path),
            frontend_url: required("FRONTEND_URL")?,
            listen_addr: lookup("LISTEN_ADDR").unwrap_or_else(default_listen_addr),
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", default_request_timeout_secs())?,
            oauth_state_ttl_secs: parsed("OAUTH_STATE_TTL_SECS", default_oauth_state_ttl_secs())?,
            meta_year,
        })
    }

    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// OAuth redirect URI，`API_URL` + `REDIRECT_URI_PATH`
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.api_url.trim_end_matches('/'),
            self.redirect_uri_path
        )
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| StitchError::InvalidConfigValueError {
                field: "listen_addr".to_string(),
                value: self.listen_addr.clone(),
                reason: format!("{}", e),
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.oauth_state_ttl_secs)
    }

    /// 允許跨來源請求的前端網址，去除重複
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = vec![
            "http://localhost".to_string(),
            "http://localhost:3000".to_string(),
        ];
        let frontend = self.frontend_url.trim_end_matches('/').to_string();
        if !origins.contains(&frontend) {
            origins.push(frontend);
        }
        origins
    }

    /// API_URL 為 https 時 session cookie 加上 Secure
    pub fn secure_cookies(&self) -> bool {
        self.api_url.starts_with("https://")
    }
}

/// 替換環境變數 (例如 ${SECRET_KEY})，未設定的變數保持原樣
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| StitchError::ConfigError {
        message: format!("Invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_url("cs_base_url", &self.cs_base_url)?;
        validate_url("api_url", &self.api_url)?;
        validate_url("frontend_url", &self.frontend_url)?;
        validate_url_path("redirect_uri_path", &self.redirect_uri_path)?;

        validate_secret("secret_key", &self.secret_key, MIN_SECRET_LEN)?;
        validate_non_empty_string("client_id", &self.client_id)?;
        validate_non_empty_string("client_secret", &self.client_secret)?;

        self.listen_addr()?;
        validate_positive_number("request_timeout_secs", self.request_timeout_secs, 1)?;
        validate_positive_number("oauth_state_ttl_secs", self.oauth_state_ttl_secs, 1)?;
        validate_range("meta_year", self.meta_year, 2013, 2100)?;
        Ok(())
    }
}
