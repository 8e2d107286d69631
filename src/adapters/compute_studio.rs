use crate::domain::model::{AppId, Adjustment, CreateResponse, MetaParameters, SimulationUpdate};
use crate::domain::ports::{ClientProvider, ComputeClient};
use crate::utils::error::{Result, StitchError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_BASE_URL: &str = "https://compute.studio";

/// 等待模擬完成時的輪詢設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Compute Studio REST API 客戶端，一個實例對應一個應用程式
pub struct ComputeStudioClient {
    http: Client,
    base_url: String,
    app: AppId,
    bearer_token: Option<String>,
    polling: PollingConfig,
}

impl ComputeStudioClient {
    pub fn new(http: Client, base_url: &str, app: AppId) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app,
            bearer_token: None,
            polling: PollingConfig::default(),
        }
    }

    pub fn with_token(mut self, bearer_token: Option<&str>) -> Self {
        self.bearer_token = bearer_token.map(str::to_string);
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// `{base}/{owner}/{title}/api/v1/`
    pub fn sim_url(&self) -> String {
        format!(
            "{}/{}/{}/api/v1/",
            self.base_url, self.app.owner, self.app.title
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn error_from_response(&self, response: Response) -> StitchError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        };
        StitchError::DownstreamApi {
            app: self.app.to_string(),
            status: Some(status.as_u16()),
            message,
        }
    }

    async fn get_json(&self, url: &str) -> Result<(StatusCode, Value)> {
        tracing::debug!("📡 GET {}", url);
        let response = self.authorize(self.http.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        let status = response.status();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }

    fn timed_out(&self, what: &str, model_pk: u64) -> StitchError {
        StitchError::DownstreamApi {
            app: self.app.to_string(),
            status: None,
            message: format!(
                "Timed out after {}s waiting for {} of simulation {}",
                self.polling.timeout.as_secs(),
                what,
                model_pk
            ),
        }
    }

    /// 等待 inputs 驗證結束，INVALID 或 FAIL 視為錯誤
    async fn wait_for_valid_inputs(&self, model_pk: u64) -> Result<()> {
        let deadline = Instant::now() + self.polling.timeout;
        loop {
            let (status, data) = self.get_inputs_status(model_pk).await?;
            match status.as_str() {
                "PENDING" => {}
                "INVALID" | "FAIL" => {
                    let details = data
                        .get("errors_warnings")
                        .cloned()
                        .unwrap_or(Value::Null);
                    return Err(StitchError::DownstreamApi {
                        app: self.app.to_string(),
                        status: None,
                        message: format!("Inputs are {}: {}", status, details),
                    });
                }
                _ => return Ok(()),
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out("inputs validation", model_pk));
            }
            tokio::time::sleep(self.polling.interval).await;
        }
    }
}

fn is_running(status: StatusCode, body: &Value) -> bool {
    status == StatusCode::ACCEPTED
        || matches!(
            body.get("status").and_then(Value::as_str),
            Some("PENDING") | Some("STARTED")
        )
}

#[async_trait]
impl ComputeClient for ComputeStudioClient {
    fn app(&self) -> &AppId {
        &self.app
    }

    async fn create(
        &self,
        adjustment: &Adjustment,
        meta_parameters: &MetaParameters,
        check_is_valid: bool,
    ) -> Result<CreateResponse> {
        let url = self.sim_url();
        let payload = json!({
            "adjustment": adjustment,
            "meta_parameters": meta_parameters,
        });

        tracing::debug!("📡 POST {}", url);
        let response = self
            .authorize(self.http.post(&url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        let created: CreateResponse = response.json().await?;

        if check_is_valid {
            self.wait_for_valid_inputs(created.model_pk).await?;
        }
        Ok(created)
    }

    async fn update(&self, model_pk: u64, update: &SimulationUpdate) -> Result<()> {
        let url = format!("{}{}/", self.sim_url(), model_pk);
        tracing::debug!("📡 PUT {}", url);
        let response = self
            .authorize(self.http.put(&url))
            .json(update)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from_response(response).await);
        }
        Ok(())
    }

    async fn get_inputs_status(&self, model_pk: u64) -> Result<(String, Value)> {
        let url = format!("{}{}/edit/", self.sim_url(), model_pk);
        let (_, data) = self.get_json(&url).await?;
        let status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        Ok((status, data))
    }

    async fn detail(&self, model_pk: u64, wait: bool, include_outputs: bool) -> Result<Value> {
        let url = if include_outputs {
            format!("{}{}/", self.sim_url(), model_pk)
        } else {
            format!("{}{}/remote/", self.sim_url(), model_pk)
        };

        let deadline = Instant::now() + self.polling.timeout;
        loop {
            let (status, body) = self.get_json(&url).await?;
            if !wait || !is_running(status, &body) {
                return Ok(body);
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out("results", model_pk));
            }
            tracing::debug!("⏳ {} simulation {} is still running", self.app, model_pk);
            tokio::time::sleep(self.polling.interval).await;
        }
    }
}

/// 每個請求依使用者 token 建立客戶端，共用同一個 reqwest 連線池
#[derive(Clone)]
pub struct ComputeStudioProvider {
    http: Client,
    base_url: String,
    polling: PollingConfig,
}

impl ComputeStudioProvider {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            polling: PollingConfig::default(),
        }
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ClientProvider for ComputeStudioProvider {
    fn client(&self, app: &AppId, bearer_token: Option<&str>) -> Arc<dyn ComputeClient> {
        Arc::new(
            ComputeStudioClient::new(self.http.clone(), &self.base_url, app.clone())
                .with_token(bearer_token)
                .with_polling(self.polling),
        )
    }
}
