use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 單一領域的 paramtools 格式參數
pub type ParamBlock = Map<String, Value>;

/// 參數領域，宣告順序即處理順序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Policy,
    Taxcrunch,
    Ccc,
    Behavior,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Policy,
        Domain::Taxcrunch,
        Domain::Ccc,
        Domain::Behavior,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Policy => "policy",
            Domain::Taxcrunch => "taxcrunch",
            Domain::Ccc => "ccc",
            Domain::Behavior => "behavior",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 前端送來的原始參數，每個欄位是 JSON 字串或 JSON 檔案路徑
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawParamSet {
    #[serde(default)]
    pub policy_params: Option<String>,
    #[serde(default)]
    pub taxcrunch_params: Option<String>,
    #[serde(default)]
    pub ccc_params: Option<String>,
    #[serde(default)]
    pub behavior_params: Option<String>,
}

impl RawParamSet {
    pub fn get(&self, domain: Domain) -> Option<&str> {
        let value = match domain {
            Domain::Policy => &self.policy_params,
            Domain::Taxcrunch => &self.taxcrunch_params,
            Domain::Ccc => &self.ccc_params,
            Domain::Behavior => &self.behavior_params,
        };
        value.as_deref()
    }

    pub fn set(&mut self, domain: Domain, value: Option<String>) {
        match domain {
            Domain::Policy => self.policy_params = value,
            Domain::Taxcrunch => self.taxcrunch_params = value,
            Domain::Ccc => self.ccc_params = value,
            Domain::Behavior => self.behavior_params = value,
        }
    }
}

/// 驗證過的參數，四個領域都一定存在（空輸入為 `{}`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedParamSet {
    pub policy: ParamBlock,
    pub taxcrunch: ParamBlock,
    pub ccc: ParamBlock,
    pub behavior: ParamBlock,
}

impl NormalizedParamSet {
    pub fn get(&self, domain: Domain) -> &ParamBlock {
        match domain {
            Domain::Policy => &self.policy,
            Domain::Taxcrunch => &self.taxcrunch,
            Domain::Ccc => &self.ccc,
            Domain::Behavior => &self.behavior,
        }
    }

    pub fn set(&mut self, domain: Domain, block: ParamBlock) {
        match domain {
            Domain::Policy => self.policy = block,
            Domain::Taxcrunch => self.taxcrunch = block,
            Domain::Ccc => self.ccc = block,
            Domain::Behavior => self.behavior = block,
        }
    }

    /// 轉回原始格式，可再次送進 normalizer
    pub fn to_raw(&self) -> RawParamSet {
        let mut raw = RawParamSet::default();
        for domain in Domain::ALL {
            let block = self.get(domain);
            raw.set(domain, Some(Value::Object(block.clone()).to_string()));
        }
        raw
    }
}

/// Compute Studio 上的應用程式，例如 `PSLmodels/Tax-Brain`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AppId {
    pub owner: String,
    pub title: String,
}

impl AppId {
    pub fn new(owner: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.title)
    }
}

impl FromStr for AppId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, title))
                if !owner.is_empty() && !title.is_empty() && !title.contains('/') =>
            {
                Ok(AppId::new(owner, title))
            }
            _ => Err(format!("expected 'owner/title', got '{}'", s)),
        }
    }
}

impl From<AppId> for String {
    fn from(app: AppId) -> Self {
        app.to_string()
    }
}

impl TryFrom<String> for AppId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 送往單一應用程式的 adjustment（group label → 參數）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Adjustment(pub ParamBlock);

impl Adjustment {
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.0.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaParameters {
    pub year: u32,
}

impl Default for MetaParameters {
    fn default() -> Self {
        Self { year: 2021 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub owner: String,
    pub title: String,
}

/// create 呼叫成功後 Compute Studio 回傳的內容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub model_pk: u64,
    pub status: String,
    pub gui_url: String,
    pub project: ProjectRef,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsStatus {
    pub status: String,
    pub detail: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSimulation {
    pub app: AppId,
    pub model_pk: u64,
    pub status: String,
    pub gui_url: String,
    pub project: ProjectRef,
    pub ready: bool,
    /// 後續的「設為公開」呼叫是否成功
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,
}

impl CreatedSimulation {
    pub fn from_response(app: AppId, response: CreateResponse) -> Self {
        Self {
            app,
            model_pk: response.model_pk,
            status: response.status,
            gui_url: response.gui_url,
            project: response.project,
            ready: false,
            is_public: false,
            outputs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSimulation {
    pub app: AppId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationResult {
    Created(CreatedSimulation),
    Failed(FailedSimulation),
}

impl SimulationResult {
    pub fn app(&self) -> &AppId {
        match self {
            SimulationResult::Created(sim) => &sim.app,
            SimulationResult::Failed(failure) => &failure.app,
        }
    }
}

/// fan-out 結果：成功與失敗分開收集，皆依應用程式宣告順序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StitchOutcome {
    pub created: Vec<CreatedSimulation>,
    pub failed: Vec<FailedSimulation>,
}

impl StitchOutcome {
    pub fn from_results(results: impl IntoIterator<Item = SimulationResult>) -> Self {
        let mut outcome = StitchOutcome::default();
        for result in results {
            match result {
                SimulationResult::Created(sim) => outcome.created.push(sim),
                SimulationResult::Failed(failure) => outcome.failed.push(failure),
            }
        }
        outcome
    }

    pub fn created_for(&self, app: &AppId) -> Option<&CreatedSimulation> {
        self.created.iter().find(|sim| &sim.app == app)
    }

    pub fn failed_for(&self, app: &AppId) -> Option<&FailedSimulation> {
        self.failed.iter().find(|failure| &failure.app == app)
    }

    pub fn into_responses(self, cs_base_url: &str) -> Vec<AppResponse> {
        let base = cs_base_url.trim_end_matches('/');
        let mut responses: Vec<AppResponse> = self
            .created
            .iter()
            .map(|sim| AppResponse::from_created(sim, base))
            .collect();
        responses.extend(self.failed.iter().map(AppResponse::from_failed));
        responses
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppException {
    pub owner: String,
    pub title: String,
    pub msg: String,
}

/// `/create/` 回傳給前端的單筆結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppResponse {
    pub model_pk: Option<u64>,
    pub status: String,
    pub ready: bool,
    pub project: String,
    pub url: Option<String>,
    pub exception: Option<AppException>,
}

impl AppResponse {
    pub fn from_created(sim: &CreatedSimulation, cs_base_url: &str) -> Self {
        Self {
            model_pk: Some(sim.model_pk),
            status: sim.status.clone(),
            ready: sim.ready,
            project: format!("{}/{}", sim.project.owner, sim.project.title),
            url: Some(format!("{}{}", cs_base_url, sim.gui_url)),
            exception: None,
        }
    }

    pub fn from_failed(failure: &FailedSimulation) -> Self {
        Self {
            model_pk: None,
            status: "INVALID".to_string(),
            ready: true,
            project: failure.app.to_string(),
            url: None,
            exception: Some(AppException {
                owner: failure.app.owner.clone(),
                title: failure.app.title.clone(),
                msg: failure.message.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OauthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithToken {
    #[serde(flatten)]
    pub user: User,
    pub token: OauthToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_id_parse_and_display() {
        let app: AppId = "PSLmodels/Tax-Brain".parse().unwrap();
        assert_eq!(app.owner, "PSLmodels");
        assert_eq!(app.title, "Tax-Brain");
        assert_eq!(app.to_string(), "PSLmodels/Tax-Brain");

        assert!("Tax-Brain".parse::<AppId>().is_err());
        assert!("/Tax-Brain".parse::<AppId>().is_err());
        assert!("a/b/c".parse::<AppId>().is_err());
    }

    #[test]
    fn test_app_id_serializes_as_string() {
        let app = AppId::new("PSLmodels", "Tax-Cruncher");
        assert_eq!(serde_json::to_value(&app).unwrap(), json!("PSLmodels/Tax-Cruncher"));
        let back: AppId = serde_json::from_value(json!("PSLmodels/Tax-Cruncher")).unwrap();
        assert_eq!(back, app);
    }

    #[test]
    fn test_raw_param_set_accepts_missing_fields() {
        let raw: RawParamSet =
            serde_json::from_value(json!({"policy_params": "{}", "ccc_params": null})).unwrap();
        assert_eq!(raw.get(Domain::Policy), Some("{}"));
        assert_eq!(raw.get(Domain::Ccc), None);
        assert_eq!(raw.get(Domain::Behavior), None);
    }

    #[test]
    fn test_create_response_keeps_extra_fields() {
        let response: CreateResponse = serde_json::from_value(json!({
            "model_pk": 7,
            "status": "PENDING",
            "gui_url": "/PSLmodels/Tax-Brain/7/",
            "project": {"owner": "PSLmodels", "title": "Tax-Brain"},
            "api_url": "/PSLmodels/Tax-Brain/api/v1/7/"
        }))
        .unwrap();
        assert_eq!(response.model_pk, 7);
        assert_eq!(response.extra.get("api_url"), Some(&json!("/PSLmodels/Tax-Brain/api/v1/7/")));
    }

    #[test]
    fn test_outcome_into_responses_orders_created_first() {
        let app_a = AppId::new("PSLmodels", "Tax-Brain");
        let app_b = AppId::new("PSLmodels", "Tax-Cruncher");
        let outcome = StitchOutcome::from_results(vec![
            SimulationResult::Failed(FailedSimulation {
                app: app_b.clone(),
                message: "bad inputs".to_string(),
            }),
            SimulationResult::Created(CreatedSimulation {
                app: app_a.clone(),
                model_pk: 3,
                status: "PENDING".to_string(),
                gui_url: "/PSLmodels/Tax-Brain/3/".to_string(),
                project: ProjectRef {
                    owner: "PSLmodels".to_string(),
                    title: "Tax-Brain".to_string(),
                },
                ready: false,
                is_public: true,
                outputs: None,
            }),
        ]);

        assert!(outcome.created_for(&app_a).is_some());
        assert!(outcome.failed_for(&app_b).is_some());

        let responses = outcome.into_responses("https://compute.studio/");
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0].url.as_deref(),
            Some("https://compute.studio/PSLmodels/Tax-Brain/3/")
        );
        assert!(!responses[0].ready);
        assert_eq!(responses[1].status, "INVALID");
        assert!(responses[1].ready);
        assert_eq!(responses[1].exception.as_ref().unwrap().msg, "bad inputs");
    }

    #[test]
    fn test_user_with_token_flattens_user() {
        let value = json!({
            "username": "hdoupe",
            "status": "profile",
            "token": {
                "access_token": "abc",
                "refresh_token": "def",
                "expires_at": "2026-01-01T00:00:00Z"
            }
        });
        let user: UserWithToken = serde_json::from_value(value).unwrap();
        assert_eq!(user.user.username, "hdoupe");
        assert_eq!(user.token.access_token, "abc");
    }
}
