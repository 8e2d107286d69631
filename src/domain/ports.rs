use crate::domain::model::{
    Adjustment, AppId, CreateResponse, MetaParameters, SimulationUpdate,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// 單一 Compute Studio 應用程式的客戶端
#[async_trait]
pub trait ComputeClient: Send + Sync {
    fn app(&self) -> &AppId;

    async fn create(
        &self,
        adjustment: &Adjustment,
        meta_parameters: &MetaParameters,
        check_is_valid: bool,
    ) -> Result<CreateResponse>;

    async fn update(&self, model_pk: u64, update: &SimulationUpdate) -> Result<()>;

    /// 回傳 (status, 原始資料)
    async fn get_inputs_status(&self, model_pk: u64) -> Result<(String, Value)>;

    async fn detail(&self, model_pk: u64, wait: bool, include_outputs: bool) -> Result<Value>;
}

/// 依應用程式與使用者 token 建立客戶端
pub trait ClientProvider: Send + Sync {
    fn client(&self, app: &AppId, bearer_token: Option<&str>) -> Arc<dyn ComputeClient>;
}
