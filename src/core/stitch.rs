use crate::core::mappings::{self, AppMapping, APPLICATIONS};
use crate::core::normalizer;
use crate::domain::model::{
    AppId, CreatedSimulation, FailedSimulation, InputsStatus, MetaParameters, NormalizedParamSet,
    RawParamSet, SimulationResult, SimulationUpdate, StitchOutcome,
};
use crate::domain::ports::{ClientProvider, ComputeClient};
use crate::utils::error::{Result, StitchError};
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const STITCH_TITLE: &str = "Created as a stitch";

/// 把一組參數拆給三個應用程式並收集各自的結果
pub struct StitchEngine<P: ClientProvider> {
    provider: P,
    meta_parameters: MetaParameters,
}

impl<P: ClientProvider> StitchEngine<P> {
    pub fn new(provider: P, meta_parameters: MetaParameters) -> Self {
        Self {
            provider,
            meta_parameters,
        }
    }

    pub fn meta_parameters(&self) -> &MetaParameters {
        &self.meta_parameters
    }

    /// 參數驗證失敗會直接回傳錯誤；下游失敗只會記錄在結果中
    pub async fn create_simulations(
        &self,
        raw: &RawParamSet,
        bearer_token: Option<&str>,
    ) -> Result<StitchOutcome> {
        let params = normalizer::normalize(raw)?;
        Ok(self.fan_out(&params, bearer_token).await)
    }

    pub async fn fan_out(
        &self,
        params: &NormalizedParamSet,
        bearer_token: Option<&str>,
    ) -> StitchOutcome {
        let creates = APPLICATIONS
            .iter()
            .map(|mapping| self.create_one(mapping, params, bearer_token));
        // join_all 保留輸入順序，與完成順序無關
        let results = join_all(creates).await;

        let outcome = StitchOutcome::from_results(results);
        tracing::info!(
            "📊 Stitch finished: {} created, {} failed",
            outcome.created.len(),
            outcome.failed.len()
        );
        outcome
    }

    async fn create_one(
        &self,
        mapping: &AppMapping,
        params: &NormalizedParamSet,
        bearer_token: Option<&str>,
    ) -> SimulationResult {
        let app = mapping.app_id();
        let adjustment = mapping.build_adjustment(params);
        let client = self.provider.client(&app, bearer_token);

        tracing::info!("🚀 Creating simulation for {}", app);
        let response = match client
            .create(&adjustment, &self.meta_parameters, false)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("❌ Error creating simulation for {}: {}", app, e);
                return SimulationResult::Failed(FailedSimulation {
                    app,
                    message: e.to_string(),
                });
            }
        };

        tracing::info!(
            "✅ Created simulation {} for {}",
            response.model_pk,
            app
        );
        let mut created = CreatedSimulation::from_response(app, response);
        created.is_public = self.publish(client.as_ref(), &created).await;
        SimulationResult::Created(created)
    }

    /// 設為公開並加上標題；失敗只記錄警告，不影響已建立的模擬
    async fn publish(&self, client: &dyn ComputeClient, created: &CreatedSimulation) -> bool {
        let update = SimulationUpdate {
            title: Some(STITCH_TITLE.to_string()),
            is_public: Some(true),
        };
        match client.update(created.model_pk, &update).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "⚠️ Simulation {} for {} was created but could not be made public: {}",
                    created.model_pk,
                    created.app,
                    e
                );
                false
            }
        }
    }

    fn client_for(&self, app: &AppId, bearer_token: Option<&str>) -> Result<Arc<dyn ComputeClient>> {
        if mappings::find(app).is_none() {
            return Err(StitchError::UnknownApplication(app.to_string()));
        }
        Ok(self.provider.client(app, bearer_token))
    }

    pub async fn get_inputs(
        &self,
        app: &AppId,
        model_pk: u64,
        bearer_token: Option<&str>,
    ) -> Result<InputsStatus> {
        let client = self.client_for(app, bearer_token)?;
        let (status, detail) = client.get_inputs_status(model_pk).await?;
        Ok(InputsStatus { status, detail })
    }

    pub async fn get_sim(
        &self,
        app: &AppId,
        model_pk: u64,
        bearer_token: Option<&str>,
    ) -> Result<Value> {
        let client = self.client_for(app, bearer_token)?;
        client.detail(model_pk, false, false).await
    }

    /// 重新查詢每個模擬的狀態，SUCCESS 即為 ready。
    /// 只有未知的 app 會回傳錯誤
    pub async fn update_ready(
        &self,
        simulations: &mut [CreatedSimulation],
        bearer_token: Option<&str>,
    ) -> Result<()> {
        let refreshes = simulations.iter_mut().map(|sim| async move {
            let client = self.client_for(&sim.app, bearer_token)?;
            // 單一 app 查詢失敗時保留上次的狀態，下一輪再查
            match client.detail(sim.model_pk, false, false).await {
                Ok(detail) => {
                    sim.status = status_of(&detail);
                    sim.ready = sim.status == "SUCCESS";
                    tracing::debug!("🔍 {} simulation {}: {}", sim.app, sim.model_pk, sim.status);
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Could not refresh {} simulation {}: {}",
                        sim.app,
                        sim.model_pk,
                        e
                    );
                }
            }
            Ok::<(), StitchError>(())
        });
        join_all(refreshes).await.into_iter().collect()
    }

    pub fn is_ready(simulations: &[CreatedSimulation]) -> BTreeMap<String, bool> {
        simulations
            .iter()
            .map(|sim| (sim.app.to_string(), sim.ready))
            .collect()
    }

    /// 取回輸出結果，只有 SUCCESS 的模擬才會帶 outputs
    pub async fn update_results(
        &self,
        simulations: &mut [CreatedSimulation],
        bearer_token: Option<&str>,
    ) -> Result<()> {
        let fetches = simulations.iter_mut().map(|sim| async move {
            let client = self.client_for(&sim.app, bearer_token)?;
            let mut detail = client.detail(sim.model_pk, false, true).await?;
            sim.status = status_of(&detail);
            if sim.status == "SUCCESS" {
                sim.ready = true;
                sim.outputs = detail.get_mut("outputs").map(Value::take);
            }
            Ok::<(), StitchError>(())
        });
        join_all(fetches).await.into_iter().collect()
    }
}

fn status_of(detail: &Value) -> String {
    detail
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string()
}
