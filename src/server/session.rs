use crate::domain::model::UserWithToken;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::utils::error::Result;
use axum::extract::FromRequestParts;
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// JSON 編碼的 UserWithToken
    sub: String,
    iat: i64,
    exp: i64,
}

/// 簽發與驗證 session JWT；JWT 的到期時間即 access token 的到期時間
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionManager {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, user: &UserWithToken) -> Result<String> {
        let claims = Claims {
            sub: serde_json::to_string(user)?,
            iat: Utc::now().timestamp(),
            exp: user.token.expires_at.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn decode(&self, token: &str) -> Result<UserWithToken> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(serde_json::from_str(&data.claims.sub)?)
    }
}

/// 尚未完成的 OAuth state，逾期即失效，使用一次後移除
pub struct PendingStates {
    ttl: Duration,
    states: Mutex<HashMap<String, Instant>>,
}

impl PendingStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// 產生 18 個十六進位字元的 state 並登記
    pub fn issue(&self) -> String {
        let bytes: [u8; 9] = rand::thread_rng().gen();
        let state: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

        let mut states = self.lock();
        Self::purge(&mut states);
        states.insert(state.clone(), Instant::now() + self.ttl);
        state
    }

    pub fn consume(&self, state: &str) -> bool {
        let mut states = self.lock();
        Self::purge(&mut states);
        states.remove(state).is_some()
    }

    pub fn len(&self) -> usize {
        let mut states = self.lock();
        Self::purge(&mut states);
        states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge(states: &mut HashMap<String, Instant>) {
        let now = Instant::now();
        states.retain(|_, expires_at| *expires_at > now);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // map 內容在 panic 後仍然一致，直接沿用
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 從 `Cookie` header 取出 session 值
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

pub fn set_session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// 已登入的使用者，由 session cookie 解析而來
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserWithToken);

impl CurrentUser {
    pub fn username(&self) -> &str {
        &self.0.user.username
    }

    pub fn access_token(&self) -> &str {
        &self.0.token.access_token
    }

    pub fn token_expiry(&self) -> DateTime<Utc> {
        self.0.token.expires_at
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = session_cookie(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let user = state.sessions.decode(&token).map_err(|e| {
            tracing::debug!("Rejected session cookie: {}", e);
            ApiError::Unauthenticated
        })?;
        Ok(CurrentUser(user))
    }
}
