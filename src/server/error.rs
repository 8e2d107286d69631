use crate::utils::error::StitchError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Stitch(#[from] StitchError),
    #[error("Invalid authentication")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Stitch(e) => match e {
                StitchError::DomainValidation { .. } => StatusCode::BAD_REQUEST,
                StitchError::Authentication { .. } | StitchError::TokenError(_) => {
                    StatusCode::FORBIDDEN
                }
                StitchError::UnknownApplication(_) => StatusCode::NOT_FOUND,
                e if e.is_downstream() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthenticated => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// axum 預設回傳純文字；改成與其他錯誤相同的 JSON 格式
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            // 驗證失敗的細節不回傳給前端
            ApiError::Stitch(StitchError::Authentication { .. })
            | ApiError::Stitch(StitchError::TokenError(_)) => {
                ApiError::Unauthenticated.to_string()
            }
            _ => self.to_string(),
        };
        if status.is_server_error() {
            tracing::error!("❌ {} {}", status, self);
        } else {
            tracing::debug!("{} {}", status, self);
        }
        let body = Json(ErrorBody {
            code: status.as_u16(),
            detail,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Domain;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(StitchError::validation(Domain::Policy, "bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(StitchError::authentication("nope")),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(StitchError::UnknownApplication("a/b".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(StitchError::DownstreamApi {
                    app: "PSLmodels/Tax-Brain".to_string(),
                    status: Some(500),
                    message: "boom".to_string(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::from(StitchError::ConfigError {
                    message: "oops".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::Unauthenticated, StatusCode::FORBIDDEN),
            (
                ApiError::BadRequest("Invalid request body".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }

    #[test]
    fn test_validation_message_is_kept() {
        let error = ApiError::from(StitchError::validation(Domain::Behavior, "Invalid JSON"));
        assert_eq!(error.to_string(), "Invalid behavior inputs: Invalid JSON");
    }
}
