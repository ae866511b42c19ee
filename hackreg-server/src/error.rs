//! API error type with IntoResponse
//!
//! Data layer failures keep their classification: the status comes from
//! [`ErrorKind::status`] and the body names the kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hackreg_core::{DataError, ErrorKind};
use serde_json::json;

use crate::models::ValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request body or parameters failed validation (400)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Anything from the data layer, including authorization denials
    #[error(transparent)]
    Data(#[from] DataError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Data(e) => StatusCode::from_u16(e.kind().status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(e) => json!({
                "error": "validation_error",
                "message": e.to_string()
            }),
            Self::Data(e) => {
                let kind = e.kind();
                let message = if kind.is_server_fault() {
                    // Log the actual error, return the generic message
                    tracing::error!(kind = %kind, error = %e, "data layer failure");
                    kind.message().to_owned()
                } else if kind == ErrorKind::Unauthorized {
                    kind.message().to_owned()
                } else {
                    e.to_string()
                };
                json!({
                    "error": kind.slug(),
                    "message": message
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use hackreg_core::{NativeError, Operation, Role};
    use serde_json::Value;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_is_400() {
        let err = ApiError::from(ValidationError::Empty { field: "email" });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let response = ApiError::from(DataError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_of(response).await;
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "no data was found for this query");
    }

    #[tokio::test]
    async fn unauthorized_is_403() {
        let err = DataError::Unauthorized {
            entity: "pre-registration".into(),
            operation: Operation::ReadAll,
            role: Role::Participant,
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_of(response).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn unsupported_is_501() {
        let err = DataError::unsupported("hackathon", Operation::Delete);
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            body_of(response).await["message"],
            "delete is not supported for hackathon"
        );
    }

    #[tokio::test]
    async fn duplicate_key_is_409() {
        let err = hackreg_core::error::translate(NativeError::sql_state(
            "23505",
            "duplicate key value violates unique constraint",
        ));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(response).await["error"], "duplicate_key");
    }

    #[tokio::test]
    async fn server_faults_hide_native_text() {
        let err = DataError::Unclassified(NativeError::errno(1205, "Lock wait timeout on table secrets"));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"], "unclassified");
        assert_eq!(body["message"], "an unexpected storage error occurred");
    }
}
