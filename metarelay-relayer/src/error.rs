//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metarelay::MetaTxError;

/// A pipeline error on its way out of a handler.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub MetaTxError);

impl ApiError {
    /// Status code the error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            MetaTxError::UnknownDeployment(_) => StatusCode::NOT_FOUND,
            MetaTxError::InvalidSignature { .. } | MetaTxError::SignerMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            MetaTxError::UserRejected => StatusCode::FORBIDDEN,
            MetaTxError::StaleNonce { .. }
            | MetaTxError::SigningInProgress { .. }
            | MetaTxError::SubmissionPending { .. } => StatusCode::CONFLICT,
            MetaTxError::Estimation { .. } | MetaTxError::RelayReverted { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MetaTxError::RpcUnavailable(_) | MetaTxError::ProviderUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MetaTxError::Rpc(_) => StatusCode::BAD_GATEWAY,
            MetaTxError::SubmissionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            MetaTxError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        let mut body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let Some(reason) = self.0.revert_reason() {
            body["reason"] = reason.into();
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_status_mapping() {
        let stale = ApiError(MetaTxError::StaleNonce {
            signed: U256::from(3),
            current: U256::from(4),
        });
        assert_eq!(stale.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError(MetaTxError::SubmissionPending {
                tx_hash: alloy_primitives::TxHash::ZERO
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(MetaTxError::UnknownDeployment("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(MetaTxError::RpcUnavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_body_carries_kind_and_reason() {
        let response = ApiError(MetaTxError::RelayReverted {
            tx_hash: None,
            reason: Some("Registry: name taken".into()),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "relay_reverted");
        assert_eq!(body["reason"], "Registry: name taken");
    }
}
