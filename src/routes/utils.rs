use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::auth::AdminAuth;
use crate::error::LedgerError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidAmount { .. }
        | LedgerError::UnknownDesign(_)
        | LedgerError::InvalidMetadata(_) => StatusCode::BAD_REQUEST,
        LedgerError::CardNotFound
        | LedgerError::TransactionNotFound(_)
        | LedgerError::ReceiptNotFound => StatusCode::NOT_FOUND,
        LedgerError::CardInactive | LedgerError::IdempotencyConflict(_) => StatusCode::CONFLICT,
        LedgerError::InsufficientBalance { .. } | LedgerError::RefundExceedsRedemption { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::CodeGenerationExhausted { .. }
        | LedgerError::IssuanceFailed(_)
        | LedgerError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let retryable = self.is_retryable();
        // infrastructure details stay in the log
        let message = if retryable {
            tracing::error!("Request failed: {self}");
            "temporarily unable to complete the request, please retry".to_string()
        } else {
            self.to_string()
        };
        let body = Json(ErrorBody {
            error: self.kind(),
            message,
            retryable,
        });
        if retryable {
            (status, [(header::RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Response for a body or query string that could not be decoded.
pub fn malformed_request(status: StatusCode, message: String) -> Response {
    tracing::info!("Malformed request rejected: {message}");
    let body = Json(ErrorBody {
        error: "malformed_request",
        message,
        retryable: false,
    });
    (status, body).into_response()
}

/// `Json` whose rejections use the same error body as ledger failures.
pub struct LedgerJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for LedgerJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(malformed_request(rejection.status(), rejection.body_text())),
        }
    }
}

/// `Query` counterpart of [`LedgerJson`].
pub struct LedgerQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for LedgerQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(malformed_request(rejection.status(), rejection.body_text())),
        }
    }
}

#[inline]
pub fn validate_admin_token(headers: &HeaderMap, auth: &AdminAuth) -> Result<Uuid, StatusCode> {
    let jwt_header_token = match headers.get(header::AUTHORIZATION).map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    //validate our token
    match auth.verify_admin(jwt_header_token) {
        Some(user) => Ok(user),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn business_failures_are_not_server_errors() {
        let insufficient = LedgerError::InsufficientBalance {
            requested: Decimal::TEN,
            available: Decimal::ONE,
        };
        assert_eq!(status_for(&insufficient), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(&LedgerError::CardNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&LedgerError::CardInactive), StatusCode::CONFLICT);
    }

    #[test]
    fn faults_ask_for_retry() {
        let response = LedgerError::IssuanceFailed("pool closed".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }
}
