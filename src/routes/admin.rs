use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{
    auth::AdminAuth,
    utils::{validate_admin_token, LedgerJson},
};
use crate::db::{FeeConfiguration, FeeType};
use crate::ledger::GiftCardLedger;

#[derive(Debug, Deserialize)]
pub struct SaveFee {
    pub id: Option<Uuid>,
    pub fee_type: FeeType,
    pub fee_name: String,
    pub fee_amount: Decimal,
    #[serde(default)]
    pub is_percentage: bool,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

type AdminState = State<(GiftCardLedger, Arc<AdminAuth>)>;

fn authorize(headers: &HeaderMap, auth: &AdminAuth) -> Result<Uuid, Response> {
    match validate_admin_token(headers, auth) {
        Ok(admin) => Ok(admin),
        Err(status) => {
            tracing::warn!("Rejected admin request without a valid token");
            Err((status, "Invalid token").into_response())
        }
    }
}

async fn list_fees(headers: HeaderMap, State((ledger, auth)): AdminState) -> Response {
    if let Err(rejection) = authorize(&headers, &auth) {
        return rejection;
    }
    match ledger.list_fees().await {
        Ok(fees) => Json(fees).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn save_fee(
    headers: HeaderMap,
    State((ledger, auth)): AdminState,
    LedgerJson(payload): LedgerJson<SaveFee>,
) -> Response {
    let admin = match authorize(&headers, &auth) {
        Ok(admin) => admin,
        Err(rejection) => return rejection,
    };

    let fee = FeeConfiguration {
        id: payload.id.unwrap_or_else(Uuid::new_v4),
        fee_type: payload.fee_type,
        fee_name: payload.fee_name,
        fee_amount: payload.fee_amount,
        is_percentage: payload.is_percentage,
        min_amount: payload.min_amount,
        max_amount: payload.max_amount,
        is_active: payload.is_active,
    };
    match ledger.save_fee(fee).await {
        Ok(saved) => {
            tracing::info!("Fee {} updated by admin: {admin}", saved.id);
            (StatusCode::OK, Json(saved)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn set_active(headers: HeaderMap, ledger: GiftCardLedger, auth: &AdminAuth, code: &str, active: bool) -> Response {
    let admin = match authorize(&headers, auth) {
        Ok(admin) => admin,
        Err(rejection) => return rejection,
    };
    match ledger.set_card_active(code, active).await {
        Ok(card) => {
            tracing::info!("Card {} set active={active} by admin: {admin}", card.id);
            Json(card).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn deactivate_card(headers: HeaderMap, State((ledger, auth)): AdminState, Path(code): Path<String>) -> Response {
    set_active(headers, ledger, &auth, &code, false).await
}

async fn activate_card(headers: HeaderMap, State((ledger, auth)): AdminState, Path(code): Path<String>) -> Response {
    set_active(headers, ledger, &auth, &code, true).await
}

pub fn admin_routes(ledger: GiftCardLedger, auth: Arc<AdminAuth>) -> Router {
    Router::new()
        .route("/admin/fees", get(list_fees).put(save_fee))
        .route("/admin/cards/:code/deactivate", post(deactivate_card))
        .route("/admin/cards/:code/activate", post(activate_card))
        .with_state((ledger, auth))
}
