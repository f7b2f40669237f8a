use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{sse::Event, IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::utils::{LedgerJson, LedgerQuery};
use crate::db::CardDesign;
use crate::error::LedgerError;
use crate::ledger::{AmountRequest, FeeBreakdown, GiftCardLedger, IssueCardRequest, RefundRequest};

#[derive(Debug, Serialize)]
pub struct IssueCardResponse {
    pub code: String,
    pub initial_amount: Decimal,
    pub design: CardDesign,
    pub fee: FeeBreakdown,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub design: String,
    pub amount: Decimal,
    // comma separated
    pub add_ons: Option<String>,
}

async fn issue_card(
    State(ledger): State<GiftCardLedger>,
    LedgerJson(req): LedgerJson<IssueCardRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    tracing::info!("Starting card issuance for design: {}", req.design);

    let issued = ledger.issue_card(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(IssueCardResponse {
            code: issued.card.code,
            initial_amount: issued.card.initial_amount,
            design: issued.card.design,
            fee: issued.fee,
            receipt_url: issued.receipt_url,
        }),
    ))
}

async fn check_balance(
    State(ledger): State<GiftCardLedger>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let view = ledger.check_balance(&code).await?;
    Ok(Json(view))
}

async fn recharge(
    State(ledger): State<GiftCardLedger>,
    Path(code): Path<String>,
    LedgerJson(req): LedgerJson<AmountRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let outcome = ledger.recharge(&code, req).await?;
    Ok(Json(outcome))
}

async fn redeem(
    State(ledger): State<GiftCardLedger>,
    Path(code): Path<String>,
    LedgerJson(req): LedgerJson<AmountRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let outcome = ledger.redeem(&code, req).await?;
    Ok(Json(outcome))
}

async fn refund(
    State(ledger): State<GiftCardLedger>,
    Path(code): Path<String>,
    LedgerJson(req): LedgerJson<RefundRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let outcome = ledger.refund(&code, req).await?;
    Ok(Json(outcome))
}

// stream the card's history oldest first
async fn list_transactions(
    State(ledger): State<GiftCardLedger>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let history = match ledger.history(&code).await {
        Ok(history) => history,
        Err(err) => {
            if err.is_retryable() {
                tracing::error!("Failed to retrieve transactions: {err}");
            } else {
                tracing::info!("Transaction history refused: {err}");
            }
            return Err(err);
        }
    };

    let stream = futures::stream::iter(history)
        .map(|transaction| serde_json::to_string(&transaction).map(|data| Event::default().event("transaction").data(data)));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

async fn get_receipt(
    State(ledger): State<GiftCardLedger>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, LedgerError> {
    let receipt = ledger.receipt(&token).await?;
    Ok(Json(receipt))
}

async fn quote_fee(
    State(ledger): State<GiftCardLedger>,
    LedgerQuery(params): LedgerQuery<QuoteParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let add_ons: Vec<String> = params
        .add_ons
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|add_on| !add_on.is_empty())
        .map(str::to_string)
        .collect();
    let fee = ledger.quote_fee(&params.design, &add_ons, params.amount).await?;
    Ok(Json(fee))
}

pub fn card_routes(ledger: GiftCardLedger) -> Router {
    Router::new()
        .route("/cards", post(issue_card))
        .route("/cards/:code/balance", get(check_balance))
        .route("/cards/:code/recharge", post(recharge))
        .route("/cards/:code/redeem", post(redeem))
        .route("/cards/:code/refund", post(refund))
        .route("/cards/:code/transactions", get(list_transactions))
        .route("/receipts/:token", get(get_receipt))
        .route("/fees/quote", get(quote_fee))
        .with_state(ledger)
}
