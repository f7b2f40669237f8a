use std::sync::Arc;

use axum::Router;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};

use crate::ledger::GiftCardLedger;

pub mod admin;
pub mod auth;
pub mod cards;
pub mod utils;

use auth::AdminAuth;

pub fn app(ledger: GiftCardLedger, auth: Arc<AdminAuth>) -> Router {
    let head_route = Router::new();

    let card_routes = cards::card_routes(ledger.clone());
    let admin_routes = admin::admin_routes(ledger, auth)
        .route_layer(CompressionLayer::new().gzip(true));

    head_route
        .nest("/v1", card_routes.merge(admin_routes))
        .route_layer(RequestBodyLimitLayer::new(64 * 1024)) //64KB limit
}
