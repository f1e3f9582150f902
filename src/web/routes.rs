use axum::{Router, middleware, routing::get};

use super::AppState;
use super::handlers;
use super::rate_limit;

pub fn create_routes(state: AppState) -> Router {
    let receipts = Router::new()
        .route(
            "/v1/position-receipt/{chain}",
            get(handlers::describe_endpoint).post(handlers::position_receipt),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .merge(receipts)
        .with_state(state)
}
