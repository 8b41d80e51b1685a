use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;
pub mod payments;
pub mod shipments;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let orders_routes = Router::new()
        .route("/:id/ready-to-ship", post(shipments::ready_to_ship))
        .route("/:id/shipment", get(shipments::get_shipment))
        .route("/:id/label", get(shipments::get_label));

    let shipments_routes = Router::new().route("/sync", post(shipments::sync_statuses));

    let payments_routes = Router::new()
        .route("/start", post(payments::start_payment))
        .route("/webhook", post(payments::process_webhook))
        .route("/:id/mock-success", post(payments::mock_success));

    Router::new()
        .nest("/api/orders", orders_routes)
        .nest("/api/shipments", shipments_routes)
        .nest("/api/payments", payments_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
