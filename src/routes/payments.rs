use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    payments::{self, StartPaymentInput, StartPaymentOutcome, WebhookStatus},
    state::AppState,
};

#[derive(Deserialize)]
pub struct StartPaymentRequest {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub attempt_key: String,
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_delivery_method")]
    pub delivery_method: String,
    #[serde(default)]
    pub pickup_point_id: Option<String>,
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_delivery_method() -> String {
    crate::models::delivery_method::PICKUP_POINT.to_string()
}

pub async fn start_payment(
    State(state): State<AppState>,
    Json(payload): Json<StartPaymentRequest>,
) -> AppResult<Json<StartPaymentOutcome>> {
    let outcome = payments::start_payment(
        &state,
        StartPaymentInput {
            buyer_id: payload.buyer_id,
            seller_id: payload.seller_id,
            attempt_key: payload.attempt_key,
            amount: payload.amount,
            currency: payload.currency,
            delivery_method: payload.delivery_method,
            pickup_point_id: payload.pickup_point_id,
        },
    )
    .await
    .map_err(AppError::from)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct WebhookRequest {
    pub payment_id: Uuid,
    pub status: String,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

pub async fn process_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookRequest>,
) -> AppResult<Json<WebhookResponse>> {
    let status = WebhookStatus::parse(&payload.status).ok_or_else(|| {
        AppError::bad_request(format!("unknown webhook status `{}`", payload.status))
    })?;
    payments::process_webhook(&state, payload.payment_id, status)
        .await
        .map_err(AppError::from)?;
    Ok(Json(WebhookResponse { ok: true }))
}

pub async fn mock_success(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<WebhookResponse>> {
    payments::mock_success(&state, payment_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(WebhookResponse { ok: true }))
}
