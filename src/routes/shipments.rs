use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Shipment, ShipmentStatusHistoryEntry},
    shipments::{self, store, SyncReport},
    state::AppState,
};

pub fn to_iso(value: NaiveDateTime) -> String {
    value.and_utc().to_rfc3339()
}

#[derive(Serialize)]
pub struct ShipmentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub delivery_method: String,
    pub source_station_id: String,
    pub destination_station_id: String,
    pub request_id: Option<String>,
    pub status: String,
    pub last_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Shipment> for ShipmentResponse {
    fn from(value: Shipment) -> Self {
        Self {
            id: value.id,
            order_id: value.order_id,
            provider: value.provider,
            delivery_method: value.delivery_method,
            source_station_id: value.source_station_id,
            destination_station_id: value.destination_station_id,
            request_id: value.request_id,
            status: value.status,
            last_sync_at: value.last_sync_at.map(to_iso),
            created_at: to_iso(value.created_at),
            updated_at: to_iso(value.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub status: String,
    pub raw_payload: Value,
    pub created_at: String,
}

impl From<ShipmentStatusHistoryEntry> for HistoryEntryResponse {
    fn from(value: ShipmentStatusHistoryEntry) -> Self {
        Self {
            status: value.status,
            raw_payload: value.raw_payload,
            created_at: to_iso(value.created_at),
        }
    }
}

#[derive(Deserialize)]
pub struct ReadyToShipRequest {
    pub seller_id: Uuid,
}

pub async fn ready_to_ship(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ReadyToShipRequest>,
) -> AppResult<Json<ShipmentResponse>> {
    let shipment = shipments::ready_to_ship(&state, payload.seller_id, order_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(shipment.into()))
}

#[derive(Serialize)]
pub struct ShipmentWithHistoryResponse {
    #[serde(flatten)]
    pub shipment: ShipmentResponse,
    pub history: Vec<HistoryEntryResponse>,
}

pub async fn get_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ShipmentWithHistoryResponse>> {
    let mut conn = state.db()?;
    let shipment = store::load_by_order_id(&mut conn, order_id)?.ok_or_else(AppError::not_found)?;
    let history = store::history_for_shipment(&mut conn, shipment.id)?;
    Ok(Json(ShipmentWithHistoryResponse {
        shipment: shipment.into(),
        history: history.into_iter().map(Into::into).collect(),
    }))
}

pub async fn sync_statuses(State(state): State<AppState>) -> AppResult<Json<SyncReport>> {
    let report = shipments::sync_statuses(&state).await.map_err(AppError::from)?;
    Ok(Json(report))
}

pub async fn get_label(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let label = shipments::generate_label(&state, order_id)
        .await
        .map_err(AppError::from)?;

    if let Some(pdf) = label.pdf {
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pdf")],
            pdf,
        )
            .into_response());
    }
    if let Some(url) = label.url {
        return Ok(Json(serde_json::json!({ "url": url })).into_response());
    }
    Err(AppError::new(
        StatusCode::BAD_GATEWAY,
        "NDD_REQUEST_FAILED",
        "carrier returned neither a label URL nor a document",
    ))
}
