use diesel::prelude::*;
use futures_util::FutureExt;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::carrier::{CreateOfferRequest, LabelDocument};
use crate::error::{ErrorCode, FlowError};
use crate::models::{delivery_method, order_status, Order, SellerProfile, Shipment};
use crate::schema::{orders, seller_profiles};
use crate::state::AppState;
use crate::stations::{
    looks_like_digits, looks_like_uuid, normalize_station_id,
    resolve_station_identity_by_pickup_point_id, shape_error,
};

use super::status::{map_carrier_status, ShipmentStatus};
use super::store::{self, ShipmentDraft};
use super::CARRIER_PROVIDER;

// Turns a paid order into a carrier shipment request exactly once. An
// existing shipment with a request id is returned without touching the
// carrier; concurrent calls for the same order collapse into one execution.
pub async fn ready_to_ship(
    state: &AppState,
    seller_id: Uuid,
    order_id: Uuid,
) -> Result<Shipment, FlowError> {
    if let Some(existing) = shipment_with_request_id(state, order_id)? {
        return Ok(existing);
    }

    let flight = state.ready_flight.clone();
    let run_state = state.clone();
    flight
        .run(order_id, move || {
            execute_pipeline(run_state, seller_id, order_id).boxed()
        })
        .await
}

fn shipment_with_request_id(
    state: &AppState,
    order_id: Uuid,
) -> Result<Option<Shipment>, FlowError> {
    let mut conn = state.db_flow()?;
    let existing = store::load_by_order_id(&mut conn, order_id).map_err(FlowError::internal)?;
    Ok(existing.filter(|shipment| shipment.request_id.is_some()))
}

// Priority order: digits-shaped profile field, profile-meta operator station
// when the profile field is a pickup-point UUID, then the env override. The
// UUID itself is never coerced into a station id.
pub fn resolve_seller_station(
    dropoff_station_id: Option<&str>,
    operator_station_id: Option<&str>,
    env_override: Option<&str>,
) -> Result<(String, &'static str), FlowError> {
    if let Some(raw) = dropoff_station_id.map(str::trim).filter(|v| !v.is_empty()) {
        if looks_like_digits(raw) {
            return Ok((raw.to_string(), "profile"));
        }
        if looks_like_uuid(raw) {
            if let Some(operator) = operator_station_id.map(str::trim) {
                if looks_like_digits(operator) {
                    return Ok((operator.to_string(), "profile_meta"));
                }
            }
            // fall through to the env override
        } else {
            return Err(shape_error(
                "dropoff_station_id",
                "decimal digits or a pickup-point UUID",
                raw,
            ));
        }
    }

    if let Some(overridden) = env_override.map(str::trim).filter(|v| !v.is_empty()) {
        if !looks_like_digits(overridden) {
            return Err(shape_error(
                "SELLER_STATION_ID_OVERRIDE",
                "decimal digits",
                overridden,
            ));
        }
        return Ok((overridden.to_string(), "env"));
    }

    Err(FlowError::new(
        ErrorCode::SellerStationIdRequired,
        "seller has no usable dropoff platform-station id",
    ))
}

pub fn validate_buyer_station(raw: &str) -> Result<String, FlowError> {
    normalize_station_id(raw, false)
        .ok_or_else(|| shape_error("buyer_station_id", "decimal digits", raw.trim()))
}

async fn execute_pipeline(
    state: AppState,
    seller_id: Uuid,
    order_id: Uuid,
) -> Result<Shipment, FlowError> {
    // re-check now that we are the single execution for this order
    if let Some(existing) = shipment_with_request_id(&state, order_id)? {
        return Ok(existing);
    }

    let (order, profile) = {
        let mut conn = state.db_flow()?;
        let order: Option<Order> = orders::table
            .find(order_id)
            .first(&mut conn)
            .optional()
            .map_err(FlowError::internal)?;
        let order = order
            .filter(|order| order.seller_id == seller_id)
            .ok_or_else(|| FlowError::new(ErrorCode::OrderNotFound, "order not found"))?;
        let profile: Option<SellerProfile> = seller_profiles::table
            .find(seller_id)
            .first(&mut conn)
            .optional()
            .map_err(FlowError::internal)?;
        (order, profile)
    };

    if order.status != order_status::PAID || order.paid_at.is_none() {
        return Err(FlowError::new(
            ErrorCode::OrderNotPaid,
            format!("order is {} and cannot be shipped", order.status),
        ));
    }

    if order.delivery_method != delivery_method::PICKUP_POINT {
        return Err(FlowError::new(
            ErrorCode::PickupPointRequired,
            "only pickup-point delivery can be shipped through the carrier",
        ));
    }
    let pickup_point_id = order
        .pickup_point_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            FlowError::new(ErrorCode::BuyerPvzRequired, "order has no pickup point id")
        })?;

    let (source_station_id, source_origin) = resolve_seller_station(
        profile.as_ref().and_then(|p| p.dropoff_station_id.as_deref()),
        profile.as_ref().and_then(|p| p.operator_station_id()),
        state.config.seller_station_id_override.as_deref(),
    )?;

    // backfilled from the carrier when the order does not carry it yet
    let (destination_station_id, destination_origin) = match order.buyer_station_id.as_deref() {
        Some(raw) => (validate_buyer_station(raw)?, "order"),
        None => {
            let identity =
                resolve_station_identity_by_pickup_point_id(state.carrier.as_ref(), &pickup_point_id)
                    .await?;
            let resolved = identity.platform_station_id.ok_or_else(|| {
                FlowError::new(
                    ErrorCode::BuyerStationIdRequired,
                    format!("carrier returned no platform station for pickup point {pickup_point_id}"),
                )
            })?;
            let mut conn = state.db_flow()?;
            diesel::update(orders::table.find(order.id))
                .set(orders::buyer_station_id.eq(Some(resolved.clone())))
                .execute(&mut conn)
                .map_err(FlowError::internal)?;
            (resolved, "carrier_lookup")
        }
    };

    let availability = state
        .carrier
        .offers_info(&source_station_id, &destination_station_id)
        .await?;
    let interval = *availability.intervals.first().ok_or_else(|| {
        FlowError::new(
            ErrorCode::NddOffersEmpty,
            "carrier returned no delivery interval for this station pair",
        )
    })?;

    let created = state
        .carrier
        .offers_create(&CreateOfferRequest {
            source_station_id: source_station_id.clone(),
            destination_station_id: destination_station_id.clone(),
            interval,
            operator_request_id: order.id.to_string(),
        })
        .await?;
    let offer_id = created.offer_id.clone().ok_or_else(|| {
        FlowError::new(
            ErrorCode::NddOfferCreateFailed,
            "carrier did not return an offer id",
        )
    })?;
    let offer_payload = created.offer.clone().unwrap_or_else(|| created.raw.clone());

    let confirm = state.carrier.offers_confirm(&offer_id).await?;
    let (request_id, raw_status, status_raw) = match confirm.request_id {
        Some(request_id) => (request_id, confirm.status, confirm.raw),
        None => {
            // carrier quirk: a confirmed offer without a request id
            warn!(order_id = %order.id, offer_id, "offers/confirm returned no request id, falling back to request/create");
            let fallback = state.carrier.request_create(&offer_payload).await?;
            match fallback.request_id {
                Some(request_id) => (request_id, fallback.status, fallback.raw),
                None => {
                    return Err(FlowError::new(
                        ErrorCode::NddRequestIdMissing,
                        "carrier yielded no request id from confirm or request/create",
                    ))
                }
            }
        }
    };

    let status = raw_status
        .as_deref()
        .map(map_carrier_status)
        .unwrap_or(ShipmentStatus::Created);

    let draft = ShipmentDraft {
        order_id: order.id,
        provider: CARRIER_PROVIDER.to_string(),
        delivery_method: delivery_method::PICKUP_POINT.to_string(),
        source_station_id,
        source_station_meta: json!({ "resolved_from": source_origin }),
        destination_station_id,
        destination_station_meta: json!({
            "pickup_point_id": pickup_point_id,
            "resolved_from": destination_origin,
        }),
        offer_payload: Some(offer_payload),
        request_id: Some(request_id.clone()),
        status,
        status_raw: Some(status_raw),
    };

    let mut conn = state.db_flow()?;
    let shipment = store::upsert_shipment(&mut conn, draft).map_err(FlowError::internal)?;
    info!(order_id = %order.id, request_id, status = shipment.status, "carrier shipment request created");
    Ok(shipment)
}

pub async fn generate_label(state: &AppState, order_id: Uuid) -> Result<LabelDocument, FlowError> {
    let shipment = {
        let mut conn = state.db_flow()?;
        store::load_by_order_id(&mut conn, order_id).map_err(FlowError::internal)?
    }
    .ok_or_else(|| FlowError::new(ErrorCode::ShipmentNotFound, "order has no shipment"))?;

    let request_id = shipment.request_id.as_deref().ok_or_else(|| {
        FlowError::new(
            ErrorCode::NddRequestIdMissing,
            "shipment has no carrier request id yet",
        )
    })?;

    Ok(state.carrier.generate_labels(request_id).await?)
}
