use chrono::Utc;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{NewShipment, NewShipmentStatusHistoryEntry, Shipment, ShipmentStatusHistoryEntry};
use crate::schema::{shipment_status_history, shipments};

use super::status::ShipmentStatus;

#[derive(Debug, Clone)]
pub struct ShipmentDraft {
    pub order_id: Uuid,
    pub provider: String,
    pub delivery_method: String,
    pub source_station_id: String,
    pub source_station_meta: Value,
    pub destination_station_id: String,
    pub destination_station_meta: Value,
    pub offer_payload: Option<Value>,
    pub request_id: Option<String>,
    pub status: ShipmentStatus,
    pub status_raw: Option<Value>,
}

pub fn load_by_order_id(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> QueryResult<Option<Shipment>> {
    shipments::table
        .filter(shipments::order_id.eq(order_id))
        .first(conn)
        .optional()
}

pub fn history_for_shipment(
    conn: &mut PgConnection,
    shipment_id: Uuid,
) -> QueryResult<Vec<ShipmentStatusHistoryEntry>> {
    shipment_status_history::table
        .filter(shipment_status_history::shipment_id.eq(shipment_id))
        .order(shipment_status_history::created_at.asc())
        .load(conn)
}

// offer_payload and request_id merge with COALESCE semantics: a null in the
// draft preserves the stored value, so a retried run cannot erase a captured
// request id. One history row when the row is new or the status changed.
pub fn upsert_shipment(conn: &mut PgConnection, draft: ShipmentDraft) -> QueryResult<Shipment> {
    conn.transaction(|conn| {
        let existing = load_by_order_id(conn, draft.order_id)?;
        let now = Utc::now().naive_utc();

        let shipment = match existing {
            None => {
                let new_shipment = NewShipment {
                    id: Uuid::new_v4(),
                    order_id: draft.order_id,
                    provider: draft.provider,
                    delivery_method: draft.delivery_method,
                    source_station_id: draft.source_station_id,
                    source_station_meta: draft.source_station_meta,
                    destination_station_id: draft.destination_station_id,
                    destination_station_meta: draft.destination_station_meta,
                    offer_payload: draft.offer_payload,
                    request_id: draft.request_id,
                    status: draft.status.as_str().to_string(),
                    status_raw: draft.status_raw.clone(),
                };
                diesel::insert_into(shipments::table)
                    .values(&new_shipment)
                    .execute(conn)?;
                append_history(
                    conn,
                    new_shipment.id,
                    draft.status,
                    draft.status_raw.unwrap_or(Value::Null),
                )?;
                shipments::table.find(new_shipment.id).first(conn)?
            }
            Some(existing) => {
                let merged_offer = draft.offer_payload.or(existing.offer_payload.clone());
                let merged_request_id = draft.request_id.or(existing.request_id.clone());
                let status_changed = existing.status != draft.status.as_str();

                diesel::update(shipments::table.find(existing.id))
                    .set((
                        shipments::source_station_id.eq(&draft.source_station_id),
                        shipments::source_station_meta.eq(&draft.source_station_meta),
                        shipments::destination_station_id.eq(&draft.destination_station_id),
                        shipments::destination_station_meta.eq(&draft.destination_station_meta),
                        shipments::offer_payload.eq(&merged_offer),
                        shipments::request_id.eq(&merged_request_id),
                        shipments::status.eq(draft.status.as_str()),
                        shipments::status_raw.eq(&draft.status_raw),
                        shipments::updated_at.eq(now),
                    ))
                    .execute(conn)?;

                if status_changed {
                    append_history(
                        conn,
                        existing.id,
                        draft.status,
                        draft.status_raw.unwrap_or(Value::Null),
                    )?;
                }
                shipments::table.find(existing.id).first(conn)?
            }
        };

        Ok(shipment)
    })
}

// append-only, never updated or deleted
pub fn append_history(
    conn: &mut PgConnection,
    shipment_id: Uuid,
    status: ShipmentStatus,
    raw_payload: Value,
) -> QueryResult<()> {
    let entry = NewShipmentStatusHistoryEntry {
        id: Uuid::new_v4(),
        shipment_id,
        status: status.as_str().to_string(),
        raw_payload,
    };
    diesel::insert_into(shipment_status_history::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

// request exists, status not terminal, oldest-updated-first, bounded batch
pub fn sync_candidates(conn: &mut PgConnection, limit: i64) -> QueryResult<Vec<Shipment>> {
    shipments::table
        .filter(shipments::request_id.is_not_null())
        .filter(shipments::status.ne_all(ShipmentStatus::TERMINAL_STRS))
        .order(shipments::updated_at.asc())
        .limit(limit)
        .load(conn)
}

// History row only when the mapped status differs from the stored one;
// last_sync_at is bumped either way.
pub fn record_sync_observation(
    conn: &mut PgConnection,
    shipment: &Shipment,
    mapped: ShipmentStatus,
    raw_payload: Value,
) -> QueryResult<bool> {
    let now = Utc::now().naive_utc();
    let changed = ShipmentStatus::from_stored(&shipment.status) != mapped;

    conn.transaction(|conn| {
        if changed {
            diesel::update(shipments::table.find(shipment.id))
                .set((
                    shipments::status.eq(mapped.as_str()),
                    shipments::status_raw.eq(Some(raw_payload.clone())),
                    shipments::last_sync_at.eq(now),
                    shipments::updated_at.eq(now),
                ))
                .execute(conn)?;
            append_history(conn, shipment.id, mapped, raw_payload.clone())?;
        } else {
            diesel::update(shipments::table.find(shipment.id))
                .set((
                    shipments::last_sync_at.eq(now),
                    shipments::updated_at.eq(now),
                ))
                .execute(conn)?;
        }
        Ok(changed)
    })
}
