use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

pub mod order_status {
    pub const PENDING_PAYMENT: &str = "PENDING_PAYMENT";
    pub const PAID: &str = "PAID";
    pub const PAYMENT_FAILED: &str = "PAYMENT_FAILED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const READY_FOR_SHIPMENT: &str = "READY_FOR_SHIPMENT";
}

pub mod payout_status {
    pub const HOLD: &str = "HOLD";
    pub const RELEASED: &str = "RELEASED";
    pub const BLOCKED: &str = "BLOCKED";
}

pub mod payment_status {
    pub const PENDING: &str = "PENDING";
    pub const SUCCEEDED: &str = "SUCCEEDED";
    pub const FAILED: &str = "FAILED";
}

pub mod delivery_method {
    pub const COURIER: &str = "COURIER";
    pub const PICKUP_POINT: &str = "PICKUP_POINT";
}

// Sentinel stored in orders.delivery_request_id while a transaction holds
// the delivery-creation claim and the carrier request id is not known yet.
pub const DELIVERY_CLAIM_PROCESSING: &str = "PROCESSING";

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = orders)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub status: String,
    pub paid_at: Option<NaiveDateTime>,
    pub payout_status: String,
    pub payment_attempt_key: String,
    pub delivery_request_id: Option<String>,
    pub payment_id: Option<Uuid>,
    pub delivery_method: String,
    pub pickup_point_id: Option<String>,
    pub buyer_station_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub status: String,
    pub payout_status: String,
    pub payment_attempt_key: String,
    pub payment_id: Option<Uuid>,
    pub delivery_method: String,
    pub pickup_point_id: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = payments)]
#[diesel(belongs_to(Order))]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub payload: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Payment {
    pub fn payment_url(&self) -> Option<&str> {
        self.payload.get("payment_url").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = shipments)]
#[diesel(belongs_to(Order))]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub delivery_method: String,
    pub source_station_id: String,
    pub source_station_meta: serde_json::Value,
    pub destination_station_id: String,
    pub destination_station_meta: serde_json::Value,
    pub offer_payload: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub status: String,
    pub status_raw: Option<serde_json::Value>,
    pub last_sync_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shipments)]
pub struct NewShipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: String,
    pub delivery_method: String,
    pub source_station_id: String,
    pub source_station_meta: serde_json::Value,
    pub destination_station_id: String,
    pub destination_station_meta: serde_json::Value,
    pub offer_payload: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub status: String,
    pub status_raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = shipment_status_history)]
#[diesel(belongs_to(Shipment))]
pub struct ShipmentStatusHistoryEntry {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub status: String,
    pub raw_payload: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shipment_status_history)]
pub struct NewShipmentStatusHistoryEntry {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub status: String,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = seller_profiles)]
#[diesel(primary_key(seller_id))]
pub struct SellerProfile {
    pub seller_id: Uuid,
    pub dropoff_station_id: Option<String>,
    pub dropoff_station_meta: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SellerProfile {
    // used when the dropoff id itself is a pickup-point UUID
    pub fn operator_station_id(&self) -> Option<&str> {
        self.dropoff_station_meta
            .get("operator_station_id")
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = seller_profiles)]
pub struct NewSellerProfile {
    pub seller_id: Uuid,
    pub dropoff_station_id: Option<String>,
    pub dropoff_station_meta: serde_json::Value,
}
