use serde_json::Value;

// Closed internal status set; nothing outside this enum is ever persisted to
// shipments.status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentStatus {
    Created,
    Validating,
    ReadyToShip,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "CREATED",
            ShipmentStatus::Validating => "VALIDATING",
            ShipmentStatus::ReadyToShip => "READY_TO_SHIP",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
            ShipmentStatus::Cancelled => "CANCELLED",
            ShipmentStatus::Failed => "FAILED",
        }
    }

    // no transition ever leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Cancelled | ShipmentStatus::Failed
        )
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "VALIDATING" => ShipmentStatus::Validating,
            "READY_TO_SHIP" => ShipmentStatus::ReadyToShip,
            "IN_TRANSIT" => ShipmentStatus::InTransit,
            "DELIVERED" => ShipmentStatus::Delivered,
            "CANCELLED" => ShipmentStatus::Cancelled,
            "FAILED" => ShipmentStatus::Failed,
            _ => ShipmentStatus::Created,
        }
    }

    pub const TERMINAL_STRS: [&'static str; 3] = ["DELIVERED", "CANCELLED", "FAILED"];
}

// Every carrier synonym observed in practice; the vocabulary drifts between
// platform versions.
const SYNONYMS: &[(ShipmentStatus, &[&str])] = &[
    (
        ShipmentStatus::Created,
        &["DRAFT", "CREATED", "NEW", "OFFER_CREATED", "OFFER_CONFIRMED"],
    ),
    (
        ShipmentStatus::Validating,
        &[
            "VALIDATING",
            "VALIDATING_REQUESTED",
            "WAITING_CONFIRMATION",
            "PROCESSING",
        ],
    ),
    (
        ShipmentStatus::ReadyToShip,
        &[
            "CREATED_IN_PLATFORM",
            "READY_FOR_APPROVAL",
            "SORT_CENTER_LOADED",
            "READY_TO_SHIP",
        ],
    ),
    (
        ShipmentStatus::InTransit,
        &[
            "DELIVERY_PROCESSING_STARTED",
            "SORTING_CENTER_RECEIVED",
            "TRANSPORTATION",
            "DELIVERY_TRANSPORTATION",
            "COURIER_FOUND",
            "PICKUP_SERVICE_STARTED",
            "ARRIVED_PICKUP_POINT",
            "DELIVERY_ARRIVED_PICKUP_POINT",
            "IN_TRANSIT",
        ],
    ),
    (
        ShipmentStatus::Delivered,
        &["DELIVERED", "DELIVERED_FINISH", "ORDER_DELIVERED", "FINISHED"],
    ),
    (
        ShipmentStatus::Cancelled,
        &[
            "CANCELLED",
            "CANCELED",
            "CANCELLED_IN_PLATFORM",
            "CANCELLED_BY_USER",
        ],
    ),
    (
        ShipmentStatus::Failed,
        &[
            "ERROR",
            "FAILED",
            "VALIDATING_ERROR",
            "DELIVERY_FAILED",
            "RETURNED_FINISH",
            "LOST",
        ],
    ),
];

// Unrecognized strings map to Created, never panic.
pub fn map_carrier_status(raw: &str) -> ShipmentStatus {
    let needle = raw.trim().to_ascii_uppercase();
    for (status, synonyms) in SYNONYMS {
        if synonyms.contains(&needle.as_str()) {
            return *status;
        }
    }
    ShipmentStatus::Created
}

pub fn extract_raw_status(value: &Value) -> Option<String> {
    value
        .get("status")
        .or_else(|| value.get("state").and_then(|s| s.get("status")))
        .or_else(|| value.get("state"))
        .or_else(|| value.get("code"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
