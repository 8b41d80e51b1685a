use serde_json::Value;
use tracing::debug;

use crate::carrier::{CarrierApi, CarrierError};
use crate::error::{ErrorCode, FlowError};

// The carrier uses three identifier shapes for the same physical concept:
// pickup-point UUID, platform-station digits, operator-station digits. A
// value of one shape must never be sent in a field expecting another.

pub fn looks_like_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

// Strict RFC4122: hyphenated form only, version 1-5, variant 8/9/a/b.
pub fn looks_like_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    let version = bytes[14].to_ascii_lowercase();
    let variant = bytes[19].to_ascii_lowercase();
    matches!(version, b'1'..=b'5') && matches!(variant, b'8' | b'9' | b'a' | b'b')
}

pub fn normalize_station_id(raw: &str, allow_uuid: bool) -> Option<String> {
    let trimmed = raw.trim();
    if looks_like_digits(trimmed) || (allow_uuid && looks_like_uuid(trimmed)) {
        Some(trimmed.to_string())
    } else {
        None
    }
}

pub fn shape_error(field: &str, expected: &str, got: &str) -> FlowError {
    FlowError::with_details(
        ErrorCode::ValidationError,
        format!("field `{field}` must be {expected}, got `{got}`"),
        serde_json::json!({ "field": field, "expected": expected, "got": got }),
    )
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationIdentity {
    pub platform_station_id: Option<String>,
    pub operator_station_id: Option<String>,
}

// Point records are inconsistent across carrier endpoints and versions.
// Lookup order: flat snake_case, nested station.id, camelCase.
pub fn extract_station_identity(point: &Value) -> StationIdentity {
    let platform_station_id = pluck_id(point, &["platform_station_id", "station_id"])
        .or_else(|| {
            point
                .get("station")
                .and_then(|station| pluck_id(station, &["id", "platform_id"]))
        })
        .or_else(|| pluck_id(point, &["platformStationId", "stationId"]))
        .filter(|id| looks_like_digits(id));

    let operator_station_id = pluck_id(point, &["operator_station_id", "operator_id"])
        .or_else(|| {
            point
                .get("station")
                .and_then(|station| pluck_id(station, &["operator_id"]))
        })
        .or_else(|| pluck_id(point, &["operatorStationId"]))
        .filter(|id| looks_like_digits(id));

    StationIdentity {
        platform_station_id,
        operator_station_id,
    }
}

fn pluck_id(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn point_matches(point: &Value, pickup_point_id: &str) -> bool {
    ["id", "pickup_point_id", "pvz_id"]
        .iter()
        .filter_map(|key| point.get(*key))
        .filter_map(|v| v.as_str())
        .any(|candidate| candidate.eq_ignore_ascii_case(pickup_point_id))
}

pub async fn resolve_station_identity_by_pickup_point_id(
    carrier: &dyn CarrierApi,
    pickup_point_id: &str,
) -> Result<StationIdentity, CarrierError> {
    let points = carrier.list_pickup_points(pickup_point_id).await?;
    let record = points
        .iter()
        .find(|point| point_matches(point, pickup_point_id))
        .or_else(|| points.first());

    let identity = record.map(extract_station_identity).unwrap_or_default();
    debug!(
        pickup_point_id,
        platform_station_id = identity.platform_station_id.as_deref().unwrap_or("-"),
        operator_station_id = identity.operator_station_id.as_deref().unwrap_or("-"),
        "resolved pickup point"
    );
    Ok(identity)
}
