use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use thiserror::Error;

use crate::carrier::CarrierError;

pub type AppResult<T> = Result<T, AppError>;

// Stable machine-readable codes; the human-readable message is free to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    OrderNotFound,
    OrderNotPaid,
    PickupPointRequired,
    BuyerPvzRequired,
    BuyerStationIdRequired,
    SellerStationIdRequired,
    SellerDropoffPvzRequired,
    ValidationError,
    NddOffersEmpty,
    NddOfferCreateFailed,
    NddRequestIdMissing,
    NddRequestFailed,
    YandexIpBlocked,
    PaymentNotFound,
    ShipmentNotFound,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::OrderNotPaid => "ORDER_NOT_PAID",
            ErrorCode::PickupPointRequired => "PICKUP_POINT_REQUIRED",
            ErrorCode::BuyerPvzRequired => "BUYER_PVZ_REQUIRED",
            ErrorCode::BuyerStationIdRequired => "BUYER_STATION_ID_REQUIRED",
            ErrorCode::SellerStationIdRequired => "SELLER_STATION_ID_REQUIRED",
            ErrorCode::SellerDropoffPvzRequired => "SELLER_DROPOFF_PVZ_REQUIRED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NddOffersEmpty => "NDD_OFFERS_EMPTY",
            ErrorCode::NddOfferCreateFailed => "NDD_OFFER_CREATE_FAILED",
            ErrorCode::NddRequestIdMissing => "NDD_REQUEST_ID_MISSING",
            ErrorCode::NddRequestFailed => "NDD_REQUEST_FAILED",
            ErrorCode::YandexIpBlocked => "YANDEX_IP_BLOCKED",
            ErrorCode::PaymentNotFound => "PAYMENT_NOT_FOUND",
            ErrorCode::ShipmentNotFound => "SHIPMENT_NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::OrderNotFound
            | ErrorCode::PaymentNotFound
            | ErrorCode::ShipmentNotFound => StatusCode::NOT_FOUND,
            ErrorCode::OrderNotPaid
            | ErrorCode::PickupPointRequired
            | ErrorCode::BuyerPvzRequired
            | ErrorCode::BuyerStationIdRequired
            | ErrorCode::SellerStationIdRequired
            | ErrorCode::SellerDropoffPvzRequired
            | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NddOffersEmpty
            | ErrorCode::NddOfferCreateFailed
            | ErrorCode::NddRequestIdMissing
            | ErrorCode::NddRequestFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::YandexIpBlocked => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Clone is required so a single-flighted execution can hand the same failure
// to every concurrent caller.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct FlowError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl FlowError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn internal(error: impl Display) -> Self {
        Self::new(ErrorCode::Internal, error.to_string())
    }
}

impl From<diesel::result::Error> for FlowError {
    fn from(value: diesel::result::Error) -> Self {
        FlowError::internal(value)
    }
}

impl From<CarrierError> for FlowError {
    fn from(value: CarrierError) -> Self {
        match value {
            CarrierError::Blocked {
                ref path,
                ref captcha_key,
                ref retry_url,
            } => FlowError::with_details(
                ErrorCode::YandexIpBlocked,
                format!("carrier blocked the request to {path}"),
                serde_json::json!({
                    "path": path,
                    "captcha_key": captcha_key,
                    "retry_url": retry_url,
                }),
            ),
            CarrierError::Upstream {
                ref code,
                ref path,
                http_status,
                ref raw_body,
                ref details,
            } => FlowError::with_details(
                ErrorCode::NddRequestFailed,
                format!("carrier request to {path} failed with status {http_status}"),
                serde_json::json!({
                    "code": code,
                    "path": path,
                    "http_status": http_status,
                    "raw_body": raw_body,
                    "details": details,
                }),
            ),
            other => FlowError::new(ErrorCode::NddRequestFailed, other.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            error.to_string(),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code,
            details: self.details,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<FlowError> for AppError {
    fn from(value: FlowError) -> Self {
        Self {
            status: value.code.http_status(),
            code: value.code.as_str(),
            message: value.message,
            details: value.details,
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}
