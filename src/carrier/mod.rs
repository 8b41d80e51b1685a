use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod client;
pub mod retry;

pub use client::NddClient;
pub use retry::RetryPolicy;

pub const LAST_MILE_POLICY: &str = "time_interval";

// Clonable so flow errors wrapping it can be fanned out to every waiter of a
// single-flighted execution.
#[derive(Debug, Clone, Error)]
pub enum CarrierError {
    #[error("carrier request to {path} failed with status {http_status}: {code}")]
    Upstream {
        code: String,
        path: String,
        http_status: u16,
        raw_body: String,
        details: Option<Value>,
    },
    // anti-bot challenge page instead of an API response; never retried
    #[error("carrier blocked the request to {path}")]
    Blocked {
        path: String,
        captcha_key: Option<String>,
        retry_url: Option<String>,
    },
    #[error("carrier transport error on {path}: {message}")]
    Transport { path: String, message: String },
    #[error("carrier returned a malformed payload on {path}: {message}")]
    Decode { path: String, message: String },
}

impl CarrierError {
    // Retry 429, 5xx and network failures. Blocked pages and plain 4xx
    // (403 included) are terminal for the current call.
    pub fn is_transient(&self) -> bool {
        match self {
            CarrierError::Upstream { http_status, .. } => {
                *http_status == 429 || *http_status >= 500
            }
            CarrierError::Transport { .. } => true,
            CarrierError::Blocked { .. } | CarrierError::Decode { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryInterval {
    pub from_unix: i64,
    pub to_unix: i64,
}

#[derive(Debug, Clone)]
pub struct OfferAvailability {
    pub intervals: Vec<DeliveryInterval>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct CreateOfferRequest {
    pub source_station_id: String,
    pub destination_station_id: String,
    pub interval: DeliveryInterval,
    pub operator_request_id: String,
}

#[derive(Debug, Clone)]
pub struct OfferCreated {
    pub offer_id: Option<String>,
    // carried into request/create when confirmation yields no request id
    pub offer: Option<Value>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub request_id: Option<String>,
    pub status: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct RequestCreated {
    pub request_id: Option<String>,
    pub status: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct LabelDocument {
    pub url: Option<String>,
    pub pdf: Option<Vec<u8>>,
}

// Outbound seam to the carrier platform. NddClient in production,
// call-recording fakes in tests.
#[async_trait]
pub trait CarrierApi: Send + Sync + 'static {
    async fn list_pickup_points(&self, pickup_point_id: &str) -> Result<Vec<Value>, CarrierError>;

    async fn offers_info(
        &self,
        source_station_id: &str,
        destination_station_id: &str,
    ) -> Result<OfferAvailability, CarrierError>;

    async fn offers_create(&self, request: &CreateOfferRequest)
        -> Result<OfferCreated, CarrierError>;

    async fn offers_confirm(&self, offer_id: &str) -> Result<ConfirmOutcome, CarrierError>;

    async fn request_create(&self, offer: &Value) -> Result<RequestCreated, CarrierError>;

    async fn request_info(&self, request_id: &str) -> Result<Value, CarrierError>;

    async fn request_history(&self, request_id: &str) -> Result<Vec<Value>, CarrierError>;

    async fn generate_labels(&self, request_id: &str) -> Result<LabelDocument, CarrierError>;
}
