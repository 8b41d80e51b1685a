use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    CarrierApi, CarrierError, ConfirmOutcome, CreateOfferRequest, DeliveryInterval, LabelDocument,
    OfferAvailability, OfferCreated, RequestCreated, RetryPolicy, LAST_MILE_POLICY,
};

type CacheKey = (String, String, &'static str);

// TTL cache for offers/info; the carrier rate-limits aggressively.
pub struct AvailabilityCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, (Instant, OfferAvailability)>>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<OfferAvailability> {
        let entries = self.entries.lock().expect("availability cache poisoned");
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn store(&self, key: CacheKey, value: OfferAvailability) {
        let mut entries = self.entries.lock().expect("availability cache poisoned");
        entries.insert(key, (Instant::now(), value));
    }
}

pub struct NddClient {
    http: Client,
    base_url: String,
    auth_header: String,
    retry: RetryPolicy,
    offers_cache: AvailabilityCache,
}

impl NddClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        request_timeout: Duration,
        offers_cache_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: normalize_bearer(token),
            retry: RetryPolicy::default(),
            offers_cache: AvailabilityCache::new(offers_cache_ttl),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> Result<Value, CarrierError> {
        let mut attempt = 1u32;
        loop {
            match self.execute_once(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if self.retry.should_retry(attempt, &error) {
                        let delay = self.retry.jittered_backoff(attempt);
                        warn!(
                            path,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "carrier call failed, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&Value>,
    ) -> Result<Value, CarrierError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, &url)
            .header("authorization", &self.auth_header);
        if let Some(query) = query {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| CarrierError::Transport {
            path: path.to_string(),
            message: err.to_string(),
        })?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|err| CarrierError::Transport {
            path: path.to_string(),
            message: format!("failed to read response body: {err}"),
        })?;

        if looks_like_html(&raw_body) {
            let challenge = extract_challenge(&raw_body);
            return Err(CarrierError::Blocked {
                path: path.to_string(),
                captcha_key: challenge.captcha_key,
                retry_url: challenge.retry_url,
            });
        }

        if !status.is_success() {
            return Err(classify_upstream(path, status, raw_body));
        }

        if raw_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&raw_body).map_err(|err| CarrierError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

fn classify_upstream(path: &str, status: StatusCode, raw_body: String) -> CarrierError {
    let details: Option<Value> = serde_json::from_str(&raw_body).ok();
    let code = details
        .as_ref()
        .and_then(|value| value.get("code"))
        .and_then(|value| value.as_str())
        .unwrap_or("NDD_REQUEST_FAILED")
        .to_string();
    CarrierError::Upstream {
        code,
        path: path.to_string(),
        http_status: status.as_u16(),
        raw_body,
        details,
    }
}

// Exactly one "Bearer " prefix, whether or not the env value already has it.
pub fn normalize_bearer(token: &str) -> String {
    let trimmed = token.trim();
    let bare = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .unwrap_or(trimmed)
        .trim();
    format!("Bearer {bare}")
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    let lowered = head.get(..64).unwrap_or(head).to_ascii_lowercase();
    lowered.starts_with("<!doctype") || lowered.starts_with("<html")
}

#[derive(Debug, Default, PartialEq)]
pub struct ChallengeMeta {
    pub captcha_key: Option<String>,
    pub retry_url: Option<String>,
}

// Best-effort scan of the bot-block page; the page is not a stable API, so
// known markers are looked for and absence is tolerated.
pub fn extract_challenge(body: &str) -> ChallengeMeta {
    ChallengeMeta {
        captcha_key: scan_value(body, "data-key=\"")
            .or_else(|| scan_value(body, "key=")),
        retry_url: scan_value(body, "data-retry-url=\"")
            .or_else(|| scan_value(body, "retpath=")),
    }
}

fn scan_value(body: &str, marker: &str) -> Option<String> {
    let start = body.find(marker)? + marker.len();
    let rest = &body[start..];
    let end = rest
        .find(|c: char| c == '"' || c == '&' || c == '\'' || c.is_whitespace())
        .unwrap_or(rest.len());
    let value = &rest[..end];
    (!value.is_empty()).then(|| value.to_string())
}

fn pluck_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn pluck_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| value.get(*key)).and_then(|v| v.as_i64())
}

// The carrier has shipped both offers[].delivery_interval.{from,to} and
// intervals[].{min,max}; accept both.
pub fn parse_intervals(raw: &Value) -> Vec<DeliveryInterval> {
    let entries = raw
        .get("offers")
        .or_else(|| raw.get("intervals"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    entries
        .iter()
        .filter_map(|entry| {
            let container = entry.get("delivery_interval").unwrap_or(entry);
            let from = pluck_i64(container, &["from", "min", "from_unix"])?;
            let to = pluck_i64(container, &["to", "max", "to_unix"])?;
            Some(DeliveryInterval {
                from_unix: from,
                to_unix: to,
            })
        })
        .collect()
}

#[async_trait]
impl CarrierApi for NddClient {
    async fn list_pickup_points(&self, pickup_point_id: &str) -> Result<Vec<Value>, CarrierError> {
        let body = json!({ "pickup_point_ids": [pickup_point_id] });
        let raw = self
            .request(Method::POST, "pickup-points/list", None, Some(&body))
            .await?;
        let points = raw
            .get("points")
            .or_else(|| raw.get("pickup_points"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(points)
    }

    async fn offers_info(
        &self,
        source_station_id: &str,
        destination_station_id: &str,
    ) -> Result<OfferAvailability, CarrierError> {
        let key: CacheKey = (
            source_station_id.to_string(),
            destination_station_id.to_string(),
            LAST_MILE_POLICY,
        );
        if let Some(cached) = self.offers_cache.get(&key) {
            debug!(
                source = source_station_id,
                destination = destination_station_id,
                "offers/info served from cache"
            );
            return Ok(cached);
        }

        let query = [
            ("station_id", source_station_id.to_string()),
            ("self_pickup_id", destination_station_id.to_string()),
            ("last_mile_policy", LAST_MILE_POLICY.to_string()),
            ("send_unix", "true".to_string()),
        ];
        let raw = self
            .request(Method::GET, "offers/info", Some(&query), None)
            .await?;
        let availability = OfferAvailability {
            intervals: parse_intervals(&raw),
            raw,
        };

        self.offers_cache.store(key, availability.clone());
        Ok(availability)
    }

    async fn offers_create(
        &self,
        request: &CreateOfferRequest,
    ) -> Result<OfferCreated, CarrierError> {
        let body = json!({
            "source": { "platform_station": { "platform_id": request.source_station_id } },
            "destination": { "platform_station": { "platform_id": request.destination_station_id } },
            "interval": {
                "from": request.interval.from_unix,
                "to": request.interval.to_unix,
            },
            "last_mile_policy": LAST_MILE_POLICY,
            "info": { "operator_request_id": request.operator_request_id },
        });
        let raw = self
            .request(Method::POST, "offers/create", None, Some(&body))
            .await?;

        let offer = raw
            .get("offers")
            .and_then(|v| v.as_array())
            .and_then(|offers| offers.first())
            .cloned()
            .or_else(|| raw.get("offer").cloned());
        let offer_id = offer
            .as_ref()
            .and_then(|o| pluck_str(o, &["offer_id", "id"]))
            .or_else(|| pluck_str(&raw, &["offer_id", "id"]));

        Ok(OfferCreated {
            offer_id,
            offer,
            raw,
        })
    }

    async fn offers_confirm(&self, offer_id: &str) -> Result<ConfirmOutcome, CarrierError> {
        let body = json!({ "offer_id": offer_id });
        let raw = self
            .request(Method::POST, "offers/confirm", None, Some(&body))
            .await?;
        Ok(ConfirmOutcome {
            request_id: pluck_str(&raw, &["request_id", "requestId"]),
            status: pluck_str(&raw, &["status", "state"]),
            raw,
        })
    }

    async fn request_create(&self, offer: &Value) -> Result<RequestCreated, CarrierError> {
        let body = json!({ "offer": offer });
        let raw = self
            .request(Method::POST, "request/create", None, Some(&body))
            .await?;
        Ok(RequestCreated {
            request_id: pluck_str(&raw, &["request_id", "requestId"]),
            status: pluck_str(&raw, &["status", "state"]),
            raw,
        })
    }

    async fn request_info(&self, request_id: &str) -> Result<Value, CarrierError> {
        let query = [("request_id", request_id.to_string())];
        self.request(Method::GET, "request/info", Some(&query), None)
            .await
    }

    async fn request_history(&self, request_id: &str) -> Result<Vec<Value>, CarrierError> {
        let query = [("request_id", request_id.to_string())];
        let raw = self
            .request(Method::GET, "request/history", Some(&query), None)
            .await?;
        let entries = raw
            .get("state_history")
            .or_else(|| raw.get("history"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(entries)
    }

    async fn generate_labels(&self, request_id: &str) -> Result<LabelDocument, CarrierError> {
        let body = json!({ "request_id": request_id, "generate_type": "one" });
        let raw = self
            .request(Method::POST, "request/generate-labels", None, Some(&body))
            .await?;

        let url = pluck_str(&raw, &["url", "label_url"]);
        let pdf = pluck_str(&raw, &["data", "pdf", "content"]).and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .ok()
        });
        Ok(LabelDocument { url, pdf })
    }
}
