#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use once_cell::sync::Lazy;
use ordermile::carrier::{
    CarrierApi, CarrierError, ConfirmOutcome, CreateOfferRequest, DeliveryInterval, LabelDocument,
    OfferAvailability, OfferCreated, RequestCreated,
};
use ordermile::config::AppConfig;
use ordermile::db::{self, PgPool};
use ordermile::models::{
    delivery_method, order_status, payout_status, NewOrder, NewSellerProfile, Order, Payment,
    Shipment, ShipmentStatusHistoryEntry,
};
use ordermile::routes;
use ordermile::state::AppState;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<AsyncMutex<()>> = Lazy::new(|| AsyncMutex::new(()));

// Call-recording in-memory carrier. Each endpoint appends its name to
// `calls`, so tests can assert both call counts and strict ordering. A
// `None` offer_id or confirm_request_id reproduces a carrier response
// without one.
#[derive(Default)]
pub struct FakeCarrier {
    pub calls: Mutex<Vec<String>>,
    pub points: Mutex<Vec<Value>>,
    pub intervals: Mutex<Vec<DeliveryInterval>>,
    pub offer_id: Mutex<Option<String>>,
    pub confirm_request_id: Mutex<Option<String>>,
    pub fallback_request_id: Mutex<Option<String>>,
    // when set, every endpoint fails with a clone of this error
    pub failure: Mutex<Option<CarrierError>>,
    pub history: Mutex<Vec<Value>>,
    pub info: Mutex<Value>,
}

impl FakeCarrier {
    pub fn new() -> Self {
        let fake = Self::default();
        *fake.intervals.lock().unwrap() = vec![DeliveryInterval {
            from_unix: 1_700_000_000,
            to_unix: 1_700_090_000,
        }];
        *fake.offer_id.lock().unwrap() = Some("offer-1".to_string());
        *fake.confirm_request_id.lock().unwrap() = Some("request-1".to_string());
        *fake.fallback_request_id.lock().unwrap() = Some("request-fallback-1".to_string());
        fake
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn set_points(&self, points: Vec<Value>) {
        *self.points.lock().unwrap() = points;
    }

    pub fn set_intervals(&self, intervals: Vec<DeliveryInterval>) {
        *self.intervals.lock().unwrap() = intervals;
    }

    pub fn set_offer_id(&self, value: Option<&str>) {
        *self.offer_id.lock().unwrap() = value.map(str::to_string);
    }

    pub fn set_confirm_request_id(&self, value: Option<&str>) {
        *self.confirm_request_id.lock().unwrap() = value.map(str::to_string);
    }

    pub fn set_fallback_request_id(&self, value: Option<&str>) {
        *self.fallback_request_id.lock().unwrap() = value.map(str::to_string);
    }

    pub fn set_history(&self, entries: Vec<Value>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn set_info(&self, value: Value) {
        *self.info.lock().unwrap() = value;
    }

    pub fn fail_with(&self, error: CarrierError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn record(&self, endpoint: &str) -> Result<(), CarrierError> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl CarrierApi for FakeCarrier {
    async fn list_pickup_points(&self, _pickup_point_id: &str) -> Result<Vec<Value>, CarrierError> {
        self.record("pickup-points/list")?;
        Ok(self.points.lock().unwrap().clone())
    }

    async fn offers_info(
        &self,
        _source_station_id: &str,
        _destination_station_id: &str,
    ) -> Result<OfferAvailability, CarrierError> {
        self.record("offers/info")?;
        Ok(OfferAvailability {
            intervals: self.intervals.lock().unwrap().clone(),
            raw: json!({ "offers": [] }),
        })
    }

    async fn offers_create(
        &self,
        request: &CreateOfferRequest,
    ) -> Result<OfferCreated, CarrierError> {
        self.record("offers/create")?;
        let offer_id = self.offer_id.lock().unwrap().clone();
        let offer = json!({
            "offer_id": offer_id,
            "source": request.source_station_id,
            "destination": request.destination_station_id,
        });
        Ok(OfferCreated {
            offer_id,
            offer: Some(offer.clone()),
            raw: json!({ "offers": [offer] }),
        })
    }

    async fn offers_confirm(&self, _offer_id: &str) -> Result<ConfirmOutcome, CarrierError> {
        self.record("offers/confirm")?;
        let request_id = self.confirm_request_id.lock().unwrap().clone();
        Ok(ConfirmOutcome {
            request_id,
            status: Some("DRAFT".to_string()),
            raw: json!({ "status": "DRAFT" }),
        })
    }

    async fn request_create(&self, _offer: &Value) -> Result<RequestCreated, CarrierError> {
        self.record("request/create")?;
        let request_id = self.fallback_request_id.lock().unwrap().clone();
        Ok(RequestCreated {
            request_id,
            status: Some("CREATED".to_string()),
            raw: json!({ "status": "CREATED" }),
        })
    }

    async fn request_info(&self, _request_id: &str) -> Result<Value, CarrierError> {
        self.record("request/info")?;
        Ok(self.info.lock().unwrap().clone())
    }

    async fn request_history(&self, _request_id: &str) -> Result<Vec<Value>, CarrierError> {
        self.record("request/history")?;
        Ok(self.history.lock().unwrap().clone())
    }

    async fn generate_labels(&self, _request_id: &str) -> Result<LabelDocument, CarrierError> {
        self.record("request/generate-labels")?;
        Ok(LabelDocument {
            url: Some("https://carrier/labels/request-1.pdf".to_string()),
            pdf: None,
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub carrier: Arc<FakeCarrier>,
    router: Router,
}

impl TestApp {
    // None skips the test when no test database is configured
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            cors_allowed_origin: None,
            ndd_base_url: "https://carrier.test/api".to_string(),
            ndd_token: "test-token".to_string(),
            ndd_request_timeout_secs: 5,
            ndd_offers_cache_ttl_secs: 180,
            seller_station_id_override: None,
            payment_base_url: "https://pay.test".to_string(),
            sync_batch_size: 50,
            sync_interval_secs: 300,
        };

        let pool = db::init_pool(&config.database_url)?;
        prepare_database(&pool).await?;

        let carrier = Arc::new(FakeCarrier::new());
        let state = AppState::new(pool, config, carrier.clone());
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            carrier,
            router,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    pub async fn insert_seller_profile(
        &self,
        seller_id: Uuid,
        dropoff_station_id: Option<&str>,
        meta: Value,
    ) -> Result<()> {
        let profile = NewSellerProfile {
            seller_id,
            dropoff_station_id: dropoff_station_id.map(str::to_string),
            dropoff_station_meta: meta,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(ordermile::schema::seller_profiles::table)
                .values(&profile)
                .execute(conn)
                .context("failed to insert seller profile")?;
            Ok(())
        })
        .await
    }

    pub async fn insert_paid_order(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        pickup_point_id: Option<&str>,
        buyer_station_id: Option<&str>,
    ) -> Result<Uuid> {
        let order_id = self
            .insert_order(buyer_id, seller_id, pickup_point_id, buyer_station_id)
            .await?;
        self.with_conn(move |conn| {
            use ordermile::schema::orders;
            diesel::update(orders::table.find(order_id))
                .set((
                    orders::status.eq(order_status::PAID),
                    orders::paid_at.eq(Some(Utc::now().naive_utc())),
                ))
                .execute(conn)
                .context("failed to mark order paid")?;
            Ok(())
        })
        .await?;
        Ok(order_id)
    }

    pub async fn insert_order(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        pickup_point_id: Option<&str>,
        buyer_station_id: Option<&str>,
    ) -> Result<Uuid> {
        let order = NewOrder {
            id: Uuid::new_v4(),
            buyer_id,
            seller_id,
            status: order_status::PENDING_PAYMENT.to_string(),
            payout_status: payout_status::HOLD.to_string(),
            payment_attempt_key: Uuid::new_v4().to_string(),
            payment_id: None,
            delivery_method: delivery_method::PICKUP_POINT.to_string(),
            pickup_point_id: pickup_point_id.map(str::to_string),
            amount: 4_990,
            currency: "RUB".to_string(),
        };
        let order_id = order.id;
        let buyer_station = buyer_station_id.map(str::to_string);
        self.with_conn(move |conn| {
            use ordermile::schema::orders;
            diesel::insert_into(orders::table)
                .values(&order)
                .execute(conn)
                .context("failed to insert order")?;
            if let Some(station) = buyer_station {
                diesel::update(orders::table.find(order_id))
                    .set(orders::buyer_station_id.eq(Some(station)))
                    .execute(conn)
                    .context("failed to set buyer station")?;
            }
            Ok(())
        })
        .await?;
        Ok(order_id)
    }

    pub async fn order(&self, order_id: Uuid) -> Result<Order> {
        self.with_conn(move |conn| {
            ordermile::schema::orders::table
                .find(order_id)
                .first(conn)
                .context("failed to load order")
        })
        .await
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        self.with_conn(move |conn| {
            use ordermile::schema::payments;
            payments::table
                .filter(payments::order_id.eq(order_id))
                .order(payments::created_at.desc())
                .load(conn)
                .context("failed to load payments")
        })
        .await
    }

    pub async fn shipment_for_order(&self, order_id: Uuid) -> Result<Option<Shipment>> {
        self.with_conn(move |conn| {
            use ordermile::schema::shipments;
            shipments::table
                .filter(shipments::order_id.eq(order_id))
                .first(conn)
                .optional()
                .context("failed to load shipment")
        })
        .await
    }

    pub async fn shipment_history(
        &self,
        shipment_id: Uuid,
    ) -> Result<Vec<ShipmentStatusHistoryEntry>> {
        self.with_conn(move |conn| {
            use ordermile::schema::shipment_status_history;
            shipment_status_history::table
                .filter(shipment_status_history::shipment_id.eq(shipment_id))
                .order(shipment_status_history::created_at.asc())
                .load(conn)
                .context("failed to load shipment history")
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    use http_body_util::BodyExt;
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE shipment_status_history, shipments, payments, orders, seller_profiles RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
