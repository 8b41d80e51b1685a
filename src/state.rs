use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};
use uuid::Uuid;

use crate::{
    carrier::CarrierApi,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult, FlowError},
    models::Shipment,
    single_flight::SingleFlight,
};

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

// per-order single-flight registry for delivery creation
pub type ReadyFlight = SingleFlight<Uuid, Result<Shipment, FlowError>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub carrier: Arc<dyn CarrierApi>,
    pub ready_flight: Arc<ReadyFlight>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, carrier: Arc<dyn CarrierApi>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            carrier,
            ready_flight: Arc::new(ReadyFlight::new()),
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn db_flow(&self) -> Result<PgPooledConnection, FlowError> {
        self.pool
            .get()
            .map_err(|err| FlowError::internal(format!("database pool error: {err}")))
    }
}
