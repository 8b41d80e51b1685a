use serde_json::Value;
use tracing::{info, warn};

use crate::error::FlowError;
use crate::models::Shipment;
use crate::state::AppState;

use super::status::{extract_raw_status, map_carrier_status, ShipmentStatus};
use super::store;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub changed: usize,
}

// One shipment's carrier error does not abort the batch; the shipment is
// skipped and picked up again on the next run.
pub async fn sync_statuses(state: &AppState) -> Result<SyncReport, FlowError> {
    let batch = {
        let mut conn = state.db_flow()?;
        store::sync_candidates(&mut conn, state.config.sync_batch_size)
            .map_err(FlowError::internal)?
    };

    let total = batch.len();
    let mut changed = 0usize;

    for shipment in &batch {
        match sync_one(state, shipment).await {
            Ok(true) => changed += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(
                    shipment_id = %shipment.id,
                    order_id = %shipment.order_id,
                    error = %err,
                    "status sync skipped shipment"
                );
            }
        }
    }

    info!(total, changed, "shipment status sync finished");
    Ok(SyncReport { total, changed })
}

async fn sync_one(state: &AppState, shipment: &Shipment) -> Result<bool, FlowError> {
    // candidates are selected on request_id being present
    let request_id = shipment
        .request_id
        .as_deref()
        .ok_or_else(|| FlowError::internal("sync candidate without request id"))?;

    let history = state.carrier.request_history(request_id).await?;
    let observation: Value = match history.last() {
        Some(entry) => entry.clone(),
        // some requests never accumulate history
        None => state.carrier.request_info(request_id).await?,
    };

    let mapped = extract_raw_status(&observation)
        .as_deref()
        .map(map_carrier_status)
        .unwrap_or(ShipmentStatus::Created);

    let mut conn = state.db_flow()?;
    store::record_sync_observation(&mut conn, shipment, mapped, observation)
        .map_err(FlowError::internal)
}
