pub mod orchestrator;
pub mod status;
pub mod store;
pub mod sync;

pub use orchestrator::{generate_label, ready_to_ship};
pub use status::{map_carrier_status, ShipmentStatus};
pub use sync::{sync_statuses, SyncReport};

pub const CARRIER_PROVIDER: &str = "yandex-ndd";
