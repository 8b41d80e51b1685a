pub mod carrier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod payments;
pub mod routes;
pub mod schema;
pub mod shipments;
pub mod single_flight;
pub mod state;
pub mod stations;

pub use shipments::{generate_label, ready_to_ship, sync_statuses};
