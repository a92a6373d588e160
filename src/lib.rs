//! Territory capture server: GPS trails claim hexagonal cells, a ledger
//! tracks who holds each cell, and a WebSocket relay shares live runs.

pub mod config;
pub mod grid;
pub mod http;
pub mod ledger;
pub mod relay;
pub mod store;
pub mod telemetry;
pub mod util;
