pub mod api;
pub mod client;
pub mod config;
pub mod market_data;
pub mod telemetry;
