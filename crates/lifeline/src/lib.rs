pub mod config;
pub mod error;
pub mod payments;
pub mod registry;
pub mod telemetry;
