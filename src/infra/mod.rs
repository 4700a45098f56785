pub mod error;
pub mod files;
pub mod http;
pub mod telemetry;
