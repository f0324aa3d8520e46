//! Infrastructure adapters: storage backends, the HTTP surface, and
//! telemetry bootstrap.

pub mod db;
pub mod error;
pub mod http;
pub mod telemetry;
