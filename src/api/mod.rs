pub mod metrics;
pub mod rest_api;
