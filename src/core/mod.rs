pub mod batch_driver;
pub mod engine_handle;
pub mod hash_key;
pub mod refresher;
pub mod snapshot;
pub mod suppression_engine;
