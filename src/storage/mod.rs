pub mod bloom_filter;
pub mod exact_index;
pub mod ingest;
