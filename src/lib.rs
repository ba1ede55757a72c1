pub mod config;
pub mod error;
pub mod feature_store;
pub mod features;
pub mod fetcher;
pub mod http_client;
pub mod lookup;
pub mod pipeline;
pub mod provider;
pub mod rate_limit;
pub mod raw_store;
pub mod records;
pub mod store;
