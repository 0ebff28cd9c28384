//! Config structs shared by every binary in the workspace. Kept separate
//! from the `dispatcher` binary crate's `clap::Parser` arguments because
//! some of these are loaded from a TOML send-config file rather than the
//! command line.

pub mod broker;
pub mod database;
pub mod deserialize_env;
pub mod hot_store;
pub mod http_client;
pub mod rate_limit;

pub use {
    broker::BrokerConfig,
    database::DatabasePoolConfig,
    hot_store::{BreakerConfig, HotStoreConfig},
    http_client::HttpClientConfig,
    rate_limit::RateLimitConfig,
};
