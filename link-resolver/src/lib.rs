pub mod analytics;
pub mod api;
pub mod config;
pub mod identifier;
pub mod metrics_utils;
pub mod resolution;
pub mod router;
pub mod server;
pub mod slug;
pub mod state;
pub mod store;
pub mod teams;
pub mod utils;
