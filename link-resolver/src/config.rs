use envconfig::Envconfig;
use std::{net::SocketAddr, str::FromStr, time::Duration};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3001")]
    pub address: SocketAddr,

    /// Unset means no storage: every storage-backed request answers 503.
    pub database_url: Option<String>,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(default = "false")]
    pub run_migrations: bool,

    #[envconfig(default = "false")]
    pub enable_metrics: bool,

    #[envconfig(default = "500")]
    pub analytics_write_timeout_ms: u64,

    /// Header the upstream session layer puts the authenticated customer in.
    #[envconfig(default = "x-customer-id")]
    pub customer_id_header: String,
}

impl Config {
    pub fn default_for_test() -> Self {
        Config {
            address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            database_url: None,
            max_pg_connections: 10,
            run_migrations: false,
            enable_metrics: false,
            analytics_write_timeout_ms: 500,
            customer_id_header: "x-customer-id".to_string(),
        }
    }

    pub fn analytics_write_timeout(&self) -> Duration {
        Duration::from_millis(self.analytics_write_timeout_ms)
    }
}
