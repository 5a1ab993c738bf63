use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use common_database::{get_lazy_pool, get_pool};
use health::HealthRegistry;
use sqlx::PgPool;

use crate::{
    analytics::recorder::AnalyticsRecorder,
    config::Config,
    resolution::resolution_service::LinkResolver,
    store::{postgres::PgLinkStore, LinkStoreRef, UnconfiguredStore},
};

#[derive(Clone)]
pub struct State {
    pub store: LinkStoreRef,
    pub resolver: LinkResolver,
    pub customer_id_header: HeaderName,
    pub liveness: HealthRegistry,
    pub enable_metrics: bool,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: LinkStoreRef = match &config.database_url {
            Some(url) => Arc::new(PgLinkStore::new(Arc::new(
                connect_postgres(url, config).await?,
            ))),
            None => {
                tracing::warn!("DATABASE_URL is not set, storage requests will answer 503");
                Arc::new(UnconfiguredStore)
            }
        };

        Self::with_store(store, config)
    }

    pub fn with_store(store: LinkStoreRef, config: &Config) -> Result<Self> {
        let customer_id_header = HeaderName::try_from(config.customer_id_header.as_str())
            .with_context(|| {
                format!("Invalid CUSTOMER_ID_HEADER: {}", config.customer_id_header)
            })?;

        let recorder = AnalyticsRecorder::new(store.clone(), config.analytics_write_timeout());
        let resolver = LinkResolver::new(store.clone(), recorder);

        Ok(State {
            store,
            resolver,
            customer_id_header,
            liveness: HealthRegistry::new("liveness"),
            enable_metrics: config.enable_metrics,
        })
    }
}

/// An unreachable database does not stop the service from booting: the pool
/// falls back to connecting on demand and requests answer 503 until it is up.
async fn connect_postgres(url: &str, config: &Config) -> Result<PgPool> {
    match get_pool(url, config.max_pg_connections).await {
        Ok(pool) => {
            tracing::info!("Successfully created Postgres client");
            if config.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run migrations")?;
                tracing::info!("Migrations applied");
            }
            Ok(pool)
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                max_connections = config.max_pg_connections,
                "Failed to create Postgres client, connecting lazily"
            );
            get_lazy_pool(url, config.max_pg_connections).context("Invalid DATABASE_URL")
        }
    }
}
