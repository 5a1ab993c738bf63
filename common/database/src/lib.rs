use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError, Postgres,
};
use thiserror::Error;

/// Session timeouts applied to every pooled connection.
///
/// Link resolution is read-mostly, but the short id backfill and link creation
/// take a row lock on the owning team, so the lock timeout is looser than a
/// pure read path would want.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_secs(2),
    lock_timeout: Duration::from_millis(1000),
    acquire_timeout: Duration::from_millis(500),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
    idle_in_transaction_session_timeout: Duration::from_secs(15),
};

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub type PostgresClient = Arc<dyn Client + Send + Sync>;

/// A thin wrapper over the connection pool so callers can be handed
/// something other than a live `PgPool`.
#[async_trait]
pub trait Client {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError>;
}

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_in_transaction_session_timeout: Duration,
}

fn pool_options(max_connections: u32, timeouts: DatabaseTimeouts) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        .after_connect(move |conn, _meta| {
            let timeouts = timeouts.clone();
            Box::pin(async move {
                let stmt_ms = i64::try_from(timeouts.statement_timeout.as_millis()).unwrap_or(i64::MAX);
                let lock_ms = i64::try_from(timeouts.lock_timeout.as_millis()).unwrap_or(i64::MAX);
                let idle_tx_secs =
                    i64::try_from(timeouts.idle_in_transaction_session_timeout.as_secs())
                        .unwrap_or(i64::MAX);

                // SET does not accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{stmt_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;
                sqlx::query(&format!(
                    "SET idle_in_transaction_session_timeout = '{idle_tx_secs}s'"
                ))
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
}

/// Connects eagerly, failing if the database cannot be reached right now.
pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    pool_options(max_connections, timeouts).connect(url).await
}

/// Builds a pool that opens connections on first use. Only the URL is
/// validated here, so a database that is down at start-up surfaces later
/// as acquire errors instead of a boot failure.
pub fn get_lazy_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    pool_options(max_connections, DEFAULT_TIMEOUTS).connect_lazy(url)
}

#[async_trait]
impl Client for PgPool {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        let conn = self.acquire().await?;
        Ok(conn)
    }
}

/// Determines if a sqlx::Error represents a unique constraint violation
pub fn is_unique_violation(error: &SqlxError) -> bool {
    match error {
        SqlxError::Database(db_error) => {
            // 23505 = unique_violation
            // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
            if let Some(code) = db_error.code() {
                code.as_ref() == "23505"
            } else {
                db_error.is_unique_violation()
                    || db_error
                        .message()
                        .to_lowercase()
                        .contains("violates unique constraint")
            }
        }
        _ => false,
    }
}

/// Determines if a sqlx::Error represents a timeout-related failure
pub fn is_timeout_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::PoolTimedOut => true,
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => true,
        SqlxError::Protocol(msg) => msg.to_lowercase().contains("timeout"),
        SqlxError::Database(db_error) => {
            if let Some(code) = db_error.code() {
                // 57014: query_canceled (statement_timeout)
                // 55P03: lock_not_available (lock_timeout)
                // 25P03: idle_in_transaction_session_timeout
                matches!(code.as_ref(), "57014" | "55P03" | "25P03")
            } else {
                let msg = db_error.message().to_lowercase();
                msg.contains("timeout") || msg.contains("canceling") || msg.contains("cancelling")
            }
        }
        _ => false,
    }
}

/// Determines if a sqlx::Error means the database cannot be reached at all,
/// as opposed to a query that reached it and failed.
pub fn is_unavailable_error(error: &SqlxError) -> bool {
    match error {
        SqlxError::Io(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::Tls(_) => true,
        SqlxError::Database(db_error) => match db_error.code() {
            // 08***  Connection Exception
            // 57P01..57P03  admin shutdown, crash shutdown, cannot connect now
            Some(code) => {
                let code = code.as_ref();
                code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
            }
            None => false,
        },
        _ => false,
    }
}
