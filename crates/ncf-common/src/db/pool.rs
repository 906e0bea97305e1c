use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
    Timeouts,
};
use thiserror::Error;
use tokio_postgres::NoTls;
use tracing::{debug, instrument};

pub type PgPool = Pool;

/// Facet tables are read once at startup, one query per facet.
const MAPPING_POOL_SIZE: usize = 2;
const MAPPING_POOL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
    #[error("failed to get postgres connection: {0}")]
    Checkout(#[from] PoolError),
    #[error("database ping failed: {0}")]
    Ping(#[from] tokio_postgres::Error),
}

fn mapping_pool_config() -> PoolConfig {
    let mut pool = PoolConfig::new(MAPPING_POOL_SIZE);
    pool.timeouts = Timeouts {
        wait: Some(MAPPING_POOL_TIMEOUT),
        create: Some(MAPPING_POOL_TIMEOUT),
        recycle: None,
    };
    pool
}

/// Build the pool used to read facet vocabularies. No connection is opened.
pub fn create_pool_from_url(db_url: &str) -> Result<PgPool, DbPoolError> {
    let parsed = tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;
    if parsed.get_dbname().is_none() {
        return Err(DbPoolError::InvalidConfig(
            "database name is required to locate the facet tables".to_string(),
        ));
    }

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(mapping_pool_config());

    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    debug!(
        dbname = parsed.get_dbname(),
        max_size = MAPPING_POOL_SIZE,
        "mapping pool configured"
    );
    Ok(pool)
}

/// Build the pool and make sure one connection answers `SELECT 1` within the
/// checkout timeout, so a bad `DATABASE_URL` fails startup instead of the first load.
#[instrument(skip_all)]
pub async fn create_pool_from_url_checked(db_url: &str) -> Result<PgPool, DbPoolError> {
    let pool = create_pool_from_url(db_url)?;
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    drop(client);
    Ok(pool)
}
