//! Connection pool construction and migration bootstrap, grounded on
//! `eventually-postgres`'s `Store::new` (which runs `crate::MIGRATIONS`
//! before handing back a usable store).

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use streamvault::config::Config;
use streamvault::retention::RetentionPolicyProvider;
use streamvault::Result;

use crate::error;

static MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Shared connection pool plus the `store_name` every query is scoped to.
#[derive(Clone)]
pub struct PostgresBackend {
    pub(crate) pool: PgPool,
    pub(crate) store_name: String,
    pub(crate) retention_policy: Arc<RetentionPolicyProvider>,
}

impl PostgresBackend {
    /// Connect, optionally pin the session to `schema_name`, and run the
    /// embedded migrations before returning.
    pub async fn connect(config: &Config, retention_policy: Arc<RetentionPolicyProvider>) -> Result<Self> {
        let schema_name = config.schema_name.clone();

        let pool = PgPoolOptions::new()
            .after_connect(move |conn, _meta| {
                let schema_name = schema_name.clone();
                Box::pin(async move {
                    if let Some(schema) = schema_name {
                        sqlx::query(&format!("SET search_path TO \"{schema}\""))
                            .execute(conn)
                            .await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.connection_string)
            .await
            .map_err(error::backend)?;

        MIGRATIONS.run(&pool).await.map_err(error::migrate)?;

        Ok(Self { pool, store_name: config.store_name.clone(), retention_policy })
    }

    /// Wrap an already-constructed pool, skipping connection setup. Useful
    /// for tests that already hold a pool from a running container.
    pub fn from_pool(pool: PgPool, store_name: impl Into<String>, retention_policy: Arc<RetentionPolicyProvider>) -> Self {
        Self { pool, store_name: store_name.into(), retention_policy }
    }

    /// Run the embedded migrations against an existing pool.
    pub async fn run_migrations(pool: &PgPool) -> Result<()> {
        MIGRATIONS.run(pool).await.map_err(error::migrate)
    }
}
