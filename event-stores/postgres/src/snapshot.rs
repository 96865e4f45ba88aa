//! [`SnapshotStore`] implementation: upsert-by-stream_id plus the
//! conditional cutoff advance described in §4.4.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use streamvault::snapshot::SnapshotStore;
use streamvault::{Result, Snapshot};

use crate::error::backend;
use crate::pool::PostgresBackend;

#[async_trait]
impl SnapshotStore for PostgresBackend {
    async fn save_snapshot(&self, stream_id: &str, version: u32, payload: Vec<u8>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO snapshots (store_name, stream_id, stream_version, payload, created_utc)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (store_name, stream_id)
               DO UPDATE SET stream_version = EXCLUDED.stream_version, payload = EXCLUDED.payload, created_utc = EXCLUDED.created_utc"#,
        )
        .bind(&self.store_name)
        .bind(stream_id)
        .bind(version as i32)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_latest(&self, stream_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            r#"SELECT stream_id, stream_version, payload, created_utc FROM snapshots
               WHERE store_name = $1 AND stream_id = $2"#,
        )
        .bind(&self.store_name)
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|row| {
            Ok(Snapshot {
                stream_id: row.try_get("stream_id").map_err(backend)?,
                stream_version: row.try_get::<i32, _>("stream_version").map_err(backend)? as u32,
                payload: row.try_get("payload").map_err(backend)?,
                created_utc: row.try_get("created_utc").map_err(backend)?,
            })
        })
        .transpose()
    }

    async fn try_advance_archive_cutoff(&self, domain: &str, stream_id: &str, new_cutoff: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE stream_headers SET archive_cutoff_version = $4
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3
                 AND (archive_cutoff_version IS NULL OR archive_cutoff_version < $4)"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(new_cutoff as i32)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
