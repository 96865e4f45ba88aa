//! [`ArchiveBackend`] / [`ArchiveTransaction`] implementation: the segment
//! commit protocol of §4.5 as one Postgres transaction.

use async_trait::async_trait;
use sqlx::{Postgres, Row, Transaction};
use streamvault::archive::{ArchiveBackend, ArchiveTransaction};
use streamvault::model::{ArchiveSegment, NewSegment, SegmentStatus};
use streamvault::Result;

use crate::error::backend;
use crate::pool::PostgresBackend;

pub struct PostgresArchiveTransaction {
    tx: Transaction<'static, Postgres>,
    store_name: String,
}

#[async_trait]
impl ArchiveTransaction for PostgresArchiveTransaction {
    async fn has_overlapping_segment(&mut self, min_position: i64, max_position: i64) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT EXISTS (
                 SELECT 1 FROM archive_segments
                 WHERE store_name = $1 AND status = 'active' AND min_position <= $3 AND max_position >= $2
               ) AS overlaps"#,
        )
        .bind(&self.store_name)
        .bind(min_position)
        .bind(max_position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(backend)?;

        row.try_get("overlaps").map_err(backend)
    }

    async fn insert_segment(&mut self, segment: NewSegment) -> Result<ArchiveSegment> {
        let row = sqlx::query(
            r#"INSERT INTO archive_segments (store_name, min_position, max_position, file_name, status, stream_namespace)
               VALUES ($1, $2, $3, $4, 'active', $5)
               RETURNING segment_id"#,
        )
        .bind(&self.store_name)
        .bind(segment.min_position)
        .bind(segment.max_position)
        .bind(&segment.file_name)
        .bind(&segment.stream_namespace)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(backend)?;

        Ok(ArchiveSegment {
            segment_id: row.try_get("segment_id").map_err(backend)?,
            min_position: segment.min_position,
            max_position: segment.max_position,
            file_name: segment.file_name,
            status: SegmentStatus::Active,
            stream_namespace: segment.stream_namespace,
        })
    }

    async fn delete_hot_events_up_to(&mut self, domain: &str, stream_id: &str, cutoff_version: u32) -> Result<()> {
        sqlx::query(
            r#"DELETE FROM events WHERE store_name = $1 AND domain = $2 AND stream_id = $3 AND stream_version <= $4"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(cutoff_version as i32)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn hard_delete_stream(&mut self, domain: &str, stream_id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM events WHERE store_name = $1 AND domain = $2 AND stream_id = $3"#)
            .bind(&self.store_name)
            .bind(domain)
            .bind(stream_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        sqlx::query(r#"DELETE FROM stream_headers WHERE store_name = $1 AND domain = $2 AND stream_id = $3"#)
            .bind(&self.store_name)
            .bind(domain)
            .bind(stream_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        Ok(())
    }

    async fn mark_archived(&mut self, domain: &str, stream_id: &str, cutoff_version: u32) -> Result<()> {
        sqlx::query(
            r#"UPDATE stream_headers SET archived_at = now()
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3 AND archive_cutoff_version = $4"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(cutoff_version as i32)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(backend)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(backend)
    }
}

#[async_trait]
impl ArchiveBackend for PostgresBackend {
    async fn begin_archive_transaction(&self) -> Result<Box<dyn ArchiveTransaction>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await.map_err(backend)?;
        Ok(Box::new(PostgresArchiveTransaction { tx, store_name: self.store_name.clone() }))
    }
}
