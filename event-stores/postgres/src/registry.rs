//! [`SegmentRegistry`] implementation: plain reads against `archive_segments`.

use async_trait::async_trait;
use sqlx::Row;
use streamvault::archive::SegmentRegistry;
use streamvault::model::{ArchiveSegment, SegmentStatus};
use streamvault::Result;

use crate::error::backend;
use crate::pool::PostgresBackend;

fn row_to_segment(row: &sqlx::postgres::PgRow) -> Result<ArchiveSegment> {
    Ok(ArchiveSegment {
        segment_id: row.try_get("segment_id").map_err(backend)?,
        min_position: row.try_get("min_position").map_err(backend)?,
        max_position: row.try_get("max_position").map_err(backend)?,
        file_name: row.try_get("file_name").map_err(backend)?,
        status: SegmentStatus::Active,
        stream_namespace: row.try_get("stream_namespace").map_err(backend)?,
    })
}

#[async_trait]
impl SegmentRegistry for PostgresBackend {
    async fn find_overlapping(&self, min_position: i64, max_position: i64) -> Result<Vec<ArchiveSegment>> {
        let rows = sqlx::query(
            r#"SELECT segment_id, min_position, max_position, file_name, stream_namespace
               FROM archive_segments
               WHERE store_name = $1 AND status = 'active' AND min_position <= $3 AND max_position >= $2"#,
        )
        .bind(&self.store_name)
        .bind(min_position)
        .bind(max_position)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_segment).collect()
    }

    async fn list_active(&self) -> Result<Vec<ArchiveSegment>> {
        let rows = sqlx::query(
            r#"SELECT segment_id, min_position, max_position, file_name, stream_namespace
               FROM archive_segments
               WHERE store_name = $1 AND status = 'active'
               ORDER BY min_position ASC"#,
        )
        .bind(&self.store_name)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_segment).collect()
    }

    async fn get_max_archived_position(&self) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"SELECT MAX(max_position) AS max_position FROM archive_segments WHERE store_name = $1 AND status = 'active'"#,
        )
        .bind(&self.store_name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        row.try_get("max_position").map_err(backend)
    }
}
