//! Repository for the `annotations` table.

use async_trait::async_trait;
use cuemark_core::types::DbId;
use cuemark_core::Annotation;
use cuemark_engine::{AnnotationRepository, RepositoryError};
use sqlx::PgPool;

use crate::models::annotation::{AnnotationColumns, AnnotationRow};
use crate::DbPool;

/// Column list for annotations queries.
const COLUMNS: &str = "session_id, id, document_index, source_offset, start_time, end_time, \
    volume, rate, mode, pause_seconds, created_at";

/// Provides the queries behind [`PgAnnotationRepository`].
pub struct AnnotationRepo;

impl AnnotationRepo {
    /// List a session's annotations in document order.
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<AnnotationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotations
             WHERE session_id = $1
             ORDER BY document_index ASC"
        );
        sqlx::query_as::<_, AnnotationRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// Delete everything stored for the session and insert `annotations`
    /// in order, inside one transaction.
    ///
    /// Returns the number of rows deleted.
    pub async fn replace_all(
        pool: &PgPool,
        session_id: DbId,
        annotations: &[Annotation],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM annotations WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for annotation in annotations {
            let cols = AnnotationColumns::from_annotation(annotation)
                .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

            sqlx::query(
                "INSERT INTO annotations
                    (session_id, id, document_index, source_offset, start_time, end_time,
                     volume, rate, mode, pause_seconds)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(session_id)
            .bind(annotation.id)
            .bind(cols.document_index)
            .bind(cols.source_offset)
            .bind(annotation.start_time)
            .bind(annotation.end_time)
            .bind(cols.volume)
            .bind(annotation.rate)
            .bind(annotation.mode.as_str())
            .bind(cols.pause_seconds)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// PgAnnotationRepository
// ---------------------------------------------------------------------------

/// [`AnnotationRepository`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgAnnotationRepository {
    pool: DbPool,
}

impl PgAnnotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnotationRepository for PgAnnotationRepository {
    async fn list_by_session(&self, session_id: DbId) -> Result<Vec<Annotation>, RepositoryError> {
        let rows = AnnotationRepo::list_by_session(&self.pool, session_id)
            .await
            .map_err(database)?;

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_annotation().map_err(|e| {
                    tracing::error!(session_id, annotation_id = %id, error = %e, "Corrupt annotation row");
                    RepositoryError::Corrupt(e.to_string())
                })
            })
            .collect()
    }

    async fn replace_all(
        &self,
        session_id: DbId,
        annotations: &[Annotation],
    ) -> Result<(), RepositoryError> {
        let deleted = AnnotationRepo::replace_all(&self.pool, session_id, annotations)
            .await
            .map_err(database)?;

        tracing::debug!(
            session_id,
            deleted,
            inserted = annotations.len(),
            "Annotations replaced"
        );
        Ok(())
    }
}

fn database(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}
