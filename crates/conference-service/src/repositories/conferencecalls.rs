//! Conferencecalls repository.

use super::timed;
use crate::errors::ConferenceError;
use crate::models::{
    Conferencecall, ConferencecallFilter, ConferencecallStatus, ConferencecallUpdate,
};
use crate::observability::MetricsSink;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Durable store for participant legs.
#[async_trait::async_trait]
pub trait ConferencecallRepository: Send + Sync {
    async fn insert(&self, conferencecall: &Conferencecall) -> Result<(), ConferenceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Conferencecall>, ConferenceError>;

    /// Most recently created non-deleted leg for an external reference.
    async fn get_by_reference_id(
        &self,
        reference_id: Uuid,
    ) -> Result<Option<Conferencecall>, ConferenceError>;

    /// Page of legs created strictly before `token`, newest first.
    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferencecallFilter,
    ) -> Result<Vec<Conferencecall>, ConferenceError>;

    async fn update(
        &self,
        id: Uuid,
        update: &ConferencecallUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    /// Set `status` only if the stored status is one of `from`. Returns
    /// false when the row is missing or its status is not in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferencecallStatus],
        status: ConferencecallStatus,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    async fn soft_delete(
        &self,
        id: Uuid,
        tm_delete: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;
}

const CONFERENCECALL_COLUMNS: &str = r#"
    id, customer_id, activeflow_id, conference_id, reference_type, reference_id,
    status, tm_create, tm_update, tm_delete
"#;

/// Postgres implementation of [`ConferencecallRepository`].
#[derive(Clone)]
pub struct PgConferencecallRepository {
    pool: PgPool,
    metrics: Arc<dyn MetricsSink>,
}

impl PgConferencecallRepository {
    pub fn new(pool: PgPool, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { pool, metrics }
    }
}

#[async_trait::async_trait]
impl ConferencecallRepository for PgConferencecallRepository {
    #[instrument(skip_all, fields(conferencecall_id = %conferencecall.id))]
    async fn insert(&self, conferencecall: &Conferencecall) -> Result<(), ConferenceError> {
        timed(
            self.metrics.as_ref(),
            "conferencecall_insert",
            sqlx::query(
                r#"
                INSERT INTO conference_conferencecalls (
                    id, customer_id, activeflow_id, conference_id, reference_type,
                    reference_id, status, tm_create, tm_update, tm_delete
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(conferencecall.id)
            .bind(conferencecall.customer_id)
            .bind(conferencecall.activeflow_id)
            .bind(conferencecall.conference_id)
            .bind(conferencecall.reference_type.as_str())
            .bind(conferencecall.reference_id)
            .bind(conferencecall.status.as_str())
            .bind(conferencecall.tm_create)
            .bind(conferencecall.tm_update)
            .bind(conferencecall.tm_delete)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Conferencecall>, ConferenceError> {
        let sql = format!(
            "SELECT {CONFERENCECALL_COLUMNS} FROM conference_conferencecalls WHERE id = $1"
        );

        let row: Option<ConferencecallRow> = timed(
            self.metrics.as_ref(),
            "conferencecall_get",
            sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await?;

        row.map(Conferencecall::try_from).transpose()
    }

    #[instrument(skip_all, fields(reference_id = %reference_id))]
    async fn get_by_reference_id(
        &self,
        reference_id: Uuid,
    ) -> Result<Option<Conferencecall>, ConferenceError> {
        let sql = format!(
            "SELECT {CONFERENCECALL_COLUMNS} FROM conference_conferencecalls \
             WHERE reference_id = $1 AND tm_delete IS NULL \
             ORDER BY tm_create DESC LIMIT 1"
        );

        let row: Option<ConferencecallRow> = timed(
            self.metrics.as_ref(),
            "conferencecall_get_by_reference_id",
            sqlx::query_as(&sql)
                .bind(reference_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(Conferencecall::try_from).transpose()
    }

    #[instrument(skip_all, fields(size = size))]
    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferencecallFilter,
    ) -> Result<Vec<Conferencecall>, ConferenceError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {CONFERENCECALL_COLUMNS} FROM conference_conferencecalls WHERE tm_create < "
        ));
        qb.push_bind(token);

        if let Some(customer_id) = filter.customer_id {
            qb.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(conference_id) = filter.conference_id {
            qb.push(" AND conference_id = ").push_bind(conference_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if !filter.include_deleted {
            qb.push(" AND tm_delete IS NULL");
        }

        qb.push(" ORDER BY tm_create DESC LIMIT ")
            .push_bind(i64::from(size));

        let rows: Vec<ConferencecallRow> = timed(
            self.metrics.as_ref(),
            "conferencecall_list",
            qb.build_query_as().fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(Conferencecall::try_from).collect()
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    async fn update(
        &self,
        id: Uuid,
        update: &ConferencecallUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE conference_conferencecalls SET tm_update = ");
        qb.push_bind(tm_update);

        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status.as_str());
        }

        qb.push(" WHERE id = ").push_bind(id);

        let result = timed(
            self.metrics.as_ref(),
            "conferencecall_update",
            qb.build().execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(conferencecall_id = %id, status = %status))]
    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferencecallStatus],
        status: ConferencecallStatus,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

        let result = timed(
            self.metrics.as_ref(),
            "conferencecall_update_status",
            sqlx::query(
                r#"
                UPDATE conference_conferencecalls
                SET status = $2, tm_update = $3
                WHERE id = $1 AND status = ANY($4)
                "#,
            )
            .bind(id)
            .bind(status.as_str())
            .bind(tm_update)
            .bind(from)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    async fn soft_delete(
        &self,
        id: Uuid,
        tm_delete: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let result = timed(
            self.metrics.as_ref(),
            "conferencecall_soft_delete",
            sqlx::query(
                r#"
                UPDATE conference_conferencecalls
                SET tm_delete = $2, tm_update = $2
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(tm_delete)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct ConferencecallRow {
    id: Uuid,
    customer_id: Uuid,
    activeflow_id: Option<Uuid>,
    conference_id: Uuid,
    reference_type: String,
    reference_id: Uuid,
    status: String,
    tm_create: DateTime<Utc>,
    tm_update: Option<DateTime<Utc>>,
    tm_delete: Option<DateTime<Utc>>,
}

impl TryFrom<ConferencecallRow> for Conferencecall {
    type Error = ConferenceError;

    fn try_from(row: ConferencecallRow) -> Result<Self, Self::Error> {
        let reference_type = row.reference_type.parse().map_err(|_| {
            ConferenceError::Database(format!(
                "stored conferencecall has invalid reference type '{}'",
                row.reference_type
            ))
        })?;
        let status = row.status.parse().map_err(|_| {
            ConferenceError::Database(format!(
                "stored conferencecall has invalid status '{}'",
                row.status
            ))
        })?;

        Ok(Conferencecall {
            id: row.id,
            customer_id: row.customer_id,
            activeflow_id: row.activeflow_id,
            conference_id: row.conference_id,
            reference_type,
            reference_id: row.reference_id,
            status,
            tm_create: row.tm_create,
            tm_update: row.tm_update,
            tm_delete: row.tm_delete,
        })
    }
}
