//! Conferences repository.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Membership and history arrays are mutated in a single UPDATE, never
//!   read-modify-write, so concurrent joins and leaves cannot lose each other

use super::timed;
use crate::errors::ConferenceError;
use crate::models::{
    Conference, ConferenceData, ConferenceFilter, ConferenceStatus, ConferenceUpdate,
};
use crate::observability::MetricsSink;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Durable store for conferences.
#[async_trait::async_trait]
pub trait ConferenceRepository: Send + Sync {
    async fn insert(&self, conference: &Conference) -> Result<(), ConferenceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Conference>, ConferenceError>;

    /// Most recently created room on a bridge.
    async fn get_by_confbridge_id(
        &self,
        confbridge_id: Uuid,
    ) -> Result<Option<Conference>, ConferenceError>;

    /// Page of rooms created strictly before `token`, newest first.
    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferenceFilter,
    ) -> Result<Vec<Conference>, ConferenceError>;

    /// Non-deleted rooms of a customer.
    async fn count_by_customer_id(&self, customer_id: Uuid) -> Result<u64, ConferenceError>;

    /// Write the set fields and stamp `tm_update`. Returns false when the
    /// row does not exist.
    async fn update(
        &self,
        id: Uuid,
        update: &ConferenceUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    /// Set `status`, and `tm_end` when given, only if the stored status is
    /// one of `from`. Returns false when the row is missing or its status
    /// is not in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferenceStatus],
        status: ConferenceStatus,
        tm_end: Option<DateTime<Utc>>,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    /// Add a leg to the membership set. Adding a present member is a no-op.
    async fn add_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    async fn remove_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    async fn append_recording_id(
        &self,
        id: Uuid,
        recording_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    async fn append_transcribe_id(
        &self,
        id: Uuid,
        transcribe_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError>;

    /// Soft delete: stamp `tm_delete` and `tm_update`.
    async fn soft_delete(&self, id: Uuid, tm_delete: DateTime<Utc>)
        -> Result<bool, ConferenceError>;
}

const CONFERENCE_COLUMNS: &str = r#"
    id, customer_id, confbridge_id, type, status, name, detail, data,
    timeout_seconds, pre_flow_id, post_flow_id, conferencecall_ids,
    recording_id, recording_ids, transcribe_id, transcribe_ids,
    tm_end, tm_create, tm_update, tm_delete
"#;

/// Postgres implementation of [`ConferenceRepository`].
#[derive(Clone)]
pub struct PgConferenceRepository {
    pool: PgPool,
    metrics: Arc<dyn MetricsSink>,
}

impl PgConferenceRepository {
    pub fn new(pool: PgPool, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { pool, metrics }
    }

    async fn fetch_one_by(
        &self,
        operation: &'static str,
        column: &'static str,
        value: Uuid,
    ) -> Result<Option<Conference>, ConferenceError> {
        let sql = format!(
            "SELECT {CONFERENCE_COLUMNS} FROM conference_conferences WHERE {column} = $1 \
             ORDER BY tm_create DESC LIMIT 1"
        );

        let row: Option<ConferenceRow> = timed(
            self.metrics.as_ref(),
            operation,
            sqlx::query_as(&sql).bind(value).fetch_optional(&self.pool),
        )
        .await?;

        row.map(Conference::try_from).transpose()
    }

    async fn mutate_array(
        &self,
        operation: &'static str,
        sql: &'static str,
        id: Uuid,
        element: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let result = timed(
            self.metrics.as_ref(),
            operation,
            sqlx::query(sql)
                .bind(id)
                .bind(element)
                .bind(tm_update)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl ConferenceRepository for PgConferenceRepository {
    #[instrument(skip_all, fields(conference_id = %conference.id))]
    async fn insert(&self, conference: &Conference) -> Result<(), ConferenceError> {
        timed(
            self.metrics.as_ref(),
            "conference_insert",
            sqlx::query(
                r#"
                INSERT INTO conference_conferences (
                    id, customer_id, confbridge_id, type, status, name, detail, data,
                    timeout_seconds, pre_flow_id, post_flow_id, conferencecall_ids,
                    recording_id, recording_ids, transcribe_id, transcribe_ids,
                    tm_end, tm_create, tm_update, tm_delete
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                        $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
                "#,
            )
            .bind(conference.id)
            .bind(conference.customer_id)
            .bind(conference.confbridge_id)
            .bind(conference.conference_type.as_str())
            .bind(conference.status.as_str())
            .bind(&conference.name)
            .bind(&conference.detail)
            .bind(Json(&conference.data))
            .bind(conference.timeout_seconds)
            .bind(conference.pre_flow_id)
            .bind(conference.post_flow_id)
            .bind(&conference.conferencecall_ids)
            .bind(conference.recording_id)
            .bind(&conference.recording_ids)
            .bind(conference.transcribe_id)
            .bind(&conference.transcribe_ids)
            .bind(conference.tm_end)
            .bind(conference.tm_create)
            .bind(conference.tm_update)
            .bind(conference.tm_delete)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Conference>, ConferenceError> {
        self.fetch_one_by("conference_get", "id", id).await
    }

    #[instrument(skip_all, fields(confbridge_id = %confbridge_id))]
    async fn get_by_confbridge_id(
        &self,
        confbridge_id: Uuid,
    ) -> Result<Option<Conference>, ConferenceError> {
        self.fetch_one_by("conference_get_by_confbridge_id", "confbridge_id", confbridge_id)
            .await
    }

    #[instrument(skip_all, fields(size = size))]
    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferenceFilter,
    ) -> Result<Vec<Conference>, ConferenceError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {CONFERENCE_COLUMNS} FROM conference_conferences WHERE tm_create < "
        ));
        qb.push_bind(token);

        if let Some(customer_id) = filter.customer_id {
            qb.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(conference_type) = filter.conference_type {
            qb.push(" AND type = ").push_bind(conference_type.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if !filter.include_deleted {
            qb.push(" AND tm_delete IS NULL");
        }

        qb.push(" ORDER BY tm_create DESC LIMIT ")
            .push_bind(i64::from(size));

        let rows: Vec<ConferenceRow> = timed(
            self.metrics.as_ref(),
            "conference_list",
            qb.build_query_as().fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(Conference::try_from).collect()
    }

    #[instrument(skip_all, fields(customer_id = %customer_id))]
    async fn count_by_customer_id(&self, customer_id: Uuid) -> Result<u64, ConferenceError> {
        let count: i64 = timed(
            self.metrics.as_ref(),
            "conference_count_by_customer_id",
            sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM conference_conferences
                WHERE customer_id = $1 AND tm_delete IS NULL
                "#,
            )
            .bind(customer_id)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    async fn update(
        &self,
        id: Uuid,
        update: &ConferenceUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE conference_conferences SET tm_update = ");
        qb.push_bind(tm_update);

        if let Some(name) = &update.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(detail) = &update.detail {
            qb.push(", detail = ").push_bind(detail.clone());
        }
        if let Some(data) = &update.data {
            qb.push(", data = ").push_bind(Json(data.clone()));
        }
        if let Some(timeout_seconds) = update.timeout_seconds {
            qb.push(", timeout_seconds = ").push_bind(timeout_seconds);
        }
        if let Some(pre_flow_id) = update.pre_flow_id {
            qb.push(", pre_flow_id = ").push_bind(pre_flow_id);
        }
        if let Some(post_flow_id) = update.post_flow_id {
            qb.push(", post_flow_id = ").push_bind(post_flow_id);
        }
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(recording_id) = update.recording_id {
            qb.push(", recording_id = ").push_bind(recording_id);
        }
        if let Some(transcribe_id) = update.transcribe_id {
            qb.push(", transcribe_id = ").push_bind(transcribe_id);
        }
        if let Some(tm_end) = update.tm_end {
            qb.push(", tm_end = ").push_bind(tm_end);
        }

        qb.push(" WHERE id = ").push_bind(id);

        let result = timed(
            self.metrics.as_ref(),
            "conference_update",
            qb.build().execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(conference_id = %id, status = %status))]
    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferenceStatus],
        status: ConferenceStatus,
        tm_end: Option<DateTime<Utc>>,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();

        let result = timed(
            self.metrics.as_ref(),
            "conference_update_status",
            sqlx::query(
                r#"
                UPDATE conference_conferences
                SET status = $2, tm_end = COALESCE($3, tm_end), tm_update = $4
                WHERE id = $1 AND status = ANY($5)
                "#,
            )
            .bind(id)
            .bind(status.as_str())
            .bind(tm_end)
            .bind(tm_update)
            .bind(from)
            .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    async fn add_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.mutate_array(
            "conference_add_conferencecall_id",
            r#"
            UPDATE conference_conferences
            SET conferencecall_ids = CASE
                    WHEN $2 = ANY(conferencecall_ids) THEN conferencecall_ids
                    ELSE array_append(conferencecall_ids, $2)
                END,
                tm_update = $3
            WHERE id = $1
            "#,
            id,
            conferencecall_id,
            tm_update,
        )
        .await
    }

    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    async fn remove_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.mutate_array(
            "conference_remove_conferencecall_id",
            r#"
            UPDATE conference_conferences
            SET conferencecall_ids = array_remove(conferencecall_ids, $2),
                tm_update = $3
            WHERE id = $1
            "#,
            id,
            conferencecall_id,
            tm_update,
        )
        .await
    }

    #[instrument(skip_all, fields(conference_id = %id, recording_id = %recording_id))]
    async fn append_recording_id(
        &self,
        id: Uuid,
        recording_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.mutate_array(
            "conference_append_recording_id",
            r#"
            UPDATE conference_conferences
            SET recording_ids = array_append(recording_ids, $2),
                tm_update = $3
            WHERE id = $1
            "#,
            id,
            recording_id,
            tm_update,
        )
        .await
    }

    #[instrument(skip_all, fields(conference_id = %id, transcribe_id = %transcribe_id))]
    async fn append_transcribe_id(
        &self,
        id: Uuid,
        transcribe_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.mutate_array(
            "conference_append_transcribe_id",
            r#"
            UPDATE conference_conferences
            SET transcribe_ids = array_append(transcribe_ids, $2),
                tm_update = $3
            WHERE id = $1
            "#,
            id,
            transcribe_id,
            tm_update,
        )
        .await
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    async fn soft_delete(
        &self,
        id: Uuid,
        tm_delete: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        let result = timed(
            self.metrics.as_ref(),
            "conference_soft_delete",
            sqlx::query(
                r#"
                UPDATE conference_conferences
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
struct ConferenceRow {
    id: Uuid,
    customer_id: Uuid,
    confbridge_id: Uuid,
    #[sqlx(rename = "type")]
    conference_type: String,
    status: String,
    name: String,
    detail: String,
    data: Json<ConferenceData>,
    timeout_seconds: i32,
    pre_flow_id: Option<Uuid>,
    post_flow_id: Option<Uuid>,
    conferencecall_ids: Vec<Uuid>,
    recording_id: Option<Uuid>,
    recording_ids: Vec<Uuid>,
    transcribe_id: Option<Uuid>,
    transcribe_ids: Vec<Uuid>,
    tm_end: Option<DateTime<Utc>>,
    tm_create: DateTime<Utc>,
    tm_update: Option<DateTime<Utc>>,
    tm_delete: Option<DateTime<Utc>>,
}

impl TryFrom<ConferenceRow> for Conference {
    type Error = ConferenceError;

    fn try_from(row: ConferenceRow) -> Result<Self, Self::Error> {
        let conference_type = row.conference_type.parse().map_err(|_| {
            ConferenceError::Database(format!("stored conference has invalid type '{}'", row.conference_type))
        })?;
        let status = row.status.parse().map_err(|_| {
            ConferenceError::Database(format!("stored conference has invalid status '{}'", row.status))
        })?;

        Ok(Conference {
            id: row.id,
            customer_id: row.customer_id,
            confbridge_id: row.confbridge_id,
            conference_type,
            status,
            name: row.name,
            detail: row.detail,
            data: row.data.0,
            timeout_seconds: row.timeout_seconds,
            pre_flow_id: row.pre_flow_id,
            post_flow_id: row.post_flow_id,
            conferencecall_ids: row.conferencecall_ids,
            recording_id: row.recording_id,
            recording_ids: row.recording_ids,
            transcribe_id: row.transcribe_id,
            transcribe_ids: row.transcribe_ids,
            tm_end: row.tm_end,
            tm_create: row.tm_create,
            tm_update: row.tm_update,
            tm_delete: row.tm_delete,
        })
    }
}
