//! Conference service repositories.
//!
//! Durable stores are traits with Postgres implementations. [`Store`] puts
//! the entity cache in front of them and is the only storage type the
//! handlers see.

pub mod cache;
pub mod conferencecalls;
pub mod conferences;
pub mod store;

pub use cache::{CacheEntity, EntityCache};
pub use conferencecalls::{ConferencecallRepository, PgConferencecallRepository};
pub use conferences::{ConferenceRepository, PgConferenceRepository};
pub use store::Store;

use crate::errors::ConferenceError;
use crate::observability::MetricsSink;
use std::future::Future;
use std::time::Instant;
use tracing::warn;

/// Run a query, record its duration and outcome, and map the error.
///
/// Unique-key violations become `Conflict`; everything else `Database`.
pub(crate) async fn timed<T, F>(
    metrics: &dyn MetricsSink,
    operation: &'static str,
    query: F,
) -> Result<T, ConferenceError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = query.await;
    let status = if result.is_ok() { "success" } else { "error" };
    metrics.storage_query(operation, status, start.elapsed());

    result.map_err(|e| {
        warn!(target: "cs.repository", operation, error = %e, "Query failed");
        let unique_violation =
            matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
        if unique_violation {
            ConferenceError::Conflict(format!("{} violates a unique key", operation))
        } else {
            ConferenceError::from(e)
        }
    })
}
