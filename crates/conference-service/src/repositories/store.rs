//! Cache-aside storage layer.
//!
//! Reads try the cache, fall back to the database on a miss or cache error,
//! and repopulate the cache. Writes go to the database first; the cache is
//! then refreshed from the database, best-effort. A refresh that fails
//! invalidates the entry so the next read goes to the database.
//!
//! Cache failures never fail an operation. Database failures always do and
//! are never retried here.

use super::cache::{CacheEntity, EntityCache};
use super::conferencecalls::ConferencecallRepository;
use super::conferences::ConferenceRepository;
use crate::errors::ConferenceError;
use crate::models::{
    Conference, ConferenceFilter, ConferenceStatus, ConferenceUpdate, Conferencecall,
    ConferencecallFilter, ConferencecallStatus, ConferencecallUpdate,
};
use crate::services::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Page size used when a caller asks for 0.
pub const DEFAULT_LIST_SIZE: u32 = 100;

/// Largest page a caller can ask for.
pub const MAX_LIST_SIZE: u32 = 1000;

pub struct Store {
    conferences: Arc<dyn ConferenceRepository>,
    conferencecalls: Arc<dyn ConferencecallRepository>,
    conference_cache: Arc<dyn EntityCache<Conference>>,
    conferencecall_cache: Arc<dyn EntityCache<Conferencecall>>,
    clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(
        conferences: Arc<dyn ConferenceRepository>,
        conferencecalls: Arc<dyn ConferencecallRepository>,
        conference_cache: Arc<dyn EntityCache<Conference>>,
        conferencecall_cache: Arc<dyn EntityCache<Conferencecall>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conferences,
            conferencecalls,
            conference_cache,
            conferencecall_cache,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Conference
    // ------------------------------------------------------------------

    /// Persist a new room. `tm_create` is stamped here; the other
    /// timestamps start unset.
    #[instrument(skip_all, fields(conference_id = %conference.id))]
    pub async fn conference_create(&self, mut conference: Conference) -> Result<(), ConferenceError> {
        conference.tm_create = self.clock.now();
        conference.tm_update = None;
        conference.tm_delete = None;
        conference.tm_end = None;

        self.conferences.insert(&conference).await?;
        self.refresh_conference(conference.id).await;
        Ok(())
    }

    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn conference_get(&self, id: Uuid) -> Result<Conference, ConferenceError> {
        read_through(self.conference_cache.as_ref(), id, self.conferences.get(id))
            .await?
            .ok_or_else(|| ConferenceError::NotFound(format!("conference {} not found", id)))
    }

    #[instrument(skip_all, fields(confbridge_id = %confbridge_id))]
    pub async fn conference_get_by_confbridge_id(
        &self,
        confbridge_id: Uuid,
    ) -> Result<Conference, ConferenceError> {
        let conference = self
            .conferences
            .get_by_confbridge_id(confbridge_id)
            .await?
            .ok_or_else(|| {
                ConferenceError::NotFound(format!(
                    "conference with confbridge {} not found",
                    confbridge_id
                ))
            })?;

        populate(self.conference_cache.as_ref(), &conference).await;
        Ok(conference)
    }

    /// Page of rooms created before `token` (or before now), newest first.
    pub async fn conference_list(
        &self,
        size: u32,
        token: Option<DateTime<Utc>>,
        filter: &ConferenceFilter,
    ) -> Result<Vec<Conference>, ConferenceError> {
        self.conferences
            .list(page_size(size), self.page_token(token), filter)
            .await
    }

    pub async fn conference_count_by_customer_id(
        &self,
        customer_id: Uuid,
    ) -> Result<u64, ConferenceError> {
        self.conferences.count_by_customer_id(customer_id).await
    }

    /// Write the set fields. `tm_update` is always stamped, even for an
    /// empty update.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn conference_update(
        &self,
        id: Uuid,
        update: &ConferenceUpdate,
    ) -> Result<(), ConferenceError> {
        let found = self.conferences.update(id, update, self.clock.now()).await?;
        self.finish_conference_write(id, found).await
    }

    /// Move the room forward to `status`. Returns false, writing nothing,
    /// when the stored status is already `status` or later.
    #[instrument(skip_all, fields(conference_id = %id, status = %status))]
    pub async fn conference_advance_status(
        &self,
        id: Uuid,
        status: ConferenceStatus,
    ) -> Result<bool, ConferenceError> {
        let applied = self
            .conferences
            .update_status(id, &status.predecessors(), status, None, self.clock.now())
            .await?;
        self.finish_conference_transition(id, applied).await
    }

    /// Lifecycle completion: status terminated plus end and update stamps,
    /// in one write. Returns false for a room that was already terminated.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn conference_end(&self, id: Uuid) -> Result<bool, ConferenceError> {
        let now = self.clock.now();
        let applied = self
            .conferences
            .update_status(
                id,
                &ConferenceStatus::Terminated.predecessors(),
                ConferenceStatus::Terminated,
                Some(now),
                now,
            )
            .await?;
        self.finish_conference_transition(id, applied).await
    }

    /// Soft tombstone.
    #[instrument(skip_all, fields(conference_id = %id))]
    pub async fn conference_delete(&self, id: Uuid) -> Result<(), ConferenceError> {
        let found = self.conferences.soft_delete(id, self.clock.now()).await?;
        self.finish_conference_write(id, found).await
    }

    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    pub async fn conference_add_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
    ) -> Result<(), ConferenceError> {
        let found = self
            .conferences
            .add_conferencecall_id(id, conferencecall_id, self.clock.now())
            .await?;
        self.finish_conference_write(id, found).await
    }

    #[instrument(skip_all, fields(conference_id = %id, conferencecall_id = %conferencecall_id))]
    pub async fn conference_remove_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
    ) -> Result<(), ConferenceError> {
        let found = self
            .conferences
            .remove_conferencecall_id(id, conferencecall_id, self.clock.now())
            .await?;
        self.finish_conference_write(id, found).await
    }

    #[instrument(skip_all, fields(conference_id = %id, recording_id = %recording_id))]
    pub async fn conference_add_recording_id(
        &self,
        id: Uuid,
        recording_id: Uuid,
    ) -> Result<(), ConferenceError> {
        let found = self
            .conferences
            .append_recording_id(id, recording_id, self.clock.now())
            .await?;
        self.finish_conference_write(id, found).await
    }

    #[instrument(skip_all, fields(conference_id = %id, transcribe_id = %transcribe_id))]
    pub async fn conference_add_transcribe_id(
        &self,
        id: Uuid,
        transcribe_id: Uuid,
    ) -> Result<(), ConferenceError> {
        let found = self
            .conferences
            .append_transcribe_id(id, transcribe_id, self.clock.now())
            .await?;
        self.finish_conference_write(id, found).await
    }

    async fn finish_conference_write(&self, id: Uuid, found: bool) -> Result<(), ConferenceError> {
        if !found {
            return Err(ConferenceError::NotFound(format!(
                "conference {} not found",
                id
            )));
        }
        self.refresh_conference(id).await;
        Ok(())
    }

    /// A guarded write that matched nothing is either a missing row or a
    /// status that already moved on. The cache is refreshed in both cases.
    async fn finish_conference_transition(
        &self,
        id: Uuid,
        applied: bool,
    ) -> Result<bool, ConferenceError> {
        if applied {
            self.refresh_conference(id).await;
            return Ok(true);
        }

        let current = self.conferences.get(id).await?;
        let exists = current.is_some();
        refresh(self.conference_cache.as_ref(), id, Ok(current)).await;
        if !exists {
            return Err(ConferenceError::NotFound(format!(
                "conference {} not found",
                id
            )));
        }
        Ok(false)
    }

    async fn refresh_conference(&self, id: Uuid) {
        let fresh = self.conferences.get(id).await;
        refresh(self.conference_cache.as_ref(), id, fresh).await;
    }

    // ------------------------------------------------------------------
    // Conferencecall
    // ------------------------------------------------------------------

    #[instrument(skip_all, fields(conferencecall_id = %conferencecall.id))]
    pub async fn conferencecall_create(
        &self,
        mut conferencecall: Conferencecall,
    ) -> Result<(), ConferenceError> {
        conferencecall.tm_create = self.clock.now();
        conferencecall.tm_update = None;
        conferencecall.tm_delete = None;

        self.conferencecalls.insert(&conferencecall).await?;
        self.refresh_conferencecall(conferencecall.id).await;
        Ok(())
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    pub async fn conferencecall_get(&self, id: Uuid) -> Result<Conferencecall, ConferenceError> {
        read_through(
            self.conferencecall_cache.as_ref(),
            id,
            self.conferencecalls.get(id),
        )
        .await?
        .ok_or_else(|| ConferenceError::NotFound(format!("conferencecall {} not found", id)))
    }

    #[instrument(skip_all, fields(reference_id = %reference_id))]
    pub async fn conferencecall_get_by_reference_id(
        &self,
        reference_id: Uuid,
    ) -> Result<Conferencecall, ConferenceError> {
        let conferencecall = self
            .conferencecalls
            .get_by_reference_id(reference_id)
            .await?
            .ok_or_else(|| {
                ConferenceError::NotFound(format!(
                    "conferencecall with reference {} not found",
                    reference_id
                ))
            })?;

        populate(self.conferencecall_cache.as_ref(), &conferencecall).await;
        Ok(conferencecall)
    }

    pub async fn conferencecall_list(
        &self,
        size: u32,
        token: Option<DateTime<Utc>>,
        filter: &ConferencecallFilter,
    ) -> Result<Vec<Conferencecall>, ConferenceError> {
        self.conferencecalls
            .list(page_size(size), self.page_token(token), filter)
            .await
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    pub async fn conferencecall_update(
        &self,
        id: Uuid,
        update: &ConferencecallUpdate,
    ) -> Result<(), ConferenceError> {
        let found = self
            .conferencecalls
            .update(id, update, self.clock.now())
            .await?;
        self.finish_conferencecall_write(id, found).await
    }

    /// Move the leg forward to `status`. Returns false, writing nothing,
    /// when the stored status is already `status` or later.
    #[instrument(skip_all, fields(conferencecall_id = %id, status = %status))]
    pub async fn conferencecall_advance_status(
        &self,
        id: Uuid,
        status: ConferencecallStatus,
    ) -> Result<bool, ConferenceError> {
        let applied = self
            .conferencecalls
            .update_status(id, &status.predecessors(), status, self.clock.now())
            .await?;
        self.finish_conferencecall_transition(id, applied).await
    }

    #[instrument(skip_all, fields(conferencecall_id = %id))]
    pub async fn conferencecall_delete(&self, id: Uuid) -> Result<(), ConferenceError> {
        let found = self
            .conferencecalls
            .soft_delete(id, self.clock.now())
            .await?;
        self.finish_conferencecall_write(id, found).await
    }

    async fn finish_conferencecall_write(
        &self,
        id: Uuid,
        found: bool,
    ) -> Result<(), ConferenceError> {
        if !found {
            return Err(ConferenceError::NotFound(format!(
                "conferencecall {} not found",
                id
            )));
        }
        self.refresh_conferencecall(id).await;
        Ok(())
    }

    async fn finish_conferencecall_transition(
        &self,
        id: Uuid,
        applied: bool,
    ) -> Result<bool, ConferenceError> {
        if applied {
            self.refresh_conferencecall(id).await;
            return Ok(true);
        }

        let current = self.conferencecalls.get(id).await?;
        let exists = current.is_some();
        refresh(self.conferencecall_cache.as_ref(), id, Ok(current)).await;
        if !exists {
            return Err(ConferenceError::NotFound(format!(
                "conferencecall {} not found",
                id
            )));
        }
        Ok(false)
    }

    async fn refresh_conferencecall(&self, id: Uuid) {
        let fresh = self.conferencecalls.get(id).await;
        refresh(self.conferencecall_cache.as_ref(), id, fresh).await;
    }

    fn page_token(&self, token: Option<DateTime<Utc>>) -> DateTime<Utc> {
        token.unwrap_or_else(|| self.clock.now() + Duration::seconds(1))
    }
}

fn page_size(size: u32) -> u32 {
    match size {
        0 => DEFAULT_LIST_SIZE,
        n => n.min(MAX_LIST_SIZE),
    }
}

async fn read_through<T, F>(
    cache: &dyn EntityCache<T>,
    id: Uuid,
    load: F,
) -> Result<Option<T>, ConferenceError>
where
    T: CacheEntity,
    F: Future<Output = Result<Option<T>, ConferenceError>>,
{
    match cache.get(id).await {
        Ok(Some(entity)) => return Ok(Some(entity)),
        Ok(None) => {}
        Err(e) => {
            debug!(target: "cs.cache", kind = T::KIND, id = %id, error = %e, "Cache read failed, using database");
        }
    }

    let loaded = load.await?;
    if let Some(entity) = &loaded {
        populate(cache, entity).await;
    }
    Ok(loaded)
}

async fn populate<T: CacheEntity>(cache: &dyn EntityCache<T>, entity: &T) {
    if let Err(e) = cache.set(entity).await {
        warn!(target: "cs.cache", kind = T::KIND, id = %entity.cache_id(), error = %e, "Failed to populate cache");
    }
}

/// Bring the cache in line with a fresh database read. Anything short of a
/// successful set leaves no entry behind.
async fn refresh<T: CacheEntity>(
    cache: &dyn EntityCache<T>,
    id: Uuid,
    fresh: Result<Option<T>, ConferenceError>,
) {
    let outcome = match fresh {
        Ok(Some(entity)) => cache.set(&entity).await,
        Ok(None) => cache.invalidate(id).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        warn!(target: "cs.cache", kind = T::KIND, id = %id, error = %e, "Cache refresh failed, invalidating");
        if let Err(e) = cache.invalidate(id).await {
            warn!(target: "cs.cache", kind = T::KIND, id = %id, error = %e, "Cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size() {
        assert_eq!(page_size(0), DEFAULT_LIST_SIZE);
        assert_eq!(page_size(10), 10);
        assert_eq!(page_size(5000), MAX_LIST_SIZE);
    }
}
