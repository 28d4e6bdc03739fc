//! In-memory repositories.
//!
//! Behave like the Postgres repositories, including idempotent membership
//! adds and `tm_create`-descending pagination. Either store can be told to
//! fail every call, which stands in for a database outage.

use chrono::{DateTime, Utc};
use conference_service::errors::ConferenceError;
use conference_service::models::{
    Conference, ConferenceFilter, ConferenceStatus, ConferenceUpdate, Conferencecall,
    ConferencecallFilter, ConferencecallStatus, ConferencecallUpdate,
};
use conference_service::repositories::{ConferenceRepository, ConferencecallRepository};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

fn injected() -> ConferenceError {
    ConferenceError::Database("injected database failure".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryConferenceRepository {
    rows: Mutex<HashMap<Uuid, Conference>>,
    failing: AtomicBool,
}

impl InMemoryConferenceRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Row as stored, bypassing failure injection.
    pub fn row(&self, id: Uuid) -> Option<Conference> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    /// Overwrite a row directly, e.g. to make it diverge from the cache.
    pub fn put(&self, conference: Conference) {
        self.rows.lock().unwrap().insert(conference.id, conference);
    }

    fn check(&self) -> Result<(), ConferenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(injected())
        } else {
            Ok(())
        }
    }

    fn modify(
        &self,
        id: Uuid,
        tm_update: DateTime<Utc>,
        f: impl FnOnce(&mut Conference),
    ) -> Result<bool, ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(conference) => {
                f(conference);
                conference.tm_update = Some(tm_update);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl ConferenceRepository for InMemoryConferenceRepository {
    async fn insert(&self, conference: &Conference) -> Result<(), ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&conference.id) {
            return Err(ConferenceError::Conflict(
                "conference_insert violates a unique key".to_string(),
            ));
        }
        rows.insert(conference.id, conference.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conference>, ConferenceError> {
        self.check()?;
        Ok(self.row(id))
    }

    async fn get_by_confbridge_id(
        &self,
        confbridge_id: Uuid,
    ) -> Result<Option<Conference>, ConferenceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|c| c.confbridge_id == confbridge_id)
            .max_by_key(|c| c.tm_create)
            .cloned())
    }

    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferenceFilter,
    ) -> Result<Vec<Conference>, ConferenceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let mut page: Vec<Conference> = rows
            .values()
            .filter(|c| c.tm_create < token && filter.matches(c))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.tm_create.cmp(&a.tm_create));
        page.truncate(size as usize);
        Ok(page)
    }

    async fn count_by_customer_id(&self, customer_id: Uuid) -> Result<u64, ConferenceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|c| c.customer_id == customer_id && !c.is_deleted())
            .count() as u64)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &ConferenceUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_update, |c| update.apply(c))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferenceStatus],
        status: ConferenceStatus,
        tm_end: Option<DateTime<Utc>>,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(conference) if from.contains(&conference.status) => {
                conference.status = status;
                if tm_end.is_some() {
                    conference.tm_end = tm_end;
                }
                conference.tm_update = Some(tm_update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_update, |c| {
            if !c.conferencecall_ids.contains(&conferencecall_id) {
                c.conferencecall_ids.push(conferencecall_id);
            }
        })
    }

    async fn remove_conferencecall_id(
        &self,
        id: Uuid,
        conferencecall_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_update, |c| {
            c.conferencecall_ids.retain(|m| *m != conferencecall_id);
        })
    }

    async fn append_recording_id(
        &self,
        id: Uuid,
        recording_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_update, |c| c.recording_ids.push(recording_id))
    }

    async fn append_transcribe_id(
        &self,
        id: Uuid,
        transcribe_id: Uuid,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_update, |c| c.transcribe_ids.push(transcribe_id))
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        tm_delete: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.modify(id, tm_delete, |c| c.tm_delete = Some(tm_delete))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryConferencecallRepository {
    rows: Mutex<HashMap<Uuid, Conferencecall>>,
    failing: AtomicBool,
}

impl InMemoryConferencecallRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn row(&self, id: Uuid) -> Option<Conferencecall> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn put(&self, conferencecall: Conferencecall) {
        self.rows
            .lock()
            .unwrap()
            .insert(conferencecall.id, conferencecall);
    }

    fn check(&self) -> Result<(), ConferenceError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(injected())
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ConferencecallRepository for InMemoryConferencecallRepository {
    async fn insert(&self, conferencecall: &Conferencecall) -> Result<(), ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&conferencecall.id) {
            return Err(ConferenceError::Conflict(
                "conferencecall_insert violates a unique key".to_string(),
            ));
        }
        rows.insert(conferencecall.id, conferencecall.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Conferencecall>, ConferenceError> {
        self.check()?;
        Ok(self.row(id))
    }

    async fn get_by_reference_id(
        &self,
        reference_id: Uuid,
    ) -> Result<Option<Conferencecall>, ConferenceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|cc| cc.reference_id == reference_id && !cc.is_deleted())
            .max_by_key(|cc| cc.tm_create)
            .cloned())
    }

    async fn list(
        &self,
        size: u32,
        token: DateTime<Utc>,
        filter: &ConferencecallFilter,
    ) -> Result<Vec<Conferencecall>, ConferenceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let mut page: Vec<Conferencecall> = rows
            .values()
            .filter(|cc| cc.tm_create < token && filter.matches(cc))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.tm_create.cmp(&a.tm_create));
        page.truncate(size as usize);
        Ok(page)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &ConferencecallUpdate,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(conferencecall) => {
                update.apply(conferencecall);
                conferencecall.tm_update = Some(tm_update);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: &[ConferencecallStatus],
        status: ConferencecallStatus,
        tm_update: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(conferencecall) if from.contains(&conferencecall.status) => {
                conferencecall.status = status;
                conferencecall.tm_update = Some(tm_update);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete(
        &self,
        id: Uuid,
        tm_delete: DateTime<Utc>,
    ) -> Result<bool, ConferenceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id) {
            Some(conferencecall) => {
                conferencecall.tm_delete = Some(tm_delete);
                conferencecall.tm_update = Some(tm_delete);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
