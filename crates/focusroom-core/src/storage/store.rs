//! SQLite-backed session store and reward ledger.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::database::Database;
use crate::error::{CoreError, Result};
use crate::session::{
    NewSessionRecord, RecordId, RewardLedger, SessionOutcome, SessionRecord, SessionStore,
};

/// Shares one [`Database`] between the engine's store and ledger roles.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open the default on-disk database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Ok(Self::new(Database::open()?))
    }

    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::new(Database::open_memory()?))
    }

    /// Lock the underlying database for direct queries.
    ///
    /// # Errors
    /// Returns an error if a previous holder panicked.
    pub fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| CoreError::Custom("database mutex poisoned".into()))
    }
}

impl SessionStore for SqliteStore {
    fn create_record(&self, new: &NewSessionRecord) -> Result<RecordId> {
        let id = RecordId::generate();
        self.lock()?.insert_session(&id, new)?;
        Ok(id)
    }

    fn finalize(&self, id: &RecordId, outcome: &SessionOutcome) -> Result<SessionRecord> {
        self.lock()?.finalize_session(id, outcome, Utc::now())
    }

    fn discard(&self, id: &RecordId) -> Result<()> {
        self.lock()?.delete_session(id)
    }
}

impl RewardLedger for SqliteStore {
    fn credit(&self, amount: u64, reason: &str) -> Result<u64> {
        let delta = i64::try_from(amount).unwrap_or(i64::MAX);
        self.lock()?.apply_ledger_delta(delta, reason)
    }

    fn debit(&self, amount: u64, reason: &str) -> Result<u64> {
        let delta = i64::try_from(amount).map_or(i64::MIN, |a| -a);
        self.lock()?.apply_ledger_delta(delta, reason)
    }

    fn balance(&self) -> Result<u64> {
        self.lock()?.balance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::timer::DisciplineMode;

    #[test]
    fn store_and_ledger_share_database() {
        let store = SqliteStore::open_memory().unwrap();
        let id = store
            .create_record(&NewSessionRecord {
                mode: DisciplineMode::Hardcore,
                started_at: Utc::now(),
                kind: "freeRunning".into(),
                task_ref: None,
                planned_work_secs: 600,
            })
            .unwrap();
        let record = store.finalize(&id, &SessionOutcome::completed(20)).unwrap();
        assert_eq!(record.status, SessionStatus::Completed);

        assert_eq!(store.credit(20, "session completed").unwrap(), 20);
        assert_eq!(store.debit(15, "Session aborted").unwrap(), 5);
        assert_eq!(store.debit(15, "Session aborted").unwrap(), 0);

        let stats = store.lock().unwrap().stats().unwrap();
        assert_eq!(stats.completed_sessions, 1);
        assert_eq!(stats.balance, 0);
    }
}
