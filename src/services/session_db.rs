//! Session store using RocksDB.
//!
//! RocksDB provides crash safety through its LSM-tree architecture and
//! write-ahead log (WAL). All writes are atomic and durable.
//!
//! # Data Organization
//!
//! Uses column families to separate data types:
//! - `sessions`: session rows (key: session id, value: JSON)
//! - `session_state`: state index (key: `{state}:{session id}`)
//!
//! Every row update goes through a `WriteBatch` that keeps the state index
//! in step with the row, so a query by state never observes a session under
//! a stale state key.

use crate::error::{AppError, Result};
use crate::models::{UploadSession, UploadState};
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

type DB = DBWithThreadMode<MultiThreaded>;

/// Column family names
const CF_SESSIONS: &str = "sessions";
const CF_SESSION_STATE: &str = "session_state";

/// Persistent store for upload sessions
#[derive(Clone)]
pub struct SessionDb {
    db: Arc<DB>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SessionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDb")
            .field("path", &self.db_path)
            .finish()
    }
}

fn state_key(state: UploadState, session_id: &str) -> String {
    format!("{}:{}", state.as_str(), session_id)
}

impl SessionDb {
    /// Open (or create) the session store at `path`
    pub fn new(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(3);
        opts.set_max_total_wal_size(64 * 1024 * 1024); // 64MB
        opts.set_write_buffer_size(32 * 1024 * 1024); // 32MB
        opts.set_max_write_buffer_number(3);

        let cf_descriptors: Vec<_> = [CF_SESSIONS, CF_SESSION_STATE]
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| AppError::internal(format!("Failed to open session store: {}", e)))?;

        info!(path = %path.display(), "Session store initialized (RocksDB)");

        Ok(Self {
            db: Arc::new(db),
            db_path: path.to_path_buf(),
        })
    }

    fn cf_sessions(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db
            .cf_handle(CF_SESSIONS)
            .expect("CF sessions must exist")
    }

    fn cf_session_state(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db
            .cf_handle(CF_SESSION_STATE)
            .expect("CF session_state must exist")
    }

    /// Insert a new session row plus its state-index entry
    pub fn insert(&self, session: &UploadSession) -> Result<()> {
        let data = serde_json::to_vec(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf_sessions(), session.id.as_bytes(), &data);
        batch.put_cf(
            &self.cf_session_state(),
            state_key(session.state, &session.id).as_bytes(),
            session.id.as_bytes(),
        );

        self.db
            .write(batch)
            .map_err(|e| AppError::internal(format!("Session store write failed: {}", e)))?;

        debug!(id = %session.id, "Inserted upload session");
        Ok(())
    }

    /// Get a session by id
    pub fn get(&self, id: &str) -> Result<Option<UploadSession>> {
        match self
            .db
            .get_cf(&self.cf_sessions(), id.as_bytes())
            .map_err(|e| AppError::internal(format!("Session store read failed: {}", e)))?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Update a session row, moving its state-index entry if the state changed
    pub fn update(&self, session: &UploadSession) -> Result<()> {
        let old_session = self.get(&session.id)?;

        let data = serde_json::to_vec(session)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf_sessions(), session.id.as_bytes(), &data);

        if let Some(old) = old_session {
            if old.state != session.state {
                batch.delete_cf(
                    &self.cf_session_state(),
                    state_key(old.state, &session.id).as_bytes(),
                );
                batch.put_cf(
                    &self.cf_session_state(),
                    state_key(session.state, &session.id).as_bytes(),
                    session.id.as_bytes(),
                );
            }
        }

        self.db
            .write(batch)
            .map_err(|e| AppError::internal(format!("Session store write failed: {}", e)))?;

        debug!(id = %session.id, state = %session.state.as_str(), "Updated upload session");
        Ok(())
    }

    /// Delete a session row and its state-index entry
    pub fn delete(&self, id: &str) -> Result<bool> {
        let session = match self.get(id)? {
            Some(s) => s,
            None => return Ok(false),
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(&self.cf_sessions(), id.as_bytes());
        batch.delete_cf(
            &self.cf_session_state(),
            state_key(session.state, id).as_bytes(),
        );

        self.db
            .write(batch)
            .map_err(|e| AppError::internal(format!("Session store delete failed: {}", e)))?;

        Ok(true)
    }

    /// Ids of all sessions currently in `state`, via the state index
    pub fn sessions_in_state(&self, state: UploadState) -> Result<Vec<String>> {
        let prefix = format!("{}:", state.as_str());
        let mut ids = Vec::new();

        let iter = self.db.iterator_cf(
            &self.cf_session_state(),
            rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward),
        );

        for item in iter {
            let (key, value) =
                item.map_err(|e| AppError::internal(format!("Session store iterator error: {}", e)))?;

            if !key.starts_with(prefix.as_bytes()) {
                break;
            }

            ids.push(String::from_utf8_lossy(&value).into_owned());
        }

        Ok(ids)
    }

    /// Number of sessions currently in `state`
    pub fn count_in_state(&self, state: UploadState) -> Result<usize> {
        Ok(self.sessions_in_state(state)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (SessionDb, TempDir) {
        let temp = TempDir::new().unwrap();
        let db = SessionDb::new(&temp.path().join("sessions")).unwrap();
        (db, temp)
    }

    fn test_session() -> UploadSession {
        UploadSession::new(
            "test.png".to_string(),
            "image/png".to_string(),
            1000,
            "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            None,
            512,
        )
    }

    #[test]
    fn test_session_crud() {
        let (db, _temp) = create_test_db();
        let session = test_session();

        db.insert(&session).unwrap();

        let retrieved = db.get(&session.id).unwrap().unwrap();
        assert_eq!(retrieved.id, session.id);
        assert_eq!(retrieved.filename, "test.png");
        assert_eq!(retrieved.state, UploadState::Initiated);

        assert!(db.delete(&session.id).unwrap());
        assert!(db.get(&session.id).unwrap().is_none());
        assert!(!db.delete(&session.id).unwrap());
    }

    #[test]
    fn test_state_index_follows_updates() {
        let (db, _temp) = create_test_db();
        let mut session = test_session();

        db.insert(&session).unwrap();
        assert_eq!(
            db.sessions_in_state(UploadState::Initiated).unwrap(),
            vec![session.id.clone()]
        );

        session.record_chunk();
        db.update(&session).unwrap();

        assert!(db.sessions_in_state(UploadState::Initiated).unwrap().is_empty());
        assert_eq!(
            db.sessions_in_state(UploadState::Uploading).unwrap(),
            vec![session.id.clone()]
        );

        session.mark_cancelled();
        db.update(&session).unwrap();

        assert_eq!(db.count_in_state(UploadState::Uploading).unwrap(), 0);
        assert_eq!(db.count_in_state(UploadState::Cancelled).unwrap(), 1);
    }

    #[test]
    fn test_counters_persist() {
        let (db, _temp) = create_test_db();
        let mut session = test_session();
        db.insert(&session).unwrap();

        session.record_chunk();
        session.record_chunk();
        db.update(&session).unwrap();

        let retrieved = db.get(&session.id).unwrap().unwrap();
        assert_eq!(retrieved.uploaded_chunks, 2);
        assert!(retrieved.last_chunk_at.is_some());
    }
}
