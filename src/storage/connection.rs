//! Single-file durable store: connection setup, pragmas, transactional helpers.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::{CortexError, Result};
use crate::types::{SizeInfo, StorageConfig, DB_SIZE_HARD_CAP_BYTES, DB_SIZE_WARN_BYTES};

/// Storage engine wrapping a single SQLite connection behind a mutex.
///
/// One writer at any instant is enforced by this mutex rather than relying
/// solely on SQLite's own file lock, since multiple async tasks in this
/// process share one connection handle.
pub struct Storage {
    config: StorageConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        run_migrations(&conn)?;
        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(StorageConfig {
            db_path: ":memory:".to_string(),
        })
    }

    fn create_connection(config: &StorageConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)?
        };

        Self::configure_pragmas(&conn)?;
        Ok(conn)
    }

    /// WAL mode, synchronous=NORMAL, foreign keys on, 5s busy-timeout
    /// (spec §4.1).
    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA wal_autocheckpoint=1000;
            PRAGMA busy_timeout=5000;
            PRAGMA cache_size=-64000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        Ok(())
    }

    pub fn connection(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Raw handle for constructing an [`crate::embedding::EmbeddingWorker`],
    /// which needs to lock the same connection the rest of `Storage` uses.
    pub fn conn_handle(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Ordinary deferred transaction; rolled back on error.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// `BEGIN IMMEDIATE`: acquires the write lock up front for multi-statement
    /// critical sections (consolidation, `access()`) so they serialize with
    /// other writers instead of racing to upgrade a deferred transaction.
    pub fn with_immediate_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    pub fn db_size_bytes(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let size: i64 = conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )?;
        Ok(size)
    }

    /// Size guard (spec §4.1/§6): warn above 50 MiB, refuse new writes above 100 MiB.
    pub fn size_info(&self) -> Result<SizeInfo> {
        let bytes = self.db_size_bytes()?;
        Ok(SizeInfo {
            bytes,
            warn: bytes >= DB_SIZE_WARN_BYTES,
            blocked: bytes >= DB_SIZE_HARD_CAP_BYTES,
        })
    }

    pub fn is_blocked(&self) -> Result<bool> {
        Ok(self.size_info()?.blocked)
    }

    /// Returns `over_capacity` if writes are currently refused.
    pub fn check_capacity(&self) -> Result<()> {
        let info = self.size_info()?;
        if info.blocked {
            return Err(CortexError::OverCapacity(format!(
                "database is {} bytes, over the {} byte cap; run consolidate + vacuum",
                info.bytes, DB_SIZE_HARD_CAP_BYTES
            )));
        }
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}
