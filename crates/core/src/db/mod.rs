//! SQLite persistence layer for LdapGroups.
//!
//! Provides a [`Database`] handle with WAL-mode journaling, automatic schema
//! migrations, and query helpers for user group memberships and the sync
//! audit log. [`Database::apply_login_sync`] runs a whole login sync, audit
//! entry included, inside one transaction.

pub mod queries;
pub mod schema;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::errors::{DatabaseError, StoreError, SyncError};
use crate::login::GroupSync;
use crate::models::{DirectoryEntry, GroupRef, UserId};
use crate::sync::{SyncOutcome, UserGroupStore};

/// Main database handle wrapping a SQLite connection.
///
/// The inner connection is wrapped in a `Mutex` so that `Database` is
/// `Send + Sync`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        debug!("database opened successfully with WAL mode");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an existing database without write access. No migrations run and
    /// nothing is created on disk.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database read-only");

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing and dry runs).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run all schema migrations to bring the database up to date.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        info!("initializing database schema");
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!("database schema is up to date");
        Ok(())
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// If the Mutex is poisoned, the lock is recovered rather than
    /// propagating a panic.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Execute a closure inside a SQLite transaction. If the closure returns
    /// `Ok`, the transaction is committed; otherwise it is rolled back.
    ///
    /// The connection stays locked for the duration of `f`, so `f` must use
    /// the connection it is given rather than other `Database` methods.
    pub fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let result = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(result)
    }

    /// Run `sync` for a login and record it in the audit log, atomically.
    ///
    /// Any failure rolls back every membership change of this login, so the
    /// user keeps the groups they held before.
    pub fn apply_login_sync(
        &self,
        sync: &GroupSync,
        server_name: &str,
        entry: &DirectoryEntry,
        user: Option<&UserId>,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let result = self.transaction(|conn| {
            let mut store = ConnectionStore::new(conn);
            let outcome = sync.on_user_resolved(server_name, entry, user, &mut store)?;
            if let Some(ref outcome) = outcome {
                queries::record_sync(conn, outcome, server_name)?;
            }
            Ok(outcome)
        });
        if let Err(ref e) = result {
            warn!(server = server_name, dn = %entry.dn, error = %e, "group sync rolled back");
        }
        result
    }
}

/// [`UserGroupStore`] over a borrowed connection, usually an open transaction.
pub struct ConnectionStore<'c> {
    conn: &'c Connection,
}

impl<'c> ConnectionStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl UserGroupStore for ConnectionStore<'_> {
    fn clear_groups(&mut self, user: &UserId) -> Result<(), StoreError> {
        queries::delete_user_groups(self.conn, user.as_str())?;
        Ok(())
    }

    fn add_group(&mut self, user: &UserId, group: &GroupRef) -> Result<(), StoreError> {
        queries::insert_user_group(self.conn, user.as_str(), group.as_str())?;
        Ok(())
    }

    fn groups(&self, user: &UserId) -> Result<BTreeSet<GroupRef>, StoreError> {
        let groups = queries::list_user_groups(self.conn, user.as_str())?
            .into_iter()
            .map(|row| GroupRef(row.group_name))
            .collect();
        Ok(groups)
    }
}

impl UserGroupStore for Database {
    fn clear_groups(&mut self, user: &UserId) -> Result<(), StoreError> {
        self.delete_user_groups(user.as_str())?;
        Ok(())
    }

    fn add_group(&mut self, user: &UserId, group: &GroupRef) -> Result<(), StoreError> {
        self.insert_user_group(user.as_str(), group.as_str())?;
        Ok(())
    }

    fn groups(&self, user: &UserId) -> Result<BTreeSet<GroupRef>, StoreError> {
        let groups = self
            .list_user_groups(user.as_str())?
            .into_iter()
            .map(|row| GroupRef(row.group_name))
            .collect();
        Ok(groups)
    }
}
