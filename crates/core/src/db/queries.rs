//! Typed query helpers for every table in the LdapGroups database.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::sync::SyncOutcome;

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// A row from the `user_groups` table.
#[derive(Debug, Clone)]
pub struct UserGroupEntry {
    pub user_id: String,
    pub group_name: String,
    pub granted_at: String,
}

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub user_id: String,
    pub server: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Connection-level queries
// ---------------------------------------------------------------------------

// These take a bare `Connection` so they run unchanged inside an open
// transaction (see [`Database::transaction`]).

/// Grant `group_name` to `user_id`. Returns `false` when the membership
/// already existed.
pub fn insert_user_group(
    conn: &Connection,
    user_id: &str,
    group_name: &str,
) -> Result<bool, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_groups (user_id, group_name, granted_at)
         VALUES (?1, ?2, ?3)",
        params![user_id, group_name, now],
    )?;
    debug!(user_id, group_name, inserted, "insert user_groups entry");
    Ok(inserted > 0)
}

/// All memberships of `user_id`, ordered by group name.
pub fn list_user_groups(conn: &Connection, user_id: &str) -> Result<Vec<UserGroupEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, group_name, granted_at
         FROM user_groups WHERE user_id = ?1 ORDER BY group_name",
    )?;
    let entries = stmt
        .query_map(params![user_id], |row| {
            Ok(UserGroupEntry {
                user_id: row.get(0)?,
                group_name: row.get(1)?,
                granted_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Remove every membership of `user_id`. Returns the number removed.
pub fn delete_user_groups(conn: &Connection, user_id: &str) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM user_groups WHERE user_id = ?1",
        params![user_id],
    )?;
    debug!(user_id, removed, "deleted user_groups entries");
    Ok(removed)
}

/// Append an audit log entry.
pub fn insert_audit_entry(
    conn: &Connection,
    action: &str,
    user_id: &str,
    server: Option<&str>,
    details: Option<&str>,
) -> Result<i64, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO audit_log (action, user_id, server, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![action, user_id, server, details, now],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, action, user_id, "inserted audit_log entry");
    Ok(id)
}

/// Record a completed login group sync in the audit log.
pub fn record_sync(conn: &Connection, outcome: &SyncOutcome, server: &str) -> Result<i64, DatabaseError> {
    let action = if outcome.cleared {
        "group_sync_exclusive"
    } else {
        "group_sync_additive"
    };
    let granted: Vec<&str> = outcome.granted.iter().map(|g| g.as_str()).collect();
    let details = serde_json::json!({ "granted": granted }).to_string();
    insert_audit_entry(conn, action, outcome.user.as_str(), Some(server), Some(&details))
}

/// Most recent `limit` audit entries, newest first.
pub fn list_audit_log(conn: &Connection, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, action, user_id, server, details, created_at
         FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit], |row| {
            Ok(AuditLogEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                user_id: row.get(2)?,
                server: row.get(3)?,
                details: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Database wrappers
// ---------------------------------------------------------------------------

impl Database {
    pub fn insert_user_group(&self, user_id: &str, group_name: &str) -> Result<bool, DatabaseError> {
        insert_user_group(&self.conn(), user_id, group_name)
    }

    pub fn list_user_groups(&self, user_id: &str) -> Result<Vec<UserGroupEntry>, DatabaseError> {
        list_user_groups(&self.conn(), user_id)
    }

    pub fn delete_user_groups(&self, user_id: &str) -> Result<usize, DatabaseError> {
        delete_user_groups(&self.conn(), user_id)
    }

    pub fn insert_audit_entry(
        &self,
        action: &str,
        user_id: &str,
        server: Option<&str>,
        details: Option<&str>,
    ) -> Result<i64, DatabaseError> {
        insert_audit_entry(&self.conn(), action, user_id, server, details)
    }

    pub fn record_sync(&self, outcome: &SyncOutcome, server: &str) -> Result<i64, DatabaseError> {
        record_sync(&self.conn(), outcome, server)
    }

    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        list_audit_log(&self.conn(), limit)
    }
}
