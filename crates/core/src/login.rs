//! Login integration: group sync after the host resolves a user.
//!
//! The host's find-or-create-user flow calls
//! [`GroupSync::on_user_resolved`] once it has a user for a directory entry.
//! Rules are evaluated before anything is written, so a misconfigured rule
//! aborts the sync without clearing or granting any group.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::AppConfig;
use crate::engine::{EvaluationContext, GroupMappingEngine};
use crate::errors::SyncError;
use crate::models::{DirectoryEntry, DirectoryServerConfig, GroupRef, UserId};
use crate::operators::OperatorRegistry;
use crate::sync::{SyncOutcome, SyncPolicy, UserGroupStore};

/// Login-time group synchronization for every configured directory server.
pub struct GroupSync {
    engine: GroupMappingEngine,
    config: AppConfig,
}

impl GroupSync {
    pub fn new(config: AppConfig, registry: OperatorRegistry) -> Self {
        info!(servers = config.servers.len(), "initializing group sync");
        Self {
            engine: GroupMappingEngine::new(registry),
            config,
        }
    }

    pub fn engine(&self) -> &GroupMappingEngine {
        &self.engine
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn server(&self, name: &str) -> Result<&DirectoryServerConfig, SyncError> {
        self.config
            .server(name)
            .ok_or_else(|| SyncError::UnknownServer(name.to_string()))
    }

    /// Sync `user`'s groups from `entry` fetched through `server_name`.
    ///
    /// Returns `Ok(None)` without touching `store` when the host resolved no
    /// user for this login.
    pub fn on_user_resolved<S>(
        &self,
        server_name: &str,
        entry: &DirectoryEntry,
        user: Option<&UserId>,
        store: &mut S,
    ) -> Result<Option<SyncOutcome>, SyncError>
    where
        S: UserGroupStore + ?Sized,
    {
        let Some(user) = user else {
            debug!(server = server_name, dn = %entry.dn, "no user resolved, skipping group sync");
            return Ok(None);
        };

        let server = self.server(server_name)?;
        let ctx = EvaluationContext::new(user.as_str(), server_name);
        let grants = self.engine.evaluate(entry, server, &ctx)?;
        let outcome = SyncPolicy::apply(&grants, user, server.exclusive_groups, store, &ctx)?;
        Ok(Some(outcome))
    }

    /// Evaluate `server_name`'s rules for `entry` without changing anything.
    pub fn evaluate_only(
        &self,
        server_name: &str,
        entry: &DirectoryEntry,
        login: &str,
    ) -> Result<BTreeSet<GroupRef>, SyncError> {
        let server = self.server(server_name)?;
        let ctx = EvaluationContext::new(login, server_name);
        Ok(self.engine.evaluate(entry, server, &ctx)?)
    }
}
