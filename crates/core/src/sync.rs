//! Sync policy: applies granted groups to a user's memberships.
//!
//! The host owns user group memberships and exposes them through
//! [`UserGroupStore`]. [`SyncPolicy::apply`] is a two-branch transition:
//!
//! - exclusive servers clear every membership first, then add the grants;
//! - additive servers union the grants into existing memberships.
//!
//! Store failures are returned unchanged. The host's transaction around the
//! login is the unit of failure.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::EvaluationContext;
use crate::errors::StoreError;
use crate::models::{GroupRef, UserId};

/// Host-side group membership primitives.
pub trait UserGroupStore {
    /// Remove every group membership of `user`.
    fn clear_groups(&mut self, user: &UserId) -> Result<(), StoreError>;

    /// Add `group` to `user`. Adding an existing membership is a no-op.
    fn add_group(&mut self, user: &UserId, group: &GroupRef) -> Result<(), StoreError>;

    /// Current memberships of `user`; empty for an unknown user.
    fn groups(&self, user: &UserId) -> Result<BTreeSet<GroupRef>, StoreError>;
}

/// In-memory store, used for dry runs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryGroupStore {
    memberships: BTreeMap<UserId, BTreeSet<GroupRef>>,
}

impl MemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing memberships for one user.
    pub fn with_user<I>(mut self, user: UserId, groups: I) -> Self
    where
        I: IntoIterator<Item = GroupRef>,
    {
        self.memberships.insert(user, groups.into_iter().collect());
        self
    }
}

impl UserGroupStore for MemoryGroupStore {
    fn clear_groups(&mut self, user: &UserId) -> Result<(), StoreError> {
        if let Some(groups) = self.memberships.get_mut(user) {
            groups.clear();
        }
        Ok(())
    }

    fn add_group(&mut self, user: &UserId, group: &GroupRef) -> Result<(), StoreError> {
        self.memberships
            .entry(user.clone())
            .or_default()
            .insert(group.clone());
        Ok(())
    }

    fn groups(&self, user: &UserId) -> Result<BTreeSet<GroupRef>, StoreError> {
        Ok(self.memberships.get(user).cloned().unwrap_or_default())
    }
}

/// What one [`SyncPolicy::apply`] call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub user: UserId,
    /// Whether existing memberships were cleared first.
    pub cleared: bool,
    /// Groups passed to the store, in order.
    pub granted: Vec<GroupRef>,
}

/// Exclusive-or-additive membership policy.
pub struct SyncPolicy;

impl SyncPolicy {
    /// Apply `grants` to `user` in `store`.
    ///
    /// With `exclusive_groups` the user's memberships are cleared even when
    /// `grants` is empty.
    pub fn apply<S>(
        grants: &BTreeSet<GroupRef>,
        user: &UserId,
        exclusive_groups: bool,
        store: &mut S,
        ctx: &EvaluationContext,
    ) -> Result<SyncOutcome, StoreError>
    where
        S: UserGroupStore + ?Sized,
    {
        if exclusive_groups {
            warn!(parent: &ctx.span, user = %user, "deleting all groups from user");
            store.clear_groups(user)?;
        }

        let mut granted = Vec::with_capacity(grants.len());
        for group in grants {
            info!(parent: &ctx.span, user = %user, group = %group, "adding user to group");
            store.add_group(user, group)?;
            granted.push(group.clone());
        }

        debug!(
            parent: &ctx.span,
            user = %user,
            cleared = exclusive_groups,
            granted = granted.len(),
            "group sync applied"
        );

        Ok(SyncOutcome {
            user: user.clone(),
            cleared: exclusive_groups,
            granted,
        })
    }
}
