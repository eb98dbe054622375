//! LdapGroups core library.
//!
//! This crate decides, at login time, which internal authorization groups a
//! user should hold based on the attributes of their directory entry:
//! configuration, the rule model, comparison operators, the group mapping
//! engine, the exclusive/additive sync policy, and a SQLite membership store.

pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod login;
pub mod models;
pub mod operators;
pub mod sync;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use engine::{EvaluationContext, GroupMappingEngine};
pub use login::GroupSync;
pub use models::{DirectoryEntry, DirectoryServerConfig, GroupRef, MappingRule, UserId};
pub use operators::{Operator, OperatorRegistry};
pub use sync::{MemoryGroupStore, SyncOutcome, SyncPolicy, UserGroupStore};
