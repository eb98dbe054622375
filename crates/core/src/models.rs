//! Domain model types used throughout LdapGroups.
//!
//! These types bridge the configuration file, the mapping engine, the sync
//! policy, and the host user store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::EntryError;

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Name of an internal authorization group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupRef(pub String);

impl GroupRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a host user record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Directory entry
// ---------------------------------------------------------------------------

/// Snapshot of one directory record: its DN and its attribute values.
///
/// Attribute names are matched case-insensitively, as LDAP attribute
/// descriptions are. Values keep the order the directory returned them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDirectoryEntry")]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style helper that sets all values of one attribute.
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Values of `name`, or `None` when the entry has no such attribute.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        if let Some(values) = self.attributes.get(name) {
            return Some(values.as_slice());
        }
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// Parse an entry from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self, EntryError> {
        serde_json::from_str(json).map_err(|e| EntryError::ParseError(e.to_string()))
    }

    /// Load an entry from a JSON file on disk.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EntryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let entry = Self::from_json_str(&contents)?;
        debug!(
            path = %path.display(),
            dn = %entry.dn,
            attributes = entry.attributes.len(),
            "loaded directory entry"
        );
        Ok(entry)
    }
}

impl From<ldap3::SearchEntry> for DirectoryEntry {
    /// Binary attributes (`bin_attrs`) carry no comparable text and are
    /// dropped.
    fn from(entry: ldap3::SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs.into_iter().collect(),
        }
    }
}

/// Wire form of a directory entry: attributes may be a single string or a
/// list of strings.
#[derive(Deserialize)]
struct RawDirectoryEntry {
    #[serde(default)]
    dn: String,
    #[serde(default)]
    attributes: BTreeMap<String, OneOrMany>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<RawDirectoryEntry> for DirectoryEntry {
    fn from(raw: RawDirectoryEntry) -> Self {
        let attributes = raw
            .attributes
            .into_iter()
            .map(|(name, values)| {
                let values = match values {
                    OneOrMany::One(v) => vec![v],
                    OneOrMany::Many(vs) => vs,
                };
                (name, values)
            })
            .collect();
        Self {
            dn: raw.dn,
            attributes,
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping rules and servers
// ---------------------------------------------------------------------------

/// One declarative condition-to-group binding.
///
/// A rule belongs to the [`DirectoryServerConfig`] that lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Directory attribute to inspect (for Active Directory, `memberOf`).
    pub attribute: String,
    /// Registered operator name, e.g. `contains`.
    pub operator: String,
    /// Value the attribute is compared against.
    pub value: String,
    /// Group granted when the rule matches.
    pub group: GroupRef,
}

impl MappingRule {
    pub fn new(
        attribute: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operator: operator.into(),
            value: value.into(),
            group: GroupRef(group.into()),
        }
    }
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}' -> {}",
            self.attribute, self.operator, self.value, self.group
        )
    }
}

/// One configured directory server and the rules that apply to its users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryServerConfig {
    /// Unique server name, referenced at login time.
    pub name: String,

    /// Free-form description for administrators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When set, group memberships not granted by a rule are removed on
    /// every login.
    #[serde(default, alias = "only_ldap_groups")]
    pub exclusive_groups: bool,

    /// Rules in declaration order.
    #[serde(default)]
    pub group_mappings: Vec<MappingRule>,
}

impl DirectoryServerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: MappingRule) -> Self {
        self.group_mappings.push(rule);
        self
    }

    pub fn exclusive(mut self, exclusive_groups: bool) -> Self {
        self.exclusive_groups = exclusive_groups;
        self
    }
}
