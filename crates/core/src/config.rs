//! TOML-based configuration system for LdapGroups.
//!
//! A config file declares general settings and one `[[servers]]` table per
//! directory server, each with its ordered `[[servers.group_mappings]]`.
//! Rule invariants (non-empty fields, known operators) are checked by
//! [`AppConfig::validate`], not by the mapping engine.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::models::{DirectoryServerConfig, MappingRule};
use crate::operators::OperatorRegistry;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging and storage settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Directory servers and their group mappings.
    #[serde(default)]
    pub servers: Vec<DirectoryServerConfig>,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// Logging and storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the group membership database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/ldapgroups")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl GeneralConfig {
    /// Path of the SQLite membership database inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ldapgroups.db")
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** validate rules -- call
    /// [`validate`](Self::validate) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;

        debug!(servers = config.servers.len(), "configuration parsed successfully");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate server names and every mapping rule against `registry`.
    pub fn validate(&self, registry: &OperatorRegistry) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for (i, server) in self.servers.iter().enumerate() {
            if server.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("servers[{i}].name"),
                    detail: "server name must not be empty".into(),
                });
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("servers[{i}].name"),
                    detail: format!("duplicate server name '{}'", server.name),
                });
            }

            for (j, rule) in server.group_mappings.iter().enumerate() {
                validate_rule(rule, registry, &format!("servers[{i}].group_mappings[{j}]"))?;
            }
        }

        debug!(servers = self.servers.len(), "configuration validated");
        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(
        path: P,
        registry: &OperatorRegistry,
    ) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate(registry)?;
        Ok(config)
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Option<&DirectoryServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Server name to its rules, in declaration order.
    pub fn rules_by_server(&self) -> BTreeMap<&str, &[MappingRule]> {
        self.servers
            .iter()
            .map(|s| (s.name.as_str(), s.group_mappings.as_slice()))
            .collect()
    }
}

fn validate_rule(
    rule: &MappingRule,
    registry: &OperatorRegistry,
    field: &str,
) -> Result<(), ConfigError> {
    let required = [
        ("attribute", rule.attribute.as_str()),
        ("value", rule.value.as_str()),
        ("group", rule.group.as_str()),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}.{name}"),
                detail: "must not be empty".into(),
            });
        }
    }

    if !registry.contains_operator(&rule.operator) {
        let known: Vec<&str> = registry.list_operators().iter().map(|(n, _)| *n).collect();
        return Err(ConfigError::InvalidValue {
            field: format!("{field}.operator"),
            detail: format!(
                "unknown operator '{}' (expected one of: {})",
                rule.operator,
                known.join(", ")
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[general]
log_level = "debug"
data_dir = "/tmp/ldapgroups"

[[servers]]
name = "corp-ad"
description = "Corporate Active Directory"
exclusive_groups = true

[[servers.group_mappings]]
attribute = "memberOf"
operator = "contains"
value = "cn=Admins,ou=Groups,dc=corp,dc=example"
group = "administrators"

[[servers.group_mappings]]
attribute = "department"
operator = "equals"
value = "Sales"
group = "sales"

[[servers]]
name = "partners"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.servers.len(), 2);

        let ad = config.server("corp-ad").unwrap();
        assert!(ad.exclusive_groups);
        assert_eq!(ad.group_mappings.len(), 2);
        assert_eq!(ad.group_mappings[0].operator, "contains");
        assert_eq!(ad.group_mappings[1].group.as_str(), "sales");

        let partners = config.server("partners").unwrap();
        assert!(!partners.exclusive_groups);
        assert!(partners.group_mappings.is_empty());

        config.validate(&OperatorRegistry::builtin()).unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_and_validate(&path, &OperatorRegistry::builtin())
            .expect("load_and_validate failed");
        assert_eq!(
            config.general.database_path(),
            PathBuf::from("/tmp/ldapgroups/ldapgroups.db")
        );
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = AppConfig::from_toml_str("[[servers]]\nname = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_operator() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.servers[0].group_mappings[1].operator = "regexmatch".into();
        let result = config.validate(&OperatorRegistry::builtin());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. })
                if field == "servers[0].group_mappings[1].operator"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_rule_fields() {
        let registry = OperatorRegistry::builtin();

        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.servers[0].group_mappings[0].attribute = String::new();
        assert!(matches!(
            config.validate(&registry),
            Err(ConfigError::InvalidValue { ref field, .. })
                if field == "servers[0].group_mappings[0].attribute"
        ));

        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.servers[0].group_mappings[0].value = "  ".into();
        assert!(matches!(
            config.validate(&registry),
            Err(ConfigError::InvalidValue { ref field, .. })
                if field == "servers[0].group_mappings[0].value"
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_server_names() {
        let mut config = AppConfig::from_toml_str(sample_toml()).unwrap();
        config.servers[1].name = "corp-ad".into();
        let result = config.validate(&OperatorRegistry::builtin());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "servers[1].name"
        ));
    }

    #[test]
    fn test_rules_by_server_keeps_declaration_order() {
        let config = AppConfig::from_toml_str(sample_toml()).unwrap();
        let index = config.rules_by_server();
        assert_eq!(index.len(), 2);
        let rules = index["corp-ad"];
        assert_eq!(rules[0].attribute, "memberOf");
        assert_eq!(rules[1].attribute, "department");
        assert!(index["partners"].is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.data_dir, PathBuf::from("/var/lib/ldapgroups"));
        assert!(config.servers.is_empty());
        assert!(config.server("corp-ad").is_none());
    }
}
