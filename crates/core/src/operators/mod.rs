//! Comparison operators used by mapping rules.
//!
//! Operators are registered explicitly in an [`OperatorRegistry`] under a
//! name; a mapping rule refers to its operator by that name. The registry is
//! populated once at startup and resolves names to fresh operator instances.

pub mod builtin;

use tracing::debug;

use crate::engine::EvaluationContext;
use crate::errors::MappingError;
use crate::models::{DirectoryEntry, DirectoryServerConfig};

pub use builtin::{Contains, ContainsIgnoreCase, Equals, EqualsIgnoreCase};

/// A named comparison strategy between a directory attribute and a
/// configured value.
///
/// Implementations must treat an absent attribute as a non-match and must not
/// mutate anything they are given.
pub trait Operator: Send + Sync {
    fn matches(
        &self,
        entry: &DirectoryEntry,
        attribute: &str,
        value: &str,
        server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> bool;
}

/// Constructor stored in the registry for each operator.
pub type OperatorFactory = fn() -> Box<dyn Operator>;

struct Registration {
    name: &'static str,
    display_name: &'static str,
    factory: OperatorFactory,
}

/// Registration table mapping operator names to factories.
pub struct OperatorRegistry {
    entries: Vec<Registration>,
}

impl OperatorRegistry {
    /// An empty registry. Most callers want [`OperatorRegistry::builtin`].
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry holding every built-in operator.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("equals", "Equals", builtin::equals);
        registry.register("contains", "Contains", builtin::contains);
        registry.register(
            "equals_ignore_case",
            "Equals (ignore case)",
            builtin::equals_ignore_case,
        );
        registry.register(
            "contains_ignore_case",
            "Contains (ignore case)",
            builtin::contains_ignore_case,
        );
        registry
    }

    /// Register an operator. An existing registration with the same name is
    /// replaced in place, keeping its position in [`list_operators`].
    ///
    /// [`list_operators`]: Self::list_operators
    pub fn register(
        &mut self,
        name: &'static str,
        display_name: &'static str,
        factory: OperatorFactory,
    ) {
        let registration = Registration {
            name,
            display_name,
            factory,
        };
        match self.entries.iter_mut().find(|r| r.name == name) {
            Some(existing) => *existing = registration,
            None => self.entries.push(registration),
        }
        debug!(name, "registered mapping operator");
    }

    /// `(name, display_name)` pairs in registration order.
    pub fn list_operators(&self) -> Vec<(&'static str, &'static str)> {
        self.entries
            .iter()
            .map(|r| (r.name, r.display_name))
            .collect()
    }

    pub fn contains_operator(&self, name: &str) -> bool {
        self.entries.iter().any(|r| r.name == name)
    }

    /// Resolve `name` to an operator instance.
    ///
    /// `attribute` only enriches the error so a misconfigured rule can be
    /// found quickly.
    pub fn resolve(&self, name: &str, attribute: &str) -> Result<Box<dyn Operator>, MappingError> {
        self.entries
            .iter()
            .find(|r| r.name == name)
            .map(|r| (r.factory)())
            .ok_or_else(|| MappingError::UnknownOperator {
                operator: name.to_string(),
                attribute: attribute.to_string(),
            })
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Present;

    fn present() -> Box<dyn Operator> {
        Box::new(Present)
    }

    impl Operator for Present {
        fn matches(
            &self,
            entry: &DirectoryEntry,
            attribute: &str,
            _value: &str,
            _server: &DirectoryServerConfig,
            _ctx: &EvaluationContext,
        ) -> bool {
            entry.values(attribute).is_some_and(|v| !v.is_empty())
        }
    }

    #[test]
    fn test_builtin_operators_listed_in_order() {
        let registry = OperatorRegistry::builtin();
        let names: Vec<_> = registry.list_operators().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["equals", "contains", "equals_ignore_case", "contains_ignore_case"]
        );
    }

    #[test]
    fn test_resolve_unknown_operator() {
        let registry = OperatorRegistry::builtin();
        let result = registry.resolve("regexmatch", "memberOf");
        match result {
            Err(MappingError::UnknownOperator {
                operator,
                attribute,
            }) => {
                assert_eq!(operator, "regexmatch");
                assert_eq!(attribute, "memberOf");
            }
            Ok(_) => panic!("regexmatch must not resolve"),
        }
    }

    #[test]
    fn test_register_custom_operator() {
        let mut registry = OperatorRegistry::builtin();
        registry.register("present", "Present", present);
        assert!(registry.contains_operator("present"));

        let op = registry.resolve("present", "mail").unwrap();
        let entry = DirectoryEntry::new("uid=a").with_attribute("mail", ["a@example.com"]);
        let server = DirectoryServerConfig::new("test");
        let ctx = EvaluationContext::new("a", "test");
        assert!(op.matches(&entry, "mail", "", &server, &ctx));
        assert!(!op.matches(&entry, "telephoneNumber", "", &server, &ctx));
    }

    #[test]
    fn test_register_replaces_existing_name() {
        let mut registry = OperatorRegistry::builtin();
        registry.register("equals", "Strict equals", builtin::equals);
        let listed = registry.list_operators();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0], ("equals", "Strict equals"));
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        let registry = OperatorRegistry::empty();
        assert!(registry.list_operators().is_empty());
        assert!(registry.resolve("equals", "cn").is_err());
    }
}
