//! Built-in comparison operators.
//!
//! Every operator is "any value": a multi-valued attribute matches when at
//! least one of its values satisfies the comparison. The plain operators
//! compare case-sensitively; the `*IgnoreCase` variants lowercase both sides
//! first, which suits Active Directory DNs.

use tracing::debug;

use super::Operator;
use crate::engine::EvaluationContext;
use crate::models::{DirectoryEntry, DirectoryServerConfig};

/// True when some value of the attribute is exactly the configured value.
pub struct Equals;

/// True when some value of the attribute contains the configured value.
pub struct Contains;

pub struct EqualsIgnoreCase;

pub struct ContainsIgnoreCase;

pub fn equals() -> Box<dyn Operator> {
    Box::new(Equals)
}

pub fn contains() -> Box<dyn Operator> {
    Box::new(Contains)
}

pub fn equals_ignore_case() -> Box<dyn Operator> {
    Box::new(EqualsIgnoreCase)
}

pub fn contains_ignore_case() -> Box<dyn Operator> {
    Box::new(ContainsIgnoreCase)
}

impl Operator for Equals {
    fn matches(
        &self,
        entry: &DirectoryEntry,
        attribute: &str,
        value: &str,
        _server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> bool {
        any_value(entry, attribute, ctx, "equals", |v| v == value)
    }
}

impl Operator for Contains {
    fn matches(
        &self,
        entry: &DirectoryEntry,
        attribute: &str,
        value: &str,
        _server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> bool {
        any_value(entry, attribute, ctx, "contains", |v| v.contains(value))
    }
}

impl Operator for EqualsIgnoreCase {
    fn matches(
        &self,
        entry: &DirectoryEntry,
        attribute: &str,
        value: &str,
        _server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> bool {
        let needle = value.to_lowercase();
        any_value(entry, attribute, ctx, "equals_ignore_case", |v| {
            v.to_lowercase() == needle
        })
    }
}

impl Operator for ContainsIgnoreCase {
    fn matches(
        &self,
        entry: &DirectoryEntry,
        attribute: &str,
        value: &str,
        _server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> bool {
        let needle = value.to_lowercase();
        any_value(entry, attribute, ctx, "contains_ignore_case", |v| {
            v.to_lowercase().contains(&needle)
        })
    }
}

/// Apply `predicate` to each value of `attribute`; absent means no match.
fn any_value<F>(
    entry: &DirectoryEntry,
    attribute: &str,
    ctx: &EvaluationContext,
    operator: &str,
    predicate: F,
) -> bool
where
    F: Fn(&str) -> bool,
{
    let Some(values) = entry.values(attribute) else {
        debug!(
            parent: &ctx.span,
            attribute,
            operator,
            "attribute absent from entry, no match"
        );
        return false;
    };

    let matched = values.iter().any(|v| predicate(v));
    debug!(
        parent: &ctx.span,
        attribute,
        operator,
        value_count = values.len(),
        matched,
        "compared attribute values"
    );
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> DirectoryEntry {
        DirectoryEntry::new("cn=jdoe,ou=People,dc=x")
            .with_attribute("memberOf", ["cn=Users,dc=x", "cn=Admins,dc=x"])
            .with_attribute("department", ["Engineering"])
            .with_attribute("title", Vec::<String>::new())
    }

    fn check(op: &dyn Operator, attribute: &str, value: &str) -> bool {
        let server = DirectoryServerConfig::new("test");
        let ctx = EvaluationContext::new("jdoe", "test");
        op.matches(&entry(), attribute, value, &server, &ctx)
    }

    #[test]
    fn test_equals_requires_whole_value() {
        assert!(check(&Equals, "department", "Engineering"));
        assert!(check(&Equals, "memberOf", "cn=Admins,dc=x"));
        assert!(!check(&Equals, "department", "Engineer"));
        assert!(!check(&Equals, "memberOf", "cn=Admins"));
    }

    #[test]
    fn test_equals_is_case_sensitive() {
        assert!(!check(&Equals, "department", "engineering"));
        assert!(check(&EqualsIgnoreCase, "department", "engineering"));
        assert!(check(&EqualsIgnoreCase, "department", "ENGINEERING"));
        assert!(!check(&EqualsIgnoreCase, "department", "engineer"));
    }

    #[test]
    fn test_contains_matches_substring_of_any_value() {
        assert!(check(&Contains, "memberOf", "cn=Admins"));
        assert!(check(&Contains, "memberOf", "cn=Users"));
        assert!(!check(&Contains, "memberOf", "cn=Operators"));
    }

    #[test]
    fn test_contains_is_case_sensitive() {
        assert!(!check(&Contains, "memberOf", "CN=ADMINS"));
        assert!(check(&ContainsIgnoreCase, "memberOf", "CN=ADMINS"));
        assert!(!check(&ContainsIgnoreCase, "memberOf", "CN=OPERATORS"));
    }

    #[test]
    fn test_absent_or_empty_attribute_never_matches() {
        let ops: [&dyn Operator; 4] = [&Equals, &Contains, &EqualsIgnoreCase, &ContainsIgnoreCase];
        for op in ops {
            assert!(!check(op, "mail", ""));
            assert!(!check(op, "title", ""));
        }
    }

    #[test]
    fn test_attribute_name_is_case_insensitive() {
        assert!(check(&Contains, "MEMBEROF", "cn=Admins"));
        assert!(check(&Equals, "Department", "Engineering"));
    }
}
