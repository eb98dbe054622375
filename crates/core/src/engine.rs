//! Group mapping engine.
//!
//! [`GroupMappingEngine`] evaluates a directory server's mapping rules
//! against one directory entry and returns the set of groups to grant. Rules
//! are independent of each other: iteration order only affects log order,
//! never the result.

use std::collections::BTreeSet;

use tracing::{debug, info, info_span, Span};

use crate::errors::MappingError;
use crate::models::{DirectoryEntry, DirectoryServerConfig, GroupRef, MappingRule};
use crate::operators::{Operator, OperatorRegistry};

/// Per-evaluation logging scope handed to every operator.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Login name the entry was fetched for.
    pub login: String,
    /// Name of the directory server the entry came from.
    pub server: String,
    /// Parent span for all diagnostics emitted during this evaluation.
    pub span: Span,
}

impl EvaluationContext {
    pub fn new(login: impl Into<String>, server: impl Into<String>) -> Self {
        let login = login.into();
        let server = server.into();
        let span = info_span!("group_mapping", login = %login, server = %server);
        Self {
            login,
            server,
            span,
        }
    }
}

/// Per-rule result of an evaluation, in rule order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Position of the rule in the evaluated list.
    pub index: usize,
    pub rule: MappingRule,
    pub matched: bool,
}

/// Groups granted by the matched rules in `outcomes`.
pub fn granted_groups(outcomes: &[RuleOutcome]) -> BTreeSet<GroupRef> {
    outcomes
        .iter()
        .filter(|o| o.matched)
        .map(|o| o.rule.group.clone())
        .collect()
}

/// Evaluates mapping rules through an [`OperatorRegistry`].
pub struct GroupMappingEngine {
    registry: OperatorRegistry,
}

impl GroupMappingEngine {
    pub fn new(registry: OperatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    /// Evaluate every rule configured on `server`.
    pub fn evaluate(
        &self,
        entry: &DirectoryEntry,
        server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> Result<BTreeSet<GroupRef>, MappingError> {
        self.evaluate_rules(entry, server, &server.group_mappings, ctx)
    }

    /// Evaluate an explicit rule list on behalf of `server`.
    ///
    /// Every operator is resolved before any rule is checked, so an unknown
    /// operator fails the whole evaluation without a partial result.
    pub fn evaluate_rules(
        &self,
        entry: &DirectoryEntry,
        server: &DirectoryServerConfig,
        rules: &[MappingRule],
        ctx: &EvaluationContext,
    ) -> Result<BTreeSet<GroupRef>, MappingError> {
        let outcomes = self.run(entry, server, rules, ctx)?;
        let groups = granted_groups(&outcomes);

        info!(
            parent: &ctx.span,
            dn = %entry.dn,
            rules = rules.len(),
            granted = groups.len(),
            "evaluated group mappings"
        );
        Ok(groups)
    }

    /// Evaluate `server`'s rules and report the outcome of each one.
    pub fn explain(
        &self,
        entry: &DirectoryEntry,
        server: &DirectoryServerConfig,
        ctx: &EvaluationContext,
    ) -> Result<Vec<RuleOutcome>, MappingError> {
        self.run(entry, server, &server.group_mappings, ctx)
    }

    fn run(
        &self,
        entry: &DirectoryEntry,
        server: &DirectoryServerConfig,
        rules: &[MappingRule],
        ctx: &EvaluationContext,
    ) -> Result<Vec<RuleOutcome>, MappingError> {
        let resolved = self.resolve_all(rules)?;

        let outcomes = resolved
            .into_iter()
            .enumerate()
            .map(|(index, (rule, operator))| {
                debug!(parent: &ctx.span, index, rule = %rule, "checking mapping");
                let matched =
                    operator.matches(entry, &rule.attribute, &rule.value, server, ctx);
                if matched {
                    debug!(
                        parent: &ctx.span,
                        index,
                        group = %rule.group,
                        "mapping matched"
                    );
                }
                RuleOutcome {
                    index,
                    rule: rule.clone(),
                    matched,
                }
            })
            .collect();
        Ok(outcomes)
    }

    fn resolve_all<'r>(
        &self,
        rules: &'r [MappingRule],
    ) -> Result<Vec<(&'r MappingRule, Box<dyn Operator>)>, MappingError> {
        rules
            .iter()
            .map(|rule| {
                let operator = self.registry.resolve(&rule.operator, &rule.attribute)?;
                Ok((rule, operator))
            })
            .collect()
    }
}

impl Default for GroupMappingEngine {
    fn default() -> Self {
        Self::new(OperatorRegistry::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admins_rule() -> MappingRule {
        MappingRule::new("memberOf", "contains", "cn=Admins", "G1")
    }

    fn groups(names: &[&str]) -> BTreeSet<GroupRef> {
        names.iter().map(|n| GroupRef::from(*n)).collect()
    }

    fn evaluate(entry: &DirectoryEntry, rules: &[MappingRule]) -> Result<BTreeSet<GroupRef>, MappingError> {
        let engine = GroupMappingEngine::default();
        let server = DirectoryServerConfig::new("corp");
        let ctx = EvaluationContext::new("jdoe", "corp");
        engine.evaluate_rules(entry, &server, rules, &ctx)
    }

    #[test]
    fn test_contains_grants_matching_group() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x"]);
        assert_eq!(evaluate(&entry, &[admins_rule()]).unwrap(), groups(&["G1"]));
    }

    #[test]
    fn test_non_matching_entry_grants_nothing() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Users,dc=x"]);
        assert!(evaluate(&entry, &[admins_rule()]).unwrap().is_empty());
    }

    #[test]
    fn test_rules_for_same_group_union() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x").with_attribute("department", ["Ops"]);
        let rules = vec![
            admins_rule(),
            MappingRule::new("department", "equals", "Ops", "G1"),
        ];
        assert_eq!(evaluate(&entry, &rules).unwrap(), groups(&["G1"]));
    }

    #[test]
    fn test_absent_attribute_never_grants() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x").with_attribute("mail", ["j@x"]);
        let rules = vec![
            admins_rule(),
            MappingRule::new("department", "equals", "Ops", "G2"),
        ];
        assert!(evaluate(&entry, &rules).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_operator_fails_whole_evaluation() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x"]);
        let rules = vec![
            admins_rule(),
            MappingRule::new("memberOf", "regexmatch", "^cn=Admins", "G2"),
        ];
        let result = evaluate(&entry, &rules);
        assert!(matches!(
            result,
            Err(MappingError::UnknownOperator { ref operator, .. }) if operator == "regexmatch"
        ));
    }

    #[test]
    fn test_result_independent_of_rule_order() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x", "cn=Dev,dc=x"])
            .with_attribute("department", ["Engineering"]);
        let rules = vec![
            admins_rule(),
            MappingRule::new("memberOf", "contains", "cn=Dev", "developers"),
            MappingRule::new("department", "equals", "Engineering", "engineering"),
            MappingRule::new("department", "equals", "Sales", "sales"),
            MappingRule::new("memberOf", "equals", "cn=Dev,dc=x", "G1"),
        ];
        let expected = evaluate(&entry, &rules).unwrap();
        assert_eq!(expected, groups(&["G1", "developers", "engineering"]));

        let mut reversed = rules.clone();
        reversed.reverse();
        assert_eq!(evaluate(&entry, &reversed).unwrap(), expected);

        for shift in 1..rules.len() {
            let mut rotated = rules.clone();
            rotated.rotate_left(shift);
            assert_eq!(evaluate(&entry, &rotated).unwrap(), expected);
        }
    }

    #[test]
    fn test_explain_reports_each_rule() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x"]);
        let server = DirectoryServerConfig::new("corp")
            .with_rule(admins_rule())
            .with_rule(MappingRule::new("memberOf", "contains", "cn=Dev", "developers"));
        let engine = GroupMappingEngine::default();
        let ctx = EvaluationContext::new("jdoe", "corp");

        let outcomes = engine.explain(&entry, &server, &ctx).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].matched);
        assert_eq!(outcomes[1].index, 1);
        assert!(!outcomes[1].matched);
    }

    #[test]
    fn test_evaluate_uses_server_rules() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x"]);
        let server = DirectoryServerConfig::new("corp").with_rule(admins_rule());
        let engine = GroupMappingEngine::default();
        let ctx = EvaluationContext::new("jdoe", "corp");
        assert_eq!(engine.evaluate(&entry, &server, &ctx).unwrap(), groups(&["G1"]));
    }

    #[test]
    fn test_explain_outcomes_yield_evaluated_groups() {
        let entry = DirectoryEntry::new("cn=jdoe,dc=x")
            .with_attribute("memberOf", ["cn=Admins,dc=x", "cn=Dev,dc=x"]);
        let server = DirectoryServerConfig::new("corp")
            .with_rule(admins_rule())
            .with_rule(MappingRule::new("memberOf", "contains", "cn=Dev", "developers"))
            .with_rule(MappingRule::new("memberOf", "equals", "cn=Ops,dc=x", "ops"));
        let engine = GroupMappingEngine::default();
        let ctx = EvaluationContext::new("jdoe", "corp");

        let outcomes = engine.explain(&entry, &server, &ctx).unwrap();
        assert_eq!(granted_groups(&outcomes), groups(&["G1", "developers"]));
        assert_eq!(
            granted_groups(&outcomes),
            engine.evaluate(&entry, &server, &ctx).unwrap()
        );
    }

    #[test]
    fn test_context_span_enabled_at_info() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let ctx = EvaluationContext::new("jdoe", "corp");
            assert!(!ctx.span.is_disabled());
        });
    }
}
