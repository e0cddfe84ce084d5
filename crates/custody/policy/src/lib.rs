//! Custody Policy - role based evaluation of (subject, action, resource).
//!
//! The engine is pure: no I/O, no interior mutability, no clock. A request is
//! allowed iff at least one rule matches on role, exact action, resource
//! pattern and minimum clearance. There are no deny rules; anything that does
//! not match is denied.

#![deny(unsafe_code)]

use custody_types::{Clearance, PolicyRule, Role, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Policy engine over an immutable rule table.
#[derive(Clone, Debug)]
pub struct PolicyEngine {
    rules: Vec<CompiledRule>,
}

#[derive(Clone, Debug)]
struct CompiledRule {
    rule: PolicyRule,
    pattern: ResourcePattern,
}

impl PolicyEngine {
    /// Build an engine, rejecting rules whose resource pattern cannot be compiled.
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self, PolicyError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = ResourcePattern::parse(&rule.resource_pattern)?;
                if rule.action.trim().is_empty() {
                    return Err(PolicyError::InvalidRule(format!(
                        "rule for {} on {} has an empty action",
                        rule.role, rule.resource_pattern
                    )));
                }
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, PolicyError>>()?;
        Ok(Self { rules })
    }

    /// Engine loaded with the standard forensic rule table.
    pub fn with_default_rules() -> Self {
        let rules = default_rules()
            .into_iter()
            .map(|rule| CompiledRule {
                pattern: ResourcePattern::parse_static(&rule.resource_pattern),
                rule,
            })
            .collect();
        Self { rules }
    }

    /// Evaluate a request for an already-resolved subject.
    pub fn evaluate(&self, subject: &User, action: &str, resource: &str) -> PolicyDecision {
        self.evaluate_with(subject.role, subject.clearance, action, resource)
    }

    /// Evaluate with an explicit role and clearance.
    pub fn evaluate_with(
        &self,
        role: Role,
        clearance: Clearance,
        action: &str,
        resource: &str,
    ) -> PolicyDecision {
        let matched = self.rules.iter().find(|compiled| {
            compiled.rule.role == role
                && compiled.rule.action == action
                && compiled.pattern.matches(resource)
                && clearance >= compiled.rule.min_clearance
        });

        match matched {
            Some(compiled) => PolicyDecision::allow(compiled.rule.clone()),
            None => PolicyDecision::deny(),
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

/// Outcome of a policy evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allow: bool,
    pub matched_rule: Option<PolicyRule>,
}

impl PolicyDecision {
    fn allow(rule: PolicyRule) -> Self {
        Self {
            allow: true,
            matched_rule: Some(rule),
        }
    }

    fn deny() -> Self {
        Self {
            allow: false,
            matched_rule: None,
        }
    }
}

/// Compiled resource pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourcePattern {
    /// No wildcard: exact equality.
    Exact(String),
    /// Trailing `*`: the resource must start with the prefix.
    Prefix(String),
    /// `prefix/*/suffix`: anything non-empty between `prefix/` and `/suffix`,
    /// including further segments.
    Segment { prefix: String, suffix: String },
}

impl ResourcePattern {
    pub fn parse(pattern: &str) -> Result<Self, PolicyError> {
        let wildcards = pattern.matches('*').count();
        if wildcards == 0 {
            if pattern.is_empty() {
                return Err(PolicyError::InvalidPattern(
                    "pattern cannot be empty".to_string(),
                ));
            }
            return Ok(Self::Exact(pattern.to_string()));
        }
        if wildcards > 1 {
            return Err(PolicyError::InvalidPattern(format!(
                "pattern '{}' has more than one wildcard",
                pattern
            )));
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            if prefix.is_empty() {
                return Err(PolicyError::InvalidPattern(
                    "wildcard pattern needs a non-empty prefix".to_string(),
                ));
            }
            return Ok(Self::Prefix(prefix.to_string()));
        }

        match pattern.split_once("/*/") {
            Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => {
                Ok(Self::Segment {
                    prefix: prefix.to_string(),
                    suffix: suffix.to_string(),
                })
            }
            _ => Err(PolicyError::InvalidPattern(format!(
                "inner wildcard in '{}' must be a whole path segment",
                pattern
            ))),
        }
    }

    // Only for the built-in table, whose patterns are covered by tests.
    fn parse_static(pattern: &str) -> Self {
        Self::parse(pattern).unwrap_or_else(|_| Self::Exact(pattern.to_string()))
    }

    pub fn matches(&self, resource: &str) -> bool {
        match self {
            Self::Exact(exact) => resource == exact,
            Self::Prefix(prefix) => resource.starts_with(prefix.as_str()),
            Self::Segment { prefix, suffix } => {
                let Some(rest) = resource
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                else {
                    return false;
                };
                let Some(middle) = rest
                    .strip_suffix(suffix.as_str())
                    .and_then(|rest| rest.strip_suffix('/'))
                else {
                    return false;
                };
                !middle.is_empty()
            }
        }
    }
}

/// Policy-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid resource pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

/// The forensic rule table every oracle starts with unless the administrator
/// snapshot replaces it.
pub fn default_rules() -> Vec<PolicyRule> {
    let c = |level: u8| Clearance::new(level).unwrap_or(Clearance::MAX);
    let mut rules = Vec::new();

    for resource in ["evidence/*", "case/*"] {
        for action in ["create", "read", "transfer", "update"] {
            rules.push(PolicyRule::new(Role::Admin, resource, action, c(1)));
        }
    }

    for action in ["create", "transfer", "read"] {
        rules.push(PolicyRule::new(Role::Investigator, "evidence/*", action, c(2)));
    }
    rules.push(PolicyRule::new(Role::Investigator, "case/*", "read", c(2)));
    rules.push(PolicyRule::new(Role::Investigator, "case/*", "update", c(2)));

    for resource in ["evidence/*", "case/*", "audit_log/*"] {
        rules.push(PolicyRule::new(Role::Auditor, resource, "read", c(3)));
    }

    rules.push(PolicyRule::new(Role::Court, "evidence/*/approved", "read", c(4)));
    rules.push(PolicyRule::new(Role::Court, "case/*/final", "read", c(4)));

    rules
}
