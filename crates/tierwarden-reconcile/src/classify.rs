//! Rule-based classification of directory objects.
//!
//! Rules are an ordered list of predicate → tag pairs. Evaluation is first
//! match wins, except that a first match from a naming-convention rule is
//! overridden by a later matching attribute rule: an explicit attribute is
//! authoritative intent, a name suffix is only a convention. Negated
//! predicates are neutral and never override.
//!
//! Classification is a pure function of the record and the compiled
//! [`RuleSet`]. The rule set carries its own reference time, so age
//! thresholds never read the clock during evaluation.

use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tierwarden_directory::operation::dn_is_within;
use tierwarden_directory::time::parse_directory_time;
use tierwarden_directory::ObjectRecord;

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::Classification;

/// How an age threshold treats an object whose time attributes are unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeverSetPolicy {
    /// Never-set counts as inactive.
    Match,
    /// Never-set never matches.
    #[default]
    Skip,
}

/// A condition on an object record, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// Any value of the attribute equals `value` (case-insensitive).
    AttributeEquals { attribute: String, value: String },
    /// The attribute has at least one non-empty value.
    AttributePresent { attribute: String },
    /// The identifier ends with `suffix` (case-insensitive).
    NameSuffix { suffix: String },
    /// The identifier starts with `prefix` (case-insensitive).
    NamePrefix { prefix: String },
    /// The identifier matches a regular expression.
    NameMatches { pattern: String },
    /// The time in `attribute` (or `fallback_attribute` when unset) is at
    /// least `days` before the reference time.
    InactiveFor {
        attribute: String,
        days: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_attribute: Option<String>,
        #[serde(default)]
        never_set: NeverSetPolicy,
    },
    /// The object lives at or below `path`.
    WithinPath { path: String },
    /// The object is a direct member of `group`.
    MemberOf { group: String },
    All { predicates: Vec<Predicate> },
    Any { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    /// Attribute names the predicate reads, including those of nested
    /// predicates.
    pub fn attributes(&self) -> Vec<&str> {
        match self {
            Predicate::AttributeEquals { attribute, .. }
            | Predicate::AttributePresent { attribute } => vec![attribute.as_str()],
            Predicate::InactiveFor {
                attribute,
                fallback_attribute,
                ..
            } => std::iter::once(attribute.as_str())
                .chain(fallback_attribute.as_deref())
                .collect(),
            Predicate::NameSuffix { .. }
            | Predicate::NamePrefix { .. }
            | Predicate::NameMatches { .. }
            | Predicate::WithinPath { .. }
            | Predicate::MemberOf { .. } => Vec::new(),
            Predicate::All { predicates } | Predicate::Any { predicates } => {
                predicates.iter().flat_map(Predicate::attributes).collect()
            }
            Predicate::Not { predicate } => predicate.attributes(),
        }
    }
}

/// Precedence class of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PredicateClass {
    Neutral,
    Naming,
    Attribute,
}

/// One configured rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name, used in logs and plans.
    pub name: String,
    /// Classification assigned when the rule matches.
    pub tag: Classification,
    /// Condition.
    pub when: Predicate,
}

#[derive(Debug, Clone)]
enum Compiled {
    AttributeEquals {
        attribute: String,
        value: String,
    },
    AttributePresent(String),
    NameSuffix(String),
    NamePrefix(String),
    NameMatches(Regex),
    InactiveFor {
        attribute: String,
        fallback: Option<String>,
        threshold: Duration,
        never_set: NeverSetPolicy,
    },
    WithinPath(String),
    MemberOf(String),
    All(Vec<Compiled>),
    Any(Vec<Compiled>),
    Not(Box<Compiled>),
}

impl Compiled {
    fn compile(predicate: &Predicate, rule: &str) -> ReconcileResult<Self> {
        let require = |field: &str, value: &str| -> ReconcileResult<()> {
            if value.trim().is_empty() {
                return Err(ReconcileError::validation(format!(
                    "rule '{rule}': {field} must not be empty"
                )));
            }
            Ok(())
        };

        let compiled = match predicate {
            Predicate::AttributeEquals { attribute, value } => {
                require("attribute", attribute)?;
                Compiled::AttributeEquals {
                    attribute: attribute.clone(),
                    value: value.to_lowercase(),
                }
            }
            Predicate::AttributePresent { attribute } => {
                require("attribute", attribute)?;
                Compiled::AttributePresent(attribute.clone())
            }
            Predicate::NameSuffix { suffix } => {
                require("suffix", suffix)?;
                Compiled::NameSuffix(suffix.to_lowercase())
            }
            Predicate::NamePrefix { prefix } => {
                require("prefix", prefix)?;
                Compiled::NamePrefix(prefix.to_lowercase())
            }
            Predicate::NameMatches { pattern } => {
                require("pattern", pattern)?;
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ReconcileError::validation(format!(
                            "rule '{rule}': invalid pattern '{pattern}': {e}"
                        ))
                    })?;
                Compiled::NameMatches(regex)
            }
            Predicate::InactiveFor {
                attribute,
                days,
                fallback_attribute,
                never_set,
            } => {
                require("attribute", attribute)?;
                if *days == 0 {
                    return Err(ReconcileError::validation(format!(
                        "rule '{rule}': days must be greater than zero"
                    )));
                }
                Compiled::InactiveFor {
                    attribute: attribute.clone(),
                    fallback: fallback_attribute.clone(),
                    threshold: Duration::days(i64::from(*days)),
                    never_set: *never_set,
                }
            }
            Predicate::WithinPath { path } => {
                tierwarden_directory::operation::validate_dn(path)?;
                Compiled::WithinPath(path.clone())
            }
            Predicate::MemberOf { group } => {
                require("group", group)?;
                Compiled::MemberOf(group.clone())
            }
            Predicate::All { predicates } | Predicate::Any { predicates } => {
                if predicates.is_empty() {
                    return Err(ReconcileError::validation(format!(
                        "rule '{rule}': combinator has no predicates"
                    )));
                }
                let inner = predicates
                    .iter()
                    .map(|p| Compiled::compile(p, rule))
                    .collect::<ReconcileResult<Vec<_>>>()?;
                if matches!(predicate, Predicate::All { .. }) {
                    Compiled::All(inner)
                } else {
                    Compiled::Any(inner)
                }
            }
            Predicate::Not { predicate } => {
                Compiled::Not(Box::new(Compiled::compile(predicate, rule)?))
            }
        };
        Ok(compiled)
    }

    fn class(&self) -> PredicateClass {
        match self {
            Compiled::AttributeEquals { .. }
            | Compiled::AttributePresent(_)
            | Compiled::InactiveFor { .. } => PredicateClass::Attribute,
            Compiled::NameSuffix(_) | Compiled::NamePrefix(_) | Compiled::NameMatches(_) => {
                PredicateClass::Naming
            }
            Compiled::WithinPath(_) | Compiled::MemberOf(_) => PredicateClass::Neutral,
            Compiled::All(inner) | Compiled::Any(inner) => inner
                .iter()
                .map(Compiled::class)
                .max()
                .unwrap_or(PredicateClass::Neutral),
            // A negation states no intent of its own.
            Compiled::Not(_) => PredicateClass::Neutral,
        }
    }

    fn matches(&self, record: &ObjectRecord, as_of: DateTime<Utc>) -> bool {
        match self {
            Compiled::AttributeEquals { attribute, value } => record
                .attribute(attribute)
                .map(|v| v.to_strings().iter().any(|s| s.to_lowercase() == *value))
                .unwrap_or(false),
            Compiled::AttributePresent(attribute) => record.attributes().has(attribute),
            Compiled::NameSuffix(suffix) => record.identifier().to_lowercase().ends_with(suffix),
            Compiled::NamePrefix(prefix) => {
                record.identifier().to_lowercase().starts_with(prefix)
            }
            Compiled::NameMatches(regex) => regex.is_match(record.identifier()),
            Compiled::InactiveFor {
                attribute,
                fallback,
                threshold,
                never_set,
            } => {
                let last = record
                    .attribute(attribute)
                    .and_then(parse_directory_time)
                    .or_else(|| {
                        fallback
                            .as_deref()
                            .and_then(|name| record.attribute(name))
                            .and_then(parse_directory_time)
                    });
                match last {
                    Some(time) => as_of - time >= *threshold,
                    None => *never_set == NeverSetPolicy::Match,
                }
            }
            Compiled::WithinPath(path) => dn_is_within(record.distinguished_path(), path),
            Compiled::MemberOf(group) => record.is_member_of(group),
            Compiled::All(inner) => inner.iter().all(|p| p.matches(record, as_of)),
            Compiled::Any(inner) => inner.iter().any(|p| p.matches(record, as_of)),
            Compiled::Not(inner) => !inner.matches(record, as_of),
        }
    }
}

/// A validated rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    tag: Classification,
    class: PredicateClass,
    predicate: Compiled,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Classification {
        self.tag
    }

    pub fn class(&self) -> PredicateClass {
        self.class
    }
}

/// Ordered, compiled classification rules plus their reference time.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    as_of: DateTime<Utc>,
}

impl RuleSet {
    /// Compile and validate configured rules.
    ///
    /// Fails with `ValidationFailed` on an empty name, an `Unclassified` tag,
    /// an invalid regular expression, or an empty combinator.
    pub fn compile(rules: &[RuleConfig], as_of: DateTime<Utc>) -> ReconcileResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.name.trim().is_empty() {
                return Err(ReconcileError::validation("rule name must not be empty"));
            }
            if rule.tag == Classification::Unclassified {
                return Err(ReconcileError::validation(format!(
                    "rule '{}': unclassified is reserved for records no rule matches",
                    rule.name
                )));
            }
            let predicate = Compiled::compile(&rule.when, &rule.name)?;
            compiled.push(Rule {
                name: rule.name.clone(),
                tag: rule.tag,
                class: predicate.class(),
                predicate,
            });
        }
        Ok(Self {
            rules: compiled,
            as_of,
        })
    }

    /// An empty rule set; everything is `Unclassified`.
    #[must_use]
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self {
            rules: Vec::new(),
            as_of,
        }
    }

    /// Reference time for age thresholds.
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the deciding rule for a record.
    pub fn evaluate(&self, record: &ObjectRecord) -> Option<&Rule> {
        let mut matching = self
            .rules
            .iter()
            .filter(|rule| rule.predicate.matches(record, self.as_of));

        let first = matching.next()?;
        if first.class != PredicateClass::Naming {
            return Some(first);
        }
        match matching.find(|rule| rule.class == PredicateClass::Attribute) {
            Some(authoritative) => {
                debug!(
                    identifier = record.identifier(),
                    naming_rule = %first.name,
                    attribute_rule = %authoritative.name,
                    "Attribute rule overrides naming rule"
                );
                Some(authoritative)
            }
            None => Some(first),
        }
    }
}

/// Classify a record.
///
/// Returns [`Classification::Unclassified`] when no rule matches.
pub fn classify(record: &ObjectRecord, rules: &RuleSet) -> Classification {
    rules
        .evaluate(record)
        .map_or(Classification::Unclassified, Rule::tag)
}
