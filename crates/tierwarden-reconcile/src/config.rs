//! Reconciliation configuration.
//!
//! One typed struct per section, all with serde defaults, validated
//! explicitly before a run touches the directory.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use tierwarden_directory::operation::validate_dn;
use tierwarden_directory::{DirectoryQuery, Filter, ObjectKind, RetryConfig, SearchScope};

use crate::classify::{RuleConfig, RuleSet};
use crate::diff::{DesiredState, ReconcilePolicy};
use crate::error::{ReconcileError, ReconcileResult};
use crate::exclusion::ExclusionConfig;

/// Which objects a run evaluates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub kind: ObjectKind,

    /// Search base; the directory's naming context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(default)]
    pub scope: SearchScope,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
}

impl SearchConfig {
    /// Build the directory query.
    pub fn to_query(&self) -> DirectoryQuery {
        let mut query = DirectoryQuery::new(self.kind).with_scope(self.scope);
        if let Some(base) = &self.base {
            query = query.with_base(base.clone());
        }
        if let Some(filter) = &self.filter {
            query = query.with_filter(filter.clone());
        }
        query
    }
}

/// Timeouts, retries and the run deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Deadline for a single directory call.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Retries after a transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Stop starting new records after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    500
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            operation_timeout_secs: default_operation_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            run_deadline_secs: None,
        }
    }
}

impl ExecutionConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryConfig::default()
        }
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// Complete configuration for a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub exclusions: ExclusionConfig,

    /// Ordered classification rules.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    #[serde(default)]
    pub desired_state: DesiredState,

    #[serde(default)]
    pub policy: ReconcilePolicy,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl ReconcileConfig {
    /// Load from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> ReconcileResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse from YAML text.
    pub fn from_yaml_str(contents: &str) -> ReconcileResult<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| ReconcileError::config_with_source("invalid configuration", e))
    }

    /// Attributes a run reads from records: those used by rules and those
    /// configured to be cleared.
    pub fn referenced_attributes(&self) -> BTreeSet<&str> {
        let from_rules = self.rules.iter().flat_map(|rule| rule.when.attributes());
        let cleared = self
            .desired_state
            .clear_attributes
            .values()
            .flatten()
            .map(String::as_str);
        from_rules.chain(cleared).collect()
    }

    /// Validate every section.
    ///
    /// Fails with `ValidationFailed` before any directory call is made.
    pub fn validate(&self) -> ReconcileResult<()> {
        if let Some(base) = &self.search.base {
            validate_dn(base)?;
        }
        if let Some(filter) = &self.search.filter {
            filter.validate()?;
        }

        self.exclusions.validate()?;
        RuleSet::compile(&self.rules, Utc::now())?;

        let state = &self.desired_state;
        for (classification, groups) in &state.groups {
            if groups.iter().any(|g| g.trim().is_empty()) {
                return Err(ReconcileError::validation(format!(
                    "desired groups for {classification} contain an empty name"
                )));
            }
        }
        for (classification, attributes) in &state.clear_attributes {
            if attributes.iter().any(|a| a.trim().is_empty()) {
                return Err(ReconcileError::validation(format!(
                    "clear attributes for {classification} contain an empty name"
                )));
            }
        }

        if self.execution.operation_timeout_secs == 0 {
            return Err(ReconcileError::validation(
                "operation_timeout_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}
