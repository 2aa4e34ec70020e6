//! Reconciliation types: classifications, corrective actions, record states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of applying classification rules to a record.
///
/// Derived every run, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Infrastructure administration.
    Tier0,
    /// Server administration.
    Tier1,
    /// Workstation and standard-user administration.
    Tier2,
    /// Inactive beyond the configured threshold.
    Stale,
    /// No longer owned or justified.
    Orphaned,
    /// Matched a rule that marks it out of policy.
    NonCompliant,
    /// On the exclusion list; never acted on.
    Excluded,
    /// No rule matched.
    Unclassified,
}

impl Classification {
    /// All classifications, in reporting order.
    pub const ALL: [Classification; 8] = [
        Classification::Tier0,
        Classification::Tier1,
        Classification::Tier2,
        Classification::Stale,
        Classification::Orphaned,
        Classification::NonCompliant,
        Classification::Excluded,
        Classification::Unclassified,
    ];

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Tier0 => "tier0",
            Classification::Tier1 => "tier1",
            Classification::Tier2 => "tier2",
            Classification::Stale => "stale",
            Classification::Orphaned => "orphaned",
            Classification::NonCompliant => "non_compliant",
            Classification::Excluded => "excluded",
            Classification::Unclassified => "unclassified",
        }
    }

    /// Whether the non-compliance policy applies to this classification.
    #[must_use]
    pub fn is_non_compliant(&self) -> bool {
        matches!(
            self,
            Classification::NonCompliant | Classification::Unclassified
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Classification::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown classification '{s}'"))
    }
}

/// One corrective step toward compliance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum CorrectiveAction {
    AddToGroup(String),
    RemoveFromGroup(String),
    ClearAttribute(String),
    Disable,
    Delete,
}

impl CorrectiveAction {
    /// Stable name of the verb.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CorrectiveAction::AddToGroup(_) => "add_to_group",
            CorrectiveAction::RemoveFromGroup(_) => "remove_from_group",
            CorrectiveAction::ClearAttribute(_) => "clear_attribute",
            CorrectiveAction::Disable => "disable",
            CorrectiveAction::Delete => "delete",
        }
    }
}

impl fmt::Display for CorrectiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectiveAction::AddToGroup(g)
            | CorrectiveAction::RemoveFromGroup(g)
            | CorrectiveAction::ClearAttribute(g) => write!(f, "{}({})", self.name(), g),
            CorrectiveAction::Disable | CorrectiveAction::Delete => write!(f, "{}", self.name()),
        }
    }
}

/// Ordered corrective actions for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSet {
    actions: Vec<CorrectiveAction>,
}

impl ActionSet {
    /// Create an empty action set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, action: CorrectiveAction) {
        self.actions.push(action);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CorrectiveAction> {
        self.actions.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[CorrectiveAction] {
        &self.actions
    }
}

impl From<Vec<CorrectiveAction>> for ActionSet {
    fn from(actions: Vec<CorrectiveAction>) -> Self {
        Self { actions }
    }
}

impl<'a> IntoIterator for &'a ActionSet {
    type Item = &'a CorrectiveAction;
    type IntoIter = std::slice::Iter<'a, CorrectiveAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Account lifecycle action configured per classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Disable,
    Delete,
}

/// Per-record reconciliation state.
///
/// `Pending → Applying → Succeeded | Failed`; records never started before
/// the run deadline end as `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Pending,
    Applying,
    Succeeded,
    Failed,
    NotStarted,
}

impl RecordState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Pending => "pending",
            RecordState::Applying => "applying",
            RecordState::Succeeded => "succeeded",
            RecordState::Failed => "failed",
            RecordState::NotStarted => "not_started",
        }
    }

    /// Check if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Succeeded | RecordState::Failed | RecordState::NotStarted
        )
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
