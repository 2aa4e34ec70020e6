//! Desired-state differ.
//!
//! Computes the minimal corrective actions that bring one record to the
//! state its classification demands. Pure: no I/O.
//!
//! Output order within an [`ActionSet`]:
//!
//! 1. lifecycle action (`Delete` suppresses everything else)
//! 2. group additions, sorted
//! 3. group removals (strict mode only), sorted
//! 4. attribute clears
//!
//! Every action is only emitted when the record is not already in the
//! target state, so diffing a record after a successful run yields nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use tierwarden_directory::ObjectRecord;

use crate::exclusion::ExclusionList;
use crate::types::{ActionSet, Classification, CorrectiveAction, LifecycleAction};

/// Policy flags controlling what the differ may emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    /// Remove memberships that are not desired.
    #[serde(default)]
    pub strict_mode: bool,

    /// Disable accounts that are unclassified or non-compliant.
    #[serde(default)]
    pub disable_non_compliant: bool,

    /// In strict mode, only remove groups that some classification desires.
    #[serde(default = "default_true")]
    pub managed_groups_only: bool,

    /// Log actions instead of applying them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            strict_mode: false,
            disable_non_compliant: false,
            managed_groups_only: true,
            dry_run: true,
        }
    }
}

/// Groups whose membership is never removed by default.
pub const DEFAULT_PROTECTED_GROUPS: &[&str] = &[
    "Domain Users",
    "Domain Computers",
    "Domain Controllers",
    "Domain Guests",
    "Domain Admins",
    "Enterprise Admins",
    "Schema Admins",
    "Administrators",
    "Protected Users",
];

/// What compliance looks like for each classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Groups a record of each classification must belong to.
    #[serde(default)]
    pub groups: BTreeMap<Classification, BTreeSet<String>>,

    /// Groups never removed in strict mode.
    #[serde(default = "default_protected_groups")]
    pub protected_groups: BTreeSet<String>,

    /// Attributes cleared on records of each classification.
    #[serde(default)]
    pub clear_attributes: BTreeMap<Classification, Vec<String>>,

    /// Account lifecycle action per classification.
    #[serde(default)]
    pub lifecycle: BTreeMap<Classification, LifecycleAction>,
}

fn default_protected_groups() -> BTreeSet<String> {
    DEFAULT_PROTECTED_GROUPS
        .iter()
        .map(|g| (*g).to_string())
        .collect()
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            protected_groups: default_protected_groups(),
            clear_attributes: BTreeMap::new(),
            lifecycle: BTreeMap::new(),
        }
    }
}

impl DesiredState {
    /// Set the desired groups for a classification.
    #[must_use]
    pub fn with_groups<I, S>(mut self, classification: Classification, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(classification, groups.into_iter().map(Into::into).collect());
        self
    }

    /// Set the lifecycle action for a classification.
    #[must_use]
    pub fn with_lifecycle(mut self, classification: Classification, action: LifecycleAction) -> Self {
        self.lifecycle.insert(classification, action);
        self
    }

    /// Add attributes to clear for a classification.
    #[must_use]
    pub fn with_clear_attributes<I, S>(mut self, classification: Classification, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear_attributes
            .entry(classification)
            .or_default()
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    fn is_protected(&self, group: &str) -> bool {
        self.protected_groups
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
    }

    /// Every group desired by any classification, lowercased.
    fn managed_groups(&self) -> HashSet<String> {
        self.groups
            .values()
            .flatten()
            .map(|g| g.to_lowercase())
            .collect()
    }
}

/// Compute the corrective actions for one record.
pub fn diff(
    record: &ObjectRecord,
    classification: Classification,
    desired: &DesiredState,
    exclusions: &ExclusionList,
    policy: &ReconcilePolicy,
) -> ActionSet {
    let mut actions = ActionSet::new();

    if classification == Classification::Excluded || exclusions.contains(record.identifier()) {
        debug!(identifier = record.identifier(), "Skipping excluded record");
        return actions;
    }

    let mut disable = false;
    match desired.lifecycle.get(&classification) {
        Some(LifecycleAction::Delete) => {
            actions.push(CorrectiveAction::Delete);
            return actions;
        }
        Some(LifecycleAction::Disable) => disable = true,
        None => {}
    }
    if classification.is_non_compliant() && policy.disable_non_compliant {
        disable = true;
    }
    if disable && !record.is_disabled() {
        actions.push(CorrectiveAction::Disable);
    }

    if !classification.is_non_compliant() {
        if let Some(groups) = desired.groups.get(&classification) {
            diff_memberships(record, groups, desired, policy, &mut actions);
        }
    }

    if let Some(attributes) = desired.clear_attributes.get(&classification) {
        let mut seen = HashSet::new();
        for attribute in attributes {
            if seen.insert(attribute.to_lowercase()) && record.attributes().has(attribute) {
                actions.push(CorrectiveAction::ClearAttribute(attribute.clone()));
            }
        }
    }

    actions
}

fn diff_memberships(
    record: &ObjectRecord,
    wanted: &BTreeSet<String>,
    desired: &DesiredState,
    policy: &ReconcilePolicy,
    actions: &mut ActionSet,
) {
    for group in wanted {
        if !record.is_member_of(group) {
            actions.push(CorrectiveAction::AddToGroup(group.clone()));
        }
    }

    if !policy.strict_mode {
        return;
    }

    let managed = policy.managed_groups_only.then(|| desired.managed_groups());
    for group in record.memberships() {
        if wanted.iter().any(|g| g.eq_ignore_ascii_case(group)) || desired.is_protected(group) {
            continue;
        }
        if let Some(managed) = &managed {
            if !managed.contains(&group.to_lowercase()) {
                continue;
            }
        }
        actions.push(CorrectiveAction::RemoveFromGroup(group.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> DesiredState {
        DesiredState::default()
            .with_groups(Classification::Tier0, ["Tier0 Admins"])
            .with_groups(Classification::Tier1, ["GroupA"])
            .with_groups(Classification::Tier2, ["Workstation Admins", "Helpdesk"])
    }

    fn policy() -> ReconcilePolicy {
        ReconcilePolicy {
            dry_run: false,
            ..Default::default()
        }
    }

    fn no_exclusions() -> ExclusionList {
        ExclusionList::new()
    }

    #[test]
    fn test_missing_group_is_added() {
        let record = ObjectRecord::builder("alice_T1").build();
        let actions = diff(&record, Classification::Tier1, &desired(), &no_exclusions(), &policy());
        assert_eq!(
            actions.as_slice(),
            &[CorrectiveAction::AddToGroup("GroupA".to_string())]
        );
    }

    #[test]
    fn test_compliant_record_yields_nothing() {
        let record = ObjectRecord::builder("alice_T1").member_of("groupa").build();
        let actions = diff(&record, Classification::Tier1, &desired(), &no_exclusions(), &policy());
        assert!(actions.is_empty());
    }

    #[test]
    fn test_unclassified_disabled_by_policy() {
        let record = ObjectRecord::builder("bob").member_of("GroupA").build();
        let strict = ReconcilePolicy {
            disable_non_compliant: true,
            strict_mode: true,
            ..policy()
        };
        let actions = diff(&record, Classification::Unclassified, &desired(), &no_exclusions(), &strict);
        assert_eq!(actions.as_slice(), &[CorrectiveAction::Disable]);

        let lenient = diff(&record, Classification::Unclassified, &desired(), &no_exclusions(), &policy());
        assert!(lenient.is_empty());
    }

    #[test]
    fn test_already_disabled_is_not_disabled_again() {
        let record = ObjectRecord::builder("bob").disabled(true).build();
        let strict = ReconcilePolicy {
            disable_non_compliant: true,
            ..policy()
        };
        assert!(diff(&record, Classification::NonCompliant, &desired(), &no_exclusions(), &strict).is_empty());
    }

    #[test]
    fn test_excluded_record_yields_nothing() {
        let exclusions = ExclusionList::from_identifiers(["krbtgt"]).unwrap();
        let record = ObjectRecord::builder("KRBTGT").build();
        let state = desired().with_lifecycle(Classification::Unclassified, LifecycleAction::Delete);
        let strict = ReconcilePolicy {
            disable_non_compliant: true,
            strict_mode: true,
            ..policy()
        };

        for classification in Classification::ALL {
            let actions = diff(&record, classification, &state, &exclusions, &strict);
            assert!(actions.is_empty(), "{classification} produced actions");
        }
    }

    #[test]
    fn test_strict_mode_removes_undesired_but_not_protected() {
        let record = ObjectRecord::builder("carol_T1")
            .memberships(["Tier0 Admins", "Domain Users", "Helpdesk"])
            .build();
        let strict = ReconcilePolicy {
            strict_mode: true,
            ..policy()
        };
        let actions = diff(&record, Classification::Tier1, &desired(), &no_exclusions(), &strict);
        assert_eq!(
            actions.as_slice(),
            &[
                CorrectiveAction::AddToGroup("GroupA".to_string()),
                CorrectiveAction::RemoveFromGroup("Helpdesk".to_string()),
                CorrectiveAction::RemoveFromGroup("Tier0 Admins".to_string()),
            ]
        );
    }

    #[test]
    fn test_managed_groups_only_keeps_unmanaged_memberships() {
        let record = ObjectRecord::builder("dave_T2")
            .memberships(["Workstation Admins", "Helpdesk", "VPN Users", "GroupA"])
            .build();
        let managed_only = ReconcilePolicy {
            strict_mode: true,
            ..policy()
        };
        let actions = diff(&record, Classification::Tier2, &desired(), &no_exclusions(), &managed_only);
        assert_eq!(
            actions.as_slice(),
            &[CorrectiveAction::RemoveFromGroup("GroupA".to_string())]
        );

        let everything = ReconcilePolicy {
            managed_groups_only: false,
            ..managed_only
        };
        let actions = diff(&record, Classification::Tier2, &desired(), &no_exclusions(), &everything);
        assert_eq!(
            actions.as_slice(),
            &[
                CorrectiveAction::RemoveFromGroup("GroupA".to_string()),
                CorrectiveAction::RemoveFromGroup("VPN Users".to_string()),
            ]
        );
    }

    #[test]
    fn test_classification_without_desired_groups_has_no_membership_actions() {
        let record = ObjectRecord::builder("erin").member_of("GroupA").build();
        let strict = ReconcilePolicy {
            strict_mode: true,
            ..policy()
        };
        assert!(diff(&record, Classification::Orphaned, &desired(), &no_exclusions(), &strict).is_empty());
    }

    #[test]
    fn test_lifecycle_delete_suppresses_everything_else() {
        let state = desired()
            .with_groups(Classification::Stale, ["Disabled Accounts"])
            .with_lifecycle(Classification::Stale, LifecycleAction::Delete)
            .with_clear_attributes(Classification::Stale, ["adminCount"]);
        let record = ObjectRecord::builder("frank").attribute("adminCount", 1i64).build();
        let actions = diff(&record, Classification::Stale, &state, &no_exclusions(), &policy());
        assert_eq!(actions.as_slice(), &[CorrectiveAction::Delete]);
    }

    #[test]
    fn test_action_order() {
        let state = desired()
            .with_groups(Classification::Stale, ["Stale Accounts", "Disabled Accounts"])
            .with_lifecycle(Classification::Stale, LifecycleAction::Disable)
            .with_clear_attributes(Classification::Stale, ["adminCount", "servicePrincipalName", "ADMINCOUNT"]);
        let record = ObjectRecord::builder("gina")
            .attribute("adminCount", 1i64)
            .member_of("GroupA")
            .build();
        let strict = ReconcilePolicy {
            strict_mode: true,
            ..policy()
        };
        let actions = diff(&record, Classification::Stale, &state, &no_exclusions(), &strict);
        assert_eq!(
            actions.as_slice(),
            &[
                CorrectiveAction::Disable,
                CorrectiveAction::AddToGroup("Disabled Accounts".to_string()),
                CorrectiveAction::AddToGroup("Stale Accounts".to_string()),
                CorrectiveAction::RemoveFromGroup("GroupA".to_string()),
                CorrectiveAction::ClearAttribute("adminCount".to_string()),
            ]
        );
    }

    #[test]
    fn test_absent_attribute_is_not_cleared() {
        let state = desired().with_clear_attributes(Classification::Tier2, ["adminCount"]);
        let record = ObjectRecord::builder("hank")
            .memberships(["Workstation Admins", "Helpdesk"])
            .build();
        assert!(diff(&record, Classification::Tier2, &state, &no_exclusions(), &policy()).is_empty());
    }

    #[test]
    fn test_policy_defaults_to_dry_run() {
        let policy: ReconcilePolicy = serde_yaml::from_str("strict_mode: true").unwrap();
        assert!(policy.dry_run);
        assert!(policy.managed_groups_only);
        assert!(!policy.disable_non_compliant);

        let state: DesiredState = serde_yaml::from_str("groups:\n  tier1: [GroupA]\n").unwrap();
        assert!(state.protected_groups.contains("Domain Users"));
    }
}
