//! Exclusion list: identifiers that are never acted on.
//!
//! Seeded from configured identifiers plus built-in principals resolved by
//! security identifier at run time, so a renamed Administrator is still
//! protected.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tierwarden_directory::{DirectoryError, WellKnownPrincipal, WellKnownResolver};

use crate::error::{ReconcileError, ReconcileResult};

/// Characters that cannot appear in an account identifier.
const FORBIDDEN_CHARS: &[char] = &[
    '"', '/', '\\', '[', ']', ':', ';', '|', '=', ',', '+', '*', '?', '<', '>', '(', ')',
];

/// Exclusion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Identifiers excluded by name.
    #[serde(default)]
    pub identifiers: Vec<String>,

    /// Built-in principals excluded by SID.
    #[serde(default = "default_well_known")]
    pub well_known: Vec<WellKnownPrincipal>,
}

fn default_well_known() -> Vec<WellKnownPrincipal> {
    WellKnownPrincipal::default_exclusions().to_vec()
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            identifiers: Vec::new(),
            well_known: default_well_known(),
        }
    }
}

impl ExclusionConfig {
    /// Check every configured identifier.
    pub fn validate(&self) -> ReconcileResult<()> {
        self.identifiers
            .iter()
            .try_for_each(|id| validate_entry(id))
    }
}

/// Reject empty entries and entries carrying characters no account name
/// can contain.
pub fn validate_entry(identifier: &str) -> ReconcileResult<()> {
    if identifier.trim().is_empty() {
        return Err(ReconcileError::validation("exclusion entry is empty"));
    }
    if let Some(c) = identifier
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(ReconcileError::validation(format!(
            "exclusion entry '{identifier}' contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// Case-insensitive set of excluded identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    // lowercase -> as configured or resolved
    entries: BTreeMap<String, String>,
}

impl ExclusionList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from identifiers, validating each.
    pub fn from_identifiers<I, S>(identifiers: I) -> ReconcileResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::new();
        for identifier in identifiers {
            list.insert(identifier.as_ref())?;
        }
        Ok(list)
    }

    /// Add an identifier.
    pub fn insert(&mut self, identifier: &str) -> ReconcileResult<()> {
        validate_entry(identifier)?;
        let identifier = identifier.trim();
        self.entries
            .entry(identifier.to_lowercase())
            .or_insert_with(|| identifier.to_string());
        Ok(())
    }

    /// Check whether an identifier is excluded.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(&identifier.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Excluded identifiers in their original spelling, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    /// Build the run's exclusion list: configured identifiers plus resolved
    /// well-known principals.
    ///
    /// Principals that do not exist in the directory are skipped. A failed
    /// lookup, or one that takes longer than `timeout`, is fatal and reported
    /// as `QueryFailed`.
    pub async fn resolve<R>(
        config: &ExclusionConfig,
        resolver: &R,
        timeout: Duration,
    ) -> ReconcileResult<Self>
    where
        R: WellKnownResolver + ?Sized,
    {
        let mut list = Self::from_identifiers(&config.identifiers)?;

        for principal in &config.well_known {
            let lookup = tokio::time::timeout(timeout, resolver.resolve_well_known(*principal))
                .await
                .map_err(|_| {
                    DirectoryError::query_failed(format!(
                        "resolving well-known principal {principal:?} timed out after {}s",
                        timeout.as_secs()
                    ))
                })?;
            let resolved = lookup.map_err(|e| {
                if e.is_fatal() {
                    ReconcileError::from(e)
                } else {
                    ReconcileError::from(DirectoryError::query_failed_with_source(
                        format!("failed to resolve well-known principal {principal:?}"),
                        e,
                    ))
                }
            })?;

            match resolved {
                Some(identifier) => {
                    debug!(?principal, identifier = %identifier, "Resolved well-known principal");
                    list.insert(&identifier)?;
                }
                None => debug!(?principal, "Well-known principal not present"),
            }
        }

        info!(count = list.len(), "Exclusion list built");
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierwarden_directory::{ErrorKind, InMemoryDirectory, SnapshotObject};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_contains_is_case_insensitive() {
        let list = ExclusionList::from_identifiers(["krbtgt", "SVC-Backup"]).unwrap();
        assert!(list.contains("KRBTGT"));
        assert!(list.contains("svc-backup"));
        assert!(!list.contains("alice"));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["krbtgt", "SVC-Backup"]);
    }

    #[test]
    fn test_invalid_entries_are_rejected() {
        for bad in ["", "   ", "*", "admin)(cn=*", "a,b", "tab\tname"] {
            let err = ExclusionList::from_identifiers([bad]).unwrap_err();
            assert!(err.is_validation(), "{bad:?} should be rejected");
        }
        assert!(validate_entry("svc.sql-01$").is_ok());
    }

    #[test]
    fn test_default_config_seeds_builtins() {
        let config = ExclusionConfig::default();
        assert!(config.identifiers.is_empty());
        assert!(config.well_known.contains(&WellKnownPrincipal::Krbtgt));
        assert!(config.well_known.contains(&WellKnownPrincipal::Administrator));
    }

    fn object(identifier: &str, sid: &str) -> SnapshotObject {
        SnapshotObject {
            identifier: identifier.to_string(),
            path: format!("CN={identifier},CN=Users,DC=corp,DC=local"),
            kind: Default::default(),
            sid: Some(sid.to_string()),
            disabled: false,
            memberships: Vec::new(),
            attributes: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_resolve_uses_sid_not_name() {
        let directory = InMemoryDirectory::new("test").with_domain_sid("S-1-5-21-1-2-3");
        // Administrator renamed
        directory.insert(object("corp-root", "S-1-5-21-1-2-3-500")).await;
        directory.insert(object("krbtgt", "S-1-5-21-1-2-3-502")).await;
        directory.insert(object("Administrator", "S-1-5-21-1-2-3-1105")).await;

        let config = ExclusionConfig {
            identifiers: vec!["svc-backup".to_string()],
            ..Default::default()
        };
        let list = ExclusionList::resolve(&config, &directory, TIMEOUT).await.unwrap();

        assert!(list.contains("corp-root"));
        assert!(list.contains("krbtgt"));
        assert!(list.contains("svc-backup"));
        assert!(!list.contains("Administrator"));
        assert_eq!(list.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_failure_is_query_failed() {
        let directory = InMemoryDirectory::new("test").with_domain_sid("S-1-5-21-1-2-3");
        directory.fail_queries("server unreachable");

        let err = ExclusionList::resolve(&ExclusionConfig::default(), &directory, TIMEOUT)
            .await
            .unwrap_err();
        match err {
            ReconcileError::Directory(e) => assert_eq!(e.kind(), ErrorKind::QueryFailed),
            other => panic!("unexpected error: {other}"),
        }
    }
}
