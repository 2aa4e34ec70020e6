//! Directory type definitions
//!
//! Enums for object kinds, search scopes, and well-known principals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of directory object under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// User account
    #[default]
    User,
    /// Security or distribution group
    Group,
    /// Computer account
    Computer,
}

impl ObjectKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::User => "user",
            ObjectKind::Group => "group",
            ObjectKind::Computer => "computer",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = ParseObjectKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ObjectKind::User),
            "group" => Ok(ObjectKind::Group),
            "computer" => Ok(ObjectKind::Computer),
            _ => Err(ParseObjectKindError(s.to_string())),
        }
    }
}

/// Error parsing object kind from string.
#[derive(Debug, Clone)]
pub struct ParseObjectKindError(String);

impl fmt::Display for ParseObjectKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid object kind '{}', expected one of: user, group, computer",
            self.0
        )
    }
}

impl std::error::Error for ParseObjectKindError {}

/// How far below the search base a query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// The base and everything below it.
    #[default]
    Subtree,
    /// Direct children of the base only.
    SingleLevel,
    /// The whole naming context; the search base is ignored.
    WholeDomain,
}

impl SearchScope {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Subtree => "subtree",
            SearchScope::SingleLevel => "single_level",
            SearchScope::WholeDomain => "whole_domain",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Built-in principals that are resolved by security identifier rather than
/// by name, since administrators may rename them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellKnownPrincipal {
    /// Built-in domain Administrator (RID 500)
    Administrator,
    /// Built-in Guest (RID 501)
    Guest,
    /// Key distribution center service account (RID 502)
    Krbtgt,
    /// DefaultAccount (RID 503)
    DefaultAccount,
    /// Domain Admins (RID 512)
    DomainAdmins,
    /// Schema Admins (RID 518)
    SchemaAdmins,
    /// Enterprise Admins (RID 519)
    EnterpriseAdmins,
    /// BUILTIN\Administrators (S-1-5-32-544)
    BuiltinAdministrators,
}

/// Where a well-known principal's SID comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownSid {
    /// Domain SID followed by this relative identifier.
    DomainRelative(u32),
    /// A fixed SID independent of the domain.
    Absolute(&'static str),
}

impl WellKnownPrincipal {
    /// The default accounts that must never be reconciled.
    #[must_use]
    pub fn default_exclusions() -> &'static [WellKnownPrincipal] {
        &[
            WellKnownPrincipal::Administrator,
            WellKnownPrincipal::Guest,
            WellKnownPrincipal::Krbtgt,
            WellKnownPrincipal::DefaultAccount,
        ]
    }

    /// Get the SID shape of this principal.
    #[must_use]
    pub fn sid(&self) -> WellKnownSid {
        match self {
            WellKnownPrincipal::Administrator => WellKnownSid::DomainRelative(500),
            WellKnownPrincipal::Guest => WellKnownSid::DomainRelative(501),
            WellKnownPrincipal::Krbtgt => WellKnownSid::DomainRelative(502),
            WellKnownPrincipal::DefaultAccount => WellKnownSid::DomainRelative(503),
            WellKnownPrincipal::DomainAdmins => WellKnownSid::DomainRelative(512),
            WellKnownPrincipal::SchemaAdmins => WellKnownSid::DomainRelative(518),
            WellKnownPrincipal::EnterpriseAdmins => WellKnownSid::DomainRelative(519),
            WellKnownPrincipal::BuiltinAdministrators => WellKnownSid::Absolute("S-1-5-32-544"),
        }
    }

    /// Compose the full SID string given the domain SID.
    #[must_use]
    pub fn sid_for_domain(&self, domain_sid: &str) -> String {
        match self.sid() {
            WellKnownSid::DomainRelative(rid) => format!("{domain_sid}-{rid}"),
            WellKnownSid::Absolute(sid) => sid.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind_roundtrip() {
        for kind in [ObjectKind::User, ObjectKind::Group, ObjectKind::Computer] {
            let parsed: ObjectKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("printer".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_search_scope_serde() {
        let scope: SearchScope = serde_json::from_str("\"whole_domain\"").unwrap();
        assert_eq!(scope, SearchScope::WholeDomain);
        assert_eq!(SearchScope::default(), SearchScope::Subtree);
    }

    #[test]
    fn test_well_known_sid_composition() {
        let domain = "S-1-5-21-1004336348-1177238915-682003330";
        assert_eq!(
            WellKnownPrincipal::Krbtgt.sid_for_domain(domain),
            "S-1-5-21-1004336348-1177238915-682003330-502"
        );
        assert_eq!(
            WellKnownPrincipal::BuiltinAdministrators.sid_for_domain(domain),
            "S-1-5-32-544"
        );
    }

    #[test]
    fn test_default_exclusions_are_accounts() {
        let defaults = WellKnownPrincipal::default_exclusions();
        assert!(defaults.contains(&WellKnownPrincipal::Krbtgt));
        assert!(!defaults.contains(&WellKnownPrincipal::DomainAdmins));
    }
}
