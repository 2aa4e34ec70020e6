//! Object records
//!
//! A point-in-time snapshot of one directory object, taken at query time.
//! Records are never updated in place; corrective work is expressed
//! separately so a run never reads its own writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::operation::{AttributeSet, AttributeValue};
use crate::types::ObjectKind;

/// One directory object under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    identifier: String,
    distinguished_path: String,
    kind: ObjectKind,
    #[serde(default)]
    attributes: AttributeSet,
    #[serde(default)]
    memberships: BTreeSet<String>,
    #[serde(default)]
    disabled: bool,
}

impl ObjectRecord {
    /// Start building a record.
    pub fn builder(identifier: impl Into<String>) -> ObjectRecordBuilder {
        ObjectRecordBuilder::new(identifier)
    }

    /// Unique key of the object (e.g. account name).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Hierarchical location of the object.
    pub fn distinguished_path(&self) -> &str {
        &self.distinguished_path
    }

    /// Kind of object.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Attribute snapshot.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Group identifiers the object belonged to at query time.
    pub fn memberships(&self) -> &BTreeSet<String> {
        &self.memberships
    }

    /// Whether the account was disabled at query time.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Membership check, ignoring case.
    pub fn is_member_of(&self, group: &str) -> bool {
        self.memberships
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
    }

    /// Attribute lookup shortcut.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Attribute set extended with the record's own fields under their
    /// usual directory names, so filters can address them uniformly.
    pub fn filter_view(&self) -> AttributeSet {
        let mut view = self.attributes.clone();
        if !view.has("sAMAccountName") {
            view.set("sAMAccountName", self.identifier.as_str());
        }
        if !view.has("distinguishedName") {
            view.set("distinguishedName", self.distinguished_path.as_str());
        }
        if !view.has("memberOf") {
            view.set(
                "memberOf",
                self.memberships.iter().cloned().collect::<Vec<_>>(),
            );
        }
        view.set("objectClass", self.kind.as_str());
        view
    }
}

/// Builder for [`ObjectRecord`].
#[derive(Debug, Clone)]
pub struct ObjectRecordBuilder {
    record: ObjectRecord,
}

impl ObjectRecordBuilder {
    fn new(identifier: impl Into<String>) -> Self {
        Self {
            record: ObjectRecord {
                identifier: identifier.into(),
                distinguished_path: String::new(),
                kind: ObjectKind::User,
                attributes: AttributeSet::new(),
                memberships: BTreeSet::new(),
                disabled: false,
            },
        }
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.record.distinguished_path = path.into();
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ObjectKind) -> Self {
        self.record.kind = kind;
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl AsRef<str>, value: impl Into<AttributeValue>) -> Self {
        self.record.attributes.set(name, value);
        self
    }

    #[must_use]
    pub fn attributes(mut self, attributes: AttributeSet) -> Self {
        self.record.attributes = attributes;
        self
    }

    #[must_use]
    pub fn member_of(mut self, group: impl Into<String>) -> Self {
        self.record.memberships.insert(group.into());
        self
    }

    #[must_use]
    pub fn memberships<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record
            .memberships
            .extend(groups.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.record.disabled = disabled;
        self
    }

    pub fn build(self) -> ObjectRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let record = ObjectRecord::builder("alice_T1")
            .path("CN=alice_T1,OU=Tier1,DC=corp,DC=local")
            .attribute("employeeType", "T1")
            .member_of("GroupA")
            .build();

        assert_eq!(record.identifier(), "alice_T1");
        assert_eq!(record.kind(), ObjectKind::User);
        assert!(record.is_member_of("groupa"));
        assert!(!record.is_disabled());
        assert_eq!(
            record.attributes().get_string("EmployeeType"),
            Some("T1")
        );
    }

    #[test]
    fn test_filter_view_exposes_record_fields() {
        let record = ObjectRecord::builder("bob")
            .path("CN=bob,OU=Staff,DC=corp,DC=local")
            .memberships(["Staff", "VPN"])
            .build();

        let view = record.filter_view();
        assert_eq!(view.get_string("samaccountname"), Some("bob"));
        assert_eq!(
            view.get("memberOf").map(|v| v.to_strings()),
            Some(vec!["Staff".to_string(), "VPN".to_string()])
        );
        assert_eq!(view.get_string("objectClass"), Some("user"));
    }
}
