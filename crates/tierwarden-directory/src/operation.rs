//! Directory operation types
//!
//! Attribute values and sets, search filters, and query descriptions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{DirectoryError, DirectoryResult};
use crate::types::{ObjectKind, SearchScope};

/// A value for an attribute, which may be single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single boolean value.
    Boolean(bool),
    /// A single integer value.
    Integer(i64),
    /// A single string value.
    String(String),
    /// Multiple values.
    Array(Vec<AttributeValue>),
    /// Binary data such as `objectSid`.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Check if this value carries nothing (null or an empty array).
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::Array(values) => values.iter().all(AttributeValue::is_empty),
            AttributeValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer, parsing string-encoded integers as directories
    /// commonly return them.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get as a boolean, accepting LDAP `TRUE`/`FALSE` strings.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            AttributeValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            AttributeValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Render every value as text (works for both single and multi-valued).
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            AttributeValue::Null => vec![],
            AttributeValue::Boolean(b) => vec![if *b { "TRUE" } else { "FALSE" }.to_string()],
            AttributeValue::Integer(i) => vec![i.to_string()],
            AttributeValue::String(s) => vec![s.clone()],
            AttributeValue::Array(arr) => arr.iter().flat_map(AttributeValue::to_strings).collect(),
            AttributeValue::Binary(_) => vec![],
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect())
    }
}

/// A set of attributes keyed by name.
///
/// Directory attribute names are case-insensitive, so names are folded to
/// lowercase on the way in and on lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, AttributeValue>",
    into = "BTreeMap<String, AttributeValue>"
)]
pub struct AttributeSet {
    attributes: BTreeMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<AttributeValue>) {
        self.attributes
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_string)
    }

    /// Check if an attribute exists and carries at least one value.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(&name.to_ascii_lowercase())
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeSet {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        map.into_iter().collect()
    }
}

impl From<AttributeSet> for BTreeMap<String, AttributeValue> {
    fn from(set: AttributeSet) -> Self {
        set.attributes
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        let mut set = AttributeSet::new();
        for (name, value) in iter {
            set.set(name, value);
        }
        set
    }
}

/// Filter for directory queries.
///
/// Only attribute predicates and their boolean combinations are expressible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match objects where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match objects where attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Match objects where attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Match objects where attribute ends with value.
    EndsWith { attribute: String, value: String },

    /// Match objects where attribute is greater than or equal to value.
    GreaterThanOrEquals { attribute: String, value: String },

    /// Match objects where attribute is less than or equal to value.
    LessThanOrEquals { attribute: String, value: String },

    /// Match objects where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    #[must_use]
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Check that the filter is structurally valid.
    pub fn validate(&self) -> DirectoryResult<()> {
        match self {
            Filter::Equals { attribute, .. }
            | Filter::Contains { attribute, .. }
            | Filter::StartsWith { attribute, .. }
            | Filter::EndsWith { attribute, .. }
            | Filter::GreaterThanOrEquals { attribute, .. }
            | Filter::LessThanOrEquals { attribute, .. }
            | Filter::Present { attribute } => validate_attribute_name(attribute),
            Filter::And { filters } | Filter::Or { filters } => {
                if filters.is_empty() {
                    return Err(DirectoryError::validation(
                        "filter combinator must contain at least one filter",
                    ));
                }
                filters.iter().try_for_each(Filter::validate)
            }
            Filter::Not { filter } => filter.validate(),
        }
    }

    /// Evaluate the filter against an attribute set.
    ///
    /// String comparisons are case-insensitive; ordering comparisons are
    /// numeric when both sides parse as integers.
    pub fn matches(&self, attrs: &AttributeSet) -> bool {
        match self {
            Filter::Equals { attribute, value } => {
                any_value(attrs, attribute, |v| v.eq_ignore_ascii_case(value))
            }
            Filter::Contains { attribute, value } => {
                let needle = value.to_lowercase();
                any_value(attrs, attribute, |v| v.to_lowercase().contains(&needle))
            }
            Filter::StartsWith { attribute, value } => {
                let needle = value.to_lowercase();
                any_value(attrs, attribute, |v| v.to_lowercase().starts_with(&needle))
            }
            Filter::EndsWith { attribute, value } => {
                let needle = value.to_lowercase();
                any_value(attrs, attribute, |v| v.to_lowercase().ends_with(&needle))
            }
            Filter::GreaterThanOrEquals { attribute, value } => {
                any_value(attrs, attribute, |v| compare(v, value) != Ordering::Less)
            }
            Filter::LessThanOrEquals { attribute, value } => {
                any_value(attrs, attribute, |v| compare(v, value) != Ordering::Greater)
            }
            Filter::Present { attribute } => attrs.has(attribute),
            Filter::And { filters } => filters.iter().all(|f| f.matches(attrs)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(attrs)),
            Filter::Not { filter } => !filter.matches(attrs),
        }
    }
}

fn validate_attribute_name(name: &str) -> DirectoryResult<()> {
    if name.is_empty() {
        return Err(DirectoryError::validation("filter attribute name is empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
    {
        return Err(DirectoryError::validation(format!(
            "invalid filter attribute name '{name}'"
        )));
    }
    Ok(())
}

fn any_value(attrs: &AttributeSet, attribute: &str, pred: impl Fn(&str) -> bool) -> bool {
    attrs
        .get(attribute)
        .map(|v| v.to_strings().iter().any(|s| pred(s)))
        .unwrap_or(false)
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<i64>(), right.trim().parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

/// A directory query: which objects, where, and matching what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryQuery {
    /// Kind of objects to return.
    #[serde(default)]
    pub kind: ObjectKind,

    /// Optional attribute filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// Search scope.
    #[serde(default)]
    pub scope: SearchScope,

    /// Search base; the adapter's naming context when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl DirectoryQuery {
    /// Create a subtree query for the given object kind.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            filter: None,
            scope: SearchScope::Subtree,
            base: None,
        }
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the search base.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Validate the filter and search base.
    pub fn validate(&self) -> DirectoryResult<()> {
        if let Some(base) = &self.base {
            validate_dn(base)?;
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Check that a distinguished name is syntactically plausible: a non-empty
/// comma-separated list of `attr=value` components.
pub fn validate_dn(dn: &str) -> DirectoryResult<()> {
    let trimmed = dn.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::validation("distinguished name is empty"));
    }

    for rdn in split_dn(trimmed) {
        let Some((attr, value)) = rdn.split_once('=') else {
            return Err(DirectoryError::validation(format!(
                "invalid distinguished name '{dn}': component '{rdn}' has no '='"
            )));
        };
        if attr.trim().is_empty() || value.trim().is_empty() {
            return Err(DirectoryError::validation(format!(
                "invalid distinguished name '{dn}': empty component in '{rdn}'"
            )));
        }
    }
    Ok(())
}

/// Split a DN into its RDN components, honouring backslash escapes.
pub fn split_dn(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                parts.push(dn[start..i].trim());
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(dn[start..].trim());
    parts
}

/// Extract the value of the leading RDN, e.g. `GroupA` from
/// `CN=GroupA,OU=Groups,DC=corp,DC=local`.
pub fn leading_rdn_value(dn: &str) -> Option<String> {
    let first = split_dn(dn).into_iter().next()?;
    let (_, value) = first.split_once('=')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.replace('\\', ""))
    }
}

/// Check whether `dn` lies at or below `container` (case-insensitive).
pub fn dn_is_within(dn: &str, container: &str) -> bool {
    let dn = dn.trim().to_lowercase();
    let container = container.trim().to_lowercase();
    dn == container || dn.ends_with(&format!(",{container}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_set_case_insensitive() {
        let attrs = AttributeSet::new()
            .with("employeeType", "T1")
            .with("adminCount", 1i64);

        assert_eq!(attrs.get_string("EMPLOYEETYPE"), Some("T1"));
        assert_eq!(attrs.get("admincount").and_then(|v| v.as_integer()), Some(1));
        assert!(!attrs.has("mail"));
    }

    #[test]
    fn test_attribute_set_deserialize_folds_case() {
        let attrs: AttributeSet = serde_yaml::from_str("employeeType: T0\nadminCount: 1\n").unwrap();
        assert_eq!(attrs.get_string("employeetype"), Some("T0"));
        assert_eq!(attrs.get("ADMINCOUNT").and_then(|v| v.as_integer()), Some(1));
    }

    #[test]
    fn test_attribute_value_integer_from_string() {
        assert_eq!(AttributeValue::from("512").as_integer(), Some(512));
        assert_eq!(AttributeValue::from("abc").as_integer(), None);
    }

    #[test]
    fn test_empty_values_are_not_present() {
        let attrs = AttributeSet::new()
            .with("description", "")
            .with("memberOf", AttributeValue::Array(vec![]));
        assert!(!attrs.has("description"));
        assert!(!attrs.has("memberOf"));
    }

    #[test]
    fn test_filter_matching() {
        let attrs = AttributeSet::new()
            .with("sAMAccountName", "alice_T1")
            .with("adminCount", "1");

        assert!(Filter::eq("samaccountname", "ALICE_t1").matches(&attrs));
        assert!(Filter::Present {
            attribute: "adminCount".to_string()
        }
        .matches(&attrs));
        assert!(Filter::EndsWith {
            attribute: "sAMAccountName".to_string(),
            value: "_t1".to_string()
        }
        .matches(&attrs));
        assert!(!Filter::negate(Filter::eq("adminCount", "1")).matches(&attrs));
    }

    #[test]
    fn test_filter_numeric_comparison() {
        let attrs = AttributeSet::new().with("lastLogonTimestamp", "133000000000000000");

        let filter = Filter::LessThanOrEquals {
            attribute: "lastLogonTimestamp".to_string(),
            value: "133500000000000000".to_string(),
        };
        assert!(filter.matches(&attrs));
    }

    #[test]
    fn test_filter_validation() {
        assert!(Filter::eq("employeeType", "T0").validate().is_ok());
        assert!(Filter::eq("", "T0").validate().is_err());
        assert!(Filter::eq("bad)(attr", "x").validate().is_err());
        assert!(Filter::and(vec![]).validate().is_err());
        assert!(Filter::negate(Filter::and(vec![Filter::present("cn")]))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_filter_serde() {
        let yaml = "type: equals\nattribute: employeeType\nvalue: T0\n";
        let filter: Filter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(filter, Filter::eq("employeeType", "T0"));
    }

    #[test]
    fn test_validate_dn() {
        assert!(validate_dn("OU=Admins,DC=corp,DC=local").is_ok());
        assert!(validate_dn("CN=Smith\\, John,OU=Users,DC=corp").is_ok());
        assert!(validate_dn("").is_err());
        assert!(validate_dn("corp.local").is_err());
        assert!(validate_dn("OU=,DC=corp").is_err());
    }

    #[test]
    fn test_leading_rdn_value() {
        assert_eq!(
            leading_rdn_value("CN=GroupA,OU=Groups,DC=corp,DC=local").as_deref(),
            Some("GroupA")
        );
        assert_eq!(
            leading_rdn_value("CN=Smith\\, John,OU=Users").as_deref(),
            Some("Smith, John")
        );
    }

    #[test]
    fn test_dn_is_within() {
        assert!(dn_is_within(
            "CN=alice,OU=Tier1,OU=Admin,DC=corp,DC=local",
            "ou=admin,dc=corp,dc=local"
        ));
        assert!(!dn_is_within(
            "CN=alice,OU=Staff,DC=corp,DC=local",
            "OU=Admin,DC=corp,DC=local"
        ));
    }

    #[test]
    fn test_query_validation() {
        let query = DirectoryQuery::new(ObjectKind::User).with_base("not a dn");
        assert!(query.validate().is_err());

        let query = DirectoryQuery::new(ObjectKind::Group)
            .with_base("OU=Groups,DC=corp,DC=local")
            .with_filter(Filter::present("adminCount"));
        assert!(query.validate().is_ok());
    }
}
