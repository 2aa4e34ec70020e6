//! In-process directory.
//!
//! [`InMemoryDirectory`] implements every capability trait over a snapshot
//! loaded from YAML or JSON. It backs offline runs and tests, and supports
//! injected failures and call recording.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{DirectoryError, DirectoryResult, ErrorKind};
use crate::operation::{dn_is_within, split_dn, AttributeSet, DirectoryQuery};
use crate::record::ObjectRecord;
use crate::traits::{Directory, MutationOp, QueryOp, WellKnownResolver};
use crate::types::{ObjectKind, SearchScope, WellKnownPrincipal, WellKnownSid};

/// Serialized form of an in-memory directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Display name, usually the DNS domain.
    #[serde(default = "default_snapshot_name")]
    pub name: String,

    /// Domain security identifier, used to resolve well-known principals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_sid: Option<String>,

    /// Objects in the directory.
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
}

fn default_snapshot_name() -> String {
    "in-memory".to_string()
}

/// One object in a [`DirectorySnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub identifier: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub memberships: Vec<String>,
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl SnapshotObject {
    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::builder(self.identifier.clone())
            .path(self.path.clone())
            .kind(self.kind)
            .attributes(self.attributes.clone())
            .memberships(self.memberships.iter().cloned())
            .disabled(self.disabled)
            .build()
    }
}

/// A mutation observed by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub target: String,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    kind: ErrorKind,
    /// Remaining failures; `None` fails forever.
    remaining: Option<usize>,
}

/// Fully functional directory held in memory.
pub struct InMemoryDirectory {
    name: String,
    domain_sid: Option<String>,
    objects: RwLock<BTreeMap<String, SnapshotObject>>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
    query_failure: Mutex<Option<String>>,
    query_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDirectory")
            .field("name", &self.name)
            .field("domain_sid", &self.domain_sid)
            .field("mutation_calls", &self.mutation_calls())
            .finish_non_exhaustive()
    }
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_snapshot(DirectorySnapshot {
            name: name.into(),
            ..DirectorySnapshot::default()
        })
    }

    /// Create a directory from a snapshot.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let objects = snapshot
            .objects
            .into_iter()
            .map(|o| (o.identifier.to_lowercase(), o))
            .collect();
        Self {
            name: snapshot.name,
            domain_sid: snapshot.domain_sid,
            objects: RwLock::new(objects),
            failures: Mutex::new(HashMap::new()),
            query_failure: Mutex::new(None),
            query_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Load a snapshot file. `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::query_failed_with_source(
                format!("failed to read snapshot {}", path.display()),
                e,
            )
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let snapshot: DirectorySnapshot = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                DirectoryError::query_failed_with_source(
                    format!("invalid snapshot {}", path.display()),
                    e,
                )
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                DirectoryError::query_failed_with_source(
                    format!("invalid snapshot {}", path.display()),
                    e,
                )
            })?
        };

        Ok(Self::from_snapshot(snapshot))
    }

    /// Set the domain SID.
    #[must_use]
    pub fn with_domain_sid(mut self, sid: impl Into<String>) -> Self {
        self.domain_sid = Some(sid.into());
        self
    }

    /// Insert or replace an object.
    pub async fn insert(&self, object: SnapshotObject) {
        self.objects
            .write()
            .await
            .insert(object.identifier.to_lowercase(), object);
    }

    /// Insert a record, optionally with a security identifier.
    pub async fn insert_record(&self, record: &ObjectRecord, sid: Option<&str>) {
        self.insert(SnapshotObject {
            identifier: record.identifier().to_string(),
            path: record.distinguished_path().to_string(),
            kind: record.kind(),
            sid: sid.map(str::to_string),
            disabled: record.is_disabled(),
            memberships: record.memberships().iter().cloned().collect(),
            attributes: record.attributes().clone(),
        })
        .await;
    }

    /// Add a group object with the given name.
    pub async fn insert_group(&self, name: &str) {
        self.insert(SnapshotObject {
            identifier: name.to_string(),
            path: format!("CN={name},OU=Groups"),
            kind: ObjectKind::Group,
            sid: None,
            disabled: false,
            memberships: Vec::new(),
            attributes: AttributeSet::new(),
        })
        .await;
    }

    /// Current state as a snapshot.
    pub async fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            name: self.name.clone(),
            domain_sid: self.domain_sid.clone(),
            objects: self.objects.read().await.values().cloned().collect(),
        }
    }

    /// Look up one object as a record.
    pub async fn get(&self, identifier: &str) -> Option<ObjectRecord> {
        self.objects
            .read()
            .await
            .get(&identifier.to_lowercase())
            .map(SnapshotObject::to_record)
    }

    /// Make every mutation targeting `identifier` fail with `kind`.
    pub fn inject_failure(&self, identifier: &str, kind: ErrorKind) {
        self.set_failure(identifier, kind, None);
    }

    /// Make the next `times` mutations targeting `identifier` fail with `kind`.
    pub fn inject_failures(&self, identifier: &str, kind: ErrorKind, times: usize) {
        self.set_failure(identifier, kind, Some(times));
    }

    fn set_failure(&self, identifier: &str, kind: ErrorKind, remaining: Option<usize>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(identifier.to_lowercase(), InjectedFailure { kind, remaining });
        }
    }

    /// Make every query fail.
    pub fn fail_queries(&self, message: impl Into<String>) {
        if let Ok(mut failure) = self.query_failure.lock() {
            *failure = Some(message.into());
        }
    }

    /// Number of query calls received.
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of mutation calls received, including failed ones.
    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// Every mutation call received, in order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record_call(
        &self,
        operation: &'static str,
        target: &str,
        argument: Option<&str>,
    ) -> DirectoryResult<()> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                operation,
                target: target.to_string(),
                argument: argument.map(str::to_string),
            });
        }

        let kind = {
            let Ok(mut failures) = self.failures.lock() else {
                return Ok(());
            };
            let key = target.to_lowercase();
            match failures.get_mut(&key) {
                None => return Ok(()),
                Some(failure) => match failure.remaining {
                    None => failure.kind,
                    Some(0) => return Ok(()),
                    Some(ref mut n) => {
                        *n -= 1;
                        failure.kind
                    }
                },
            }
        };
        Err(injected_error(kind, operation, target))
    }

    fn in_scope(object: &SnapshotObject, query: &DirectoryQuery) -> bool {
        let Some(base) = query.base.as_deref() else {
            return true;
        };
        match query.scope {
            SearchScope::WholeDomain => true,
            SearchScope::Subtree => dn_is_within(&object.path, base),
            SearchScope::SingleLevel => {
                let parts = split_dn(&object.path);
                parts.len() > 1 && parts[1..].join(",").eq_ignore_ascii_case(&split_dn(base).join(","))
            }
        }
    }
}

fn injected_error(kind: ErrorKind, operation: &str, target: &str) -> DirectoryError {
    match kind {
        ErrorKind::ObjectNotFound => DirectoryError::not_found(target),
        ErrorKind::AccessDenied => DirectoryError::access_denied(target, operation),
        ErrorKind::Timeout => DirectoryError::Timeout {
            operation: operation.to_string(),
            timeout_secs: 0,
        },
        ErrorKind::Unavailable => DirectoryError::unavailable("injected failure"),
        ErrorKind::QueryFailed => DirectoryError::query_failed("injected failure"),
        ErrorKind::ValidationFailed => DirectoryError::validation("injected failure"),
        ErrorKind::OperationFailed => DirectoryError::operation_failed("injected failure"),
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> DirectoryResult<()> {
        match self.query_failure.lock().ok().and_then(|f| f.clone()) {
            Some(message) => Err(DirectoryError::query_failed(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueryOp for InMemoryDirectory {
    #[instrument(skip(self, query), fields(kind = %query.kind, scope = %query.scope))]
    async fn query(&self, query: &DirectoryQuery) -> DirectoryResult<Vec<ObjectRecord>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.test_connection().await?;
        query
            .validate()
            .map_err(|e| DirectoryError::query_failed(e.to_string()))?;

        let objects = self.objects.read().await;
        let records: Vec<ObjectRecord> = objects
            .values()
            .filter(|o| o.kind == query.kind)
            .filter(|o| Self::in_scope(o, query))
            .map(SnapshotObject::to_record)
            .filter(|r| {
                query
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.matches(&r.filter_view()))
            })
            .collect();

        debug!(count = records.len(), "In-memory query complete");
        Ok(records)
    }
}

#[async_trait]
impl MutationOp for InMemoryDirectory {
    async fn add_to_group(&self, target: &str, group: &str) -> DirectoryResult<()> {
        self.record_call("add_to_group", target, Some(group))?;
        let mut objects = self.objects.write().await;
        let group_name = group_identifier(&objects, group)?;
        let object = objects
            .get_mut(&target.to_lowercase())
            .ok_or_else(|| DirectoryError::not_found(target))?;
        if !object
            .memberships
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group))
        {
            object.memberships.push(group_name);
        }
        Ok(())
    }

    async fn remove_from_group(&self, target: &str, group: &str) -> DirectoryResult<()> {
        self.record_call("remove_from_group", target, Some(group))?;
        let mut objects = self.objects.write().await;
        group_identifier(&objects, group)?;
        let object = objects
            .get_mut(&target.to_lowercase())
            .ok_or_else(|| DirectoryError::not_found(target))?;
        object.memberships.retain(|g| !g.eq_ignore_ascii_case(group));
        Ok(())
    }

    async fn clear_attribute(&self, target: &str, attribute: &str) -> DirectoryResult<()> {
        self.record_call("clear_attribute", target, Some(attribute))?;
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(&target.to_lowercase())
            .ok_or_else(|| DirectoryError::not_found(target))?;
        object.attributes.remove(attribute);
        Ok(())
    }

    async fn disable(&self, target: &str) -> DirectoryResult<()> {
        self.record_call("disable", target, None)?;
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(&target.to_lowercase())
            .ok_or_else(|| DirectoryError::not_found(target))?;
        object.disabled = true;
        if let Some(uac) = object
            .attributes
            .get("userAccountControl")
            .and_then(|v| v.as_integer())
        {
            object.attributes.set("userAccountControl", uac | 0x2);
        }
        Ok(())
    }

    async fn delete(&self, target: &str) -> DirectoryResult<()> {
        self.record_call("delete", target, None)?;
        let mut objects = self.objects.write().await;
        objects
            .remove(&target.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| DirectoryError::not_found(target))
    }
}

fn group_identifier(
    objects: &BTreeMap<String, SnapshotObject>,
    group: &str,
) -> DirectoryResult<String> {
    objects
        .get(&group.to_lowercase())
        .filter(|o| o.kind == ObjectKind::Group)
        .map(|o| o.identifier.clone())
        .ok_or_else(|| DirectoryError::not_found(group))
}

#[async_trait]
impl WellKnownResolver for InMemoryDirectory {
    async fn resolve_well_known(
        &self,
        principal: WellKnownPrincipal,
    ) -> DirectoryResult<Option<String>> {
        self.test_connection().await?;
        let sid = match (principal.sid(), self.domain_sid.as_deref()) {
            (WellKnownSid::DomainRelative(_), None) => return Ok(None),
            (_, domain_sid) => principal.sid_for_domain(domain_sid.unwrap_or_default()),
        };

        let objects = self.objects.read().await;
        Ok(objects
            .values()
            .find(|o| {
                o.sid
                    .as_deref()
                    .or_else(|| o.attributes.get_string("objectSid"))
                    .is_some_and(|s| s.eq_ignore_ascii_case(&sid))
            })
            .map(|o| o.identifier.clone()))
    }
}
