//! LDAP directory implementation
//!
//! Implements the directory capability traits against Active Directory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use tierwarden_directory::operation::leading_rdn_value;
use tierwarden_directory::{
    AttributeSet, AttributeValue, Directory, DirectoryError, DirectoryQuery, DirectoryResult,
    Filter, MutationOp, ObjectKind, ObjectRecord, QueryOp, SearchScope, WellKnownPrincipal,
    WellKnownResolver,
};

use crate::ad::{decode_sid, kind_filter, UserAccountControl};
use crate::config::LdapConfig;
use crate::filter::{escape_filter_value, filter_to_ldap};

/// Directory backend for LDAP / Active Directory.
pub struct LdapDirectory {
    /// Configuration.
    config: LdapConfig,

    /// Display name for this directory instance.
    display_name: String,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,

    /// Object identifier (lowercase) to DN.
    object_dns: RwLock<HashMap<String, String>>,

    /// Group name (lowercase) to DN.
    group_dns: RwLock<HashMap<String, String>>,

    /// Group DN (lowercase) to the group's identifier.
    group_names: RwLock<HashMap<String, String>>,

    /// Domain SID, read once from the naming-context root.
    domain_sid: RwLock<Option<String>>,
}

impl LdapDirectory {
    /// Create a new LDAP directory with the given configuration.
    ///
    /// No connection is opened until the first call that needs one.
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;

        let display_name = format!("LDAP: {}", config.host);

        Ok(Self {
            config,
            display_name,
            connection: Arc::new(RwLock::new(None)),
            object_dns: RwLock::new(HashMap::new()),
            group_dns: RwLock::new(HashMap::new()),
            group_names: RwLock::new(HashMap::new()),
            domain_sid: RwLock::new(None),
        })
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> DirectoryResult<Ldap> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.create_connection().await?;

        {
            let mut conn_guard = self.connection.write().await;
            *conn_guard = Some(conn.clone());
        }

        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects.
    async fn reset_connection(&self) {
        self.connection.write().await.take();
    }

    /// Create a new LDAP connection.
    async fn create_connection(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(std::time::Duration::from_secs(
                self.config.connect_timeout_secs,
            ))
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                DirectoryError::unavailable_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                DirectoryError::unavailable_with_source(format!("LDAP bind failed for {bind_dn}"), e)
            })?;

        match result.rc {
            0 => {}
            49 => {
                return Err(DirectoryError::query_failed(format!(
                    "invalid credentials for {bind_dn}"
                )))
            }
            rc => {
                return Err(DirectoryError::unavailable(format!(
                    "LDAP bind failed with code {rc}: {}",
                    result.text
                )))
            }
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Run a paged search and collect every entry.
    async fn paged_search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: Vec<String>,
    ) -> Result<Vec<SearchEntry>, SearchFailure> {
        let mut ldap = self.get_connection().await.map_err(SearchFailure::Connect)?;

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.config.page_size)),
        ];

        let mut stream = ldap
            .streaming_search_with(adapters, base, scope, filter, attrs)
            .await
            .map_err(SearchFailure::Ldap)?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await.map_err(SearchFailure::Ldap)? {
            entries.push(SearchEntry::construct(entry));
        }
        stream
            .finish()
            .await
            .success()
            .map_err(SearchFailure::Ldap)?;

        Ok(entries)
    }

    /// Single-entry lookup used by mutations.
    async fn lookup(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: Vec<&str>,
        target: &str,
        operation: &str,
    ) -> DirectoryResult<Option<SearchEntry>> {
        let mut ldap = self.get_connection().await?;
        let result = match ldap.search(base, scope, filter, attrs).await {
            Ok(result) => result,
            Err(e) => {
                self.reset_connection().await;
                return Err(map_ldap_error(e, target, operation));
            }
        };
        match result.success() {
            Ok((entries, _)) => Ok(entries.into_iter().next().map(SearchEntry::construct)),
            Err(LdapError::LdapResult { result }) if result.rc == 32 => Ok(None),
            Err(e) => Err(map_ldap_error(e, target, operation)),
        }
    }

    /// Resolve an object identifier to its DN.
    async fn object_dn(&self, identifier: &str, operation: &str) -> DirectoryResult<String> {
        let key = identifier.to_lowercase();
        if let Some(dn) = self.object_dns.read().await.get(&key) {
            return Ok(dn.clone());
        }

        let filter = format!(
            "({}={})",
            self.config.identifier_attribute,
            escape_filter_value(identifier)
        );
        let entry = self
            .lookup(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec!["distinguishedName"],
                identifier,
                operation,
            )
            .await?
            .ok_or_else(|| DirectoryError::not_found(identifier))?;

        self.object_dns.write().await.insert(key, entry.dn.clone());
        Ok(entry.dn)
    }

    /// Resolve a group identifier to its DN.
    async fn group_dn(&self, group: &str, operation: &str) -> DirectoryResult<String> {
        let key = group.to_lowercase();
        if let Some(dn) = self.group_dns.read().await.get(&key) {
            return Ok(dn.clone());
        }

        let filter = format!(
            "(&(objectClass=group)({}={}))",
            self.config.identifier_attribute,
            escape_filter_value(group)
        );
        let entry = self
            .lookup(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec!["distinguishedName"],
                group,
                operation,
            )
            .await?
            .ok_or_else(|| DirectoryError::not_found(group))?;

        self.group_dns.write().await.insert(key, entry.dn.clone());
        Ok(entry.dn)
    }

    /// Map every `memberOf` DN in `entries` to the group's identifier, so
    /// memberships compare equal to the names used for mutations.
    ///
    /// Groups that cannot be read fall back to their CN.
    async fn resolve_group_names(
        &self,
        entries: &[SearchEntry],
    ) -> DirectoryResult<HashMap<String, String>> {
        let mut names: HashMap<String, String> = HashMap::new();
        let mut unresolved: Vec<(String, String)> = Vec::new();
        {
            let cache = self.group_names.read().await;
            for dn in entries.iter().flat_map(member_of_dns) {
                let key = dn.to_lowercase();
                if names.contains_key(&key) || unresolved.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                match cache.get(&key) {
                    Some(name) => {
                        names.insert(key, name.clone());
                    }
                    None => unresolved.push((key, dn.clone())),
                }
            }
        }

        for (key, dn) in unresolved {
            let entry = self
                .lookup(
                    &dn,
                    Scope::Base,
                    "(objectClass=group)",
                    vec![self.config.identifier_attribute.as_str()],
                    &dn,
                    "resolve group",
                )
                .await
                .map_err(as_query_failure)?;

            let name = match entry
                .as_ref()
                .and_then(|e| attribute_value(e, &self.config.identifier_attribute))
            {
                Some(name) => name,
                None => {
                    let Some(cn) = leading_rdn_value(&dn) else {
                        continue;
                    };
                    warn!(dn = %dn, "Group identifier not readable, using CN");
                    cn
                }
            };

            debug!(dn = %dn, group = %name, "Resolved group identifier");
            self.group_dns
                .write()
                .await
                .entry(name.to_lowercase())
                .or_insert_with(|| dn.clone());
            self.group_names
                .write()
                .await
                .insert(key.clone(), name.clone());
            names.insert(key, name);
        }

        Ok(names)
    }

    /// Issue a modify and translate the outcome.
    async fn modify(
        &self,
        dn: &str,
        mods: Vec<Mod<String>>,
        target: &str,
        operation: &str,
    ) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        match ldap.modify(dn, mods).await {
            Ok(result) => check_result_code(result.rc, &result.text, target, operation),
            Err(e) => {
                self.reset_connection().await;
                Err(map_ldap_error(e, target, operation))
            }
        }
    }

    /// Read and decode the domain SID from the naming-context root.
    async fn domain_sid(&self) -> DirectoryResult<String> {
        if let Some(sid) = self.domain_sid.read().await.as_ref() {
            return Ok(sid.clone());
        }

        let entry = self
            .lookup(
                &self.config.base_dn,
                Scope::Base,
                "(objectClass=*)",
                vec!["objectSid"],
                &self.config.base_dn,
                "read domain SID",
            )
            .await
            .map_err(as_query_failure)?
            .ok_or_else(|| {
                DirectoryError::query_failed(format!(
                    "naming context '{}' not found",
                    self.config.base_dn
                ))
            })?;

        let sid = entry
            .bin_attrs
            .get("objectSid")
            .and_then(|values| values.first())
            .and_then(|bytes| decode_sid(bytes))
            .ok_or_else(|| {
                DirectoryError::query_failed(format!(
                    "naming context '{}' has no readable objectSid",
                    self.config.base_dn
                ))
            })?;

        debug!(domain_sid = %sid, "Resolved domain SID");
        *self.domain_sid.write().await = Some(sid.clone());
        Ok(sid)
    }
}

/// Why a paged search failed.
enum SearchFailure {
    Connect(DirectoryError),
    Ldap(LdapError),
}

impl SearchFailure {
    fn into_query_failure(self) -> DirectoryError {
        match self {
            SearchFailure::Connect(e) => as_query_failure(e),
            SearchFailure::Ldap(e) => DirectoryError::query_failed_with_source("LDAP search failed", e),
        }
    }
}

/// Any failure while reading becomes fatal for the run.
fn as_query_failure(err: DirectoryError) -> DirectoryError {
    if matches!(err, DirectoryError::QueryFailed { .. }) {
        err
    } else {
        DirectoryError::query_failed(err.to_string())
    }
}

/// Translate an LDAP result code. Codes meaning "already in the desired
/// state" succeed so every verb stays idempotent.
pub(crate) fn check_result_code(
    rc: u32,
    text: &str,
    target: &str,
    operation: &str,
) -> DirectoryResult<()> {
    match rc {
        0 => Ok(()),
        // noSuchAttribute, attributeOrValueExists, entryAlreadyExists
        16 | 20 | 68 => {
            debug!(rc, target, operation, "Directory already in desired state");
            Ok(())
        }
        32 => Err(DirectoryError::not_found(target)),
        50 | 53 => Err(DirectoryError::access_denied(target, operation)),
        3 => Err(DirectoryError::Timeout {
            operation: operation.to_string(),
            timeout_secs: 0,
        }),
        51 | 52 | 80 => Err(DirectoryError::unavailable(format!(
            "{operation} on {target} failed with code {rc}: {text}"
        ))),
        _ => Err(DirectoryError::operation_failed(format!(
            "{operation} on {target} failed with code {rc}: {text}"
        ))),
    }
}

fn map_ldap_error(err: LdapError, target: &str, operation: &str) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } => {
            match check_result_code(result.rc, &result.text, target, operation) {
                Ok(()) => DirectoryError::operation_failed(format!(
                    "{operation} on {target} returned unexpected code {}",
                    result.rc
                )),
                Err(e) => e,
            }
        }
        other => DirectoryError::unavailable_with_source(
            format!("{operation} on {target} failed"),
            other,
        ),
    }
}

/// First value of a text attribute, matching the name case-insensitively.
fn attribute_value(entry: &SearchEntry, name: &str) -> Option<String> {
    entry
        .attrs
        .iter()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first().cloned())
}

/// Every `memberOf` DN of an entry.
pub(crate) fn member_of_dns(entry: &SearchEntry) -> impl Iterator<Item = &String> {
    entry
        .attrs
        .iter()
        .filter(|(attr, _)| attr.eq_ignore_ascii_case("memberOf"))
        .flat_map(|(_, values)| values.iter())
}

/// Convert a search entry to an attribute set, decoding `objectSid`.
pub(crate) fn entry_to_attribute_set(entry: &SearchEntry) -> AttributeSet {
    let mut attrs = AttributeSet::new();
    attrs.set("distinguishedName", entry.dn.clone());

    for (name, values) in &entry.attrs {
        match values.len() {
            0 => {}
            1 => attrs.set(name, values[0].clone()),
            _ => attrs.set(name, values.clone()),
        }
    }

    for (name, values) in &entry.bin_attrs {
        let Some(first) = values.first() else {
            continue;
        };
        if name.eq_ignore_ascii_case("objectSid") {
            if let Some(sid) = decode_sid(first) {
                attrs.set(name, sid);
                continue;
            }
        }
        attrs.set(name, AttributeValue::Binary(first.clone()));
    }

    attrs
}

/// Map a search entry to an [`ObjectRecord`]. Entries without the
/// identifier attribute are skipped.
///
/// Memberships are named through `group_names` (lowercase DN to group
/// identifier); a DN missing from it falls back to its CN.
pub(crate) fn entry_to_record(
    entry: SearchEntry,
    kind: ObjectKind,
    identifier_attribute: &str,
    group_names: &HashMap<String, String>,
) -> Option<ObjectRecord> {
    let attrs = entry_to_attribute_set(&entry);
    let identifier = attrs.get_string(identifier_attribute)?.to_string();

    let memberships: Vec<String> = member_of_dns(&entry)
        .filter_map(|dn| {
            group_names
                .get(&dn.to_lowercase())
                .cloned()
                .or_else(|| leading_rdn_value(dn))
        })
        .collect();

    let disabled = attrs
        .get_string("userAccountControl")
        .and_then(UserAccountControl::parse)
        .is_some_and(UserAccountControl::is_disabled);

    Some(
        ObjectRecord::builder(identifier)
            .path(entry.dn)
            .kind(kind)
            .memberships(memberships)
            .disabled(disabled)
            .attributes(attrs)
            .build(),
    )
}

fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Subtree | SearchScope::WholeDomain => Scope::Subtree,
        SearchScope::SingleLevel => Scope::OneLevel,
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> DirectoryResult<()> {
        let entry = self
            .lookup(
                &self.config.base_dn,
                Scope::Base,
                "(objectClass=*)",
                vec!["distinguishedName"],
                &self.config.base_dn,
                "test connection",
            )
            .await
            .map_err(as_query_failure)?;

        if entry.is_none() {
            return Err(DirectoryError::query_failed(format!(
                "base DN '{}' not found or not accessible",
                self.config.base_dn
            )));
        }

        info!("LDAP connection test successful");
        Ok(())
    }
}

#[async_trait]
impl QueryOp for LdapDirectory {
    #[instrument(skip(self, query), fields(kind = %query.kind, scope = %query.scope))]
    async fn query(&self, query: &DirectoryQuery) -> DirectoryResult<Vec<ObjectRecord>> {
        query
            .validate()
            .map_err(|e| DirectoryError::query_failed(e.to_string()))?;

        let base = match (query.scope, query.base.as_deref()) {
            (SearchScope::WholeDomain, _) | (_, None) => self.config.base_dn.as_str(),
            (_, Some(base)) => base,
        };

        let filter: Filter = match &query.filter {
            Some(f) => kind_filter(query.kind).and_with(f.clone()),
            None => kind_filter(query.kind),
        };
        let ldap_filter = filter_to_ldap(&filter);

        debug!(filter = %ldap_filter, base_dn = %base, "Searching LDAP");

        let entries = match self
            .paged_search(
                base,
                ldap_scope(query.scope),
                &ldap_filter,
                self.config.search_attributes(),
            )
            .await
        {
            Ok(entries) => entries,
            Err(failure) => {
                self.reset_connection().await;
                return Err(failure.into_query_failure());
            }
        };

        let group_names = self.resolve_group_names(&entries).await?;

        let total = entries.len();
        let mut records = Vec::with_capacity(total);
        for entry in entries {
            let dn = entry.dn.clone();
            match entry_to_record(
                entry,
                query.kind,
                &self.config.identifier_attribute,
                &group_names,
            ) {
                Some(record) => records.push(record),
                None => warn!(dn = %dn, "Skipping entry without identifier attribute"),
            }
        }

        {
            let mut object_dns = self.object_dns.write().await;
            for record in &records {
                object_dns.insert(
                    record.identifier().to_lowercase(),
                    record.distinguished_path().to_string(),
                );
            }
        }

        info!(
            total_found = total,
            returned = records.len(),
            "LDAP query completed"
        );

        Ok(records)
    }
}

#[async_trait]
impl MutationOp for LdapDirectory {
    #[instrument(skip(self))]
    async fn add_to_group(&self, target: &str, group: &str) -> DirectoryResult<()> {
        let member_dn = self.object_dn(target, "add_to_group").await?;
        let group_dn = self.group_dn(group, "add_to_group").await?;

        let mods = vec![Mod::Add("member".to_string(), HashSet::from([member_dn]))];
        self.modify(&group_dn, mods, target, "add_to_group").await?;

        info!(target, group, "Added group member");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_from_group(&self, target: &str, group: &str) -> DirectoryResult<()> {
        let member_dn = self.object_dn(target, "remove_from_group").await?;
        let group_dn = self.group_dn(group, "remove_from_group").await?;

        let mods = vec![Mod::Delete("member".to_string(), HashSet::from([member_dn]))];
        self.modify(&group_dn, mods, target, "remove_from_group")
            .await?;

        info!(target, group, "Removed group member");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_attribute(&self, target: &str, attribute: &str) -> DirectoryResult<()> {
        let dn = self.object_dn(target, "clear_attribute").await?;

        let mods = vec![Mod::Delete(attribute.to_string(), HashSet::new())];
        self.modify(&dn, mods, target, "clear_attribute").await?;

        info!(target, attribute, "Cleared attribute");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disable(&self, target: &str) -> DirectoryResult<()> {
        let dn = self.object_dn(target, "disable").await?;

        let entry = self
            .lookup(
                &dn,
                Scope::Base,
                "(objectClass=*)",
                vec!["userAccountControl"],
                target,
                "disable",
            )
            .await?
            .ok_or_else(|| DirectoryError::not_found(target))?;

        let current = entry
            .attrs
            .get("userAccountControl")
            .and_then(|values| values.first())
            .and_then(|value| UserAccountControl::parse(value))
            .unwrap_or_default();

        if current.is_disabled() {
            debug!(target, "Account already disabled");
            return Ok(());
        }

        let uac = current.disable();
        let mods = vec![Mod::Replace(
            "userAccountControl".to_string(),
            HashSet::from([u32::from(uac).to_string()]),
        )];
        self.modify(&dn, mods, target, "disable").await?;

        info!(target, "Account disabled");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, target: &str) -> DirectoryResult<()> {
        let dn = self.object_dn(target, "delete").await?;
        let mut ldap = self.get_connection().await?;

        debug!(dn = %dn, "Deleting LDAP entry");

        let result = match ldap.delete(&dn).await {
            Ok(result) => result,
            Err(e) => {
                self.reset_connection().await;
                return Err(map_ldap_error(e, target, "delete"));
            }
        };
        check_result_code(result.rc, &result.text, target, "delete")?;

        self.object_dns.write().await.remove(&target.to_lowercase());
        info!(dn = %dn, "LDAP entry deleted");
        Ok(())
    }
}

#[async_trait]
impl WellKnownResolver for LdapDirectory {
    #[instrument(skip(self))]
    async fn resolve_well_known(
        &self,
        principal: WellKnownPrincipal,
    ) -> DirectoryResult<Option<String>> {
        let domain_sid = self.domain_sid().await?;
        let sid = principal.sid_for_domain(&domain_sid);

        let filter = format!("(objectSid={sid})");
        let entry = self
            .lookup(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec![self.config.identifier_attribute.as_str()],
                &sid,
                "resolve well-known principal",
            )
            .await
            .map_err(as_query_failure)?;

        let identifier = entry.and_then(|e| attribute_value(&e, &self.config.identifier_attribute));

        debug!(?principal, sid = %sid, identifier = ?identifier, "Resolved well-known principal");
        Ok(identifier)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("display_name", &self.display_name)
            .field("config", &self.config)
            .finish()
    }
}
