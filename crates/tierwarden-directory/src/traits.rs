//! Directory capability traits
//!
//! A backend implements only the capabilities it supports. Reconciliation
//! needs [`QueryOp`] and [`MutationOp`]; exclusion seeding needs
//! [`WellKnownResolver`].

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::operation::DirectoryQuery;
use crate::record::ObjectRecord;
use crate::types::WellKnownPrincipal;

/// Base trait for all directory backends.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Get the display name for this directory instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the directory.
    ///
    /// Returns `Ok(())` if the directory is reachable with the configured
    /// credentials.
    async fn test_connection(&self) -> DirectoryResult<()>;
}

/// Capability for reading objects from the directory.
#[async_trait]
pub trait QueryOp: Directory {
    /// Run a query and return every matching object.
    ///
    /// All-or-nothing: on failure no records are returned. Each call takes a
    /// fresh snapshot, so re-running a query is always safe.
    async fn query(&self, query: &DirectoryQuery) -> DirectoryResult<Vec<ObjectRecord>>;
}

/// Capability for applying corrective actions.
///
/// Every verb is idempotent: adding an existing member, removing a
/// non-member, clearing an absent attribute, or disabling a disabled account
/// succeeds without change.
#[async_trait]
pub trait MutationOp: Directory {
    /// Add `target` to `group`.
    async fn add_to_group(&self, target: &str, group: &str) -> DirectoryResult<()>;

    /// Remove `target` from `group`.
    async fn remove_from_group(&self, target: &str, group: &str) -> DirectoryResult<()>;

    /// Remove every value of `attribute` from `target`.
    async fn clear_attribute(&self, target: &str, attribute: &str) -> DirectoryResult<()>;

    /// Disable the account.
    async fn disable(&self, target: &str) -> DirectoryResult<()>;

    /// Delete the object.
    async fn delete(&self, target: &str) -> DirectoryResult<()>;
}

/// Capability for resolving built-in principals by security identifier.
#[async_trait]
pub trait WellKnownResolver: Directory {
    /// Resolve a principal to its current identifier.
    ///
    /// Returns `Ok(None)` when the principal does not exist in this directory.
    async fn resolve_well_known(
        &self,
        principal: WellKnownPrincipal,
    ) -> DirectoryResult<Option<String>>;
}

/// A backend able to drive a full reconciliation run.
pub trait ReconcileDirectory: QueryOp + MutationOp + WellKnownResolver {}

impl<T> ReconcileDirectory for T where T: QueryOp + MutationOp + WellKnownResolver {}
