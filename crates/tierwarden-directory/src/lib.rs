//! # Directory abstraction
//!
//! Backend-neutral types and capability traits for reading and correcting
//! directory objects (users, groups, computers).
//!
//! ## Architecture
//!
//! - [`Directory`] - Base trait every backend implements
//! - [`QueryOp`] - All-or-nothing object queries
//! - [`MutationOp`] - Idempotent corrective verbs
//! - [`WellKnownResolver`] - Resolve built-in principals by SID
//!
//! Backends translate their own failures into [`DirectoryError`], so callers
//! never see provider-specific error types.
//!
//! ## Example
//!
//! ```ignore
//! use tierwarden_directory::prelude::*;
//!
//! let directory = InMemoryDirectory::from_file("corp.yaml")?;
//! let query = DirectoryQuery::new(ObjectKind::User)
//!     .with_base("OU=Admin,DC=corp,DC=local")
//!     .with_filter(Filter::present("adminCount"));
//!
//! for record in directory.query(&query).await? {
//!     println!("{} {:?}", record.identifier(), record.memberships());
//! }
//! ```

pub mod error;
pub mod memory;
pub mod operation;
pub mod record;
pub mod resilience;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{DirectoryError, DirectoryResult, ErrorKind};
pub use memory::{DirectorySnapshot, InMemoryDirectory, RecordedCall, SnapshotObject};
pub use operation::{AttributeSet, AttributeValue, DirectoryQuery, Filter};
pub use record::{ObjectRecord, ObjectRecordBuilder};
pub use resilience::{RetryConfig, RetryExecutor};
pub use traits::{Directory, MutationOp, QueryOp, ReconcileDirectory, WellKnownResolver};
pub use types::{ObjectKind, SearchScope, WellKnownPrincipal, WellKnownSid};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{DirectoryError, DirectoryResult, ErrorKind};
    pub use crate::memory::InMemoryDirectory;
    pub use crate::operation::{AttributeSet, AttributeValue, DirectoryQuery, Filter};
    pub use crate::record::ObjectRecord;
    pub use crate::resilience::{RetryConfig, RetryExecutor};
    pub use crate::traits::{Directory, MutationOp, QueryOp, ReconcileDirectory, WellKnownResolver};
    pub use crate::types::{ObjectKind, SearchScope, WellKnownPrincipal};
}
