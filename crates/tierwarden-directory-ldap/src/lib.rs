//! # LDAP Directory
//!
//! LDAP / Active Directory backend for tierwarden reconciliation.
//!
//! ## Features
//!
//! - LDAP v3 with SSL/TLS and STARTTLS
//! - Paged searches mapped to `ObjectRecord`s
//! - Idempotent membership, attribute, disable and delete operations
//! - LDAP result codes translated into the directory error taxonomy
//! - Built-in principals resolved by SID, never by name
//!
//! ## Example
//!
//! ```ignore
//! use tierwarden_directory::prelude::*;
//! use tierwarden_directory_ldap::{LdapConfig, LdapDirectory};
//!
//! let config = LdapConfig::new(
//!     "dc01.corp.local",
//!     "DC=corp,DC=local",
//!     "svc-tierwarden@corp.local",
//! )
//! .with_password("secret")
//! .with_ssl();
//!
//! let directory = LdapDirectory::new(config)?;
//! directory.test_connection().await?;
//! ```

pub mod ad;
pub mod config;
pub mod connector;
pub mod filter;

pub use config::LdapConfig;
pub use connector::LdapDirectory;
