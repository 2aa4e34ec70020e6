//! LDAP directory configuration
//!
//! Connection and search settings for an Active Directory domain controller.

use serde::{Deserialize, Serialize};
use tierwarden_directory::operation::validate_dn;
use tierwarden_directory::{DirectoryError, DirectoryResult};

/// Configuration for the LDAP directory backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Default naming context (e.g., "DC=corp,DC=local").
    pub base_dn: String,

    /// Bind DN or UPN used to authenticate.
    pub bind_dn: String,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Page size for search operations.
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// Attribute that uniquely names an object.
    #[serde(default = "default_identifier_attribute")]
    pub identifier_attribute: String,

    /// Attributes to fetch in addition to the ones reconciliation always
    /// needs. Empty fetches every user attribute.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("page_size", &self.page_size)
            .field("identifier_attribute", &self.identifier_attribute)
            .field("attributes", &self.attributes)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_page_size() -> i32 {
    500
}

fn default_identifier_attribute() -> String {
    "sAMAccountName".to_string()
}

/// Attributes every query fetches regardless of configuration.
pub(crate) const REQUIRED_ATTRIBUTES: &[&str] = &[
    "distinguishedName",
    "memberOf",
    "userAccountControl",
    "objectSid",
];

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            connect_timeout_secs: default_connect_timeout(),
            page_size: default_page_size(),
            identifier_attribute: default_identifier_attribute(),
            attributes: Vec::new(),
        }
    }

    /// Set bind password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Attribute list to request in searches.
    pub(crate) fn search_attributes(&self) -> Vec<String> {
        if self.attributes.is_empty() {
            return vec!["*".to_string()];
        }
        let mut attrs: Vec<String> = Vec::with_capacity(self.attributes.len() + 5);
        attrs.push(self.identifier_attribute.clone());
        attrs.extend(REQUIRED_ATTRIBUTES.iter().map(|a| (*a).to_string()));
        for extra in &self.attributes {
            if !attrs.iter().any(|a| a.eq_ignore_ascii_case(extra)) {
                attrs.push(extra.clone());
            }
        }
        attrs
    }

    /// Whether searches return `attribute` (case-insensitive).
    #[must_use]
    pub fn fetches(&self, attribute: &str) -> bool {
        self.attributes.is_empty()
            || self
                .search_attributes()
                .iter()
                .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.trim().is_empty() {
            return Err(DirectoryError::validation("directory host is required"));
        }

        validate_dn(&self.base_dn)?;

        if self.bind_dn.trim().is_empty() {
            return Err(DirectoryError::validation("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::validation(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.page_size <= 0 {
            return Err(DirectoryError::validation("page_size must be positive"));
        }

        if self.identifier_attribute.trim().is_empty() {
            return Err(DirectoryError::validation(
                "identifier_attribute must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LdapConfig {
        LdapConfig::new("dc01.corp.local", "DC=corp,DC=local", "svc-tierwarden@corp.local")
            .with_password("hunter2")
    }

    #[test]
    fn test_defaults_from_yaml() {
        let yaml = r#"
host: dc01.corp.local
base_dn: DC=corp,DC=local
bind_dn: svc-tierwarden@corp.local
"#;
        let config: LdapConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 389);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.identifier_attribute, "sAMAccountName");
        assert!(config.bind_password.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_url() {
        assert_eq!(config().url(), "ldap://dc01.corp.local:389");
        assert_eq!(config().with_ssl().url(), "ldaps://dc01.corp.local:636");
    }

    #[test]
    fn test_validation_failures() {
        let mut c = config();
        c.host = String::new();
        assert!(c.validate().is_err());

        let mut c = config();
        c.base_dn = "corp.local".to_string();
        assert!(c.validate().is_err());

        let mut c = config().with_ssl();
        c.use_starttls = true;
        assert!(c.validate().is_err());

        let mut c = config();
        c.page_size = 0;
        let err = c.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_search_attributes() {
        let c = config();
        assert_eq!(c.search_attributes(), vec!["*".to_string()]);

        let mut c = config();
        c.attributes = vec!["employeeType".to_string(), "memberof".to_string()];
        let attrs = c.search_attributes();
        assert_eq!(attrs[0], "sAMAccountName");
        assert!(attrs.contains(&"employeeType".to_string()));
        assert_eq!(
            attrs
                .iter()
                .filter(|a| a.eq_ignore_ascii_case("memberOf"))
                .count(),
            1
        );
    }

    #[test]
    fn test_fetches() {
        let mut c = config();
        assert!(c.fetches("lastLogonTimestamp"));

        c.attributes = vec!["employeeType".to_string()];
        assert!(c.fetches("EMPLOYEETYPE"));
        assert!(c.fetches("userAccountControl"));
        assert!(c.fetches("sAMAccountName"));
        assert!(!c.fetches("lastLogonTimestamp"));
    }
}
