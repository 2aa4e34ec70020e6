//! Configuration file loading
//!
//! The file holds an optional `directory` section with LDAP connection
//! settings, next to the reconciliation sections (`search`, `exclusions`,
//! `rules`, `desired_state`, `policy`, `execution`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use tierwarden_directory_ldap::LdapConfig;
use tierwarden_reconcile::{ReconcileConfig, ReconcileError};

use crate::error::{CliError, CliResult};

/// Overrides the LDAP bind password.
pub const ENV_BIND_PASSWORD: &str = "TIERWARDEN_BIND_PASSWORD";

/// Overrides the LDAP host.
pub const ENV_LDAP_HOST: &str = "TIERWARDEN_LDAP_HOST";

/// Complete contents of a tierwarden configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LDAP connection; not needed when running against a snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<LdapConfig>,

    #[serde(flatten)]
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    /// Load the file and apply environment overrides.
    pub fn load(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::from(ReconcileError::config_with_source(
                format!("cannot read {}", path.display()),
                e,
            ))
        })?;
        let mut config = Self::from_yaml_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> CliResult<Self> {
        serde_yaml::from_str(contents).map_err(|e| {
            CliError::from(ReconcileError::config_with_source(
                "invalid configuration",
                e,
            ))
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(directory) = self.directory.as_mut() else {
            return;
        };
        if let Some(password) = lookup(ENV_BIND_PASSWORD) {
            directory.bind_password = Some(password);
        }
        if let Some(host) = lookup(ENV_LDAP_HOST) {
            directory.host = host;
        }
    }

    /// Validate every section without contacting the directory.
    ///
    /// With an explicit `directory.attributes` list, every attribute the
    /// rules read or the desired state clears must be fetched.
    pub fn validate(&self) -> CliResult<()> {
        if let Some(directory) = &self.directory {
            directory.validate()?;
        }
        self.reconcile.validate()?;

        if let Some(directory) = &self.directory {
            let missing: Vec<&str> = self
                .reconcile
                .referenced_attributes()
                .into_iter()
                .filter(|attribute| !directory.fetches(attribute))
                .collect();
            if !missing.is_empty() {
                return Err(CliError::Validation(format!(
                    "directory.attributes does not include {}, used by rules or clear_attributes",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// LDAP settings, required when no snapshot is given.
    pub fn ldap(&self) -> CliResult<&LdapConfig> {
        self.directory.as_ref().ok_or_else(|| {
            CliError::Config(
                "no `directory` section; add LDAP settings or pass --snapshot".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const CONFIG: &str = r#"
directory:
  host: dc01.corp.local
  base_dn: DC=corp,DC=local
  bind_dn: CN=svc-tierwarden,OU=Service,DC=corp,DC=local
search:
  base: OU=Admin,DC=corp,DC=local
rules:
  - name: tier0-suffix
    tag: tier0
    when:
      type: name_suffix
      suffix: _T0
desired_state:
  groups:
    tier0: [Tier0 Admins]
"#;

    #[test]
    fn test_load_directory_and_reconcile_sections() {
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        config.validate().unwrap();

        let ldap = config.ldap().unwrap();
        assert_eq!(ldap.host, "dc01.corp.local");
        assert_eq!(ldap.port, 389);
        assert!(ldap.bind_password.is_none());

        assert_eq!(config.reconcile.rules.len(), 1);
        assert_eq!(
            config.reconcile.search.base.as_deref(),
            Some("OU=Admin,DC=corp,DC=local")
        );
        assert!(config.reconcile.policy.dry_run);
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = AppConfig::from_yaml_str(CONFIG).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_BIND_PASSWORD, "s3cret"),
            (ENV_LDAP_HOST, "dc02.corp.local"),
        ]
        .into();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        let ldap = config.ldap().unwrap();
        assert_eq!(ldap.bind_password.as_deref(), Some("s3cret"));
        assert_eq!(ldap.host, "dc02.corp.local");
    }

    #[test]
    fn test_missing_directory_section() {
        let config = AppConfig::from_yaml_str("rules: []").unwrap();
        config.validate().unwrap();
        let err = config.ldap().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_invalid_search_base_is_validation_error() {
        let mut config = AppConfig::from_yaml_str(CONFIG).unwrap();
        config.reconcile.search.base = Some("not a dn".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CliError::Validation(_)));
    }

    #[test]
    fn test_referenced_attribute_must_be_fetched() {
        let yaml = r#"
directory:
  host: dc01.corp.local
  base_dn: DC=corp,DC=local
  bind_dn: CN=svc-tierwarden,OU=Service,DC=corp,DC=local
  attributes: [employeeType]
rules:
  - name: tier1-attr
    tag: tier1
    when:
      type: attribute_equals
      attribute: employeeType
      value: T1
  - name: stale
    tag: stale
    when:
      type: inactive_for
      attribute: lastLogonTimestamp
      days: 90
"#;
        let mut config = AppConfig::from_yaml_str(yaml).unwrap();
        match config.validate().unwrap_err() {
            CliError::Validation(message) => {
                assert!(message.contains("lastLogonTimestamp"), "{message}");
                assert!(!message.contains("employeeType"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        if let Some(directory) = config.directory.as_mut() {
            directory.attributes.push("lastLogonTimestamp".to_string());
        }
        config.validate().unwrap();

        config.directory = None;
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.reconcile.rules[0].name, "tier0-suffix");

        let err = AppConfig::load(Path::new("/nonexistent/tierwarden.yaml")).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = AppConfig::from_yaml_str("rules: [").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
