//! CLI command implementations

pub mod plan;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tracing::info;

use tierwarden_directory::{Directory, InMemoryDirectory, ReconcileDirectory};
use tierwarden_directory_ldap::LdapDirectory;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

/// Configuration file argument shared by every command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to the configuration file
    #[arg(
        short = 'c',
        long = "config",
        env = "TIERWARDEN_CONFIG",
        default_value = "tierwarden.yaml"
    )]
    pub config: PathBuf,
}

impl ConfigArgs {
    /// Load and validate the configuration file.
    pub fn load(&self) -> CliResult<AppConfig> {
        let config = AppConfig::load(&self.config)?;
        config.validate()?;
        Ok(config)
    }
}

/// Open the directory a command runs against: the snapshot file when one
/// is given, the configured LDAP server otherwise.
pub async fn open_directory(
    config: &AppConfig,
    snapshot: Option<&Path>,
) -> CliResult<Arc<dyn ReconcileDirectory>> {
    if let Some(path) = snapshot {
        let directory = InMemoryDirectory::from_file(path)?;
        info!(snapshot = %path.display(), "Using directory snapshot");
        return Ok(Arc::new(directory));
    }

    let directory = LdapDirectory::new(config.ldap()?.clone())?;
    directory
        .test_connection()
        .await
        .map_err(|e| CliError::Connection(e.to_string()))?;
    info!(directory = directory.display_name(), "Connected to directory");
    Ok(Arc::new(directory))
}
