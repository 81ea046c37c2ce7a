use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

/// Loads `config/common.env`, the profile's env file and `.secrets.env`, in
/// that order. Later files override earlier ones; missing files are skipped.
pub fn load_environment() -> anyhow::Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> anyhow::Result<()> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .with_context(|| format!("Failed to load environment file {}", path))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://classroom.db?mode=rwc";

pub fn database_url() -> String {
    dotenvy::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_database_url_default() {
        temp_env::with_var_unset("DATABASE_URL", || {
            assert_eq!(database_url(), DEFAULT_DATABASE_URL);
        });
    }

    #[test]
    #[serial]
    fn test_database_url_from_env() {
        temp_env::with_var("DATABASE_URL", Some("sqlite::memory:"), || {
            assert_eq!(database_url(), "sqlite::memory:");
        });
        temp_env::with_var("DATABASE_URL", Some("  "), || {
            assert_eq!(database_url(), DEFAULT_DATABASE_URL);
        });
    }

    #[test]
    #[serial]
    fn test_missing_env_files_are_skipped() {
        temp_env::with_var("ROCKET_PROFILE", Some("production"), || {
            assert!(load_env_file("config/does-not-exist.env").is_ok());
        });
    }
}
