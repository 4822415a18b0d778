use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use grad_types::countdown::parse_target;

/// Placeholder JWT secret used when none is configured.
pub const PLACEHOLDER_SECRET: &str = "dev-secret-change-me";

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub countdown_start: DateTime<Utc>,
    pub countdown_target: DateTime<Utc>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, falling back to defaults for
    /// unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("GRAD_HOST", "0.0.0.0");
        let port: u16 = var("GRAD_PORT", "3000")
            .parse()
            .context("GRAD_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("GRAD_HOST '{}' is not a valid address", host))?;

        Ok(Self {
            addr,
            db_path: var("GRAD_DB_PATH", "graduation.db").into(),
            jwt_secret: var("GRAD_JWT_SECRET", PLACEHOLDER_SECRET),
            upload_dir: var("GRAD_UPLOAD_DIR", "./uploads").into(),
            countdown_start: date(
                &var("GRAD_COUNTDOWN_START", "2024-01-01T00:00:00"),
                "GRAD_COUNTDOWN_START",
            )?,
            countdown_target: date(
                &var("GRAD_TARGET_DATE", "2025-07-15T09:00:00"),
                "GRAD_TARGET_DATE",
            )?,
        })
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret.is_empty() || self.jwt_secret == PLACEHOLDER_SECRET
    }
}

fn date(value: &str, key: &str) -> Result<DateTime<Utc>> {
    parse_target(value).with_context(|| format!("{} '{}' is not a valid date", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr.to_string(), "0.0.0.0:3000");
        assert_eq!(cfg.db_path, PathBuf::from("graduation.db"));
        assert_eq!(cfg.upload_dir, PathBuf::from("./uploads"));
        assert!(cfg.uses_placeholder_secret());
        assert_eq!(cfg.countdown_target.to_rfc3339(), "2025-07-15T09:00:00+00:00");
        assert!(cfg.countdown_start < cfg.countdown_target);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("GRAD_HOST", "127.0.0.1"),
            ("GRAD_PORT", "8080"),
            ("GRAD_JWT_SECRET", "s3cret"),
            ("GRAD_TARGET_DATE", "2030-06-01"),
        ])
        .unwrap();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:8080");
        assert!(!cfg.uses_placeholder_secret());
        assert_eq!(cfg.countdown_target.to_rfc3339(), "2030-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config(&[("GRAD_PORT", "http")]).err().unwrap();
        assert!(err.to_string().contains("GRAD_PORT"));

        let err = config(&[("GRAD_TARGET_DATE", "someday")]).err().unwrap();
        assert!(err.to_string().contains("GRAD_TARGET_DATE"));
    }
}
