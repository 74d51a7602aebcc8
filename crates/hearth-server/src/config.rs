use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use hearth_ledger::SplitPolicy;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Runtime settings, read from `HEARTH_*` environment variables.
#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    /// Base URL clients use to reach this server; object URLs are built from it.
    pub public_url: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub split_policy: SplitPolicy,
    pub invite_attempts: u32,
    pub janitor_interval: Duration,
    pub janitor_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("HEARTH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HEARTH_JWT_SECRET is unset or still a placeholder");
        }

        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let split_policy = or("HEARTH_SPLIT_POLICY", "remainder")
            .parse::<SplitPolicy>()
            .map_err(anyhow::Error::msg)
            .context("HEARTH_SPLIT_POLICY")?;

        let invite_attempts: u32 = parse(&or("HEARTH_INVITE_ATTEMPTS", "5"), "HEARTH_INVITE_ATTEMPTS")?;
        if invite_attempts == 0 {
            bail!("HEARTH_INVITE_ATTEMPTS must be at least 1");
        }

        let janitor_secs: u64 = parse(
            &or("HEARTH_JANITOR_INTERVAL_SECS", "3600"),
            "HEARTH_JANITOR_INTERVAL_SECS",
        )?;
        if janitor_secs == 0 {
            bail!("HEARTH_JANITOR_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            host: or("HEARTH_HOST", "0.0.0.0"),
            port: parse(&or("HEARTH_PORT", "3000"), "HEARTH_PORT")?,
            db_path: or("HEARTH_DB_PATH", "hearth.db").into(),
            storage_dir: or("HEARTH_STORAGE_DIR", "./storage").into(),
            public_url: or("HEARTH_PUBLIC_URL", "http://localhost:3000"),
            jwt_secret,
            token_ttl_days: parse(&or("HEARTH_TOKEN_TTL_DAYS", "30"), "HEARTH_TOKEN_TTL_DAYS")?,
            split_policy,
            invite_attempts,
            janitor_interval: Duration::from_secs(janitor_secs),
            janitor_grace: Duration::from_secs(parse(
                &or("HEARTH_JANITOR_GRACE_SECS", "3600"),
                "HEARTH_JANITOR_GRACE_SECS",
            )?),
        })
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{} has an invalid value '{}'", key, value))
}
