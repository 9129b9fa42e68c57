//! Engine configuration loading and representation.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::store::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// No configuration may accept a rejection reason shorter than this.
pub const REJECTION_REASON_FLOOR: usize = 10;

/// Runtime limits and timeouts for the request engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on any single storage call.
    #[serde(with = "millis")]
    pub storage_timeout: Duration,
    /// Maximum number of rows an audit export may produce.
    pub audit_export_limit: usize,
    /// Raised to [`REJECTION_REASON_FLOOR`] if set lower.
    pub rejection_reason_min: usize,
    pub rejection_reason_max: usize,
    pub title_max: usize,
    pub description_max: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_millis(2000),
            audit_export_limit: 10_000,
            rejection_reason_min: REJECTION_REASON_FLOOR,
            rejection_reason_max: 500,
            title_max: 200,
            description_max: 5_000,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load from `CHANGEFLOW_*` environment variables, defaulting unset ones.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            storage_timeout: Duration::from_millis(read(
                &lookup,
                "CHANGEFLOW_STORAGE_TIMEOUT_MS",
                defaults.storage_timeout.as_millis() as u64,
            )?),
            audit_export_limit: read(
                &lookup,
                "CHANGEFLOW_AUDIT_EXPORT_LIMIT",
                defaults.audit_export_limit,
            )?,
            rejection_reason_min: read(
                &lookup,
                "CHANGEFLOW_REJECTION_REASON_MIN",
                defaults.rejection_reason_min,
            )?,
            rejection_reason_max: read(
                &lookup,
                "CHANGEFLOW_REJECTION_REASON_MAX",
                defaults.rejection_reason_max,
            )?,
            title_max: read(&lookup, "CHANGEFLOW_TITLE_MAX", defaults.title_max)?,
            description_max: read(&lookup, "CHANGEFLOW_DESCRIPTION_MAX", defaults.description_max)?,
            default_page_size: read(
                &lookup,
                "CHANGEFLOW_DEFAULT_PAGE_SIZE",
                defaults.default_page_size,
            )?,
            max_page_size: read(&lookup, "CHANGEFLOW_MAX_PAGE_SIZE", defaults.max_page_size)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Effective minimum rejection reason length, never below the floor.
    pub fn rejection_reason_floor(&self) -> usize {
        self.rejection_reason_min.max(REJECTION_REASON_FLOOR)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage_timeout.is_zero() {
            anyhow::bail!("CHANGEFLOW_STORAGE_TIMEOUT_MS must be greater than zero");
        }
        if self.rejection_reason_min < REJECTION_REASON_FLOOR {
            anyhow::bail!(
                "CHANGEFLOW_REJECTION_REASON_MIN must be at least {REJECTION_REASON_FLOOR} (got {})",
                self.rejection_reason_min
            );
        }
        if self.rejection_reason_min > self.rejection_reason_max {
            anyhow::bail!(
                "rejection reason bounds are inverted ({} > {})",
                self.rejection_reason_min,
                self.rejection_reason_max
            );
        }
        if self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "default page size {} exceeds max page size {}",
                self.default_page_size,
                self.max_page_size
            );
        }
        Ok(())
    }
}

fn read<F, V>(lookup: &F, key: &str, default: V) -> anyhow::Result<V>
where
    F: Fn(&str) -> Option<String>,
    V: core::str::FromStr + core::fmt::Debug,
    V::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<V>()
            .with_context(|| format!("invalid value for {key}: '{raw}'")),
        None => {
            tracing::debug!(key, ?default, "config key not set; using default");
            Ok(default)
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
