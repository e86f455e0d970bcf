//! Access and lifecycle configuration.

use std::env;
use std::str::FromStr;

use docket_core::repository::Pagination;
use tracing::warn;

/// What happens to an order's grants when it is archived and later
/// restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveGrantPolicy {
    /// Grants travel inside the snapshot and are re-created on restore.
    #[default]
    Preserve,
    /// Grants stay in the snapshot only; a restored order starts with
    /// owner-only access.
    Discard,
}

impl FromStr for ArchiveGrantPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Ok(Self::Preserve),
            "discard" => Ok(Self::Discard),
            other => Err(format!("unknown archive grant policy: {other}")),
        }
    }
}

/// Configuration for the permission and lifecycle services.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Window used by near-expiration queries when the caller passes none
    /// (default: 7 days).
    pub near_expiration_window_days: u32,
    /// Upper bound accepted for a near-expiration window (default: 365).
    pub max_near_expiration_window_days: u32,
    /// Page size used when the caller does not ask for one (default: 50).
    pub default_page_size: u64,
    /// Largest page any listing returns (default: 100).
    pub max_page_size: u64,
    pub archive_grant_policy: ArchiveGrantPolicy,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            near_expiration_window_days: 7,
            max_near_expiration_window_days: 365,
            default_page_size: 50,
            max_page_size: 100,
            archive_grant_policy: ArchiveGrantPolicy::Preserve,
        }
    }
}

impl AccessConfig {
    /// Load configuration from environment variables, falling back to
    /// [`AccessConfig::default`] for anything unset or unparseable.
    ///
    /// Environment variables:
    /// - DOCKET_NEAR_EXPIRATION_DAYS
    /// - DOCKET_MAX_NEAR_EXPIRATION_DAYS
    /// - DOCKET_DEFAULT_PAGE_SIZE
    /// - DOCKET_MAX_PAGE_SIZE
    /// - DOCKET_ARCHIVE_GRANT_POLICY (`preserve` or `discard`)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            near_expiration_window_days: env_or(
                "DOCKET_NEAR_EXPIRATION_DAYS",
                defaults.near_expiration_window_days,
            ),
            max_near_expiration_window_days: env_or(
                "DOCKET_MAX_NEAR_EXPIRATION_DAYS",
                defaults.max_near_expiration_window_days,
            ),
            default_page_size: env_or("DOCKET_DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: env_or("DOCKET_MAX_PAGE_SIZE", defaults.max_page_size),
            archive_grant_policy: env_or(
                "DOCKET_ARCHIVE_GRANT_POLICY",
                defaults.archive_grant_policy,
            ),
        }
    }

    /// Clamp a requested page to the configured limits. A zero limit means
    /// "use the default".
    pub fn page(&self, requested: Pagination) -> Pagination {
        let limit = match requested.limit {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        };
        Pagination {
            offset: requested.offset,
            limit,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|err| {
            warn!(key, value = %raw, error = %err, "Ignoring invalid configuration value");
            default
        }),
        Err(_) => default,
    }
}
