//! Cache timeout configuration.
//!
//! Implementations stamp every [`Entry`](crate::Entry) and
//! [`InoAttr`](crate::InoAttr) they return with these values, which tell the
//! kernel how long it may serve the result without asking again.

use std::time::Duration;

/// Default attribute cache validity.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Default name (dentry) cache validity.
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(1);

/// Kernel cache timeouts handed out with entries and attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Time-to-live for cached attributes.
    pub attr_ttl: Duration,
    /// Time-to-live for cached name lookups.
    pub entry_ttl: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            entry_ttl: DEFAULT_ENTRY_TTL,
        }
    }
}

impl CacheTtl {
    /// Disables kernel caching entirely.
    ///
    /// Useful for filesystems whose backing store changes underneath them.
    pub fn none() -> Self {
        Self {
            attr_ttl: Duration::ZERO,
            entry_ttl: Duration::ZERO,
        }
    }

    /// Sets the attribute TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the entry TTL.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}
