//! Resource pool engine constants.

// ─── Conflict retry ───────────────────────────────────────────────────────

/// Attempts made by a compare-and-swap loop before giving up.
pub const CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Backoff before the second attempt, in milliseconds.
pub const CONFLICT_RETRY_INITIAL_BACKOFF_MS: u64 = 10;

/// Multiplier applied to the backoff after every failed attempt.
pub const CONFLICT_RETRY_FACTOR: u32 = 5;

/// Upper bound for a single backoff sleep, in milliseconds.
pub const CONFLICT_RETRY_MAX_BACKOFF_MS: u64 = 2_000;

/// Fraction of the backoff added as random jitter.
pub const CONFLICT_RETRY_JITTER: f64 = 0.1;

// ─── Controllers ──────────────────────────────────────────────────────────

/// Periodic resync interval for the pool controller, in seconds.
pub const POOL_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Periodic resync interval for the claim controller, in seconds.
pub const CLAIM_RECONCILE_INTERVAL_SECS: u64 = 15;

// ─── Annotations / labels ─────────────────────────────────────────────────

/// Setting this annotation to `"true"` on a claim releases it from its pool.
pub const RELEASE_ANNOTATION: &str = "poolrs.io/release";

/// Label set on projected ResourceQuotas, valued with the owning pool name.
pub const POOL_QUOTA_LABEL: &str = "poolrs.io/resourcepool";

/// Prefix of the projected ResourceQuota name; the pool name is appended.
pub const POOL_QUOTA_NAME_PREFIX: &str = "poolrs-pool-";
