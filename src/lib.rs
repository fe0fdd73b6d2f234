//! Windowed deduplication filter with in-memory or Redis backed state.
//!
//! A filter receives a stream of records and re-emits only those whose
//! fingerprint has not been seen among the most recent `lookback` unique
//! fingerprints.
//!
//! HowTo:
//!    * Fingerprint: the configured `property` template is resolved against the
//!      record payload (a blank property means the whole payload serialized
//!      as JSON). Results longer than 10 characters are replaced by their
//!      CRC-32 in decimal.
//!    * Membership: fingerprints live in an ordered set keyed `uniq{id}` in the
//!      backing store. Add-if-absent tells whether the record is unique.
//!
//! Insertion:
//!     * A unique fingerprint is added and the record is re-emitted.
//!     * Right after, if the set holds exactly `lookback` entries, the first
//!       one in store order is evicted.
//! Query:
//!     * A fingerprint already in the set is a duplicate and is dropped.
//! Expiration:
//!     * There is no time based expiry, only the lookback window.
//!     * `lookback = 0` keeps every fingerprint forever.
//!
//! Obvious problems:
//!     * CRC-32 collisions make distinct long values look like duplicates.
//!     * With every entry ranked 0 eviction order is the store's tie-break
//!       (lexicographic for Redis), not insertion age. Use
//!       `EvictionPolicy::InsertionOrder` for strict FIFO.
//!     * Insert and evict are separate commands, concurrent writers can push
//!       the window past `lookback` for a moment.

#[cfg(feature = "server")]
pub mod api;
#[cfg_attr(not(any(feature = "server", feature = "redis")), allow(dead_code))]
mod env;
mod error;
mod filter;
mod fingerprint;
mod health;
#[cfg(feature = "redis")]
mod redis_storage;
mod storage;
mod template;
#[cfg(feature = "server")]
pub mod types;
mod window;

pub use error::{Result, UniqueError};
pub use filter::{
    DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS, DEFAULT_LOOKBACK, DEFAULT_PROPERTY,
    Decision, FilterConfig, FilterConfigBuilder, FilterConfigBuilderError,
    Record, UniqueFilter,
};
pub use fingerprint::{COMPACT_THRESHOLD, compact, fingerprint};
pub use health::{HealthTracker, RECENT_ERROR_WINDOW};
#[cfg(feature = "redis")]
pub use redis_storage::{
    RedisConfig, RedisConfigBuilder, RedisConfigBuilderError, RedisStore,
};
pub use storage::{
    DEFAULT_NAMESPACE, InMemoryStore, MembershipStore, StoreKind, open_store,
};
pub use template::{PathResolver, TemplateResolver};
#[cfg(feature = "server")]
pub use types::{
    AppState, ServerConfig, ServerConfigBuilder, ServerConfigBuilderError,
};
pub use window::{EvictionPolicy, Snapshot, UniquenessWindow};
