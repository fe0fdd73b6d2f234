use crate::error::{Result, UniqueError};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub const DEFAULT_NAMESPACE: &str = "huginn";

/// Ordered-set capability the uniqueness window is built on.
///
/// Members of a key are ordered by ascending score, ties broken by the
/// byte order of the member string. Implementations namespace every key
/// they are handed so unrelated data in the same service is never touched.
pub trait MembershipStore: Send + Sync {
    /// Adds `member` with `score` unless it is already present.
    /// Returns true when the member was added.
    fn add_if_absent(&self, key: &str, score: i64, member: &str) -> Result<bool>;
    /// Counts members whose score lies within `[min, max]`
    fn count_in_range(&self, key: &str, min: i64, max: i64) -> Result<usize>;
    /// Members between ranks `start` and `stop` inclusive.
    /// Negative ranks count from the end, `-1` being the last member.
    fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>>;
    /// Removes the given members, returning how many were present
    fn remove(&self, key: &str, members: &[String]) -> Result<usize>;
    /// Drops the key together with all of its members
    fn delete_key(&self, key: &str) -> Result<()>;
    /// Atomically increments and returns the counter stored at `key`
    fn next_sequence(&self, key: &str) -> Result<i64>;
}

/// Resolves a Redis style `[start, stop]` rank range against `len` members.
pub(crate) fn normalize_rank_range(
    len: usize,
    start: isize,
    stop: isize,
) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as isize;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[derive(Default)]
struct SortedSet {
    ordered: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

#[derive(Default)]
struct Keyspace {
    sets: HashMap<String, SortedSet>,
    counters: HashMap<String, i64>,
}

/// Process-local ordered-set store.
///
/// Each call takes the lock once, so every operation is atomic with
/// respect to concurrent callers, same as a single Redis command.
pub struct InMemoryStore {
    keyspace: Mutex<Keyspace>,
    namespace: String,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl InMemoryStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            namespace: namespace.to_string(),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Keyspace>> {
        self.keyspace
            .lock()
            .map_err(|e| UniqueError::Storage(format!("Store lock error: {e}")))
    }

    /// Number of live keys, including sequence counters
    pub fn key_count(&self) -> Result<usize> {
        let keyspace = self.lock()?;
        Ok(keyspace.sets.len() + keyspace.counters.len())
    }
}

impl MembershipStore for InMemoryStore {
    fn add_if_absent(&self, key: &str, score: i64, member: &str) -> Result<bool> {
        let mut keyspace = self.lock()?;
        let set = keyspace.sets.entry(self.namespaced(key)).or_default();
        if set.scores.contains_key(member) {
            return Ok(false);
        }
        set.scores.insert(member.to_string(), score);
        set.ordered.insert((score, member.to_string()));
        Ok(true)
    }

    fn count_in_range(&self, key: &str, min: i64, max: i64) -> Result<usize> {
        let keyspace = self.lock()?;
        Ok(keyspace
            .sets
            .get(&self.namespaced(key))
            .map(|set| {
                set.ordered
                    .range((min, String::new())..)
                    .take_while(|(score, _)| *score <= max)
                    .count()
            })
            .unwrap_or(0))
    }

    fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>> {
        let keyspace = self.lock()?;
        let Some(set) = keyspace.sets.get(&self.namespaced(key)) else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) =
            normalize_rank_range(set.ordered.len(), start, stop)
        else {
            return Ok(Vec::new());
        };
        Ok(set
            .ordered
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(_, member)| member.clone())
            .collect())
    }

    fn remove(&self, key: &str, members: &[String]) -> Result<usize> {
        let mut keyspace = self.lock()?;
        let namespaced = self.namespaced(key);
        let Some(set) = keyspace.sets.get_mut(&namespaced) else {
            return Ok(0);
        };

        let mut removed = 0;
        for member in members {
            if let Some(score) = set.scores.remove(member) {
                set.ordered.remove(&(score, member.clone()));
                removed += 1;
            }
        }

        // Redis drops a sorted set once its last member is gone
        if set.scores.is_empty() {
            keyspace.sets.remove(&namespaced);
        }
        Ok(removed)
    }

    fn delete_key(&self, key: &str) -> Result<()> {
        let mut keyspace = self.lock()?;
        let namespaced = self.namespaced(key);
        keyspace.sets.remove(&namespaced);
        keyspace.counters.remove(&namespaced);
        Ok(())
    }

    fn next_sequence(&self, key: &str) -> Result<i64> {
        let mut keyspace = self.lock()?;
        let counter = keyspace.counters.entry(self.namespaced(key)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

/// Which backing store a host should open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Memory,
    Redis,
}

impl FromStr for StoreKind {
    type Err = UniqueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            other => Err(UniqueError::InvalidConfig(format!(
                "Unknown store kind '{other}', expected 'memory' or 'redis'"
            ))),
        }
    }
}

/// Opens the requested store. Redis connection settings come from the
/// `UNIQUE_REDIS_*` environment variables.
pub fn open_store(kind: StoreKind) -> Result<Arc<dyn MembershipStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(InMemoryStore::default())),
        #[cfg(feature = "redis")]
        StoreKind::Redis => {
            let config = crate::redis_storage::RedisConfig::from_env()?;
            Ok(Arc::new(crate::redis_storage::RedisStore::new(&config)?))
        }
        #[cfg(not(feature = "redis"))]
        StoreKind::Redis => Err(UniqueError::InvalidConfig(
            "Redis store requested but the crate was built without the `redis` feature"
                .into(),
        )),
    }
}
