use serde_json::{Value, json};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use unique_filter_rs::{
    FilterConfigBuilder, InMemoryStore, MembershipStore, Record, Result,
    UniqueError, UniqueFilter,
};

/// Store that fails every call, standing in for an unreachable backend
#[allow(dead_code)]
pub struct UnreachableStore;

#[allow(dead_code)]
impl UnreachableStore {
    fn refused<T>() -> Result<T> {
        Err(UniqueError::Storage("Connection refused".to_string()))
    }
}

impl MembershipStore for UnreachableStore {
    fn add_if_absent(&self, _: &str, _: i64, _: &str) -> Result<bool> {
        Self::refused()
    }
    fn count_in_range(&self, _: &str, _: i64, _: i64) -> Result<usize> {
        Self::refused()
    }
    fn range_by_rank(&self, _: &str, _: isize, _: isize) -> Result<Vec<String>> {
        Self::refused()
    }
    fn remove(&self, _: &str, _: &[String]) -> Result<usize> {
        Self::refused()
    }
    fn delete_key(&self, _: &str) -> Result<()> {
        Self::refused()
    }
    fn next_sequence(&self, _: &str) -> Result<i64> {
        Self::refused()
    }
}

/// In-memory store whose inserts stall, standing in for a slow backend
#[allow(dead_code)]
pub struct SlowStore {
    pub inner: InMemoryStore,
    pub delay: Duration,
}

#[allow(dead_code)]
impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryStore::default(),
            delay,
        }
    }
}

impl MembershipStore for SlowStore {
    fn add_if_absent(&self, key: &str, score: i64, member: &str) -> Result<bool> {
        thread::sleep(self.delay);
        self.inner.add_if_absent(key, score, member)
    }
    fn count_in_range(&self, key: &str, min: i64, max: i64) -> Result<usize> {
        self.inner.count_in_range(key, min, max)
    }
    fn range_by_rank(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.inner.range_by_rank(key, start, stop)
    }
    fn remove(&self, key: &str, members: &[String]) -> Result<usize> {
        self.inner.remove(key, members)
    }
    fn delete_key(&self, key: &str) -> Result<()> {
        self.inner.delete_key(key)
    }
    fn next_sequence(&self, key: &str) -> Result<i64> {
        self.inner.next_sequence(key)
    }
}

/// Filter over a fresh in-memory store with the given property and lookback
#[allow(dead_code)]
pub fn memory_filter(property: &str, lookback: usize) -> UniqueFilter {
    let config = FilterConfigBuilder::default()
        .property(property)
        .lookback(lookback)
        .build()
        .expect("Failed to build test config");
    UniqueFilter::new("test", config, Arc::new(InMemoryStore::default()))
        .expect("Failed to create test filter")
}

/// Record whose payload is `{"value": value}`
#[allow(dead_code)]
pub fn value_record(id: u64, value: &str) -> Record {
    Record::new(id, json!({ "value": value }))
}

#[allow(dead_code)]
pub fn payload_record(id: u64, payload: Value) -> Record {
    Record::new(id, payload)
}
