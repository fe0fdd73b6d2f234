use crate::error::{Result, UniqueError};
use crate::fingerprint::fingerprint;
use crate::health::HealthTracker;
use crate::storage::MembershipStore;
use crate::template::{PathResolver, TemplateResolver};
use crate::window::{EvictionPolicy, Snapshot, UniquenessWindow};
use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

pub const DEFAULT_PROPERTY: &str = "{{value}}";
pub const DEFAULT_LOOKBACK: usize = 1000;
pub const DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS: u64 = 1;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Options of a single filter instance
#[derive(Clone, Debug, Builder, Serialize, Deserialize, PartialEq)]
#[builder(pattern = "owned")]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct FilterConfig {
    /// Template selecting what to fingerprint, blank for the whole payload
    #[builder(default = "DEFAULT_PROPERTY.to_string()", setter(into))]
    #[serde(default)]
    pub property: String,

    /// Number of past fingerprints to remember, 0 for unlimited
    #[builder(default = "Some(DEFAULT_LOOKBACK)", setter(strip_option))]
    #[serde(default, deserialize_with = "lenient_number")]
    pub lookback: Option<usize>,

    /// Days without a re-emitted event after which the filter is reported
    /// as not working
    #[builder(
        default = "Some(DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS)",
        setter(strip_option)
    )]
    #[serde(default, deserialize_with = "lenient_number")]
    pub expected_update_period_in_days: Option<u64>,

    #[builder(default)]
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            property: DEFAULT_PROPERTY.to_string(),
            lookback: Some(DEFAULT_LOOKBACK),
            expected_update_period_in_days: Some(
                DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS,
            ),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback.is_none() || self.expected_update_period_in_days.is_none()
        {
            return Err(UniqueError::InvalidConfig(
                "The lookback and expected_update_period_in_days fields are all required."
                    .into(),
            ));
        }
        if self.expected_update_period_in_days == Some(0) {
            return Err(UniqueError::InvalidConfig(
                "expected_update_period_in_days must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn lookback(&self) -> usize {
        self.lookback.unwrap_or(0)
    }

    pub fn expected_update_period(&self) -> Duration {
        let days = self
            .expected_update_period_in_days
            .unwrap_or(DEFAULT_EXPECTED_UPDATE_PERIOD_DAYS);
        Duration::from_secs(days.saturating_mul(SECS_PER_DAY))
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }
}

/// Form fields arrive as strings, so numbers are accepted in either shape.
/// Empty strings and `null` count as missing.
fn lenient_number<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + TryFrom<u64>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid number: {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid number: {s}"))),
        Some(other) => {
            Err(D::Error::custom(format!("expected a number, got {other}")))
        }
    }
}

/// An incoming record. The id is only used to give log lines context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Record {
    #[serde(default)]
    pub id: u64,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub payload: Value,
}

impl Record {
    pub fn new(id: u64, payload: Value) -> Self {
        Self { id, payload }
    }
}

/// Outcome of processing one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Decision {
    pub reemit: bool,
    pub fingerprint: String,
}

/// Deduplicating filter instance.
///
/// Re-emits a record only when its fingerprint is not among the last
/// `lookback` unique fingerprints this instance has seen. All membership
/// state lives in the backing store under `uniq{id}`, so several processes
/// can share one instance.
pub struct UniqueFilter {
    id: String,
    config: FilterConfig,
    window: UniquenessWindow,
    resolver: Arc<dyn TemplateResolver>,
    health: Arc<HealthTracker>,
}

impl UniqueFilter {
    pub fn new(
        id: &str,
        config: FilterConfig,
        store: Arc<dyn MembershipStore>,
    ) -> Result<Self> {
        config.validate()?;

        let window = UniquenessWindow::with_policy(
            store,
            &format!("uniq{id}"),
            config.eviction,
        );

        Ok(Self {
            id: id.to_string(),
            config,
            window,
            resolver: Arc::new(PathResolver),
            health: Arc::new(HealthTracker::new()),
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Shares health timestamps with another instance of the same filter,
    /// e.g. the one this instance replaces after a reconfiguration.
    pub fn with_health(mut self, health: Arc<HealthTracker>) -> Self {
        self.health = health;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn shared_health(&self) -> Arc<HealthTracker> {
        Arc::clone(&self.health)
    }

    pub fn fingerprint(&self, record: &Record) -> String {
        fingerprint(&record.payload, &self.config.property, self.resolver.as_ref())
    }

    /// Decides whether `record` is re-emitted. Store failures are logged,
    /// counted against health and returned.
    pub fn process_record(&self, record: &Record) -> Result<Decision> {
        let fingerprint = self.fingerprint(record);

        match self.admit(&fingerprint) {
            Ok(true) => {
                self.health.record_event();
                info!(
                    filter = %self.id,
                    record = record.id,
                    "Propagating new event as '{fingerprint}' is a new unique property."
                );
                Ok(Decision {
                    reemit: true,
                    fingerprint,
                })
            }
            Ok(false) => {
                debug!(
                    filter = %self.id,
                    record = record.id,
                    %fingerprint,
                    "Not propagating as incoming event is a duplicate."
                );
                Ok(Decision {
                    reemit: false,
                    fingerprint,
                })
            }
            Err(e) => {
                self.health.record_error();
                error!(
                    filter = %self.id,
                    record = record.id,
                    %fingerprint,
                    error = %e,
                    "Failed to process record"
                );
                Err(e)
            }
        }
    }

    fn admit(&self, fingerprint: &str) -> Result<bool> {
        let unique = self.window.try_insert(fingerprint)?;
        if unique {
            self.window.evict_if_full(self.config.lookback())?;
        }
        Ok(unique)
    }

    /// Processes a batch in order and returns the records to re-emit.
    /// Stops at the first failure.
    pub fn receive(&self, records: &[Record]) -> Result<Vec<Record>> {
        let mut reemitted = Vec::new();
        for record in records {
            if self.process_record(record)?.reemit {
                reemitted.push(record.clone());
            }
        }
        Ok(reemitted)
    }

    pub fn diagnostics(&self) -> Result<Snapshot> {
        self.window.snapshot()
    }

    pub fn reset_state(&self) -> Result<()> {
        self.window.clear()?;
        info!(filter = %self.id, "Cleared unique filter state");
        Ok(())
    }

    /// Host hook for assigning persisted state: an empty object resets the
    /// window, anything else leaves it untouched.
    pub fn set_memory(&self, value: &Value) -> Result<()> {
        match value {
            Value::Object(map) if map.is_empty() => self.reset_state(),
            _ => Ok(()),
        }
    }

    /// Host hook for errors raised outside of `process_record`
    pub fn record_error(&self, message: &str) {
        error!(filter = %self.id, "{message}");
        self.health.record_error();
    }

    pub fn is_working(&self) -> bool {
        self.is_working_at(SystemTime::now())
    }

    pub fn is_working_at(&self, now: SystemTime) -> bool {
        self.health
            .is_working_at(now, self.config.expected_update_period())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn filter(config: FilterConfig) -> UniqueFilter {
        UniqueFilter::new("1", config, Arc::new(InMemoryStore::default()))
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = FilterConfigBuilder::default().build().unwrap();
        assert_eq!(config, FilterConfig::default());
        assert_eq!(config.property, "{{value}}");
        assert_eq!(config.lookback, Some(1000));
        assert_eq!(config.expected_update_period_in_days, Some(1));
        assert_eq!(config.eviction, EvictionPolicy::SharedRank);
    }

    #[test]
    fn test_validate_requires_lookback_and_period() {
        let missing_lookback = FilterConfig {
            lookback: None,
            ..FilterConfig::default()
        };
        assert!(matches!(
            missing_lookback.validate(),
            Err(UniqueError::InvalidConfig(_))
        ));

        let missing_period = FilterConfig {
            expected_update_period_in_days: None,
            ..FilterConfig::default()
        };
        assert!(missing_period.validate().is_err());

        let zero_period = FilterConfig {
            expected_update_period_in_days: Some(0),
            ..FilterConfig::default()
        };
        assert!(zero_period.validate().is_err());

        assert!(FilterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = FilterConfig {
            lookback: None,
            ..FilterConfig::default()
        };
        let result =
            UniqueFilter::new("1", config, Arc::new(InMemoryStore::default()));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_form_values() {
        let config = FilterConfig::from_json(&json!({
            "property": "{{id}}",
            "lookback": "25",
            "expected_update_period_in_days": 2
        }))
        .unwrap();
        assert_eq!(config.lookback, Some(25));
        assert_eq!(config.expected_update_period_in_days, Some(2));
        assert_eq!(config.expected_update_period(), Duration::from_secs(2 * 86_400));

        let blank = FilterConfig::from_json(&json!({ "lookback": "" })).unwrap();
        assert_eq!(blank.lookback, None);
        assert!(blank.validate().is_err());

        assert!(FilterConfig::from_json(&json!({ "lookback": "many" })).is_err());
        assert!(FilterConfig::from_json(&json!({ "lookback": -1 })).is_err());
    }

    #[test]
    fn test_config_eviction_policy_from_json() {
        let config = FilterConfig::from_json(&json!({
            "lookback": 5,
            "expected_update_period_in_days": 1,
            "eviction": "insertion_order"
        }))
        .unwrap();
        assert_eq!(config.eviction, EvictionPolicy::InsertionOrder);
    }

    #[test]
    fn test_process_record_marks_duplicates() {
        let filter = filter(FilterConfig::default());
        let first = filter
            .process_record(&Record::new(1, json!({ "value": "x" })))
            .unwrap();
        let second = filter
            .process_record(&Record::new(2, json!({ "value": "x", "n": 2 })))
            .unwrap();
        assert!(first.reemit);
        assert!(!second.reemit);
        assert_eq!(first.fingerprint, "x");
    }

    #[test]
    fn test_set_memory_only_resets_on_empty_object() {
        let filter = filter(FilterConfig::default());
        filter
            .process_record(&Record::new(1, json!({ "value": "x" })))
            .unwrap();

        filter.set_memory(&json!({ "length": 1 })).unwrap();
        assert_eq!(filter.diagnostics().unwrap().length, 1);

        filter.set_memory(&json!({})).unwrap();
        assert_eq!(filter.diagnostics().unwrap().length, 0);
    }

    #[test]
    fn test_custom_resolver_is_used() {
        struct Upper;
        impl TemplateResolver for Upper {
            fn resolve(&self, payload: &Value, _template: &str) -> String {
                payload["value"].as_str().unwrap_or_default().to_uppercase()
            }
        }

        let filter =
            filter(FilterConfig::default()).with_resolver(Arc::new(Upper));
        let decision = filter
            .process_record(&Record::new(1, json!({ "value": "abc" })))
            .unwrap();
        assert_eq!(decision.fingerprint, "ABC");
    }

    #[test]
    fn test_health_follows_activity() {
        let filter = filter(FilterConfig::default());
        assert!(!filter.is_working());

        filter
            .process_record(&Record::new(1, json!({ "value": "x" })))
            .unwrap();
        assert!(filter.is_working());

        filter.record_error("oh no!");
        assert!(!filter.is_working());
    }
}
