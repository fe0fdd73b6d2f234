use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Errors logged up to this long before the last emitted event still count
/// as recent.
pub const RECENT_ERROR_WINDOW: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Default, Clone, Copy)]
struct Activity {
    last_event_at: Option<SystemTime>,
    last_error_at: Option<SystemTime>,
}

/// Activity timestamps a host polls to decide whether a filter is working
#[derive(Debug, Default)]
pub struct HealthTracker {
    activity: Mutex<Activity>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Timestamps stay meaningful even if a writer panicked mid-update
    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_event(&self) {
        self.record_event_at(SystemTime::now());
    }

    pub fn record_event_at(&self, at: SystemTime) {
        self.activity().last_event_at = Some(at);
    }

    pub fn record_error(&self) {
        self.record_error_at(SystemTime::now());
    }

    pub fn record_error_at(&self, at: SystemTime) {
        self.activity().last_error_at = Some(at);
    }

    pub fn last_event_at(&self) -> Option<SystemTime> {
        self.activity().last_event_at
    }

    pub fn last_error_at(&self) -> Option<SystemTime> {
        self.activity().last_error_at
    }

    /// Working means an event was emitted within `expected_period` of `now`
    /// and no error was logged after (or shortly before) that event.
    pub fn is_working_at(
        &self,
        now: SystemTime,
        expected_period: Duration,
    ) -> bool {
        let activity = *self.activity();
        let Some(last_event) = activity.last_event_at else {
            return false;
        };

        let age = now.duration_since(last_event).unwrap_or(Duration::ZERO);
        if age > expected_period {
            return false;
        }

        match activity.last_error_at {
            Some(last_error) => last_event
                .checked_sub(RECENT_ERROR_WINDOW)
                .is_some_and(|cutoff| last_error <= cutoff),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_not_working_without_events() {
        let health = HealthTracker::new();
        assert!(!health.is_working_at(SystemTime::now(), DAY));
    }

    #[test]
    fn test_working_after_recent_event() {
        let health = HealthTracker::new();
        let now = SystemTime::now();
        health.record_event_at(now - Duration::from_secs(60));
        assert!(health.is_working_at(now, DAY));
    }

    #[test]
    fn test_stale_event_is_not_working() {
        let health = HealthTracker::new();
        let now = SystemTime::now();
        health.record_event_at(now - DAY - Duration::from_secs(1));
        assert!(!health.is_working_at(now, DAY));
    }

    #[test]
    fn test_error_without_events_is_not_working() {
        let health = HealthTracker::new();
        health.record_error();
        assert!(!health.is_working_at(SystemTime::now(), DAY));
    }

    #[test]
    fn test_recent_error_marks_not_working() {
        let health = HealthTracker::new();
        let now = SystemTime::now();
        health.record_event_at(now - Duration::from_secs(600));
        health.record_error_at(now - Duration::from_secs(300));
        assert!(!health.is_working_at(now, DAY));

        // an error just before the last event still counts
        health.record_error_at(now - Duration::from_secs(660));
        assert!(!health.is_working_at(now, DAY));
    }

    #[test]
    fn test_old_error_is_forgiven_by_later_event() {
        let health = HealthTracker::new();
        let now = SystemTime::now();
        health.record_error_at(now - Duration::from_secs(3600));
        health.record_event_at(now - Duration::from_secs(60));
        assert!(health.is_working_at(now, DAY));
    }
}
