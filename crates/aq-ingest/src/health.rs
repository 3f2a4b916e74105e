use aq_core::health::AdapterHealth;
use aq_core::types::SourceCode;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

/// Concurrent registry of per-adapter health counters.
///
/// Adapters report outcomes through this after every fetch; the orchestrator
/// consults it before fanning out to skip disabled sources.
pub struct HealthTracker {
    inner: RwLock<HashMap<SourceCode, AdapterHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        for source in SourceCode::all() {
            map.insert(source, AdapterHealth::new(source.as_str()));
        }
        Self { inner: RwLock::new(map) }
    }

    pub fn record_success(&self, source: SourceCode) {
        let mut guard = self.inner.write().expect("health registry lock poisoned");
        guard.entry(source).or_insert_with(|| AdapterHealth::new(source.as_str())).record_success(Utc::now());
    }

    pub fn record_failure(&self, source: SourceCode, message: impl Into<String>) {
        let mut guard = self.inner.write().expect("health registry lock poisoned");
        guard
            .entry(source)
            .or_insert_with(|| AdapterHealth::new(source.as_str()))
            .record_failure(Utc::now(), message);
    }

    pub fn is_available(&self, source: SourceCode) -> bool {
        self.inner
            .read()
            .expect("health registry lock poisoned")
            .get(&source)
            .map(|h| h.is_available())
            .unwrap_or(true)
    }

    /// Manually re-enable a disabled adapter. There is no automatic recovery path.
    pub fn reactivate(&self, source: SourceCode) {
        if let Some(health) = self.inner.write().expect("health registry lock poisoned").get_mut(&source) {
            health.is_active = true;
            health.consecutive_failures = 0;
        }
    }

    pub fn snapshot(&self) -> Vec<AdapterHealth> {
        self.inner.read().expect("health registry lock poisoned").values().cloned().collect()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_reports_everything_available() {
        let tracker = HealthTracker::new();
        for source in SourceCode::all() {
            assert!(tracker.is_available(source));
        }
    }

    #[test]
    fn disabled_adapter_becomes_unavailable_then_recovers_manually() {
        let tracker = HealthTracker::new();
        for _ in 0..10 {
            tracker.record_failure(SourceCode::Waqi, "timeout");
        }
        assert!(!tracker.is_available(SourceCode::Waqi));
        tracker.reactivate(SourceCode::Waqi);
        assert!(tracker.is_available(SourceCode::Waqi));
    }
}
