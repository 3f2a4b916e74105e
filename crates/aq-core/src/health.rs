use serde::{Deserialize, Serialize};

/// Derived health state of an adapter, recomputed from its counters on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Disabled,
}

/// Running health counters for one provider adapter.
///
/// Auto-disables after 10 consecutive failures. Re-enabling is a deliberate
/// operator action (there is no automatic recovery timer) since a source
/// that is actually broken upstream will just burn through the failure
/// budget again immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub source: String,
    pub is_active: bool,
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub status_message: String,
}

const AUTO_DISABLE_THRESHOLD: u32 = 10;

impl AdapterHealth {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            is_active: true,
            last_success_at: None,
            last_failure_at: None,
            consecutive_failures: 0,
            total_requests: 0,
            total_failures: 0,
            status_message: String::new(),
        }
    }

    pub fn record_success(&mut self, at: chrono::DateTime<chrono::Utc>) {
        self.total_requests += 1;
        self.last_success_at = Some(at);
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, at: chrono::DateTime<chrono::Utc>, message: impl Into<String>) {
        self.total_requests += 1;
        self.total_failures += 1;
        self.last_failure_at = Some(at);
        self.consecutive_failures += 1;
        self.status_message = message.into();

        if self.consecutive_failures >= AUTO_DISABLE_THRESHOLD {
            self.is_active = false;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        ((self.total_requests - self.total_failures) as f64 / self.total_requests as f64) * 100.0
    }

    pub fn state(&self) -> HealthState {
        if !self.is_active {
            return HealthState::Disabled;
        }
        if self.consecutive_failures < 5 && self.success_rate() > 80.0 {
            HealthState::Healthy
        } else if self.total_requests == 0 {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state(), HealthState::Healthy | HealthState::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn auto_disables_after_ten_consecutive_failures() {
        let mut h = AdapterHealth::new("WAQI");
        for _ in 0..9 {
            h.record_failure(Utc::now(), "timeout");
        }
        assert!(h.is_active);
        h.record_failure(Utc::now(), "timeout");
        assert!(!h.is_active);
        assert_eq!(h.state(), HealthState::Disabled);
    }

    #[test]
    fn success_resets_consecutive_failure_count() {
        let mut h = AdapterHealth::new("WAQI");
        h.record_failure(Utc::now(), "boom");
        h.record_failure(Utc::now(), "boom");
        h.record_success(Utc::now());
        assert_eq!(h.consecutive_failures, 0);
    }

    #[test]
    fn disabled_adapter_stays_disabled_without_manual_reset() {
        let mut h = AdapterHealth::new("WAQI");
        for _ in 0..10 {
            h.record_failure(Utc::now(), "boom");
        }
        assert!(!h.is_active);
        // no automatic recovery: is_active must be flipped back by an operator
        assert_eq!(h.state(), HealthState::Disabled);
    }
}
