use prometheus::{IntCounterVec, Opts, Registry};

/// Operator-facing counters for the dispatch core.
#[derive(Clone)]
pub struct DispatchMetrics {
    registry: Registry,
    transitions: IntCounterVec,
    sync_failures: IntCounterVec,
    notification_failures: IntCounterVec,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let transitions = IntCounterVec::new(
            Opts::new("tranzit_transitions_total", "Booking transitions by outcome"),
            &["transition", "outcome"],
        )?;
        let sync_failures = IntCounterVec::new(
            Opts::new(
                "tranzit_sync_failures_total",
                "Committed transitions whose driver/vehicle status could not be synchronized",
            ),
            &["transition"],
        )?;
        let notification_failures = IntCounterVec::new(
            Opts::new("tranzit_notification_failures_total", "Undelivered customer notifications"),
            &["template"],
        )?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(sync_failures.clone()))?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self { registry, transitions, sync_failures, notification_failures })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, transition: &str, outcome: &str) {
        self.transitions.with_label_values(&[transition, outcome]).inc();
    }

    pub fn record_sync_failure(&self, transition: &str) {
        self.sync_failures.with_label_values(&[transition]).inc();
    }

    pub fn record_notification_failure(&self, template: &str) {
        self.notification_failures.with_label_values(&[template]).inc();
    }

    pub fn transition_count(&self, transition: &str, outcome: &str) -> u64 {
        self.transitions.with_label_values(&[transition, outcome]).get()
    }

    pub fn sync_failure_count(&self, transition: &str) -> u64 {
        self.sync_failures.with_label_values(&[transition]).get()
    }

    pub fn notification_failure_count(&self, template: &str) -> u64 {
        self.notification_failures.with_label_values(&[template]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_registered() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.record_transition("accept", "committed");
        metrics.record_sync_failure("complete");

        assert_eq!(metrics.transition_count("accept", "committed"), 1);
        assert_eq!(metrics.sync_failure_count("complete"), 1);

        let names: Vec<String> = metrics.registry().gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"tranzit_transitions_total".to_string()));
        assert!(names.contains(&"tranzit_sync_failures_total".to_string()));
    }
}
