//! Monitoring event types and configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::traits::{EventSeverity, MonitoringEvent};

/// Configuration for monitoring behavior.
///
/// Controls how events are recorded, filtered, and stored in the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,

    /// Maximum number of events to keep in history
    pub max_history_size: usize,

    /// Minimum severity level to record (events below this are filtered)
    pub severity_filter: EventSeverity,

    /// Interval for snapshot generation (if using background snapshots)
    #[serde(with = "crate::util::duration_serde")]
    pub snapshot_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history_size: 1000,
            severity_filter: EventSeverity::Info,
            snapshot_interval: Duration::from_secs(60),
        }
    }
}

/// Snapshot of monitoring state at a point in time.
///
/// Provides queryable access to monitoring counters and recent event history.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSnapshot<E: MonitoringEvent> {
    /// Timestamp when snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Total number of events recorded
    pub total_events: u64,

    /// Number of trace-level events
    pub trace_count: u64,

    /// Number of debug-level events
    pub debug_count: u64,

    /// Number of info-level events
    pub info_count: u64,

    /// Number of warning-level events
    pub warning_count: u64,

    /// Number of error-level events
    pub error_count: u64,

    /// Number of critical-level events
    pub critical_count: u64,

    /// Recent events (up to max_history_size)
    pub recent_events: Vec<E>,
}

// ============================================================================
// Supervision Events
// ============================================================================

/// Events related to a parent's supervision of its children.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisionEvent {
    /// Timestamp when event occurred
    pub timestamp: DateTime<Utc>,

    /// ID of the parent (the host supervisor instance)
    pub supervisor_id: String,

    /// ID of the child the event concerns, if any
    pub child_id: Option<String>,

    /// Specific supervision event type
    pub event_kind: SupervisionEventKind,

    /// Additional event metadata
    pub metadata: HashMap<String, String>,
}

impl MonitoringEvent for SupervisionEvent {
    const EVENT_TYPE: &'static str = "supervision";

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn severity(&self) -> EventSeverity {
        match &self.event_kind {
            SupervisionEventKind::ChildStarted => EventSeverity::Info,
            SupervisionEventKind::ChildStopped => EventSeverity::Info,
            SupervisionEventKind::ChildFailed { .. } => EventSeverity::Error,
            SupervisionEventKind::ChildRestarted { .. } => EventSeverity::Warning,
            SupervisionEventKind::ChildBound { .. } => EventSeverity::Debug,
            SupervisionEventKind::ChildUnbound { .. } => EventSeverity::Debug,
            SupervisionEventKind::ShutdownGroupStopped { .. } => EventSeverity::Info,
            SupervisionEventKind::RestartLimitExceeded { .. } => EventSeverity::Critical,
            SupervisionEventKind::ParentRestartBudgetExhausted { .. } => EventSeverity::Critical,
            SupervisionEventKind::EphemeralGivenUp => EventSeverity::Warning,
        }
    }
}

/// Specific types of supervision events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SupervisionEventKind {
    /// Child task successfully started
    ChildStarted,

    /// Child task gracefully stopped
    ChildStopped,

    /// Child task exited abnormally
    ChildFailed {
        /// Error or exit reason
        error: String,
        /// Restart count for this child after the failure is recorded
        restart_count: u32,
    },

    /// Child task was restarted after a failure
    ChildRestarted {
        /// Restart count after this restart
        restart_count: u32,
    },

    /// A binding (dependency edge) was recorded between two children
    ChildBound {
        /// The `ChildId` this child now depends on
        depends_on: String,
    },

    /// A binding was removed, typically because the depended-on child left the registry
    ChildUnbound {
        /// The `ChildId` no longer depended on
        depends_on: String,
    },

    /// A shutdown-group was stopped as one atomic unit
    ShutdownGroupStopped {
        /// Name of the shutdown-group
        group: String,
        /// Number of children stopped as part of the group
        affected_count: usize,
    },

    /// A child's own restart budget was exceeded; the child is given up on
    RestartLimitExceeded {
        /// Number of restarts attempted within the window
        restart_count: u32,
        /// Sliding window duration the count was measured over
        #[serde(with = "crate::util::duration_serde")]
        window: Duration,
    },

    /// The parent-wide restart budget was exceeded; this is fatal to the parent
    ParentRestartBudgetExhausted {
        /// Number of restarts attempted within the window, parent-wide
        restart_count: u32,
        /// Sliding window duration the count was measured over
        #[serde(with = "crate::util::duration_serde")]
        window: Duration,
    },

    /// An ephemeral child was dropped from the registry after giving up on restart
    EphemeralGivenUp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_config_default() {
        let config = MonitoringConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_history_size, 1000);
        assert_eq!(config.severity_filter, EventSeverity::Info);
        assert_eq!(config.snapshot_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_supervision_event_severity() {
        let event = SupervisionEvent {
            timestamp: Utc::now(),
            supervisor_id: "sup-1".to_string(),
            child_id: Some("child-1".to_string()),
            event_kind: SupervisionEventKind::ChildFailed {
                error: "connection lost".to_string(),
                restart_count: 1,
            },
            metadata: HashMap::new(),
        };

        assert_eq!(event.severity(), EventSeverity::Error);
        assert_eq!(SupervisionEvent::EVENT_TYPE, "supervision");
    }

    #[test]
    fn test_shutdown_group_event_severity() {
        let event = SupervisionEvent {
            timestamp: Utc::now(),
            supervisor_id: "sup-1".to_string(),
            child_id: None,
            event_kind: SupervisionEventKind::ShutdownGroupStopped {
                group: "db-cluster".to_string(),
                affected_count: 3,
            },
            metadata: HashMap::new(),
        };

        assert_eq!(event.severity(), EventSeverity::Info);
    }

    #[test]
    fn test_parent_budget_exhausted_is_critical() {
        let event = SupervisionEvent {
            timestamp: Utc::now(),
            supervisor_id: "sup-1".to_string(),
            child_id: None,
            event_kind: SupervisionEventKind::ParentRestartBudgetExhausted {
                restart_count: 4,
                window: Duration::from_secs(5),
            },
            metadata: HashMap::new(),
        };

        assert_eq!(event.severity(), EventSeverity::Critical);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_supervision_event_kind_serialization() {
        let kind = SupervisionEventKind::ChildFailed {
            error: "test error".to_string(),
            restart_count: 3,
        };

        let json = serde_json::to_string(&kind).expect("serialization should succeed");
        assert!(json.contains("ChildFailed"));
        assert!(json.contains("test error"));
    }

    #[test]
    fn test_monitoring_snapshot_creation() {
        let snapshot = MonitoringSnapshot::<SupervisionEvent> {
            timestamp: Utc::now(),
            total_events: 100,
            trace_count: 10,
            debug_count: 20,
            info_count: 30,
            warning_count: 25,
            error_count: 10,
            critical_count: 5,
            recent_events: vec![],
        };

        assert_eq!(snapshot.total_events, 100);
        assert_eq!(snapshot.trace_count, 10);
        assert_eq!(snapshot.critical_count, 5);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_event_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert("restart_group".to_string(), "db-cluster".to_string());

        let event = SupervisionEvent {
            timestamp: Utc::now(),
            supervisor_id: "sup-1".to_string(),
            child_id: Some("child-1".to_string()),
            event_kind: SupervisionEventKind::ChildStarted,
            metadata,
        };

        assert_eq!(
            event
                .metadata
                .get("restart_group")
                .expect("key should exist"),
            "db-cluster"
        );
    }
}
