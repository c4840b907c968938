//! # Monitoring Module
//!
//! Generic observability infrastructure for a `Parent`'s supervision activity.
//!
//! ## Features
//! - **Generic `Monitor<E>` trait**: works with any event type via `MonitoringEvent`
//! - **Zero-cost option**: `NoopMonitor` compiles away when disabled
//! - **Lock-free recording**: atomic counters for concurrent event tracking
//! - **`SupervisionEvent`**: the one event type this crate emits — child
//!   start/stop/failure/restart, bindings, shutdown-groups and restart-budget
//!   exhaustion
//!
//! ## Examples
//! ```
//! use parentcore::monitoring::{InMemoryMonitor, Monitor, MonitoringConfig, SupervisionEvent, SupervisionEventKind};
//! use chrono::Utc;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor = InMemoryMonitor::<SupervisionEvent>::new(MonitoringConfig::default());
//!
//! monitor.record(SupervisionEvent {
//!     timestamp: Utc::now(),
//!     supervisor_id: "parent-1".to_string(),
//!     child_id: Some("worker-1".to_string()),
//!     event_kind: SupervisionEventKind::ChildStarted,
//!     metadata: HashMap::new(),
//! }).await?;
//!
//! let snapshot = monitor.snapshot().await?;
//! assert_eq!(snapshot.total_events, 1);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod in_memory;
pub mod noop;
pub mod traits;
pub mod types;

pub use error::MonitoringError;
pub use in_memory::InMemoryMonitor;
pub use noop::NoopMonitor;
pub use traits::{EventSeverity, Monitor, MonitoringEvent};
pub use types::{MonitoringConfig, MonitoringSnapshot, SupervisionEvent, SupervisionEventKind};
