//! Trace observer interface
//!
//! Transport components report protocol events as [`TraceRecord`]s to a
//! caller-supplied [`TraceObserver`] instead of a global event bus.

use std::sync::Mutex;

/// Direction of a traced event relative to the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Received from the peer
    Inbound,
    /// Sent to the peer
    Outbound,
}

impl Direction {
    /// Arrow used when rendering a record on a console
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::Inbound => "<-",
            Direction::Outbound => "->",
        }
    }
}

/// Trace verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceLevel {
    /// Tracing disabled
    Off,
    /// Connection control events (channel ready, closed, errors)
    Ctrl,
    /// Handshake details
    Handshake,
    /// Every message on the wire
    Wire,
}

/// A single traced event
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceRecord {
    /// Verbosity level of the event
    pub level: TraceLevel,
    /// Event direction
    pub direction: Direction,
    /// Human readable description
    pub message: String,
}

impl TraceRecord {
    /// Create a new record
    pub fn new(level: TraceLevel, direction: Direction, message: impl Into<String>) -> Self {
        Self {
            level,
            direction,
            message: message.into(),
        }
    }
}

/// Receives trace records
///
/// Implementations are called from delivery threads and must not panic.
pub trait TraceObserver: Send + Sync {
    /// Handle one record
    fn on_trace(&self, record: &TraceRecord);
}

/// Observer that discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl TraceObserver for NullObserver {
    fn on_trace(&self, _record: &TraceRecord) {}
}

/// Observer that keeps every record in memory
#[derive(Debug, Default)]
pub struct CollectingObserver {
    records: Mutex<Vec<TraceRecord>>,
}

impl CollectingObserver {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected records
    pub fn records(&self) -> Vec<TraceRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TraceObserver for CollectingObserver {
    fn on_trace(&self, record: &TraceRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}
