//! Per-call debug trace.
//!
//! A `FlowTrace` is created at the start of one analysis call, threaded
//! through it explicitly, and dropped when the call returns. Nothing here is
//! process-wide.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// One recorded stage of an analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub stage: String,
    /// Milliseconds since the call started
    pub elapsed_ms: f64,
    pub detail: String,
}

/// Ephemeral stage log for a single analysis call.
#[derive(Debug)]
pub struct FlowTrace {
    flow_id: Uuid,
    started: Instant,
    enabled: bool,
    events: Vec<FlowEvent>,
}

impl FlowTrace {
    /// Starts a new trace. When `enabled` is false, events are discarded.
    #[must_use]
    pub fn start(enabled: bool) -> Self {
        Self {
            flow_id: Uuid::new_v4(),
            started: Instant::now(),
            enabled,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn flow_id(&self) -> Uuid {
        self.flow_id
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Milliseconds since the trace started.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Records a stage event.
    pub fn record(&mut self, stage: &str, detail: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.elapsed_ms();
        self.events.push(FlowEvent {
            stage: stage.to_string(),
            elapsed_ms,
            detail: detail.into(),
        });
    }

    /// Consumes the trace, returning its events when enabled.
    #[must_use]
    pub fn finish(self) -> Option<Vec<FlowEvent>> {
        self.enabled.then_some(self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_trace_records_nothing() {
        let mut trace = FlowTrace::start(false);
        trace.record("validate", "ok");
        assert!(trace.finish().is_none());
    }

    #[test]
    fn enabled_trace_keeps_events_in_order() {
        let mut trace = FlowTrace::start(true);
        trace.record("validate", "ok");
        trace.record("aggregate", "6 components");

        let events = trace.finish().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].stage, "validate");
        assert!(events[1].elapsed_ms >= events[0].elapsed_ms);
    }

    #[test]
    fn each_trace_gets_its_own_flow_id() {
        let a = FlowTrace::start(true);
        let b = FlowTrace::start(true);
        assert_ne!(a.flow_id(), b.flow_id());
    }
}
