//! Best-effort delivery of one event to a resolved recipient set.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::connection::ConnectionHandle;
use super::protocol::ServerEvent;
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, BROADCAST_SEND_FAILURES_TOTAL, BROADCAST_SKIPPED_TOTAL,
};

/// Per-broadcast outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Frames enqueued.
    pub delivered: usize,
    /// Recipients whose socket was already closing.
    pub skipped: usize,
    /// Recipients whose send failed.
    pub failed: usize,
}

impl DispatchReport {
    /// Recipients considered.
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

/// Send `event` to every target, isolating per-recipient failures.
///
/// The event is serialized once and shared. Unready targets are skipped;
/// failed sends are counted and logged but never close the connection or
/// stop the loop. Does not block: each send is a non-waiting enqueue.
pub fn dispatch(targets: &[Arc<ConnectionHandle>], event: &ServerEvent) -> DispatchReport {
    let mut report = DispatchReport::default();
    if targets.is_empty() {
        return report;
    }

    let json = match event.to_json() {
        Ok(json) => Arc::new(json),
        Err(e) => {
            warn!(event_type = event.kind(), error = %e, "failed to serialize event");
            report.failed = targets.len();
            return report;
        }
    };

    for target in targets {
        if !target.is_ready() {
            debug!(conn_id = %target.id(), "recipient closing, skipped");
            report.skipped += 1;
            continue;
        }
        match target.send(json.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!(conn_id = %target.id(), error = %e, "failed to send event to client");
                report.failed += 1;
            }
        }
    }

    counter!(BROADCAST_DELIVERIES_TOTAL, "type" => event.kind()).increment(report.delivered as u64);
    counter!(BROADCAST_SKIPPED_TOTAL).increment(report.skipped as u64);
    counter!(BROADCAST_SEND_FAILURES_TOTAL).increment(report.failed as u64);
    debug!(
        event_type = event.kind(),
        recipients = targets.len(),
        delivered = report.delivered,
        skipped = report.skipped,
        failed = report.failed,
        "dispatched event"
    );
    report
}
