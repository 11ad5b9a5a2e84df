//! Progress event delivery
//!
//! The engine only knows the [`ProgressSink`] trait; a UI subscribes through
//! one of the channel implementations or a closure wrapped in [`FnProgress`].

use crate::types::IngestEvent;
use tokio::sync::{broadcast, mpsc};

/// Receiver of engine progress events
///
/// `emit` is called from inside the fetch loop and must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: IngestEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: IngestEvent) {}
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn emit(&self, event: IngestEvent) {
        tracing::info!(run_id = %event.run_id(), event = event.event_type(), "{}", event);
    }
}

/// Adapts a closure into a sink
pub struct FnProgress<F>(pub F);

impl<F> ProgressSink for FnProgress<F>
where
    F: Fn(IngestEvent) + Send + Sync,
{
    fn emit(&self, event: IngestEvent) {
        (self.0)(event)
    }
}

impl ProgressSink for broadcast::Sender<IngestEvent> {
    fn emit(&self, event: IngestEvent) {
        // no subscribers is fine
        let _ = self.send(event);
    }
}

impl ProgressSink for mpsc::UnboundedSender<IngestEvent> {
    fn emit(&self, event: IngestEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Progress receiver dropped");
        }
    }
}
