use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::recorder::{PerformanceRecorder, RequestRecord};

/// Fire-and-forget handle for completed-request measurements.
///
/// A single worker drains the queue, so records for one endpoint are applied
/// in the order they were submitted.
#[derive(Clone)]
pub struct TelemetrySink {
    sender: mpsc::UnboundedSender<RequestRecord>,
}

impl TelemetrySink {
    /// Start the recording worker. Must be called inside a Tokio runtime.
    pub fn spawn(recorder: Arc<PerformanceRecorder>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<RequestRecord>();

        let handle = tokio::spawn(async move {
            while let Some(record) = receiver.recv().await {
                recorder.record_request(record);
            }
            tracing::debug!(target: "reqguard::telemetry", "Telemetry worker stopped");
        });

        (Self { sender }, handle)
    }

    /// Queue a record without waiting. A stopped worker only costs the sample.
    pub fn submit(&self, record: RequestRecord) {
        if let Err(err) = self.sender.send(record) {
            tracing::debug!(
                target: "reqguard::telemetry",
                endpoint = %err.0.endpoint,
                "Telemetry worker unavailable, dropping sample"
            );
        }
    }
}
