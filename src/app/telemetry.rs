//! Telemetry drainers: annotated chains and the full evaluation firehose.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::core::domain::Chain;
use crate::store::TelemetrySink;

pub struct TelemetryWriter {
    sink: Arc<dyn TelemetrySink>,
    max_batch_size: usize,
}

impl TelemetryWriter {
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>, max_batch_size: usize) -> Self {
        Self {
            sink,
            max_batch_size,
        }
    }

    /// Drain chains annotated by TradeManager, one record per chain.
    pub async fn run_store_cycles(
        self,
        mut store_cycles: mpsc::Receiver<Chain>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                chain = store_cycles.recv() => match chain {
                    None => break,
                    Some(chain) => {
                        if let Err(e) = self.sink.record_chain(&chain) {
                            warn!(error = %e, uid = %chain.uid(), "Failed to record chain");
                        }
                    }
                }
            }
        }
        debug!("Store cycles drainer stopped");
    }

    /// Drain the all-cycles broadcast, writing in bounded batches. Lag is
    /// expected under load and only costs telemetry, never evaluation.
    pub async fn run_all_cycles(
        self,
        mut all_cycles: broadcast::Receiver<Vec<Chain>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut pending: Vec<Chain> = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                batch = all_cycles.recv() => match batch {
                    Ok(batch) => {
                        pending.extend(batch);
                        while pending.len() >= self.max_batch_size {
                            let chunk: Vec<Chain> =
                                pending.drain(..self.max_batch_size).collect();
                            self.write_batch(&chunk);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Telemetry lagging, oldest batches dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        if !pending.is_empty() {
            self.write_batch(&pending);
        }
        debug!("All cycles drainer stopped");
    }

    fn write_batch(&self, batch: &[Chain]) {
        if let Err(e) = self.sink.record_batch(batch) {
            warn!(error = %e, size = batch.len(), "Failed to record chain batch");
        }
    }
}
