use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::coordinator::CoordinatorClient;
use crate::pipeline::buffer::ResultBuffer;
use crate::pipeline::item::ExecutionResult;

/// A drained batch the coordinator has not accepted yet.
struct PendingBatch {
    results: Vec<ExecutionResult>,
    attempts: u32,
}

/// Drains the result buffer on a fixed cadence and delivers batches to the
/// coordinator.
///
/// A batch that fails to submit is retained and retried on following ticks
/// instead of being drained over, preserving delivery order. After
/// `max_submit_attempts` failures the batch is dropped with an error log.
#[derive(Clone)]
pub struct ResultSubmitter {
    client: Arc<CoordinatorClient>,
    buffer: Arc<ResultBuffer>,
    config: PipelineConfig,
}

impl ResultSubmitter {
    pub fn new(
        client: Arc<CoordinatorClient>,
        buffer: Arc<ResultBuffer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            buffer,
            config,
        }
    }

    /// Tick until the stop token fires. A batch still retained at that point
    /// gets one final delivery attempt.
    pub async fn run(&self, stop: CancellationToken) {
        let mut pending: Option<PendingBatch> = None;

        while !stop.is_cancelled() {
            self.tick(&mut pending).await;

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.submit_interval) => {}
            }
        }

        if let Some(batch) = pending.take() {
            if let Err(e) = self.client.submit_results(&batch.results).await {
                tracing::error!(
                    dropped = batch.results.len(),
                    error = %e,
                    "Dropping retained batch at shutdown"
                );
            }
        }
    }

    async fn tick(&self, pending: &mut Option<PendingBatch>) {
        let (results, attempts) = match pending.take() {
            Some(batch) => (batch.results, batch.attempts),
            None => (self.buffer.take_up_to(self.config.batch_size).await, 0),
        };

        if results.is_empty() {
            return;
        }

        if let Err(e) = self.client.submit_results(&results).await {
            let attempts = attempts + 1;
            if attempts >= self.config.max_submit_attempts {
                tracing::error!(
                    dropped = results.len(),
                    attempts,
                    error = %e,
                    "Dropping result batch after repeated submit failures"
                );
            } else {
                tracing::warn!(
                    retained = results.len(),
                    attempts,
                    error = %e,
                    "Submit failed, batch retained for retry"
                );
                *pending = Some(PendingBatch { results, attempts });
            }
        }
    }

    /// Drain and deliver everything left in the buffer. Runs once during
    /// agent wind-down, after the scheduler has finished producing.
    pub async fn flush(&self) {
        loop {
            let results = self.buffer.take_up_to(self.config.batch_size).await;
            if results.is_empty() {
                return;
            }
            if let Err(e) = self.client.submit_results(&results).await {
                tracing::error!(
                    dropped = results.len(),
                    error = %e,
                    "Failed to deliver results during shutdown"
                );
            }
        }
    }
}
