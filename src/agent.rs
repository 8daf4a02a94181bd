use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::coordinator::CoordinatorClient;
use crate::error::Result;
use crate::pipeline::buffer::ResultBuffer;
use crate::pipeline::scheduler::BatchScheduler;
use crate::pipeline::submitter::ResultSubmitter;
use crate::worker::executor::CommandExecutor;
use crate::worker::monitor::{ResourceMonitor, SystemSampler};

/// The pull-based execution agent.
///
/// Wires the pipeline together: a scheduler fetching and dispatching
/// batches, a submitter draining the shared result buffer back to the
/// coordinator, and a resource monitor that stops everything when the
/// host runs hot. All loops watch one stop token, so a signal, a tripped
/// ceiling or a caller-side cancel all wind the agent down the same way.
pub struct Agent {
    config: AgentConfig,
    client: Arc<CoordinatorClient>,
    buffer: Arc<ResultBuffer>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let client = Arc::new(CoordinatorClient::new(config.coordinator.clone())?);
        let buffer = Arc::new(ResultBuffer::new(config.pipeline.buffer_capacity));
        Ok(Self {
            config,
            client,
            buffer,
        })
    }

    /// Run the pipeline until the stop token is cancelled.
    ///
    /// Wind-down is cooperative: no new batches are fetched, in-flight
    /// commands finish or hit their own timeout, and whatever reached the
    /// buffer is flushed to the coordinator before this returns.
    pub async fn run(self, stop: CancellationToken) {
        tracing::info!(
            coordinator_url = %self.config.coordinator.url,
            description = %self.config.coordinator.description,
            "Starting agent pipeline"
        );

        let monitor = ResourceMonitor::new(self.config.monitor.clone(), SystemSampler::new());
        let monitor_handle = tokio::spawn(monitor.run(stop.clone()));

        let submitter = ResultSubmitter::new(
            self.client.clone(),
            self.buffer.clone(),
            self.config.pipeline.clone(),
        );
        let submitter_task = submitter.clone();
        let submitter_stop = stop.clone();
        let submitter_handle =
            tokio::spawn(async move { submitter_task.run(submitter_stop).await });

        let executor = Arc::new(CommandExecutor::new(self.config.executor.clone()));
        let scheduler = BatchScheduler::new(
            self.client.clone(),
            executor,
            self.buffer.clone(),
            self.config.pipeline.clone(),
        );
        scheduler.run(stop.clone()).await;

        if submitter_handle.await.is_err() {
            tracing::error!("Result submitter task panicked");
        }
        if monitor_handle.await.is_err() {
            tracing::error!("Resource monitor task panicked");
        }

        // Results that finished during wind-down are still buffered.
        submitter.flush().await;

        tracing::info!("Agent pipeline stopped");
    }
}
