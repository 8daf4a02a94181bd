use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::coordinator::CoordinatorClient;
use crate::pipeline::buffer::ResultBuffer;
use crate::pipeline::item::WorkItem;
use crate::worker::executor::CommandExecutor;

/// Item ids this process has already dispatched. Stops an item from running
/// twice when the coordinator re-serves it within the agent's lifetime.
#[derive(Debug, Default)]
struct DispatchLog(Mutex<HashSet<String>>);

impl DispatchLog {
    /// Record an id, returning false if it was already present.
    fn try_claim(&self, id: &str) -> bool {
        let mut seen = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(id.to_string())
    }
}

/// Fetches command batches from the coordinator and dispatches them to
/// worker tasks.
///
/// At most `max_concurrent_batches` batches run at once; a batch fetched
/// while every slot is busy is dropped and logged, and the coordinator is
/// expected to re-serve those commands later. Within a batch up to
/// `batch_workers` commands run concurrently, capped at the batch length.
pub struct BatchScheduler {
    client: Arc<CoordinatorClient>,
    executor: Arc<CommandExecutor>,
    buffer: Arc<ResultBuffer>,
    config: PipelineConfig,
    batch_slots: Arc<Semaphore>,
    dispatched: Arc<DispatchLog>,
}

impl BatchScheduler {
    pub fn new(
        client: Arc<CoordinatorClient>,
        executor: Arc<CommandExecutor>,
        buffer: Arc<ResultBuffer>,
        config: PipelineConfig,
    ) -> Self {
        let batch_slots = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
        Self {
            client,
            executor,
            buffer,
            config,
            batch_slots,
            dispatched: Arc::new(DispatchLog::default()),
        }
    }

    /// Fetch and dispatch until the stop token fires, then wait for every
    /// in-flight batch to finish before returning.
    pub async fn run(&self, stop: CancellationToken) {
        let mut dispatch_tasks: JoinSet<()> = JoinSet::new();

        loop {
            if stop.is_cancelled() {
                break;
            }

            let batch = tokio::select! {
                _ = stop.cancelled() => break,
                batch = self.client.fetch_batch(self.config.batch_size) => batch,
            };

            // Reap finished batches so the set stays small.
            while dispatch_tasks.try_join_next().is_some() {}

            match batch {
                Some(items) if !items.is_empty() => {
                    self.dispatch(items, &mut dispatch_tasks, &stop);

                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.config.fetch_interval) => {}
                    }
                }
                _ => {
                    tracing::info!(
                        backoff_secs = self.config.idle_backoff.as_secs(),
                        "No commands available, backing off"
                    );
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.config.idle_backoff) => {}
                    }
                }
            }
        }

        if !dispatch_tasks.is_empty() {
            tracing::info!(
                in_flight = dispatch_tasks.len(),
                "Stop signal received, draining in-flight batches"
            );
        }
        while dispatch_tasks.join_next().await.is_some() {}
    }

    fn dispatch(
        &self,
        items: Vec<WorkItem>,
        dispatch_tasks: &mut JoinSet<()>,
        stop: &CancellationToken,
    ) {
        match self.batch_slots.clone().try_acquire_owned() {
            Ok(permit) => {
                tracing::info!(items = items.len(), "Dispatching command batch");
                let executor = self.executor.clone();
                let buffer = self.buffer.clone();
                let dispatched = self.dispatched.clone();
                let batch_workers = self.config.batch_workers;
                let stop = stop.clone();
                dispatch_tasks.spawn(async move {
                    // Slot held for the whole batch, released on every exit.
                    let _permit = permit;
                    Self::run_batch(executor, buffer, dispatched, items, batch_workers, stop)
                        .await;
                });
            }
            Err(_) => {
                tracing::warn!(dropped = items.len(), "Batch ceiling reached, dropping batch");
            }
        }
    }

    async fn run_batch(
        executor: Arc<CommandExecutor>,
        buffer: Arc<ResultBuffer>,
        dispatched: Arc<DispatchLog>,
        items: Vec<WorkItem>,
        batch_workers: usize,
        stop: CancellationToken,
    ) {
        let workers = Arc::new(Semaphore::new(batch_workers.min(items.len()).max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for item in items {
            if !item.is_valid() {
                tracing::error!(item_id = %item.id, "Work item missing id or command, skipping");
                continue;
            }
            if !dispatched.try_claim(&item.id) {
                tracing::warn!(item_id = %item.id, "Item already dispatched, skipping");
                continue;
            }

            let workers = workers.clone();
            let executor = executor.clone();
            let buffer = buffer.clone();
            let stop = stop.clone();
            tasks.spawn(async move {
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Some(result) = executor.execute(&item, &stop).await {
                    buffer.put(result).await;
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}
