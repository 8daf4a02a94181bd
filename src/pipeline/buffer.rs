use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::Mutex;

use crate::pipeline::item::ExecutionResult;

/// How long a producer waits on a full buffer before the result is dropped.
const PUT_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded mailbox between batch workers and the result submitter.
///
/// Producers never block past [`PUT_TIMEOUT`]; when the submitter cannot
/// keep up, overflow results are dropped and logged rather than stalling
/// command execution.
pub struct ResultBuffer {
    tx: mpsc::Sender<ExecutionResult>,
    rx: Mutex<mpsc::Receiver<ExecutionResult>>,
}

impl ResultBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Append a result, waiting briefly if the buffer is full. Returns false
    /// when the result had to be dropped.
    pub async fn put(&self, result: ExecutionResult) -> bool {
        match self.tx.send_timeout(result, PUT_TIMEOUT).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(result)) => {
                tracing::error!(item_id = %result.item_id, "Result buffer full, dropping result");
                false
            }
            Err(SendTimeoutError::Closed(result)) => {
                tracing::error!(item_id = %result.item_id, "Result buffer closed, dropping result");
                false
            }
        }
    }

    /// Drain up to `n` buffered results in arrival order. Returns immediately
    /// with whatever is available; an empty buffer yields an empty vec.
    pub async fn take_up_to(&self, n: usize) -> Vec<ExecutionResult> {
        let mut rx = self.rx.lock().await;
        let mut results = Vec::new();
        while results.len() < n {
            match rx.try_recv() {
                Ok(result) => results.push(result),
                Err(_) => break,
            }
        }
        results
    }
}
