use std::time::Duration;

/// Where the agent pulls work from and how persistently it talks to it.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Base URL of the coordinator, without a trailing slash
    pub url: String,
    /// Free-text agent description reported with every submitted result
    pub description: String,
    /// Per-request timeout covering connect, send and read
    pub request_timeout: Duration,
    /// Attempts per fetch or submit before giving up
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".to_string(),
            description: "unnamed drover agent".to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Limits applied to each executed command.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Wall-clock budget per command; the process group is terminated past it
    pub command_timeout: Duration,
    /// Captured output is cut at this many bytes and marked as truncated
    pub max_output_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Host resource ceilings. Crossing either one stops the agent.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
    /// Pause between consecutive host samples
    pub check_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 90.0,
            max_memory_percent: 90.0,
            check_interval: Duration::from_secs(5),
        }
    }
}

/// Flow shaping for the fetch, execute and submit loops.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Commands requested per fetch and results drained per submit tick
    pub batch_size: usize,
    /// Pause between consecutive fetches while work is flowing
    pub fetch_interval: Duration,
    /// Pause after the coordinator reports no work or is unreachable
    pub idle_backoff: Duration,
    /// Cadence of the result submitter
    pub submit_interval: Duration,
    /// Submit ticks a failed batch is retried before it is dropped
    pub max_submit_attempts: u32,
    /// Bounded capacity of the result buffer
    pub buffer_capacity: usize,
    /// Batches allowed in flight at once; excess batches are dropped
    pub max_concurrent_batches: usize,
    /// Concurrent commands per batch, capped at the batch length
    pub batch_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            fetch_interval: Duration::from_secs(1),
            idle_backoff: Duration::from_secs(10),
            submit_interval: Duration::from_secs(2),
            max_submit_attempts: 3,
            buffer_capacity: 100,
            max_concurrent_batches: 2,
            batch_workers: 8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub coordinator: CoordinatorConfig,
    pub executor: ExecutorConfig,
    pub monitor: MonitorConfig,
    pub pipeline: PipelineConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_config_default() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.url, "http://127.0.0.1:5000");
        assert_eq!(cfg.description, "unnamed drover agent");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(10));
    }

    #[test]
    fn executor_config_default() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.command_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_output_bytes, 65536);
    }

    #[test]
    fn monitor_config_default() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.max_cpu_percent, 90.0);
        assert_eq!(cfg.max_memory_percent, 90.0);
        assert_eq!(cfg.check_interval, Duration::from_secs(5));
    }

    #[test]
    fn pipeline_config_default() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.fetch_interval, Duration::from_secs(1));
        assert_eq!(cfg.idle_backoff, Duration::from_secs(10));
        assert_eq!(cfg.submit_interval, Duration::from_secs(2));
        assert_eq!(cfg.max_submit_attempts, 3);
        assert_eq!(cfg.buffer_capacity, 100);
        assert_eq!(cfg.max_concurrent_batches, 2);
        assert_eq!(cfg.batch_workers, 8);
    }
}
