use std::time::Duration;

use sysinfo::System;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;

/// Window over which host CPU usage is measured.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// One host reading, both values in percent.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Source of host readings, swappable in tests.
#[allow(async_fn_in_trait)]
pub trait ResourceSampler {
    async fn sample(&mut self) -> ResourceSample;
}

/// Samples the real host via sysinfo.
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SystemSampler {
    async fn sample(&mut self) -> ResourceSample {
        // CPU usage is the delta between two refreshes over the window.
        self.system.refresh_cpu_usage();
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let total = self.system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total as f64 * 100.0
        };

        ResourceSample {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            memory_percent,
        }
    }
}

/// Watches host CPU and memory against configured ceilings.
///
/// The first sample over either ceiling cancels the stop token and ends
/// the watch; the agent is expected to wind down rather than keep
/// competing with whatever is loading the host.
pub struct ResourceMonitor<S> {
    config: MonitorConfig,
    sampler: S,
}

impl<S: ResourceSampler> ResourceMonitor<S> {
    pub fn new(config: MonitorConfig, sampler: S) -> Self {
        Self { config, sampler }
    }

    pub async fn run(mut self, stop: CancellationToken) {
        loop {
            if stop.is_cancelled() {
                return;
            }

            let sample = self.sampler.sample().await;
            tracing::debug!(
                cpu_percent = sample.cpu_percent,
                memory_percent = sample.memory_percent,
                "Host resource sample"
            );

            if sample.cpu_percent > self.config.max_cpu_percent
                || sample.memory_percent > self.config.max_memory_percent
            {
                tracing::warn!(
                    cpu_percent = sample.cpu_percent,
                    memory_percent = sample.memory_percent,
                    max_cpu_percent = self.config.max_cpu_percent,
                    max_memory_percent = self.config.max_memory_percent,
                    "Host resource usage over ceiling, stopping agent"
                );
                stop.cancel();
                return;
            }

            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(self.config.check_interval) => {}
            }
        }
    }
}
