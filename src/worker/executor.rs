use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::pipeline::item::{escape_line_endings, truncate_output, ExecutionResult, WorkItem};

/// Grace period after SIGTERM before the leader is killed outright.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs work items as shell commands with a wall-clock budget.
///
/// Every execution produces a result; failures, timeouts and spawn errors
/// are folded into an unsuccessful result rather than surfaced as errors.
/// The only items that produce nothing are ones rejected at entry, either
/// because the stop signal already fired or because the item is missing
/// its id or command.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub async fn execute(
        &self,
        item: &WorkItem,
        stop: &CancellationToken,
    ) -> Option<ExecutionResult> {
        if stop.is_cancelled() {
            return None;
        }
        if !item.is_valid() {
            tracing::error!(item_id = %item.id, "Work item missing id or command, skipping");
            return None;
        }

        tracing::info!(item_id = %item.id, command = %item.command, "Executing command");

        let started = Instant::now();
        let rss_before = current_rss_mb();

        let (success, output) = self.run_command(&item.command).await;

        let duration = started.elapsed();
        let memory_delta_mb = current_rss_mb() - rss_before;

        tracing::info!(
            item_id = %item.id,
            success,
            duration_secs = duration.as_secs_f64(),
            "Command finished"
        );

        Some(ExecutionResult {
            item_id: item.id.clone(),
            command: item.command.clone(),
            duration_secs: duration.as_secs_f64(),
            output,
            memory_delta_mb,
            success,
            completed_at: Utc::now(),
        })
    }

    /// Spawn the command under `sh -c` in its own process group and wait for
    /// it, killing the whole group once the timeout elapses.
    async fn run_command(&self, command: &str) -> (bool, String) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return (false, format!("spawn failed: {}", e)),
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        // Both pipes are drained while waiting so a chatty child cannot
        // fill a pipe buffer and wedge.
        tokio::select! {
            (status, stdout, stderr) = async {
                let stdout_fut = async {
                    let mut buf = Vec::new();
                    if let Some(ref mut pipe) = stdout_pipe {
                        let _ = pipe.read_to_end(&mut buf).await;
                    }
                    buf
                };
                let stderr_fut = async {
                    let mut buf = Vec::new();
                    if let Some(ref mut pipe) = stderr_pipe {
                        let _ = pipe.read_to_end(&mut buf).await;
                    }
                    buf
                };
                tokio::join!(child.wait(), stdout_fut, stderr_fut)
            } => {
                match status {
                    Ok(status) => {
                        let success = status.success();
                        let raw = if success { stdout } else { stderr };
                        (success, self.prepare_output(&raw))
                    }
                    Err(e) => (false, format!("wait failed: {}", e)),
                }
            }
            _ = tokio::time::sleep(self.config.command_timeout) => {
                self.terminate(&mut child).await;
                (false, format!("command timed out after {:?}", self.config.command_timeout))
            }
        }
    }

    fn prepare_output(&self, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        let escaped = escape_line_endings(&text);
        truncate_output(escaped, self.config.max_output_bytes)
    }

    /// SIGTERM the whole process group so children spawned by the shell die
    /// with it, then kill the leader if it lingers past the grace period.
    #[cfg(unix)]
    async fn terminate(&self, child: &mut Child) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(pid, error = %e, "Failed to signal process group");
            }
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&self, child: &mut Child) {
        let _ = child.kill().await;
    }
}

/// Resident set size of the agent process in MB, 0.0 when unreadable.
fn current_rss_mb() -> f64 {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(_) => return 0.0,
    };
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system
        .process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0)
}
