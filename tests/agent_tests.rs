
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use drover::agent::Agent;
use drover::config::{
    AgentConfig, CoordinatorConfig, ExecutorConfig, MonitorConfig, PipelineConfig,
};
use drover::pipeline::WorkItem;
use test_harness::{assert_eventually, wait_for, StubCoordinator};

fn item(id: &str, command: &str) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        command: command.to_string(),
    }
}

// Ceilings sit far above anything the host can report so the monitor
// never trips mid-test, and the long check interval keeps it quiet.
fn test_config(url: String) -> AgentConfig {
    AgentConfig {
        coordinator: CoordinatorConfig {
            url,
            description: "test agent".to_string(),
            request_timeout: Duration::from_secs(2),
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        },
        executor: ExecutorConfig {
            command_timeout: Duration::from_secs(5),
            max_output_bytes: 4096,
        },
        monitor: MonitorConfig {
            max_cpu_percent: 150.0,
            max_memory_percent: 150.0,
            check_interval: Duration::from_secs(60),
        },
        pipeline: PipelineConfig {
            batch_size: 10,
            fetch_interval: Duration::from_millis(20),
            idle_backoff: Duration::from_millis(100),
            submit_interval: Duration::from_millis(50),
            max_submit_attempts: 3,
            buffer_capacity: 100,
            max_concurrent_batches: 2,
            batch_workers: 4,
        },
    }
}

#[tokio::test]
async fn test_agent_executes_and_reports_end_to_end() {
    let stub = StubCoordinator::new();
    let url = stub.serve().await;
    stub.push_batch(vec![item("1", "echo alpha"), item("2", "echo beta")])
        .await;

    let agent = Agent::new(test_config(url)).unwrap();
    let stop = CancellationToken::new();
    let handle = tokio::spawn(agent.run(stop.clone()));

    assert_eventually(
        || async { stub.uploads().await.len() == 2 },
        Duration::from_secs(10),
        "both results reach the coordinator",
    )
    .await;

    let mut uploads = stub.uploads().await;
    uploads.sort_by(|a, b| a.command_id.cmp(&b.command_id));
    assert_eq!(uploads[0].command_id, "1");
    assert_eq!(uploads[0].output, "alpha\\n");
    assert_eq!(uploads[1].command_id, "2");
    assert_eq!(uploads[1].output, "beta\\n");
    for upload in &uploads {
        assert_eq!(upload.client_description, "test agent");
        assert!(upload.execution_time >= 0.0);
    }

    stop.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("agent should wind down after cancel")
        .unwrap();
}

#[tokio::test]
async fn test_agent_processes_batches_across_fetch_cycles() {
    let stub = StubCoordinator::new();
    let url = stub.serve().await;
    stub.push_batch(vec![item("1", "echo one"), item("2", "echo two")])
        .await;
    stub.push_batch(vec![item("3", "echo three")]).await;

    let agent = Agent::new(test_config(url)).unwrap();
    let stop = CancellationToken::new();
    let handle = tokio::spawn(agent.run(stop.clone()));

    assert_eventually(
        || async { stub.uploads().await.len() == 3 },
        Duration::from_secs(10),
        "results from both fetch cycles are delivered",
    )
    .await;

    let mut ids: Vec<String> = stub
        .uploads()
        .await
        .iter()
        .map(|u| u.command_id.clone())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3"]);

    stop.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("agent should wind down after cancel")
        .unwrap();
}

#[tokio::test]
async fn test_agent_delivers_results_finished_during_wind_down() {
    let stub = StubCoordinator::new();
    let url = stub.serve().await;
    stub.push_batch(vec![item("1", "sleep 0.3 && echo done")])
        .await;

    let agent = Agent::new(test_config(url)).unwrap();
    let stop = CancellationToken::new();
    let handle = tokio::spawn(agent.run(stop.clone()));

    // Cancel while the command is still sleeping. The scheduler waits for
    // it, and the final flush carries its result out.
    let fetched = wait_for(
        || async { stub.fetch_requests() >= 1 },
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .await;
    assert!(fetched);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("agent should wind down after cancel")
        .unwrap();

    let uploads = stub.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].command_id, "1");
    assert!(uploads[0].output.contains("done"));
}
