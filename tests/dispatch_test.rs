//! End-to-end scenarios against the server facade.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use jobgrid::config::Config;
use jobgrid::handler::LifecycleState;
use jobgrid::jobs::{ClientInfo, JobResult, JobScriptInfo};
use jobgrid::packages::PackageInfo;
use jobgrid::server::Server;
use jobgrid::sources::SourceRegistry;

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.packages_path = dir.path().join("packages");
    config.dispatch.queue_low_water = 10;
    config
}

fn build_server(dir: &TempDir) -> Server {
    let server = Server::with_sources(test_config(dir), SourceRegistry::with_builtins("p1"))
        .expect("failed to build server");
    register_test_package(&server);
    server
}

fn register_test_package(server: &Server) {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("echo.wasm", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"handler logic").unwrap();
    let archive = writer.finish().unwrap().into_inner();

    let info = PackageInfo {
        name: "p1".to_string(),
        version: "1.0".to_string(),
        handler_files: vec!["echo.wasm".to_string()],
        dependency_files: vec![],
    };
    server.register_package(&info, &archive).unwrap();
}

fn echo_script(limit: u64) -> JobScriptInfo {
    JobScriptInfo {
        package_name: "p1".to_string(),
        job_type: "echo".to_string(),
        settings: json!({"payload": "work", "limit": limit}),
    }
}

fn result(job_id: Uuid, client_id: Uuid, success: bool) -> JobResult {
    JobResult {
        job_id,
        client_id,
        success,
        output: Bytes::from_static(b"done"),
    }
}

fn register_client(server: &Server, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    server.received_client_info(&ClientInfo {
        id,
        name: name.to_string(),
    });
    id
}

#[tokio::test]
async fn echo_scenario_end_to_end() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);

    // Package is visible
    let packages = server.get_registered_packages().unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "p1");

    // New handler comes up stopped and dispatches nothing
    let handler_id = server.add_job_script(&echo_script(10)).unwrap();
    assert_eq!(
        server.get_statistics().handlers[0].state,
        LifecycleState::Stopped
    );
    let client_a = register_client(&server, "worker-a");
    let client_b = register_client(&server, "worker-b");
    assert!(server.get_job(client_a).await.is_none());

    // Start, then two clients pull distinct jobs
    assert!(server.start_job_script(handler_id));
    let j1 = server.get_job(client_a).await.unwrap();
    let j2 = server.get_job(client_b).await.unwrap();
    assert_ne!(j1.id, j2.id);
    assert_eq!(j1.payload, Bytes::from("work"));

    // Client A finishes its job
    assert!(server.receive_result(&result(j1.id, client_a, true)).await);

    let info = server.get_statistics();
    let handler = &info.handlers[0];
    assert_eq!(handler.counters.total_dispatched, 2);
    assert_eq!(handler.counters.total_succeeded, 1);
    assert_eq!(handler.in_progress, 1); // J2 still out

    let a = info.clients.iter().find(|c| c.id == client_a).unwrap();
    assert_eq!(a.total_processed, 1);
    assert_eq!(a.jobs_in_progress, 0);
    let b = info.clients.iter().find(|c| c.id == client_b).unwrap();
    assert_eq!(b.jobs_in_progress, 1);

    // Telemetry and process counters come along with the snapshot
    assert!(info.resources.total_memory_bytes > 0);
    assert_eq!(info.metrics.packages_registered, 1);
    assert_eq!(info.metrics.jobs_dispatched, 2);
    assert_eq!(info.metrics.results_received, 1);
    assert_eq!(info.metrics.results_dropped, 0);
}

#[tokio::test]
async fn handler_job_info_and_file_fetch() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(1)).unwrap();

    let info = server.get_handler_job_info(handler_id).unwrap();
    assert_eq!(info.package_name, "p1");
    assert_eq!(info.handler_files, vec!["echo.wasm".to_string()]);

    let file = server.get_file(handler_id, "echo.wasm").unwrap();
    assert_eq!(file, b"handler logic");
    assert!(server.get_file(handler_id, "missing.bin").is_err());
}

#[tokio::test]
async fn unknown_result_changes_no_counters() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(5)).unwrap();
    server.start_job_script(handler_id);
    let client = register_client(&server, "worker");

    let accepted = server
        .receive_result(&result(Uuid::now_v7(), client, true))
        .await;
    assert!(!accepted);

    let info = server.get_statistics();
    assert_eq!(info.handlers[0].counters.total_succeeded, 0);
    assert_eq!(info.metrics.results_dropped, 1);
    let snapshot = info.clients.iter().find(|c| c.id == client).unwrap();
    assert_eq!(snapshot.total_processed, 0);
}

#[tokio::test]
async fn failed_result_counts_against_client_and_handler() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(5)).unwrap();
    server.start_job_script(handler_id);
    let client = register_client(&server, "worker");

    let job = server.get_job(client).await.unwrap();
    assert!(server.receive_result(&result(job.id, client, false)).await);

    let info = server.get_statistics();
    assert_eq!(info.handlers[0].counters.total_failed, 1);
    let snapshot = info.clients.iter().find(|c| c.id == client).unwrap();
    assert_eq!(snapshot.total_failed, 1);
    assert_eq!(snapshot.jobs_in_progress, 0);
}

#[tokio::test]
async fn disable_enable_restores_prior_state_and_queue() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(10)).unwrap();
    let client = register_client(&server, "worker");

    server.start_job_script(handler_id);
    server.get_job(client).await.unwrap();
    let pending_before = server.get_statistics().handlers[0].pending;
    assert!(pending_before > 0);

    // Disabled handlers are excluded from dispatch
    assert!(server.disable_job_script(handler_id));
    assert_eq!(
        server.get_statistics().handlers[0].state,
        LifecycleState::Disabled
    );
    assert!(server.get_job(client).await.is_none());
    // Disabling twice is an invalid transition
    assert!(!server.disable_job_script(handler_id));

    // Enable restores Running with the queue intact
    assert!(server.enable_job_script(handler_id));
    let info = server.get_statistics();
    let stats = &info.handlers[0];
    assert_eq!(stats.state, LifecycleState::Running);
    assert_eq!(stats.pending, pending_before);
    assert!(server.get_job(client).await.is_some());

    // Paused handlers come back paused
    server.pause_job_script(handler_id);
    server.disable_job_script(handler_id);
    server.enable_job_script(handler_id);
    assert_eq!(
        server.get_statistics().handlers[0].state,
        LifecycleState::Paused
    );
}

#[tokio::test]
async fn stop_then_start_never_redispatches_old_jobs() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(100)).unwrap();
    let client = register_client(&server, "worker");

    server.start_job_script(handler_id);
    let first = server.get_job(client).await.unwrap();

    assert!(server.stop_job_script(handler_id));
    let info = server.get_statistics();
    let stats = &info.handlers[0];
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.in_progress, 0);

    server.start_job_script(handler_id);
    let second = server.get_job(client).await.unwrap();
    assert_ne!(first.id, second.id);

    // Result for the abandoned job is accepted but ignored for statistics
    assert!(!server.receive_result(&result(first.id, client, true)).await);
    assert_eq!(
        server.get_statistics().handlers[0].counters.total_succeeded,
        0
    );
}

#[tokio::test]
async fn remove_busy_handler_fails_until_stopped() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(5)).unwrap();
    server.start_job_script(handler_id);

    assert!(!server.remove_job_script(handler_id));

    assert!(server.stop_job_script(handler_id));
    assert!(server.remove_job_script(handler_id));
    assert!(server.get_statistics().handlers.is_empty());

    // Further lifecycle commands report failure, not panic
    assert!(!server.start_job_script(handler_id));
}

#[tokio::test(start_paused = true)]
async fn timed_out_job_is_requeued_by_the_sweep() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.dispatch.job_timeout_secs = 0;
    config.dispatch.sweep_interval_secs = 5;

    let server = Arc::new(
        Server::with_sources(config, SourceRegistry::with_builtins("p1")).unwrap(),
    );
    register_test_package(&server);
    let handler_id = server.add_job_script(&echo_script(1)).unwrap();
    server.start_job_script(handler_id);
    server.start();

    let first_client = register_client(&server, "slow-worker");
    let second_client = register_client(&server, "fast-worker");

    let job = server.get_job(first_client).await.unwrap();
    assert!(server.get_job(second_client).await.is_none()); // source has one job

    // Let the sweep fire with a zero timeout
    tokio::time::sleep(std::time::Duration::from_secs(6)).await;

    // Another client picks up the same job id
    let retry = server.get_job(second_client).await.unwrap();
    assert_eq!(retry.id, job.id);

    // The second client resolves it; the slow client's late result is
    // dropped and nothing double-counts.
    assert!(server.receive_result(&result(retry.id, second_client, true)).await);
    assert!(!server.receive_result(&result(job.id, first_client, true)).await);
    assert_eq!(
        server.get_statistics().handlers[0].counters.total_succeeded,
        1
    );

    server.stop();
}

#[tokio::test]
async fn teardown_is_safe_with_outstanding_jobs() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server.add_job_script(&echo_script(10)).unwrap();
    server.start_job_script(handler_id);
    server.start();
    let client = register_client(&server, "worker");

    let job = server.get_job(client).await.unwrap();
    server.stop();

    // In-flight state resolved cleanly: handler stopped, result ignored
    assert_eq!(
        server.get_statistics().handlers[0].state,
        LifecycleState::Stopped
    );
    assert!(server.get_job(client).await.is_none());
    assert!(!server.receive_result(&result(job.id, client, true)).await);
}

#[tokio::test]
async fn finite_source_reports_finished() {
    let dir = TempDir::new().unwrap();
    let server = build_server(&dir);
    let handler_id = server
        .add_job_script(&JobScriptInfo {
            package_name: "p1".to_string(),
            job_type: "sequence".to_string(),
            settings: json!({"count": 2}),
        })
        .unwrap();
    server.start_job_script(handler_id);
    let client = register_client(&server, "worker");

    let j1 = server.get_job(client).await.unwrap();
    let j2 = server.get_job(client).await.unwrap();
    assert!(server.get_job(client).await.is_none());
    assert!(!server.get_statistics().handlers[0].finished);

    server.receive_result(&result(j1.id, client, true)).await;
    server.receive_result(&result(j2.id, client, true)).await;

    let info = server.get_statistics();
    let stats = &info.handlers[0];
    assert!(stats.finished);
    // Finishing is a notification, never an automatic state change
    assert_eq!(stats.state, LifecycleState::Running);
}

#[tokio::test]
async fn concurrent_pulls_dispatch_each_job_exactly_once() {
    use std::collections::HashSet;

    let dir = TempDir::new().unwrap();
    let server = Arc::new(build_server(&dir));
    let handler_id = server
        .add_job_script(&JobScriptInfo {
            package_name: "p1".to_string(),
            job_type: "sequence".to_string(),
            settings: json!({"count": 8}),
        })
        .unwrap();
    server.start_job_script(handler_id);

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let server = Arc::clone(&server);
        tasks.push(tokio::spawn(async move {
            server.get_job(Uuid::new_v4()).await
        }));
    }

    let mut seen = HashSet::new();
    let mut dispatched = 0;
    for task in tasks {
        if let Some(job) = task.await.unwrap() {
            assert!(seen.insert(job.id), "job {} dispatched twice", job.id);
            dispatched += 1;
        }
    }
    assert_eq!(dispatched, 8);
}
