use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use testomatio_core::api::{Endpoint, MockApi};
use testomatio_core::listener::{ImportListener, ReportListener, RunReport};
use testomatio_core::source::RobotFileRewriter;
use testomatio_core::sync::SyncOutcome;
use testomatio_core::{Config, HostEvent, ImportOptions, RetryPolicy};

fn events(lines: &[serde_json::Value]) -> Vec<HostEvent> {
    lines
        .iter()
        .filter_map(|line| HostEvent::from_json_line(&line.to_string()).unwrap())
        .collect()
}

async fn replay_import(listener: &mut ImportListener, events: &[HostEvent]) -> Option<SyncOutcome> {
    let mut outcome = None;
    for event in events {
        if let Some(done) = listener.handle(event).await.unwrap() {
            outcome = Some(done);
        }
    }
    outcome
}

async fn replay_report(listener: &mut ReportListener, events: &[HostEvent]) -> Option<RunReport> {
    let mut report = None;
    for event in events {
        if let Some(done) = listener.handle(event).await {
            report = Some(done);
        }
    }
    report
}

fn report_listener(api: &Arc<MockApi>) -> ReportListener {
    ReportListener::new(api.clone(), &Config::default(), RetryPolicy::immediate(2))
}

#[tokio::test]
async fn test_import_replay_rewrites_suite_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("login.robot");
    fs::write(
        &path,
        "*** Test Cases ***\nValid Login\n    Open Browser\n\nInvalid Login @Taaaa1111\n    Open Browser\n",
    )
    .unwrap();

    let api = Arc::new(
        MockApi::new()
            .with_remote_test("Login#Invalid Login", &"@Taaaa1111".parse().unwrap())
            .with_issued_ids(["0badcafe"]),
    );
    let mut listener = ImportListener::new(
        api.clone(),
        Arc::new(RobotFileRewriter),
        ImportOptions::default(),
        &Config::default(),
    )
    .unwrap();

    let stream = events(&[
        json!({"event": "suite_start", "name": "Login", "source": path}),
        json!({"event": "test_start", "name": "Valid Login"}),
        json!({"event": "test_end", "name": "Valid Login", "status": "SKIP"}),
        json!({"event": "test_start", "name": "Invalid Login @Taaaa1111"}),
        json!({"event": "test_end", "name": "Invalid Login @Taaaa1111", "status": "SKIP"}),
        json!({"event": "suite_end", "name": "Login"}),
        json!({"event": "run_end"}),
    ]);
    let outcome = replay_import(&mut listener, &stream).await.unwrap();

    assert_eq!(outcome.summary.created, 1);
    assert_eq!(outcome.summary.matched, 1);
    assert_eq!(api.count(Endpoint::Load), 1);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("Valid Login @T0badcafe\n"));
    assert!(content.contains("Invalid Login @Taaaa1111\n"));
}

#[tokio::test]
async fn test_import_tolerates_out_of_order_events() {
    let api = Arc::new(MockApi::new());
    let mut listener = ImportListener::new(
        api.clone(),
        Arc::new(testomatio_core::source::DryRunRewriter),
        ImportOptions::default(),
        &Config::default(),
    )
    .unwrap();

    let stream = events(&[
        json!({"event": "test_end", "name": "Orphan", "status": "SKIP"}),
        json!({"event": "suite_end", "name": "Never Started"}),
        json!({"event": "suite_start", "name": "Math"}),
        json!({"event": "test_end", "name": "Test Addition", "status": "SKIP"}),
        json!({"event": "run_end"}),
        json!({"event": "run_end"}),
    ]);
    let outcome = replay_import(&mut listener, &stream).await.unwrap();

    assert_eq!(outcome.plan.assigns().count(), 2);
    assert_eq!(api.count(Endpoint::Load), 1);
    let load = api.last_load().unwrap();
    assert!(load.tests[0].suites.is_empty());
    assert_eq!(load.tests[1].suites, vec!["Math"]);
}

#[tokio::test]
async fn test_import_remove_ids_strips_without_sync() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("math.robot");
    fs::write(&path, "*** Test Cases ***\nTest Addition @Taaaa1111\n    Log    1\n").unwrap();

    let api = Arc::new(MockApi::new());
    let options = ImportOptions {
        remove_ids: true,
        ..ImportOptions::default()
    };
    let mut listener =
        ImportListener::new(api.clone(), Arc::new(RobotFileRewriter), options, &Config::default()).unwrap();

    let stream = events(&[
        json!({"event": "suite_start", "name": "Math", "source": path}),
        json!({"event": "test_end", "name": "Test Addition @Taaaa1111", "status": "SKIP"}),
        json!({"event": "suite_end", "name": "Math"}),
        json!({"event": "run_end"}),
    ]);
    assert!(replay_import(&mut listener, &stream).await.is_none());
    assert!(api.calls().is_empty());
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "*** Test Cases ***\nTest Addition\n    Log    1\n"
    );
}

#[tokio::test]
async fn test_report_replay_delivers_results() {
    let api = Arc::new(MockApi::new());
    let mut listener = report_listener(&api);

    let stream = events(&[
        json!({"event": "suite_start", "name": "Math", "source": "tests/math.robot"}),
        json!({"event": "test_start", "name": "Test Addition @T96c700e6"}),
        json!({"event": "test_end", "name": "Test Addition @T96c700e6", "status": "PASS", "duration_ms": 4.0}),
        json!({"event": "test_end", "name": "Broken", "status": "FAIL", "message": "1 != 2", "tags": ["smoke"]}),
        json!({"event": "suite_end", "name": "Math"}),
        json!({"event": "suite_end", "name": "Unknown"}),
        json!({"event": "run_end"}),
    ]);
    let report = replay_report(&mut listener, &stream).await.unwrap();

    assert_eq!(report.run_id.as_deref(), Some("run00001"));
    assert_eq!(report.delivery.delivered_records(), 2);

    let uploads = api.upload_attempts();
    assert_eq!(uploads.len(), 1);
    let [passed, failed] = &uploads[0].tests[..] else {
        panic!("expected two results, got {:?}", uploads[0].tests);
    };
    assert_eq!(passed.test_id.as_deref(), Some("96c700e6"));
    assert_eq!(passed.title, "Test Addition");
    assert_eq!(passed.status, "passed");
    assert_eq!(passed.file.as_deref(), Some("math.robot"));
    assert_eq!(failed.test_id, None);
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.message.as_deref(), Some("1 != 2"));
    assert_eq!(failed.tags, vec!["smoke"]);
    assert_eq!(api.count(Endpoint::FinishRun), 1);
}

#[tokio::test]
async fn test_report_suite_without_tests_creates_no_run() {
    let api = Arc::new(MockApi::new());
    let mut listener = report_listener(&api);

    let stream = events(&[
        json!({"event": "suite_start", "name": "Empty"}),
        json!({"event": "suite_end", "name": "Empty"}),
        json!({"event": "run_end"}),
    ]);
    let report = replay_report(&mut listener, &stream).await.unwrap();

    assert!(report.run_id.is_none());
    assert!(report.delivery.batches.is_empty());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_report_results_after_run_end_are_ignored() {
    let api = Arc::new(MockApi::new());
    let mut listener = report_listener(&api);

    let stream = events(&[
        json!({"event": "test_end", "name": "First", "status": "PASS"}),
        json!({"event": "run_end"}),
        json!({"event": "test_end", "name": "Late", "status": "PASS"}),
        json!({"event": "run_end"}),
    ]);
    let report = replay_report(&mut listener, &stream).await.unwrap();

    assert_eq!(report.delivery.delivered_records(), 1);
    assert_eq!(api.count(Endpoint::UploadBatch), 1);
    assert_eq!(api.count(Endpoint::FinishRun), 1);
    assert!(!listener.is_enabled());
}

#[test]
fn test_event_stream_file_parses() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.jsonl");
    fs::write(
        &path,
        "{\"event\":\"suite_start\",\"name\":\"Math\"}\n\n{\"event\":\"run_end\"}\n",
    )
    .unwrap();

    let parsed: Vec<HostEvent> = fs::read_to_string(Path::new(&path))
        .unwrap()
        .lines()
        .filter_map(|line| HostEvent::from_json_line(line).unwrap())
        .collect();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1], HostEvent::RunEnd);
}
