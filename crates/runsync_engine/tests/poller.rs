use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use runsync_engine::{
    BackendSettings, EngineEvent, EngineHandle, ReqwestBackend, RunBackend, StatusReply,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INTERVAL: Duration = Duration::from_millis(20);

fn engine_for(server: &MockServer) -> (EngineHandle, UnboundedReceiver<EngineEvent>) {
    let backend: Arc<dyn RunBackend> = Arc::new(
        ReqwestBackend::new(BackendSettings {
            base_url: server.uri(),
            ..BackendSettings::default()
        })
        .expect("backend"),
    );
    EngineHandle::new(backend, INTERVAL)
}

async fn next_status(events: &mut UnboundedReceiver<EngineEvent>) -> (String, u64, StatusReply) {
    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before timeout")
        .expect("channel open");
    match event {
        EngineEvent::StatusChecked {
            run_id,
            generation,
            result,
        } => (run_id, generation, result.expect("status reply")),
        other => panic!("unexpected event {other:?}"),
    }
}

async fn status_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.method.as_str() == "GET")
        .count()
}

#[tokio::test]
async fn polls_until_completion_then_stops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agent-runs/r1"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "customStatus": {"progress": 0.25, "message": "planning"}
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/agent-runs/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "# Report"})))
        .mount(&server)
        .await;

    let (mut engine, mut events) = engine_for(&server);
    engine.start_polling("r1".to_string(), 7);

    let codes = [
        next_status(&mut events).await,
        next_status(&mut events).await,
        next_status(&mut events).await,
    ]
    .map(|(run_id, generation, reply)| {
        assert_eq!(run_id, "r1");
        assert_eq!(generation, 7);
        reply.code
    });
    assert_eq!(codes, [202, 202, 200]);

    tokio::time::sleep(INTERVAL * 5).await;
    assert!(!engine.is_polling());
    assert_eq!(status_requests(&server).await, 3);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unexpected_status_ends_the_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agent-runs/r1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (mut engine, mut events) = engine_for(&server);
    engine.start_polling("r1".to_string(), 1);

    let (_, _, reply) = next_status(&mut events).await;
    assert_eq!(reply.code, 500);

    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(status_requests(&server).await, 1);
}

#[tokio::test]
async fn stopping_discards_the_in_flight_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agent-runs/r1"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({"customStatus": {"progress": 0.5}})),
        )
        .mount(&server)
        .await;

    let (mut engine, mut events) = engine_for(&server);
    engine.start_polling("r1".to_string(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop_polling(1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_err());
    assert!(!engine.is_polling());
    assert_eq!(status_requests(&server).await, 1);
}

#[tokio::test]
async fn stop_for_an_older_generation_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agent-runs/r2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "x"})))
        .mount(&server)
        .await;

    let (mut engine, mut events) = engine_for(&server);
    engine.start_polling("r1".to_string(), 1);
    engine.start_polling("r2".to_string(), 2);
    engine.stop_polling(1);

    let (run_id, generation, reply) = next_status(&mut events).await;
    assert_eq!((run_id.as_str(), generation, reply.code), ("r2", 2, 200));
}

#[tokio::test]
async fn feedback_results_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/agent-runs/r1/human-feedback"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let (engine, mut events) = engine_for(&server);
    engine.send_feedback("r1".to_string(), runsync_core::FeedbackAction::Continue);

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        EngineEvent::FeedbackCompleted {
            run_id: "r1".to_string(),
            action: runsync_core::FeedbackAction::Continue,
            result: Ok(()),
        }
    );
}
