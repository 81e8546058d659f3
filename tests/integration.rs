//! Integration Tests for Widget Engine
//!
//! End-to-end flows over the scripted [`MockBackend`], no live backend
//! required, which keeps these tests deterministic and fast.
//!
//! # Test Organization
//! - `happy_*` - Normal operation: setup, display, respond, finish, reload
//! - `failure_*` - Failure scenarios: delivery halt and recovery, sync
//!   errors, display-create failure

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use widget_engine::backend::mock::sync_payload;
use widget_engine::{
    filter_eligible_surveys, DeliveryEvents, Display, DisplayOption, FileUpload, InMemoryStorage,
    MockBackend, ResponseUpdate, Survey, WidgetEngine, WidgetEngineConfig, WidgetError,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct RecordingEvents {
    failed: AtomicUsize,
    finished: AtomicUsize,
}

impl DeliveryEvents for RecordingEvents {
    fn response_sending_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn response_sending_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn answer(question: &str, value: &str, finished: bool) -> ResponseUpdate {
    ResponseUpdate {
        data: HashMap::from([(question.to_string(), json!(value))]),
        ttc: HashMap::from([(question.to_string(), 2.0)]),
        finished,
    }
}

fn anonymous_engine(backend: Arc<MockBackend>, storage: Arc<InMemoryStorage>) -> WidgetEngine {
    let config = WidgetEngineConfig::new("https://app.example.com", "env-1");
    WidgetEngine::new(config, backend, storage).expect("engine construction")
}

/// Poll until `condition` holds; the spawned delivery task needs a few
/// scheduler turns to drain.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            // One extra beat lets event callbacks finish.
            tokio::time::sleep(Duration::from_millis(5)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition did not become true in time");
}

// =============================================================================
// Happy Path Tests - Normal Operation
// =============================================================================

#[tokio::test]
async fn happy_anonymous_survey_lifecycle() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "Churn survey",
        DisplayOption::DisplayOnce,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));

    engine.setup().await.unwrap();
    let surveys = engine.eligible_surveys();
    assert_eq!(surveys.len(), 1);

    let events = Arc::new(RecordingEvents::default());
    let session = engine.begin_survey(&surveys[0], events.clone()).unwrap();

    // Showing the survey records a local display and a backend display.
    session.register_display().await.unwrap();
    assert_eq!(backend.display_creates().len(), 1);
    let displays = engine.state().unwrap().displays.unwrap();
    assert_eq!(displays.len(), 1);
    assert!(!displays[0].responded);

    // A displayOnce survey disappears from the eligible set immediately.
    assert!(engine.eligible_surveys().is_empty());

    // First answer flips the local display to responded.
    session.submit_response(answer("q1", "yes", false)).await.unwrap();
    let displays = engine.state().unwrap().displays.unwrap();
    assert!(displays[0].responded);

    // Finishing the survey emits exactly one finished event.
    session.submit_response(answer("q2", "done", true)).await.unwrap();
    {
        let events = events.clone();
        wait_for(move || events.finished.load(Ordering::SeqCst) == 1).await;
    }
    assert_eq!(events.failed.load(Ordering::SeqCst), 0);

    // Exactly one backend response record for the whole session.
    assert_eq!(backend.response_creates().len(), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn happy_display_history_survives_reload() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "Churn survey",
        DisplayOption::DisplayOnce,
    )]));
    let storage = Arc::new(InMemoryStorage::new());

    {
        let engine = anonymous_engine(backend.clone(), storage.clone());
        engine.setup().await.unwrap();
        let surveys = engine.eligible_surveys();
        let session = engine
            .begin_survey(&surveys[0], Arc::new(RecordingEvents::default()))
            .unwrap();
        session.register_display().await.unwrap();
        session.close().await.unwrap();
    }

    // "Page reload": same storage, new engine. The local display history
    // must survive and keep the survey filtered out even after a re-sync.
    let engine = anonymous_engine(backend.clone(), storage);
    engine.setup().await.unwrap();
    engine.sync(true).await.unwrap();

    let state = engine.state().unwrap();
    assert_eq!(state.displays.as_ref().unwrap().len(), 1);
    assert!(engine.eligible_surveys().is_empty());
}

#[tokio::test]
async fn happy_identified_close_resyncs_with_no_cache() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "CSAT",
        DisplayOption::RespondMultiple,
    )]));
    let storage = Arc::new(InMemoryStorage::new());
    let config =
        WidgetEngineConfig::new("https://app.example.com", "env-1").with_user_id("user-7");
    let engine = WidgetEngine::new(config, backend.clone(), storage).unwrap();

    engine.setup().await.unwrap();
    // Identified sessions keep no local display history.
    assert!(engine.state().unwrap().displays.is_none());

    let surveys = engine.eligible_surveys();
    let events = Arc::new(RecordingEvents::default());
    let session = engine.begin_survey(&surveys[0], events).unwrap();
    session.register_display().await.unwrap();
    session.submit_response(answer("q1", "great", false)).await.unwrap();
    {
        let backend = backend.clone();
        wait_for(move || !backend.response_creates().is_empty()).await;
    }

    // The first answer also marks the display responded backend-side.
    assert_eq!(backend.responded_displays().len(), 1);
    // The response carries the resolved user id.
    assert_eq!(
        backend.response_creates()[0].user_id.as_deref(),
        Some("user-7")
    );

    let before = backend.no_cache_syncs();
    session.close().await.unwrap();
    assert_eq!(backend.no_cache_syncs(), before + 1);
}

#[tokio::test]
async fn happy_file_upload_returns_reference() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "Feedback",
        DisplayOption::RespondMultiple,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();

    let surveys = engine.eligible_surveys();
    let session = engine
        .begin_survey(&surveys[0], Arc::new(RecordingEvents::default()))
        .unwrap();

    let url = session
        .upload_file(&FileUpload {
            file_name: "screenshot.png".to_string(),
            file_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        })
        .await
        .unwrap();
    assert_eq!(url, "mock://storage/screenshot.png");
    assert_eq!(backend.uploads(), vec!["screenshot.png".to_string()]);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn failure_delivery_halts_then_recovers_on_retry() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "NPS",
        DisplayOption::RespondMultiple,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();

    let surveys = engine.eligible_surveys();
    let events = Arc::new(RecordingEvents::default());
    let session = engine.begin_survey(&surveys[0], events.clone()).unwrap();
    session.register_display().await.unwrap();

    // Retry bound is 2: both attempts fail, the failed event fires exactly
    // once, and the payload is preserved for a later retry.
    backend.fail_next_responses(2);
    session.submit_response(answer("q1", "lost?", true)).await.unwrap();
    {
        let events = events.clone();
        wait_for(move || events.failed.load(Ordering::SeqCst) == 1).await;
    }
    assert!(session.is_delivery_halted());
    assert_eq!(events.failed.load(Ordering::SeqCst), 1);
    assert_eq!(events.finished.load(Ordering::SeqCst), 0);
    assert!(backend.response_creates().is_empty());

    // Host-triggered retry against a healthy backend succeeds and finishes
    // the session.
    session.retry_delivery();
    {
        let events = events.clone();
        wait_for(move || events.finished.load(Ordering::SeqCst) == 1).await;
    }
    assert_eq!(backend.response_creates().len(), 1);
    assert_eq!(events.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_display_create_error_propagates() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "NPS",
        DisplayOption::RespondMultiple,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();

    let surveys = engine.eligible_surveys();
    let session = engine
        .begin_survey(&surveys[0], Arc::new(RecordingEvents::default()))
        .unwrap();

    backend.fail_next_displays(1);
    let err = session.register_display().await.unwrap_err();
    assert!(matches!(err, WidgetError::Network(_)));
}

#[tokio::test]
async fn failure_sync_error_keeps_cached_state() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "NPS",
        DisplayOption::RespondMultiple,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();
    let before = engine.state().unwrap();

    backend.fail_next_syncs(1);
    let err = engine.sync(false).await.unwrap_err();
    assert!(matches!(err, WidgetError::Network(_)));
    assert_eq!(engine.state().unwrap(), before);
}

#[tokio::test]
async fn failure_empty_eligible_set_is_not_an_error() {
    let backend = Arc::new(MockBackend::new());
    backend.set_sync_payload(sync_payload(vec![Survey::new(
        "s1",
        "NPS",
        DisplayOption::DisplayOnce,
    )]));
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();

    // Show the survey once; every later sync filters it to an empty set
    // without erroring.
    let surveys = engine.eligible_surveys();
    let session = engine
        .begin_survey(&surveys[0], Arc::new(RecordingEvents::default()))
        .unwrap();
    session.register_display().await.unwrap();
    session.close().await.unwrap();

    engine.sync(false).await.unwrap();
    assert!(engine.eligible_surveys().is_empty());
}

#[tokio::test]
async fn failure_recontact_window_reopens_after_enough_days() {
    // Drive the recontact scenario through engine state: a display 3 days
    // ago blocks the survey under a 7-day product policy; an 8-day-old one
    // does not.
    let backend = Arc::new(MockBackend::new());
    let mut payload = sync_payload(vec![Survey::new(
        "s1",
        "NPS",
        DisplayOption::RespondMultiple,
    )]);
    payload.product.recontact_days = Some(7);
    backend.set_sync_payload(payload);
    let engine = anonymous_engine(backend.clone(), Arc::new(InMemoryStorage::new()));
    engine.setup().await.unwrap();

    let with_display_age = |days: i64| {
        let mut state = engine.state().unwrap();
        state.displays = Some(vec![Display {
            created_at: chrono::Utc::now() - chrono::Duration::days(days),
            survey_id: "other".to_string(),
            responded: false,
        }]);
        state
    };

    let filtered = filter_eligible_surveys(with_display_age(3), chrono::Utc::now()).unwrap();
    assert!(filtered.surveys.is_empty());

    let filtered = filter_eligible_surveys(with_display_age(8), chrono::Utc::now()).unwrap();
    assert_eq!(filtered.surveys.len(), 1);
}
