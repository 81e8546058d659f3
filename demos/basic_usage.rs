// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic widget-engine usage example.
//!
//! Demonstrates:
//! 1. Configuring the engine against a scripted mock backend
//! 2. Initial sync and the eligible survey set
//! 3. A full survey session: display, answers, finish
//! 4. How the eligibility filter reacts to the new display history
//! 5. Displaying collected metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;

use widget_engine::backend::mock::sync_payload;
use widget_engine::{
    DeliveryEvents, DisplayOption, InMemoryStorage, MockBackend, ResponseUpdate, Survey,
    WidgetEngine, WidgetEngineConfig,
};

struct PrintEvents;

impl DeliveryEvents for PrintEvents {
    fn response_sending_failed(&self) {
        println!("  ✗ response delivery failed - showing retry affordance");
    }

    fn response_sending_finished(&self) {
        println!("  ✓ response durably delivered - survey closed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for inspection)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    // Simple logging (no filter for simplicity)
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           widget-engine: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and boot the engine
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring widget-engine...");

    let backend = Arc::new(MockBackend::new());
    let mut nps = Survey::new("survey-nps", "Quarterly NPS", DisplayOption::DisplayOnce);
    nps.recontact_days = Some(7);
    let churn = Survey::new("survey-churn", "Churn interview", DisplayOption::RespondMultiple);
    backend.set_sync_payload(sync_payload(vec![nps, churn]));

    let config = WidgetEngineConfig::new("https://app.example.com", "env-demo");
    let engine = WidgetEngine::new(config, backend.clone(), Arc::new(InMemoryStorage::new()))?;

    engine.setup().await?;
    println!("   Synced. Eligible surveys:");
    for survey in engine.eligible_surveys() {
        println!("   • {} ({})", survey.name, survey.id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Run one survey session
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📋 Showing \"Quarterly NPS\"...");

    let survey = engine.eligible_surveys().remove(0);
    let session = engine.begin_survey(&survey, Arc::new(PrintEvents))?;
    session.register_display().await?;

    session
        .submit_response(ResponseUpdate {
            data: HashMap::from([("q-score".to_string(), json!(9))]),
            ttc: HashMap::from([("q-score".to_string(), 3.2)]),
            finished: false,
        })
        .await?;
    session
        .submit_response(ResponseUpdate {
            data: HashMap::from([("q-why".to_string(), json!("love the product"))]),
            ttc: HashMap::from([("q-why".to_string(), 8.7)]),
            finished: true,
        })
        .await?;

    // Give the eager delivery queue a beat to drain.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.close().await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. The display history now filters the shown survey out
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Eligible surveys after the session:");
    for survey in engine.eligible_surveys() {
        println!("   • {} ({})", survey.name, survey.id);
    }
    println!(
        "   (\"Quarterly NPS\" is displayOnce and was just shown, so only the\n    churn interview remains)"
    );

    println!("\n📡 Backend calls recorded by the mock:");
    println!("   displays created:  {}", backend.display_creates().len());
    println!("   responses created: {}", backend.response_creates().len());
    println!("   response updates:  {}", backend.response_updates().len());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Metrics snapshot
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    let snapshot = snapshotter.snapshot();
    for (key, _, _, value) in snapshot.into_vec() {
        println!("   {} = {:?}", key.key().name(), value);
    }

    println!("\n✅ Done");
    Ok(())
}
