//! # Widget Engine
//!
//! The core of an embeddable in-app survey widget: state synchronization,
//! survey eligibility filtering, and response delivery. Rendering and UI
//! belong to the host application; this crate decides *which* surveys may
//! be shown and makes sure answers reach the backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Host Application                       │
//! │  • Renders surveys, owns the UI thread                     │
//! │  • Receives delivery events (failed / finished)            │
//! └─────────────────────────────────────────────────────────────┘
//!               │ setup / begin_survey / submit_response
//!               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WidgetEngine                          │
//! │  • Sync engine: fetch remote state, merge local display    │
//! │    history, apply eligibility filter, cache atomically     │
//! │  • Expiry refresher: periodic background re-sync           │
//! │  • SurveySession: displays, responses, close               │
//! └─────────────────────────────────────────────────────────────┘
//!               │                                │
//!               ▼                                ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │       ConfigStore         │   │       ResponseQueue         │
//! │  • Atomic whole-snapshot  │   │  • Coalesced pending item   │
//! │    replace                │   │  • Eager delivery, bounded  │
//! │  • Persisted client-side  │   │    retry, halt + retry      │
//! └───────────────────────────┘   └─────────────────────────────┘
//!               │                                │
//!               └────────────┬───────────────────┘
//!                            ▼
//!              ┌───────────────────────────┐
//!              │    BackendClient (HTTP)   │
//!              │  sync / displays /        │
//!              │  responses / storage      │
//!              └───────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use widget_engine::{
//!     FileStorage, HttpBackend, WidgetEngine, WidgetEngineConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), widget_engine::WidgetError> {
//!     let config = WidgetEngineConfig::new("https://app.example.com", "env-1");
//!     let backend = Arc::new(HttpBackend::new(
//!         config.api_host.clone(),
//!         config.environment_id.clone(),
//!         config.client_version.clone(),
//!     ));
//!     let storage = Arc::new(FileStorage::new("widget-config.json"));
//!
//!     let engine = WidgetEngine::new(config, backend, storage)?;
//!     engine.setup().await?;
//!     engine.start_refresh_loop();
//!
//!     for survey in engine.eligible_surveys() {
//!         println!("eligible: {}", survey.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! Single-threaded, event-driven: asynchronous operations are network I/O
//! awaits, not CPU concurrency. All shared mutation is copy-on-write behind
//! the [`ConfigStore`]'s atomic whole-structure replace; concurrent syncs
//! are last-write-wins. The periodic refresh loop is the only cancellable
//! operation.
//!
//! ## Modules
//!
//! - [`engine`]: the [`WidgetEngine`] coordinator
//! - [`sync`]: backend synchronization and the caching rules
//! - [`eligibility`]: the pure survey eligibility filter
//! - [`queue`]: response buffering, coalescing, and bounded-retry delivery
//! - [`session`]: one running survey (displays, responses, close)
//! - [`backend`]: the network client seam ([`HttpBackend`], [`MockBackend`])
//! - [`config`] / [`storage`]: the persisted session snapshot
//! - [`retry`]: backoff helper shared by delivery
//! - [`metrics`]: `metrics`-facade instrumentation

pub mod backend;
pub mod config;
pub mod eligibility;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod session;
pub mod state;
pub mod storage;
pub mod sync;

pub use backend::{BackendClient, FileUpload, HttpBackend, MockBackend, ResponseInput, UploadParams};
pub use config::{ConfigStore, ConfigUpdate, WidgetConfig, WidgetEngineConfig};
pub use eligibility::{diff_in_days, filter_eligible_surveys};
pub use engine::WidgetEngine;
pub use errors::{NetworkError, WidgetError};
pub use queue::{DeliveryEvents, ResponseQueue, ResponseUpdate, SurveyState};
pub use retry::RetryConfig;
pub use session::SurveySession;
pub use state::{
    ActionClass, Display, DisplayOption, EnvironmentState, Person, Product, ProductOverwrites,
    StateSync, Survey, SurveyAppearance,
};
pub use storage::{ConfigStorage, FileStorage, InMemoryStorage, StorageError};
pub use sync::{SyncEngine, SyncParams};
