//! Widget state data model.
//!
//! These types mirror the backend's client API contract (camelCase JSON).
//! [`EnvironmentState`] is the locally cached snapshot: the surveys currently
//! eligible for this visitor, the no-code trigger definitions, the tenant
//! product config, and the person's known attributes. For anonymous visitors
//! it additionally carries the locally accumulated [`Display`] history, which
//! never exists server-side and is the sole source of truth for "has this
//! visitor already seen survey X".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How often a single survey may be shown to the same visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayOption {
    /// Always eligible, even after the visitor responded.
    RespondMultiple,
    /// Eligible only while the visitor has never seen it.
    DisplayOnce,
    /// Eligible until the visitor has completed it once.
    DisplayMultiple,
    /// Anything the backend sends that this client does not know. Kept
    /// through parsing so the eligibility filter can fail loudly instead of
    /// guessing.
    #[serde(other)]
    Unknown,
}

/// One recorded impression of a survey.
///
/// `responded` flips from `false` to `true` exactly once, when the first
/// answer for that impression is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub created_at: DateTime<Utc>,
    pub survey_id: String,
    pub responded: bool,
}

/// Per-survey overrides of the tenant-level appearance settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductOverwrites {
    pub brand_color: Option<String>,
    pub highlight_border_color: Option<String>,
    pub placement: Option<String>,
    pub click_outside_close: Option<bool>,
    pub dark_overlay: Option<bool>,
}

/// Tenant-level product configuration: branding plus the global recontact
/// policy applied when a survey defines no policy of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub recontact_days: Option<u32>,
    pub brand_color: Option<String>,
    pub highlight_border_color: Option<String>,
    pub placement: Option<String>,
    pub click_outside_close: bool,
    pub dark_overlay: bool,
    pub in_app_survey_branding: bool,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            recontact_days: None,
            brand_color: None,
            highlight_border_color: None,
            placement: None,
            click_outside_close: true,
            dark_overlay: false,
            in_app_survey_branding: true,
        }
    }
}

/// The appearance the host renderer should use for one survey: product
/// branding with the survey's overwrites already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyAppearance {
    pub brand_color: Option<String>,
    pub highlight_border_color: Option<String>,
    pub placement: Option<String>,
    pub click_outside_close: bool,
    pub dark_overlay: bool,
    pub branding_enabled: bool,
}

/// A survey definition as delivered by the sync endpoint.
///
/// The engine only interprets the eligibility attributes (`display_option`,
/// `recontact_days`) and the display `delay`; the rest of the definition
/// (questions, styling, logic) is carried opaquely for the host renderer and
/// is immutable from the widget's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: String,
    pub name: String,
    pub display_option: DisplayOption,
    #[serde(default)]
    pub recontact_days: Option<u32>,
    /// Seconds to wait before the host shows the survey.
    #[serde(default)]
    pub delay: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_overwrites: Option<ProductOverwrites>,
    /// Remainder of the definition (questions, thank-you card, logic, ...).
    #[serde(flatten)]
    pub definition: Map<String, Value>,
}

impl Survey {
    /// Minimal survey for tests and demos.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, display_option: DisplayOption) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            display_option,
            recontact_days: None,
            delay: 0,
            product_overwrites: None,
            definition: Map::new(),
        }
    }
}

/// A no-code trigger definition recognized client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionClass {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_code_config: Option<Value>,
}

/// The identified person attached to a sync response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

/// Payload of the sync endpoint (`{"data": StateSync}` on the wire).
///
/// Never contains `displays`: the backend has no display history for
/// anonymous visitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSync {
    pub surveys: Vec<Survey>,
    #[serde(default)]
    pub no_code_action_classes: Vec<ActionClass>,
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
}

/// The locally cached state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    pub surveys: Vec<Survey>,
    #[serde(default)]
    pub no_code_action_classes: Vec<ActionClass>,
    pub product: Product,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    /// Local impression history. `Some` only for anonymous sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displays: Option<Vec<Display>>,
}

impl EnvironmentState {
    /// Build a fresh snapshot from a sync payload. Attributes default to an
    /// empty map when the backend reports no person; `displays` starts out
    /// absent and is merged in by the sync engine for anonymous sessions.
    #[must_use]
    pub fn from_sync(sync: StateSync) -> Self {
        let attributes = sync.person.map(|p| p.attributes).unwrap_or_default();
        Self {
            surveys: sync.surveys,
            no_code_action_classes: sync.no_code_action_classes,
            product: sync.product,
            attributes,
            displays: None,
        }
    }
}
