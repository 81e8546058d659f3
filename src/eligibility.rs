// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Survey eligibility filtering for anonymous visitors.
//!
//! Pure function over `(surveys, displays, product)`. Two sequential passes,
//! and the order matters:
//!
//! 1. **Display option**: how many times may this exact survey run.
//! 2. **Recontact days**: how long must we wait since the visitor was last
//!    shown any survey (or this one specifically) before showing something
//!    again. A global quiet period layered on top of the per-survey repeat
//!    policy.
//!
//! Identified sessions skip filtering entirely (the backend is authoritative
//! for their display history), so a state without a local `displays` list
//! passes through unchanged. An empty result is a normal outcome, not an
//! error.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::WidgetError;
use crate::state::{Display, DisplayOption, EnvironmentState, Survey};

/// Number of whole days between two instants, truncated (23h59m is 0 days).
#[must_use]
pub fn diff_in_days(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_days()
}

/// Apply both eligibility passes to a state snapshot, returning the snapshot
/// with `surveys` reduced to the currently showable set.
///
/// Fails with [`WidgetError::InvalidDisplayOption`] when a survey carries a
/// display option this client does not recognize: the backend validates
/// survey definitions, so an unknown value is a contract violation and is
/// never silently dropped. Idempotent: filtering an already filtered
/// snapshot changes nothing.
pub fn filter_eligible_surveys(
    state: EnvironmentState,
    now: DateTime<Utc>,
) -> Result<EnvironmentState, WidgetError> {
    let EnvironmentState {
        surveys,
        no_code_action_classes,
        product,
        attributes,
        displays,
    } = state;

    // Identified session: no local history to filter against.
    let Some(display_list) = displays else {
        return Ok(EnvironmentState {
            surveys,
            no_code_action_classes,
            product,
            attributes,
            displays: None,
        });
    };

    let before = surveys.len();
    let mut kept: Vec<Survey> = Vec::with_capacity(before);
    for survey in surveys {
        if display_option_allows(&survey, &display_list)? {
            kept.push(survey);
        }
    }

    // The recontact pass keys off the most recently created display across
    // ALL surveys. The per-survey policy still checks the survey's own last
    // display; the product-level fallback deliberately uses the global one.
    let latest_display = display_list.last();
    let surveys: Vec<Survey> = match latest_display {
        None => kept,
        Some(latest) => kept
            .into_iter()
            .filter(|survey| recontact_allows(survey, latest, &display_list, product.recontact_days, now))
            .collect(),
    };

    if surveys.len() < before {
        debug!(before, after = surveys.len(), "eligibility filter dropped surveys");
    }

    Ok(EnvironmentState {
        surveys,
        no_code_action_classes,
        product,
        attributes,
        displays: Some(display_list),
    })
}

fn display_option_allows(survey: &Survey, displays: &[Display]) -> Result<bool, WidgetError> {
    match survey.display_option {
        DisplayOption::RespondMultiple => Ok(true),
        DisplayOption::DisplayOnce => Ok(!displays.iter().any(|d| d.survey_id == survey.id)),
        DisplayOption::DisplayMultiple => {
            Ok(!displays.iter().any(|d| d.survey_id == survey.id && d.responded))
        }
        DisplayOption::Unknown => Err(WidgetError::InvalidDisplayOption(survey.id.clone())),
    }
}

fn recontact_allows(
    survey: &Survey,
    latest_display: &Display,
    displays: &[Display],
    product_recontact_days: Option<u32>,
    now: DateTime<Utc>,
) -> bool {
    if let Some(days) = survey.recontact_days {
        // Survey-level policy: measured against this survey's own most
        // recent display; a survey never shown is unconstrained.
        match displays.iter().rev().find(|d| d.survey_id == survey.id) {
            None => true,
            Some(own) => diff_in_days(now, own.created_at) >= i64::from(days),
        }
    } else if let Some(days) = product_recontact_days {
        // Product-level quiet period: measured against the last display of
        // any survey.
        diff_in_days(now, latest_display.created_at) >= i64::from(days)
    } else {
        true
    }
}
