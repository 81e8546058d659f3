//! Error taxonomy for the widget engine.
//!
//! Three failure classes cross the public API:
//! - [`NetworkError`]: HTTP/transport failure carrying status, URL, and the
//!   backend's error message. Internal network calls return these as tagged
//!   results; only the outermost operations propagate them.
//! - Invalid-state errors ([`WidgetError::InvalidDisplayOption`],
//!   [`WidgetError::MissingDisplay`]): data-contract violations that fail
//!   hard instead of being defaulted away.
//! - Terminal delivery failure is not an error value at all. The response
//!   queue reports it through its [`DeliveryEvents`](crate::queue::DeliveryEvents)
//!   observer once the retry budget is exhausted.

use thiserror::Error;

use crate::storage::StorageError;

/// Typed transport failure.
///
/// `status` is the HTTP status code, or `0` when the request never produced
/// a response (DNS failure, connection reset, local precondition).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("network error ({status}) at {url}: {message}")]
pub struct NetworkError {
    pub status: u16,
    pub url: String,
    pub message: String,
    /// The `message` field of the backend's error body, when one was returned.
    pub response_message: Option<String>,
}

impl NetworkError {
    /// A failure that happened before any HTTP exchange took place.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: 0,
            url: url.into(),
            message: message.into(),
            response_message: None,
        }
    }
}

/// Top-level error type for widget engine operations.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The backend handed us a survey with a display option this client does
    /// not recognize. The backend validates survey definitions, so this is a
    /// contract violation and must not be silently defaulted.
    #[error("invalid displayOption on survey '{0}'")]
    InvalidDisplayOption(String),

    /// A response arrived for an impression that was never recorded.
    #[error("no display recorded for the current impression")]
    MissingDisplay,

    /// An operation needed the synced config before `setup()` populated it.
    #[error("widget config is not initialized")]
    MissingConfig,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// Only one survey may run at a time per widget session.
    #[error("a survey is already running")]
    SurveyAlreadyRunning,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
