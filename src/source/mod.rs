//! Source client capability consumed by the harvest controller.
//!
//! The controller only ever asks for "the page after this cursor". Everything
//! about authenticating, building queries and talking to the remote service is
//! the client's business; the only failure the controller treats specially is
//! [`SourceError::RateLimited`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::record::{Cursor, Page};

pub mod http;
pub mod session;

pub use http::HttpSearchClient;
pub use session::{Session, SessionError};

/// Point in time at which the source will accept requests again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSignal {
    /// Absolute reset time reported by the source.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitSignal {
    /// Creates a signal for the given reset time.
    pub fn new(reset_at: DateTime<Utc>) -> Self {
        Self { reset_at }
    }

    /// Time left until the reset, clamped to zero when it already passed.
    pub fn wait_from(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Failures a source client can report for a page request.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source is throttling us; retry after `reset_at`.
    #[error("rate limited until {}", .0.reset_at)]
    RateLimited(RateLimitSignal),
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The source answered with a non-success status.
    #[error("source returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if it could be read.
        body: String,
    },
    /// The response could not be decoded into a page.
    #[error("invalid page payload: {0}")]
    Decode(String),
    /// Any other client-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Paginated access to the remote record source.
#[async_trait]
pub trait SourceClient: Send {
    /// Fetches the page that starts at `cursor`, or the first page when `None`.
    async fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page, SourceError>;
}

#[async_trait]
impl<S: SourceClient + ?Sized> SourceClient for Box<S> {
    async fn fetch_page(&mut self, cursor: Option<&Cursor>) -> Result<Page, SourceError> {
        (**self).fetch_page(cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wait_is_time_until_reset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let signal = RateLimitSignal::new(now + chrono::Duration::seconds(90));
        assert_eq!(signal.wait_from(now), Duration::from_secs(90));
    }

    #[test]
    fn past_reset_clamps_to_zero() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let signal = RateLimitSignal::new(now - chrono::Duration::seconds(5));
        assert_eq!(signal.wait_from(now), Duration::ZERO);
    }
}
