//! Platform client capability.
//!
//! The session authenticator and the insights fetch only talk to Instagram
//! through [`InstagramApi`], so tests can drive them with a scripted client.
//! [`HttpInstagramClient`] is the production implementation.

pub mod http;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::auth::{Credentials, SessionState};
use crate::error::ClientError;

pub use http::HttpInstagramClient;

/// Random pause applied before every platform request, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min_secs: u64,
    max_secs: u64,
}

impl DelayRange {
    pub const DEFAULT: DelayRange = DelayRange {
        min_secs: 1,
        max_secs: 3,
    };

    /// Longest accepted pause.
    pub const MAX_SECS: u64 = 3600;

    /// `None` unless `min_secs <= max_secs <= MAX_SECS`.
    pub fn new(min_secs: u64, max_secs: u64) -> Option<Self> {
        (min_secs <= max_secs && max_secs <= Self::MAX_SECS).then_some(Self { min_secs, max_secs })
    }

    /// No pause at all. Used by tests and local tooling.
    pub fn none() -> Self {
        Self {
            min_secs: 0,
            max_secs: 0,
        }
    }

    pub fn min_secs(&self) -> u64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> u64 {
        self.max_secs
    }

    pub fn is_zero(&self) -> bool {
        self.max_secs == 0
    }

    /// Picks a delay uniformly at millisecond granularity.
    pub fn sample(&self) -> Duration {
        if self.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(self.min_secs * 1000..=self.max_secs * 1000);
        Duration::from_millis(millis)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for DelayRange {
    type Err = String;

    /// Accepts `"2"` or `"1-3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| format!("'{}' is not a number of seconds: {}", part.trim(), e))
        };
        let (min, max) = match s.split_once('-') {
            Some((min, max)) => (parse(min)?, parse(max)?),
            None => {
                let secs = parse(s)?;
                (secs, secs)
            }
        };
        if max > DelayRange::MAX_SECS {
            return Err(format!(
                "maximum {} exceeds the {} second limit",
                max,
                DelayRange::MAX_SECS
            ));
        }
        DelayRange::new(min, max).ok_or_else(|| format!("minimum {} exceeds maximum {}", min, max))
    }
}

/// Arguments of the media insights report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFeedQuery {
    pub post_type: String,
    pub time_frame: String,
    pub data_ordering: String,
    /// Stop after this many posts; `0` fetches every page.
    pub count: usize,
}

impl Default for MediaFeedQuery {
    fn default() -> Self {
        Self {
            post_type: "ALL".to_string(),
            time_frame: "TWO_YEARS".to_string(),
            data_ordering: "REACH_COUNT".to_string(),
            count: 0,
        }
    }
}

#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Sets the pause taken before each request.
    fn set_delay_range(&mut self, range: DelayRange);

    /// Replaces the client's session settings. An empty state drops any
    /// authorization and cookies but keeps device identifiers.
    fn set_settings(&mut self, settings: SessionState) -> Result<(), ClientError>;

    /// Snapshot of the current session settings, suitable for persisting.
    fn settings(&self) -> SessionState;

    /// Logs in with credentials. When the applied settings already carry an
    /// authorization for this user, implementations may reuse it without a
    /// round trip; callers confirm it with [`InstagramApi::probe`].
    async fn login(&mut self, credentials: &Credentials) -> Result<(), ClientError>;

    /// Cheap read-only call confirming the session is accepted server-side.
    async fn probe(&self) -> Result<(), ClientError>;

    async fn logout(&mut self) -> Result<(), ClientError>;

    async fn insights_account(&self) -> Result<Value, ClientError>;

    async fn insights_media_feed_all(
        &self,
        query: &MediaFeedQuery,
    ) -> Result<Vec<Value>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delay_ranges() {
        assert_eq!("1-3".parse::<DelayRange>(), Ok(DelayRange::DEFAULT));
        assert_eq!(" 2 ".parse::<DelayRange>(), DelayRange::new(2, 2).ok_or(String::new()));
        assert!("3-1".parse::<DelayRange>().is_err());
        assert!("fast".parse::<DelayRange>().is_err());
    }

    #[test]
    fn oversized_ranges_are_rejected() {
        assert_eq!(DelayRange::new(0, DelayRange::MAX_SECS + 1), None);
        assert!(DelayRange::new(0, DelayRange::MAX_SECS).is_some());
        let err = "18446744073709551-18446744073709552"
            .parse::<DelayRange>()
            .unwrap_err();
        assert!(err.contains("limit"), "{}", err);
    }

    #[test]
    fn sample_at_upper_limit_does_not_overflow() {
        let range = DelayRange::new(DelayRange::MAX_SECS, DelayRange::MAX_SECS).unwrap();
        assert_eq!(range.sample(), Duration::from_secs(DelayRange::MAX_SECS));
    }

    #[test]
    fn sample_stays_in_range() {
        let range = DelayRange::new(1, 2).unwrap();
        for _ in 0..50 {
            let d = range.sample();
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
        assert_eq!(DelayRange::none().sample(), Duration::ZERO);
    }
}
