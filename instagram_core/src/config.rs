//! Environment configuration.
//!
//! Only the two credential variables are required. Everything else falls
//! back to the defaults below.

use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::{AuthPolicy, Credentials, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RESUME_ATTEMPTS};
use crate::client::{DelayRange, MediaFeedQuery};
use crate::error::ConfigError;
use crate::insights::DEFAULT_MAX_MEDIAS;

pub const USERNAME_VAR: &str = "INSTAGRAM_USERNAME";
pub const PASSWORD_VAR: &str = "INSTAGRAM_PASSWORD";
pub const SESSION_FILE_VAR: &str = "INSTAGRAM_SESSION_FILE";
pub const MAX_ATTEMPTS_VAR: &str = "INSTAGRAM_MAX_LOGIN_ATTEMPTS";
pub const MAX_RESUME_ATTEMPTS_VAR: &str = "INSTAGRAM_MAX_RESUME_ATTEMPTS";
pub const DELAY_RANGE_VAR: &str = "INSTAGRAM_DELAY_RANGE";
pub const TIME_FRAME_VAR: &str = "INSTAGRAM_MEDIA_TIME_FRAME";
pub const ORDERING_VAR: &str = "INSTAGRAM_MEDIA_ORDERING";
pub const MAX_MEDIAS_VAR: &str = "INSTAGRAM_MAX_MEDIAS";

pub const DEFAULT_SESSION_FILE: &str = "instagrapi_session.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub session_file: PathBuf,
    pub auth: AuthPolicy,
    pub media: MediaFeedQuery,
    pub max_medias: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let username = lookup(USERNAME_VAR).ok_or(ConfigError::Missing(USERNAME_VAR))?;
        let password = lookup(PASSWORD_VAR).ok_or(ConfigError::Missing(PASSWORD_VAR))?;
        let credentials = Credentials::new(username, password)?;

        let session_file = optional(SESSION_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        let max_attempts = parse_or(optional(MAX_ATTEMPTS_VAR), MAX_ATTEMPTS_VAR, DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: MAX_ATTEMPTS_VAR,
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        let max_resume_attempts = parse_or(
            optional(MAX_RESUME_ATTEMPTS_VAR),
            MAX_RESUME_ATTEMPTS_VAR,
            DEFAULT_MAX_RESUME_ATTEMPTS,
        )?;
        let delay = parse_or(optional(DELAY_RANGE_VAR), DELAY_RANGE_VAR, DelayRange::DEFAULT)?;

        let defaults = MediaFeedQuery::default();
        let media = MediaFeedQuery {
            time_frame: optional(TIME_FRAME_VAR)
                .map(|v| v.trim().to_uppercase())
                .unwrap_or(defaults.time_frame),
            data_ordering: optional(ORDERING_VAR)
                .map(|v| v.trim().to_uppercase())
                .unwrap_or(defaults.data_ordering),
            ..defaults
        };
        let max_medias = parse_or(optional(MAX_MEDIAS_VAR), MAX_MEDIAS_VAR, DEFAULT_MAX_MEDIAS)?;

        Ok(Self {
            credentials,
            session_file,
            auth: AuthPolicy {
                max_attempts,
                max_resume_attempts,
                delay,
            },
            media,
            max_medias,
        })
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let config = Config::from_lookup(lookup(&[(USERNAME_VAR, "shop"), (PASSWORD_VAR, "pw")])).unwrap();
        assert_eq!(config.credentials.username(), "shop");
        assert_eq!(config.session_file, PathBuf::from(DEFAULT_SESSION_FILE));
        assert_eq!(config.auth, AuthPolicy::default());
        assert_eq!(config.media, MediaFeedQuery::default());
        assert_eq!(config.max_medias, 10);
    }

    #[test]
    fn missing_credentials_are_reported_by_name() {
        let err = Config::from_lookup(lookup(&[(PASSWORD_VAR, "pw")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing(USERNAME_VAR));

        let err = Config::from_lookup(lookup(&[(USERNAME_VAR, "shop"), (PASSWORD_VAR, "")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty(PASSWORD_VAR));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            (USERNAME_VAR, "shop"),
            (PASSWORD_VAR, "pw"),
            (SESSION_FILE_VAR, "/tmp/ig.json"),
            (MAX_ATTEMPTS_VAR, "3"),
            (MAX_RESUME_ATTEMPTS_VAR, "0"),
            (DELAY_RANGE_VAR, "0-1"),
            (TIME_FRAME_VAR, "one_year"),
            (MAX_MEDIAS_VAR, "25"),
        ]))
        .unwrap();
        assert_eq!(config.session_file, PathBuf::from("/tmp/ig.json"));
        assert_eq!(config.auth.max_attempts, 3);
        assert_eq!(config.auth.max_resume_attempts, 0);
        assert_eq!(config.auth.delay, DelayRange::new(0, 1).unwrap());
        assert_eq!(config.media.time_frame, "ONE_YEAR");
        assert_eq!(config.media.data_ordering, "REACH_COUNT");
        assert_eq!(config.max_medias, 25);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            (USERNAME_VAR, "shop"),
            (PASSWORD_VAR, "pw"),
            (MAX_ATTEMPTS_VAR, "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: MAX_ATTEMPTS_VAR, .. }));

        let err = Config::from_lookup(lookup(&[
            (USERNAME_VAR, "shop"),
            (PASSWORD_VAR, "pw"),
            (MAX_ATTEMPTS_VAR, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: MAX_ATTEMPTS_VAR, .. }));
    }

    #[test]
    fn oversized_delay_range_is_rejected() {
        for raw in ["18446744073709551-18446744073709552", "1-7200"] {
            let err = Config::from_lookup(lookup(&[
                (USERNAME_VAR, "shop"),
                (PASSWORD_VAR, "pw"),
                (DELAY_RANGE_VAR, raw),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: DELAY_RANGE_VAR, .. }));
        }
    }
}
