#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use instagram_core::auth::{Credentials, SessionState};
use instagram_core::client::{DelayRange, InstagramApi, MediaFeedQuery};
use instagram_core::error::ClientError;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetDelay(DelayRange),
    SetSettings(SessionState),
    Login,
    Probe,
    Logout,
    InsightsAccount,
    InsightsMedia(MediaFeedQuery),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Scripted client. Each queue yields one outcome per call; an empty queue
/// means success.
#[derive(Default)]
pub struct MockClient {
    pub log: CallLog,
    pub login_failures: VecDeque<String>,
    pub probe_failures: Mutex<VecDeque<String>>,
    pub logout_fails: bool,
    pub media: Vec<Value>,
    logins: u32,
    settings: SessionState,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `n` logins with numbered messages.
    pub fn failing_logins(mut self, n: u32) -> Self {
        self.login_failures = (1..=n).map(|i| format!("login failure #{}", i)).collect();
        self
    }

    pub fn failing_probes(mut self, n: u32) -> Self {
        self.probe_failures = Mutex::new((1..=n).map(|i| format!("login_required #{}", i)).collect());
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

pub fn count(log: &CallLog, wanted: &Call) -> usize {
    log.lock().unwrap().iter().filter(|c| *c == wanted).count()
}

pub fn credentials() -> Credentials {
    Credentials::new("shop_account", "correct horse").unwrap()
}

#[async_trait]
impl InstagramApi for MockClient {
    fn set_delay_range(&mut self, range: DelayRange) {
        self.record(Call::SetDelay(range));
    }

    fn set_settings(&mut self, settings: SessionState) -> Result<(), ClientError> {
        self.record(Call::SetSettings(settings.clone()));
        self.settings = settings;
        Ok(())
    }

    fn settings(&self) -> SessionState {
        self.settings.clone()
    }

    async fn login(&mut self, _credentials: &Credentials) -> Result<(), ClientError> {
        self.record(Call::Login);
        if let Some(message) = self.login_failures.pop_front() {
            return Err(ClientError::LoginRejected(message));
        }
        if self.settings.get("authorization").is_none() {
            self.logins += 1;
            self.settings
                .insert("authorization", json!(format!("Bearer fresh-{}", self.logins)));
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), ClientError> {
        self.record(Call::Probe);
        if let Some(message) = self.probe_failures.lock().unwrap().pop_front() {
            return Err(ClientError::Status {
                endpoint: "feed/timeline/".to_string(),
                status: 403,
                message,
            });
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<(), ClientError> {
        self.record(Call::Logout);
        if self.logout_fails {
            return Err(ClientError::NotAuthenticated);
        }
        Ok(())
    }

    async fn insights_account(&self) -> Result<Value, ClientError> {
        self.record(Call::InsightsAccount);
        Ok(json!({ "profile_visits_metric_count": 42 }))
    }

    async fn insights_media_feed_all(
        &self,
        query: &MediaFeedQuery,
    ) -> Result<Vec<Value>, ClientError> {
        self.record(Call::InsightsMedia(query.clone()));
        Ok(self.media.clone())
    }
}
