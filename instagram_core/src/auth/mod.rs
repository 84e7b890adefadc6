//! Login with on-disk session reuse.
//!
//! [`SessionAuthenticator`] runs a bounded number of attempts. Each attempt
//! takes one of two paths:
//! - **resume**: load the cached session file, apply it, log in on top of it and
//!   confirm it with a liveness probe;
//! - **fresh**: log in with credentials only and overwrite the session file.
//!
//! A cached session may be tried for at most `max_resume_attempts` attempts.
//! After that the remaining attempts fall back to fresh login, which replaces
//! the stale file. The file is never deleted.

pub mod session;

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::client::{DelayRange, InstagramApi};
use crate::error::{AuthError, ClientError, ConfigError};

pub use session::{SessionFile, SessionState};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_RESUME_ATTEMPTS: u32 = 2;

/// Username and password. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() {
            return Err(ConfigError::Empty("INSTAGRAM_USERNAME"));
        }
        if password.is_empty() {
            return Err(ConfigError::Empty("INSTAGRAM_PASSWORD"));
        }
        Ok(Self {
            username: username.trim().to_string(),
            password,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub max_attempts: u32,
    pub max_resume_attempts: u32,
    pub delay: DelayRange,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_resume_attempts: DEFAULT_MAX_RESUME_ATTEMPTS,
            delay: DelayRange::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPath {
    /// Cached session loaded, applied and probed.
    Resume,
    /// Credential login followed by a session dump.
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthOutcome {
    /// 1-based number of the attempt that succeeded.
    pub attempts: u32,
    pub path: LoginPath,
}

/// A logged-in client, owned by the caller for the rest of the run.
pub struct Authenticated<C> {
    pub client: C,
    pub outcome: AuthOutcome,
}

pub struct SessionAuthenticator {
    session: SessionFile,
    policy: AuthPolicy,
}

impl SessionAuthenticator {
    /// Rejects a policy that allows no attempts. Credentials are checked
    /// when they are built, so `authenticate` never sees empty ones.
    pub fn new(session_path: impl Into<PathBuf>, policy: AuthPolicy) -> Result<Self, AuthError> {
        if policy.max_attempts == 0 {
            return Err(AuthError::Configuration(ConfigError::Invalid {
                name: "INSTAGRAM_MAX_LOGIN_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            }));
        }
        Ok(Self {
            session: SessionFile::new(session_path),
            policy,
        })
    }

    pub fn session_file(&self) -> &SessionFile {
        &self.session
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Runs up to `max_attempts` login attempts and hands back the client on
    /// the first success. Per-attempt failures are logged and retried; only
    /// exhaustion is returned.
    pub async fn authenticate<C: InstagramApi>(
        &self,
        mut client: C,
        credentials: &Credentials,
    ) -> Result<Authenticated<C>, AuthError> {
        client.set_delay_range(self.policy.delay);

        let max_attempts = self.policy.max_attempts;
        let mut failed_resumes = 0u32;
        let mut last_cause = ClientError::NotAuthenticated;

        for attempt in 1..=max_attempts {
            let path = self.next_path(failed_resumes);
            debug!(attempt, max_attempts, ?path, "Starting login attempt");

            let result = match path {
                LoginPath::Resume => self.resume(&mut client, credentials).await,
                LoginPath::Fresh => {
                    self.fresh_login(&mut client, credentials, failed_resumes > 0)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    info!(
                        attempt,
                        ?path,
                        username = %credentials.username(),
                        "Successfully logged in"
                    );
                    return Ok(Authenticated {
                        client,
                        outcome: AuthOutcome {
                            attempts: attempt,
                            path,
                        },
                    });
                }
                Err(e) => {
                    warn!(attempt, max_attempts, ?path, error = %e, "Login attempt failed");
                    if path == LoginPath::Resume {
                        failed_resumes += 1;
                    }
                    last_cause = e;
                }
            }
        }

        Err(AuthError::Exhausted {
            attempts: max_attempts,
            last_cause,
        })
    }

    fn next_path(&self, failed_resumes: u32) -> LoginPath {
        if failed_resumes < self.policy.max_resume_attempts && self.session.exists() {
            LoginPath::Resume
        } else {
            LoginPath::Fresh
        }
    }

    async fn resume<C: InstagramApi>(
        &self,
        client: &mut C,
        credentials: &Credentials,
    ) -> Result<(), ClientError> {
        let state = self.session.load()?;
        client.set_settings(state)?;
        client.login(credentials).await?;
        client.probe().await
    }

    async fn fresh_login<C: InstagramApi>(
        &self,
        client: &mut C,
        credentials: &Credentials,
        discard_applied: bool,
    ) -> Result<(), ClientError> {
        if discard_applied {
            // Stale settings from an earlier resume attempt are still applied.
            client.set_settings(SessionState::default())?;
        }
        client.login(credentials).await?;
        self.session.dump(&client.settings())?;
        debug!(path = %self.session.path().display(), "Session settings saved");
        Ok(())
    }
}
