//! Single-flight access token refresh.
//!
//! The gate owns the session's token state. Any number of concurrent callers
//! that saw their access token rejected end up awaiting one shared refresh
//! future; the upstream exchange runs once per storm.
//!
//! ```text
//! NoToken -> Authenticating -> Authenticated -> Refreshing -> Authenticated
//!                                                          \-> AuthLost
//! ```
//!
//! A refresh failing for transient reasons (network, backend unavailable)
//! keeps the session. Any other failure tears the tokens down, notifies the
//! host once, and hands `AuthenticationRequired` to every waiter.
//!
//! Every login and logout starts a new epoch. A refresh only applies its
//! outcome to the epoch it was started in; one that settles after a re-login
//! or `clear()` leaves the current session untouched.

use crate::credentials::{AuthLostNotifier, CredentialStore, StoredCredentials};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use psnsync_core::{PsnError, PsnResult};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Exchanges a refresh token for an access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> PsnResult<TokenGrant>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Set when the backend rotated the refresh token during the exchange.
    pub rotated_refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            rotated_refresh_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    NoToken,
    Authenticating,
    Authenticated,
    Refreshing,
    AuthLost,
}

type InFlightRefresh = Shared<BoxFuture<'static, PsnResult<String>>>;

struct TokenState {
    phase: GatePhase,
    access_token: Option<String>,
    refresh_token: Option<SecretString>,
    in_flight: Option<InFlightRefresh>,
    auth_lost_notified: bool,
    epoch: u64,
}

impl TokenState {
    fn reset(&mut self, phase: GatePhase) {
        self.phase = phase;
        self.access_token = None;
        self.refresh_token = None;
    }

    /// Start a new session epoch, detaching any in-flight refresh.
    fn next_epoch(&mut self, phase: GatePhase) -> u64 {
        self.reset(phase);
        self.in_flight = None;
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }
}

struct GateInner {
    exchange: Arc<dyn TokenExchange>,
    credentials: Option<Arc<dyn CredentialStore>>,
    auth_lost: Option<Arc<dyn AuthLostNotifier>>,
    state: Mutex<TokenState>,
}

impl GateInner {
    fn store_rotated(&self, refresh_token: &str) {
        if let Some(store) = &self.credentials {
            tracing::info!("Refresh token rotated; storing new credentials");
            store.store(&StoredCredentials::with_npsso(refresh_token));
        }
    }
}

/// Shared handle to a session's token state.
#[derive(Clone)]
pub struct TokenGate {
    inner: Arc<GateInner>,
}

impl TokenGate {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self::build(exchange, None, None)
    }

    /// Gate that reports rotated credentials and lost authentication to the host.
    pub fn with_host(
        exchange: Arc<dyn TokenExchange>,
        credentials: Arc<dyn CredentialStore>,
        auth_lost: Arc<dyn AuthLostNotifier>,
    ) -> Self {
        Self::build(exchange, Some(credentials), Some(auth_lost))
    }

    fn build(
        exchange: Arc<dyn TokenExchange>,
        credentials: Option<Arc<dyn CredentialStore>>,
        auth_lost: Option<Arc<dyn AuthLostNotifier>>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                exchange,
                credentials,
                auth_lost,
                state: Mutex::new(TokenState {
                    phase: GatePhase::NoToken,
                    access_token: None,
                    refresh_token: None,
                    in_flight: None,
                    auth_lost_notified: false,
                    epoch: 0,
                }),
            }),
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.inner.state.lock().phase
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.lock().access_token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().access_token.is_some()
    }

    /// Credentials for the refresh token currently held.
    pub fn stored_credentials(&self) -> Option<StoredCredentials> {
        self.inner
            .state
            .lock()
            .refresh_token
            .as_ref()
            .map(|token| StoredCredentials::with_npsso(token.expose_secret()))
    }

    /// Log in with a refresh token.
    ///
    /// On failure the gate stays without tokens and the exchange error is
    /// returned unchanged. A `clear()` issued while the exchange runs wins:
    /// the login is discarded with `AuthenticationRequired`.
    pub async fn authenticate(&self, refresh_token: &str) -> PsnResult<()> {
        let epoch = self.inner.state.lock().next_epoch(GatePhase::Authenticating);

        let outcome = self.inner.exchange.exchange(refresh_token).await;
        let mut state = self.inner.state.lock();
        if state.epoch != epoch {
            tracing::debug!("Login superseded while exchanging token");
            return Err(PsnError::AuthenticationRequired);
        }
        let grant = match outcome {
            Ok(grant) if grant.access_token.is_empty() => {
                state.reset(GatePhase::NoToken);
                return Err(PsnError::unknown_response("empty access token"));
            }
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(error = %e, "Authentication failed");
                state.reset(GatePhase::NoToken);
                return Err(e);
            }
        };

        let refresh = grant
            .rotated_refresh_token
            .clone()
            .unwrap_or_else(|| refresh_token.to_string());
        state.phase = GatePhase::Authenticated;
        state.access_token = Some(grant.access_token);
        state.refresh_token = Some(SecretString::from(refresh));
        state.auth_lost_notified = false;
        drop(state);
        if let Some(rotated) = grant.rotated_refresh_token {
            self.inner.store_rotated(&rotated);
        }
        Ok(())
    }

    /// Obtain a token newer than `rejected`.
    ///
    /// If the current token already differs from `rejected`, another caller
    /// refreshed in the meantime and the current token is returned. If a
    /// refresh is in flight, its result is awaited. Otherwise a refresh is
    /// started and published for concurrent callers.
    pub async fn ensure_fresh_token(&self, rejected: &str) -> PsnResult<String> {
        let refresh = {
            let mut state = self.inner.state.lock();
            if let Some(in_flight) = state.in_flight.clone() {
                in_flight
            } else {
                match &state.access_token {
                    Some(current) if current != rejected => return Ok(current.clone()),
                    _ => {}
                }
                let refresh_token = state
                    .refresh_token
                    .as_ref()
                    .map(|token| token.expose_secret().to_string())
                    .ok_or(PsnError::AuthenticationRequired)?;
                let refresh = run_refresh(Arc::clone(&self.inner), refresh_token, state.epoch)
                    .boxed()
                    .shared();
                state.phase = GatePhase::Refreshing;
                state.in_flight = Some(refresh.clone());
                refresh
            }
        };
        refresh.await
    }

    /// Wait for an in-flight refresh to settle, if any.
    pub async fn drain(&self) {
        let in_flight = self.inner.state.lock().in_flight.clone();
        if let Some(refresh) = in_flight {
            tracing::debug!("Waiting for in-flight token refresh");
            let _ = refresh.await;
        }
    }

    /// Forget all tokens (logout). A refresh still running is discarded.
    pub fn clear(&self) {
        self.inner.state.lock().next_epoch(GatePhase::NoToken);
    }
}

async fn run_refresh(
    inner: Arc<GateInner>,
    refresh_token: String,
    epoch: u64,
) -> PsnResult<String> {
    tracing::debug!("Refreshing access token");
    let outcome = inner.exchange.exchange(&refresh_token).await;

    let mut rotated = None;
    let mut notify = false;
    let result = {
        let mut state = inner.state.lock();
        if state.epoch != epoch {
            tracing::debug!("Discarding refresh outcome of a superseded session");
            return state
                .access_token
                .clone()
                .ok_or(PsnError::AuthenticationRequired);
        }
        state.in_flight = None;
        match outcome {
            Ok(grant) if !grant.access_token.is_empty() => {
                state.phase = GatePhase::Authenticated;
                state.access_token = Some(grant.access_token.clone());
                if let Some(new_refresh) = grant.rotated_refresh_token {
                    state.refresh_token = Some(SecretString::from(new_refresh.clone()));
                    rotated = Some(new_refresh);
                }
                Ok(grant.access_token)
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Failed to refresh token for independent reasons");
                state.phase = GatePhase::Authenticated;
                Err(e)
            }
            other => {
                let reason = match other {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty access token".to_string(),
                };
                tracing::error!(reason = %reason, "Failed to refresh token; authentication lost");
                state.reset(GatePhase::AuthLost);
                if !state.auth_lost_notified {
                    state.auth_lost_notified = true;
                    notify = true;
                }
                Err(PsnError::AuthenticationRequired)
            }
        }
    };

    if notify {
        if let Some(notifier) = &inner.auth_lost {
            notifier.auth_lost();
        }
    }
    if let Some(new_refresh) = rotated {
        inner.store_rotated(&new_refresh);
    }
    result
}

// ============================================================================
// TESTS
// ============================================================================
