use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use crate::auth::acquirer::TokenAcquirer;
use crate::auth::pkce::AuthorizationAttempt;
use crate::auth::record::{AuthorizationResult, CredentialRecord};
use crate::auth::store::TokenStore;
use crate::config::{Config, GRAPH_SCOPES};
use crate::error::MailgraphError;

/// Coordinates the credential record for the single managed identity.
///
/// The record lives behind one mutex and is mutated only here. Concurrent
/// `get_access_token` callers that find an expired token never start a second
/// refresh: the first caller spawns the exchange and every caller awaits the
/// same per-attempt outcome channel, which is discarded on completion.
/// Network exchanges run without the lock held.
pub struct TokenManager {
    acquirer: Arc<TokenAcquirer>,
    store: Arc<TokenStore>,
    scopes: Vec<String>,
    redirect_uri: String,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    record: CredentialRecord,
    /// Present while a refresh exchange is outstanding.
    refresh_rx: Option<watch::Receiver<Option<RefreshOutcome>>>,
    /// Present between begin and complete of an interactive authorization.
    pending: Option<PendingAuthorization>,
}

struct PendingAuthorization {
    code_verifier: String,
    state: String,
}

/// Outcome of one refresh attempt, broadcast to every waiter.
#[derive(Debug, Clone)]
enum RefreshOutcome {
    Token(String),
    AuthRequired,
    Temporary(String),
}

impl RefreshOutcome {
    fn into_result(self) -> Result<String, MailgraphError> {
        match self {
            RefreshOutcome::Token(token) => Ok(token),
            RefreshOutcome::AuthRequired => Err(MailgraphError::AuthenticationRequired),
            RefreshOutcome::Temporary(detail) => {
                Err(MailgraphError::TemporaryAuthFailure(detail))
            }
        }
    }
}

/// Observable credential state, for the `auth-status` tool and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    Authenticated { expires_on: DateTime<Utc> },
    RefreshInFlight,
    AuthorizationPending,
    NeedsRefresh,
    Unauthenticated,
}

impl AuthStatus {
    pub fn describe(&self) -> String {
        match self {
            AuthStatus::Authenticated { expires_on } => {
                format!("authenticated (access token valid until {expires_on})")
            }
            AuthStatus::RefreshInFlight => "refreshing access token".into(),
            AuthStatus::AuthorizationPending => {
                "waiting for interactive authorization to complete".into()
            }
            AuthStatus::NeedsRefresh => "signed in, access token needs refresh".into(),
            AuthStatus::Unauthenticated => "not signed in".into(),
        }
    }
}

impl TokenManager {
    /// Load the persisted record and classify it. A missing or corrupted
    /// cache file starts the manager unauthenticated rather than failing.
    pub fn new(config: &Config) -> Self {
        let store = TokenStore::new(config.token_cache.clone());
        let record = store.load();
        Self {
            acquirer: Arc::new(TokenAcquirer::new(config)),
            store: Arc::new(store),
            scopes: GRAPH_SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_uri: config.redirect_uri.clone(),
            inner: Arc::new(Mutex::new(Inner {
                record,
                refresh_rx: None,
                pending: None,
            })),
        }
    }

    fn scope_refs(scopes: &[String]) -> Vec<&str> {
        scopes.iter().map(String::as_str).collect()
    }

    /// Return a valid access token, refreshing silently when possible.
    ///
    /// Fails with `AuthenticationRequired` when there is no silent path back
    /// to a valid token; the manager never initiates the interactive flow
    /// itself since that needs a human to visit a URL out-of-band.
    pub async fn get_access_token(&self) -> Result<String, MailgraphError> {
        let mut rx = {
            let mut inner = self.inner.lock().await;
            if let Some(token) = inner.record.usable_access_token(Utc::now()) {
                return Ok(token.to_string());
            }
            if let Some(rx) = &inner.refresh_rx {
                rx.clone()
            } else {
                let Some(refresh_token) = inner.record.refresh_token.clone() else {
                    return Err(MailgraphError::AuthenticationRequired);
                };
                let (tx, rx) = watch::channel(None);
                inner.refresh_rx = Some(rx.clone());
                self.spawn_refresh(refresh_token, tx);
                rx
            }
        };

        // Clone the awaited value out of the `watch::Ref` immediately so the
        // non-`Send` guard is not held across the await in the error arm below
        // (which would make this future non-`Send`).
        let received = rx
            .wait_for(Option::is_some)
            .await
            .map(|value| value.as_ref().cloned());

        let outcome = match received {
            Ok(Some(outcome)) => outcome.into_result(),
            Ok(None) => Err(MailgraphError::TemporaryAuthFailure(
                "refresh attempt aborted".into(),
            )),
            Err(_) => {
                // The refresh task died without reporting. Clear the stale
                // channel so the next caller can start a fresh attempt.
                let mut inner = self.inner.lock().await;
                inner.refresh_rx = None;
                Err(MailgraphError::TemporaryAuthFailure(
                    "refresh attempt aborted".into(),
                ))
            }
        };
        outcome
    }

    /// Run the refresh exchange off the caller's future so a cancelled
    /// caller cannot strand the other waiters.
    fn spawn_refresh(&self, refresh_token: String, tx: watch::Sender<Option<RefreshOutcome>>) {
        let acquirer = Arc::clone(&self.acquirer);
        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let scopes = self.scopes.clone();

        tokio::spawn(async move {
            let result = acquirer
                .exchange_refresh_token(&refresh_token, &Self::scope_refs(&scopes))
                .await;

            let mut guard = inner.lock().await;
            guard.refresh_rx = None;
            let outcome = match result {
                Ok(auth) => {
                    let token = auth.access_token.clone();
                    guard.record.apply(auth);
                    if let Err(e) = store.save(&guard.record) {
                        // In-memory state stays authoritative; the cost is a
                        // re-authentication after restart.
                        tracing::warn!("Failed to persist refreshed credentials: {e}");
                    }
                    RefreshOutcome::Token(token)
                }
                Err(MailgraphError::InvalidGrant(detail)) => {
                    tracing::warn!(
                        "Refresh token rejected, interactive sign-in required: {detail}"
                    );
                    // Drop to unauthenticated in memory only. The on-disk
                    // record is deleted solely by operator action.
                    guard.record = CredentialRecord::default();
                    RefreshOutcome::AuthRequired
                }
                Err(e) => {
                    tracing::debug!("Token refresh failed: {e}");
                    RefreshOutcome::Temporary(e.to_string())
                }
            };
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Start an interactive authorization attempt and return the consent URL
    /// for the operator to visit. Valid from any state; an existing valid
    /// token stays usable until the attempt completes.
    pub async fn begin_interactive_authorization(&self) -> String {
        let attempt = AuthorizationAttempt::generate();
        let url = self.acquirer.build_authorization_url(
            &Self::scope_refs(&self.scopes),
            &self.redirect_uri,
            &attempt.code_challenge,
            &attempt.state,
        );
        let mut inner = self.inner.lock().await;
        inner.pending = Some(PendingAuthorization {
            code_verifier: attempt.code_verifier,
            state: attempt.state,
        });
        url
    }

    /// The `state` parameter of the pending attempt, for callers that can
    /// verify it against the redirect callback.
    pub async fn expected_state(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.pending.as_ref().map(|p| p.state.clone())
    }

    /// Exchange an authorization code for tokens. Tolerates a code arriving
    /// without a pending attempt (the exchange then carries no PKCE
    /// verifier). On failure the manager drops to unauthenticated.
    pub async fn complete_interactive_authorization(
        &self,
        code: &str,
    ) -> Result<(), MailgraphError> {
        let pending = {
            let mut inner = self.inner.lock().await;
            inner.pending.take()
        };
        let verifier = pending.as_ref().map(|p| p.code_verifier.as_str());

        let result = self
            .acquirer
            .exchange_authorization_code(
                code,
                &Self::scope_refs(&self.scopes),
                &self.redirect_uri,
                verifier,
            )
            .await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(auth) => {
                inner.record = CredentialRecord::from(auth);
                if let Err(e) = self.store.save(&inner.record) {
                    tracing::warn!("Failed to persist credentials: {e}");
                }
                Ok(())
            }
            Err(e) => {
                inner.record = CredentialRecord::default();
                Err(e)
            }
        }
    }

    pub async fn status(&self) -> AuthStatus {
        let inner = self.inner.lock().await;
        if inner.record.usable_access_token(Utc::now()).is_some() {
            if let Some(expires_on) = inner.record.expires_on {
                return AuthStatus::Authenticated { expires_on };
            }
        }
        if inner.refresh_rx.is_some() {
            AuthStatus::RefreshInFlight
        } else if inner.pending.is_some() {
            AuthStatus::AuthorizationPending
        } else if inner.record.can_refresh() {
            AuthStatus::NeedsRefresh
        } else {
            AuthStatus::Unauthenticated
        }
    }

    /// Operator cache-clear: forget the record in memory and on disk.
    pub async fn clear(&self) -> Result<(), MailgraphError> {
        let mut inner = self.inner.lock().await;
        inner.record = CredentialRecord::default();
        inner.pending = None;
        self.store.clear()
    }
}

impl From<AuthorizationResult> for CredentialRecord {
    fn from(result: AuthorizationResult) -> Self {
        CredentialRecord {
            access_token: Some(result.access_token),
            refresh_token: result.refresh_token,
            expires_on: Some(result.expires_on),
        }
    }
}
