//! Cached credential state and single-flighted refresh
//!
//! Each [`RefreshCoordinator`] owns one mutex-guarded [`RefreshState`]: the
//! cached credential and at most one in-flight refresh. Concurrent callers
//! that find a refresh running join it instead of starting another.
//!
//! The refresh itself runs on a spawned task, so a caller that gives up
//! waiting does not cancel the refresh for everybody else, and a finished
//! persistence write is never rolled back.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

use crate::credential::Credential;
use crate::errors::{AuthError, Result};
use crate::store::CredentialStore;

const EVENT_CAPACITY: usize = 16;

/// Flow-specific refresh procedure plugged into a [`RefreshCoordinator`]
#[async_trait::async_trait]
pub trait RefreshFlow: Send + Sync + 'static {
    /// Obtain a new credential. `refresh_token` is only `None` for flows
    /// that return `false` from [`RefreshFlow::requires_refresh_token`].
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<Credential>;

    /// Whether a refresh token is needed to get a new credential
    fn requires_refresh_token(&self) -> bool {
        true
    }
}

/// Credential changes published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    Acquired(Credential),
    Refreshed(Credential),
    Cleared,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential>>>;

struct InFlight {
    id: u64,
    outcome: SharedRefresh,
}

#[derive(Default)]
struct RefreshState {
    cached: Option<Credential>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

struct Inner<F> {
    flow: Arc<F>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<CredentialEvent>,
}

/// Decides whether the cached credential is usable and single-flights refreshes
pub struct RefreshCoordinator<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for RefreshCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> std::fmt::Debug for RefreshCoordinator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator").finish_non_exhaustive()
    }
}

fn persistence_error(credential: Credential, err: AuthError) -> AuthError {
    AuthError::Persistence {
        credential: Box::new(credential),
        message: err.to_string(),
    }
}

impl<F: RefreshFlow> RefreshCoordinator<F> {
    pub fn new(flow: F, store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                flow: Arc::new(flow),
                store,
                state: Mutex::new(RefreshState::default()),
                events,
            }),
        }
    }

    pub fn flow(&self) -> &F {
        &self.inner.flow
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.inner.events.subscribe()
    }

    /// Cached credential, whether or not it has expired
    pub async fn cached(&self) -> Option<Credential> {
        self.inner.state.lock().await.cached.clone()
    }

    pub async fn is_refreshing(&self) -> bool {
        self.inner.state.lock().await.in_flight.is_some()
    }

    /// Return a usable credential, refreshing at most once no matter how
    /// many callers ask concurrently.
    ///
    /// With `invalidating_previous` the cached credential is treated as
    /// expired even if its expiry has not passed, e.g. after a 401.
    #[instrument(skip(self))]
    pub async fn refresh_if_needed(&self, invalidating_previous: bool) -> Result<Credential> {
        let outcome = {
            let mut state = self.inner.state.lock().await;

            if let Some(cached) = &state.cached
                && !invalidating_previous
                && !cached.is_expired()
            {
                return Ok(cached.clone());
            }

            if let Some(in_flight) = &state.in_flight {
                debug!(id = in_flight.id, "Joining in-flight refresh");
                in_flight.outcome.clone()
            } else if let Some(refresh_token) = state
                .cached
                .as_ref()
                .and_then(|c| c.refresh_token())
                .map(str::to_string)
            {
                self.start_refresh(&mut state, Some(refresh_token))
            } else {
                match self.inner.store.load().await? {
                    Some(stored) if !invalidating_previous && !stored.is_expired() => {
                        debug!("Using stored credential");
                        state.cached = Some(stored.clone());
                        return Ok(stored);
                    }
                    Some(stored) if stored.refresh_token().is_some() => {
                        let refresh_token = stored.refresh_token().map(str::to_string);
                        self.start_refresh(&mut state, refresh_token)
                    }
                    _ if !self.inner.flow.requires_refresh_token() => {
                        self.start_refresh(&mut state, None)
                    }
                    _ => return Err(AuthError::MissingRefreshToken),
                }
            }
        };

        outcome.await
    }

    /// Publish a new in-flight refresh. Must be called with the state locked.
    fn start_refresh(&self, state: &mut RefreshState, refresh_token: Option<String>) -> SharedRefresh {
        let id = state.next_id;
        state.next_id += 1;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_refresh(id, refresh_token).await });
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(AuthError::Interrupted(e.to_string())))
        }
        .boxed()
        .shared();

        info!(id, "Started credential refresh");
        state.in_flight = Some(InFlight {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Cache and persist a credential obtained outside the refresh path
    /// (initial acquisition or an explicit refresh). Supersedes any
    /// in-flight refresh.
    pub(crate) async fn install(&self, credential: Credential, event: CredentialEvent) -> Result<Credential> {
        let mut state = self.inner.state.lock().await;
        if let Some(in_flight) = state.in_flight.take() {
            debug!(id = in_flight.id, "Superseding in-flight refresh");
        }
        state.cached = Some(credential.clone());
        let saved = self.inner.store.save(&credential).await;
        drop(state);

        let _ = self.inner.events.send(event);
        saved.map_err(|e| persistence_error(credential.clone(), e))?;
        Ok(credential)
    }

    /// Save the cached credential again, e.g. after a persistence failure
    pub async fn persist(&self) -> Result<()> {
        let state = self.inner.state.lock().await;
        let credential = state.cached.as_ref().ok_or(AuthError::NotAuthenticated)?;
        self.inner.store.save(credential).await
    }

    /// Forget the cached credential and erase it from the store
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        state.cached = None;
        state.in_flight = None;
        let cleared = self.inner.store.clear().await;
        drop(state);

        info!("Cleared credential");
        let _ = self.inner.events.send(CredentialEvent::Cleared);
        cleared
    }
}

impl<F: RefreshFlow> Inner<F> {
    async fn run_refresh(&self, id: u64, refresh_token: Option<String>) -> Result<Credential> {
        let result = self.flow.refresh(refresh_token.as_deref()).await;

        let mut state = self.state.lock().await;
        let current = state.in_flight.as_ref().is_some_and(|f| f.id == id);
        if current {
            state.in_flight = None;
        }

        let credential = match result {
            Ok(credential) => credential,
            Err(e) => {
                warn!(id, error = %e, "Credential refresh failed");
                return Err(e);
            }
        };

        if !current {
            debug!(id, "Refresh was superseded, not caching its result");
            return Ok(credential);
        }

        state.cached = Some(credential.clone());
        let saved = self.store.save(&credential).await;
        drop(state);

        info!(id, expires_at = %credential.expires_at(), "Refreshed credential");
        let _ = self.events.send(CredentialEvent::Refreshed(credential.clone()));

        if let Err(e) = saved {
            warn!(id, error = %e, "Refreshed credential could not be saved");
            return Err(persistence_error(credential, e));
        }
        Ok(credential)
    }
}
