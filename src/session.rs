use async_trait::async_trait;
use std::{
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

use crate::{
    models::{Session, User},
    storage::{CredentialState, ROLE_KEY, StorageError, TOKEN_KEY},
};

/// SessionError
///
/// Failures while hydrating or persisting a session. None of these reach the route guard:
/// every hydration failure still resolves the session to unauthenticated.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token rejected: {0}")]
    InvalidToken(String),
    #[error("no account found for user {0}")]
    UnknownUser(Uuid),
    #[error("session initialization did not complete within {0:?}")]
    InitTimedOut(Duration),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// SessionResolver
///
/// Turns a persisted token into the user it identifies. The production implementation is
/// `auth::JwtSessionResolver`.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<User, SessionError>;
}

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

struct StoreInner {
    session: Session,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

/// SessionStore
///
/// Observable holder of the current `Session`. Cloning yields another handle to the same
/// state, so the store can be injected into every component that needs it.
///
/// Every mutation notifies all listeners with the new snapshot. Listeners run after the
/// internal lock is released, so they may read or mutate the store themselves.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
    credentials: CredentialState,
    init_claimed: Arc<AtomicBool>,
}

impl SessionStore {
    /// Creates a store in the initializing state, backed by `credentials`.
    pub fn new(credentials: CredentialState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                session: Session::initializing(),
                listeners: Vec::new(),
                next_listener_id: 0,
            })),
            credentials,
            init_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current session snapshot.
    pub fn read(&self) -> Session {
        self.lock().session.clone()
    }

    /// Registers `listener` for every subsequent change. The returned `Subscription`
    /// removes it when unsubscribed or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Hydrates the session from the persisted token.
    ///
    /// Only the first call does any work; later calls return `Ok(())` immediately. The loading
    /// flag is cleared exactly once, to an authenticated session when the token resolves within
    /// `timeout` and to an unauthenticated one otherwise. A rejected token is also removed from
    /// the credential store.
    pub async fn initialize(
        &self,
        resolver: &dyn SessionResolver,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        if self.init_claimed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let Some(token) = self.credentials.get(TOKEN_KEY) else {
            tracing::debug!("no persisted session token");
            self.resolve(Session::unauthenticated());
            return Ok(());
        };

        match tokio::time::timeout(timeout, resolver.resolve(&token)).await {
            Ok(Ok(user)) => {
                let role = user.role;
                tracing::info!(user_id = %user.id, %role, "session restored");
                if !self.resolve(Session::authenticated(user)) {
                    return Ok(());
                }

                let stored_tag = self.credentials.get(ROLE_KEY);
                if stored_tag.as_deref() != Some(role.as_str()) {
                    // The server's role wins over whatever tag was persisted.
                    tracing::debug!(stored = ?stored_tag, actual = %role, "refreshing role tag");
                    if let Err(e) = self.credentials.set(ROLE_KEY, role.as_str()) {
                        tracing::warn!(error = %e, "failed to persist role tag");
                    }
                }
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "session hydration failed, signing out");
                // A login that landed while the token was being checked owns the credentials now.
                if self.resolve(Session::unauthenticated()) {
                    self.clear_credentials();
                }
                Err(e)
            }
            Err(_) => {
                tracing::warn!(?timeout, "session hydration timed out");
                self.resolve(Session::unauthenticated());
                Err(SessionError::InitTimedOut(timeout))
            }
        }
    }

    /// Records a fresh sign-in: persists the token and role tag, then marks the session
    /// authenticated.
    pub fn login(&self, token: &str, user: User) -> Result<(), SessionError> {
        self.credentials.set(TOKEN_KEY, token)?;
        self.credentials.set(ROLE_KEY, user.role.as_str())?;
        tracing::info!(user_id = %user.id, role = %user.role, "signed in");
        self.mutate(|session| *session = Session::authenticated(user));
        Ok(())
    }

    /// Clears the identity and the persisted credentials.
    pub fn logout(&self) {
        self.clear_credentials();
        tracing::info!("signed out");
        self.mutate(|session| *session = Session::unauthenticated());
    }

    fn clear_credentials(&self) {
        for key in [TOKEN_KEY, ROLE_KEY] {
            if let Err(e) = self.credentials.remove(key) {
                tracing::warn!(key, error = %e, "failed to clear persisted credential");
            }
        }
    }

    /// Applies the hydration result unless something else already resolved the session.
    /// Returns whether it was applied.
    fn resolve(&self, resolved: Session) -> bool {
        self.mutate(|session| {
            if !session.is_loading {
                return false;
            }
            *session = resolved;
            true
        })
    }

    fn mutate<R>(&self, change: impl FnOnce(&mut Session) -> R) -> R {
        let (result, snapshot, listeners) = {
            let mut inner = self.lock();
            let result = change(&mut inner.session);
            let listeners: Vec<Listener> = inner
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (result, inner.session.clone(), listeners)
        };

        for listener in listeners {
            listener(&snapshot);
        }
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscription
///
/// Handle returned by `SessionStore::subscribe`.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<StoreInner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}
