//! Session store: identity-provider sign-in, the session state machine and
//! the user's profile document.
//!
//! The state only becomes `SignedIn` when the provider reports a principal
//! through its token-change events. Signing out tears down every dependent
//! store and every live subscription before the session reports `SignedOut`.

use super::{SessionAware, lock};
use crate::config::IdentityConfig;
use crate::db::now_ms;
use crate::error::{AppError, AppResult, AuthError};
use crate::gateway::Gateway;
use crate::routes::Route;
use crate::subscriptions::SubscriptionRegistry;
use crate::toast::ToastCenter;
use crate::types::{AuthUser, USERS, UserProfile};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Open the sign-in popup. The principal arrives through [`auth_events`](Self::auth_events).
    async fn sign_in_with_popup(&self) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Token-change events: `Some` on sign-in or refresh, `None` on sign-out.
    fn auth_events(&self) -> broadcast::Receiver<Option<AuthUser>>;
}

/// Provider that signs in the principal declared in configuration.
pub struct ConfiguredIdentityProvider {
    user: AuthUser,
    events: broadcast::Sender<Option<AuthUser>>,
}

impl ConfiguredIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            user: AuthUser {
                uid: config.uid.clone(),
                display_name: config.display_name.clone(),
                email: config.email.clone(),
                photo_url: config.photo_url.clone(),
            },
            events,
        }
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }
}

#[async_trait]
impl IdentityProvider for ConfiguredIdentityProvider {
    async fn sign_in_with_popup(&self) -> Result<(), AuthError> {
        if self.user.uid.trim().is_empty() {
            return Err(AuthError::new("auth/user-disabled", "No identity configured"));
        }
        // Nobody listening just means the event is dropped.
        let _ = self.events.send(Some(self.user.clone()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let _ = self.events.send(None);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<Option<AuthUser>> {
        self.events.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    SigningIn,
    SignedIn { user: AuthUser },
    SigningOut,
}

impl SessionState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionState::SignedIn { user } => Some(user),
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, SessionState::SigningIn | SessionState::SigningOut)
    }
}

pub struct SessionStore {
    gateway: Gateway,
    registry: Arc<SubscriptionRegistry>,
    toasts: Arc<ToastCenter>,
    provider: Arc<dyn IdentityProvider>,
    dependents: Vec<Arc<dyn SessionAware>>,
    state: watch::Sender<SessionState>,
    profile: Mutex<Option<UserProfile>>,
}

impl SessionStore {
    pub fn new(
        gateway: Gateway,
        registry: Arc<SubscriptionRegistry>,
        toasts: Arc<ToastCenter>,
        provider: Arc<dyn IdentityProvider>,
        dependents: Vec<Arc<dyn SessionAware>>,
    ) -> Self {
        Self {
            gateway,
            registry,
            toasts,
            provider,
            dependents,
            state: watch::Sender::new(SessionState::SignedOut),
            profile: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().user().cloned()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.borrow().user().is_some()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        lock(&self.profile).clone()
    }

    /// Follow state changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until no sign-in or sign-out is in flight.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| !s.is_transient()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(?state, "Session state");
        self.state.send_replace(state);
    }

    /// Open the provider popup. The session moves to `SigningIn` and stays
    /// there until the provider's token-change event arrives.
    pub async fn sign_in(&self) -> AppResult<()> {
        let mut already_signed_in = false;
        let started = self.state.send_if_modified(|state| match state {
            SessionState::SignedOut => {
                *state = SessionState::SigningIn;
                true
            }
            SessionState::SignedIn { .. } => {
                already_signed_in = true;
                false
            }
            _ => false,
        });
        if already_signed_in {
            return Ok(());
        }
        if !started {
            let err = AuthError::new(
                "auth/cancelled-popup-request",
                "A sign-in or sign-out is already in progress",
            );
            self.toasts.auth_failure(&err);
            return Err(AppError::auth(&err));
        }

        info!("Opening sign-in popup");
        if let Err(err) = self.provider.sign_in_with_popup().await {
            warn!(code = %err.code, error = %err.message, "Sign-in failed");
            self.set_state(SessionState::SignedOut);
            self.toasts.auth_failure(&err);
            return Err(AppError::auth(&err));
        }
        Ok(())
    }

    /// Apply a token-change event from the identity provider.
    pub fn on_auth_state_changed(&self, user: Option<AuthUser>) -> AppResult<()> {
        match user {
            Some(user) => {
                if let Some(current) = self.current_user() {
                    if current.uid == user.uid {
                        debug!(uid = %user.uid, "Token refreshed");
                        return Ok(());
                    }
                    self.teardown();
                }

                let profile = match self.upsert_profile(&user) {
                    Ok(profile) => profile,
                    Err(err) => {
                        self.set_state(SessionState::SignedOut);
                        self.toasts.report(&err);
                        return Err(err);
                    }
                };
                *lock(&self.profile) = Some(profile.clone());
                self.set_state(SessionState::SignedIn { user: user.clone() });

                for store in &self.dependents {
                    if let Err(err) = store.signed_in(&user) {
                        warn!(store = store.name(), error = %err, "Store failed to start");
                        self.toasts.report(&err);
                    }
                }
                info!(uid = %user.uid, login_count = profile.login_count, "Signed in");
                Ok(())
            }
            None => {
                // A sign-out event queued before the current popup opened.
                if matches!(self.state(), SessionState::SignedOut | SessionState::SigningIn) {
                    return Ok(());
                }
                self.teardown();
                self.set_state(SessionState::SignedOut);
                info!("Session ended by identity provider");
                Ok(())
            }
        }
    }

    /// Sign out through the provider, then drop all user data. Returns where
    /// to navigate next.
    pub async fn sign_out(&self) -> AppResult<Route> {
        let previous = self.state();
        if previous.user().is_none() {
            return Ok(Route::Login);
        }
        self.set_state(SessionState::SigningOut);

        if let Err(err) = self.provider.sign_out().await {
            warn!(code = %err.code, error = %err.message, "Sign-out failed");
            self.set_state(previous);
            self.toasts.auth_failure(&err);
            return Err(AppError::auth(&err));
        }

        self.teardown();
        self.set_state(SessionState::SignedOut);
        info!("Signed out");
        Ok(Route::Login)
    }

    /// Cancel every subscription, then clear every dependent store.
    fn teardown(&self) {
        let cancelled = self.registry.cancel_all();
        for store in &self.dependents {
            store.signed_out();
        }
        *lock(&self.profile) = None;
        debug!(cancelled, stores = self.dependents.len(), "Session torn down");
    }

    fn upsert_profile(&self, user: &AuthUser) -> AppResult<UserProfile> {
        let now = now_ms();
        match self.gateway.get(USERS, &user.uid)? {
            None => {
                let profile = UserProfile {
                    uid: user.uid.clone(),
                    display_name: user.display_name.clone(),
                    email: user.email.clone(),
                    photo_url: user.photo_url.clone(),
                    login_count: 1,
                    created_at: now,
                    last_login_at: now,
                };
                let mut data = serde_json::to_value(&profile).map_err(AppError::internal)?;
                if let Value::Object(ref mut map) = data {
                    map.remove("id");
                }
                self.gateway.set(USERS, &user.uid, data)?;
                info!(uid = %user.uid, "Profile created");
                Ok(profile)
            }
            Some(doc) => {
                let existing: UserProfile = doc.decode()?;
                let profile = UserProfile {
                    display_name: user.display_name.clone().or(existing.display_name),
                    email: user.email.clone().or(existing.email),
                    photo_url: user.photo_url.clone().or(existing.photo_url),
                    login_count: existing.login_count.saturating_add(1),
                    last_login_at: now,
                    ..existing
                };
                self.gateway.update(
                    USERS,
                    &user.uid,
                    json!({
                        "display_name": profile.display_name,
                        "email": profile.email,
                        "photo_url": profile.photo_url,
                        "login_count": profile.login_count,
                        "last_login_at": profile.last_login_at,
                    }),
                )?;
                Ok(profile)
            }
        }
    }

    /// Apply the provider's token-change events until the provider goes away.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.provider.auth_events();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(user) => {
                        if let Err(err) = session.on_auth_state_changed(user) {
                            warn!(error = %err, "Auth state change failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed auth state changes");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auth event listener stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Query};
    use crate::error::{ErrorCode, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Dependent that holds a live subscription while signed in.
    struct Recorder {
        gateway: Gateway,
        registry: Arc<SubscriptionRegistry>,
        started: AtomicUsize,
        cleared: AtomicUsize,
    }

    impl SessionAware for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn signed_in(&self, _user: &AuthUser) -> AppResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let sub = self.gateway.on_snapshot(Query::collection("tasks"), |_| {})?;
            self.registry.replace("recorder", sub);
            Ok(())
        }

        fn signed_out(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingProvider {
        code: &'static str,
        events: broadcast::Sender<Option<AuthUser>>,
    }

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn sign_in_with_popup(&self) -> Result<(), AuthError> {
            Err(AuthError::new(self.code, "provider says no"))
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Err(AuthError::new(self.code, "provider says no"))
        }

        fn auth_events(&self) -> broadcast::Receiver<Option<AuthUser>> {
            self.events.subscribe()
        }
    }

    struct Fixture {
        session: Arc<SessionStore>,
        recorder: Arc<Recorder>,
        registry: Arc<SubscriptionRegistry>,
        gateway: Gateway,
        toasts: Arc<ToastCenter>,
    }

    fn setup(provider: Arc<dyn IdentityProvider>) -> Fixture {
        let gateway = Gateway::new(Database::open_in_memory().unwrap());
        let registry = Arc::new(SubscriptionRegistry::new());
        let toasts = Arc::new(ToastCenter::new(60_000));
        let recorder = Arc::new(Recorder {
            gateway: gateway.clone(),
            registry: Arc::clone(&registry),
            started: AtomicUsize::new(0),
            cleared: AtomicUsize::new(0),
        });
        let session = Arc::new(SessionStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&toasts),
            provider,
            vec![recorder.clone() as Arc<dyn SessionAware>],
        ));
        Fixture {
            session,
            recorder,
            registry,
            gateway,
            toasts,
        }
    }

    fn configured() -> Arc<ConfiguredIdentityProvider> {
        Arc::new(ConfiguredIdentityProvider::new(&IdentityConfig {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            photo_url: None,
        }))
    }

    #[tokio::test]
    async fn sign_in_waits_for_the_token_event() {
        let provider = configured();
        let f = setup(provider.clone());
        let mut events = provider.auth_events();

        f.session.sign_in().await.unwrap();
        assert_eq!(f.session.state(), SessionState::SigningIn);

        let user = events.recv().await.unwrap();
        f.session.on_auth_state_changed(user).unwrap();
        assert!(f.session.is_signed_in());
        assert_eq!(f.recorder.started.load(Ordering::SeqCst), 1);
        assert!(f.registry.is_active("recorder"));
    }

    #[tokio::test]
    async fn listener_drives_the_state_machine() {
        let provider = configured();
        let f = setup(provider);
        let listener = f.session.listen();

        f.session.sign_in().await.unwrap();
        let state = f.session.settled().await;
        assert_eq!(state.user().map(|u| u.uid.as_str()), Some("u1"));

        listener.abort();
    }

    #[tokio::test]
    async fn profile_counts_logins() {
        let f = setup(configured());
        let user = AuthUser {
            uid: "u1".to_string(),
            display_name: Some("Ada".to_string()),
            email: None,
            photo_url: None,
        };

        f.session.on_auth_state_changed(Some(user.clone())).unwrap();
        let first = f.session.profile().unwrap();
        assert_eq!(first.login_count, 1);
        assert_eq!(first.created_at, first.last_login_at);

        f.session.sign_out().await.unwrap();
        f.session.on_auth_state_changed(Some(user)).unwrap();
        let second = f.session.profile().unwrap();
        assert_eq!(second.login_count, 2);
        assert_eq!(second.created_at, first.created_at);

        let stored: UserProfile = f.gateway.get(USERS, "u1").unwrap().unwrap().decode().unwrap();
        assert_eq!(stored.login_count, 2);
        assert_eq!(stored.uid, "u1");
    }

    #[tokio::test]
    async fn sign_out_tears_everything_down() {
        let f = setup(configured());
        f.session
            .on_auth_state_changed(Some(configured().user().clone()))
            .unwrap();
        assert!(!f.registry.is_empty());

        let route = f.session.sign_out().await.unwrap();
        assert_eq!(route, Route::Login);
        assert_eq!(f.session.state(), SessionState::SignedOut);
        assert!(f.registry.is_empty());
        assert_eq!(f.gateway.listener_count(), 0);
        assert_eq!(f.recorder.cleared.load(Ordering::SeqCst), 1);
        assert!(f.session.profile().is_none());
    }

    #[tokio::test]
    async fn provider_errors_map_to_toasts() {
        let (events, _) = broadcast::channel(4);
        let f = setup(Arc::new(FailingProvider {
            code: "auth/popup-blocked",
            events,
        }));

        let err = f.session.sign_in().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthProvider);
        assert_eq!(err.details.as_deref(), Some("auth/popup-blocked"));
        assert_eq!(f.session.state(), SessionState::SignedOut);

        let toast = f.toasts.active().pop().unwrap();
        assert_eq!(toast.severity, Severity::Warning);
        assert_eq!(toast.icon, "block");
    }

    #[tokio::test]
    async fn failed_sign_out_keeps_the_session() {
        let (events, _) = broadcast::channel(4);
        let f = setup(Arc::new(FailingProvider {
            code: "auth/network-request-failed",
            events,
        }));
        let user = AuthUser {
            uid: "u1".to_string(),
            display_name: None,
            email: None,
            photo_url: None,
        };
        f.session.on_auth_state_changed(Some(user)).unwrap();

        assert!(f.session.sign_out().await.is_err());
        assert!(f.session.is_signed_in());
        assert!(f.registry.is_active("recorder"));
    }

    #[tokio::test]
    async fn second_popup_is_rejected() {
        let provider = configured();
        let f = setup(provider);
        f.session.sign_in().await.unwrap();

        let err = f.session.sign_in().await.unwrap_err();
        assert_eq!(err.details.as_deref(), Some("auth/cancelled-popup-request"));
        assert_eq!(f.session.state(), SessionState::SigningIn);
    }

    #[test]
    fn provider_sign_out_event_ends_the_session() {
        let f = setup(configured());
        f.session
            .on_auth_state_changed(Some(configured().user().clone()))
            .unwrap();
        f.session.on_auth_state_changed(None).unwrap();
        assert_eq!(f.session.state(), SessionState::SignedOut);
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn stale_sign_out_event_keeps_popup_open() {
        let f = setup(configured());
        f.session.sign_in().await.unwrap();

        f.session.on_auth_state_changed(None).unwrap();
        assert_eq!(f.session.state(), SessionState::SigningIn);
    }
}
