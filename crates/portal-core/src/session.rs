//! Authenticated-user lifecycle: recovery at start, auth events, idle
//! timeout and logout.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{AuthEvent, Backend, Session, User};
use crate::config::SessionSettings;
use crate::error::{PortalError, Result};
use crate::host::Host;
use crate::prefs::Preferences;

pub const LOGIN_URL: &str = "/";
const FALLBACK_DISPLAY_NAME: &str = "Kullanıcı";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Authenticating,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
    user: Option<User>,
    /// Last-activity stamp that already triggered an idle logout.
    idle_fired_for: Option<DateTime<Utc>>,
}

pub struct SessionManager {
    backend: Arc<dyn Backend>,
    prefs: Arc<Preferences>,
    host: Arc<dyn Host>,
    settings: SessionSettings,
    inner: Mutex<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        prefs: Arc<Preferences>,
        host: Arc<dyn Host>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            prefs,
            host,
            settings,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                session: None,
                user: None,
                idle_fired_for: None,
            }),
            listener: Mutex::new(None),
            timer: Mutex::new(None),
        })
    }

    /// Recovers the platform session, retrying once after `retry_delay`.
    /// With no session (or on error) the page is sent to login.
    #[tracing::instrument(skip(self))]
    pub async fn init(self: &Arc<Self>) -> SessionState {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Authenticated | SessionState::Authenticating => {
                    debug!(state = ?inner.state, "session already initialised");
                    return inner.state;
                }
                _ => inner.state = SessionState::Authenticating,
            }
        }

        match self.recover_session().await {
            Ok(Some(session)) => {
                info!(user = ?session.user.email, "user authenticated");
                self.establish(session);
                self.spawn_listener();
                SessionState::Authenticated
            }
            Ok(None) => {
                info!("no session found; redirecting to login");
                self.inner.lock().state = SessionState::Unauthenticated;
                self.redirect_to_login();
                SessionState::Unauthenticated
            }
            Err(err) => {
                error!(error = %err, "auth initialisation failed");
                self.inner.lock().state = SessionState::Unauthenticated;
                self.redirect_to_login();
                SessionState::Unauthenticated
            }
        }
    }

    async fn recover_session(&self) -> Result<Option<Session>> {
        if let Some(session) = self.backend.get_session().await? {
            return Ok(Some(session));
        }
        debug!(delay = ?self.settings.retry_delay, "no session yet; retrying once");
        tokio::time::sleep(self.settings.retry_delay).await;
        self.backend.get_session().await
    }

    /// Exchanges a bearer token for a session and starts listening for auth
    /// events.
    #[tracing::instrument(skip(self, token))]
    pub async fn sign_in_with_token(self: &Arc<Self>, token: &str) -> Result<User> {
        self.inner.lock().state = SessionState::Authenticating;
        match self.backend.authenticate(token).await {
            Ok(session) => {
                let user = session.user.clone();
                self.establish(session);
                self.spawn_listener();
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "token sign-in failed");
                self.inner.lock().state = SessionState::Unauthenticated;
                Err(err)
            }
        }
    }

    fn establish(&self, session: Session) {
        {
            let mut inner = self.inner.lock();
            inner.user = Some(session.user.clone());
            inner.session = Some(session.clone());
            inner.state = SessionState::Authenticated;
        }
        if let Err(err) = self.prefs.save_session(&session) {
            error!(error = %err, "session save failed");
        }
    }

    fn spawn_listener(self: &Arc<Self>) {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return;
        }
        let mut events = self.backend.subscribe_auth();
        let weak: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "auth listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.apply_auth_event(event);
            }
        }));
    }

    /// Reacts to one platform auth event.
    pub fn apply_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => {
                debug!("auth event: signed in");
                self.establish(session);
            }
            AuthEvent::SignedOut => {
                if self.state() != SessionState::Authenticated {
                    debug!("auth event: signed out, already cleared");
                    return;
                }
                info!("auth event: signed out");
                self.clear_local();
                self.redirect_to_login();
            }
            AuthEvent::TokenRefreshed(session) => {
                debug!("auth event: token refreshed");
                self.inner.lock().session = Some(session.clone());
                if let Err(err) = self.prefs.save_session(&session) {
                    error!(error = %err, "session save failed");
                }
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().user.is_some()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.lock().session.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.lock().user.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.lock().user.as_ref().map(|u| u.id.clone())
    }

    pub fn user_email(&self) -> Option<String> {
        self.inner.lock().user.as_ref().and_then(|u| u.email.clone())
    }

    pub fn display_name(&self) -> String {
        self.inner
            .lock()
            .user
            .as_ref()
            .and_then(User::display_name)
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string())
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.inner.lock().user.as_ref().and_then(User::avatar_url)
    }

    pub fn token(&self) -> Option<String> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    // Role checks are plain authentication for now.
    pub fn can_perform_maintenance(&self) -> bool {
        self.is_authenticated()
    }

    pub fn can_manage(&self) -> bool {
        self.is_authenticated()
    }

    #[tracing::instrument(skip(self, metadata))]
    pub async fn update_profile(&self, metadata: Map<String, Value>) -> Result<User> {
        if !self.is_authenticated() {
            return Err(PortalError::Authentication);
        }
        let user = self.backend.update_user(metadata).await?;
        let session = {
            let mut inner = self.inner.lock();
            inner.user = Some(user.clone());
            if let Some(session) = inner.session.as_mut() {
                session.user = user.clone();
            }
            inner.session.clone()
        };
        if let Some(session) = session {
            self.prefs.save_session(&session)?;
        }
        Ok(user)
    }

    /// Called on tracked input (pointer, key, scroll, touch).
    pub fn record_activity(&self, now: DateTime<Utc>) {
        if !self.is_authenticated() {
            return;
        }
        if let Err(err) = self.prefs.set_last_activity(now) {
            error!(error = %err, "activity record failed");
        }
    }

    /// True when the last-activity stamp is older than the idle timeout and
    /// has not already triggered a logout.
    pub fn inactivity_tick(&self, now: DateTime<Utc>) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let Some(last) = self.prefs.last_activity() else {
            return false;
        };
        let idle = now.signed_duration_since(last);
        let limit = chrono::Duration::from_std(self.settings.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(15));
        if idle <= limit {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.idle_fired_for == Some(last) {
            return false;
        }
        inner.idle_fired_for = Some(last);
        true
    }

    /// One timer tick: logs out when the session went idle.
    pub async fn check_inactivity(&self, now: DateTime<Utc>) -> bool {
        if !self.inactivity_tick(now) {
            return false;
        }
        info!("auto-logout due to inactivity");
        self.logout().await;
        true
    }

    pub fn start_inactivity_timer(self: &Arc<Self>) {
        self.stop_inactivity_timer();
        let weak = Arc::downgrade(self);
        let period = self.settings.check_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if manager.check_inactivity(Utc::now()).await {
                    break;
                }
            }
        });
        *self.timer.lock() = Some(handle);
    }

    pub fn stop_inactivity_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    pub fn inactivity_timer_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Remote sign-out is best effort; the local session is always cleared.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        info!("logout started");
        if let Err(err) = self.backend.sign_out().await {
            warn!(error = %err, "remote sign-out failed; clearing local session anyway");
        }
        self.clear_local();
        self.redirect_to_login();
    }

    fn clear_local(&self) {
        {
            let mut inner = self.inner.lock();
            inner.user = None;
            inner.session = None;
            inner.state = SessionState::Unauthenticated;
        }
        if let Err(err) = self.prefs.clear() {
            error!(error = %err, "session clear failed");
        }
    }

    pub fn redirect_to_login(&self) {
        self.stop_inactivity_timer();
        self.host.redirect(LOGIN_URL);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
