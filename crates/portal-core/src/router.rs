//! View registry and the router that owns the single mounted view.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PortalError, Result};
use crate::facade::DataAccess;
use crate::host::Host;
use crate::prefs::{Preferences, Theme};
use crate::session::{SessionManager, SessionState};
use crate::views::calendar::CalendarView;
use crate::views::dashboard::DashboardView;
use crate::views::maintenance_form::MaintenanceFormView;
use crate::views::pending_tasks::PendingTasksView;
use crate::views::reports::ReportsView;
use crate::views::schedules::SchedulesView;
use crate::views::{self, Action, RenderContext, View, ViewParams, notice_text};
use crate::widgets::html;

pub const MAIN_CONTAINER: &str = "main-content";
const LOAD_FAILED_TITLE: &str = "View yüklenemedi";

pub type ViewFactory = Box<dyn Fn() -> Box<dyn View> + Send + Sync>;

/// Maps view names to constructors. Every mount gets a fresh instance.
#[derive(Default)]
pub struct ViewRegistry {
    factories: BTreeMap<String, ViewFactory>,
}

impl ViewRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The six portal screens.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(views::DASHBOARD, || Box::new(DashboardView::new()));
        registry.register(views::CALENDAR, || Box::new(CalendarView::new()));
        registry.register(views::PENDING_TASKS, || Box::new(PendingTasksView::new()));
        registry.register(views::MAINTENANCE_FORM, || Box::new(MaintenanceFormView::new()));
        registry.register(views::REPORTS, || Box::new(ReportsView::new()));
        registry.register(views::SCHEDULES, || Box::new(SchedulesView::new()));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn View> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    fn build(&self, name: &str) -> Option<Box<dyn View>> {
        self.factories.get(name).map(|factory| factory())
    }
}

struct Mounted {
    name: String,
    view: Box<dyn View>,
    params: ViewParams,
    cancel: CancellationToken,
    failed: bool,
}

pub struct Router {
    registry: ViewRegistry,
    data: Arc<DataAccess>,
    session: Arc<SessionManager>,
    prefs: Arc<Preferences>,
    host: Arc<dyn Host>,
    current: Option<Mounted>,
}

impl Router {
    pub fn new(
        registry: ViewRegistry,
        data: Arc<DataAccess>,
        prefs: Arc<Preferences>,
        host: Arc<dyn Host>,
    ) -> Self {
        let session = data.session().clone();
        Self {
            registry,
            data,
            session,
            prefs,
            host,
            current: None,
        }
    }

    pub fn current_view(&self) -> Option<&str> {
        self.current.as_ref().map(|m| m.name.as_str())
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn context(&self, cancel: CancellationToken) -> RenderContext {
        RenderContext {
            data: self.data.clone(),
            session: self.session.clone(),
            prefs: self.prefs.clone(),
            host: self.host.clone(),
            cancel,
        }
    }

    /// Recovers the session and, when signed in, starts the idle timer,
    /// applies the stored theme and opens the last view.
    #[tracing::instrument(skip(self))]
    pub async fn start(&mut self) -> SessionState {
        let state = self.session.init().await;
        if state != SessionState::Authenticated {
            warn!(?state, "portal not started; no authenticated user");
            return state;
        }
        self.session.record_activity(self.data.now());
        self.session.start_inactivity_timer();
        self.host.apply_theme(self.prefs.theme());
        let first = self
            .prefs
            .last_view()
            .unwrap_or_else(|| views::DASHBOARD.to_string());
        self.show_view(&first, ViewParams::default()).await;
        info!("portal started");
        state
    }

    /// Replaces the mounted view. Unknown names fall back to the dashboard;
    /// render failures become an error panel. Returns the mounted name.
    #[tracing::instrument(skip(self, params))]
    pub async fn show_view(&mut self, name: &str, params: ViewParams) -> String {
        self.unmount();

        let name = if self.registry.contains(name) {
            name.to_string()
        } else {
            warn!(view = name, "unknown view; showing dashboard");
            views::DASHBOARD.to_string()
        };
        let Some(mut view) = self.registry.build(&name) else {
            error!(view = %name, "no factory registered for fallback view");
            self.host.set_html(
                MAIN_CONTAINER,
                &html::error_panel(LOAD_FAILED_TITLE, &format!("bilinmeyen görünüm: {name}"), None),
            );
            return name;
        };

        self.host.set_active_nav(&name);
        self.host
            .set_html(MAIN_CONTAINER, &html::loading("Yükleniyor..."));

        let cancel = CancellationToken::new();
        let ctx = self.context(cancel.clone());
        let outcome = view.render(MAIN_CONTAINER, &params, &ctx).await;
        let failed = outcome.is_err();
        match outcome {
            Ok(()) => {
                if let Err(err) = self.prefs.set_last_view(&name) {
                    warn!(error = %err, "last view not saved");
                }
                debug!(view = %name, "view rendered");
            }
            Err(PortalError::Cancelled) => debug!(view = %name, "render abandoned"),
            Err(PortalError::Authentication) => debug!(view = %name, "render stopped; signed out"),
            Err(err) => {
                error!(view = %name, error = %err, "view render failed");
                self.host.set_html(
                    MAIN_CONTAINER,
                    &html::error_panel(LOAD_FAILED_TITLE, &notice_text(&err), err.status()),
                );
            }
        }

        self.current = Some(Mounted {
            name: name.clone(),
            view,
            params,
            cancel,
            failed,
        });
        name
    }

    /// Renders the mounted view again with the parameters it was opened with.
    pub async fn refresh_current_view(&mut self) -> Option<String> {
        let (name, params) = self
            .current
            .as_ref()
            .map(|m| (m.name.clone(), m.params.clone()))?;
        Some(self.show_view(&name, params).await)
    }

    /// Sends `action` to the mounted view and follows any navigation it
    /// asks for. A reload after a failed render re-mounts the view.
    pub async fn dispatch(&mut self, action: Action) -> Result<()> {
        self.session.record_activity(self.data.now());
        let Some((failed, cancel)) = self
            .current
            .as_ref()
            .map(|m| (m.failed, m.cancel.clone()))
        else {
            debug!(?action, "no view mounted; action dropped");
            return Ok(());
        };
        if action == Action::Reload && failed {
            self.refresh_current_view().await;
            return Ok(());
        }

        let ctx = self.context(cancel);
        let Some(mounted) = self.current.as_mut() else {
            return Ok(());
        };
        match mounted.view.dispatch(action, &ctx).await {
            Ok(Some(nav)) => {
                self.show_view(&nav.view, nav.params).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                match &err {
                    PortalError::Cancelled | PortalError::Authentication => {
                        debug!(error = %err, "action interrupted")
                    }
                    PortalError::Validation(_) => warn!(error = %err, "action rejected"),
                    _ => error!(error = %err, "action failed"),
                }
                Err(err)
            }
        }
    }

    pub fn record_activity(&self) {
        self.session.record_activity(self.data.now());
    }

    pub fn toggle_theme(&self) -> Theme {
        let theme = self.prefs.theme().toggled();
        if let Err(err) = self.prefs.set_theme(theme) {
            warn!(error = %err, "theme not saved");
        }
        self.host.apply_theme(theme);
        if let Some(mounted) = &self.current {
            mounted.view.on_theme_change(self.host.as_ref(), theme.is_dark());
        }
        info!(theme = theme.as_str(), "theme toggled");
        theme
    }

    pub fn handle_resize(&self) {
        if let Some(mounted) = &self.current {
            mounted.view.on_resize(self.host.as_ref());
        }
    }

    pub async fn logout(&mut self) {
        self.unmount();
        self.session.logout().await;
    }

    fn unmount(&mut self) {
        if let Some(mut mounted) = self.current.take() {
            mounted.cancel.cancel();
            mounted.view.cleanup(self.host.as_ref());
            debug!(view = %mounted.name, "view cleaned up");
        }
    }
}
