//! Screens the router can mount. Each view fetches through the facade,
//! draws into its container and releases whatever widgets it created in
//! `cleanup`.

pub mod calendar;
pub mod dashboard;
pub mod maintenance_form;
pub mod pending_tasks;
pub mod reports;
pub mod schedules;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::error::{PortalError, Result};
use crate::facade::DataAccess;
use crate::filter::DerivedFilter;
use crate::host::Host;
use crate::model::{Frequency, RecordStatus};
use crate::prefs::Preferences;
use crate::session::SessionManager;
use crate::widgets::export::ExportFormat;
use crate::widgets::photos::PhotoFile;

pub const DASHBOARD: &str = "dashboard";
pub const CALENDAR: &str = "calendar";
pub const PENDING_TASKS: &str = "pending-tasks";
pub const MAINTENANCE_FORM: &str = "maintenance-form";
pub const REPORTS: &str = "reports";
pub const SCHEDULES: &str = "schedules";

/// Container that holds whichever modal the mounted view has open.
pub const MODAL_ROOT: &str = "modal-root";

/// Everything a view may touch during one mount. `cancel` fires when the
/// router moves on.
#[derive(Clone)]
pub struct RenderContext {
    pub data: Arc<DataAccess>,
    pub session: Arc<SessionManager>,
    pub prefs: Arc<Preferences>,
    pub host: Arc<dyn Host>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewParams {
    pub record_id: Option<String>,
    pub year: Option<i32>,
    pub filter: Option<DerivedFilter>,
    /// Starting values for a new record opened from a calendar entry.
    pub prefill: Option<Prefill>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefill {
    pub machine_id: String,
    pub schedule_id: Option<String>,
    pub maintenance_type: String,
    pub scheduled_date: NaiveDate,
}

impl ViewParams {
    pub fn record(id: &str) -> Self {
        Self {
            record_id: Some(id.to_string()),
            ..Self::default()
        }
    }
}

/// A request to move to another view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub view: String,
    pub params: ViewParams,
}

impl Navigation {
    pub fn to(view: &str, params: ViewParams) -> Self {
        Self {
            view: view.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCard {
    Machines,
    Schedules,
    Pending,
    Overdue,
    CompletedThisMonth,
}

/// Raw values of the maintenance form as the page submits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSubmission {
    pub machine_id: Option<String>,
    pub maintenance_type: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub duration_minutes: Option<String>,
    pub notes: Option<String>,
    /// Checklist inputs keyed by item id.
    pub checklist: BTreeMap<String, String>,
    /// `Completed` routes the save through completion.
    pub status: Option<RecordStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleDraft {
    pub machine_id: String,
    pub maintenance_type: String,
    pub frequency: Frequency,
    pub months: Vec<u32>,
    pub description: Option<String>,
    pub is_active: bool,
}

/// User interactions routed to the mounted view.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Reload,
    Back,
    CloseModal,
    OpenStat(StatCard),
    SelectYear(i32),
    OpenEvent(String),
    ExportCalendar,
    ApplyFilter(DerivedFilter),
    StartTask(String),
    AddPhotos(Vec<PhotoFile>),
    RemoveStagedPhoto(usize),
    RemoveExistingPhoto(usize),
    Submit(FormSubmission),
    Generate {
        from: NaiveDate,
        to: NaiveDate,
        status: Option<RecordStatus>,
    },
    Export(ExportFormat),
    NewSchedule,
    EditSchedule(String),
    FrequencyChanged(Frequency),
    SaveSchedule {
        id: Option<String>,
        draft: ScheduleDraft,
    },
    DeleteSchedule(String),
    Regenerate(Vec<i32>),
}

#[async_trait]
pub trait View: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&mut self, container: &str, params: &ViewParams, ctx: &RenderContext) -> Result<()>;

    /// Releases chart and calendar handles. Called once before the next
    /// view renders.
    fn cleanup(&mut self, host: &dyn Host);

    /// Views without interactions ignore every action.
    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        let _ = (action, ctx);
        Ok(None)
    }

    fn on_theme_change(&self, _host: &dyn Host, _dark: bool) {}

    fn on_resize(&self, _host: &dyn Host) {}
}

/// Writes `html` unless the mount has already been abandoned.
pub(crate) fn draw(ctx: &RenderContext, container: &str, html: &str) -> Result<()> {
    if ctx.cancel.is_cancelled() {
        return Err(PortalError::Cancelled);
    }
    ctx.host.set_html(container, html);
    Ok(())
}

pub(crate) fn open_modal(ctx: &RenderContext, id: &str, title: &str, body: &str) -> Result<()> {
    draw(ctx, MODAL_ROOT, &crate::widgets::html::modal(id, title, body, true))
}

pub(crate) fn close_modal(host: &dyn Host) {
    host.set_html(MODAL_ROOT, "");
}

/// Text for a blocking notice: validation messages one per line, anything
/// else through its display form.
pub(crate) fn notice_text(err: &PortalError) -> String {
    match err {
        PortalError::Validation(messages) => messages.join("\n"),
        other => other.to_string(),
    }
}

/// Shows `err` to the user with `prefix` and hands it back. Session and
/// cancellation errors stay silent.
pub(crate) fn alert(ctx: &RenderContext, prefix: &str, err: PortalError) -> PortalError {
    match &err {
        PortalError::Cancelled | PortalError::Authentication => {}
        PortalError::Validation(_) => ctx.host.notify(&notice_text(&err)),
        other => ctx.host.notify(&format!("{prefix}: {other}")),
    }
    err
}
