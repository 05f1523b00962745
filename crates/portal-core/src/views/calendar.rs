//! Year calendar. The widget is rebuilt from scratch whenever the year
//! changes.

use async_trait::async_trait;
use chrono::Datelike;
use tracing::{info, warn};

use super::{
    Action, MAINTENANCE_FORM, Navigation, Prefill, RenderContext, View, ViewParams, close_modal,
    draw, open_modal,
};
use crate::datetime::{format_date, format_time};
use crate::error::{PortalError, Result};
use crate::host::{CalendarEntry, Host, WidgetId};
use crate::model::CalendarEvent;
use crate::widgets::export::{self, ExportFormat};
use crate::widgets::html::{self, escape};

pub const CALENDAR_CONTAINER: &str = "calendar-container";
const EVENT_MODAL: &str = "event-modal";

#[derive(Default)]
pub struct CalendarView {
    year: i32,
    events: Vec<CalendarEvent>,
    widget: Option<WidgetId>,
}

impl CalendarView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    fn destroy_widget(&mut self, host: &dyn Host) {
        if let Some(id) = self.widget.take() {
            host.destroy_widget(id);
        }
    }

    async fn mount(&mut self, ctx: &RenderContext) -> Result<()> {
        self.destroy_widget(ctx.host.as_ref());
        let events = ctx.data.get_year_calendar(self.year, &ctx.cancel).await?;
        if ctx.cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }
        let entries = events.iter().map(entry).collect::<Vec<_>>();
        self.widget = Some(ctx.host.mount_calendar(CALENDAR_CONTAINER, &entries));
        self.events = events;
        Ok(())
    }

    async fn select_year(&mut self, year: i32, ctx: &RenderContext) -> Result<()> {
        self.year = year;
        if let Err(err) = ctx.prefs.set_calendar_year(year) {
            warn!(error = %err, "calendar year not persisted");
        }
        draw(ctx, CALENDAR_CONTAINER, &html::loading("Takvim yükleniyor..."))?;
        match self.mount(ctx).await {
            Ok(()) => {
                info!(year, events = self.events.len(), "calendar switched year");
                Ok(())
            }
            Err(err @ (PortalError::Cancelled | PortalError::Authentication)) => Err(err),
            Err(err) => {
                ctx.host
                    .notify(&format!("Takvim yüklenirken hata oluştu: {err}"));
                Ok(())
            }
        }
    }

    fn event(&self, id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    async fn export(&self, ctx: &RenderContext) -> Result<()> {
        let events = ctx.data.get_year_calendar(self.year, &ctx.cancel).await?;
        let table = export::calendar_table(&events, self.year);
        let file = export::download(
            &table,
            ExportFormat::Xlsx,
            &format!("bakim_takvimi_{}", self.year),
            ctx.data.now(),
            ctx.data.policy(),
        )?;
        ctx.host.download(file);
        ctx.host.notify("Takvim başarıyla Excel'e aktarıldı!");
        Ok(())
    }
}

#[async_trait]
impl View for CalendarView {
    fn name(&self) -> &'static str {
        super::CALENDAR
    }

    #[tracing::instrument(skip_all)]
    async fn render(&mut self, container: &str, params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        let current = ctx.data.policy().today(ctx.data.now()).year();
        self.year = params
            .year
            .or_else(|| ctx.prefs.calendar_year())
            .unwrap_or(current);
        draw(ctx, container, &page_html(self.year, current))?;
        self.mount(ctx).await
    }

    fn cleanup(&mut self, host: &dyn Host) {
        self.destroy_widget(host);
        close_modal(host);
        self.events.clear();
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::SelectYear(year) => self.select_year(year, ctx).await?,
            Action::OpenEvent(id) => match self.event(&id) {
                Some(event) => open_modal(ctx, EVENT_MODAL, "Bakım Detayı", &event_detail(event))?,
                None => warn!(event = %id, "calendar event not loaded"),
            },
            Action::CloseModal => close_modal(ctx.host.as_ref()),
            Action::StartTask(id) => {
                let Some(event) = self.event(&id) else {
                    return Ok(None);
                };
                let params = ViewParams {
                    prefill: Some(Prefill {
                        machine_id: event.machine_id.clone(),
                        schedule_id: event.schedule_id.clone(),
                        maintenance_type: event.maintenance_type.clone(),
                        scheduled_date: event.scheduled_date,
                    }),
                    ..ViewParams::default()
                };
                close_modal(ctx.host.as_ref());
                return Ok(Some(Navigation::to(MAINTENANCE_FORM, params)));
            }
            Action::ExportCalendar => {
                if let Err(err) = self.export(ctx).await {
                    if err.is_cancelled() {
                        return Err(err);
                    }
                    ctx.host.notify(&format!("Export hatası: {err}"));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn on_resize(&self, host: &dyn Host) {
        if let Some(id) = self.widget {
            host.resize_widget(id);
        }
    }
}

fn entry(event: &CalendarEvent) -> CalendarEntry {
    CalendarEntry {
        id: event.id.clone(),
        title: event.title(),
        start: event.scheduled_date.to_string(),
        color: event.color().to_string(),
    }
}

/// Current year minus one through current year plus three.
fn year_options(selected: i32, current: i32) -> String {
    (current - 1..=current + 3)
        .map(|year| {
            let mark = if year == selected { " selected" } else { "" };
            format!(r#"<option value="{year}"{mark}>{year}</option>"#)
        })
        .collect()
}

fn page_html(selected: i32, current: i32) -> String {
    format!(
        r#"<div class="calendar-view">
  <div class="calendar-header">
    <h1>Bakım Takvimi</h1>
    <div class="calendar-controls">
      <select id="year-selector" class="select-input">{}</select>
      <button class="btn btn-secondary" data-action="export-calendar">📥 Excel İndir</button>
    </div>
  </div>
  <div id="{CALENDAR_CONTAINER}"></div>
</div>"#,
        year_options(selected, current)
    )
}

fn event_detail(event: &CalendarEvent) -> String {
    let machine = event
        .machine
        .as_ref()
        .map(|m| escape(&m.display()))
        .unwrap_or_else(|| "-".to_string());
    let frequency = event.frequency.map(|f| f.label()).unwrap_or("-");
    let notes = event
        .notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("<p><strong>Notlar:</strong> {}</p>", escape(n)))
        .unwrap_or_default();
    format!(
        r#"<div class="event-detail">
  <p><strong>Makine:</strong> {machine}</p>
  <p><strong>Bakım Tipi:</strong> {}</p>
  <p><strong>Tarih:</strong> {}</p>
  <p><strong>Saat:</strong> {}</p>
  <p><strong>Durum:</strong> {}</p>
  <p><strong>Frekans:</strong> {frequency}</p>
  {notes}
</div>
<div class="modal-actions">
  <button class="btn btn-primary" data-action="start-task" data-id="{}">Bakımı Gerçekleştir</button>
  <button class="btn btn-secondary" data-action="close-modal">Kapat</button>
</div>"#,
        escape(&event.maintenance_type),
        format_date(event.scheduled_date),
        format_time(event.scheduled_time.as_deref()),
        html::status_badge(event.status),
        escape(&event.id),
    )
}
