use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Action, MAINTENANCE_FORM, Navigation, RenderContext, View, ViewParams, draw,
};
use crate::datetime::format_date;
use crate::error::Result;
use crate::filter::DerivedFilter;
use crate::host::Host;
use crate::model::{MaintenanceRecord, RecordStatus};
use crate::widgets::html::{self, escape};

pub const TASKS_CONTAINER: &str = "tasks-container";

#[derive(Default)]
pub struct PendingTasksView {
    filter: DerivedFilter,
    tasks: Vec<MaintenanceRecord>,
}

impl PendingTasksView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> DerivedFilter {
        self.filter
    }

    pub fn tasks(&self) -> &[MaintenanceRecord] {
        &self.tasks
    }

    async fn load(&mut self, ctx: &RenderContext) -> Result<()> {
        draw(ctx, TASKS_CONTAINER, &html::loading("Bakımlar yükleniyor..."))?;
        let mut tasks = ctx.data.get_pending(self.filter, &ctx.cancel).await?;
        sort_tasks(&mut tasks);
        debug!(filter = self.filter.as_str(), tasks = tasks.len(), "pending tasks loaded");
        draw(ctx, TASKS_CONTAINER, &tasks_html(&tasks, ctx))?;
        self.tasks = tasks;
        Ok(())
    }
}

#[async_trait]
impl View for PendingTasksView {
    fn name(&self) -> &'static str {
        super::PENDING_TASKS
    }

    #[tracing::instrument(skip_all)]
    async fn render(&mut self, container: &str, params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        self.filter = params
            .filter
            .or_else(|| stored_filter(ctx))
            .unwrap_or_default();
        draw(ctx, container, &page_html(self.filter))?;
        self.load(ctx).await
    }

    fn cleanup(&mut self, _host: &dyn Host) {
        self.tasks.clear();
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::ApplyFilter(filter) => {
                self.filter = filter;
                if let Err(err) = ctx
                    .prefs
                    .set_table_filter(super::PENDING_TASKS, Value::from(filter.as_str()))
                {
                    warn!(error = %err, "filter preference not saved");
                }
                self.load(ctx).await?;
            }
            Action::StartTask(id) => {
                return Ok(Some(Navigation::to(MAINTENANCE_FORM, ViewParams::record(&id))));
            }
            Action::Reload => self.load(ctx).await?,
            _ => {}
        }
        Ok(None)
    }
}

fn stored_filter(ctx: &RenderContext) -> Option<DerivedFilter> {
    ctx.prefs
        .table_filter(super::PENDING_TASKS)?
        .as_str()?
        .parse()
        .ok()
}

/// Overdue first, then earliest scheduled date.
pub fn sort_tasks(tasks: &mut [MaintenanceRecord]) {
    tasks.sort_by(|a, b| {
        let a_late = a.status == RecordStatus::Overdue;
        let b_late = b.status == RecordStatus::Overdue;
        match (a_late, b_late) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.scheduled_date.cmp(&b.scheduled_date),
        }
    });
}

fn filter_icon(filter: DerivedFilter) -> &'static str {
    match filter {
        DerivedFilter::Today => "📍",
        DerivedFilter::Next7Days => "📅",
        DerivedFilter::ThisMonth => "📆",
        DerivedFilter::Overdue => "⚠️",
        DerivedFilter::All => "📋",
    }
}

fn page_html(active: DerivedFilter) -> String {
    let buttons = DerivedFilter::ALL
        .iter()
        .map(|f| {
            let class = if *f == active { "filter-btn active" } else { "filter-btn" };
            format!(
                r#"<button class="{class}" data-filter="{}">{} {}</button>"#,
                f.as_str(),
                filter_icon(*f),
                f.label()
            )
        })
        .collect::<String>();
    format!(
        r#"<div class="pending-tasks-view">
  <div class="view-header">
    <h1>Bekleyen Bakımlar</h1>
    <button class="btn btn-primary" data-view="{MAINTENANCE_FORM}">➕ Yeni Bakım</button>
  </div>
  <div class="filters-bar">{buttons}</div>
  <div id="{TASKS_CONTAINER}"></div>
</div>"#
    )
}

fn tasks_html(tasks: &[MaintenanceRecord], ctx: &RenderContext) -> String {
    if tasks.is_empty() {
        return html::no_data("Bekleyen bakım bulunamadı.");
    }
    let now = ctx.data.now();
    let policy = ctx.data.policy();
    let rows = tasks
        .iter()
        .map(|task| {
            let (no, name) = task
                .machine
                .as_ref()
                .map(|m| (escape(&m.machine_no), escape(&m.machine_name)))
                .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
            let row_class = if task.status == RecordStatus::Overdue {
                "row-overdue"
            } else {
                ""
            };
            format!(
                r#"<tr class="{row_class}">
  <td>{}</td>
  <td><strong>{no}</strong><br><span class="text-muted">{name}</span></td>
  <td>{}</td>
  <td>{}<br><span class="text-muted">{}</span></td>
  <td>{}</td>
  <td><button class="btn btn-sm btn-primary" data-action="start-task" data-id="{}">Başlat</button></td>
</tr>"#,
                html::priority_badge(task.priority),
                escape(&task.maintenance_type),
                format_date(task.scheduled_date),
                escape(&policy.relative_time(task.scheduled_date, now)),
                html::status_badge(task.status),
                escape(&task.id),
            )
        })
        .collect::<String>();
    format!(
        r#"<div class="tasks-stats"><p>Toplam {} bakım</p></div>
<table class="data-table"><thead><tr><th>Öncelik</th><th>Makine</th><th>Bakım Tipi</th><th>Planlanan Tarih</th><th>Durum</th><th>İşlem</th></tr></thead><tbody>{rows}</tbody></table>"#,
        tasks.len()
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::facade::RECORDS;
    use crate::views::testing::{context, seed_portal};

    fn record(id: &str, date: (i32, u32, u32), status: RecordStatus) -> MaintenanceRecord {
        MaintenanceRecord {
            id: id.to_string(),
            machine_id: "m1".to_string(),
            schedule_id: None,
            maintenance_type: "Kontrol".to_string(),
            scheduled_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            status,
            priority: 0,
            completed_date: None,
            checklist_results: Default::default(),
            photos: vec![],
            performed_by: None,
            duration_minutes: None,
            notes: None,
            created_at: None,
            machine: None,
        }
    }

    #[test]
    fn overdue_rows_lead_then_dates_ascend() {
        let mut tasks = vec![
            record("a", (2025, 3, 20), RecordStatus::Pending),
            record("b", (2025, 3, 10), RecordStatus::Overdue),
            record("c", (2025, 3, 16), RecordStatus::InProgress),
            record("d", (2025, 3, 1), RecordStatus::Overdue),
        ];
        sort_tasks(&mut tasks);
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["d", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn all_filter_lists_open_work_overdue_first() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = PendingTasksView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        let ids: Vec<_> = view.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["r-late", "r-soon"]);
        let table = host.html(TASKS_CONTAINER).unwrap();
        assert!(table.contains("Toplam 2 bakım"));
        assert!(table.contains("row-overdue"));
        assert!(table.contains("2 gün sonra"));
    }

    #[tokio::test]
    async fn chosen_filter_is_remembered() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        backend.seed(
            RECORDS,
            [json!({"id": "r-today", "machine_id": "m1", "maintenance_type": "Kontrol",
                    "scheduled_date": "2025-03-15", "status": "in_progress"})],
        );
        let mut view = PendingTasksView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        view.dispatch(Action::ApplyFilter(DerivedFilter::Today), &ctx)
            .await
            .unwrap();
        let ids: Vec<_> = view.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["r-today"]);

        let mut again = PendingTasksView::new();
        again
            .render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        assert_eq!(again.filter(), DerivedFilter::Today);
        assert!(host.html("main-content").unwrap().contains(r#"filter-btn active" data-filter="today""#));
    }

    #[tokio::test]
    async fn empty_result_shows_the_no_data_line() {
        let (ctx, _backend, host) = context(true).await;
        let mut view = PendingTasksView::new();
        let params = ViewParams {
            filter: Some(DerivedFilter::Overdue),
            ..ViewParams::default()
        };
        view.render("main-content", &params, &ctx).await.unwrap();
        assert!(host.html(TASKS_CONTAINER).unwrap().contains("Bekleyen bakım bulunamadı."));
    }
}
