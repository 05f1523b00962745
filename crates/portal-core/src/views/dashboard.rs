//! Landing page: stat cards, four charts, the coming week's work.

use async_trait::async_trait;
use chrono::Datelike;
use tracing::{debug, info};

use super::{
    Action, CALENDAR, MAINTENANCE_FORM, Navigation, PENDING_TASKS, REPORTS, RenderContext,
    StatCard, View, ViewParams, close_modal, draw, open_modal,
};
use crate::datetime::format_date;
use crate::error::Result;
use crate::filter::{DerivedFilter, MachineFilter, RecordFilter, ScheduleFilter};
use crate::host::{ChartId, Host};
use crate::model::{
    DashboardStats, Machine, MaintenanceRecord, MaintenanceSchedule, MonthlyDistribution,
    RecordStatus,
};
use crate::widgets::charts::{self, ChartSpec};
use crate::widgets::html::{self, escape};

pub const MONTHLY_CANVAS: &str = "monthly-distribution-chart";
pub const STATUS_CANVAS: &str = "status-distribution-chart";
pub const CATEGORY_CANVAS: &str = "category-distribution-chart";
pub const FREQUENCY_CANVAS: &str = "frequency-distribution-chart";

const UPCOMING_ROWS: usize = 5;
const DETAIL_MODAL: &str = "detail-modal";

struct DashboardData {
    stats: DashboardStats,
    machines: Vec<Machine>,
    schedules: Vec<MaintenanceSchedule>,
    upcoming: Vec<MaintenanceRecord>,
    monthly: MonthlyDistribution,
}

#[derive(Default)]
pub struct DashboardView {
    data: Option<DashboardData>,
    charts: Vec<ChartId>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    async fn load(ctx: &RenderContext) -> Result<DashboardData> {
        let year = ctx.data.policy().today(ctx.data.now()).year();
        let cancel = &ctx.cancel;
        let machine_filter = MachineFilter::default();
        let schedule_filter = ScheduleFilter::default();
        let (stats, machines, schedules, upcoming, monthly) = futures::try_join!(
            ctx.data.get_dashboard_stats(cancel),
            ctx.data.get_machines(&machine_filter, cancel),
            ctx.data.get_schedules(&schedule_filter, cancel),
            ctx.data.get_pending(DerivedFilter::Next7Days, cancel),
            ctx.data.get_monthly_distribution(year, cancel),
        )?;
        debug!(
            machines = machines.len(),
            schedules = schedules.len(),
            upcoming = upcoming.len(),
            "dashboard data loaded"
        );
        Ok(DashboardData {
            stats,
            machines,
            schedules,
            upcoming,
            monthly,
        })
    }

    fn destroy_charts(&mut self, host: &dyn Host) {
        for id in self.charts.drain(..) {
            host.destroy_chart(id);
        }
    }

    fn draw_charts(&mut self, host: &dyn Host, data: &DashboardData) {
        self.destroy_charts(host);
        let specs: [(&str, ChartSpec); 4] = [
            (MONTHLY_CANVAS, charts::monthly_distribution(&data.monthly)),
            (STATUS_CANVAS, charts::status_distribution(&data.stats)),
            (CATEGORY_CANVAS, charts::category_distribution(&data.machines)),
            (FREQUENCY_CANVAS, charts::frequency_distribution(&data.schedules)),
        ];
        for (canvas, spec) in &specs {
            self.charts.push(host.draw_chart(canvas, spec));
        }
    }

    async fn show_detail(&self, card: StatCard, ctx: &RenderContext) -> Result<()> {
        let Some(data) = &self.data else {
            return Ok(());
        };
        let policy = ctx.data.policy();
        let now = ctx.data.now();
        let (title, body) = match card {
            StatCard::Machines => {
                let rows = data
                    .machines
                    .iter()
                    .map(|m| {
                        vec![
                            escape(&m.machine_no),
                            escape(&m.machine_name),
                            html::opt(m.category.as_deref()),
                            html::opt(m.location.as_deref()),
                            machine_state(m.status.as_deref()).to_string(),
                        ]
                    })
                    .collect::<Vec<_>>();
                (
                    "Tüm Makineler",
                    detail_table(
                        &["Makine No", "Makine Adı", "Kategori", "Lokasyon", "Durum"],
                        &rows,
                    ),
                )
            }
            StatCard::Schedules => {
                let rows = data
                    .schedules
                    .iter()
                    .map(|s| {
                        let (no, name) = machine_cells(s.machine.as_ref());
                        vec![
                            no,
                            name,
                            escape(&s.maintenance_type),
                            s.frequency.label().to_string(),
                        ]
                    })
                    .collect::<Vec<_>>();
                (
                    "Bakım Periyotları",
                    detail_table(&["Makine No", "Makine", "Bakım Tipi", "Frekans"], &rows),
                )
            }
            StatCard::Pending => {
                let records = ctx
                    .data
                    .get_records(&with_status(RecordStatus::Pending), &ctx.cancel)
                    .await?;
                let rows = records
                    .iter()
                    .map(|r| {
                        let mut cells = record_cells(r);
                        cells.push(format_date(r.scheduled_date));
                        cells
                    })
                    .collect::<Vec<_>>();
                (
                    "Bekleyen Bakımlar",
                    detail_table(
                        &["Makine No", "Makine", "Bakım Tipi", "Planlanan Tarih"],
                        &rows,
                    ),
                )
            }
            StatCard::Overdue => {
                let records = ctx
                    .data
                    .get_records(&with_status(RecordStatus::Overdue), &ctx.cancel)
                    .await?;
                let rows = records
                    .iter()
                    .map(|r| {
                        let overdue = policy.overdue_days(r.scheduled_date, now);
                        let mut cells = record_cells(r);
                        cells.push(format_date(r.scheduled_date));
                        cells.push(format!(
                            r#"<span style="color: {};">{}</span>"#,
                            overdue.color,
                            escape(&overdue.text)
                        ));
                        cells
                    })
                    .collect::<Vec<_>>();
                (
                    "Gecikmiş Bakımlar",
                    detail_table(
                        &["Makine No", "Makine", "Bakım Tipi", "Planlanan Tarih", "Gecikme"],
                        &rows,
                    ),
                )
            }
            StatCard::CompletedThisMonth => {
                let (first, last) = policy.month_bounds(now);
                let filter = RecordFilter {
                    date_from: Some(first),
                    date_to: Some(last),
                    ..with_status(RecordStatus::Completed)
                };
                let records = ctx.data.get_records(&filter, &ctx.cancel).await?;
                let rows = records
                    .iter()
                    .map(|r| {
                        let mut cells = record_cells(r);
                        cells.push(format_date(r.scheduled_date));
                        cells.push(
                            r.completed_date
                                .map(|d| format_date(policy.local(d).date_naive()))
                                .unwrap_or_else(|| "-".to_string()),
                        );
                        cells
                    })
                    .collect::<Vec<_>>();
                (
                    "Bu Ay Tamamlanan Bakımlar",
                    detail_table(
                        &["Makine No", "Makine", "Bakım Tipi", "Planlanan", "Tamamlandı"],
                        &rows,
                    ),
                )
            }
        };
        open_modal(ctx, DETAIL_MODAL, title, &body)
    }
}

#[async_trait]
impl View for DashboardView {
    fn name(&self) -> &'static str {
        super::DASHBOARD
    }

    #[tracing::instrument(skip_all)]
    async fn render(&mut self, container: &str, _params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        draw(ctx, container, &html::loading("Dashboard yükleniyor..."))?;
        let data = Self::load(ctx).await?;
        let page = page_html(&data, &ctx.session.display_name(), ctx);
        draw(ctx, container, &page)?;
        self.draw_charts(ctx.host.as_ref(), &data);
        self.data = Some(data);
        info!(charts = self.charts.len(), "dashboard rendered");
        Ok(())
    }

    fn cleanup(&mut self, host: &dyn Host) {
        self.destroy_charts(host);
        close_modal(host);
        self.data = None;
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::OpenStat(card) => self.show_detail(card, ctx).await?,
            Action::CloseModal => close_modal(ctx.host.as_ref()),
            Action::StartTask(id) => {
                return Ok(Some(Navigation::to(MAINTENANCE_FORM, ViewParams::record(&id))));
            }
            Action::Reload => {
                return Ok(Some(Navigation::to(super::DASHBOARD, ViewParams::default())));
            }
            _ => {}
        }
        Ok(None)
    }

    fn on_theme_change(&self, host: &dyn Host, dark: bool) {
        for id in &self.charts {
            host.update_chart_theme(*id, dark);
        }
    }

    fn on_resize(&self, host: &dyn Host) {
        for id in &self.charts {
            host.resize_chart(*id);
        }
    }
}

fn with_status(status: RecordStatus) -> RecordFilter {
    RecordFilter {
        status: vec![status],
        ..RecordFilter::default()
    }
}

fn machine_state(status: Option<&str>) -> &'static str {
    if status == Some("active") {
        "✅ Aktif"
    } else {
        "⏸️ Pasif"
    }
}

fn machine_cells(machine: Option<&Machine>) -> (String, String) {
    match machine {
        Some(m) => (escape(&m.machine_no), escape(&m.machine_name)),
        None => ("-".to_string(), "-".to_string()),
    }
}

fn record_cells(record: &MaintenanceRecord) -> Vec<String> {
    let (no, name) = machine_cells(record.machine.as_ref());
    vec![no, name, escape(&record.maintenance_type)]
}

fn detail_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return html::no_data("Kayıt bulunamadı.");
    }
    html::table(headers, rows)
}

fn stat_card(title: &str, value: u64, card: &str, color: &str, icon: &str) -> String {
    format!(
        r#"<div class="stat-card" data-card-type="{card}" style="border-left: 4px solid {color};">
  <div class="stat-icon" style="background-color: {color}20;">{icon}</div>
  <div class="stat-content">
    <p class="stat-title">{title}</p>
    <p class="stat-value" style="color: {color};">{value}</p>
  </div>
</div>"#
    )
}

fn chart_card(title: &str, canvas: &str) -> String {
    format!(
        r#"<div class="chart-card"><h3>{title}</h3><div class="chart-container"><canvas id="{canvas}"></canvas></div></div>"#
    )
}

fn upcoming_table(tasks: &[MaintenanceRecord], ctx: &RenderContext) -> String {
    if tasks.is_empty() {
        return html::no_data("Sonraki 7 gün içinde bakım planlanmamış.");
    }
    let now = ctx.data.now();
    let policy = ctx.data.policy();
    let rows = tasks
        .iter()
        .take(UPCOMING_ROWS)
        .map(|task| {
            let (no, name) = machine_cells(task.machine.as_ref());
            let row_class = if task.status == RecordStatus::Overdue {
                "row-overdue"
            } else {
                ""
            };
            format!(
                r#"<tr class="{row_class}">
  <td><strong>{no}</strong><br><span class="text-muted">{name}</span></td>
  <td>{}</td>
  <td>{}<br><span class="text-muted">{}</span></td>
  <td>{}</td>
  <td><button class="btn btn-sm btn-primary" data-action="start-task" data-id="{}">Detay</button></td>
</tr>"#,
                html::opt(Some(&task.maintenance_type)),
                format_date(task.scheduled_date),
                escape(&policy.relative_time(task.scheduled_date, now)),
                html::status_badge(task.status),
                escape(&task.id),
            )
        })
        .collect::<String>();
    format!(
        r#"<table class="data-table"><thead><tr><th>Makine</th><th>Bakım Tipi</th><th>Tarih</th><th>Durum</th><th>İşlem</th></tr></thead><tbody>{rows}</tbody></table>"#
    )
}

fn quick_action(view: &str, icon: &str, label: &str) -> String {
    format!(
        r#"<button class="action-card" data-view="{view}"><span class="action-icon">{icon}</span><span class="action-label">{label}</span></button>"#
    )
}

fn page_html(data: &DashboardData, user: &str, ctx: &RenderContext) -> String {
    let stats = &data.stats;
    let cards = [
        stat_card("Toplam Makine", stats.total_machines, "machines", "#3b82f6", "🏭"),
        stat_card("Bakım Periyodu", stats.total_schedules, "schedules", "#8b5cf6", "📋"),
        stat_card("Bekleyen Bakım", stats.pending_count, "pending", "#f59e0b", "⏳"),
        stat_card("Gecikmiş Bakım", stats.overdue_count, "overdue", "#ef4444", "⚠️"),
        stat_card("Bu Ay Tamamlanan", stats.completed_this_month, "completed", "#22c55e", "✅"),
    ]
    .concat();
    let chart_cards = [
        chart_card("Aylık Bakım Dağılımı", MONTHLY_CANVAS),
        chart_card("Bakım Durumu", STATUS_CANVAS),
        chart_card("Makine Kategorileri", CATEGORY_CANVAS),
        chart_card("Bakım Frekansları", FREQUENCY_CANVAS),
    ]
    .concat();
    let actions = [
        quick_action(CALENDAR, "📅", "Takvim"),
        quick_action(PENDING_TASKS, "📋", "Bekleyen Bakımlar"),
        quick_action(MAINTENANCE_FORM, "➕", "Yeni Bakım Kaydı"),
        quick_action(REPORTS, "📊", "Raporlar"),
    ]
    .concat();
    format!(
        r#"<div class="dashboard-container">
<div class="dashboard-header"><h1>Bakım Yönetimi Dashboard</h1><p class="dashboard-subtitle">Hoş geldiniz, {}</p></div>
<div class="stats-grid">{cards}</div>
<div class="charts-grid">{chart_cards}</div>
<div class="upcoming-maintenance">
  <div class="section-header"><h2>Sonraki 7 Günün Bakımları</h2><button class="btn btn-secondary" data-view="{PENDING_TASKS}">Tümünü Gör</button></div>
  {}
</div>
<div class="quick-actions"><h2>Hızlı Erişim</h2><div class="actions-grid">{actions}</div></div>
</div>"#,
        escape(user),
        upcoming_table(&data.upcoming, ctx),
    )
}
