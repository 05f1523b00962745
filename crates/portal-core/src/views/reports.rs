//! Date-range report over maintenance records with CSV, XLSX and print
//! exports.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Action, Navigation, RenderContext, View, ViewParams, draw, notice_text};
use crate::datetime::format_date;
use crate::error::{PortalError, Result};
use crate::filter::RecordFilter;
use crate::host::Host;
use crate::model::{MaintenanceRecord, RecordStatus};
use crate::widgets::export::{self, ExportFormat};
use crate::widgets::html::{self, escape};
use crate::widgets::validation::date_range;

pub const RESULTS_CONTAINER: &str = "report-results";
pub const EXPORT_STEM: &str = "bakim_raporu";
const DEFAULT_SPAN_DAYS: u64 = 30;

/// Last generated range, kept so the page reopens where it was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub status: Option<RecordStatus>,
}

#[derive(Default)]
pub struct ReportsView {
    range: Option<ReportRange>,
    records: Vec<MaintenanceRecord>,
}

impl ReportsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MaintenanceRecord] {
        &self.records
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn generate(&mut self, range: ReportRange, ctx: &RenderContext) -> Result<()> {
        if let Some(message) = date_range(range.from, range.to) {
            ctx.host.notify(&message);
            return Err(PortalError::validation(message));
        }
        draw(ctx, RESULTS_CONTAINER, &html::loading("Rapor oluşturuluyor..."))?;
        let filter = RecordFilter {
            status: range.status.into_iter().collect(),
            date_from: Some(range.from),
            date_to: Some(range.to),
            ..RecordFilter::default()
        };
        let records = match ctx.data.get_records(&filter, &ctx.cancel).await {
            Ok(records) => records,
            Err(err @ (PortalError::Cancelled | PortalError::Authentication)) => return Err(err),
            Err(err) => {
                draw(
                    ctx,
                    RESULTS_CONTAINER,
                    &format!(
                        r#"<div class="error-message">Rapor oluşturma hatası: {}</div>"#,
                        escape(&err.to_string())
                    ),
                )?;
                return Err(err);
            }
        };
        info!(records = records.len(), "report generated");
        if let Ok(value) = serde_json::to_value(range)
            && let Err(err) = ctx.prefs.set_table_filter(super::REPORTS, value)
        {
            warn!(error = %err, "report range not saved");
        }
        draw(ctx, RESULTS_CONTAINER, &results_html(&range, &records, ctx))?;
        self.range = Some(range);
        self.records = records;
        Ok(())
    }

    fn export(&self, format: ExportFormat, ctx: &RenderContext) -> Result<()> {
        if self.records.is_empty() {
            ctx.host.notify("Önce rapor oluşturun!");
            return Err(PortalError::validation("Önce rapor oluşturun!"));
        }
        let table = export::records_table(&self.records, ctx.data.policy());
        match format {
            ExportFormat::Print => {
                let today = ctx.data.policy().today(ctx.data.now());
                ctx.host.print(&export::print_html(&table, today));
            }
            ExportFormat::Csv | ExportFormat::Xlsx => {
                let file =
                    export::download(&table, format, EXPORT_STEM, ctx.data.now(), ctx.data.policy())?;
                ctx.host.download(file);
                let done = if format == ExportFormat::Csv {
                    "CSV dosyası indirildi!"
                } else {
                    "Excel dosyası indirildi!"
                };
                ctx.host.notify(done);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl View for ReportsView {
    fn name(&self) -> &'static str {
        super::REPORTS
    }

    async fn render(&mut self, container: &str, _params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        let range = stored_range(ctx).unwrap_or_else(|| default_range(ctx));
        draw(ctx, container, &page_html(&range))
    }

    fn cleanup(&mut self, _host: &dyn Host) {
        self.records.clear();
        self.range = None;
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::Generate { from, to, status } => {
                self.generate(ReportRange { from, to, status }, ctx).await?;
            }
            Action::Export(format) => {
                if let Err(err) = self.export(format, ctx) {
                    if !matches!(err, PortalError::Validation(_)) {
                        ctx.host.notify(&format!("Export hatası: {}", notice_text(&err)));
                    }
                    return Err(err);
                }
            }
            Action::Reload => {
                if let Some(range) = self.range {
                    self.generate(range, ctx).await?;
                }
            }
            _ => {}
        }
        Ok(None)
    }
}

fn default_range(ctx: &RenderContext) -> ReportRange {
    let today = ctx.data.policy().today(ctx.data.now());
    ReportRange {
        from: today
            .checked_sub_days(Days::new(DEFAULT_SPAN_DAYS))
            .unwrap_or(today),
        to: today,
        status: None,
    }
}

fn stored_range(ctx: &RenderContext) -> Option<ReportRange> {
    serde_json::from_value(ctx.prefs.table_filter(super::REPORTS)?).ok()
}

fn page_html(range: &ReportRange) -> String {
    let statuses = RecordStatus::ALL
        .iter()
        .map(|s| {
            let selected = if range.status == Some(*s) { " selected" } else { "" };
            format!(r#"<option value="{}"{selected}>{}</option>"#, s.as_str(), s.label())
        })
        .collect::<String>();
    format!(
        r#"<div class="reports-view">
  <div class="view-header"><h1>Raporlar ve Analizler</h1></div>
  <div class="report-filters"><div class="form-row">
    <div class="form-field"><label>Başlangıç Tarihi</label><input type="date" id="report-start-date" value="{}"></div>
    <div class="form-field"><label>Bitiş Tarihi</label><input type="date" id="report-end-date" value="{}"></div>
    <div class="form-field"><label>Durum</label><select id="report-status"><option value="">Tümü</option>{statuses}</select></div>
    <div class="form-field"><button class="btn btn-primary" data-action="generate-report">📊 Rapor Oluştur</button></div>
  </div></div>
  <div id="{RESULTS_CONTAINER}"></div>
  <div class="export-actions">
    <h2>Export Seçenekleri</h2>
    <div class="actions-grid">
      <button class="action-card" data-export="xlsx"><span class="action-icon">📗</span><span class="action-label">Excel İndir</span></button>
      <button class="action-card" data-export="csv"><span class="action-icon">📄</span><span class="action-label">CSV İndir</span></button>
      <button class="action-card" data-export="print"><span class="action-icon">🖨️</span><span class="action-label">Yazdır</span></button>
    </div>
  </div>
</div>"#,
        range.from, range.to
    )
}

fn results_html(range: &ReportRange, records: &[MaintenanceRecord], ctx: &RenderContext) -> String {
    let policy = ctx.data.policy();
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.machine
                    .as_ref()
                    .map(|m| escape(&m.display()))
                    .unwrap_or_else(|| "-".to_string()),
                escape(&r.maintenance_type),
                format_date(r.scheduled_date),
                policy.format_opt_datetime(r.completed_date),
                html::status_badge(r.status),
                html::opt(r.performed_by.as_deref()),
            ]
        })
        .collect::<Vec<_>>();
    format!(
        r#"<div class="report-summary"><h2>Rapor Özeti</h2><p>Tarih Aralığı: {} - {}</p><p>Toplam Kayıt: {}</p></div>
{}"#,
        format_date(range.from),
        format_date(range.to),
        records.len(),
        html::table(
            &["Makine", "Bakım Tipi", "Tarih", "Tamamlanma", "Durum", "Yapan"],
            &rows
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::testing::{context, seed_portal};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[tokio::test]
    async fn defaults_to_the_last_thirty_days() {
        let (ctx, _backend, host) = context(true).await;
        let mut view = ReportsView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        let page = host.html("main-content").unwrap();
        assert!(page.contains(r#"id="report-start-date" value="2025-02-13""#));
        assert!(page.contains(r#"id="report-end-date" value="2025-03-15""#));
    }

    #[tokio::test]
    async fn export_before_generating_is_refused() {
        let (ctx, _backend, host) = context(true).await;
        let mut view = ReportsView::new();
        let err = view
            .dispatch(Action::Export(ExportFormat::Xlsx), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::validation("Önce rapor oluşturun!"));
        assert!(host.downloads().is_empty());
    }

    #[tokio::test]
    async fn generate_then_export_every_format() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = ReportsView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        view.dispatch(
            Action::Generate {
                from: date(3, 1),
                to: date(3, 31),
                status: Some(RecordStatus::Completed),
            },
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(view.records().len(), 1);
        assert!(host.html(RESULTS_CONTAINER).unwrap().contains("Toplam Kayıt: 1"));

        for format in [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Print] {
            view.dispatch(Action::Export(format), &ctx).await.unwrap();
        }
        let names: Vec<_> = host.downloads().into_iter().map(|d| d.filename).collect();
        assert_eq!(names, ["bakim_raporu_2025-03-15.csv", "bakim_raporu_2025-03-15.xlsx"]);
        assert_eq!(host.prints().len(), 1);

        let mut reopened = ReportsView::new();
        reopened
            .render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        assert!(host
            .html("main-content")
            .unwrap()
            .contains(r#"<option value="completed" selected>"#));
    }

    #[tokio::test]
    async fn inverted_range_never_reaches_the_backend() {
        let (ctx, backend, _host) = context(true).await;
        let mut view = ReportsView::new();
        let before = backend.calls().len();
        let err = view
            .dispatch(
                Action::Generate {
                    from: date(3, 10),
                    to: date(3, 1),
                    status: None,
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
        assert_eq!(backend.calls().len(), before);
    }
}
