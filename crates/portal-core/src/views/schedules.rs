//! Schedule management. Every create, update or delete ends by offering
//! to rebuild the calendar for a chosen set of years.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    Action, Navigation, RenderContext, ScheduleDraft, View, ViewParams, alert, close_modal, draw,
    open_modal,
};
use crate::datetime::{MONTHS_TR, format_months};
use crate::error::{PortalError, Result};
use crate::filter::{MachineFilter, ScheduleFilter};
use crate::host::Host;
use crate::model::{Frequency, Machine, MaintenanceSchedule, ScheduleChanges};
use crate::widgets::html::{self, escape};

pub const MONTHS_FIELD: &str = "months-field";
const SCHEDULE_MODAL: &str = "schedule-modal";
const REGENERATE_MODAL: &str = "regenerate-modal";

/// Years offered in the regenerate dialog; the first `PRECHECKED_YEARS`
/// start ticked.
pub const REGENERATE_YEARS: RangeInclusive<i32> = 2025..=2028;
const PRECHECKED_YEARS: usize = 3;

#[derive(Default)]
pub struct SchedulesView {
    container: String,
    schedules: Vec<MaintenanceSchedule>,
    machines: Vec<Machine>,
    editing: Option<String>,
}

impl SchedulesView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedules(&self) -> &[MaintenanceSchedule] {
        &self.schedules
    }

    async fn load(&mut self, ctx: &RenderContext) -> Result<()> {
        let schedule_filter = ScheduleFilter::default();
        let machine_filter = MachineFilter::default();
        let (schedules, machines) = futures::try_join!(
            ctx.data.get_schedules(&schedule_filter, &ctx.cancel),
            ctx.data.get_machines(&machine_filter, &ctx.cancel),
        )?;
        debug!(schedules = schedules.len(), machines = machines.len(), "schedules loaded");
        self.schedules = schedules;
        self.machines = machines;
        draw(ctx, &self.container, &page_html(&self.schedules))
    }

    fn open_editor(&mut self, schedule: Option<&MaintenanceSchedule>, ctx: &RenderContext) -> Result<()> {
        self.editing = schedule.map(|s| s.id.clone());
        let title = if schedule.is_some() {
            "Periyot Düzenle"
        } else {
            "Yeni Periyot Ekle"
        };
        open_modal(ctx, SCHEDULE_MODAL, title, &editor_html(&self.machines, schedule))
    }

    fn editing_schedule(&self) -> Option<&MaintenanceSchedule> {
        let id = self.editing.as_deref()?;
        self.schedules.iter().find(|s| s.id == id)
    }

    async fn save(&mut self, id: Option<String>, draft: ScheduleDraft, ctx: &RenderContext) -> Result<()> {
        if draft.frequency.uses_months() && draft.months.is_empty() {
            return Err(PortalError::validation("Lütfen en az bir ay seçin!"));
        }
        let changes = ScheduleChanges {
            machine_id: Some(draft.machine_id),
            maintenance_type: Some(draft.maintenance_type.trim().to_string()),
            frequency: Some(draft.frequency),
            months: Some(draft.months),
            is_active: Some(draft.is_active),
            description: draft.description.filter(|d| !d.trim().is_empty()),
        };
        let message = match &id {
            Some(id) => {
                ctx.data.update_schedule(id, changes, &ctx.cancel).await?;
                "Periyot güncellendi!"
            }
            None => {
                ctx.data.create_schedule(changes, &ctx.cancel).await?;
                "Periyot eklendi!"
            }
        };
        ctx.host.notify(message);
        self.after_change(ctx).await
    }

    async fn delete(&mut self, id: &str, ctx: &RenderContext) -> Result<()> {
        ctx.data.delete_schedule(id, &ctx.cancel).await?;
        ctx.host.notify("Periyot silindi!");
        self.after_change(ctx).await
    }

    async fn after_change(&mut self, ctx: &RenderContext) -> Result<()> {
        self.editing = None;
        self.load(ctx).await?;
        open_modal(ctx, REGENERATE_MODAL, "Takvimi Yeniden Oluştur", &regenerate_html())
    }

    async fn regenerate(&self, years: Vec<i32>, ctx: &RenderContext) -> Result<()> {
        ctx.data.regenerate_calendar(&years, &ctx.cancel).await?;
        let listed = years
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        info!(years = %listed, "calendar regenerated from schedules view");
        ctx.host
            .notify(&format!("{listed} yılları için takvim başarıyla yeniden oluşturuldu!"));
        close_modal(ctx.host.as_ref());
        Ok(())
    }
}

#[async_trait]
impl View for SchedulesView {
    fn name(&self) -> &'static str {
        super::SCHEDULES
    }

    #[tracing::instrument(skip_all)]
    async fn render(&mut self, container: &str, _params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        self.container = container.to_string();
        draw(ctx, container, &html::loading("Periyotlar yükleniyor..."))?;
        self.load(ctx).await
    }

    fn cleanup(&mut self, host: &dyn Host) {
        close_modal(host);
        self.schedules.clear();
        self.machines.clear();
        self.editing = None;
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::NewSchedule => self.open_editor(None, ctx)?,
            Action::EditSchedule(id) => {
                let schedule = self.schedules.iter().find(|s| s.id == id).cloned();
                if let Some(schedule) = schedule {
                    self.open_editor(Some(&schedule), ctx)?;
                }
            }
            Action::FrequencyChanged(frequency) => {
                let months = self
                    .editing_schedule()
                    .map(|s| s.months.clone())
                    .unwrap_or_default();
                draw(ctx, MONTHS_FIELD, &months_field(frequency, &months))?;
            }
            Action::SaveSchedule { id, draft } => self
                .save(id, draft, ctx)
                .await
                .map_err(|err| alert(ctx, "Kayıt hatası", err))?,
            Action::DeleteSchedule(id) => self
                .delete(&id, ctx)
                .await
                .map_err(|err| alert(ctx, "Silme hatası", err))?,
            Action::Regenerate(years) => self
                .regenerate(years, ctx)
                .await
                .map_err(|err| alert(ctx, "Takvim oluşturma hatası", err))?,
            Action::CloseModal => {
                self.editing = None;
                close_modal(ctx.host.as_ref());
            }
            Action::Reload => self.load(ctx).await?,
            _ => {}
        }
        Ok(None)
    }
}

fn months_cell(schedule: &MaintenanceSchedule) -> String {
    if !schedule.frequency.uses_months() {
        return r#"<span class="text-muted">Tüm haftalar</span>"#.to_string();
    }
    if schedule.months.is_empty() {
        return "-".to_string();
    }
    escape(&format_months(&schedule.months))
}

fn page_html(schedules: &[MaintenanceSchedule]) -> String {
    let table = if schedules.is_empty() {
        html::no_data("Henüz bakım periyodu eklenmemiş.")
    } else {
        let rows = schedules
            .iter()
            .map(|s| {
                let machine = s
                    .machine
                    .as_ref()
                    .map(|m| {
                        format!(
                            r#"<strong>{}</strong><br><span class="text-muted">{}</span>"#,
                            escape(&m.machine_no),
                            escape(&m.machine_name)
                        )
                    })
                    .unwrap_or_else(|| "-".to_string());
                let id = escape(&s.id);
                vec![
                    machine,
                    escape(&s.maintenance_type),
                    s.frequency.label().to_string(),
                    months_cell(s),
                    format!(
                        r#"<button class="btn btn-sm btn-secondary" data-action="edit-schedule" data-id="{id}">✏️ Düzenle</button> <button class="btn btn-sm btn-danger" data-action="delete-schedule" data-id="{id}">🗑️ Sil</button>"#
                    ),
                ]
            })
            .collect::<Vec<_>>();
        html::table(&["Makine", "Bakım Tipi", "Frekans", "Aylar", "İşlemler"], &rows)
    };
    format!(
        r#"<div class="schedules-view">
  <div class="schedules-header"><h1>Bakım Periyotları</h1><button class="btn btn-primary" data-action="new-schedule">➕ Yeni Periyot Ekle</button></div>
  <div class="schedules-info"><p>📋 Bakım periyotlarını buradan yönetebilirsiniz. Periyot eklendiğinde veya güncellendiğinde takvimi yeniden oluşturabilirsiniz.</p></div>
  {table}
</div>"#
    )
}

/// Month checkboxes; empty for frequencies that run every week.
fn months_field(frequency: Frequency, checked: &[u32]) -> String {
    if !frequency.uses_months() {
        return String::new();
    }
    let boxes = MONTHS_TR
        .iter()
        .zip(1u32..)
        .map(|(name, month)| {
            let mark = if checked.contains(&month) { " checked" } else { "" };
            format!(
                r#"<label><input type="checkbox" name="months" value="{month}"{mark}><span>{name}</span></label>"#
            )
        })
        .collect::<String>();
    format!(
        r#"<label>Aylar *</label><div class="months-grid">{boxes}</div><small>Bakım yapılacak ayları seçin</small>"#
    )
}

fn editor_html(machines: &[Machine], schedule: Option<&MaintenanceSchedule>) -> String {
    let machine_options = machines
        .iter()
        .map(|m| {
            let selected = if schedule.is_some_and(|s| s.machine_id == m.id) {
                " selected"
            } else {
                ""
            };
            format!(
                r#"<option value="{}"{selected}>{}</option>"#,
                escape(&m.id),
                escape(&m.display())
            )
        })
        .collect::<String>();
    let frequency_options = Frequency::ALL
        .iter()
        .map(|f| {
            let selected = if schedule.is_some_and(|s| s.frequency == *f) {
                " selected"
            } else {
                ""
            };
            format!(r#"<option value="{}"{selected}>{}</option>"#, f.as_str(), f.label())
        })
        .collect::<String>();
    let months = schedule
        .map(|s| months_field(s.frequency, &s.months))
        .unwrap_or_default();
    format!(
        r#"<form id="schedule-form">
  <div class="form-field"><label>Makine *</label><select id="machine-select" name="machine_id" required><option value="">Seçiniz...</option>{machine_options}</select></div>
  <div class="form-field"><label>Bakım Tipi *</label><input type="text" name="maintenance_type" placeholder="Örn: Genel Bakım, Temizlik" value="{}" required></div>
  <div class="form-field"><label>Frekans *</label><select name="frequency" id="frequency-select" required><option value="">Seçiniz...</option>{frequency_options}</select></div>
  <div class="form-field" id="{MONTHS_FIELD}">{months}</div>
  <input type="hidden" id="schedule-id" name="id" value="{}">
  <div class="modal-actions"><button type="button" class="btn btn-secondary" data-action="close-modal">İptal</button><button type="submit" class="btn btn-primary">Kaydet</button></div>
</form>"#,
        schedule.map(|s| escape(&s.maintenance_type)).unwrap_or_default(),
        schedule.map(|s| escape(&s.id)).unwrap_or_default(),
    )
}

fn regenerate_html() -> String {
    let years = REGENERATE_YEARS
        .enumerate()
        .map(|(i, year)| {
            let mark = if i < PRECHECKED_YEARS { " checked" } else { "" };
            format!(r#"<label><input type="checkbox" name="regen-year" value="{year}"{mark}> {year}</label>"#)
        })
        .collect::<String>();
    format!(
        r#"<p>Periyot değişiklikleri için takvimleri yeniden oluşturmak ister misiniz?</p>
<p><strong>Not:</strong> Mevcut planlanan bakımlar silinip yeni periyoda göre oluşturulacaktır.</p>
<div class="form-field"><label>Hangi yıllar için oluşturulsun?</label><div class="year-options">{years}</div></div>
<div class="modal-actions"><button type="button" class="btn btn-secondary" data-action="close-modal">İptal</button><button type="button" class="btn btn-primary" data-action="regenerate">Oluştur</button></div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::{GENERATE_CALENDAR_RPC, SCHEDULES};
    use crate::views::MODAL_ROOT;
    use crate::views::testing::{context, seed_portal};

    fn draft(frequency: Frequency, months: Vec<u32>) -> ScheduleDraft {
        ScheduleDraft {
            machine_id: "m2".to_string(),
            maintenance_type: "Temizlik".to_string(),
            frequency,
            months,
            description: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn table_lists_months_in_given_order() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = SchedulesView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        let page = host.html("main-content").unwrap();
        assert!(page.contains("Ocak, Haziran, Aralık"));
        assert!(page.contains("Tüm haftalar"));
    }

    #[tokio::test]
    async fn weekly_frequency_hides_the_month_picker() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = SchedulesView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        view.dispatch(Action::EditSchedule("s1".to_string()), &ctx)
            .await
            .unwrap();
        let modal = host.html(MODAL_ROOT).unwrap();
        assert!(modal.contains("Periyot Düzenle"));
        assert!(modal.contains(r#"value="6" checked"#));

        view.dispatch(Action::FrequencyChanged(Frequency::Weekly), &ctx)
            .await
            .unwrap();
        assert_eq!(host.html(MONTHS_FIELD).as_deref(), Some(""));
        view.dispatch(Action::FrequencyChanged(Frequency::Quarterly), &ctx)
            .await
            .unwrap();
        assert!(host.html(MONTHS_FIELD).unwrap().contains(r#"value="12" checked"#));
    }

    #[tokio::test]
    async fn save_without_months_is_refused_locally() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = SchedulesView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        let before = backend.calls_starting_with("insert");
        let err = view
            .dispatch(
                Action::SaveSchedule {
                    id: None,
                    draft: draft(Frequency::Monthly, vec![]),
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err, PortalError::validation("Lütfen en az bir ay seçin!"));
        assert_eq!(backend.calls_starting_with("insert"), before);
        assert_eq!(host.notices().last().map(String::as_str), Some("Lütfen en az bir ay seçin!"));
    }

    #[tokio::test]
    async fn save_offers_regeneration_with_three_years_ticked() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        let mut view = SchedulesView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        view.dispatch(
            Action::SaveSchedule {
                id: None,
                draft: draft(Frequency::SemiAnnual, vec![3, 9]),
            },
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(view.schedules().len(), 3);
        assert_eq!(backend.rows(SCHEDULES).len(), 3);

        let modal = host.html(MODAL_ROOT).unwrap();
        assert!(modal.contains("Takvimi Yeniden Oluştur"));
        assert!(modal.contains(r#"value="2027" checked"#));
        assert!(modal.contains(r#"value="2028">"#));
    }

    #[tokio::test]
    async fn regenerate_runs_per_year_and_closes_the_dialog() {
        let (ctx, backend, host) = context(true).await;
        seed_portal(&backend);
        backend.on_rpc(GENERATE_CALENDAR_RPC, |_| Ok(serde_json::Value::Null));
        let mut view = SchedulesView::new();
        view.render("main-content", &ViewParams::default(), &ctx)
            .await
            .unwrap();
        view.dispatch(Action::DeleteSchedule("s2".to_string()), &ctx)
            .await
            .unwrap();
        view.dispatch(Action::Regenerate(vec![2025, 2026]), &ctx)
            .await
            .unwrap();
        assert_eq!(backend.calls_starting_with("rpc"), 2);
        assert_eq!(host.html(MODAL_ROOT).as_deref(), Some(""));
        assert!(host
            .notices()
            .contains(&"2025, 2026 yılları için takvim başarıyla yeniden oluşturuldu!".to_string()));

        let err = view
            .dispatch(Action::Regenerate(vec![]), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }
}
