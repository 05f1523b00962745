//! Create or edit one maintenance record. Completed records render
//! read-only.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    Action, FormSubmission, Navigation, PENDING_TASKS, Prefill, RenderContext, View, ViewParams,
    draw, notice_text,
};
use crate::datetime::format_date;
use crate::error::{PortalError, Result};
use crate::filter::MachineFilter;
use crate::host::Host;
use crate::model::{
    ChecklistResults, ChecklistTemplate, Machine, MaintenanceRecord, RecordChanges, RecordStatus,
};
use crate::widgets::photos::{PhotoStaging, render_static_grid};
use crate::widgets::validation::{FormErrors, Rule, validate_form};
use crate::widgets::{checklist, html};

pub const PHOTO_CONTAINER: &str = "photo-uploader-container";

#[derive(Default)]
pub struct MaintenanceFormView {
    record: Option<MaintenanceRecord>,
    prefill: Option<Prefill>,
    template: Option<ChecklistTemplate>,
    photos: Option<PhotoStaging>,
    /// Existing photo URLs dropped in this edit; deleted once the save lands.
    removed: Vec<String>,
}

impl MaintenanceFormView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_read_only(&self) -> bool {
        self.record.as_ref().is_some_and(MaintenanceRecord::is_completed)
    }

    pub fn staging(&self) -> Option<&PhotoStaging> {
        self.photos.as_ref()
    }

    fn items(&self) -> &[crate::model::ChecklistItem] {
        self.template
            .as_ref()
            .map(|t| t.items.as_slice())
            .unwrap_or_default()
    }

    fn redraw_photos(&self, ctx: &RenderContext) -> Result<()> {
        if let Some(staging) = &self.photos {
            draw(ctx, PHOTO_CONTAINER, &staging.render())?;
        }
        Ok(())
    }

    async fn submit(&mut self, form: FormSubmission, ctx: &RenderContext) -> Result<Navigation> {
        if self.is_read_only() {
            return Err(PortalError::validation("Tamamlanmış bakım kaydı düzenlenemez"));
        }

        let results = checklist::collect(self.items(), &form.checklist);
        let missing = checklist::validate(self.items(), &results);
        if !missing.is_empty() {
            ctx.host.notify(&format!(
                "Lütfen tüm zorunlu alanları doldurun:\n{}",
                missing.join("\n")
            ));
            return Err(PortalError::Validation(missing));
        }
        let errors = field_errors(&form);
        if !errors.is_empty() {
            let err = PortalError::from(errors);
            ctx.host.notify(&notice_text(&err));
            return Err(err);
        }

        let folder = match &self.record {
            Some(record) => record.id.clone(),
            None => format!("new-{}", Uuid::new_v4()),
        };
        let urls = match self.photos.as_mut() {
            Some(staging) => staging.upload_all(&ctx.data, &folder, &ctx.cancel).await?,
            None => Vec::new(),
        };

        let changes = self.changes(form, results, urls, ctx);
        let template = self.template.as_ref();
        let saved = match &self.record {
            Some(record) if changes.status == Some(RecordStatus::Completed) => {
                ctx.data
                    .complete_record(&record.id, changes, template, &ctx.cancel)
                    .await?
            }
            Some(record) => {
                ctx.data
                    .update_record(&record.id, changes, template, &ctx.cancel)
                    .await?
            }
            None => ctx.data.create_record(changes, template, &ctx.cancel).await?,
        };

        for url in self.removed.drain(..) {
            if let Err(err) = ctx.data.delete_photo(&url, &ctx.cancel).await {
                warn!(%url, error = %err, "removed photo left in storage");
            }
        }
        let message = if self.record.is_some() {
            "Bakım kaydı güncellendi!"
        } else {
            "Bakım kaydı oluşturuldu!"
        };
        info!(record = %saved.id, status = saved.status.as_str(), "maintenance record saved");
        ctx.host.notify(message);
        Ok(Navigation::to(PENDING_TASKS, ViewParams::default()))
    }

    fn changes(
        &self,
        form: FormSubmission,
        results: ChecklistResults,
        photos: Vec<String>,
        ctx: &RenderContext,
    ) -> RecordChanges {
        let status = form.status.or(Some(RecordStatus::Pending));
        let completed_date =
            (self.record.is_none() && status == Some(RecordStatus::Completed)).then(|| ctx.data.now());
        RecordChanges {
            machine_id: form.machine_id,
            schedule_id: self.prefill.as_ref().and_then(|p| p.schedule_id.clone()),
            maintenance_type: form.maintenance_type.map(|t| t.trim().to_string()),
            scheduled_date: form.scheduled_date,
            status,
            completed_date,
            checklist_results: Some(results),
            photos: Some(photos),
            performed_by: ctx.session.user_id(),
            duration_minutes: form
                .duration_minutes
                .as_deref()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .map(|d| d.round() as u32),
            notes: form.notes.filter(|n| !n.trim().is_empty()),
            ..RecordChanges::default()
        }
    }
}

#[async_trait]
impl View for MaintenanceFormView {
    fn name(&self) -> &'static str {
        super::MAINTENANCE_FORM
    }

    #[tracing::instrument(skip_all, fields(record = ?params.record_id))]
    async fn render(&mut self, container: &str, params: &ViewParams, ctx: &RenderContext) -> Result<()> {
        draw(ctx, container, &html::loading("Form yükleniyor..."))?;
        let cancel = &ctx.cancel;
        let record = async {
            match &params.record_id {
                Some(id) => ctx.data.get_record(id, cancel).await.map(Some),
                None => Ok(None),
            }
        };
        let machine_filter = MachineFilter::default();
        let (record, template, machines) = futures::try_join!(
            record,
            ctx.data.get_default_checklist_template(cancel),
            ctx.data.get_machines(&machine_filter, cancel),
        )?;

        self.record = record;
        self.prefill = params.prefill.clone();
        self.template = template;
        self.removed.clear();
        self.photos = (!self.is_read_only()).then(|| {
            let existing = self
                .record
                .as_ref()
                .map(|r| r.photos.clone())
                .unwrap_or_default();
            PhotoStaging::with_existing(ctx.data.photo_limits().clone(), existing)
        });

        let page = self.page_html(&machines, ctx);
        draw(ctx, container, &page)
    }

    fn cleanup(&mut self, _host: &dyn Host) {
        *self = Self::default();
    }

    async fn dispatch(&mut self, action: Action, ctx: &RenderContext) -> Result<Option<Navigation>> {
        match action {
            Action::AddPhotos(files) => {
                let Some(staging) = self.photos.as_mut() else {
                    return Ok(None);
                };
                match staging.add(files) {
                    Ok(outcome) if !outcome.rejected.is_empty() => {
                        ctx.host.notify(&outcome.rejected.join("\n"));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        ctx.host.notify(&notice_text(&err));
                        return Err(err);
                    }
                }
                self.redraw_photos(ctx)?;
            }
            Action::RemoveStagedPhoto(index) => {
                if let Some(staging) = self.photos.as_mut() {
                    staging.remove_staged(index);
                }
                self.redraw_photos(ctx)?;
            }
            Action::RemoveExistingPhoto(index) => {
                if let Some(url) = self.photos.as_mut().and_then(|s| s.remove_existing(index)) {
                    self.removed.push(url);
                }
                self.redraw_photos(ctx)?;
            }
            Action::Back => return Ok(Some(Navigation::to(PENDING_TASKS, ViewParams::default()))),
            Action::Submit(form) => match self.submit(form, ctx).await {
                Ok(nav) => return Ok(Some(nav)),
                Err(err @ (PortalError::Validation(_) | PortalError::Cancelled | PortalError::Authentication)) => {
                    return Err(err);
                }
                Err(err) => {
                    ctx.host.notify(&format!("Kayıt hatası: {err}"));
                    return Err(err);
                }
            },
            _ => {}
        }
        Ok(None)
    }
}

fn field_errors(form: &FormSubmission) -> FormErrors {
    let mut data = BTreeMap::new();
    data.insert("machine_id".to_string(), form.machine_id.clone().unwrap_or_default());
    data.insert(
        "maintenance_type".to_string(),
        form.maintenance_type.clone().unwrap_or_default(),
    );
    data.insert(
        "scheduled_date".to_string(),
        form.scheduled_date.map(|d| d.to_string()).unwrap_or_default(),
    );
    data.insert(
        "duration_minutes".to_string(),
        form.duration_minutes.clone().unwrap_or_default(),
    );
    validate_form(
        &data,
        &[
            ("machine_id", "Makine", vec![Rule::Required]),
            ("maintenance_type", "Bakım Tipi", vec![Rule::Required, Rule::MaxLength(200)]),
            ("scheduled_date", "Planlanan Tarih", vec![Rule::Required, Rule::Date]),
            ("duration_minutes", "Süre", vec![Rule::PositiveNumber]),
        ],
    )
}

impl MaintenanceFormView {
    fn page_html(&self, machines: &[Machine], ctx: &RenderContext) -> String {
        let record = self.record.as_ref();
        let read_only = self.is_read_only();
        let disabled = if read_only { " disabled" } else { "" };
        let prefill = self.prefill.as_ref();

        let machine_id = record
            .map(|r| r.machine_id.as_str())
            .or(prefill.map(|p| p.machine_id.as_str()));
        let options = machines
            .iter()
            .map(|m| {
                let selected = if machine_id == Some(m.id.as_str()) { " selected" } else { "" };
                format!(
                    r#"<option value="{}"{selected}>{}</option>"#,
                    html::escape(&m.id),
                    html::escape(&m.display())
                )
            })
            .collect::<String>();
        let maintenance_type = record
            .map(|r| r.maintenance_type.as_str())
            .or(prefill.map(|p| p.maintenance_type.as_str()))
            .unwrap_or("");
        let date = record
            .map(|r| r.scheduled_date)
            .or(prefill.map(|p| p.scheduled_date))
            .unwrap_or_else(|| ctx.data.policy().today(ctx.data.now()));
        let current_status = record.map(|r| r.status).unwrap_or(RecordStatus::Pending);
        let statuses = RecordStatus::ALL
            .iter()
            .map(|s| {
                let selected = if *s == current_status { " selected" } else { "" };
                format!(r#"<option value="{}"{selected}>{}</option>"#, s.as_str(), s.label())
            })
            .collect::<String>();
        let duration = record
            .and_then(|r| r.duration_minutes)
            .map(|d| d.to_string())
            .unwrap_or_default();
        let notes = record.and_then(|r| r.notes.as_deref()).unwrap_or("");

        let empty = ChecklistResults::new();
        let results = record.map(|r| &r.checklist_results).unwrap_or(&empty);
        let checklist_html = if read_only {
            checklist::render_disabled(self.items(), results)
        } else {
            checklist::render(self.items(), results)
        };
        let photos_html = match &self.photos {
            Some(staging) => staging.render(),
            None => render_static_grid(record.map(|r| r.photos.as_slice()).unwrap_or_default()),
        };
        let completed_line = record
            .and_then(|r| r.completed_date)
            .map(|d| {
                format!(
                    r#"<p class="text-muted">Tamamlandı: {}</p>"#,
                    ctx.data.policy().format_datetime(d)
                )
            })
            .unwrap_or_default();
        let actions = if read_only {
            String::new()
        } else {
            format!(
                r#"<div class="form-actions"><button type="button" class="btn btn-secondary" data-action="back">İptal</button><button type="submit" class="btn btn-primary">{}</button></div>"#,
                if record.is_some() { "Güncelle" } else { "Kaydet" }
            )
        };
        let title = if record.is_some() {
            "Bakım Kaydı Düzenle"
        } else {
            "Yeni Bakım Kaydı"
        };

        format!(
            r#"<div class="maintenance-form-view">
<div class="form-header"><h1>{title}</h1><button class="btn btn-secondary" data-action="back">← Geri</button></div>
{completed_line}
<form id="maintenance-form" class="maintenance-form">
  <div class="form-section">
    <h2>Temel Bilgiler</h2>
    <div class="form-row">
      <div class="form-field"><label>Makine *</label><select id="machine-select" name="machine_id" required{disabled}><option value="">Seçiniz...</option>{options}</select></div>
      <div class="form-field"><label>Bakım Tipi *</label><input type="text" name="maintenance_type" value="{}" required{disabled}></div>
    </div>
    <div class="form-row">
      <div class="form-field"><label>Planlanan Tarih *</label><input type="date" name="scheduled_date" value="{}" required{disabled}><span class="text-muted">{}</span></div>
      <div class="form-field"><label>Durum</label><select name="status"{disabled}>{statuses}</select></div>
      <div class="form-field"><label>Süre (dk)</label><input type="number" name="duration_minutes" min="0" value="{duration}"{disabled}></div>
    </div>
    <div class="form-field"><label>Notlar</label><textarea name="notes" rows="3"{disabled}>{}</textarea></div>
  </div>
  <div class="form-section"><h2>Kontrol Listesi</h2><div id="checklist-container">{checklist_html}</div></div>
  <div class="form-section"><h2>Fotoğraflar</h2><div id="{PHOTO_CONTAINER}">{photos_html}</div></div>
  {actions}
</form>
</div>"#,
            html::escape(maintenance_type),
            date,
            format_date(date),
            html::escape(notes),
        )
    }
}
