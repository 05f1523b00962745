//! The single path from views to the backend. Every accessor checks the
//! session first, honours the caller's cancellation token, and hands back
//! rows with their joined machine/schedule hoisted into `machine` and
//! `schedule`.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::{Backend, Condition, Join, Query, Row};
use crate::config::{PhotoLimits, PortalSettings};
use crate::datetime::DatePolicy;
use crate::error::{PortalError, Result};
use crate::filter::{
    CalendarFilter, DerivedFilter, MachineFilter, RecordFilter, ScheduleFilter, TemplateFilter,
};
use crate::model::{
    CalendarEvent, ChecklistTemplate, DashboardStats, Machine, MaintenanceRecord,
    MaintenanceSchedule, MonthBucket, MonthlyDistribution, RecordChanges, RecordStatus,
    ScheduleChanges,
};
use crate::session::SessionManager;
use crate::widgets::photos::{PhotoFile, check_file};

pub const MACHINES: &str = "machines";
pub const SCHEDULES: &str = "maintenance_schedules";
pub const CALENDAR: &str = "maintenance_calendar";
pub const RECORDS: &str = "maintenance_records";
pub const TEMPLATES: &str = "checklist_templates";
pub const GENERATE_CALENDAR_RPC: &str = "generate_maintenance_calendar";
const PHOTO_PREFIX: &str = "maintenance-photos";

const MACHINE_COLUMNS: [&str; 6] = [
    "id",
    "machine_no",
    "machine_name",
    "category",
    "location",
    "status",
];

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct DataAccess {
    backend: Arc<dyn Backend>,
    session: Arc<SessionManager>,
    policy: DatePolicy,
    photos: PhotoLimits,
    bucket: String,
    clock: Clock,
    last_photo_stamp: Mutex<i64>,
}

impl DataAccess {
    pub fn new(
        backend: Arc<dyn Backend>,
        session: Arc<SessionManager>,
        settings: &PortalSettings,
        policy: DatePolicy,
    ) -> Self {
        Self {
            backend,
            session,
            policy,
            photos: settings.photos.clone(),
            bucket: settings.bucket.clone(),
            clock: Arc::new(Utc::now),
            last_photo_stamp: Mutex::new(0),
        }
    }

    /// Replaces the wall clock; "now" drives derived filters and stamps.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn policy(&self) -> &DatePolicy {
        &self.policy
    }

    pub fn photo_limits(&self) -> &PhotoLimits {
        &self.photos
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Session gate plus cancellation race around one backend round trip.
    async fn guard<T, F>(&self, accessor: &'static str, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.session.is_authenticated() {
            debug!(accessor, "no session; redirecting to login");
            self.session.redirect_to_login();
            return Err(PortalError::Authentication);
        }
        if cancel.is_cancelled() {
            return Err(PortalError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PortalError::Cancelled),
            result = call => result,
        };
        if let Err(err) = &result
            && !err.is_cancelled()
        {
            error!(accessor, error = %err, "backend call failed");
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        accessor: &'static str,
        query: Query,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let rows = self
            .guard(accessor, cancel, self.backend.select(&query))
            .await?;
        decode_rows(rows)
    }

    // ---- machines ----

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_machines(
        &self,
        filter: &MachineFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Machine>> {
        let query = with_conditions(
            Query::table(MACHINES).columns(&["*"]).order("machine_no", true),
            filter.conditions(),
        );
        self.fetch("get_machines", query, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_machine(&self, id: &str, cancel: &CancellationToken) -> Result<Machine> {
        let query = Query::table(MACHINES).columns(&["*"]).eq("id", id).limit(1);
        self.fetch("get_machine", query, cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found("makine", id))
    }

    // ---- schedules ----

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_schedules(
        &self,
        filter: &ScheduleFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<MaintenanceSchedule>> {
        let query = with_conditions(
            Query::table(SCHEDULES)
                .columns(&["*"])
                .join(Join::inner(MACHINES, "machine_id", &MACHINE_COLUMNS))
                .order("created_at", false),
            filter.conditions(),
        );
        self.fetch("get_schedules", query, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn create_schedule(
        &self,
        mut changes: ScheduleChanges,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceSchedule> {
        let mut problems = vec![];
        if blank(changes.machine_id.as_deref()) {
            problems.push("Makine zorunludur".to_string());
        }
        if blank(changes.maintenance_type.as_deref()) {
            problems.push("Bakım Tipi zorunludur".to_string());
        }
        if changes.frequency.is_none() {
            problems.push("Frekans zorunludur".to_string());
        }
        problems.extend(normalize_months(&mut changes));
        if !problems.is_empty() {
            return Err(PortalError::Validation(problems));
        }
        changes.is_active.get_or_insert(true);

        let payload = serde_json::to_value(&changes)?;
        let row = self
            .guard("create_schedule", cancel, self.backend.insert(SCHEDULES, payload))
            .await?;
        let id = row_id(&row)?;
        info!(schedule = %id, "schedule created");
        self.get_schedule(&id, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_schedule(
        &self,
        id: &str,
        mut changes: ScheduleChanges,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceSchedule> {
        let problems = normalize_months(&mut changes);
        if !problems.is_empty() {
            return Err(PortalError::Validation(problems));
        }
        let payload = serde_json::to_value(&changes)?;
        let updated = self
            .guard(
                "update_schedule",
                cancel,
                self.backend
                    .update(SCHEDULES, &[Condition::eq("id", id)], payload),
            )
            .await?;
        if updated.is_empty() {
            return Err(not_found("periyot", id));
        }
        self.get_schedule(id, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_schedule(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        let removed = self
            .guard(
                "delete_schedule",
                cancel,
                self.backend.delete(SCHEDULES, &[Condition::eq("id", id)]),
            )
            .await?;
        if removed == 0 {
            return Err(not_found("periyot", id));
        }
        info!(schedule = %id, "schedule deleted");
        Ok(())
    }

    async fn get_schedule(&self, id: &str, cancel: &CancellationToken) -> Result<MaintenanceSchedule> {
        let query = Query::table(SCHEDULES)
            .columns(&["*"])
            .join(Join::inner(MACHINES, "machine_id", &MACHINE_COLUMNS))
            .eq("id", id)
            .limit(1);
        self.fetch("get_schedule", query, cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found("periyot", id))
    }

    // ---- calendar ----

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_calendar_events(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        filter: &CalendarFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<CalendarEvent>> {
        let query = with_conditions(
            Query::table(CALENDAR)
                .columns(&["*"])
                .join(Join::inner(MACHINES, "machine_id", &MACHINE_COLUMNS[..5]))
                .join(Join::inner(
                    SCHEDULES,
                    "schedule_id",
                    &["id", "maintenance_type", "description"],
                ))
                .gte("scheduled_date", from.to_string())
                .lte("scheduled_date", to.to_string())
                .order("scheduled_date", true),
            filter.conditions(),
        );
        self.fetch("get_calendar_events", query, cancel).await
    }

    pub async fn get_year_calendar(
        &self,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<CalendarEvent>> {
        let (Some(from), Some(to)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Err(PortalError::validation(format!("Geçersiz yıl: {year}")));
        };
        self.get_calendar_events(from, to, &CalendarFilter::default(), cancel)
            .await
    }

    /// Twelve buckets from the calendar rows of `year`.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_monthly_distribution(
        &self,
        year: i32,
        cancel: &CancellationToken,
    ) -> Result<MonthlyDistribution> {
        let query = Query::table(CALENDAR)
            .columns(&["month", "status"])
            .eq("year", year);
        let rows = self
            .guard("get_monthly_distribution", cancel, self.backend.select(&query))
            .await?;

        let mut distribution = [MonthBucket::default(); 12];
        for row in rows {
            let month = row.get("month").and_then(Value::as_u64).unwrap_or(0);
            let Some(bucket) = (month as usize)
                .checked_sub(1)
                .and_then(|idx| distribution.get_mut(idx))
            else {
                continue;
            };
            match row
                .get("status")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<RecordStatus>().ok())
            {
                Some(RecordStatus::Scheduled) => bucket.scheduled += 1,
                Some(RecordStatus::Completed) => bucket.completed += 1,
                Some(RecordStatus::Overdue) => bucket.overdue += 1,
                _ => {}
            }
            bucket.total += 1;
        }
        Ok(distribution)
    }

    /// Drops each year's calendar rows and asks the backend to rebuild them.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn regenerate_calendar(
        &self,
        years: &[i32],
        cancel: &CancellationToken,
    ) -> Result<()> {
        if years.is_empty() {
            return Err(PortalError::validation("Lütfen en az bir yıl seçin!"));
        }
        for &year in years {
            self.guard(
                "regenerate_calendar",
                cancel,
                self.backend.delete(CALENDAR, &[Condition::eq("year", year)]),
            )
            .await?;
            self.guard(
                "regenerate_calendar",
                cancel,
                self.backend
                    .rpc(GENERATE_CALENDAR_RPC, json!({ "p_year": year })),
            )
            .await?;
            info!(year, "calendar regenerated");
        }
        Ok(())
    }

    // ---- records ----

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_records(
        &self,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<MaintenanceRecord>> {
        let query = with_conditions(
            Query::table(RECORDS)
                .columns(&["*"])
                .join(Join::inner(MACHINES, "machine_id", &MACHINE_COLUMNS))
                .order("scheduled_date", true),
            filter.conditions(),
        );
        self.fetch("get_records", query, cancel).await
    }

    pub async fn get_record(&self, id: &str, cancel: &CancellationToken) -> Result<MaintenanceRecord> {
        self.get_records(&RecordFilter::by_id(id), cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found("bakım kaydı", id))
    }

    /// Records matching one of the named filters, resolved against "now".
    pub async fn get_pending(
        &self,
        filter: DerivedFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<MaintenanceRecord>> {
        let resolved = filter.resolve(self.now(), &self.policy);
        self.get_records(&resolved, cancel).await
    }

    #[tracing::instrument(skip(self, changes, template, cancel))]
    pub async fn create_record(
        &self,
        changes: RecordChanges,
        template: Option<&ChecklistTemplate>,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceRecord> {
        let mut problems = vec![];
        if blank(changes.machine_id.as_deref()) {
            problems.push("Makine zorunludur".to_string());
        }
        if blank(changes.maintenance_type.as_deref()) {
            problems.push("Bakım Tipi zorunludur".to_string());
        }
        if changes.scheduled_date.is_none() {
            problems.push("Planlanan Tarih zorunludur".to_string());
        }
        problems.extend(self.record_invariants(&changes, template));
        if !problems.is_empty() {
            return Err(PortalError::Validation(problems));
        }

        let mut changes = changes;
        changes.status.get_or_insert(RecordStatus::Pending);
        if changes.performed_by.is_none() {
            changes.performed_by = self.session.user_id();
        }
        let payload = serde_json::to_value(&changes)?;
        let row = self
            .guard("create_record", cancel, self.backend.insert(RECORDS, payload))
            .await?;
        let id = row_id(&row)?;
        info!(record = %id, "maintenance record created");
        self.get_record(&id, cancel).await
    }

    #[tracing::instrument(skip(self, changes, template, cancel))]
    pub async fn update_record(
        &self,
        id: &str,
        changes: RecordChanges,
        template: Option<&ChecklistTemplate>,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceRecord> {
        let problems = self.record_invariants(&changes, template);
        if !problems.is_empty() {
            return Err(PortalError::Validation(problems));
        }
        let payload = serde_json::to_value(&changes)?;
        let updated = self
            .guard(
                "update_record",
                cancel,
                self.backend.update(RECORDS, &[Condition::eq("id", id)], payload),
            )
            .await?;
        if updated.is_empty() {
            return Err(not_found("bakım kaydı", id));
        }
        self.get_record(id, cancel).await
    }

    /// Update that always lands as completed, stamped now. Caller-supplied
    /// status and completion date are overwritten.
    pub async fn complete_record(
        &self,
        id: &str,
        mut changes: RecordChanges,
        template: Option<&ChecklistTemplate>,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceRecord> {
        changes.status = Some(RecordStatus::Completed);
        changes.completed_date = Some(self.now());
        self.update_record(id, changes, template, cancel).await
    }

    fn record_invariants(
        &self,
        changes: &RecordChanges,
        template: Option<&ChecklistTemplate>,
    ) -> Vec<String> {
        let mut problems = vec![];
        if let Some(photos) = &changes.photos
            && photos.len() > self.photos.max_files
        {
            problems.push(format!(
                "En fazla {} fotoğraf yükleyebilirsiniz!",
                self.photos.max_files
            ));
        }
        if let (Some(results), Some(template)) = (&changes.checklist_results, template) {
            for key in results.keys() {
                if !template.item_ids().any(|id| id == key) {
                    problems.push(format!("Tanımsız checklist maddesi: {key}"));
                }
            }
        }
        problems
    }

    // ---- checklist templates ----

    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_checklist_templates(
        &self,
        filter: &TemplateFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChecklistTemplate>> {
        let query = with_conditions(
            Query::table(TEMPLATES)
                .columns(&["*"])
                .order("created_at", false),
            filter.conditions(),
        );
        self.fetch("get_checklist_templates", query, cancel).await
    }

    pub async fn get_default_checklist_template(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<ChecklistTemplate>> {
        let query = Query::table(TEMPLATES)
            .columns(&["*"])
            .eq("is_default", true)
            .limit(1);
        Ok(self
            .fetch("get_default_checklist_template", query, cancel)
            .await?
            .into_iter()
            .next())
    }

    // ---- photos ----

    fn next_photo_stamp(&self) -> i64 {
        let now = self.now().timestamp_millis();
        let mut last = self.last_photo_stamp.lock();
        let stamp = if now > *last { now } else { *last + 1 };
        *last = stamp;
        stamp
    }

    /// Stores one photo under `maintenance-photos/<record>/<millis>.<ext>`
    /// and returns its public URL.
    #[tracing::instrument(skip(self, file, cancel), fields(name = %file.name, size = file.size()))]
    pub async fn upload_photo(
        &self,
        record_id: &str,
        file: PhotoFile,
        cancel: &CancellationToken,
    ) -> Result<String> {
        check_file(&file, &self.photos).map_err(PortalError::validation)?;
        let path = format!(
            "{PHOTO_PREFIX}/{record_id}/{}.{}",
            self.next_photo_stamp(),
            file.extension()
        );
        let stored = self
            .guard(
                "upload_photo",
                cancel,
                self.backend
                    .upload_object(&self.bucket, &path, file.bytes, &file.content_type),
            )
            .await?;
        Ok(self.backend.public_url(&self.bucket, &stored))
    }

    /// All files are checked before the first upload starts; the uploads then
    /// run together and fail as a group.
    pub async fn upload_photos(
        &self,
        record_id: &str,
        files: Vec<PhotoFile>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if files.len() > self.photos.max_files {
            return Err(PortalError::validation(format!(
                "En fazla {} fotoğraf yükleyebilirsiniz!",
                self.photos.max_files
            )));
        }
        let problems: Vec<String> = files
            .iter()
            .filter_map(|file| check_file(file, &self.photos).err())
            .collect();
        if !problems.is_empty() {
            return Err(PortalError::Validation(problems));
        }
        try_join_all(
            files
                .into_iter()
                .map(|file| self.upload_photo(record_id, file, cancel)),
        )
        .await
    }

    /// Accepts either a public URL or a bucket-relative path.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_photo(&self, url_or_path: &str, cancel: &CancellationToken) -> Result<()> {
        let path = photo_path(url_or_path)
            .ok_or_else(|| PortalError::validation(format!("Geçersiz fotoğraf yolu: {url_or_path}")))?;
        self.guard(
            "delete_photo",
            cancel,
            self.backend.remove_objects(&self.bucket, &[path]),
        )
        .await
    }

    // ---- aggregates ----

    /// Five counts issued together; any failure fails the whole summary.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn get_dashboard_stats(&self, cancel: &CancellationToken) -> Result<DashboardStats> {
        let (first_of_month, _) = self.policy.month_bounds(self.now());
        let month_start = self
            .policy
            .start_of_day(first_of_month)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let machines = Query::table(MACHINES).columns(&["id"]);
        let schedules = Query::table(SCHEDULES).columns(&["id"]);
        let pending = Query::table(RECORDS)
            .columns(&["id"])
            .is_in("status", [RecordStatus::Pending.as_str(), RecordStatus::InProgress.as_str()]);
        let overdue = Query::table(RECORDS)
            .columns(&["id"])
            .eq("status", RecordStatus::Overdue.as_str());
        let completed = Query::table(RECORDS)
            .columns(&["id"])
            .eq("status", RecordStatus::Completed.as_str())
            .gte("completed_date", month_start);

        let counts = async {
            futures::try_join!(
                self.backend.count(&machines),
                self.backend.count(&schedules),
                self.backend.count(&pending),
                self.backend.count(&overdue),
                self.backend.count(&completed),
            )
        };
        let (total_machines, total_schedules, pending_count, overdue_count, completed_this_month) =
            self.guard("get_dashboard_stats", cancel, counts).await?;

        Ok(DashboardStats {
            total_machines,
            total_schedules,
            pending_count,
            overdue_count,
            completed_this_month,
        })
    }
}

fn with_conditions(query: Query, conditions: Vec<Condition>) -> Query {
    conditions.into_iter().fold(query, Query::filter)
}

/// Hoists joined relations to the names views use.
fn flatten(mut row: Row) -> Row {
    if let Some(machine) = row.remove(MACHINES) {
        row.insert("machine".to_string(), machine);
    }
    if let Some(schedule) = row.remove(SCHEDULES) {
        row.insert("schedule".to_string(), schedule);
    }
    row
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(flatten(row))).map_err(PortalError::from))
        .collect()
}

fn row_id(row: &Row) -> Result<String> {
    row.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PortalError::backend("inserted row has no id"))
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn not_found(what: &str, id: &str) -> PortalError {
    PortalError::Backend {
        status: Some(404),
        message: format!("{what} bulunamadı: {id}"),
    }
}

/// Weekly schedules carry no months; every other frequency needs at least
/// one month in 1..=12. Order is kept as given.
fn normalize_months(changes: &mut ScheduleChanges) -> Vec<String> {
    let Some(frequency) = changes.frequency else {
        return vec![];
    };
    if !frequency.uses_months() {
        changes.months = Some(vec![]);
        return vec![];
    }
    match &changes.months {
        None => vec!["Lütfen en az bir ay seçin!".to_string()],
        Some(months) if months.is_empty() => vec!["Lütfen en az bir ay seçin!".to_string()],
        Some(months) => months
            .iter()
            .filter(|m| !(1..=12).contains(*m))
            .map(|m| format!("Geçersiz ay: {m}"))
            .collect(),
    }
}

/// Bucket-relative object path from a public URL or a plain path.
fn photo_path(url_or_path: &str) -> Option<String> {
    let marker = format!("{PHOTO_PREFIX}/");
    let start = url_or_path.rfind(&marker)?;
    let path = &url_or_path[start..];
    (path.len() > marker.len()).then(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use serde_json::Map;

    use super::*;
    use crate::backend::{MemoryBackend, Session, User};
    use crate::config::SessionSettings;
    use crate::host::MemoryHost;
    use crate::model::{ChecklistAnswer, Frequency};
    use crate::prefs::Preferences;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 7, 0, 0).single().expect("now")
    }

    fn session() -> Session {
        Session {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: "u1".to_string(),
                email: Some("usta@glohe.test".to_string()),
                user_metadata: Map::new(),
            },
        }
    }

    async fn facade(backend: Arc<MemoryBackend>, signed_in: bool) -> (DataAccess, Arc<MemoryHost>) {
        if signed_in {
            backend.set_session(Some(session()));
        }
        let host = Arc::new(MemoryHost::new());
        let settings = SessionSettings {
            retry_delay: Duration::ZERO,
            ..SessionSettings::default()
        };
        let manager = SessionManager::new(
            backend.clone(),
            Arc::new(Preferences::in_memory()),
            host.clone(),
            settings,
        );
        manager.init().await;
        let data = DataAccess::new(backend, manager, &PortalSettings::default(), DatePolicy::default())
            .with_clock(now);
        (data, host)
    }

    fn seed(backend: &MemoryBackend) {
        backend.seed(
            MACHINES,
            [json!({"id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres", "category": "ÜK"})],
        );
        backend.seed(
            RECORDS,
            [
                json!({"id": "r1", "machine_id": "m1", "maintenance_type": "Yağlama",
                       "scheduled_date": "2025-03-16", "status": "pending"}),
                json!({"id": "r2", "machine_id": "m1", "maintenance_type": "Kontrol",
                       "scheduled_date": "2025-03-10", "status": "overdue"}),
                json!({"id": "r3", "machine_id": "m1", "maintenance_type": "Kontrol",
                       "scheduled_date": "2025-03-02", "status": "completed",
                       "completed_date": "2025-03-03T08:00:00Z"}),
                json!({"id": "r4", "machine_id": "ghost", "maintenance_type": "Kontrol",
                       "scheduled_date": "2025-03-16", "status": "pending"}),
            ],
        );
    }

    #[tokio::test]
    async fn no_session_redirects_without_a_backend_call() {
        let backend = Arc::new(MemoryBackend::new());
        let (data, host) = facade(backend.clone(), false).await;
        let before = backend.calls().len();
        let err = data
            .get_machines(&MachineFilter::default(), &CancellationToken::new())
            .await
            .expect_err("no session");
        assert_eq!(err, PortalError::Authentication);
        assert_eq!(backend.calls().len(), before);
        assert!(host.redirects().len() >= 2);
    }

    #[tokio::test]
    async fn records_come_back_flattened_and_inner_joined() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend, true).await;
        let records = data
            .get_records(&RecordFilter::default(), &CancellationToken::new())
            .await
            .expect("records");
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r3", "r2", "r1"]);
        assert_eq!(
            records[0].machine.as_ref().map(|m| m.machine_no.as_str()),
            Some("ÜK-01")
        );
    }

    #[tokio::test]
    async fn overdue_filter_ignores_other_statuses() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend, true).await;
        let cancel = CancellationToken::new();
        let overdue = data.get_pending(DerivedFilter::Overdue, &cancel).await.expect("overdue");
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].status, RecordStatus::Overdue);
        let week = data.get_pending(DerivedFilter::Next7Days, &cancel).await.expect("week");
        assert_eq!(week.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["r1"]);
    }

    #[tokio::test]
    async fn dashboard_counts_and_fails_as_a_group() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend.clone(), true).await;
        let cancel = CancellationToken::new();
        let stats = data.get_dashboard_stats(&cancel).await.expect("stats");
        assert_eq!(
            stats,
            DashboardStats {
                total_machines: 1,
                total_schedules: 0,
                pending_count: 2,
                overdue_count: 1,
                completed_this_month: 1,
            }
        );

        backend.fail(SCHEDULES, PortalError::from_status(500, "down"));
        let err = data.get_dashboard_stats(&cancel).await.expect_err("one failed");
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn completed_this_month_starts_at_local_midnight() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            RECORDS,
            [
                // 00:30 on March 1st in Istanbul
                json!({"id": "early", "machine_id": "m1", "status": "completed",
                       "completed_date": "2025-02-28T21:30:00Z"}),
                // 23:59 on February 28th in Istanbul
                json!({"id": "late", "machine_id": "m1", "status": "completed",
                       "completed_date": "2025-02-28T20:59:00Z"}),
            ],
        );
        let (data, _) = facade(backend.clone(), true).await;
        let stats = data
            .get_dashboard_stats(&CancellationToken::new())
            .await
            .expect("stats");
        assert_eq!(stats.completed_this_month, 1);
    }

    #[tokio::test]
    async fn complete_record_forces_status_and_stamp() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend, true).await;
        let changes = RecordChanges {
            status: Some(RecordStatus::Cancelled),
            notes: Some("bitti".to_string()),
            ..RecordChanges::default()
        };
        let record = data
            .complete_record("r1", changes, None, &CancellationToken::new())
            .await
            .expect("completed");
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.completed_date, Some(now()));
        assert_eq!(record.notes.as_deref(), Some("bitti"));
    }

    #[tokio::test]
    async fn record_invariants_block_the_write() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend.clone(), true).await;
        let template: ChecklistTemplate = serde_json::from_value(json!({
            "id": "t1", "items": [{"id": "a", "type": "checkbox", "label": "A"}]
        }))
        .expect("template");
        let changes = RecordChanges {
            photos: Some(vec!["1".into(), "2".into(), "3".into()]),
            checklist_results: Some([("zz".to_string(), ChecklistAnswer::Flag(true))].into()),
            ..RecordChanges::default()
        };
        let err = data
            .update_record("r1", changes, Some(&template), &CancellationToken::new())
            .await
            .expect_err("invalid");
        assert!(matches!(err, PortalError::Validation(ref p) if p.len() == 2));
        assert_eq!(backend.calls_starting_with("update"), 0);
    }

    #[tokio::test]
    async fn schedules_require_months_unless_weekly() {
        let backend = Arc::new(MemoryBackend::new());
        seed(&backend);
        let (data, _) = facade(backend, true).await;
        let cancel = CancellationToken::new();
        let monthly = ScheduleChanges {
            machine_id: Some("m1".to_string()),
            maintenance_type: Some("Yağlama".to_string()),
            frequency: Some(Frequency::Monthly),
            months: Some(vec![]),
            ..ScheduleChanges::default()
        };
        let err = data.create_schedule(monthly.clone(), &cancel).await.expect_err("no months");
        assert_eq!(err, PortalError::validation("Lütfen en az bir ay seçin!"));

        let weekly = ScheduleChanges {
            frequency: Some(Frequency::Weekly),
            months: Some(vec![3, 4]),
            ..monthly
        };
        let schedule = data.create_schedule(weekly, &cancel).await.expect("weekly");
        assert!(schedule.months.is_empty());
        assert!(schedule.is_active);
        assert_eq!(schedule.machine.map(|m| m.id).as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn regenerate_deletes_then_calls_rpc_per_year() {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(CALENDAR, [json!({"id": "c1", "year": 2025}), json!({"id": "c2", "year": 2026})]);
        backend.on_rpc(GENERATE_CALENDAR_RPC, |_| Ok(Value::Null));
        let (data, _) = facade(backend.clone(), true).await;
        let cancel = CancellationToken::new();
        assert!(matches!(
            data.regenerate_calendar(&[], &cancel).await,
            Err(PortalError::Validation(_))
        ));
        data.regenerate_calendar(&[2025], &cancel).await.expect("regenerated");
        assert_eq!(backend.rows(CALENDAR).len(), 1);
        assert_eq!(backend.calls_starting_with("rpc generate_maintenance_calendar"), 1);
    }

    #[tokio::test]
    async fn photo_paths_never_collide_within_a_millisecond() {
        let backend = Arc::new(MemoryBackend::new());
        let (data, _) = facade(backend.clone(), true).await;
        let files = vec![
            PhotoFile::new("a.jpg", "image/jpeg", vec![1]),
            PhotoFile::new("b.png", "image/png", vec![2]),
        ];
        let urls = data
            .upload_photos("r9", files, &CancellationToken::new())
            .await
            .expect("uploaded");
        assert_eq!(urls.len(), 2);
        let paths = backend.object_paths();
        let stamp = now().timestamp_millis();
        assert!(paths.contains(&format!("maintenance-photos/maintenance-photos/r9/{stamp}.jpg")));
        assert!(paths.contains(&format!("maintenance-photos/maintenance-photos/r9/{}.png", stamp + 1)));

        data.delete_photo(&urls[0], &CancellationToken::new())
            .await
            .expect("deleted");
        assert_eq!(backend.object_paths().len(), 1);
    }

    #[tokio::test]
    async fn bad_photo_type_is_rejected_before_upload() {
        let backend = Arc::new(MemoryBackend::new());
        let (data, _) = facade(backend.clone(), true).await;
        let err = data
            .upload_photos(
                "r1",
                vec![PhotoFile::new("doc.pdf", "application/pdf", vec![1])],
                &CancellationToken::new(),
            )
            .await
            .expect_err("bad type");
        assert_eq!(err, PortalError::validation("doc.pdf desteklenmeyen format!"));
        assert_eq!(backend.calls_starting_with("upload"), 0);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let backend = Arc::new(MemoryBackend::new());
        let (data, _) = facade(backend.clone(), true).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = data
            .get_machines(&MachineFilter::default(), &cancel)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(backend.calls_starting_with("select"), 0);
    }
}
