use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Fallback colour for anything without a palette entry.
pub const DEFAULT_STATUS_COLOR: &str = "#3b82f6";

pub mod chart_colors {
    pub const PRIMARY: &str = "#667eea";
    pub const SECONDARY: &str = "#764ba2";
    pub const SUCCESS: &str = "#10b981";
    pub const WARNING: &str = "#f59e0b";
    pub const DANGER: &str = "#ef4444";
    pub const INFO: &str = "#3b82f6";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Scheduled,
    Pending,
    InProgress,
    Completed,
    Overdue,
    Cancelled,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 6] = [
        RecordStatus::Scheduled,
        RecordStatus::Pending,
        RecordStatus::InProgress,
        RecordStatus::Completed,
        RecordStatus::Overdue,
        RecordStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Scheduled => "scheduled",
            RecordStatus::Pending => "pending",
            RecordStatus::InProgress => "in_progress",
            RecordStatus::Completed => "completed",
            RecordStatus::Overdue => "overdue",
            RecordStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordStatus::Scheduled => "Planlandı",
            RecordStatus::Pending => "Bekliyor",
            RecordStatus::InProgress => "Devam Ediyor",
            RecordStatus::Completed => "Tamamlandı",
            RecordStatus::Overdue => "Gecikmiş",
            RecordStatus::Cancelled => "İptal Edildi",
        }
    }

    /// Display colour; a pure lookup on the status value.
    pub fn color(self) -> &'static str {
        match self {
            RecordStatus::Scheduled => "#3b82f6",
            RecordStatus::Pending => "#eab308",
            RecordStatus::InProgress => "#f97316",
            RecordStatus::Completed => "#22c55e",
            RecordStatus::Overdue => "#ef4444",
            RecordStatus::Cancelled => "#6b7280",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}

/// Colour for a raw status string as it arrives from the backend.
pub fn status_color(raw: &str) -> &'static str {
    raw.parse::<RecordStatus>()
        .map(RecordStatus::color)
        .unwrap_or(DEFAULT_STATUS_COLOR)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::SemiAnnual,
        Frequency::Annual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::SemiAnnual => "semi-annual",
            Frequency::Annual => "annual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Frequency::Weekly => "Haftalık",
            Frequency::Monthly => "Aylık",
            Frequency::Quarterly => "3 Aylık",
            Frequency::SemiAnnual => "6 Aylık",
            Frequency::Annual => "Yıllık",
        }
    }

    /// Weekly schedules run every week; they never carry a month list.
    pub fn uses_months(self) -> bool {
        self != Frequency::Weekly
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::ALL
            .into_iter()
            .find(|freq| freq.as_str() == s.trim())
            .ok_or_else(|| format!("unknown frequency: {s}"))
    }
}

pub fn priority_label(level: u8) -> &'static str {
    match level {
        0 => "Normal",
        1 => "Yüksek",
        2 => "Acil",
        _ => "-",
    }
}

pub fn priority_color(level: u8) -> &'static str {
    match level {
        1 => "#f97316",
        2 => "#ef4444",
        _ => "#64748b",
    }
}

/// (value, label, colour) for every machine category.
pub const MACHINE_CATEGORIES: [(&str, &str, &str); 4] = [
    ("ÜK", "Üretim", "#3b82f6"),
    ("TD", "Teknik Destek", "#8b5cf6"),
    ("ÜT", "Üretim Teknik", "#06b6d4"),
    ("NA", "Genel Alan", "#10b981"),
];

pub fn category_label(value: &str) -> &str {
    MACHINE_CATEGORIES
        .iter()
        .find(|(v, _, _)| *v == value)
        .map(|(_, label, _)| *label)
        .unwrap_or(value)
}

pub fn category_color(value: &str) -> &'static str {
    MACHINE_CATEGORIES
        .iter()
        .find(|(v, _, _)| *v == value)
        .map(|(_, _, color)| *color)
        .unwrap_or(DEFAULT_STATUS_COLOR)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Machine {
    pub id: String,
    pub machine_no: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Machine {
    pub fn display(&self) -> String {
        format!("{} - {}", self.machine_no, self.machine_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub id: String,
    pub machine_id: String,
    pub maintenance_type: String,
    pub frequency: Frequency,
    #[serde(default, deserialize_with = "null_as_default")]
    pub months: Vec<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
}

/// The slice of a schedule that calendar rows join in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub id: String,
    #[serde(default)]
    pub maintenance_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub machine_id: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    pub maintenance_type: String,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub scheduled_time: Option<String>,
    pub status: RecordStatus,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub week: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSummary>,
}

impl CalendarEvent {
    pub fn title(&self) -> String {
        let machine_no = self
            .machine
            .as_ref()
            .map(|m| m.machine_no.as_str())
            .unwrap_or("-");
        format!("{machine_no} - {}", self.maintenance_type)
    }

    pub fn color(&self) -> &'static str {
        self.status.color()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChecklistAnswer {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ChecklistAnswer {
    /// Required-item check: ticked box or non-blank input.
    pub fn is_filled(&self) -> bool {
        match self {
            ChecklistAnswer::Flag(checked) => *checked,
            ChecklistAnswer::Number(_) => true,
            ChecklistAnswer::Text(text) => !text.trim().is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            ChecklistAnswer::Flag(b) => b.to_string(),
            ChecklistAnswer::Number(n) => n.to_string(),
            ChecklistAnswer::Text(t) => t.clone(),
        }
    }
}

pub type ChecklistResults = BTreeMap<String, ChecklistAnswer>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceRecord {
    pub id: String,
    pub machine_id: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub maintenance_type: String,
    pub scheduled_date: NaiveDate,
    pub status: RecordStatus,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checklist_results: ChecklistResults,
    #[serde(default, deserialize_with = "null_as_default")]
    pub photos: Vec<String>,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<Machine>,
}

impl MaintenanceRecord {
    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }
}

/// Fields a caller may set when creating or editing a record. Unset fields
/// are left out of the payload.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RecordChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist_results: Option<ChecklistResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ScheduleChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistKind {
    Checkbox,
    Radio,
    Text,
    Number,
    Textarea,
    Select,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChecklistKind,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecklistTemplate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub maintenance_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<ChecklistItem>,
}

impl ChecklistTemplate {
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_machines: u64,
    pub total_schedules: u64,
    pub pending_count: u64,
    pub overdue_count: u64,
    pub completed_this_month: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthBucket {
    pub scheduled: u64,
    pub completed: u64,
    pub overdue: u64,
    pub total: u64,
}

/// Twelve buckets, index 0 = January.
pub type MonthlyDistribution = [MonthBucket; 12];

fn default_true() -> bool {
    true
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_color_is_a_lookup_with_fallback() {
        assert_eq!(status_color("overdue"), "#ef4444");
        assert_eq!(status_color("completed"), "#22c55e");
        assert_eq!(status_color("mystery"), DEFAULT_STATUS_COLOR);
    }

    #[test]
    fn frequency_uses_kebab_case_on_the_wire() {
        let freq: Frequency = serde_json::from_value(json!("semi-annual")).expect("parse");
        assert_eq!(freq, Frequency::SemiAnnual);
        assert_eq!(freq.label(), "6 Aylık");
        assert!(!Frequency::Weekly.uses_months());
    }

    #[test]
    fn record_tolerates_null_collections() {
        let record: MaintenanceRecord = serde_json::from_value(json!({
            "id": "r1",
            "machine_id": "m1",
            "maintenance_type": "Yağlama",
            "scheduled_date": "2025-03-15",
            "status": "in_progress",
            "checklist_results": null,
            "photos": null,
            "machine": { "id": "m1", "machine_no": "ÜK-01", "machine_name": "Pres" }
        }))
        .expect("record");
        assert!(record.photos.is_empty());
        assert!(record.checklist_results.is_empty());
        assert_eq!(record.status, RecordStatus::InProgress);
        assert_eq!(record.machine.map(|m| m.machine_no).as_deref(), Some("ÜK-01"));
    }

    #[test]
    fn checklist_answers_keep_their_shape() {
        let results: ChecklistResults =
            serde_json::from_value(json!({"a": true, "b": "ok", "c": 4.5})).expect("answers");
        assert_eq!(results["a"], ChecklistAnswer::Flag(true));
        assert_eq!(results["b"], ChecklistAnswer::Text("ok".to_string()));
        assert_eq!(results["c"], ChecklistAnswer::Number(4.5));
        assert!(!ChecklistAnswer::Text("  ".to_string()).is_filled());
    }

    #[test]
    fn unknown_checklist_kind_is_tolerated() {
        let item: ChecklistItem =
            serde_json::from_value(json!({"id": "x", "type": "slider", "label": "X"}))
                .expect("item");
        assert_eq!(item.kind, ChecklistKind::Unsupported);
        assert_eq!(category_label("TD"), "Teknik Destek");
        assert_eq!(priority_label(2), "Acil");
    }
}
