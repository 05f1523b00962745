use std::str::FromStr;

use chrono::{
  DateTime,
  Days,
  NaiveDate,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;
use tracing::trace;

use crate::backend::Condition;
use crate::datetime::DatePolicy;
use crate::model::{
  Frequency,
  RecordStatus
};

/// Statuses that count as "still to do".
pub const PENDING_STATUSES: [RecordStatus;
  3] = [
  RecordStatus::Pending,
  RecordStatus::InProgress,
  RecordStatus::Overdue
];

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DerivedFilter {
  Today,
  #[serde(rename = "next_7_days")]
  Next7Days,
  ThisMonth,
  Overdue,
  #[default]
  All
}

impl DerivedFilter {
  pub const ALL: [DerivedFilter; 5] = [
    DerivedFilter::Today,
    DerivedFilter::Next7Days,
    DerivedFilter::ThisMonth,
    DerivedFilter::Overdue,
    DerivedFilter::All
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | DerivedFilter::Today => "today",
      | DerivedFilter::Next7Days => {
        "next_7_days"
      }
      | DerivedFilter::ThisMonth => {
        "this_month"
      }
      | DerivedFilter::Overdue => {
        "overdue"
      }
      | DerivedFilter::All => "all"
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      | DerivedFilter::Today => "Bugün",
      | DerivedFilter::Next7Days => {
        "Sonraki 7 Gün"
      }
      | DerivedFilter::ThisMonth => {
        "Bu Ay"
      }
      | DerivedFilter::Overdue => {
        "Gecikmiş"
      }
      | DerivedFilter::All => "Tümü"
    }
  }

  /// Expands the name into concrete bounds. `overdue` replaces any status
  /// set with `[overdue]` and caps the range at today.
  #[tracing::instrument(skip(
    policy
  ))]
  pub fn resolve(
    self,
    now: DateTime<Utc>,
    policy: &DatePolicy
  ) -> RecordFilter {
    let today = policy.today(now);
    let mut filter = RecordFilter {
      status: PENDING_STATUSES.to_vec(),
      ..RecordFilter::default()
    };

    match self {
      | DerivedFilter::Today => {
        filter.date_from = Some(today);
        filter.date_to = Some(today);
      }
      | DerivedFilter::Next7Days => {
        filter.date_from = Some(today);
        filter.date_to = today
          .checked_add_days(Days::new(7));
      }
      | DerivedFilter::ThisMonth => {
        let (first, last) =
          policy.month_bounds(now);
        filter.date_from = Some(first);
        filter.date_to = Some(last);
      }
      | DerivedFilter::Overdue => {
        filter.status =
          vec![RecordStatus::Overdue];
        filter.date_to = Some(today);
      }
      | DerivedFilter::All => {}
    }

    trace!(
      filter = self.as_str(),
      from = ?filter.date_from,
      to = ?filter.date_to,
      "derived filter resolved"
    );
    filter
  }
}

impl FromStr for DerivedFilter {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted = s.trim().replace('-', "_");
    DerivedFilter::ALL
      .into_iter()
      .find(|f| f.as_str() == wanted)
      .ok_or_else(|| {
        format!("unknown filter: {s}")
      })
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct RecordFilter {
  pub id:         Option<String>,
  /// Empty means any status.
  pub status:     Vec<RecordStatus>,
  pub machine_id: Option<String>,
  pub date_from:  Option<NaiveDate>,
  pub date_to:    Option<NaiveDate>,
  pub priority:   Option<u8>
}

impl RecordFilter {
  pub fn by_id(id: &str) -> Self {
    Self {
      id: Some(id.to_string()),
      ..Self::default()
    }
  }

  pub fn conditions(
    &self
  ) -> Vec<Condition> {
    let mut out = vec![];
    if let Some(id) = &self.id {
      out.push(Condition::eq(
        "id",
        id.as_str()
      ));
    }
    match self.status.as_slice() {
      | [] => {}
      | [single] => {
        out.push(Condition::eq(
          "status",
          single.as_str()
        ))
      }
      | many => {
        out.push(Condition::In(
          "status".to_string(),
          many
            .iter()
            .map(|s| {
              Value::from(s.as_str())
            })
            .collect()
        ))
      }
    }
    if let Some(machine) =
      &self.machine_id
    {
      out.push(Condition::eq(
        "machine_id",
        machine.as_str()
      ));
    }
    if let Some(from) = self.date_from {
      out.push(Condition::Gte(
        "scheduled_date".to_string(),
        Value::from(from.to_string())
      ));
    }
    if let Some(to) = self.date_to {
      out.push(Condition::Lte(
        "scheduled_date".to_string(),
        Value::from(to.to_string())
      ));
    }
    if let Some(priority) = self.priority
    {
      out.push(Condition::eq(
        "priority", priority
      ));
    }
    out
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct MachineFilter {
  pub category: Option<String>,
  pub status:   Option<String>,
  pub search:   Option<String>
}

impl MachineFilter {
  pub fn conditions(
    &self
  ) -> Vec<Condition> {
    let mut out = vec![];
    if let Some(category) =
      &self.category
    {
      out.push(Condition::eq(
        "category",
        category.as_str()
      ));
    }
    if let Some(status) = &self.status {
      out.push(Condition::eq(
        "status",
        status.as_str()
      ));
    }
    if let Some(term) = self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
    {
      out.push(Condition::Search {
        columns: vec![
          "machine_no".to_string(),
          "machine_name".to_string(),
        ],
        term:    term.to_string()
      });
    }
    out
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ScheduleFilter {
  pub machine_id: Option<String>,
  pub frequency:  Option<Frequency>
}

impl ScheduleFilter {
  pub fn conditions(
    &self
  ) -> Vec<Condition> {
    let mut out = vec![];
    if let Some(machine) =
      &self.machine_id
    {
      out.push(Condition::eq(
        "machine_id",
        machine.as_str()
      ));
    }
    if let Some(freq) = self.frequency {
      out.push(Condition::eq(
        "frequency",
        freq.as_str()
      ));
    }
    out
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct CalendarFilter {
  pub status:     Option<RecordStatus>,
  pub machine_id: Option<String>,
  pub frequency:  Option<Frequency>
}

impl CalendarFilter {
  pub fn conditions(
    &self
  ) -> Vec<Condition> {
    let mut out = vec![];
    if let Some(status) = self.status {
      out.push(Condition::eq(
        "status",
        status.as_str()
      ));
    }
    if let Some(machine) =
      &self.machine_id
    {
      out.push(Condition::eq(
        "machine_id",
        machine.as_str()
      ));
    }
    if let Some(freq) = self.frequency {
      out.push(Condition::eq(
        "frequency",
        freq.as_str()
      ));
    }
    out
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TemplateFilter {
  pub maintenance_type: Option<String>,
  pub category:         Option<String>
}

impl TemplateFilter {
  pub fn conditions(
    &self
  ) -> Vec<Condition> {
    let mut out = vec![];
    if let Some(kind) =
      &self.maintenance_type
    {
      out.push(Condition::eq(
        "maintenance_type",
        kind.as_str()
      ));
    }
    if let Some(category) =
      &self.category
    {
      out.push(Condition::eq(
        "category",
        category.as_str()
      ));
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  /// 2025-03-15T10:00 at UTC+3.
  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2025, 3, 15, 7, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn next_seven_days_spans_today_plus_seven()
   {
    let filter = DerivedFilter::Next7Days
      .resolve(
        now(),
        &DatePolicy::default()
      );
    assert_eq!(
      filter.date_from,
      Some(date(2025, 3, 15))
    );
    assert_eq!(
      filter.date_to,
      Some(date(2025, 3, 22))
    );
    assert_eq!(
      filter.status,
      PENDING_STATUSES.to_vec()
    );
  }

  #[test]
  fn this_month_spans_first_to_last() {
    let filter = DerivedFilter::ThisMonth
      .resolve(
        now(),
        &DatePolicy::default()
      );
    assert_eq!(
      filter.date_from,
      Some(date(2025, 3, 1))
    );
    assert_eq!(
      filter.date_to,
      Some(date(2025, 3, 31))
    );
  }

  #[test]
  fn overdue_forces_status_and_caps_at_today()
   {
    let filter = DerivedFilter::Overdue
      .resolve(
        now(),
        &DatePolicy::default()
      );
    assert_eq!(
      filter.status,
      vec![RecordStatus::Overdue]
    );
    assert_eq!(filter.date_from, None);
    assert_eq!(
      filter.date_to,
      Some(date(2025, 3, 15))
    );
  }

  #[test]
  fn today_uses_local_date_near_midnight() {
    let late = Utc
      .with_ymd_and_hms(
        2025, 3, 31, 21, 30, 0
      )
      .single()
      .expect("valid now");
    let filter = DerivedFilter::Today
      .resolve(
        late,
        &DatePolicy::default()
      );
    assert_eq!(
      filter.date_from,
      Some(date(2025, 4, 1))
    );
    assert_eq!(
      filter.date_to,
      Some(date(2025, 4, 1))
    );
  }

  #[test]
  fn names_parse_with_either_separator() {
    assert_eq!(
      "next-7-days"
        .parse::<DerivedFilter>()
        .expect("parse"),
      DerivedFilter::Next7Days
    );
    assert!(
      "yesterday"
        .parse::<DerivedFilter>()
        .is_err()
    );
  }

  #[test]
  fn single_status_is_eq_many_is_in() {
    let one = RecordFilter {
      status: vec![
        RecordStatus::Overdue,
      ],
      ..RecordFilter::default()
    };
    assert!(matches!(
      one.conditions()[0],
      Condition::Eq(..)
    ));
    let all = DerivedFilter::All.resolve(
      now(),
      &DatePolicy::default()
    );
    assert!(matches!(
      all.conditions()[0],
      Condition::In(..)
    ));
  }
}
