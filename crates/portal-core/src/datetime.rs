use std::fs;
use std::path::PathBuf;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::model::RecordStatus;

const TIMEZONE_CONFIG_FILE: &str =
  "portal-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "PORTAL_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "PORTAL_TIME_CONFIG";
const DEFAULT_PORTAL_TIMEZONE: &str =
  "Europe/Istanbul";

pub const MONTHS_TR: [&str; 12] = [
  "Ocak", "Şubat", "Mart", "Nisan",
  "Mayıs", "Haziran", "Temmuz",
  "Ağustos", "Eylül", "Ekim", "Kasım",
  "Aralık"
];

const DAYS_TR: [&str; 7] = [
  "Pazartesi",
  "Salı",
  "Çarşamba",
  "Perşembe",
  "Cuma",
  "Cumartesi",
  "Pazar"
];

const DAYS_SHORT_TR: [&str; 7] = [
  "Pzt", "Sal", "Çar", "Per", "Cum",
  "Cmt", "Paz"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Calendar-date policy for the portal: every "today", month bound and
/// relative label is computed in this zone (UTC+3 by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePolicy {
  tz: Tz
}

impl Default for DatePolicy {
  fn default() -> Self {
    Self {
      tz: chrono_tz::Europe::Istanbul
    }
  }
}

impl DatePolicy {
  pub fn new(tz: Tz) -> Self {
    Self { tz }
  }

  /// Environment override, then the optional `portal-time.toml`, then the
  /// configured zone name.
  pub fn resolve(
    configured: &str
  ) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self::new(tz);
    }

    if let Some(path) =
      timezone_config_path()
      && let Some(tz) =
        load_timezone_from_file(&path)
    {
      return Self::new(tz);
    }

    let tz = parse_timezone(
      configured,
      "config:time.zone"
    )
    .or_else(|| {
      parse_timezone(
        DEFAULT_PORTAL_TIMEZONE,
        "DEFAULT_PORTAL_TIMEZONE"
      )
    })
    .unwrap_or_else(|| {
      tracing::error!(
        "failed to parse fallback \
         timezone; using UTC"
      );
      chrono_tz::UTC
    });
    Self::new(tz)
  }

  pub fn timezone(&self) -> Tz {
    self.tz
  }

  pub fn local(
    &self,
    now: DateTime<Utc>
  ) -> DateTime<Tz> {
    now.with_timezone(&self.tz)
  }

  #[must_use]
  pub fn today(
    &self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    self.local(now).date_naive()
  }

  #[must_use]
  pub fn month_bounds(
    &self,
    now: DateTime<Utc>
  ) -> (NaiveDate, NaiveDate) {
    let today = self.today(now);
    (
      first_day_of_month(
        today.year(),
        today.month()
      )
      .unwrap_or(today),
      last_day_of_month(
        today.year(),
        today.month()
      )
      .unwrap_or(today)
    )
  }

  /// Local midnight of `date` as a UTC instant.
  pub fn start_of_day(
    &self,
    date: NaiveDate
  ) -> DateTime<Utc> {
    let naive = date
      .and_hms_opt(0, 0, 0)
      .unwrap_or_default();
    match self
      .tz
      .from_local_datetime(&naive)
      .earliest()
    {
      | Some(local) => {
        local.with_timezone(&Utc)
      }
      | None => {
        DateTime::<Utc>::from_naive_utc_and_offset(
          naive, Utc
        )
      }
    }
  }

  /// "DD.MM.YYYY HH:MM" in the portal zone.
  pub fn format_datetime(
    &self,
    dt: DateTime<Utc>
  ) -> String {
    let local = self.local(dt);
    format!(
      "{} {:02}:{:02}",
      format_date(local.date_naive()),
      local.hour(),
      local.minute()
    )
  }

  pub fn format_opt_datetime(
    &self,
    dt: Option<DateTime<Utc>>
  ) -> String {
    dt.map(|dt| {
      self.format_datetime(dt)
    })
    .unwrap_or_else(|| "-".to_string())
  }

  /// Turkish relative label such as "3 gün sonra" or "2 saat önce".
  pub fn relative_time(
    &self,
    date: NaiveDate,
    now: DateTime<Utc>
  ) -> String {
    let diff =
      self.start_of_day(date) - now;
    let abs = diff.abs();
    let is_future =
      diff > Duration::zero();

    let days = abs.num_days();
    let hours = abs.num_hours();
    let minutes = abs.num_minutes();

    let (amount, unit) = if days > 0 {
      (days, "gün")
    } else if hours > 0 {
      (hours, "saat")
    } else if minutes > 0 {
      (minutes, "dakika")
    } else {
      return "Şimdi".to_string();
    };

    if is_future {
      format!("{amount} {unit} sonra")
    } else {
      format!("{amount} {unit} önce")
    }
  }

  pub fn overdue_days(
    &self,
    scheduled: NaiveDate,
    now: DateTime<Utc>
  ) -> Overdue {
    let diff = (now
      - self.start_of_day(scheduled))
    .num_days();

    if diff <= 0 {
      Overdue {
        days:  0,
        color: "green",
        text:  "Zamanında".to_string()
      }
    } else if diff <= 7 {
      Overdue {
        days:  diff,
        color: "orange",
        text:  format!(
          "{diff} gün gecikme"
        )
      }
    } else {
      Overdue {
        days:  diff,
        color: "red",
        text:  format!(
          "{diff} gün gecikme"
        )
      }
    }
  }

  pub fn date_color_class(
    &self,
    date: NaiveDate,
    status: RecordStatus,
    now: DateTime<Utc>
  ) -> &'static str {
    match status {
      | RecordStatus::Completed => {
        return "date-completed";
      }
      | RecordStatus::Cancelled => {
        return "date-cancelled";
      }
      | _ => {}
    }

    let today = self.today(now);
    if date < today {
      "date-overdue"
    } else if date == today {
      "date-today"
    } else if date
      <= today + Duration::days(7)
    {
      "date-upcoming"
    } else {
      "date-future"
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overdue {
  pub days:  i64,
  pub color: &'static str,
  pub text:  String
}

/// "DD.MM.YYYY".
#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format("%d.%m.%Y").to_string()
}

pub fn format_opt_date(
  date: Option<NaiveDate>
) -> String {
  date
    .map(format_date)
    .unwrap_or_else(|| "-".to_string())
}

/// Normalises "HH:MM:SS" / "H:M" to "HH:MM"; missing time means 09:00.
pub fn format_time(
  time: Option<&str>
) -> String {
  let Some(time) = time
    .map(str::trim)
    .filter(|t| !t.is_empty())
  else {
    return "09:00".to_string();
  };

  let parts: Vec<&str> =
    time.split(':').collect();
  if parts.len() >= 2 {
    format!(
      "{:0>2}:{:0>2}",
      parts[0], parts[1]
    )
  } else {
    time.to_string()
  }
}

pub fn month_name(
  month: u32
) -> &'static str {
  month
    .checked_sub(1)
    .and_then(|idx| {
      MONTHS_TR.get(idx as usize)
    })
    .copied()
    .unwrap_or("")
}

/// Month names joined in the given order, e.g. "Ocak, Haziran, Aralık".
/// Out-of-range numbers are skipped.
pub fn format_months(
  months: &[u32]
) -> String {
  months
    .iter()
    .map(|m| month_name(*m))
    .filter(|name| !name.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

/// 1 = Monday .. 7 = Sunday.
pub fn day_name(
  day_of_week: u32
) -> &'static str {
  day_of_week
    .checked_sub(1)
    .and_then(|idx| {
      DAYS_TR.get(idx as usize)
    })
    .copied()
    .unwrap_or("")
}

pub fn day_short_name(
  day_of_week: u32
) -> &'static str {
  day_of_week
    .checked_sub(1)
    .and_then(|idx| {
      DAYS_SHORT_TR.get(idx as usize)
    })
    .copied()
    .unwrap_or("")
}

/// Week of the month in 7-day buckets, capped at 4.
pub fn week_of_month(
  date: NaiveDate
) -> u32 {
  match date.day() {
    | 1..=7 => 1,
    | 8..=14 => 2,
    | 15..=21 => 3,
    | _ => 4
  }
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  let (next_year, next_month) =
    if month == 12 {
      (year + 1, 1)
    } else {
      (year, month + 1)
    };
  NaiveDate::from_ymd_opt(
    next_year, next_month, 1
  )
  .and_then(|d| d.pred_opt())
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved portal timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone"
      );
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    DatePolicy,
    format_date,
    format_months,
    format_time,
    last_day_of_month,
    month_name,
    week_of_month
  };
  use crate::model::RecordStatus;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn months_keep_their_given_order() {
    assert_eq!(
      format_months(&[1, 6, 12]),
      "Ocak, Haziran, Aralık"
    );
    assert_eq!(
      format_months(&[12, 0, 1]),
      "Aralık, Ocak"
    );
  }

  #[test]
  fn today_uses_utc_plus_three() {
    let policy = DatePolicy::default();
    let late_utc = Utc
      .with_ymd_and_hms(
        2025, 3, 14, 22, 30, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      policy.today(late_utc),
      date(2025, 3, 15)
    );
  }

  #[test]
  fn month_bounds_cover_whole_month() {
    let policy = DatePolicy::default();
    let now = Utc
      .with_ymd_and_hms(
        2024, 2, 10, 9, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      policy.month_bounds(now),
      (date(2024, 2, 1), date(2024, 2, 29))
    );
    assert_eq!(
      last_day_of_month(2025, 12),
      Some(date(2025, 12, 31))
    );
  }

  #[test]
  fn formats_dates_and_times() {
    assert_eq!(
      format_date(date(2025, 3, 5)),
      "05.03.2025"
    );
    assert_eq!(
      format_time(Some("9:5:00")),
      "09:05"
    );
    assert_eq!(format_time(None), "09:00");
    assert_eq!(month_name(12), "Aralık");
    assert_eq!(month_name(13), "");
    assert_eq!(
      week_of_month(date(2025, 3, 29)),
      4
    );
  }

  #[test]
  fn relative_time_and_overdue_labels() {
    let policy = DatePolicy::default();
    let now = Utc
      .with_ymd_and_hms(
        2025, 3, 15, 7, 0, 0
      )
      .single()
      .expect("valid now");

    assert_eq!(
      policy.relative_time(
        date(2025, 3, 18),
        now
      ),
      "2 gün sonra"
    );
    assert_eq!(
      policy.relative_time(
        date(2025, 3, 10),
        now
      ),
      "5 gün önce"
    );

    let overdue = policy
      .overdue_days(date(2025, 3, 1), now);
    assert_eq!(overdue.days, 14);
    assert_eq!(overdue.color, "red");
    assert_eq!(
      policy
        .overdue_days(
          date(2025, 3, 20),
          now
        )
        .text,
      "Zamanında"
    );
  }

  #[test]
  fn date_color_class_prefers_status() {
    let policy = DatePolicy::default();
    let now = Utc
      .with_ymd_and_hms(
        2025, 3, 15, 7, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      policy.date_color_class(
        date(2025, 1, 1),
        RecordStatus::Completed,
        now
      ),
      "date-completed"
    );
    assert_eq!(
      policy.date_color_class(
        date(2025, 3, 15),
        RecordStatus::Pending,
        now
      ),
      "date-today"
    );
    assert_eq!(
      policy.date_color_class(
        date(2025, 3, 20),
        RecordStatus::Pending,
        now
      ),
      "date-upcoming"
    );
  }
}
