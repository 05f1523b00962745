use std::io::{IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::backend::User;
use crate::config::Config;
use crate::datetime::{DatePolicy, format_date};
use crate::model::{DashboardStats, MaintenanceRecord, RecordStatus, priority_label};
use crate::widgets::export::Table;

/// Plain-text output for the terminal front end.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let setting = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match setting.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => std::io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };
        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn write_pending<W: Write>(
        &self,
        out: W,
        tasks: &[MaintenanceRecord],
        policy: &DatePolicy,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Öncelik", "Makine", "Bakım Tipi", "Tarih", "Kalan", "Durum"];
        let rows = tasks
            .iter()
            .map(|task| {
                let status = task.status.label().to_string();
                let status = if task.status == RecordStatus::Overdue {
                    self.paint(&status, "31")
                } else {
                    status
                };
                vec![
                    task.id.clone(),
                    priority_label(task.priority).to_string(),
                    task.machine
                        .as_ref()
                        .map(|m| m.display())
                        .unwrap_or_else(|| "-".to_string()),
                    task.maintenance_type.clone(),
                    format_date(task.scheduled_date),
                    policy.relative_time(task.scheduled_date, now),
                    status,
                ]
            })
            .collect::<Vec<_>>();
        write_table(out, &headers, &rows)
    }

    pub fn write_table<W: Write>(&self, out: W, table: &Table) -> anyhow::Result<()> {
        let headers = table.headers.iter().map(String::as_str).collect::<Vec<_>>();
        write_table(out, &headers, &table.rows)
    }

    pub fn write_stats<W: Write>(&self, mut out: W, stats: &DashboardStats) -> anyhow::Result<()> {
        let overdue = stats.overdue_count.to_string();
        let overdue = if stats.overdue_count > 0 {
            self.paint(&overdue, "31")
        } else {
            overdue
        };
        for (label, value) in [
            ("Toplam Makine", stats.total_machines.to_string()),
            ("Aktif Plan", stats.total_schedules.to_string()),
            ("Bekleyen Bakım", stats.pending_count.to_string()),
            ("Geciken Bakım", overdue),
            ("Bu Ay Tamamlanan", stats.completed_this_month.to_string()),
        ] {
            let pad = 18usize.saturating_sub(UnicodeWidthStr::width(label));
            writeln!(out, "{label}{} {value}", " ".repeat(pad))?;
        }
        Ok(())
    }

    pub fn write_user<W: Write>(
        &self,
        mut out: W,
        user: &User,
        display_name: &str,
        can_manage: bool,
    ) -> anyhow::Result<()> {
        writeln!(out, "{display_name}")?;
        writeln!(out, "id:     {}", user.id)?;
        writeln!(out, "email:  {}", user.email.as_deref().unwrap_or("-"))?;
        let role = if can_manage { "yönetici" } else { "teknisyen" };
        writeln!(out, "rol:    {role}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(mut out: W, headers: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    let mut widths = headers
        .iter()
        .map(|h| UnicodeWidthStr::width(*h))
        .collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(visible_width(cell));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(out, "{}{} ", header, pad(header, *width))?;
    }
    writeln!(out)?;
    for width in &widths {
        write!(out, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(out)?;

    for row in rows {
        for (idx, width) in widths.iter().enumerate() {
            let cell = row.get(idx).map(String::as_str).unwrap_or("");
            write!(out, "{cell}{} ", pad(cell, *width))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    " ".repeat(width.saturating_sub(visible_width(cell)))
}

fn visible_width(cell: &str) -> usize {
    let mut plain = String::with_capacity(cell.len());
    let mut escaped = false;
    for ch in cell.chars() {
        if escaped {
            escaped = ch != 'm';
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        plain.push(ch);
    }
    UnicodeWidthStr::width(plain.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_on_display_width() {
        let mut out = Vec::new();
        let rows = vec![
            vec!["Öğe".to_string(), "1".to_string()],
            vec!["x".to_string(), "22".to_string()],
        ];
        write_table(&mut out, &["Ad", "No"], &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Ad  No ");
        assert_eq!(lines[1], "--- -- ");
        assert_eq!(lines[2], "Öğe 1  ");
        assert_eq!(lines[3], "x   22 ");
    }

    #[test]
    fn escape_codes_do_not_count_toward_width() {
        assert_eq!(visible_width("\x1b[31mGecikmiş\x1b[0m"), 8);
    }

    #[test]
    fn stats_are_listed_one_per_line() {
        let stats = DashboardStats {
            total_machines: 4,
            total_schedules: 3,
            pending_count: 2,
            overdue_count: 1,
            completed_this_month: 5,
        };
        let mut out = Vec::new();
        Renderer::plain().write_stats(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("Geciken Bakım"));
        assert!(text.lines().all(|l| !l.contains('\x1b')));
    }
}
