//! Tabular exports: CSV, XLSX and a printable HTML page, all built from
//! one `Table`.

use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use rust_xlsxwriter::{Color, Format, FormatBorder, FormatPattern, Workbook};
use tracing::info;
use unicode_width::UnicodeWidthStr;

use super::html::escape;
use crate::datetime::{DatePolicy, format_date, format_time, month_name};
use crate::error::{PortalError, Result};
use crate::host::Download;
use crate::model::{CalendarEvent, MaintenanceRecord};

pub const SHEET_NAME: &str = "Bakım Kayıtları";
const MAX_COLUMN_WIDTH: usize = 50;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_MIME: &str = "text/csv;charset=utf-8";
pub const HTML_MIME: &str = "text/html;charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Print,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "print" | "html" | "pdf" => Ok(Self::Print),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Display width per column (header included) plus padding, capped.
    pub fn column_widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let widest = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(|cell| UnicodeWidthStr::width(cell.as_str()))
                    .fold(UnicodeWidthStr::width(header.as_str()), usize::max);
                (widest + 2).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }
}

pub fn records_table(records: &[MaintenanceRecord], policy: &DatePolicy) -> Table {
    let mut table = Table::new(
        "Bakım Kayıtları Raporu",
        &[
            "Makine No",
            "Makine Adı",
            "Bakım Tipi",
            "Planlanan Tarih",
            "Tamamlanma Tarihi",
            "Durum",
            "Süre (dk)",
            "Yapan Kişi",
            "Notlar",
        ],
    );
    for record in records {
        let machine = record.machine.as_ref();
        table.push(vec![
            or_dash(machine.map(|m| m.machine_no.as_str())),
            or_dash(machine.map(|m| m.machine_name.as_str())),
            or_dash(Some(&record.maintenance_type)),
            format_date(record.scheduled_date),
            policy.format_opt_datetime(record.completed_date),
            record.status.label().to_string(),
            record
                .duration_minutes
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            or_dash(record.performed_by.as_deref()),
            or_dash(record.notes.as_deref()),
        ]);
    }
    table
}

pub fn calendar_table(events: &[CalendarEvent], year: i32) -> Table {
    let mut table = Table::new(
        &format!("Bakım Takvimi {year}"),
        &[
            "Tarih",
            "Saat",
            "Makine No",
            "Makine Adı",
            "Bakım Tipi",
            "Frekans",
            "Durum",
            "Ay",
            "Hafta",
        ],
    );
    for event in events {
        let machine = event.machine.as_ref();
        table.push(vec![
            format_date(event.scheduled_date),
            format_time(event.scheduled_time.as_deref()),
            or_dash(machine.map(|m| m.machine_no.as_str())),
            or_dash(machine.map(|m| m.machine_name.as_str())),
            or_dash(Some(&event.maintenance_type)),
            event
                .frequency
                .map(|f| f.label().to_string())
                .unwrap_or_else(|| "-".to_string()),
            event.status.label().to_string(),
            or_dash(event.month.map(month_name)),
            event
                .week
                .map(|w| w.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table
}

fn or_dash(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

/// UTF-8 CSV with a byte-order mark so spreadsheet apps pick the encoding.
pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut out = UTF8_BOM.to_vec();
    let mut wtr = WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(&table.headers).map_err(render_error)?;
    for row in &table.rows {
        wtr.write_record(row).map_err(render_error)?;
    }
    let body = wtr
        .into_inner()
        .map_err(|e| PortalError::Render(e.to_string()))?;
    out.extend(body);
    Ok(out)
}

pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME).map_err(render_error)?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0xFFFFFF))
        .set_background_color(Color::RGB(0x667EEA))
        .set_pattern(FormatPattern::Solid)
        .set_border(FormatBorder::Thin);

    for (col, header) in table.headers.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, header.as_str(), &header_format)
            .map_err(render_error)?;
    }
    worksheet.set_freeze_panes(1, 0).map_err(render_error)?;

    for (row_index, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            worksheet
                .write((row_index + 1) as u32, col as u16, cell.as_str())
                .map_err(render_error)?;
        }
    }

    for (col, width) in table.column_widths().into_iter().enumerate() {
        worksheet
            .set_column_width(col as u16, width as f64)
            .map_err(render_error)?;
    }

    workbook.save_to_buffer().map_err(render_error)
}

/// Standalone page handed to the host's print dialog.
pub fn print_html(table: &Table, generated: NaiveDate) -> String {
    let head = table
        .headers
        .iter()
        .map(|h| format!("<th>{}</th>", escape(h)))
        .collect::<String>();
    let body = table
        .rows
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|c| format!("<td>{}</td>", escape(c)))
                .collect::<String>();
            format!("<tr>{cells}</tr>")
        })
        .collect::<String>();
    format!(
        r#"<!DOCTYPE html>
<html lang="tr">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
body {{ font-family: Arial, sans-serif; margin: 20px; }}
h1 {{ color: #667eea; }}
table {{ width: 100%; border-collapse: collapse; font-size: 11px; }}
th {{ background: #667eea; color: #fff; padding: 6px; text-align: left; }}
td {{ border-bottom: 1px solid #e5e7eb; padding: 6px; }}
tr:nth-child(even) td {{ background: #f5f7fa; }}
</style>
</head>
<body>
<h1>{title}</h1>
<p>Rapor Tarihi: {date}</p>
<p>Toplam Kayıt: {count}</p>
<table><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>
</body>
</html>"#,
        title = escape(&table.title),
        date = format_date(generated),
        count = table.rows.len(),
    )
}

/// Builds the download for `format`; `stem` gets `_<date>` and the extension.
#[tracing::instrument(skip(table), fields(rows = table.rows.len()))]
pub fn download(
    table: &Table,
    format: ExportFormat,
    stem: &str,
    now: DateTime<Utc>,
    policy: &DatePolicy,
) -> Result<Download> {
    let today = policy.today(now);
    let file = match format {
        ExportFormat::Csv => Download {
            filename: format!("{stem}_{today}.csv"),
            mime: CSV_MIME.to_string(),
            bytes: to_csv(table)?,
        },
        ExportFormat::Xlsx => Download {
            filename: format!("{stem}_{today}.xlsx"),
            mime: XLSX_MIME.to_string(),
            bytes: to_xlsx(table)?,
        },
        ExportFormat::Print => Download {
            filename: format!("{stem}_{today}.html"),
            mime: HTML_MIME.to_string(),
            bytes: print_html(table, today).into_bytes(),
        },
    };
    info!(filename = %file.filename, bytes = file.bytes.len(), "export ready");
    Ok(file)
}

fn render_error(err: impl std::fmt::Display) -> PortalError {
    PortalError::Render(err.to_string())
}
