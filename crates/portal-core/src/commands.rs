use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::app::Portal;
use crate::cli::Command;
use crate::filter::RecordFilter;
use crate::model::RecordStatus;
use crate::render::Renderer;
use crate::router::MAIN_CONTAINER;
use crate::views::ViewParams;
use crate::views::pending_tasks::sort_tasks;
use crate::views::reports::EXPORT_STEM;
use crate::widgets::export::{self, ExportFormat};
use crate::widgets::validation::date_range;

/// Runs one command against a signed-in portal. Markup and tables go to
/// `out`; notices raised by views are logged.
#[instrument(skip(portal, renderer, out))]
pub async fn dispatch<W: Write>(
    portal: &mut Portal,
    renderer: &Renderer,
    command: Command,
    mut out: W,
) -> anyhow::Result<()> {
    if command == Command::Logout {
        portal.router.logout().await;
        info!("signed out");
        return Ok(());
    }
    portal.sign_in().await?;
    let cancel = CancellationToken::new();

    match command {
        Command::View {
            name,
            record,
            year,
            filter,
        } => {
            let params = ViewParams {
                record_id: record,
                year,
                filter,
                ..ViewParams::default()
            };
            let shown = portal.router.show_view(&name, params).await;
            debug!(view = %shown, "view mounted");
            let markup = portal.host.html(MAIN_CONTAINER).unwrap_or_default();
            writeln!(out, "{markup}")?;
        }
        Command::Pending { filter } => {
            let mut tasks = portal.data.get_pending(filter, &cancel).await?;
            sort_tasks(&mut tasks);
            renderer.write_pending(&mut out, &tasks, portal.data.policy(), portal.data.now())?;
        }
        Command::Stats => {
            let stats = portal.data.get_dashboard_stats(&cancel).await?;
            renderer.write_stats(&mut out, &stats)?;
        }
        Command::Whoami => {
            let user = portal
                .session
                .current_user()
                .ok_or_else(|| anyhow!("no user in session"))?;
            renderer.write_user(
                &mut out,
                &user,
                &portal.session.display_name(),
                portal.session.can_manage(),
            )?;
        }
        Command::Regenerate { years } => {
            portal.data.regenerate_calendar(&years, &cancel).await?;
            let list = years
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "{list} yılları için takvim yeniden oluşturuldu")?;
        }
        Command::Export {
            from,
            to,
            status,
            format,
            out: path,
        } => {
            let written = export_records(portal, from, to, status, format, path, &cancel).await?;
            writeln!(out, "{}", written.display())?;
        }
        Command::Logout => {}
    }

    for notice in portal.host.notices() {
        warn!(notice = %notice, "view notice");
    }
    Ok(())
}

async fn export_records(
    portal: &Portal,
    from: NaiveDate,
    to: NaiveDate,
    status: Option<RecordStatus>,
    format: ExportFormat,
    path: Option<PathBuf>,
    cancel: &CancellationToken,
) -> anyhow::Result<PathBuf> {
    if let Some(message) = date_range(from, to) {
        return Err(anyhow!(message));
    }
    let filter = RecordFilter {
        status: status.into_iter().collect(),
        date_from: Some(from),
        date_to: Some(to),
        ..RecordFilter::default()
    };
    let records = portal.data.get_records(&filter, cancel).await?;
    if records.is_empty() {
        return Err(anyhow!("no records between {from} and {to}"));
    }
    let table = export::records_table(&records, portal.data.policy());
    let file = export::download(
        &table,
        format,
        EXPORT_STEM,
        portal.data.now(),
        portal.data.policy(),
    )?;
    let target = path.unwrap_or_else(|| PathBuf::from(&file.filename));
    std::fs::write(&target, &file.bytes)
        .with_context(|| format!("failed to write {}", target.display()))?;
    info!(path = %target.display(), records = records.len(), "export written");
    Ok(target)
}
