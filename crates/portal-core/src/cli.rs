use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::DerivedFilter;
use crate::model::RecordStatus;
use crate::widgets::export::ExportFormat;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "portal",
    version,
    about = "Maintenance portal: schedules, calendar, records and reports",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "portalrc", global = true)]
    pub portalrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Bearer token for the backend; `PORTAL_TOKEN` works too.
    #[arg(long = "token", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Render one portal view and print its markup.
    View {
        name: String,
        #[arg(long)]
        record: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_parser = parse_filter)]
        filter: Option<DerivedFilter>,
    },
    /// List open maintenance work.
    Pending {
        #[arg(long, value_parser = parse_filter, default_value = "all")]
        filter: DerivedFilter,
    },
    /// Dashboard counters.
    Stats,
    /// Signed-in user and role flags.
    Whoami,
    /// Rebuild the maintenance calendar for the given years.
    Regenerate {
        #[arg(required = true)]
        years: Vec<i32>,
    },
    /// Export records between two dates.
    Export {
        #[arg(long, value_parser = parse_day)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_day)]
        to: NaiveDate,
        #[arg(long, value_parser = parse_status)]
        status: Option<RecordStatus>,
        #[arg(long, value_parser = parse_format, default_value = "xlsx")]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Logout,
}

fn parse_filter(raw: &str) -> anyhow::Result<DerivedFilter> {
    raw.parse().map_err(|err| anyhow!("{err}"))
}

fn parse_format(raw: &str) -> anyhow::Result<ExportFormat> {
    raw.parse().map_err(|err| anyhow!("{err}"))
}

fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| anyhow!("expected YYYY-MM-DD, got {raw}: {err}"))
}

fn parse_status(raw: &str) -> anyhow::Result<RecordStatus> {
    RecordStatus::ALL
        .iter()
        .copied()
        .find(|s| s.as_str() == raw.trim())
        .ok_or_else(|| anyhow!("unknown status: {raw}"))
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.key=value` / `rc.key:value` tokens out of the argument
/// list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let text = arg.to_string_lossy();
        let captured = text
            .strip_prefix("rc.")
            .and_then(|rest| rest.split_once('=').or_else(|| rest.split_once(':')))
            .map(|(k, v)| (k.to_string(), v.to_string()));
        match captured {
            Some((key, value)) => {
                debug!(key = %key, "captured positional rc override");
                overrides.push((key, value));
            }
            None => cleaned.push(arg),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
