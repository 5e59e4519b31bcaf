//! viewcount CLI: open counters for a markdown vault
//!
//! Commands: open, rename, delete, list, sync, config, migrate, replay

mod host;

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};

use viewcount_core::{CountMethod, ListView, LogLevel, Settings, TimePeriod};
use viewcount_migrate::MigrationOutcome;
use viewcount_store::{sleep_until, SortOrder};

use host::{Host, VaultStore};

#[derive(Parser)]
#[command(name = "viewcount")]
#[command(version)]
#[command(about = "Track how often items in a markdown vault are opened")]
struct Cli {
    /// Vault root directory
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// Log level, overriding the one stored in the settings
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Reference time for opens and trending windows (RFC 3339)
    #[arg(long, global = true, value_parser = parse_time)]
    now: Option<DateTime<Local>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Record opens of one or more items
    Open {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Move an item's counters to a new path
    Rename { old: String, new: String },
    /// Forget an item's counters
    Delete { path: String },
    /// Most viewed or trending items
    #[command(alias = "ls")]
    List {
        /// `views` or `trends`
        #[arg(long)]
        view: Option<ListView>,
        /// Trending window, e.g. `7-days` or `week-iso`
        #[arg(long)]
        period: Option<TimePeriod>,
        /// Number of items to show
        #[arg(long)]
        count: Option<usize>,
    },
    /// Rewrite every mirrored count to match the settings
    Sync,
    /// Show or change settings
    Config {
        #[arg(long)]
        count_method: Option<CountMethod>,
        /// Mirror counts into frontmatter
        #[arg(long)]
        mirror: Option<bool>,
        /// Frontmatter property for mirrored counts
        #[arg(long)]
        property: Option<String>,
        /// Comma-separated path prefixes to ignore
        #[arg(long)]
        exclude: Option<String>,
        /// Milliseconds to wait before mirroring into a new item
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Run pending migrations and report what changed
    Migrate,
    /// Apply `open`, `rename` and `delete` lines from stdin
    Replay,
}

fn parse_time(value: &str) -> std::result::Result<DateTime<Local>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Local))
}

fn init_logging(level: LogLevel) {
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter)
        .try_init();
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut host = Host::new(&cli.vault);

    init_logging(
        cli.log_level
            .or_else(|| host.recorded_log_level())
            .unwrap_or_default(),
    );
    debug!(vault = %host.vault().display(), "starting");

    let outcome = host.migrate()?;
    let clock = || cli.now.unwrap_or_else(Local::now);
    let mut store = host.open_store(&outcome);

    let report = match cli.command {
        Commands::Open { paths } => {
            let mut opened = Vec::with_capacity(paths.len());
            for path in &paths {
                let counted = store.handle_open(path, &clock()).await;
                opened.push(entry_json(&store, path, counted));
            }
            Value::Array(opened)
        }
        Commands::Rename { old, new } => json!({ "renamed": store.rename(&old, &new) }),
        Commands::Delete { path } => json!({ "deleted": store.delete(&path) }),
        Commands::List {
            view,
            period,
            count,
        } => {
            let settings = store.settings();
            let view = view.unwrap_or(settings.current_view);
            let period = period.unwrap_or(settings.time_period);
            let count = count.unwrap_or(settings.item_count as usize);
            list_json(&store, view, period, count, &clock())
        }
        Commands::Sync => json!({ "synced": store.sync_all_to_frontmatter() }),
        Commands::Config {
            count_method,
            mirror,
            property,
            exclude,
            delay,
        } => {
            let mut settings = store.settings().clone();
            if let Some(method) = count_method {
                settings.view_count_type = method;
            }
            if let Some(mirror) = mirror {
                settings.save_view_count_to_frontmatter = mirror;
            }
            if let Some(property) = property {
                settings.view_count_property_name = property;
            }
            if let Some(csv) = exclude {
                settings.set_excluded_paths_csv(&csv);
            }
            if let Some(delay) = delay {
                settings.templater_delay = delay;
            }
            apply_settings(&mut host, &mut store, settings.normalized())?;
            store.settings().to_value()?
        }
        Commands::Migrate => outcome_json(&outcome),
        Commands::Replay => replay(&mut store, clock).await?,
    };

    store.shutdown();
    print_json(&report)
}

/// Persist `settings` and bring existing mirrors in line with them.
fn apply_settings(host: &mut Host, store: &mut VaultStore, settings: Settings) -> Result<()> {
    let previous = store.settings().clone();
    host.write_settings(&settings)?;

    let property_changed = previous.view_count_property_name != settings.view_count_property_name;
    let resync = property_changed
        || previous.view_count_type != settings.view_count_type
        || previous.save_view_count_to_frontmatter != settings.save_view_count_to_frontmatter;
    store.set_settings(settings);

    if property_changed {
        store.clear_mirror_property(&previous.view_count_property_name);
    }
    if resync {
        store.sync_all_to_frontmatter();
    }
    Ok(())
}

/// Drive the store from stdin through the debounced event loop.
async fn replay(store: &mut VaultStore, clock: impl Fn() -> DateTime<Local>) -> Result<Value> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut applied = 0usize;

    loop {
        let deadline = store.next_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if apply_event(store, line.trim(), &clock()).await? {
                    applied += 1;
                }
            }
            () = sleep_until(deadline) => store.flush_due(Instant::now()),
        }
    }

    Ok(json!({ "events": applied, "entries": store.entries().len() }))
}

/// Apply one `open <path>`, `rename <old> -> <new>` or `delete <path>` line.
async fn apply_event(store: &mut VaultStore, line: &str, now: &DateTime<Local>) -> Result<bool> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(false);
    }
    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "open" if !rest.is_empty() => Ok(store.handle_open(rest, now).await),
        "delete" if !rest.is_empty() => Ok(store.delete(rest)),
        "rename" => {
            let Some((old, new)) = rest.split_once(" -> ") else {
                bail!("expected `rename <old> -> <new>`, got `{line}`");
            };
            Ok(store.rename(old.trim(), new.trim()))
        }
        _ => {
            warn!(line, "skipping unrecognized event");
            Ok(false)
        }
    }
}

fn entry_json(store: &VaultStore, path: &str, counted: bool) -> Value {
    let entry = store.entries().iter().find(|entry| entry.path == path);
    json!({
        "path": path,
        "counted": counted,
        "viewCount": store.get_view_count(path),
        "totalTimesOpened": entry.map_or(0, |e| e.total_times_opened),
        "uniqueDaysOpened": entry.map_or(0, |e| e.unique_days_opened),
        "lastOpenMillis": store.get_last_open_time(path),
        "status": store.status_text(path),
    })
}

fn list_json(
    store: &VaultStore,
    view: ListView,
    period: TimePeriod,
    count: usize,
    now: &DateTime<Local>,
) -> Value {
    let method = store.settings().view_count_type;
    let items: Vec<Value> = match view {
        ListView::Views => store
            .entries_by_view_count(SortOrder::Descending)
            .into_iter()
            .take(count)
            .map(|entry| json!({ "path": entry.path, "viewCount": entry.view_count(method) }))
            .collect(),
        ListView::Trends => store
            .entries_by_trending(period, now)
            .into_iter()
            .take(count)
            .map(|(entry, weight)| json!({ "path": entry.path, "weight": weight }))
            .collect(),
    };
    json!({ "view": view_name(view), "period": period.as_str(), "items": items })
}

fn view_name(view: ListView) -> &'static str {
    match view {
        ListView::Views => "views",
        ListView::Trends => "trends",
    }
}

fn outcome_json(outcome: &MigrationOutcome) -> Value {
    json!({
        "from": outcome.from.map(|v| v.to_string()),
        "applied": outcome.applied.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "warnings": outcome.warnings,
        "complete": outcome.complete,
        "pluginVersion": outcome.settings.plugin_version,
    })
}
