use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::mpsc;

use treadlap::config::AppConfig;
use treadlap::export::{self, json, ExportFormat, LapRow, SessionSnapshot};
use treadlap::live::{spawn_simulator, LiveSession, LiveUpdate};
use treadlap::logging::{init_logging, LogLevel};
use treadlap::samples::format_seconds_ago;
use treadlap::scheduler::plan;
use treadlap::simulation::run_simulated_session;
use treadlap::zones::ZoneDistribution;
use treadlap::{LapEvent, LapField, WorkoutConfig, WorkoutEngine};

/// TreadLap - Treadmill interval workout engine
///
/// Runs warmup / work / rest / cooldown interval sessions, records one lap per
/// phase with its sustained heart rate and treadmill settings, and reports
/// time spent in each heart-rate zone.
#[derive(Parser)]
#[command(name = "treadlap")]
#[command(author = "TreadLap Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Treadmill interval workout engine", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Workout layout overrides; unset values come from the config file
#[derive(Args, Debug, Clone, Copy)]
struct LayoutArgs {
    /// Warmup length in seconds
    #[arg(long)]
    warmup: Option<u32>,

    /// Work interval length in seconds
    #[arg(long)]
    work: Option<u32>,

    /// Rest interval length in seconds
    #[arg(long)]
    rest: Option<u32>,

    /// Number of work/rest repetitions
    #[arg(long)]
    reps: Option<u32>,

    /// Cooldown length in seconds
    #[arg(long)]
    cooldown: Option<u32>,
}

impl LayoutArgs {
    fn apply(&self, base: WorkoutConfig) -> WorkoutConfig {
        WorkoutConfig::new(
            self.warmup.unwrap_or(base.warmup_sec),
            self.work.unwrap_or(base.work_sec),
            self.rest.unwrap_or(base.rest_sec),
            self.reps.unwrap_or(base.reps),
            self.cooldown.unwrap_or(base.cooldown_sec),
        )
    }
}

/// `rep:field:value`, e.g. `2:speed:12.5`
#[derive(Debug, Clone, Copy)]
struct LapEdit {
    rep_index: u32,
    field: LapField,
    value: f64,
}

fn parse_lap_edit(s: &str) -> std::result::Result<LapEdit, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("Expected rep:field:value, got '{}'", s));
    }
    let rep_index = parts[0]
        .parse::<u32>()
        .map_err(|e| format!("Invalid rep index '{}': {}", parts[0], e))?;
    let field = parts[1].parse::<LapField>()?;
    let value = parts[2]
        .parse::<f64>()
        .map_err(|e| format!("Invalid value '{}': {}", parts[2], e))?;
    Ok(LapEdit { rep_index, field, value })
}

#[derive(Subcommand)]
enum Commands {
    /// Show the planned phase sequence for a workout
    Plan {
        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Run a workout against simulated heart-rate and treadmill data
    Simulate {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Simulator seed (defaults to the configured seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Drive the run with a real clock instead of instantly
        #[arg(long)]
        realtime: bool,

        /// Clock speedup in realtime mode
        #[arg(long, default_value = "1.0")]
        speedup: f64,

        /// Edit a work lap after the run (rep:field:value), repeatable
        #[arg(short = 'e', long = "edit", value_parser = parse_lap_edit)]
        edits: Vec<LapEdit>,

        /// Write the session to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (csv, json, text); guessed from the extension if omitted
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Show a saved session snapshot
    Inspect {
        /// Snapshot file (JSON)
        snapshot: PathBuf,

        /// Edit a work lap (rep:field:value), repeatable
        #[arg(short = 'e', long = "edit", value_parser = parse_lap_edit)]
        edits: Vec<LapEdit>,

        /// Write the (edited) session to a file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (csv, json, text); guessed from the extension if omitted
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Configure application settings
    Config {
        /// Write a default config file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Tabled)]
struct PlanTableRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

#[derive(Tabled)]
struct LapTableRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Lap")]
    lap: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Max 30s HR")]
    max_hr: String,
    #[tabled(rename = "Speed")]
    speed: String,
    #[tabled(rename = "Incline")]
    incline: String,
}

impl From<&LapRow> for LapTableRow {
    fn from(row: &LapRow) -> Self {
        let opt = |v: Option<f64>| v.map_or("--".to_string(), |v| format!("{:.1}", v));
        Self {
            index: row.index + 1,
            lap: row.lap.clone(),
            duration: row.duration_sec.map_or("open".to_string(), |d| format!("{:.0}s", d)),
            max_hr: opt(row.max_30s_bpm),
            speed: format!("{} ({})", opt(row.speed), row.speed_source),
            incline: format!("{} ({})", opt(row.incline), row.incline_source),
        }
    }
}

#[derive(Tabled)]
struct ZoneTableRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Seconds")]
    seconds: String,
    #[tabled(rename = "Share")]
    share: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.logging.level = LogLevel::from_verbosity(config.logging.level, cli.verbose);
    init_logging(&config.logging)?;

    if cli.verbose > 0 {
        eprintln!("{}", format!("Log level: {}", config.logging.level.to_filter()).dimmed());
    }

    match cli.command {
        Commands::Plan { layout } => {
            let workout = layout.apply(config.workout);
            print_plan(&workout);
        }

        Commands::Simulate {
            layout,
            seed,
            realtime,
            speedup,
            edits,
            output,
            format,
        } => {
            let workout = layout.apply(config.workout);
            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }

            println!("{}", "Running simulated workout...".green().bold());
            println!("  Total: {}s", workout.total_sec());

            let mut engine = WorkoutEngine::new(config.engine_settings());
            engine.set_zone_thresholds(config.zones.thresholds);

            let mut engine = if realtime {
                run_realtime(engine, &config, workout, speedup)?
            } else {
                run_simulated_session(&mut engine, workout, config.simulation, 0)?;
                engine
            };

            apply_edits(&mut engine, &edits);
            let snapshot = engine.snapshot();
            print_session(&snapshot);

            if let Some(path) = output {
                write_output(&snapshot, &path, format.as_deref())?;
            }
        }

        Commands::Inspect {
            snapshot,
            edits,
            output,
            format,
        } => {
            let saved = json::import_snapshot(&snapshot)
                .with_context(|| format!("Failed to read snapshot {}", snapshot.display()))?;
            let mut engine = WorkoutEngine::restore(saved, config.engine_settings());

            apply_edits(&mut engine, &edits);
            let snapshot = engine.snapshot();
            print_session(&snapshot);

            if let Some(path) = output {
                write_output(&snapshot, &path, format.as_deref())?;
            }
        }

        Commands::Config { init, show } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_path);
            if init {
                if path.exists() {
                    println!("{}", format!("Config already exists: {}", path.display()).yellow());
                } else {
                    AppConfig::default().save(&path)?;
                    println!("{}", format!("✓ Wrote {}", path.display()).green());
                }
            }
            if show || !init {
                println!("{}", format!("# {}", path.display()).dimmed());
                println!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}

fn run_realtime(engine: WorkoutEngine, config: &AppConfig, workout: WorkoutConfig, speedup: f64) -> Result<WorkoutEngine> {
    if !(speedup > 0.0) {
        anyhow::bail!("Speedup must be positive, got {}", speedup);
    }
    let period = Duration::from_secs_f64(1.0 / speedup);
    let start_ts = chrono::Utc::now().timestamp_millis();
    let simulation = config.simulation;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (tx, rx) = mpsc::channel(256);
        let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();

        let feeder = spawn_simulator(tx, simulation, workout, start_ts, period);
        let session = tokio::spawn(
            LiveSession::new(engine, period)
                .with_updates(updates_tx)
                .run(workout, start_ts, rx),
        );

        while let Some(update) = updates_rx.recv().await {
            print_update(&update);
        }

        let engine = session.await??;
        feeder.abort();
        Ok::<_, anyhow::Error>(engine)
    })
}

fn print_update(update: &LiveUpdate) {
    for event in &update.events {
        match event {
            LapEvent::Opened { phase, rep_index, .. } => {
                println!("{}", format!("▶ {} {}", phase, rep_index).cyan().bold());
            }
            LapEvent::Closed { index } => {
                println!("{}", format!("  lap {} closed", index + 1).dimmed());
            }
            LapEvent::Finished { reason } => {
                println!("{}", format!("■ finished ({:?})", reason).green());
            }
        }
    }

    let hr = update.heart_rate.map_or("--".to_string(), |v| format!("{:.0}", v));
    println!(
        "  {:>4}s  {:<8} {:>3}s left  HR {:>3}  last seen {}s",
        update.elapsed_sec,
        update.position.phase.to_string(),
        update.position.remaining_sec,
        hr,
        format_seconds_ago(update.last_seen_sec).dimmed()
    );
}

fn apply_edits(engine: &mut WorkoutEngine, edits: &[LapEdit]) {
    for edit in edits {
        match engine.apply_manual_override(edit.rep_index, edit.field, edit.value) {
            Ok(()) => println!(
                "{}",
                format!("✓ Work #{} {:?} set to {}", edit.rep_index, edit.field, edit.value).green()
            ),
            Err(e) => eprintln!("{}", format!("✗ {}", e).red()),
        }
    }
}

fn print_plan(workout: &WorkoutConfig) {
    let rows: Vec<PlanTableRow> = plan(workout)
        .iter()
        .map(|p| PlanTableRow {
            phase: if p.phase.is_repeated() {
                format!("{} #{}", p.phase, p.rep_index)
            } else {
                p.phase.to_string()
            },
            start: format!("{}:{:02}", p.start_sec / 60, p.start_sec % 60),
            duration: format!("{}s", p.duration_sec),
        })
        .collect();

    println!("{}", "Workout plan".blue().bold());
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("  Total: {}s", workout.total_sec());
}

fn print_session(snapshot: &SessionSnapshot) {
    let laps: Vec<LapTableRow> = snapshot.lap_rows().iter().map(LapTableRow::from).collect();
    println!();
    println!("{}", "Laps".blue().bold());
    println!("{}", Table::new(laps).with(Style::rounded()));

    let distribution = snapshot.zone_distribution();
    let zones: Vec<ZoneTableRow> = distribution
        .seconds
        .iter()
        .enumerate()
        .map(|(zone, secs)| ZoneTableRow {
            zone: ZoneDistribution::zone_label(zone),
            seconds: format!("{:.1}", secs),
            share: format!("{}%", distribution.percent[zone]),
        })
        .collect();

    println!("{}", "Time in zone".blue().bold());
    println!("{}", Table::new(zones).with(Style::rounded()));
    if let Some(zone) = distribution.dominant_zone() {
        println!("  Dominant: {}", ZoneDistribution::zone_label(zone).magenta().bold());
    }
}

fn write_output(snapshot: &SessionSnapshot, path: &Path, format: Option<&str>) -> Result<()> {
    let format = match format {
        Some(f) => ExportFormat::from_str(f)?,
        None => ExportFormat::from_path(path)?,
    };
    export::export_session(snapshot, format, path)?;
    println!("{}", format!("✓ Exported to {}", path.display()).yellow());
    Ok(())
}
