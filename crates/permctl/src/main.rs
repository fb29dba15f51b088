#![forbid(unsafe_code)]

mod demo;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use permissive_core::errors::SettingsReport;
use permissive_core::settings::BreakSettings;
use permissive_core::traits::SessionControl;
use permissive_engine::breaks::BreakScheduler;
use permissive_engine::script::{DelayableScript, TickReport};
use permissive_engine::state::settings_file;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "permctl",
    version,
    about = "Inspect break-scheduler settings and simulate the permissive decision engine."
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create, validate, or print settings files.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },

    /// Report break-scheduler status for a settings file.
    Breaks {
        #[command(subcommand)]
        action: BreaksCmd,
    },

    /// Run the demo woodcutting tree for a number of ticks.
    Simulate(SimulateArgs),
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Write a settings file with default break-scheduler values.
    Init {
        /// Write to file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,

        /// Enable the break scheduler.
        #[arg(long)]
        enabled: bool,
    },

    /// Validate a settings file.
    Check {
        file: String,

        /// Output structured JSON report.
        #[arg(long)]
        json: bool,

        /// Fail on skipped fields (not just unreadable files).
        #[arg(long)]
        strict: bool,
    },

    /// Print the effective break-scheduler settings.
    Show { file: String },
}

#[derive(Subcommand)]
enum BreaksCmd {
    /// Show status and lifetime statistics.
    Status {
        file: String,

        /// Output JSON.
        #[arg(long)]
        json: bool,
    },

    /// Zero the lifetime statistics in a settings file.
    ResetStats { file: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.cmd {
        Cmd::Config { action } => match action {
            ConfigCmd::Init { output, enabled } => cmd_config_init(output.as_deref(), enabled),
            ConfigCmd::Check { file, json, strict } => cmd_config_check(&file, json, strict),
            ConfigCmd::Show { file } => cmd_config_show(&file),
        },

        Cmd::Breaks { action } => match action {
            BreaksCmd::Status { file, json } => cmd_breaks_status(&file, json),
            BreaksCmd::ResetStats { file } => cmd_breaks_reset(&file),
        },

        Cmd::Simulate(args) => cmd_simulate(&args),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── Settings ────────────────────────────────────────────────────

fn cmd_config_init(output: Option<&str>, enabled: bool) -> Result<()> {
    let settings = BreakSettings {
        enabled,
        ..BreakSettings::default()
    };
    if let Some(path) = output {
        if std::path::Path::new(path).exists() {
            bail!("{path} already exists");
        }
        settings_file::save_break_settings(path, &settings)?;
        eprintln!("wrote {path}");
    } else {
        let doc = settings.merge_into(serde_json::json!({}));
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }
    Ok(())
}

fn cmd_config_check(file: &str, json_out: bool, strict: bool) -> Result<()> {
    let (_, outcome) = settings_file::load_break_settings(file)
        .with_context(|| format!("check failed for {file}"))?;

    let pass = !strict || outcome.warnings.is_empty();
    let report = SettingsReport {
        file: file.to_string(),
        pass,
        applied: outcome.applied,
        warnings: outcome.warnings,
    };

    if json_out {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if report.pass {
            eprintln!("  ok  {file} ({} field(s) applied)", report.applied.len());
        } else {
            eprintln!("  FAIL {file}");
        }
        for w in &report.warnings {
            eprintln!("  warn  {}: {}", w.field, w.message);
        }
    }

    if !report.pass {
        bail!("check failed for {file}");
    }
    Ok(())
}

fn cmd_config_show(file: &str) -> Result<()> {
    let (settings, _) = settings_file::load_break_settings(file)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

// ── Break scheduler ─────────────────────────────────────────────

fn cmd_breaks_status(file: &str, json_out: bool) -> Result<()> {
    let (settings, _) = settings_file::load_break_settings(file)?;
    let session: Arc<dyn SessionControl> = Arc::new(demo::ConsoleSession::default());
    let scheduler = BreakScheduler::new(session, settings);
    let snapshot = scheduler.snapshot();

    if json_out {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let s = scheduler.settings();
        eprintln!("  Status:       {}", snapshot.status);
        eprintln!(
            "  Run window:   {}-{} min",
            s.min_run_duration_minutes, s.max_run_duration_minutes
        );
        eprintln!(
            "  Break window: {}-{} min",
            s.min_break_duration_minutes, s.max_break_duration_minutes
        );
        eprintln!("  Breaks taken: {}", snapshot.total_breaks_taken);
        eprintln!(
            "  Break time:   {}m",
            snapshot.total_break_time_ms / 60_000
        );
    }
    Ok(())
}

fn cmd_breaks_reset(file: &str) -> Result<()> {
    let (mut settings, _) = settings_file::load_break_settings(file)?;
    settings.total_breaks_taken = 0;
    settings.total_break_time_ms = 0;
    settings_file::save_break_settings(file, &settings)?;
    eprintln!("  statistics reset in {file}");
    Ok(())
}

// ── Simulation ──────────────────────────────────────────────────

#[derive(Args)]
struct SimulateArgs {
    /// Settings file holding the break scheduler configuration.
    #[arg(long)]
    settings: Option<String>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 20)]
    ticks: u32,

    /// Seed for the simulated world and break durations.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Backpack capacity of the simulated agent.
    #[arg(long, default_value_t = 5)]
    capacity: u32,

    /// Force a break on this tick (1-based).
    #[arg(long)]
    break_at: Option<u32>,

    /// Milliseconds to sleep between ticks.
    #[arg(long, default_value_t = 0)]
    tick_ms: u64,

    /// Write updated break statistics back to --settings.
    #[arg(long)]
    save: bool,

    /// Output a JSON summary.
    #[arg(long)]
    json: bool,
}

fn cmd_simulate(args: &SimulateArgs) -> Result<()> {
    if args.save && args.settings.is_none() {
        bail!("--save requires --settings");
    }
    let settings = match &args.settings {
        Some(path) => settings_file::load_break_settings(path)?.0,
        None => BreakSettings::default(),
    };

    let world = demo::World::new(args.seed, args.capacity);
    let (script, delays) = demo::woodcutting(&world);
    let mut host = DelayableScript::with_handle(script, delays);
    let session: Arc<dyn SessionControl> = Arc::new(demo::ConsoleSession::default());
    let mut breaks = BreakScheduler::with_seed(session, settings, args.seed);

    let mut reports = Vec::new();
    let (mut ran, mut suppressed, mut on_break) = (0u32, 0u32, 0u32);

    for tick in 1..=args.ticks {
        if args.break_at == Some(tick) && !breaks.force_break() {
            tracing::warn!(tick, "break not forced: scheduler disabled or already on break");
        }
        let line = if !breaks.update() {
            on_break += 1;
            format!("on break: {}", breaks.status())
        } else if host.tick() {
            ran += 1;
            host.inner()
                .last_report()
                .map(TickReport::to_string)
                .unwrap_or_default()
        } else {
            suppressed += 1;
            "delayed".to_string()
        };
        if !args.json {
            println!("tick {tick:>4}: {line}");
        }
        reports.push(serde_json::json!({ "tick": tick, "report": line }));
        if args.tick_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.tick_ms));
        }
    }
    breaks.shutdown();

    if args.json {
        let summary = serde_json::json!({
            "ticks": args.ticks,
            "ran": ran,
            "delayed": suppressed,
            "on_break": on_break,
            "logs_held": world.logs.get(),
            "logs_banked": world.logs_banked.get(),
            "bank_trips": world.bank_trips.get(),
            "state": host.inner().current_state().map(|s| s.name()),
            "status": host.inner().status(),
            "breaks": breaks.snapshot(),
            "reports": reports,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!(
            "  {} ran, {} delayed, {} on break; {} logs banked in {} trip(s)",
            ran,
            suppressed,
            on_break,
            world.logs_banked.get(),
            world.bank_trips.get()
        );
    }

    if args.save {
        if let Some(path) = &args.settings {
            settings_file::save_break_settings(path, breaks.settings())?;
            eprintln!("  saved break statistics to {path}");
        }
    }
    Ok(())
}
