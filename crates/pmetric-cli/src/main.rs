//! pmetric CLI - project estimation and concolic test generation
//!
//! Command-line front end for the metric calculators, the test generator
//! and the combined project report.

mod config;
mod project;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pmetric_concolic::{SymbolicEngine, TestGeneration};
use pmetric_core::{CocomoIIProject, CocomoMode, Routine, TeamMember};
use pmetric_metrics::{
    burndown_forecast, capacity_with_rate, cocomo_i, cocomo_ii_project, evm_with_bac, pert,
    velocity, velocity_stats,
};
use pmetric_report::{render_text, JsonRenderer, Renderer, ReportAssembler, TextRenderer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use project::ProjectFile;

#[derive(Parser)]
#[command(name = "pmetric")]
#[command(author, version, about = "Project estimation and concolic test generation", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    /// Configuration file (defaults to ./pmetric.toml when present)
    #[arg(long, env = "PMETRIC_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Three-point (PERT) estimate
    Pert {
        optimistic: f64,
        likely: f64,
        pessimistic: f64,
    },

    /// Basic COCOMO estimate
    Cocomo {
        /// Size in thousands of lines of code
        kloc: f64,

        /// Development mode (organic, semi-detached, embedded)
        #[arg(short, long, default_value = "organic")]
        mode: CocomoMode,
    },

    /// COCOMO II post-architecture estimate
    Cocomo2 {
        /// Size in thousands of lines of code
        kloc: f64,

        /// Scale factor rating, e.g. PREC=3.72 (repeatable)
        #[arg(long = "scale-factor", value_name = "NAME=VALUE", value_parser = parse_rating)]
        scale_factors: Vec<(String, f64)>,

        /// Effort multiplier, e.g. RELY=1.10 (repeatable)
        #[arg(long = "cost-driver", value_name = "NAME=VALUE", value_parser = parse_rating)]
        cost_drivers: Vec<(String, f64)>,
    },

    /// Earned value snapshot
    Evm {
        /// Planned value
        #[arg(long)]
        pv: f64,
        /// Earned value
        #[arg(long)]
        ev: f64,
        /// Actual cost
        #[arg(long)]
        ac: f64,
        /// Budget at completion (defaults to PV)
        #[arg(long)]
        bac: Option<f64>,
    },

    /// Velocity, forecast and capacity from sprint history
    Velocity {
        /// Completed points per sprint, oldest first
        #[arg(required = true)]
        points: Vec<u32>,

        /// Points left in the backlog
        #[arg(long)]
        remaining: Option<f64>,

        /// Team member availability, e.g. ana=0.8 (repeatable)
        #[arg(long = "member", value_name = "NAME=AVAILABILITY", value_parser = parse_rating)]
        members: Vec<(String, f64)>,

        /// Points per fully available member (overrides config)
        #[arg(long)]
        points_per_member: Option<f64>,
    },

    /// Generate concrete test inputs for a routine
    GenTests {
        /// Routine JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Maximum paths to resolve, 0 for unbounded (overrides config)
        #[arg(long)]
        max_paths: Option<usize>,

        /// Wall-clock budget in milliseconds, 0 for unbounded (overrides config)
        #[arg(long)]
        max_duration_ms: Option<u64>,

        /// Loop iterations per loop entry (overrides config)
        #[arg(long)]
        unroll_bound: Option<usize>,

        /// Probe seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Assemble a full project report
    Report {
        /// Project JSON file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn parse_rating(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value in '{}': {}", s, e))?;
    Ok((name.trim().to_string(), value))
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    let config = Config::load(cli.config.as_deref())?;
    let format = cli.format;

    match cli.command {
        Commands::Pert {
            optimistic,
            likely,
            pessimistic,
        } => {
            let result = pert(optimistic, likely, pessimistic)?;
            emit(format, &result, || {
                format!(
                    "Expected: {:.3}\nVariance: {:.3}\nStd dev:  {:.3}\n",
                    result.expected, result.variance, result.std_dev
                )
            })
        }

        Commands::Cocomo { kloc, mode } => {
            let estimate = cocomo_i(kloc, mode)?;
            emit(format, &estimate, || {
                format!(
                    "Effort:       {:.2} person-months\nSchedule:     {:.2} months\nStaff:        {:.2}\nProductivity: {:.0} LOC/PM\n",
                    estimate.effort_pm, estimate.schedule_months, estimate.staff, estimate.productivity
                )
            })
        }

        Commands::Cocomo2 {
            kloc,
            scale_factors,
            cost_drivers,
        } => {
            let mut project = CocomoIIProject::new(kloc);
            for (name, value) in scale_factors {
                project = project.scale_factor(name, value);
            }
            for (name, value) in cost_drivers {
                project = project.cost_driver(name, value);
            }
            let estimate = cocomo_ii_project(&project)?;
            emit(format, &estimate, || {
                format!(
                    "Effort:   {:.2} person-months\nSchedule: {:.2} months\nStaff:    {:.2}\nExponent: {:.4}\nEAF:      {:.3}\n",
                    estimate.effort_pm, estimate.schedule_months, estimate.staff, estimate.exponent, estimate.eaf
                )
            })
        }

        Commands::Evm { pv, ev, ac, bac } => {
            let snapshot = evm_with_bac(pv, ev, ac, bac.unwrap_or(pv))?;
            emit(format, &snapshot, || {
                format!(
                    "CV:   {:.2}\nSV:   {:.2}\nCPI:  {}\nSPI:  {}\nEAC:  {}\nETC:  {}\nVAC:  {}\nTCPI: {}\n",
                    snapshot.cv,
                    snapshot.sv,
                    snapshot.cpi,
                    snapshot.spi,
                    snapshot.eac,
                    snapshot.etc,
                    snapshot.vac,
                    snapshot.tcpi
                )
            })
        }

        Commands::Velocity {
            points,
            remaining,
            members,
            points_per_member,
        } => {
            let rate = points_per_member.unwrap_or(config.sprint.points_per_member);
            velocity_command(format, &points, remaining, &members, rate)
        }

        Commands::GenTests {
            file,
            max_paths,
            max_duration_ms,
            unroll_bound,
            seed,
        } => {
            let mut exploration = config.exploration.clone();
            if let Some(n) = max_paths {
                exploration.max_paths = n;
            }
            if let Some(ms) = max_duration_ms {
                exploration.max_duration_ms = ms;
            }
            if let Some(bound) = unroll_bound {
                exploration.unroll_bound = bound;
            }
            if let Some(seed) = seed {
                exploration.seed = seed;
            }

            let routine: Routine = read_json(&file)?;
            let generation = SymbolicEngine::new()
                .with_options(exploration.engine_options())
                .generate_tests(&routine, &exploration.budget())
                .with_context(|| format!("test generation failed for {}", file.display()))?;
            log_summary(&generation, exploration.max_duration_ms);

            let report = ReportAssembler::new(&routine.name)
                .test_generation(Ok(generation))?
                .finish();
            match format {
                Format::Text => Ok(TextRenderer.render(&report)?),
                Format::Json => Ok(serde_json::to_string_pretty(&report.test_generation[0])? + "\n"),
            }
        }

        Commands::Report { file } => {
            let project: ProjectFile = read_json(&file)?;
            let report = project
                .build_report(&config)
                .with_context(|| format!("cannot build report for {}", file.display()))?;
            match format {
                Format::Text => Ok(render_text(&report)),
                Format::Json => Ok(JsonRenderer.render(&report)? + "\n"),
            }
        }
    }
}

/// Plain text from `text`, or the serialized value
fn emit<T: Serialize>(format: Format, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    match format {
        Format::Text => Ok(text()),
        Format::Json => Ok(serde_json::to_string_pretty(value)? + "\n"),
    }
}

#[derive(Serialize)]
struct VelocitySummary {
    velocity: f64,
    std_dev: f64,
    min: f64,
    max: f64,
    sprints: usize,
    forecast_sprints: Option<u32>,
    capacity: Option<f64>,
}

fn velocity_command(
    format: Format,
    points: &[u32],
    remaining: Option<f64>,
    members: &[(String, f64)],
    points_per_member: f64,
) -> Result<String> {
    let v = velocity(points)?;
    let stats = velocity_stats(points)?;
    let forecast_sprints = remaining.map(|r| burndown_forecast(r, v)).transpose()?;
    let capacity = if members.is_empty() {
        None
    } else {
        let team: Vec<TeamMember> = members
            .iter()
            .map(|(name, availability)| TeamMember::new(name, *availability))
            .collect();
        Some(capacity_with_rate(&team, points_per_member)?)
    };

    let summary = VelocitySummary {
        velocity: v,
        std_dev: stats.std_dev,
        min: stats.min,
        max: stats.max,
        sprints: stats.sprints,
        forecast_sprints,
        capacity,
    };
    emit(format, &summary, || {
        let mut out = format!(
            "Velocity: {:.2} points/sprint over {} sprints (min {:.0}, max {:.0}, std dev {:.2})\n",
            summary.velocity, summary.sprints, summary.min, summary.max, summary.std_dev
        );
        if let (Some(r), Some(n)) = (remaining, summary.forecast_sprints) {
            out.push_str(&format!("Forecast: {} sprints for {:.0} remaining points\n", n, r));
        }
        if let Some(c) = summary.capacity {
            out.push_str(&format!("Capacity: {:.1} points\n", c));
        }
        out
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        bail!("file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn log_summary(generation: &TestGeneration, max_duration_ms: u64) {
    let c = &generation.coverage;
    if c.truncated {
        tracing::warn!(
            routine = %generation.routine,
            explored = c.explored,
            budget = ?(max_duration_ms > 0).then(|| Duration::from_millis(max_duration_ms)),
            "exploration stopped by budget"
        );
    }
    tracing::info!(
        routine = %generation.routine,
        cases = generation.test_cases.len(),
        feasible = c.feasible,
        infeasible = c.infeasible,
        indeterminate = c.indeterminate,
        "test generation finished"
    );
}
