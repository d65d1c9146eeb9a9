// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Enos scenario CLI
//!
//! Decodes the flight plan in a directory and lists, outlines, validates or
//! generates its scenarios, or observes and validates its samples.
//!
//! Usage:
//!
//! ```text
//! enos-scenario [--chdir <dir>] [--var-file <path>]... <command>
//!
//!   list [filter...]
//!   outline [filter...]
//!   validate [filter...]
//!   generate [--out <dir>] [filter...]
//!   sample list
//!   sample observe <sample> [--min <n>] [--max <n>] [--pct <p>] [--seed <n>] [--subset <name>]... [--exclude-subset <name>]...
//!   sample validate
//! ```
//!
//! Variable values are read from `enos*.vars.hcl` in the flight plan
//! directory, any `--var-file`, and `ENOS_VAR_<name>` environment variables.

use anyhow::Context;
use clap::{Parser, Subcommand};
use enos_flightplan::{
    Config, DecodeTarget, FlightPlan, GenerateReq, SampleFilter, SampleFunc, SampleObservationReq,
    SampleValidationReq, ScenarioFilter, Workspace,
};
use enos_hcl::Diagnostics;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "enos-scenario", version, about = "Decode, expand and generate enos scenarios")]
struct Cli {
    /// Flight plan directory
    #[arg(long, global = true, default_value = ".", env = "ENOS_CHDIR")]
    chdir: PathBuf,

    /// Additional variables files
    #[arg(long = "var-file", global = true)]
    var_files: Vec<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List scenario instances
    List {
        /// Scenario filter, e.g. `upgrade arch:arm64 !distro:rhel`
        filter: Vec<String>,
    },
    /// Print scenario outlines as JSON
    Outline { filter: Vec<String> },
    /// Decode every selected scenario instance
    Validate { filter: Vec<String> },
    /// Generate Terraform root modules
    Generate {
        /// Output directory (default: <chdir>/.enos)
        #[arg(long)]
        out: Option<PathBuf>,
        filter: Vec<String>,
    },
    /// Work with samples
    #[command(subcommand)]
    Sample(SampleCommand),
}

#[derive(Subcommand, Debug)]
enum SampleCommand {
    /// List sample names
    List,
    /// Observe a sample and print its elements as JSON
    Observe {
        /// Sample name
        sample: String,
        /// Minimum number of elements
        #[arg(long, default_value_t = 1)]
        min: u32,
        /// Maximum number of elements
        #[arg(long)]
        max: Option<u32>,
        /// Maximum as a percentage of the frame
        #[arg(long)]
        pct: Option<f32>,
        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
        /// Only these subsets
        #[arg(long = "subset")]
        subsets: Vec<String>,
        /// Leave out these subsets
        #[arg(long = "exclude-subset")]
        exclude_subsets: Vec<String>,
        /// Sampling function: purposive_stratified or all
        #[arg(long, default_value_t = SampleFunc::PurposiveStratified)]
        func: SampleFunc,
    },
    /// Validate that every sample can be framed
    Validate,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "enos_flightplan=debug" } else { "enos_flightplan=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_workspace(cli: &Cli) -> anyhow::Result<Workspace> {
    let env = std::env::vars().map(|(k, v)| format!("{}={}", k, v)).collect();
    let ws = Workspace::load(&cli.chdir)
        .with_context(|| format!("loading flight plan from {}", cli.chdir.display()))?
        .with_var_files(&cli.var_files)
        .context("loading variables files")?
        .with_env(env);
    Ok(ws)
}

/// Prints diagnostics and reports whether any were errors.
fn report(diags: &Diagnostics) -> bool {
    if !diags.is_empty() {
        eprintln!("{}", diags);
    }
    !diags.has_errors()
}

async fn decode_scenarios(
    ws: &Workspace,
    target: DecodeTarget,
    filter: &[String],
    config: &Config,
) -> anyhow::Result<(FlightPlan, Diagnostics)> {
    let filter = ScenarioFilter::parse(filter).context("parsing scenario filter")?;
    debug!(%filter, %target, "decoding scenarios");
    Ok(ws
        .decoder()?
        .with_target(target)
        .with_filter(filter)
        .with_config(config.clone())
        .decode_all()
        .await)
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config::from_env().context("reading configuration from environment")?;
    let ws = load_workspace(&cli)?;

    match cli.command {
        Commands::List { filter } => {
            let (fp, diags) = decode_scenarios(&ws, DecodeTarget::ScenariosNamesExpandVariants, &filter, &config).await?;
            for scenario in fp.scenarios() {
                println!("{}", scenario.filter_str());
            }
            Ok(report(&diags))
        }
        Commands::Outline { filter } => {
            let (fp, diags) = decode_scenarios(&ws, DecodeTarget::ScenariosOutlines, &filter, &config).await?;
            let outlines: Vec<_> = fp.scenarios().iter().map(|s| s.outline()).collect();
            println!("{}", serde_json::to_string_pretty(&outlines)?);
            Ok(report(&diags))
        }
        Commands::Validate { filter } => {
            let (fp, diags) = decode_scenarios(&ws, DecodeTarget::All, &filter, &config).await?;
            for scenario in fp.scenarios() {
                println!("valid: {}", scenario.filter_str());
            }
            Ok(report(&diags))
        }
        Commands::Generate { out, filter } => {
            let filter = ScenarioFilter::parse(&filter).context("parsing scenario filter")?;
            let ws = match out {
                Some(out) => ws.with_out_dir(out),
                None => ws,
            };
            let (modules, diags) = GenerateReq::new(ws, filter).with_config(config).generate().await;
            for module in &modules {
                println!("{}: {}", module.scenario, module.dir.display());
            }
            Ok(report(&diags))
        }
        Commands::Sample(SampleCommand::List) => {
            let (fp, diags) = ws.decoder()?.with_target(DecodeTarget::Samples).decode();
            for name in fp.sample_names() {
                println!("{}", name);
            }
            Ok(report(&diags))
        }
        Commands::Sample(SampleCommand::Observe {
            sample,
            min,
            max,
            pct,
            seed,
            subsets,
            exclude_subsets,
            func,
        }) => {
            let filter = SampleFilter {
                sample,
                subsets,
                exclude_subsets,
                min,
                max,
                percentage: pct,
                seed,
            };
            let res = SampleObservationReq::new(ws, filter)?.with_func(func).observe()?;
            println!("{}", serde_json::to_string_pretty(&res)?);
            Ok(report(&res.diagnostics))
        }
        Commands::Sample(SampleCommand::Validate) => {
            let diags = SampleValidationReq::new(ws)
                .with_workers(config.sample_validation_workers)
                .validate()
                .await;
            Ok(report(&diags))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
