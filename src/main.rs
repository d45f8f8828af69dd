//! decide CLI: run preference resolution and decision phases from TOML scenarios.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use decide_kernel::config::EngineConfig;
use decide_kernel::explore::SelectionPolicy;
use decide_kernel::resolve::ResolveMode;
use decide_kernel::scenario::{self, Scenario};

#[derive(Parser)]
#[command(name = "decide", version, about = "Preference-based decision kernel")]
struct Cli {
    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the exploration policy.
    #[arg(long, global = true)]
    policy: Option<SelectionPolicy>,

    /// Seed for the exploration RNG.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the top goal's operator preferences of one cycle.
    Resolve {
        /// Scenario file.
        scenario: PathBuf,

        /// Cycle to resolve (1-based).
        #[arg(long, default_value = "1")]
        cycle: usize,

        /// Consistency-check mode: keep indifferent sets instead of choosing.
        #[arg(long)]
        check: bool,
    },

    /// Run decision phases for the cycles of a scenario.
    Run {
        /// Scenario file.
        scenario: PathBuf,

        /// Stop after this many cycles.
        #[arg(long)]
        cycles: Option<usize>,
    },

    /// Manage engine configuration files.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a configuration file with every key at its default.
    Init {
        /// Where to write the file.
        #[arg(default_value = "decide.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config.exploration.policy = policy;
    }
    if cli.seed.is_some() {
        config.exploration.seed = cli.seed;
    }

    match cli.command {
        Commands::Resolve {
            scenario: path,
            cycle,
            check,
        } => {
            let scenario = Scenario::load(&path)?;
            let mode = if check {
                ResolveMode::ConsistencyCheck
            } else {
                ResolveMode::Commit
            };
            let report = scenario::resolve(&scenario, config, cycle, mode)?;
            match cli.format {
                Format::Json => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                Format::Text => {
                    println!("Cycle {}: impasse {}", report.cycle, report.impasse);
                    if report.candidates.is_empty() {
                        println!("  (no candidates)");
                    }
                    for c in &report.candidates {
                        println!("  {c}");
                    }
                    if report.forced {
                        println!("  decided by forced selection");
                    }
                }
            }
        }

        Commands::Run {
            scenario: path,
            cycles,
        } => {
            let scenario = Scenario::load(&path)?;
            let report = scenario::run(&scenario, config, cycles)?;
            match cli.format {
                Format::Json => println!("{}", report.to_json()?),
                Format::Text => {
                    if !report.name.is_empty() {
                        println!("Scenario: {}", report.name);
                    }
                    for c in &report.cycles {
                        println!("{:>4}  {}", c.cycle, c.outcome);
                        println!("      goals: {}", c.goals.join(" > "));
                    }
                    let s = &report.stats;
                    println!();
                    println!(
                        "decisions={} impasses={} goals_removed={} gds_violations={}",
                        s.decisions, s.impasses_created, s.goals_removed, s.gds_violations
                    );
                    println!(
                        "promotions={} demotion_passes={} reclaimed={} live_ids={} live_wmes={}",
                        s.promotions,
                        s.demotion_passes,
                        s.identifiers_reclaimed,
                        s.live_identifiers,
                        s.live_wmes
                    );
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    miette::bail!(
                        "{} already exists; pass --force to overwrite",
                        path.display()
                    );
                }
                EngineConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
        },
    }

    Ok(())
}
