use anyhow::Result;
use bench_runner::{BenchConfig, BenchSummary, Run, TrialOrchestrator};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bench", version, about = "Benchmark runner for autonomous coding agents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single benchmark task
    Run { task_file: PathBuf },
    /// Run every task in a directory, resetting the workspace around each
    Batch { task_dir: Option<PathBuf> },
    /// Write Markdown and JSON reports
    Report,
    /// Show totals from the results file
    Status,
    /// Create the baseline snapshot
    Setup,
    /// Reset the workspace to the baseline
    Reset,
    /// Reset and reinstall dependencies
    FullReset,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };
    let config = BenchConfig::discover()?;
    debug!(
        project = %config.project_path.display(),
        agency = %config.agency_path.display(),
        results = %config.results_path.display(),
        "config loaded"
    );
    run_command(command, config)
}

fn run_command(command: Commands, config: BenchConfig) -> Result<()> {
    match command {
        Commands::Run { task_file } => {
            let mut orch = TrialOrchestrator::new(config)?;
            let run = orch.run_single(&task_file);
            print_run(&run);
        }
        Commands::Batch { task_dir } => {
            let dir = task_dir.unwrap_or_else(|| PathBuf::from("tasks"));
            let mut orch = TrialOrchestrator::new(config)?;
            let runs = orch.run_batch(&dir)?;
            for run in &runs {
                print_run(run);
            }
            if let Some(summary) = &orch.results().summary {
                print_status(summary);
            }
        }
        Commands::Report => {
            let mut orch = TrialOrchestrator::new(config)?;
            let (summary, paths) = orch.report()?;
            print_status(&summary);
            println!("markdown_report: {}", paths.markdown.display());
            println!("json_report: {}", paths.json.display());
        }
        Commands::Status => {
            let mut orch = TrialOrchestrator::new(config)?;
            let summary = orch.status()?;
            print_status(&summary);
            println!("run `bench report` to generate the full report");
        }
        Commands::Setup => {
            let orch = TrialOrchestrator::new(config)?;
            orch.snapshotter().setup_baseline()?;
            println!("baseline: {}", orch.snapshotter().baseline_tag());
        }
        Commands::Reset => {
            let orch = TrialOrchestrator::new(config)?;
            orch.snapshotter().reset()?;
            print_workspace(&orch)?;
        }
        Commands::FullReset => {
            let orch = TrialOrchestrator::new(config)?;
            orch.snapshotter().full_reset()?;
            print_workspace(&orch)?;
        }
    }
    Ok(())
}

fn print_run(run: &Run) {
    println!("task_id: {}", run.task_id);
    println!("status: {}", run.status);
    match run.duration_ms {
        Some(ms) => println!("duration: {:.1}s", ms as f64 / 1000.0),
        None => println!("duration: n/a"),
    }
    if let Some(err) = &run.error {
        println!("error: {}", err);
    }
}

fn print_status(summary: &BenchSummary) {
    println!("total_runs: {}", summary.total_runs);
    println!("success_rate: {:.1}%", summary.success_rate);
    println!("avg_duration: {:.1}s", summary.avg_duration_ms / 1000.0);
}

fn print_workspace(orch: &TrialOrchestrator) -> Result<()> {
    let state = orch.snapshotter().state()?;
    println!("branch: {}", state.current_branch);
    println!("last_commit: {}", state.last_commit);
    println!("clean: {}", state.is_clean);
    Ok(())
}
