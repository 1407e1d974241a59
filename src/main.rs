use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use pipetrack::client::ApiClient;
use pipetrack::config::{Config, LoggingConfig};
use pipetrack::tracker::{ExecutionTracker, StatusPoller, TrackOutcome, TrackerError};

#[derive(Parser)]
#[command(
    name = "pipetrack",
    about = "Trigger CI pipelines and track their test results",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $PIPETRACK_CONFIG, then ./pipetrack.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a pipeline run and start tracking it
    Trigger {
        /// Project name
        project: String,

        /// Pipeline (definition) id
        pipeline_id: i64,

        /// Display name for the pipeline
        #[arg(long)]
        name: Option<String>,

        /// Ask the provider to run at this time (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Keep polling until the run finishes
        #[arg(long)]
        watch: bool,
    },

    /// Refresh the status of the tracked run
    Status {
        /// Keep polling until the run finishes
        #[arg(long)]
        watch: bool,
    },

    /// Fetch test results for the tracked run
    Results {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the tracked run and its last results without contacting the backend
    Show {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Download the report artifact of the tracked run
    Download {
        /// Output file path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show pass-rate history of completed runs
    History {
        /// Number of entries
        #[arg(long, default_value = "20")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List projects known to the backend
    Projects {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List the pipelines of a project, with the ids `trigger` takes
    Pipelines {
        /// Project name
        project: String,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Forget the tracked run and its results
    Clear,

    /// Start the local status API
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let tracker = pipetrack::build_tracker(&config)?;

    match cli.command {
        Commands::Trigger {
            project,
            pipeline_id,
            name,
            at,
            watch,
        } => {
            println!("Triggering pipeline...");
            let outcome = tracker
                .trigger(&project, pipeline_id, name.as_deref(), at)
                .await
                .map_err(|e| report(e, "Failed to trigger pipeline"))?;
            print_outcome(&outcome);
            if watch && !outcome.phase.is_terminal() {
                watch_until_done(&tracker, &config).await;
            }
        }
        Commands::Status { watch } => {
            let outcome = tracker
                .refresh_status()
                .await
                .map_err(|e| report(e, "Failed to refresh status"))?;
            print_outcome(&outcome);
            if watch && !outcome.phase.is_terminal() {
                watch_until_done(&tracker, &config).await;
            }
        }
        Commands::Results { json } => {
            let outcome = tracker
                .load_results()
                .await
                .map_err(|e| report(e, "Error loading test results"))?;
            match (&outcome, json) {
                (pipetrack::tracker::ResultsOutcome::Loaded(summary), true) => {
                    println!("{}", serde_json::to_string_pretty(summary.as_ref())?);
                }
                _ => println!("{}", outcome.message()),
            }
        }
        Commands::Show { json } => show(&tracker, json)?,
        Commands::Download { output } => {
            let execution = tracker.current();
            println!("Retrieving report download URL...");
            let artifact = tracker
                .download_report()
                .await
                .map_err(|e| report(e, "Failed to download report"))?;
            let path = output.unwrap_or_else(|| match &execution {
                Some(e) => PathBuf::from(format!("{}-run-{}.zip", e.project_name, e.run_id)),
                None => PathBuf::from("report.zip"),
            });
            tokio::fs::write(&path, &artifact.bytes).await?;
            println!(
                "Report downloaded successfully: {} ({} bytes)",
                path.display(),
                artifact.len()
            );
        }
        Commands::History { limit, json } => {
            let entries = tracker.history().list(limit)?;
            let trends = tracker.history().trends()?;
            if json {
                let body = serde_json::json!({ "entries": entries, "trends": trends });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else if entries.is_empty() {
                println!("No test history yet.");
            } else {
                println!("{:<25} | {:<20} | {:>9} | {:>6} | Build", "Recorded", "Project", "Pass rate", "Tests");
                println!("{:-<25}-|-{:-<20}-|-{:->9}-|-{:->6}-|-{:-<8}", "", "", "", "", "");
                for e in &entries {
                    println!(
                        "{:<25} | {:<20} | {:>8.1}% | {:>6} | {}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        e.project_name,
                        e.pass_rate,
                        e.total_tests,
                        e.build_number
                    );
                }
                println!(
                    "\nTrend: pass rate {:+.1}%, total tests {:+.1}%",
                    trends.pass_rate_trend, trends.total_tests_trend
                );
            }
        }
        Commands::Projects { json } => {
            let projects = ApiClient::new(&config.api)?
                .projects()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to list projects: {}", e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects found.");
            } else {
                for p in &projects {
                    println!("{}", p.name);
                }
            }
        }
        Commands::Pipelines { project, json } => {
            let pipelines = ApiClient::new(&config.api)?
                .pipelines(&project)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to list pipelines: {}", e))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pipelines)?);
            } else if pipelines.is_empty() {
                println!("No pipelines found in {}.", project);
            } else {
                println!("{:>8} | Name", "Id");
                println!("{:->8}-|-{:-<30}", "", "");
                for p in &pipelines {
                    println!("{:>8} | {}", p.id, p.name);
                }
            }
        }
        Commands::Clear => {
            tracker.clear()?;
            println!("Pipeline execution cleared.");
        }
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting pipetrack API");
            pipetrack::serve(tracker, &bind).await?;
        }
    }

    Ok(())
}

fn print_outcome(outcome: &TrackOutcome) {
    let exec = &outcome.execution;
    println!(
        "[{}] {} / {} (run {})",
        outcome.phase,
        exec.project_name,
        exec.display_name(),
        exec.run_id
    );
    println!("{}", outcome.message);
    if let Some(url) = &outcome.pipeline_url {
        println!("View in Azure DevOps: {}", url);
    }
}

fn show(tracker: &ExecutionTracker, json: bool) -> Result<()> {
    let execution = tracker.current();
    let latest = tracker.results().latest();

    if json {
        let body = serde_json::json!({
            "execution": execution,
            "phase": tracker.phase(),
            "results": latest.as_deref(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match &execution {
        Some(e) => {
            println!("Project:  {}", e.project_name);
            println!("Pipeline: {} ({})", e.display_name(), e.pipeline_id);
            println!("Run:      {}", e.run_id);
            println!(
                "Status:   {}{}",
                if e.status.is_running { "running" } else { "stopped" },
                e.status
                    .current_stage
                    .as_deref()
                    .map(|s| format!(" - {}", s))
                    .unwrap_or_default()
            );
            if let Some(p) = e.status.progress {
                println!("Progress: {}%", p);
            }
        }
        None => println!("No pipeline execution tracked."),
    }

    if let Some(summary) = latest {
        println!("\nLast results (run {}): {}", summary.run_id(), summary.headline());
        println!("{:<30} | {:>6} | {:>6} | {:>7}", "Feature", "Passed", "Failed", "Skipped");
        println!("{:-<30}-|-{:->6}-|-{:->6}-|-{:->7}", "", "", "", "");
        for f in summary.features() {
            println!(
                "{:<30} | {:>6} | {:>6} | {:>7}",
                f.feature_name, f.passed_steps, f.failed_steps, f.skipped_steps
            );
        }
    }
    Ok(())
}

async fn watch_until_done(tracker: &ExecutionTracker, config: &Config) {
    let handle = StatusPoller::spawn(
        tracker.clone(),
        config.polling.interval(),
        config.polling.stuck_timeout(),
        print_outcome,
    );

    let cancel = handle.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let exit = handle.join().await;
    tracing::debug!(?exit, "Stopped watching");
}

/// Turn a tracker error into the message shown to the user.
fn report(err: TrackerError, context: &str) -> anyhow::Error {
    match err.login_url() {
        Some(url) => anyhow::anyhow!(
            "Authentication required. Please login to Azure DevOps at {} first, then try again.",
            url
        ),
        None => anyhow::anyhow!("{}: {}", context, err),
    }
}
