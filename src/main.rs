//! Canalizar CLI
//!
//! Drives a demo workflow end to end against the in-process mock backend.
//!
//! # Usage
//!
//! ```bash
//! # Full demo run with realistic timings
//! canalizar demo
//!
//! # Fast run: two candidate models, two improvement iterations
//! canalizar demo --fast --models 2 --iterations 2
//!
//! # Inspect the static catalogs
//! canalizar catalog
//! canalizar techniques
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use canalizar::api::DatasetUpload;
use canalizar::config::{SessionConfig, TimingConfig};
use canalizar::decision::UserAction;
use canalizar::pipeline::MILESTONE_CATALOG;
use canalizar::session::{DecisionOutcome, WorkflowSession};

#[derive(Parser)]
#[command(name = "canalizar", version, about = "ML workflow pipeline demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow end to end: upload, train, improve, deploy.
    Demo(DemoArgs),
    /// Print the milestone catalog.
    Catalog,
    /// Print the optimization technique catalog.
    Techniques,
}

#[derive(clap::Args)]
struct DemoArgs {
    /// Number of candidate models to train concurrently.
    #[arg(long, default_value_t = 2)]
    models: usize,
    /// Improvement iterations to run before deploying.
    #[arg(long, default_value_t = 1)]
    iterations: u32,
    /// Collapse all simulated delays to zero.
    #[arg(long)]
    fast: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Demo(args) => run_demo(args).await,
        Command::Catalog => {
            print_catalog();
            Ok(())
        }
        Command::Techniques => {
            print_techniques();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_demo(args: DemoArgs) -> canalizar::Result<()> {
    let timing = if args.fast {
        TimingConfig::instant()
    } else {
        TimingConfig::default()
    };
    let config = SessionConfig::default().with_timing(timing);
    let max_iterations = config.max_improvement_iterations;
    let mut session = WorkflowSession::new(config);

    let mut events = session.pipeline().subscribe();
    let upload = session
        .upload(DatasetUpload::new("demo_dataset.csv", 512 * 1024))
        .await?;
    println!(
        "uploaded dataset {} ({} rows, {} columns)",
        upload.dataset_id, upload.profile.row_count, upload.profile.column_count
    );

    let suggestions = session.suggest_models().await?;
    println!("recommended model: {}", suggestions.recommended_model_id);

    let selections: Vec<(String, String)> = suggestions
        .models
        .iter()
        .take(args.models.max(1))
        .map(|m| (m.id.clone(), m.name.clone()))
        .collect();
    println!("training {} candidate model(s)...", selections.len());
    let states = session.train_models(&selections).await?;
    for state in &states {
        let accuracy = state
            .metrics
            .as_ref()
            .map(|m| format!("{:.1}%", m.accuracy * 100.0))
            .unwrap_or_else(|| "n/a".into());
        println!("  {} [{}] accuracy {accuracy}", state.model_name, state.status);
    }

    let best = states
        .iter()
        .max_by(|a, b| {
            let left = a.metrics.as_ref().map(|m| m.accuracy).unwrap_or(0.0);
            let right = b.metrics.as_ref().map(|m| m.accuracy).unwrap_or(0.0);
            left.total_cmp(&right)
        })
        .expect("at least one model trained");
    session.select_model(&best.model_id)?;
    println!("selected {} for review", best.model_name);

    for round in 1..=args.iterations.min(max_iterations) {
        println!("improvement iteration {round}...");
        match session.decide(UserAction::SendToImprovement).await? {
            DecisionOutcome::Improved(iteration) => {
                for delta in &iteration.improvements {
                    println!(
                        "  {:<10} {:.4} -> {:.4} ({:+.2}%)",
                        delta.metric, delta.before, delta.after, delta.change
                    );
                }
            }
            _ => unreachable!("send_to_improvement yields an improvement"),
        }
    }

    match session.decide(UserAction::ProceedToDeployment).await? {
        DecisionOutcome::Deployed(outcome) => println!("deployed: {}", outcome.endpoint),
        _ => unreachable!("proceed_to_deployment yields a deployment"),
    }

    // Drain the event log for the final report.
    let mut completed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, canalizar::PipelineEvent::MilestoneCompleted { .. }) {
            completed += 1;
        }
    }
    println!("pipeline events: {completed} milestone completions observed");
    Ok(())
}

fn print_catalog() {
    for (index, spec) in MILESTONE_CATALOG.iter().enumerate() {
        println!("{:>2}. {:<26} {}", index + 1, spec.id, spec.description);
    }
}

fn print_techniques() {
    for spec in canalizar::improve::TECHNIQUE_CATALOG {
        println!("{:<26} {}", spec.name, spec.description);
    }
}
