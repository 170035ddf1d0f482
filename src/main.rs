use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stepwright::{runbook, Config, Orchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let Some(path) = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RUNBOOK").ok())
        .map(PathBuf::from)
    else {
        eprintln!("usage: stepwright <runbook.yaml> (or set RUNBOOK)");
        return ExitCode::from(2);
    };

    let loaded = runbook::load(&path).and_then(|rb| {
        let steps = rb.build_steps(&config)?;
        Ok((rb, steps))
    });
    let (runbook, steps) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        "Running '{}' ({} step(s)) from {}",
        runbook.metadata.name,
        steps.len(),
        path.display()
    );

    match Orchestrator::new(config, runbook.session).steps(steps).run().await {
        Ok(report) => {
            if let Some(failure) = &report.failure {
                tracing::warn!("Run {} stopped at {}: {}", report.run_id, failure.step, failure.error);
            }
            tracing::info!("Log written to {}", report.run_dir.join("actions.log").display());
        }
        Err(e) => {
            tracing::error!("Run could not start: {}", e);
            return ExitCode::FAILURE;
        }
    }

    // A finished or aborted run is not a process failure; the action log is the record
    ExitCode::SUCCESS
}
