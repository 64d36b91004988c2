//! Render worker binary.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mixtape_worker::{run_job, JobEnv, JobOutcome, ServiceContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("mixtape=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    if std::env::args().any(|a| a == "--selfcheck") {
        std::process::exit(selfcheck());
    }

    info!("Starting render worker");

    let config = WorkerConfig::from_env();

    let env = match JobEnv::from_env() {
        Ok(env) => env,
        Err(e) => {
            error!("Invalid job environment: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match ServiceContext::from_env(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to build services: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run_job(&ctx, &env).await;

    match &outcome {
        JobOutcome::Completed => info!(job_id = %env.job_id, "Render completed"),
        JobOutcome::Cancelled => info!(job_id = %env.job_id, "Render cancelled cleanly"),
        JobOutcome::Failed(e) => error!(job_id = %env.job_id, "Render failed: {}", e),
    }

    std::process::exit(outcome.exit_code());
}

/// Verifies the ffmpeg binary is reachable and the config parses.
fn selfcheck() -> i32 {
    let config = WorkerConfig::from_env();
    info!(work_dir = %config.work_dir.display(), "Config parsed");

    match mixtape_media::check_ffmpeg() {
        Ok(path) => {
            info!(path = %path.display(), "ffmpeg found");
            0
        }
        Err(e) => {
            error!("ffmpeg not available: {}", e);
            1
        }
    }
}
