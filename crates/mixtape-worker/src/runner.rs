//! Top-level job run.
//!
//! Orchestrates one invocation end to end: validate, idempotency probe,
//! cancellation monitor, claim, pipeline, finalize, cleanup. Every exit
//! path resolves to a `JobOutcome`; only the failed outcome writes an
//! error to the record.

use std::sync::Arc;

use mixtape_models::{ClaimOutcome, RenderRequest};
use mixtape_storage::keys;

use crate::config::JobEnv;
use crate::context::ServiceContext;
use crate::error::WorkerError;
use crate::finalizer::Finalizer;
use crate::guard;
use crate::logging::JobLogger;
use crate::monitor::{CancelSignal, CancellationMonitor};
use crate::outcome::JobOutcome;
use crate::pipeline::{Phase, PipelineOutput, RenderPipeline};
use crate::progress::ProgressReporter;
use crate::workspace::ScratchDir;

/// Run one render job to its terminal outcome.
pub async fn run_job(ctx: &ServiceContext, env: &JobEnv) -> JobOutcome {
    let logger = JobLogger::new(&env.job_id, "render");
    logger.log_start(&format!(
        "owner={} scope={} target={}",
        env.owner_id, env.scope_id, env.target_id
    ));

    // Validation. An invalid request fails before any state transition:
    // the record is left untouched and the process exits non-zero.
    let request = match RenderRequest::from_json(&env.request_json) {
        Ok(request) => request,
        Err(e) => {
            let error = WorkerError::from(e);
            logger.log_error(&error.to_string());
            return JobOutcome::Failed(error);
        }
    };

    let artifact_key = keys::artifact_key(&env.owner_id, &env.target_id, &env.job_id);
    let finalizer = Finalizer::new(ctx, env);

    // Idempotency guard: a re-delivered job whose artifact already exists
    // finalizes and leaves without rendering.
    match guard::existing_artifact(&ctx.artifacts, &artifact_key).await {
        Ok(Some(size)) => {
            logger.log_progress("Artifact already exists, skipping render");
            return match finalizer.finalize(&request, &artifact_key, size, None).await {
                Ok(_) => {
                    logger.log_completion("Finalized existing artifact");
                    JobOutcome::Completed
                }
                Err(e) => fail(ctx, env, &logger, e).await,
            };
        }
        Ok(None) => {}
        Err(e) => {
            // A failed probe is not worth failing the job over; render
            // fresh and overwrite.
            logger.log_warning(&format!("Artifact probe failed: {}", e));
        }
    }

    // Cancellation monitor: pre-flight read plus live subscription feeding
    // the shared signal.
    let cancel = CancelSignal::new();
    let monitor = match CancellationMonitor::start(
        &ctx.jobs,
        &env.owner_id,
        &env.job_id,
        ctx.config.status_poll_interval,
        cancel.clone(),
    )
    .await
    {
        Ok(monitor) => monitor,
        Err(e) => return fail(ctx, env, &logger, e).await,
    };

    if cancel.is_cancelled() {
        monitor.stop();
        logger.log_completion("Cancelled before claim");
        return JobOutcome::Cancelled;
    }

    // Transactional claim. A cancellation that races the claim loses
    // nothing: the claim refuses and we exit clean.
    match ctx.jobs.claim(&env.owner_id, &env.job_id).await {
        Ok(ClaimOutcome::Claimed) => {}
        Ok(ClaimOutcome::AlreadyCancelled) => {
            monitor.stop();
            logger.log_completion("Cancelled at claim");
            return JobOutcome::Cancelled;
        }
        Ok(ClaimOutcome::AlreadyComplete) => {
            monitor.stop();
            logger.log_completion("Already complete at claim");
            return JobOutcome::Completed;
        }
        Err(e) => {
            monitor.stop();
            return fail(ctx, env, &logger, e).await;
        }
    }

    // Scratch space, throttled progress, pipeline.
    let scratch = match ScratchDir::create(&ctx.config.work_dir, &env.job_id).await {
        Ok(scratch) => scratch,
        Err(e) => {
            monitor.stop();
            return fail(ctx, env, &logger, e).await;
        }
    };

    let (sink, reporter) = ProgressReporter::start(
        Arc::clone(&ctx.jobs),
        env.owner_id.clone(),
        env.job_id.clone(),
        ctx.config.progress_interval,
    );

    let pipeline = RenderPipeline::new(ctx, env, &request, cancel.clone(), sink.clone());
    let result = pipeline.run(&scratch, &artifact_key).await;

    drop(sink);
    drop(pipeline);
    reporter.finish().await;

    // The monitor stays live through finalization: the Upload -> Finalize
    // boundary and the pre-preset check both consult the signal.
    let outcome = match result {
        Ok(PipelineOutput::Rendered { file_size_bytes }) => {
            if cancel.is_cancelled() {
                // Cancellation landed during the upload. The artifact stays
                // in place, but the record is never moved toward complete.
                logger.log_completion("Cancelled after upload");
                JobOutcome::Cancelled
            } else {
                if let Err(e) = ctx
                    .jobs
                    .update_stage(&env.owner_id, &env.job_id, Phase::Finalize.label())
                    .await
                {
                    logger.log_warning(&format!("Stage write failed: {}", e));
                }
                match finalizer
                    .finalize(&request, &artifact_key, file_size_bytes, Some(&cancel))
                    .await
                {
                    Ok(_) => {
                        logger.log_completion("Render complete");
                        JobOutcome::Completed
                    }
                    Err(e) => fail(ctx, env, &logger, e).await,
                }
            }
        }
        Ok(PipelineOutput::Cancelled) => {
            logger.log_completion("Cancelled during render");
            JobOutcome::Cancelled
        }
        Err(e) if e.is_cancellation() => {
            logger.log_completion("Cancelled during render");
            JobOutcome::Cancelled
        }
        Err(e) => fail(ctx, env, &logger, e).await,
    };

    monitor.stop();
    scratch.close().await;
    outcome
}

/// Write the failure to the record and wrap the error in the outcome.
///
/// The failure write itself is allowed to fail; the outcome still carries
/// the original error.
async fn fail(
    ctx: &ServiceContext,
    env: &JobEnv,
    logger: &JobLogger,
    error: WorkerError,
) -> JobOutcome {
    logger.log_error(&error.to_string());

    if let Err(write_err) = ctx
        .jobs
        .mark_failed(&env.owner_id, &env.job_id, &error.to_string())
        .await
    {
        logger.log_error(&format!("Failure write also failed: {}", write_err));
    }

    JobOutcome::Failed(error)
}
