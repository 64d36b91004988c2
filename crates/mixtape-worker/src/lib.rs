//! Single-invocation mixtape render worker.
//!
//! One process renders one job: env-provided parameters, an idempotency
//! probe against the artifact store, a cooperative cancellation monitor,
//! a transactional claim on the job record, the download/encode/upload
//! pipeline, throttled progress, and finalization. Cancellation and
//! success both exit 0; only real failures exit non-zero.

pub mod config;
pub mod context;
pub mod error;
pub mod finalizer;
pub mod guard;
pub mod logging;
pub mod monitor;
pub mod outcome;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod services;
pub mod workspace;

pub use config::{JobEnv, WorkerConfig};
pub use context::ServiceContext;
pub use error::{WorkerError, WorkerResult};
pub use monitor::CancelSignal;
pub use outcome::JobOutcome;
pub use runner::run_job;
