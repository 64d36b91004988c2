//! Shared data models for the mixtape render backend.
//!
//! Pure domain types: no I/O, no clients. Every other crate in the
//! workspace depends on this one.

pub mod job;
pub mod preset;
pub mod request;
pub mod resolution;

pub use job::{ClaimOutcome, CompletionFields, JobId, JobStatus, RenderJob};
pub use preset::PresetRecord;
pub use request::{RenderRequest, RequestError, TrackSpec};
pub use resolution::Resolution;
