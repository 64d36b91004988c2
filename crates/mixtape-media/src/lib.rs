//! FFmpeg CLI wrapper for mixtape video rendering.
//!
//! The encoder turns an ordered audio track list plus one cover image into
//! a single H.264 MP4. Cancellation is cooperative: the runner observes a
//! watch-channel flag and asks the FFmpeg subprocess to stop.

pub mod command;
pub mod download;
pub mod encoder;
pub mod error;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use download::fetch_url;
pub use encoder::{EncodeSpec, EncodeTrack, MixtapeEncoder};
pub use error::{MediaError, MediaResult};
pub use progress::{DiagnosticFn, EncodeProgress, PercentFn};
