//! Inbound render request.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::resolution::Resolution;

/// Errors produced while validating a render request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Request validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// One audio track in the mix.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackSpec {
    /// Source locator: an http(s) URL or an object-store key.
    #[validate(length(min = 1, message = "track source must not be empty"))]
    pub source: String,

    /// Per-track volume multiplier.
    #[validate(range(min = 0.0, max = 2.0))]
    #[serde(default = "default_volume")]
    pub volume: f64,

    /// Trim start offset in seconds.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub trim_start: f64,

    /// Trim end offset in seconds (0 = no trim).
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub trim_end: f64,

    /// Track duration in seconds, as probed by the uploader.
    #[validate(range(min = 0.1))]
    pub duration_secs: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl TrackSpec {
    /// Effective playback duration after trims.
    pub fn effective_duration(&self) -> f64 {
        let end = if self.trim_end > 0.0 {
            self.trim_end.min(self.duration_secs)
        } else {
            self.duration_secs
        };
        (end - self.trim_start).max(0.0)
    }
}

/// A validated render request: ordered tracks mixed over one cover image.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Resolution label, must exist in the fixed lookup table.
    #[validate(custom(function = "validate_resolution"))]
    pub resolution: String,

    /// How many times the full track list plays.
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,

    /// Master volume applied after the per-track mix.
    #[validate(range(min = 0.0, max = 2.0))]
    #[serde(default = "default_volume")]
    pub master_volume: f64,

    /// Display title, used for the artifact's download filename.
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Ordered track list.
    #[validate(length(min = 1, message = "at least one track is required"))]
    #[validate(nested)]
    pub tracks: Vec<TrackSpec>,

    /// Cover image locator: an http(s) URL or an object-store key.
    #[validate(length(min = 1, message = "cover image must not be empty"))]
    pub cover_image: String,
}

fn default_loop_count() -> u32 {
    1
}

fn validate_resolution(label: &str) -> Result<(), ValidationError> {
    if Resolution::lookup(label).is_none() {
        return Err(ValidationError::new("unknown_resolution"));
    }
    Ok(())
}

impl RenderRequest {
    /// Parse and validate a serialized request payload.
    pub fn from_json(payload: &str) -> Result<Self, RequestError> {
        let request: RenderRequest = serde_json::from_str(payload)?;
        request.validate()?;
        Ok(request)
    }

    /// The resolved resolution profile. Only valid after validation.
    pub fn resolution_profile(&self) -> Option<Resolution> {
        Resolution::lookup(&self.resolution)
    }

    /// Total output duration in seconds (all tracks, all loops).
    pub fn total_duration_secs(&self) -> f64 {
        let once: f64 = self.tracks.iter().map(|t| t.effective_duration()).sum();
        once * self.loop_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> RenderRequest {
        RenderRequest {
            resolution: "1080p".to_string(),
            loop_count: 2,
            master_volume: 1.0,
            title: "Late Night Mix".to_string(),
            tracks: vec![
                TrackSpec {
                    source: "https://example.com/a.mp3".to_string(),
                    volume: 1.0,
                    trim_start: 0.0,
                    trim_end: 0.0,
                    duration_secs: 180.0,
                },
                TrackSpec {
                    source: "uploads/user-1/b.mp3".to_string(),
                    volume: 0.8,
                    trim_start: 5.0,
                    trim_end: 125.0,
                    duration_secs: 200.0,
                },
            ],
            cover_image: "uploads/user-1/cover.jpg".to_string(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_unknown_resolution_rejected() {
        let mut req = valid_request();
        req.resolution = "9000p".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_empty_tracks_rejected() {
        let mut req = valid_request();
        req.tracks.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_effective_duration_with_trims() {
        let track = TrackSpec {
            source: "x".to_string(),
            volume: 1.0,
            trim_start: 5.0,
            trim_end: 125.0,
            duration_secs: 200.0,
        };
        assert!((track.effective_duration() - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_total_duration_covers_loops() {
        let req = valid_request();
        // 180 + 120 seconds, looped twice
        assert!((req.total_duration_secs() - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let payload = r#"{
            "resolution": "720p",
            "title": "Mix",
            "tracks": [{"source": "a.mp3", "durationSecs": 60.0}],
            "coverImage": "cover.jpg"
        }"#;
        let req = RenderRequest::from_json(payload).unwrap();
        assert_eq!(req.loop_count, 1);
        assert!((req.master_volume - 1.0).abs() < f64::EPSILON);
        assert!((req.tracks[0].volume - 1.0).abs() < f64::EPSILON);
    }
}
