//! FFmpeg progress parsing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Progress information parsed from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g. 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl EncodeProgress {
    /// Progress percentage given the total output duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Callback invoked with the encode percentage (0-100).
pub type PercentFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Callback invoked with non-progress FFmpeg stderr lines.
pub type DiagnosticFn = Arc<dyn Fn(String) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = EncodeProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_percentage_is_capped() {
        let progress = EncodeProgress {
            out_time_ms: 20000,
            ..Default::default()
        };
        assert!((progress.percentage(10000) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_duration_is_zero() {
        let progress = EncodeProgress::default();
        assert_eq!(progress.percentage(0), 0.0);
    }
}
