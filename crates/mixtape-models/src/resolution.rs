//! Fixed resolution lookup table.

use serde::{Deserialize, Serialize};

/// Output resolution profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    /// Target video bitrate in kbit/s.
    pub bitrate_kbps: u32,
}

const TABLE: &[(&str, Resolution)] = &[
    (
        "480p",
        Resolution {
            width: 854,
            height: 480,
            bitrate_kbps: 1200,
        },
    ),
    (
        "720p",
        Resolution {
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
        },
    ),
    (
        "1080p",
        Resolution {
            width: 1920,
            height: 1080,
            bitrate_kbps: 5000,
        },
    ),
    (
        "1440p",
        Resolution {
            width: 2560,
            height: 1440,
            bitrate_kbps: 10000,
        },
    ),
    (
        "2160p",
        Resolution {
            width: 3840,
            height: 2160,
            bitrate_kbps: 20000,
        },
    ),
];

impl Resolution {
    /// Look up a resolution by label. Unknown labels return `None`.
    pub fn lookup(label: &str) -> Option<Resolution> {
        TABLE
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, res)| *res)
    }

    /// All supported labels, for error messages.
    pub fn labels() -> Vec<&'static str> {
        TABLE.iter().map(|(name, _)| *name).collect()
    }

    /// FFmpeg-style bitrate string, e.g. "5000k".
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_labels() {
        let res = Resolution::lookup("1080p").unwrap();
        assert_eq!(res.width, 1920);
        assert_eq!(res.height, 1080);
        assert_eq!(res.bitrate_arg(), "5000k");
    }

    #[test]
    fn test_lookup_unknown_label() {
        assert!(Resolution::lookup("999p").is_none());
        assert!(Resolution::lookup("").is_none());
    }

    #[test]
    fn test_labels_listed() {
        assert!(Resolution::labels().contains(&"720p"));
    }
}
