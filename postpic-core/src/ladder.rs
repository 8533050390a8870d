//! Resolution ladder planning.
//!
//! Given the probed size of a source video and a quality table ordered from
//! best to worst, [`plan_ladder`] picks the tiers that can be produced
//! without upscaling and computes an aspect-preserving output size for each.

use serde::{Deserialize, Serialize};

/// A named resolution ceiling such as `720p` → 1280×720.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub label: String,
    pub max_width: u32,
    pub max_height: u32,
}

impl Tier {
    pub fn new(label: impl Into<String>, max_width: u32, max_height: u32) -> Self {
        Self {
            label: label.into(),
            max_width,
            max_height,
        }
    }
}

const STANDARD_TIERS: [(&str, u32, u32); 9] = [
    ("4320p", 7680, 4320),
    ("2160p", 3840, 2160),
    ("1440p", 2560, 1440),
    ("1080p", 1920, 1080),
    ("720p", 1280, 720),
    ("480p", 854, 480),
    ("360p", 640, 360),
    ("240p", 426, 240),
    ("144p", 256, 144),
];

/// The standard nine-tier table, best quality first.
pub fn default_tiers() -> Vec<Tier> {
    STANDARD_TIERS
        .iter()
        .map(|(label, width, height)| Tier::new(*label, *width, *height))
        .collect()
}

/// A tier accepted for a particular source, with its fitted output size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTier {
    pub tier: Tier,
    /// Position of the tier in the table; 0 is the best quality.
    pub rank: usize,
    pub fitted_width: u32,
    pub fitted_height: u32,
}

impl PlannedTier {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.fitted_width,
            height: self.fitted_height,
        }
    }
}

/// Output frame size handed to the transcoder, rendered as `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Plans the ladder for a `source_width`×`source_height` video.
///
/// A tier is kept when the scale factor that fits the source inside the
/// tier's box is at most 1. The result keeps the order of `tiers` and every
/// entry is no larger than the source in either dimension.
pub fn plan_ladder(source_width: u32, source_height: u32, tiers: &[Tier]) -> Vec<PlannedTier> {
    if source_width == 0 || source_height == 0 {
        return Vec::new();
    }
    let src_w = f64::from(source_width);
    let src_h = f64::from(source_height);

    tiers
        .iter()
        .enumerate()
        .filter_map(|(rank, tier)| {
            let ratio =
                (f64::from(tier.max_width) / src_w).min(f64::from(tier.max_height) / src_h);
            if ratio > 1.0 {
                return None;
            }
            let fitted_width = (src_w * ratio).round() as u32;
            let fitted_height = (src_h * ratio).round() as u32;
            if fitted_width > source_width || fitted_height > source_height {
                return None;
            }
            if fitted_width == 0 || fitted_height == 0 {
                return None;
            }
            Some(PlannedTier {
                tier: tier.clone(),
                rank,
                fitted_width,
                fitted_height,
            })
        })
        .collect()
}
