//! Values exchanged with the device/vision capability.
//!
//! The domain never interprets pixels; these types only carry what a task
//! needs to decide where to tap and what it saw.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// One captured screen image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic capture counter, useful to correlate log lines.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub captured_at: Timestamp,
    /// Encoded image bytes; opaque to the scheduler.
    pub data: Arc<[u8]>,
}

impl Frame {
    #[must_use]
    pub fn new(sequence: u64, width: u32, height: u32, captured_at: Timestamp) -> Self {
        Self {
            sequence,
            width,
            height,
            captured_at,
            data: Arc::from(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<Arc<[u8]>>) -> Self {
        self.data = data.into();
        self
    }
}

/// Name of a reference image (e.g. `buttons/help_all`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, rounded down.
    #[must_use]
    pub fn center(&self) -> (u32, u32) {
        (
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x.saturating_add(self.width)
            && y < self.y.saturating_add(self.height)
    }
}

/// A match found on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub region: Region,
    /// Match score in `[0, 1]`; colour matches report `1.0`.
    pub confidence: f32,
}

impl Location {
    #[must_use]
    pub fn new(region: Region, confidence: f32) -> Self {
        Self { region, confidence }
    }

    #[must_use]
    pub fn center(&self) -> (u32, u32) {
        self.region.center()
    }
}

/// HSV colour, hue in `0..=179` and saturation/value in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    #[must_use]
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }

    /// Whether each channel lies within `[lower, upper]`.
    #[must_use]
    pub fn within(&self, lower: Hsv, upper: Hsv) -> bool {
        (lower.h..=upper.h).contains(&self.h)
            && (lower.s..=upper.s).contains(&self.s)
            && (lower.v..=upper.v).contains(&self.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_compute_region_center() {
        assert_eq!(Region::new(10, 20, 100, 40).center(), (60, 40));
    }

    #[test]
    fn should_contain_points_inside_region_only() {
        let r = Region::new(0, 0, 10, 10);
        assert!(r.contains(0, 0));
        assert!(r.contains(9, 9));
        assert!(!r.contains(10, 5));
    }

    #[test]
    fn should_match_colour_within_bounds() {
        let red = Hsv::new(2, 200, 220);
        assert!(red.within(Hsv::new(0, 150, 150), Hsv::new(10, 255, 255)));
        assert!(!red.within(Hsv::new(20, 150, 150), Hsv::new(30, 255, 255)));
    }

    #[test]
    fn should_serialize_template_id_as_plain_string() {
        let json = serde_json::to_string(&TemplateId::from("buttons/help")).unwrap();
        assert_eq!(json, "\"buttons/help\"");
    }
}
