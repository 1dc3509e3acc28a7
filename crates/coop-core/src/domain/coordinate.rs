//! Cursor coordinates and cross-device normalisation.
//!
//! When the pointer crosses from one device to another, its position is sent
//! as a *normalised* coordinate: a percentage (0–100) of the sender's display
//! width and height.  The receiver converts it back to pixels against its own
//! display, so devices with different resolutions line up.
//!
//! The horizontal axis is mirrored on the way back to pixels: a pointer
//! leaving the right edge of one display (x = 100%) appears at the left edge
//! of the next (x = 0 px).

use serde::{Deserialize, Serialize};

/// Full scale of a normalised coordinate.
pub const PERCENT: i32 = 100;

/// A position in display pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A position expressed as a percentage of display width and height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCoordinate {
    pub x: i32,
    pub y: i32,
}

impl NormalizedCoordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of the active display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub width: i32,
    pub height: i32,
}

impl DisplayInfo {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Converts a normalised coordinate into display pixels.
    ///
    /// Both axes are clamped to `[0, 100]` before scaling.  The x axis is
    /// mirrored (`100 - x`) so the pointer enters from the opposite edge.
    pub fn denormalize(&self, pos: NormalizedCoordinate) -> Coordinate {
        let x_ratio = f64::from(PERCENT - pos.x.clamp(0, PERCENT)) / f64::from(PERCENT);
        let y_ratio = f64::from(pos.y.clamp(0, PERCENT)) / f64::from(PERCENT);
        Coordinate {
            x: (x_ratio * f64::from(self.width)) as i32,
            y: (y_ratio * f64::from(self.height)) as i32,
        }
    }

    /// Converts a pixel position into a normalised coordinate.
    ///
    /// Returns the origin when the display has no area.
    pub fn normalize(&self, pos: Coordinate) -> NormalizedCoordinate {
        if self.width <= 0 || self.height <= 0 {
            return NormalizedCoordinate::default();
        }
        let scale = |value: i32, extent: i32| -> i32 {
            ((i64::from(value) + 1) * i64::from(PERCENT) / i64::from(extent)) as i32
        };
        NormalizedCoordinate {
            x: scale(pos.x, self.width),
            y: scale(pos.y, self.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denormalize_center_maps_to_display_center() {
        // Arrange
        let display = DisplayInfo::new(1920, 1080);

        // Act
        let px = display.denormalize(NormalizedCoordinate::new(50, 50));

        // Assert
        assert_eq!(px, Coordinate::new(960, 540));
    }

    #[test]
    fn test_denormalize_mirrors_horizontal_axis() {
        let display = DisplayInfo::new(1000, 500);
        assert_eq!(display.denormalize(NormalizedCoordinate::new(100, 0)), Coordinate::new(0, 0));
        assert_eq!(display.denormalize(NormalizedCoordinate::new(0, 100)), Coordinate::new(1000, 500));
    }

    #[test]
    fn test_denormalize_clamps_out_of_range_percentages() {
        // Arrange
        let display = DisplayInfo::new(800, 600);

        // Act
        let below = display.denormalize(NormalizedCoordinate::new(-40, -1));
        let above = display.denormalize(NormalizedCoordinate::new(250, 101));

        // Assert
        assert_eq!(below, Coordinate::new(800, 0));
        assert_eq!(above, Coordinate::new(0, 600));
    }

    #[test]
    fn test_normalize_uses_one_based_pixel_position() {
        let display = DisplayInfo::new(1920, 1080);
        assert_eq!(display.normalize(Coordinate::new(1919, 1079)), NormalizedCoordinate::new(100, 100));
        assert_eq!(display.normalize(Coordinate::new(959, 539)), NormalizedCoordinate::new(50, 50));
    }

    #[test]
    fn test_normalize_on_empty_display_returns_origin() {
        let display = DisplayInfo::new(0, 1080);
        assert_eq!(display.normalize(Coordinate::new(10, 10)), NormalizedCoordinate::default());
    }
}
