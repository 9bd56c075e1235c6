//! Hardware seams
//!
//! Channels never talk to pins directly; they go through these traits so the
//! same channel runs against PWM outputs, simulated devices or test doubles.

use marionette_core::{Color, Fraction};

use crate::error::Result;

/// Positions a servo
pub trait ServoDriver: Send {
    fn write_fraction(&mut self, value: Fraction) -> Result<()>;
}

/// Drives a single RGB LED
pub trait RgbDriver: Send {
    fn set_color(&mut self, color: Color) -> Result<()>;
}

/// Drives an addressable strip of fixed length
pub trait StripDriver: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Show `colors`; always exactly `len()` entries
    fn write_pixels(&mut self, colors: &[Color]) -> Result<()>;
}
