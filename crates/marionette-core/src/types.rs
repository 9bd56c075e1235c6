//! Device value types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Quality of service requested from the bus transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce = 0,
    /// Delivered at least once
    AtLeastOnce = 1,
    /// Delivered exactly once
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// Servo position as a fraction of its travel, always within 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
#[serde(transparent)]
pub struct Fraction(f32);

impl Fraction {
    pub const MIN: Fraction = Fraction(0.0);
    pub const MAX: Fraction = Fraction(1.0);

    /// Validate a raw value. NaN and anything outside 0.0..=1.0 is rejected.
    pub fn new(value: f32) -> Result<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::FractionOutOfRange(value as f64))
        }
    }

    /// Validate a JSON-width value before narrowing it to `f32`
    pub fn from_f64(value: f64) -> Result<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value as f32))
        } else {
            Err(Error::FractionOutOfRange(value))
        }
    }

    /// Fraction of a 0..=180 degree angle
    pub fn from_angle(angle: i32) -> Result<Self> {
        if !(0..=180).contains(&angle) {
            return Err(Error::AngleOutOfRange(angle));
        }
        Ok(Self(angle as f32 / 180.0))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for Fraction {
    type Error = Error;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from unbounded channel values, clamping each to 0..=255
    pub fn clamped(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }

    pub fn to_triple(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self { r, g, b }
    }
}

fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}
