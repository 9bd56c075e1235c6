//! Simulated drivers
//!
//! Stand-ins for hardware on development machines and in tests. Every write
//! is logged and appended to a shared history that outlives the driver once
//! it has been moved into a channel.

use marionette_core::{Color, Fraction};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::driver::{RgbDriver, ServoDriver, StripDriver};
use crate::error::{DeviceError, Result};

/// Shared record of values written to a simulated driver
pub type History<T> = Arc<Mutex<Vec<T>>>;

#[derive(Default)]
pub struct SimServo {
    name: String,
    history: History<Fraction>,
    fail: bool,
}

impl SimServo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A servo whose every write fails
    pub fn broken(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn history(&self) -> History<Fraction> {
        self.history.clone()
    }
}

impl ServoDriver for SimServo {
    fn write_fraction(&mut self, value: Fraction) -> Result<()> {
        if self.fail {
            return Err(DeviceError::Driver(format!("{}: servo not responding", self.name)));
        }
        debug!("[sim] {} servo -> {}", self.name, value);
        self.history.lock().push(value);
        Ok(())
    }
}

#[derive(Default)]
pub struct SimRgb {
    name: String,
    history: History<Color>,
}

impl SimRgb {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn history(&self) -> History<Color> {
        self.history.clone()
    }
}

impl RgbDriver for SimRgb {
    fn set_color(&mut self, color: Color) -> Result<()> {
        debug!(
            "[sim] {} led -> ({}, {}, {})",
            self.name, color.r, color.g, color.b
        );
        self.history.lock().push(color);
        Ok(())
    }
}

pub struct SimStrip {
    name: String,
    len: usize,
    history: History<Vec<Color>>,
}

impl SimStrip {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn history(&self) -> History<Vec<Color>> {
        self.history.clone()
    }
}

impl StripDriver for SimStrip {
    fn len(&self) -> usize {
        self.len
    }

    fn write_pixels(&mut self, colors: &[Color]) -> Result<()> {
        debug!("[sim] {} strip -> {} pixels", self.name, colors.len());
        self.history.lock().push(colors.to_vec());
        Ok(())
    }
}
