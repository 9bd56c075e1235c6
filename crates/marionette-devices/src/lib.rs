//! Marionette Devices
//!
//! Device channels keep a servo, an RGB LED or an LED strip in sync with the
//! bus. Each channel caches the last applied value, validates writes from the
//! bus or from local callers, drives the hardware through a driver trait and
//! republishes its state to `<root>/read` whenever it changes.
//!
//! Drivers:
//! - [`PwmServo`] / [`PwmRgbLed`]: any `embedded_hal::pwm::SetDutyCycle` output
//! - [`SimServo`] / [`SimRgb`] / [`SimStrip`]: logging stand-ins

pub mod channel;
pub mod driver;
pub mod error;
pub mod led;
pub mod pwm;
pub mod servo;
pub mod sim;
pub mod strip;

pub use channel::DEVICE_QOS;
pub use driver::{RgbDriver, ServoDriver, StripDriver};
pub use error::{DeviceError, Result};
pub use led::LedChannel;
pub use pwm::{PwmRgbLed, PwmServo};
pub use servo::ServoChannel;
pub use sim::{SimRgb, SimServo, SimStrip};
pub use strip::StripChannel;
