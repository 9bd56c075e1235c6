//! Device error types

use marionette_bus::BusError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
    /// Value outside the device's domain; state is left untouched
    #[error("validation error: {0}")]
    Validation(#[from] marionette_core::Error),

    /// The hardware rejected the write
    #[error("driver error: {0}")]
    Driver(String),

    /// State changed but the broadcast could not be published
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}
