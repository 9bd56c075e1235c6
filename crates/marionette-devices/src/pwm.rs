//! PWM-backed drivers
//!
//! Duty values are in the output's own units (`0..=max_duty_cycle()`). The
//! default servo range assumes a 50 Hz signal on a 10-bit output, where 26 and
//! 130 are the first and last duties that move a typical hobby servo.

use embedded_hal::pwm::{Error as _, SetDutyCycle};
use marionette_core::{Color, Error, Fraction};

use crate::driver::{RgbDriver, ServoDriver};
use crate::error::{DeviceError, Result};

/// Lowest duty that moves the servo on a 10-bit, 50 Hz output
pub const DEFAULT_MIN_DUTY: u16 = 26;

/// Highest duty that moves the servo on a 10-bit, 50 Hz output
pub const DEFAULT_MAX_DUTY: u16 = 130;

fn driver_error<E: embedded_hal::pwm::Error>(e: E) -> DeviceError {
    DeviceError::Driver(format!("pwm: {:?}", e.kind()))
}

/// Servo on one PWM output
pub struct PwmServo<P> {
    pwm: P,
    min_duty: u16,
    max_duty: u16,
}

impl<P: SetDutyCycle> PwmServo<P> {
    pub fn new(pwm: P, min_duty: u16, max_duty: u16) -> Result<Self> {
        let limit = pwm.max_duty_cycle();
        if min_duty > max_duty || max_duty > limit {
            return Err(Error::DutyOutOfRange {
                duty: max_duty.max(min_duty) as u32,
                max: limit as u32,
            }
            .into());
        }
        Ok(Self {
            pwm,
            min_duty,
            max_duty,
        })
    }

    pub fn with_default_range(pwm: P) -> Result<Self> {
        Self::new(pwm, DEFAULT_MIN_DUTY, DEFAULT_MAX_DUTY)
    }

    /// Duty produced for a position
    pub fn duty_for(&self, value: Fraction) -> u16 {
        let span = (self.max_duty - self.min_duty) as f32;
        self.min_duty + (value.get() * span) as u16
    }

    /// Write a raw duty value
    pub fn write_duty(&mut self, duty: u16) -> Result<()> {
        let limit = self.pwm.max_duty_cycle();
        if duty > limit {
            return Err(Error::DutyOutOfRange {
                duty: duty as u32,
                max: limit as u32,
            }
            .into());
        }
        self.pwm.set_duty_cycle(duty).map_err(driver_error)
    }

    /// Write an angle in degrees, 0..=180
    pub fn write_angle(&mut self, angle: i32) -> Result<()> {
        let value = Fraction::from_angle(angle)?;
        self.write_duty(self.duty_for(value))
    }

    pub fn into_inner(self) -> P {
        self.pwm
    }
}

impl<P: SetDutyCycle + Send> ServoDriver for PwmServo<P> {
    fn write_fraction(&mut self, value: Fraction) -> Result<()> {
        let duty = self.duty_for(value);
        self.write_duty(duty)
    }
}

/// RGB LED on three PWM outputs
pub struct PwmRgbLed<P> {
    red: P,
    green: P,
    blue: P,
}

impl<P: SetDutyCycle> PwmRgbLed<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self { red, green, blue }
    }
}

impl<P: SetDutyCycle + Send> RgbDriver for PwmRgbLed<P> {
    fn set_color(&mut self, color: Color) -> Result<()> {
        self.red
            .set_duty_cycle_fraction(color.r as u16, 255)
            .map_err(driver_error)?;
        self.green
            .set_duty_cycle_fraction(color.g as u16, 255)
            .map_err(driver_error)?;
        self.blue
            .set_duty_cycle_fraction(color.b as u16, 255)
            .map_err(driver_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::pwm::{ErrorKind, ErrorType};
    use std::convert::Infallible;

    struct FakePwm {
        max: u16,
        duty: u16,
    }

    impl FakePwm {
        fn ten_bit() -> Self {
            Self { max: 1024, duty: 0 }
        }
    }

    impl ErrorType for FakePwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for FakePwm {
        fn max_duty_cycle(&self) -> u16 {
            self.max
        }

        fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), Self::Error> {
            self.duty = duty;
            Ok(())
        }
    }

    #[test]
    fn test_servo_duty_mapping() {
        let mut servo = PwmServo::with_default_range(FakePwm::ten_bit()).unwrap();
        assert_eq!(servo.duty_for(Fraction::MIN), 26);
        assert_eq!(servo.duty_for(Fraction::MAX), 130);
        assert_eq!(servo.duty_for(Fraction::new(0.5).unwrap()), 78);

        servo.write_angle(180).unwrap();
        assert_eq!(servo.into_inner().duty, 130);
    }

    struct LocalPwm(std::rc::Rc<std::cell::Cell<u16>>);

    impl ErrorType for LocalPwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for LocalPwm {
        fn max_duty_cycle(&self) -> u16 {
            1024
        }

        fn set_duty_cycle(&mut self, duty: u16) -> std::result::Result<(), Self::Error> {
            self.0.set(duty);
            Ok(())
        }
    }

    #[test]
    fn test_angle_write_on_thread_local_output() {
        // Rc keeps the output !Send; angle writes must still work
        let duty = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut servo = PwmServo::with_default_range(LocalPwm(duty.clone())).unwrap();
        servo.write_angle(90).unwrap();
        assert_eq!(duty.get(), 78);
    }

    #[test]
    fn test_servo_rejects_bad_input() {
        let mut servo = PwmServo::with_default_range(FakePwm::ten_bit()).unwrap();
        assert!(matches!(
            servo.write_angle(200),
            Err(DeviceError::Validation(Error::AngleOutOfRange(200)))
        ));
        assert!(matches!(
            servo.write_duty(2000),
            Err(DeviceError::Validation(Error::DutyOutOfRange { duty: 2000, max: 1024 }))
        ));
    }

    #[test]
    fn test_servo_range_must_fit_output() {
        assert!(PwmServo::new(FakePwm::ten_bit(), 100, 50).is_err());
        assert!(PwmServo::new(FakePwm::ten_bit(), 0, 2048).is_err());
    }

    #[test]
    fn test_rgb_scales_to_output() {
        let mut led = PwmRgbLed::new(
            FakePwm { max: 510, duty: 0 },
            FakePwm { max: 510, duty: 0 },
            FakePwm { max: 510, duty: 0 },
        );
        led.set_color(Color::new(255, 0, 51)).unwrap();
        assert_eq!(led.red.duty, 510);
        assert_eq!(led.green.duty, 0);
        assert_eq!(led.blue.duty, 102);
    }

    #[test]
    fn test_error_kind_is_reported() {
        let err = driver_error(ErrorKind::Other);
        assert!(err.to_string().contains("Other"));
    }
}
