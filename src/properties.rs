//! Validated property surface of an open session.
//!
//! Every setter follows the same pattern: validate locally, then push to
//! the driver. A validation failure never issues a driver call; a driver
//! rejection is surfaced verbatim with its code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{Result, UeyeError};

/// Gain factor accepted by the master channel: either a manual percentage
/// or the automatic gain control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainValue {
    Auto,
    Manual(i32),
}

impl From<i32> for GainValue {
    fn from(percent: i32) -> Self {
        GainValue::Manual(percent)
    }
}

impl FromStr for GainValue {
    type Err = UeyeError;

    /// Accepts the literal `"auto"` or a decimal percentage. Anything else
    /// is rejected before it can reach a driver call.
    fn from_str(s: &str) -> Result<Self> {
        if s == "auto" {
            return Ok(GainValue::Auto);
        }
        s.trim()
            .parse::<i32>()
            .map(GainValue::Manual)
            .map_err(|_| UeyeError::Validation(format!("gain must be \"auto\" or a number, got {s:?}")))
    }
}

/// The four analog gain channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainChannel {
    Master,
    Red,
    Green,
    Blue,
}

/// Which value of a gain channel to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainQuery {
    Current,
    Default,
}

/// Snapshot of all four gain channels, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gains {
    pub master: i32,
    pub red: i32,
    pub green: i32,
    pub blue: i32,
}

/// Automatic white balance mode.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhiteBalanceMode {
    Disabled = 0,
    GreyWorld = 1,
    ColorTemperature = 2,
}

impl WhiteBalanceMode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(WhiteBalanceMode::Disabled),
            1 => Some(WhiteBalanceMode::GreyWorld),
            2 => Some(WhiteBalanceMode::ColorTemperature),
            _ => None,
        }
    }
}

/// Capture rectangle on the sensor. All four fields are required; there
/// are no partial updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aoi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Aoi {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Aoi { x, y, width, height }
    }
}

impl fmt::Display for Aoi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} at ({}, {})", self.width, self.height, self.x, self.y)
    }
}

fn validate_gain(percent: i32) -> Result<()> {
    if (0..=100).contains(&percent) {
        Ok(())
    } else {
        Err(UeyeError::Validation(format!(
            "gain {percent} out of range 0-100"
        )))
    }
}

impl Camera {
    /// Sets the master gain: a manual 0-100 percentage, or
    /// [`GainValue::Auto`] to hand control to the automatic gain.
    pub fn set_master_gain(&self, value: GainValue) -> Result<()> {
        if let GainValue::Manual(percent) = value {
            validate_gain(percent)?;
        }
        let claim = self.open_claim()?;
        match value {
            GainValue::Auto => Ok(claim.driver().set_auto_gain(claim.handle(), true)?),
            GainValue::Manual(percent) => Ok(claim
                .driver()
                .set_hardware_gain(claim.handle(), Some(percent), None, None, None)?),
        }
    }

    /// Sets the red channel gain, 0-100.
    pub fn set_red_gain(&self, percent: i32) -> Result<()> {
        validate_gain(percent)?;
        let claim = self.open_claim()?;
        Ok(claim
            .driver()
            .set_hardware_gain(claim.handle(), None, Some(percent), None, None)?)
    }

    /// Sets the green channel gain, 0-100.
    pub fn set_green_gain(&self, percent: i32) -> Result<()> {
        validate_gain(percent)?;
        let claim = self.open_claim()?;
        Ok(claim
            .driver()
            .set_hardware_gain(claim.handle(), None, None, Some(percent), None)?)
    }

    /// Sets the blue channel gain, 0-100.
    pub fn set_blue_gain(&self, percent: i32) -> Result<()> {
        validate_gain(percent)?;
        let claim = self.open_claim()?;
        Ok(claim
            .driver()
            .set_hardware_gain(claim.handle(), None, None, None, Some(percent))?)
    }

    /// Current value of one gain channel. Reads never fail validation.
    pub fn gain(&self, channel: GainChannel) -> Result<i32> {
        let claim = self.open_claim()?;
        Ok(claim
            .driver()
            .hardware_gain(claim.handle(), channel, GainQuery::Current)?)
    }

    /// Factory default of one gain channel.
    pub fn default_gain(&self, channel: GainChannel) -> Result<i32> {
        let claim = self.open_claim()?;
        Ok(claim
            .driver()
            .hardware_gain(claim.handle(), channel, GainQuery::Default)?)
    }

    pub fn master_gain(&self) -> Result<i32> {
        self.gain(GainChannel::Master)
    }

    pub fn red_gain(&self) -> Result<i32> {
        self.gain(GainChannel::Red)
    }

    pub fn green_gain(&self) -> Result<i32> {
        self.gain(GainChannel::Green)
    }

    pub fn blue_gain(&self) -> Result<i32> {
        self.gain(GainChannel::Blue)
    }

    /// All four gain channels in one record.
    pub fn gains(&self) -> Result<Gains> {
        Ok(Gains {
            master: self.gain(GainChannel::Master)?,
            red: self.gain(GainChannel::Red)?,
            green: self.gain(GainChannel::Green)?,
            blue: self.gain(GainChannel::Blue)?,
        })
    }

    /// Requests a frame rate and returns the rate the device actually
    /// settled on. That returned value, not the requested one, is what
    /// [`Camera::frame_rate`] reads back afterwards.
    pub fn set_frame_rate(&self, fps: f64) -> Result<f64> {
        if !fps.is_finite() {
            return Err(UeyeError::Validation(format!(
                "frame rate must be finite, got {fps}"
            )));
        }
        let claim = self.open_claim()?;
        Ok(claim.driver().set_frame_rate(claim.handle(), fps)?)
    }

    pub fn frame_rate(&self) -> Result<f64> {
        let claim = self.open_claim()?;
        Ok(claim.driver().frame_rate(claim.handle())?)
    }

    pub fn set_pixel_clock(&self, mhz: u32) -> Result<()> {
        let claim = self.open_claim()?;
        Ok(claim.driver().set_pixel_clock(claim.handle(), mhz)?)
    }

    pub fn pixel_clock(&self) -> Result<u32> {
        let claim = self.open_claim()?;
        Ok(claim.driver().pixel_clock(claim.handle())?)
    }

    /// Sets the exposure time in seconds.
    pub fn set_exposure(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() {
            return Err(UeyeError::Validation(format!(
                "exposure must be a finite number of seconds, got {seconds}"
            )));
        }
        let claim = self.open_claim()?;
        Ok(claim.driver().set_exposure(claim.handle(), seconds)?)
    }

    pub fn exposure(&self) -> Result<f64> {
        let claim = self.open_claim()?;
        Ok(claim.driver().exposure(claim.handle())?)
    }

    pub fn set_white_balance(&self, mode: WhiteBalanceMode) -> Result<()> {
        let claim = self.open_claim()?;
        Ok(claim.driver().set_white_balance(claim.handle(), mode)?)
    }

    pub fn white_balance(&self) -> Result<WhiteBalanceMode> {
        let claim = self.open_claim()?;
        Ok(claim.driver().white_balance(claim.handle())?)
    }

    /// Current capture rectangle.
    pub fn aoi(&self) -> Result<Aoi> {
        let claim = self.open_claim()?;
        Ok(claim.driver().aoi(claim.handle())?)
    }

    /// Applies a capture rectangle. The driver rejects rectangles that do
    /// not fit the sensor; the rejection is surfaced verbatim. On success
    /// the session geometry follows the rectangle and the standing buffers
    /// are released for reprovisioning at the new size.
    ///
    /// The capture thread owns the buffers while video is recording, so the
    /// rectangle is locked for that time.
    pub fn set_aoi(&mut self, aoi: Aoi) -> Result<()> {
        if self.video_capturing() {
            return Err(UeyeError::Validation(
                "cannot change the capture rectangle while video capture is running".into(),
            ));
        }
        let claim = self.open_claim()?;
        claim.driver().set_aoi(claim.handle(), aoi)?;
        self.apply_geometry(aoi.width as u32, aoi.height as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_value_parses_auto_and_numbers() {
        assert_eq!("auto".parse::<GainValue>().unwrap(), GainValue::Auto);
        assert_eq!("55".parse::<GainValue>().unwrap(), GainValue::Manual(55));
        assert!(matches!(
            "Auto".parse::<GainValue>(),
            Err(UeyeError::Validation(_))
        ));
        assert!(matches!(
            "bright".parse::<GainValue>(),
            Err(UeyeError::Validation(_))
        ));
    }

    #[test]
    fn test_gain_range_check() {
        assert!(validate_gain(0).is_ok());
        assert!(validate_gain(100).is_ok());
        assert!(validate_gain(-1).is_err());
        assert!(validate_gain(101).is_err());
    }

    #[test]
    fn test_white_balance_raw_round_trip() {
        for mode in [
            WhiteBalanceMode::Disabled,
            WhiteBalanceMode::GreyWorld,
            WhiteBalanceMode::ColorTemperature,
        ] {
            assert_eq!(WhiteBalanceMode::from_raw(mode.as_raw()), Some(mode));
        }
        assert_eq!(WhiteBalanceMode::from_raw(9), None);
    }

    #[test]
    fn test_aoi_display() {
        let aoi = Aoi::new(16, 32, 640, 480);
        assert_eq!(aoi.to_string(), "640x480 at (16, 32)");
    }
}
