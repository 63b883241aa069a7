use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a camera session.
///
/// The progression is monotonic: `NotReady` → `Connected` → `Ready`. There
/// is no path back to an earlier state short of dropping the session and
/// creating a new one.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraStatus {
    NotReady = 0,
    Connected = 1,
    Ready = 2,
}

impl Default for CameraStatus {
    fn default() -> Self {
        CameraStatus::NotReady
    }
}

impl CameraStatus {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => CameraStatus::Connected,
            2 => CameraStatus::Ready,
            _ => CameraStatus::NotReady,
        }
    }

    /// Stable label surfaced to host applications.
    pub fn label(self) -> &'static str {
        match self {
            CameraStatus::NotReady => "Not Ready",
            CameraStatus::Connected => "Connected",
            CameraStatus::Ready => "Ready",
        }
    }
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Pixel layout of the frames a session produces.
///
/// Single-byte modes come back as 2-D arrays, everything else as 3-D with
/// one axis per byte of the pixel.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    Mono8 = 0,
    Mono12 = 1,
    Mono16 = 2,
    BayerRaw8 = 3,
    BayerRaw12 = 4,
    Bgr8 = 5,
    Bgra8 = 6,
    Rgb8 = 7,
}

impl ColorMode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        use ColorMode::*;
        match value {
            0 => Some(Mono8),
            1 => Some(Mono12),
            2 => Some(Mono16),
            3 => Some(BayerRaw8),
            4 => Some(BayerRaw12),
            5 => Some(Bgr8),
            6 => Some(Bgra8),
            7 => Some(Rgb8),
            _ => None,
        }
    }

    /// Bits the driver allocates per pixel. 12-bit modes are stored in
    /// 16-bit containers.
    pub fn bits_per_pixel(self) -> u32 {
        use ColorMode::*;
        match self {
            Mono8 | BayerRaw8 => 8,
            Mono12 | Mono16 | BayerRaw12 => 16,
            Bgr8 | Rgb8 => 24,
            Bgra8 => 32,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        self.bits_per_pixel() / 8
    }

    /// True for the modes whose frames are 2-D (one byte per pixel, no
    /// channel axis): monochrome 8-bit and raw Bayer 8-bit.
    pub fn is_single_byte(self) -> bool {
        self.bytes_per_pixel() == 1
    }
}

/// Display path the device renders into.
///
/// The AVI engine requires system-memory bitmaps (`Dib`); starting a
/// recording forces this mode device-wide.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Dib = 1,
    Direct3D = 4,
    OpenGl = 8,
}

impl DisplayMode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(DisplayMode::Dib),
            4 => Some(DisplayMode::Direct3D),
            8 => Some(DisplayMode::OpenGl),
            _ => None,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
