//! Completed-frame payloads and their metadata.

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::common::ColorMode;
use crate::error::{Result, UeyeError};

/// io-status bit for the GPIO 2 line.
const IO_GPIO2: u32 = 1 << 0;
/// io-status bit for the GPIO 1 line.
const IO_GPIO1: u32 = 1 << 1;
/// io-status bit for the dedicated digital input.
const IO_DIGITAL_IN: u32 = 1 << 2;

/// Capture time as the device reports it: calendar date plus
/// millisecond-resolution wall time, already decomposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

impl Timestamp {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8, millisecond: u16) -> Self {
        Timestamp { year, month, day, hour, minute, second, millisecond }
    }

    /// Current local wall time, decomposed the way the device would
    /// report it.
    pub fn now() -> Self {
        use chrono::{Datelike, Timelike};
        let now = chrono::Local::now().naive_local();
        Timestamp {
            year: now.year().clamp(0, u16::MAX as i32) as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            millisecond: (now.and_utc().timestamp_subsec_millis()) as u16,
        }
    }

    /// Recomposes the fields into a calendar value. `None` when the device
    /// reported something that is not a valid date or time of day.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_milli_opt(
                self.hour as u32,
                self.minute as u32,
                self.second as u32,
                self.millisecond as u32,
            )
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.millisecond
        )
    }
}

/// Raw per-image record as the driver hands it over: the io lines are still
/// a packed bitfield. [`FrameMetadata::from_info`] unpacks it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub timestamp: Timestamp,
    pub io_status: u32,
    pub frame_number: u64,
    pub buffers_total: u32,
    pub buffers_in_use: u32,
    pub width: u32,
    pub height: u32,
}

/// Stable per-frame metadata record surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub timestamp: Timestamp,
    pub digital_input: bool,
    pub gpio1: bool,
    pub gpio2: bool,
    /// Monotonically increasing capture counter, device-maintained.
    pub frame_number: u64,
    /// Buffers in the device's pool in total.
    pub camera_buffers: u32,
    /// Buffers currently owned by the hardware.
    pub used_camera_buffers: u32,
    pub height: u32,
    pub width: u32,
}

impl FrameMetadata {
    /// Unpacks the raw record. Each io line is its own mask; the flags are
    /// independent, never merged.
    pub fn from_info(info: &ImageInfo) -> Self {
        FrameMetadata {
            timestamp: info.timestamp,
            digital_input: info.io_status & IO_DIGITAL_IN != 0,
            gpio1: info.io_status & IO_GPIO1 != 0,
            gpio2: info.io_status & IO_GPIO2 != 0,
            frame_number: info.frame_number,
            camera_buffers: info.buffers_total,
            used_camera_buffers: info.buffers_in_use,
            height: info.height,
            width: info.width,
        }
    }
}

/// Owned pixel payload of one frame.
///
/// Single-byte color modes come back as a `height × width` plane; every
/// other mode as `height × width × bytes-per-pixel`.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Mono(Array2<u8>),
    Packed(Array3<u8>),
}

impl PixelData {
    /// Builds the array for `mode` from a raw byte copy of the buffer.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32, mode: ColorMode) -> Result<Self> {
        let (w, h) = (width as usize, height as usize);
        let channels = mode.bytes_per_pixel() as usize;
        let expected = w * h * channels;
        if data.len() != expected {
            return Err(UeyeError::Validation(format!(
                "frame payload is {} bytes, geometry {}x{}x{} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        if mode.is_single_byte() {
            let plane = Array2::from_shape_vec((h, w), data)
                .map_err(|e| UeyeError::Validation(format!("frame shape: {e}")))?;
            Ok(PixelData::Mono(plane))
        } else {
            let cube = Array3::from_shape_vec((h, w, channels), data)
                .map_err(|e| UeyeError::Validation(format!("frame shape: {e}")))?;
            Ok(PixelData::Packed(cube))
        }
    }

    pub fn width(&self) -> usize {
        match self {
            PixelData::Mono(plane) => plane.ncols(),
            PixelData::Packed(cube) => cube.dim().1,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            PixelData::Mono(plane) => plane.nrows(),
            PixelData::Packed(cube) => cube.dim().0,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelData::Mono(_) => 1,
            PixelData::Packed(cube) => cube.dim().2,
        }
    }

    pub fn ndim(&self) -> usize {
        match self {
            PixelData::Mono(_) => 2,
            PixelData::Packed(_) => 3,
        }
    }

    /// Flat view of the payload in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PixelData::Mono(plane) => plane.as_slice().unwrap_or(&[]),
            PixelData::Packed(cube) => cube.as_slice().unwrap_or(&[]),
        }
    }
}

/// One completed acquisition: pixels and their metadata, produced together.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub pixels: PixelData,
    pub metadata: FrameMetadata,
}

impl ImageFrame {
    /// One-line human summary, handy for logs and demos.
    pub fn describe(&self) -> String {
        format!(
            "frame #{} {}x{}x{} at {}",
            self.metadata.frame_number,
            self.pixels.width(),
            self.pixels.height(),
            self.pixels.channels(),
            self.metadata.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped_info(io_status: u32) -> ImageInfo {
        ImageInfo {
            timestamp: Timestamp::new(2024, 1, 1, 12, 0, 0, 500),
            io_status,
            frame_number: 42,
            buffers_total: 3,
            buffers_in_use: 1,
            width: 640,
            height: 480,
        }
    }

    #[test]
    fn test_io_flags_decode_independently() {
        let gpio2_only = FrameMetadata::from_info(&stamped_info(0b001));
        assert!(gpio2_only.gpio2 && !gpio2_only.gpio1 && !gpio2_only.digital_input);

        let gpio1_only = FrameMetadata::from_info(&stamped_info(0b010));
        assert!(!gpio1_only.gpio2 && gpio1_only.gpio1 && !gpio1_only.digital_input);

        let din_only = FrameMetadata::from_info(&stamped_info(0b100));
        assert!(!din_only.gpio2 && !din_only.gpio1 && din_only.digital_input);

        let all = FrameMetadata::from_info(&stamped_info(0b111));
        assert!(all.gpio2 && all.gpio1 && all.digital_input);
    }

    #[test]
    fn test_timestamp_recomposes() {
        let ts = Timestamp::new(2024, 1, 1, 12, 0, 0, 500);
        let naive = ts.to_naive().unwrap();
        assert_eq!(naive.to_string(), "2024-01-01 12:00:00.500");
        assert!(Timestamp::new(2024, 13, 1, 0, 0, 0, 0).to_naive().is_none());
    }

    #[test]
    fn test_mono_frames_are_two_dimensional() {
        let data = vec![0u8; 8 * 4];
        let pixels = PixelData::from_raw(data, 8, 4, ColorMode::Mono8).unwrap();
        assert_eq!(pixels.ndim(), 2);
        assert_eq!((pixels.width(), pixels.height(), pixels.channels()), (8, 4, 1));
    }

    #[test]
    fn test_packed_frames_carry_a_channel_axis() {
        let data = vec![0u8; 8 * 4 * 3];
        let pixels = PixelData::from_raw(data, 8, 4, ColorMode::Bgr8).unwrap();
        assert_eq!(pixels.ndim(), 3);
        assert_eq!((pixels.width(), pixels.height(), pixels.channels()), (8, 4, 3));
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let err = PixelData::from_raw(vec![0u8; 10], 8, 4, ColorMode::Mono8).unwrap_err();
        assert!(matches!(err, UeyeError::Validation(_)));
    }

    #[test]
    fn test_metadata_record_field_names() {
        let meta = FrameMetadata::from_info(&stamped_info(0));
        let json = serde_json::to_value(meta).unwrap();
        for field in [
            "timestamp",
            "digital_input",
            "gpio1",
            "gpio2",
            "frame_number",
            "camera_buffers",
            "used_camera_buffers",
            "height",
            "width",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["frame_number"], 42);
        assert_eq!(json["timestamp"]["millisecond"], 500);
    }
}
