//! Device identity and enumeration records.
//!
//! These are the read-only snapshots a session takes right after connecting,
//! plus the per-device enumeration record available without opening anything.
//! All of them serialize with the field names host applications expect.

use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::Result;

/// Product family of a connected device, derived from the camera-type code
/// in the device's identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraType {
    UsbSe,
    UsbLe,
    UsbMe,
    UsbRe,
    GigESe,
    GigEHe,
    GigECp,
    Unknown(u32),
}

impl CameraType {
    /// Maps the driver's camera-type code. Unrecognized codes are kept
    /// verbatim so they survive into logs.
    pub fn from_raw(value: u32) -> Self {
        match value {
            0x40 => CameraType::UsbSe,
            0x41 => CameraType::UsbLe,
            0x42 => CameraType::UsbMe,
            0x43 => CameraType::UsbRe,
            0x80 => CameraType::GigESe,
            0x81 => CameraType::GigEHe,
            0x82 => CameraType::GigECp,
            other => CameraType::Unknown(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            CameraType::UsbSe => 0x40,
            CameraType::UsbLe => 0x41,
            CameraType::UsbMe => 0x42,
            CameraType::UsbRe => 0x43,
            CameraType::GigESe => 0x80,
            CameraType::GigEHe => 0x81,
            CameraType::GigECp => 0x82,
            CameraType::Unknown(raw) => raw,
        }
    }

    /// Human-readable product label.
    pub fn label(self) -> &'static str {
        match self {
            CameraType::UsbSe => "USB uEye SE",
            CameraType::UsbLe => "USB uEye LE",
            CameraType::UsbMe => "USB uEye ME",
            CameraType::UsbRe => "USB uEye RE",
            CameraType::GigESe => "GigE uEye SE",
            CameraType::GigEHe => "GigE uEye HE",
            CameraType::GigECp => "GigE uEye CP",
            CameraType::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CameraType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for CameraType {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Broad color capability class of the sensor, as reported by the sensor
/// record. Decides the session's default pixel layout.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorColorMode {
    Invalid = 0,
    Monochrome = 1,
    Bayer = 2,
    CbYCrY = 4,
    Jpeg = 8,
}

impl SensorColorMode {
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => SensorColorMode::Monochrome,
            2 => SensorColorMode::Bayer,
            4 => SensorColorMode::CbYCrY,
            8 => SensorColorMode::Jpeg,
            _ => SensorColorMode::Invalid,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Color of the top-left pixel of the sensor's Bayer filter.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BayerPixel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl BayerPixel {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(BayerPixel::Red),
            1 => Some(BayerPixel::Green),
            2 => Some(BayerPixel::Blue),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Fixed identity record burned into the device at manufacture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraInfo {
    pub serial_number: String,
    pub manufacturer: String,
    pub hw_version: String,
    /// Quality-control date, as the device reports it.
    pub date: String,
    /// Device id assignable through the vendor tooling.
    pub id: u32,
    #[serde(rename = "type")]
    pub camera_type: CameraType,
}

/// Sensor capability record.
///
/// The `*_gain` fields are availability flags (whether the sensor has that
/// analog gain channel), not gain values. `pixel_size` is in micrometers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: u16,
    pub sensor_name: String,
    pub max_width: u32,
    pub max_height: u32,
    pub master_gain: bool,
    pub red_gain: bool,
    pub green_gain: bool,
    pub blue_gain: bool,
    pub global_shutter: bool,
    pub pixel_size: f64,
    pub first_pixel_color: BayerPixel,
    pub color_mode: SensorColorMode,
}

/// One entry of the device enumeration, available without opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub camera_id: u32,
    pub device_id: u32,
    pub sensor_id: u32,
    pub in_use: bool,
    pub serial_number: String,
    pub model: String,
    pub status: u32,
}

/// Number of devices the driver can currently see.
pub fn device_count(driver: &dyn Driver) -> Result<u32> {
    Ok(driver.device_count()?)
}

/// Enumerates all visible devices, including ones already claimed.
pub fn available_devices(driver: &dyn Driver) -> Result<Vec<DeviceEntry>> {
    Ok(driver.device_list()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_type_labels() {
        assert_eq!(CameraType::UsbSe.label(), "USB uEye SE");
        assert_eq!(CameraType::GigEHe.label(), "GigE uEye HE");
        assert_eq!(CameraType::Unknown(0x7777).label(), "Unknown");
    }

    #[test]
    fn test_camera_type_raw_round_trip() {
        for raw in [0x40, 0x41, 0x42, 0x43, 0x80, 0x81, 0x82, 0x1234] {
            assert_eq!(CameraType::from_raw(raw).as_raw(), raw);
        }
    }

    #[test]
    fn test_sensor_color_mode_from_raw() {
        assert_eq!(SensorColorMode::from_raw(1), SensorColorMode::Monochrome);
        assert_eq!(SensorColorMode::from_raw(2), SensorColorMode::Bayer);
        assert_eq!(SensorColorMode::from_raw(77), SensorColorMode::Invalid);
    }

    #[test]
    fn test_camera_info_serializes_with_type_field() {
        let info = CameraInfo {
            serial_number: "4102885308".into(),
            manufacturer: "IDS GmbH".into(),
            hw_version: "V2.10".into(),
            date: "01.06.2022".into(),
            id: 1,
            camera_type: CameraType::UsbSe,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "USB uEye SE");
        assert_eq!(json["serial_number"], "4102885308");
        assert!(json.get("camera_type").is_none());
    }

    #[test]
    fn test_device_entry_round_trips_through_json() {
        let entry = DeviceEntry {
            camera_id: 1,
            device_id: 1001,
            sensor_id: 0x22,
            in_use: false,
            serial_number: "4102885308".into(),
            model: "UI124xSE-M".into(),
            status: 0,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: DeviceEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
