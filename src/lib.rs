pub mod error;
pub mod common;
pub mod driver;
pub mod device_info;
pub mod frame;
mod sequence;
pub mod properties;
pub mod camera;
pub mod video;

// Re-export the main types for convenience
pub use crate::camera::{Camera, DEFAULT_BUFFER_COUNT, DEFAULT_TIMEOUT};
pub use crate::common::{CameraStatus, ColorMode, DisplayMode};
pub use crate::device_info::{
    BayerPixel, CameraInfo, CameraType, DeviceEntry, SensorColorMode, SensorInfo,
    available_devices, device_count,
};
pub use crate::driver::{DeviceHandle, Driver, ErrorCode, MemoryId, VideoHandle};
pub use crate::error::{Result, UeyeError};
pub use crate::frame::{FrameMetadata, ImageFrame, ImageInfo, PixelData, Timestamp};
pub use crate::properties::{Aoi, GainChannel, GainQuery, GainValue, Gains, WhiteBalanceMode};
pub use crate::video::{DEFAULT_VIDEO_FRAME_RATE, VideoRecorder};
