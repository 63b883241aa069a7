//! Driver capability boundary.
//!
//! Everything the crate needs from the vendor driver is expressed as the
//! object-safe [`Driver`] trait so sessions can run against the real SDK or
//! against [`mock::MockDriver`] in tests. Methods return raw [`ErrorCode`]s;
//! classification into the crate error taxonomy happens in the session
//! layer, which knows the calling context.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::common::DisplayMode;
use crate::device_info::{CameraInfo, DeviceEntry, SensorInfo};
use crate::frame::ImageInfo;
use crate::properties::{Aoi, GainChannel, GainQuery, WhiteBalanceMode};

pub mod mock;

/// Opaque identifier for one open device session. Non-zero once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one hardware image buffer within a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryId(pub i32);

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one allocated AVI engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoHandle(pub i32);

impl fmt::Display for VideoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw driver return code.
///
/// The driver reports every call's outcome as a signed integer; `SUCCESS`
/// (zero) never reaches callers since the trait maps it to `Ok`. The named
/// constants follow the vendor numbering where it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const SUCCESS: ErrorCode = ErrorCode(0);
    pub const NO_SUCCESS: ErrorCode = ErrorCode(-1);
    pub const INVALID_HANDLE: ErrorCode = ErrorCode(1);
    pub const CANT_OPEN_DEVICE: ErrorCode = ErrorCode(3);
    pub const INVALID_MEMORY: ErrorCode = ErrorCode(49);
    pub const SEQUENCE_BUFFER_LOCKED: ErrorCode = ErrorCode(105);
    pub const NO_ACTIVE_MEMORY: ErrorCode = ErrorCode(108);
    pub const TIMED_OUT: ErrorCode = ErrorCode(122);
    pub const INVALID_PARAMETER: ErrorCode = ErrorCode(125);
    pub const CAPTURE_RUNNING: ErrorCode = ErrorCode(140);

    /// Short text for the codes this layer knows about.
    pub fn description(self) -> Option<&'static str> {
        match self {
            ErrorCode::SUCCESS => Some("success"),
            ErrorCode::NO_SUCCESS => Some("general driver failure"),
            ErrorCode::INVALID_HANDLE => Some("invalid device handle"),
            ErrorCode::CANT_OPEN_DEVICE => Some("device could not be opened"),
            ErrorCode::INVALID_MEMORY => Some("invalid image memory"),
            ErrorCode::SEQUENCE_BUFFER_LOCKED => Some("sequence buffer is locked"),
            ErrorCode::NO_ACTIVE_MEMORY => Some("no active image memory"),
            ErrorCode::TIMED_OUT => Some("operation timed out"),
            ErrorCode::INVALID_PARAMETER => Some("invalid parameter"),
            ErrorCode::CAPTURE_RUNNING => Some("capture is running"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "code {} ({})", self.0, text),
            None => write!(f, "code {}", self.0),
        }
    }
}

/// Per-call result at the driver boundary.
pub type DriverResult<T> = std::result::Result<T, ErrorCode>;

/// The capability set the control layer consumes from the vendor driver.
///
/// All methods take `&self` so the trait stays object-safe and a single
/// driver instance can be shared behind an `Arc`; implementations use
/// internal mutability for their own state. Methods block until the driver
/// answers; the only bounded wait is [`Driver::wait_for_next_image`].
pub trait Driver: Send + Sync {
    // Discovery.

    /// Number of devices the driver can currently see.
    fn device_count(&self) -> DriverResult<u32>;

    /// One enumeration record per visible device, open or not.
    fn device_list(&self) -> DriverResult<Vec<DeviceEntry>>;

    // Session.

    /// Claims a device exclusively. `None` selects the next free device.
    fn open_device(&self, index: Option<u32>) -> DriverResult<DeviceHandle>;

    /// Releases the exclusive claim. The handle is dead afterwards.
    fn close_device(&self, dev: DeviceHandle) -> DriverResult<()>;

    /// Fixed identity record burned into the device.
    fn camera_info(&self, dev: DeviceHandle) -> DriverResult<CameraInfo>;

    /// Sensor capability record.
    fn sensor_info(&self, dev: DeviceHandle) -> DriverResult<SensorInfo>;

    // Image queue.

    fn init_image_queue(&self, dev: DeviceHandle) -> DriverResult<()>;

    fn exit_image_queue(&self, dev: DeviceHandle) -> DriverResult<()>;

    // Buffers and the acquisition sequence.

    /// Allocates one hardware image buffer of `width × height` pixels at
    /// `bits_per_pixel`.
    fn alloc_image_mem(
        &self,
        dev: DeviceHandle,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    ) -> DriverResult<MemoryId>;

    /// Binds a buffer as the device's active capture target.
    fn set_image_mem(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()>;

    /// Registers a buffer into the circular acquisition sequence.
    fn add_to_sequence(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()>;

    /// Clears the whole sequence. The driver sequence is all-or-nothing;
    /// there is no per-buffer removal.
    fn clear_sequence(&self, dev: DeviceHandle) -> DriverResult<()>;

    /// Frees one buffer's memory. Fails while the buffer is locked.
    fn free_image_mem(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()>;

    // Acquisition.

    /// Blocks until a frame completes or `timeout` elapses
    /// (`ErrorCode::TIMED_OUT`). The returned buffer is locked for the
    /// caller until [`Driver::unlock_buffer`].
    fn wait_for_next_image(
        &self,
        dev: DeviceHandle,
        timeout: Duration,
    ) -> DriverResult<MemoryId>;

    /// Metadata record of a completed buffer.
    fn image_info(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<ImageInfo>;

    /// Copies a completed buffer's pixels into `dst`, which must hold the
    /// full `width × height × bytes-per-pixel` payload.
    fn copy_image_mem(&self, dev: DeviceHandle, mem: MemoryId, dst: &mut [u8])
        -> DriverResult<()>;

    /// Returns a locked buffer to the driver's free rotation.
    fn unlock_buffer(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()>;

    // Scalar properties.

    /// Pushes hardware gain factors; `None` leaves a channel untouched.
    fn set_hardware_gain(
        &self,
        dev: DeviceHandle,
        master: Option<i32>,
        red: Option<i32>,
        green: Option<i32>,
        blue: Option<i32>,
    ) -> DriverResult<()>;

    /// Reads one gain channel, either its current or its default value.
    fn hardware_gain(
        &self,
        dev: DeviceHandle,
        channel: GainChannel,
        query: GainQuery,
    ) -> DriverResult<i32>;

    fn set_auto_gain(&self, dev: DeviceHandle, enabled: bool) -> DriverResult<()>;

    /// Requests a frame rate and returns the rate the device actually
    /// settled on, which may differ from the request.
    fn set_frame_rate(&self, dev: DeviceHandle, fps: f64) -> DriverResult<f64>;

    fn frame_rate(&self, dev: DeviceHandle) -> DriverResult<f64>;

    fn set_pixel_clock(&self, dev: DeviceHandle, mhz: u32) -> DriverResult<()>;

    fn pixel_clock(&self, dev: DeviceHandle) -> DriverResult<u32>;

    fn set_exposure(&self, dev: DeviceHandle, seconds: f64) -> DriverResult<()>;

    fn exposure(&self, dev: DeviceHandle) -> DriverResult<f64>;

    fn set_white_balance(&self, dev: DeviceHandle, mode: WhiteBalanceMode) -> DriverResult<()>;

    fn white_balance(&self, dev: DeviceHandle) -> DriverResult<WhiteBalanceMode>;

    /// Applies a capture rectangle. The driver rejects rectangles invalid
    /// for the current sensor.
    fn set_aoi(&self, dev: DeviceHandle, aoi: Aoi) -> DriverResult<()>;

    fn aoi(&self, dev: DeviceHandle) -> DriverResult<Aoi>;

    // Parameter-set passthrough. The file format is opaque to this layer.

    fn save_parameters(&self, dev: DeviceHandle, path: &Path) -> DriverResult<()>;

    fn load_parameters(&self, dev: DeviceHandle, path: &Path) -> DriverResult<()>;

    // Display path.

    fn set_display_mode(&self, dev: DeviceHandle, mode: DisplayMode) -> DriverResult<()>;

    // AVI engine.

    /// Allocates an AVI engine bound to the device session.
    fn avi_init(&self, dev: DeviceHandle) -> DriverResult<VideoHandle>;

    /// Opens the destination container file.
    fn avi_open(&self, video: VideoHandle, path: &Path) -> DriverResult<()>;

    fn avi_set_frame_rate(&self, video: VideoHandle, fps: f64) -> DriverResult<()>;

    /// Appends one completed image buffer to the container.
    fn avi_add_frame(&self, video: VideoHandle, mem: MemoryId) -> DriverResult<()>;

    /// Stops the encoder stream. The file stays open until
    /// [`Driver::avi_close`].
    fn avi_stop(&self, video: VideoHandle) -> DriverResult<()>;

    fn avi_close(&self, video: VideoHandle) -> DriverResult<()>;

    /// Releases the engine instance.
    fn avi_exit(&self, video: VideoHandle) -> DriverResult<()>;
}
