//! Camera session lifecycle and frame acquisition.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::{CameraStatus, ColorMode};
use crate::device_info::{CameraInfo, SensorColorMode, SensorInfo};
use crate::driver::{DeviceHandle, Driver, ErrorCode, MemoryId};
use crate::error::{Result, UeyeError, classify_wait};
use crate::frame::{FrameMetadata, ImageFrame, PixelData};
use crate::sequence::SequencePool;

/// How long a frame wait blocks when no timeout is configured explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Buffers kept registered with the driver between captures.
pub const DEFAULT_BUFFER_COUNT: u32 = 3;

/// Exclusive claim on one open device handle.
///
/// The camera and any recorder spawned from it share the claim; the handle
/// closes when the last owner drops, always after every other teardown step.
pub(crate) struct DeviceClaim {
    driver: Arc<dyn Driver>,
    handle: DeviceHandle,
    acq_lock: Mutex<()>,
    video_active: AtomicBool,
}

impl DeviceClaim {
    pub(crate) fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub(crate) fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Serializes wait/copy/unlock so the capture thread and direct
    /// acquisition never interleave on one handle.
    pub(crate) fn lock_acquisition(&self) -> MutexGuard<'_, ()> {
        self.acq_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set while a recorder is between `start()` and `stop()`.
    pub(crate) fn video_active(&self) -> &AtomicBool {
        &self.video_active
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        match self.driver.close_device(self.handle) {
            Ok(()) => debug!(handle = %self.handle, "device handle closed"),
            Err(code) => warn!(handle = %self.handle, %code, "failed to close device handle"),
        }
    }
}

/// One exclusive session on a physical camera.
///
/// Created idle, brought up with [`Camera::open`], torn down by
/// [`Camera::close`] or drop. All driver traffic for the device funnels
/// through this object or the [`VideoRecorder`](crate::VideoRecorder)
/// spawned from it.
pub struct Camera {
    driver: Arc<dyn Driver>,
    claim: Option<Arc<DeviceClaim>>,
    status: CameraStatus,
    width: u32,
    height: u32,
    color_mode: ColorMode,
    camera_info: Option<CameraInfo>,
    sensor_info: Option<SensorInfo>,
    pool: Option<SequencePool>,
    buffer_count: u32,
    timeout: Duration,
}

impl Camera {
    /// A camera bound to `driver`, not yet opened.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Camera {
            driver,
            claim: None,
            status: CameraStatus::NotReady,
            width: 0,
            height: 0,
            color_mode: ColorMode::Mono8,
            camera_info: None,
            sensor_info: None,
            pool: None,
            buffer_count: DEFAULT_BUFFER_COUNT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Claims a device and brings the session up to `Ready`.
    ///
    /// `device` selects an entry from
    /// [`available_devices`](crate::device_info::available_devices); `None`
    /// claims the first free device. An absent or unreachable device is
    /// [`UeyeError::NotConnected`]; any other rejection carries the driver's
    /// code. The session stops at `Connected` when the identity snapshots or
    /// the image queue cannot be brought up.
    pub fn open(&mut self, device: Option<u32>) -> Result<()> {
        if self.claim.is_some() {
            return Err(UeyeError::AlreadyOpen);
        }
        let handle = match self.driver.open_device(device) {
            Ok(handle) => handle,
            Err(code) if code == ErrorCode::CANT_OPEN_DEVICE => {
                return Err(UeyeError::NotConnected);
            }
            Err(code) => return Err(code.into()),
        };
        self.claim = Some(Arc::new(DeviceClaim {
            driver: Arc::clone(&self.driver),
            handle,
            acq_lock: Mutex::new(()),
            video_active: AtomicBool::new(false),
        }));
        self.status = CameraStatus::Connected;
        debug!(%handle, "device claimed");

        let camera_info = self.driver.camera_info(handle)?;
        let sensor_info = self.driver.sensor_info(handle)?;
        self.width = sensor_info.max_width;
        self.height = sensor_info.max_height;
        self.color_mode = match sensor_info.color_mode {
            SensorColorMode::Monochrome => ColorMode::Mono8,
            _ => ColorMode::Bgr8,
        };
        info!(
            model = %sensor_info.sensor_name,
            serial = %camera_info.serial_number,
            width = self.width,
            height = self.height,
            "camera identified"
        );
        self.camera_info = Some(camera_info);
        self.sensor_info = Some(sensor_info);

        self.driver.init_image_queue(handle)?;
        self.status = CameraStatus::Ready;
        Ok(())
    }

    /// Current lifecycle stage.
    pub fn status(&self) -> CameraStatus {
        self.status
    }

    /// Frame width in pixels. Zero until the session is `Ready`.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels. Zero until the session is `Ready`.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Bits per pixel of the session's color mode.
    pub fn bit_depth(&self) -> u32 {
        self.color_mode.bits_per_pixel()
    }

    /// Identity snapshot taken at `open`.
    pub fn camera_info(&self) -> Option<&CameraInfo> {
        self.camera_info.as_ref()
    }

    /// Sensor capability snapshot taken at `open`.
    pub fn sensor_info(&self) -> Option<&SensorInfo> {
        self.sensor_info.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets how long [`Camera::get_image`] waits for each frame.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    /// Number of standing buffers registered with the driver.
    ///
    /// The current pool is released and the next acquisition reprovisions at
    /// the new depth. Rejected while video capture is running, since the
    /// capture thread is cycling through the current pool.
    pub fn set_buffer_count(&mut self, count: u32) -> Result<()> {
        if count == 0 {
            return Err(UeyeError::Validation(
                "buffer count must be at least 1".into(),
            ));
        }
        if self.video_capturing() {
            return Err(UeyeError::Validation(
                "cannot resize the buffer pool while video capture is running".into(),
            ));
        }
        self.buffer_count = count;
        self.release_pool();
        Ok(())
    }

    /// Blocks for the next completed frame and returns it as an owned image.
    ///
    /// Waits up to the configured timeout, reads the metadata the driver
    /// recorded for that exposure, and copies the pixels out of driver
    /// memory. The driver buffer is handed back before this returns, so the
    /// frame never borrows driver memory.
    pub fn get_image(&mut self) -> Result<ImageFrame> {
        self.ensure_pool()?;
        let claim = self.ready_claim_arc()?;
        let timeout = self.timeout;
        let width = self.width;
        let height = self.height;
        let mode = self.color_mode;

        let _acq = claim.lock_acquisition();
        let driver = claim.driver();
        let dev = claim.handle();

        let mem = classify_wait(driver.wait_for_next_image(dev, timeout), timeout)?;
        if let Some(pool) = self.pool.as_mut() {
            pool.note_locked(mem);
        }

        let info = match driver.image_info(dev, mem) {
            Ok(info) => info,
            Err(code) => {
                self.hand_back(&claim, mem);
                return Err(code.into());
            }
        };

        let mut raw =
            vec![0u8; width as usize * height as usize * mode.bytes_per_pixel() as usize];
        if let Err(code) = driver.copy_image_mem(dev, mem, &mut raw) {
            self.hand_back(&claim, mem);
            return Err(code.into());
        }

        // The copy owns the pixels, so the buffer can go back to the driver
        // before the frame is assembled.
        self.hand_back(&claim, mem);
        let metadata = FrameMetadata::from_info(&info);
        let pixels = PixelData::from_raw(raw, width, height, mode)?;
        debug!(frame = metadata.frame_number, "frame acquired");
        Ok(ImageFrame { pixels, metadata })
    }

    /// Writes the device parameter set to `path` (driver-defined format).
    pub fn save_parameters(&self, path: impl AsRef<Path>) -> Result<()> {
        let claim = self.open_claim()?;
        Ok(claim.driver().save_parameters(claim.handle(), path.as_ref())?)
    }

    /// Restores a parameter set written by [`Camera::save_parameters`].
    pub fn load_parameters(&self, path: impl AsRef<Path>) -> Result<()> {
        let claim = self.open_claim()?;
        Ok(claim.driver().load_parameters(claim.handle(), path.as_ref())?)
    }

    /// Ends the session. Equivalent to dropping the camera; `close` only
    /// makes the point of release explicit.
    pub fn close(mut self) {
        self.teardown();
    }

    pub(crate) fn open_claim(&self) -> Result<&DeviceClaim> {
        self.claim
            .as_deref()
            .ok_or(UeyeError::NotReady(self.status))
    }

    pub(crate) fn ready_claim_arc(&self) -> Result<Arc<DeviceClaim>> {
        if self.status != CameraStatus::Ready {
            return Err(UeyeError::NotReady(self.status));
        }
        match &self.claim {
            Some(claim) => Ok(Arc::clone(claim)),
            None => Err(UeyeError::NotReady(self.status)),
        }
    }

    /// Provisions the standing buffer pool from the session geometry if it
    /// is not already up.
    pub(crate) fn ensure_pool(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let claim = self.ready_claim_arc()?;
        let pool = SequencePool::provision(
            claim.driver(),
            claim.handle(),
            self.width,
            self.height,
            self.color_mode.bits_per_pixel(),
            self.buffer_count,
        )?;
        debug!(buffers = pool.len(), "acquisition pool up");
        self.pool = Some(pool);
        Ok(())
    }

    /// New geometry invalidates the standing pool; the next acquisition
    /// reprovisions at the new size.
    pub(crate) fn apply_geometry(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.release_pool();
    }

    pub(crate) fn video_capturing(&self) -> bool {
        self.claim
            .as_deref()
            .is_some_and(|claim| claim.video_active().load(Ordering::Acquire))
    }

    fn hand_back(&mut self, claim: &DeviceClaim, mem: MemoryId) {
        if let Err(code) = claim.driver().unlock_buffer(claim.handle(), mem) {
            // The driver still holds the buffer, so the slot stays locked
            // in the pool and release() retries the unlock before freeing.
            warn!(%mem, %code, "failed to hand a buffer back to the driver");
            return;
        }
        if let Some(pool) = self.pool.as_mut() {
            pool.note_unlocked(mem);
        }
    }

    fn release_pool(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            if let Some(claim) = self.claim.as_deref() {
                pool.release(claim.driver(), claim.handle());
            }
        }
    }

    /// Best-effort teardown: pool, then queue, then (via the claim drop)
    /// the handle. Cleanup failures are logged and never stop the rest.
    fn teardown(&mut self) {
        let Some(claim) = self.claim.take() else {
            return;
        };
        {
            // Holding the acquisition lock keeps a still-running capture
            // thread from locking a buffer mid-release.
            let _acq = claim.lock_acquisition();
            if let Some(mut pool) = self.pool.take() {
                pool.release(claim.driver(), claim.handle());
            }
            if self.status == CameraStatus::Ready {
                if let Err(code) = claim.driver().exit_image_queue(claim.handle()) {
                    warn!(%code, "failed to shut down the image queue");
                }
            }
        }
        // The handle closes when the last claim owner drops; a recorder
        // still holding the claim keeps it open until it finishes.
        drop(claim);
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.teardown();
    }
}
