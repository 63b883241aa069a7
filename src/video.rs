//! Video recording into a driver-managed AVI container.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::camera::{Camera, DeviceClaim};
use crate::common::DisplayMode;
use crate::driver::{ErrorCode, VideoHandle};
use crate::error::{Result, UeyeError};

/// Encoder frame rate used until the caller overrides it.
pub const DEFAULT_VIDEO_FRAME_RATE: f64 = 25.0;

impl Camera {
    /// Allocates the driver's video engine and binds it to this session.
    ///
    /// The standing buffer pool is provisioned here so the capture thread
    /// has buffers from its first wait, and the acquisition timeout in
    /// force now governs that thread's waits. The recorder shares the
    /// device claim, so the handle stays open as long as either lives.
    pub fn video_recorder(&mut self) -> Result<VideoRecorder> {
        self.ensure_pool()?;
        let claim = self.ready_claim_arc()?;
        let video = claim.driver().avi_init(claim.handle())?;
        debug!(%video, "video engine allocated");
        Ok(VideoRecorder {
            claim,
            video,
            frame_rate: DEFAULT_VIDEO_FRAME_RATE,
            filename: None,
            capturing: Arc::new(AtomicBool::new(false)),
            worker: None,
            timeout: self.timeout(),
        })
    }
}

/// Records frames into an AVI container on a dedicated capture thread.
///
/// `start()` returns once the container is open and the thread is running;
/// `stop()` joins the thread before closing the container, so no frames are
/// captured after it returns. The engine is reusable: stop always returns
/// the recorder to idle, and another `start()` may follow.
pub struct VideoRecorder {
    claim: Arc<DeviceClaim>,
    video: VideoHandle,
    frame_rate: f64,
    filename: Option<PathBuf>,
    capturing: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl VideoRecorder {
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Encoder frame rate. Locked while capturing.
    pub fn set_frame_rate(&mut self, fps: f64) -> Result<()> {
        if self.is_capturing() {
            return Err(UeyeError::Validation(
                "cannot change the frame rate while capturing".into(),
            ));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(UeyeError::Validation(format!(
                "frame rate must be a positive number, got {fps}"
            )));
        }
        self.frame_rate = fps;
        Ok(())
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Destination file. Locked while capturing.
    pub fn set_filename(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.is_capturing() {
            return Err(UeyeError::Validation(
                "cannot change the destination file while capturing".into(),
            ));
        }
        self.filename = Some(path.into());
        Ok(())
    }

    /// Opens the container and starts the capture thread.
    ///
    /// Requires a destination file and an idle recorder. Forces the DIB
    /// display mode the video engine needs, which is a device-wide side
    /// effect on any concurrent live view. Returns as soon as
    /// initialization succeeds; frames then accumulate until [`stop`].
    ///
    /// [`stop`]: VideoRecorder::stop
    pub fn start(&mut self) -> Result<()> {
        if self.is_capturing() {
            return Err(UeyeError::Validation(
                "recorder is already capturing".into(),
            ));
        }
        let path = self
            .filename
            .clone()
            .ok_or_else(|| UeyeError::Validation("no destination file set".into()))?;
        if self
            .claim
            .video_active()
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UeyeError::Validation(
                "another recorder is already capturing on this session".into(),
            ));
        }
        let driver = self.claim.driver();
        let dev = self.claim.handle();
        if let Err(code) = driver.set_display_mode(dev, DisplayMode::Dib) {
            self.claim.video_active().store(false, Ordering::Release);
            return Err(code.into());
        }
        // Device-wide side effect: any concurrent live view is now DIB.
        warn!("video capture forced the display mode to DIB");
        if let Err(code) = driver.avi_open(self.video, &path) {
            self.claim.video_active().store(false, Ordering::Release);
            return Err(code.into());
        }
        if let Err(code) = driver.avi_set_frame_rate(self.video, self.frame_rate) {
            if let Err(close_code) = driver.avi_close(self.video) {
                warn!(code = %close_code, "failed to close the video container");
            }
            self.claim.video_active().store(false, Ordering::Release);
            return Err(code.into());
        }

        self.capturing.store(true, Ordering::Release);
        let claim = Arc::clone(&self.claim);
        let capturing = Arc::clone(&self.capturing);
        let video = self.video;
        let timeout = self.timeout;
        self.worker = Some(std::thread::spawn(move || {
            capture_loop(&claim, &capturing, video, timeout);
        }));
        info!(file = %path.display(), fps = self.frame_rate, "video capture started");
        Ok(())
    }

    /// Stops capture, joins the capture thread, then stops the stream and
    /// closes the file.
    ///
    /// Teardown is best-effort: a failing step is logged and the next one
    /// still runs. Calling `stop` on an idle recorder is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if !self.capturing.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("capture thread panicked");
            }
        }
        let driver = self.claim.driver();
        if let Err(code) = driver.avi_stop(self.video) {
            warn!(%code, "failed to stop the video stream");
        }
        if let Err(code) = driver.avi_close(self.video) {
            warn!(%code, "failed to close the video container");
        }
        self.claim.video_active().store(false, Ordering::Release);
        info!("video capture stopped");
        Ok(())
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        // stop() logs its own cleanup failures and never errs when idle.
        let _ = self.stop();
        if let Err(code) = self.claim.driver().avi_exit(self.video) {
            warn!(%code, "failed to release the video engine");
        }
    }
}

fn capture_loop(
    claim: &DeviceClaim,
    capturing: &AtomicBool,
    video: VideoHandle,
    timeout: Duration,
) {
    let driver = claim.driver();
    let dev = claim.handle();
    while capturing.load(Ordering::Acquire) {
        let _acq = claim.lock_acquisition();
        match driver.wait_for_next_image(dev, timeout) {
            Ok(mem) => {
                if let Err(code) = driver.avi_add_frame(video, mem) {
                    warn!(%code, "failed to append a frame to the container");
                }
                if let Err(code) = driver.unlock_buffer(dev, mem) {
                    warn!(%mem, %code, "failed to hand a buffer back to the driver");
                }
            }
            Err(code) if code == ErrorCode::TIMED_OUT => continue,
            Err(code) => {
                warn!(%code, "capture loop stopped on driver error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;

    fn ready_camera() -> (Arc<MockDriver>, Camera) {
        let driver = Arc::new(MockDriver::new());
        let mut camera = Camera::new(driver.clone());
        camera.open(None).unwrap();
        (driver, camera)
    }

    #[test]
    fn test_recorder_requires_a_ready_session() {
        let driver = Arc::new(MockDriver::new());
        let mut camera = Camera::new(driver);
        assert!(matches!(
            camera.video_recorder(),
            Err(UeyeError::NotReady(_))
        ));
    }

    #[test]
    fn test_start_requires_a_filename() {
        let (_driver, mut camera) = ready_camera();
        let mut recorder = camera.video_recorder().unwrap();
        assert!(matches!(recorder.start(), Err(UeyeError::Validation(_))));
        assert!(!recorder.is_capturing());
    }

    #[test]
    fn test_start_capture_stop_round_trip() {
        let (driver, mut camera) = ready_camera();
        driver.set_auto_frames(true);
        let mut recorder = camera.video_recorder().unwrap();
        recorder.set_filename("/tmp/out.avi").unwrap();
        recorder.start().unwrap();
        assert!(recorder.is_capturing());
        std::thread::sleep(Duration::from_millis(50));
        recorder.stop().unwrap();
        assert!(!recorder.is_capturing());
        assert!(driver.avi_frames_written() > 0);
        assert_eq!(driver.display_mode_history(), vec![DisplayMode::Dib]);
        // Nothing is appended once stop has returned.
        let after_stop = driver.avi_frames_written();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(driver.avi_frames_written(), after_stop);
    }

    #[test]
    fn test_mutation_is_locked_while_capturing() {
        let (driver, mut camera) = ready_camera();
        driver.set_auto_frames(true);
        let mut recorder = camera.video_recorder().unwrap();
        recorder.set_filename("/tmp/out.avi").unwrap();
        recorder.set_frame_rate(30.0).unwrap();
        recorder.start().unwrap();
        assert!(matches!(
            recorder.set_frame_rate(24.0),
            Err(UeyeError::Validation(_))
        ));
        assert!(matches!(
            recorder.set_filename("/tmp/other.avi"),
            Err(UeyeError::Validation(_))
        ));
        recorder.stop().unwrap();
        recorder.set_frame_rate(24.0).unwrap();
        recorder.set_filename("/tmp/other.avi").unwrap();
    }

    #[test]
    fn test_frame_rate_must_be_positive_and_finite() {
        let (_driver, mut camera) = ready_camera();
        let mut recorder = camera.video_recorder().unwrap();
        assert!(recorder.set_frame_rate(f64::NAN).is_err());
        assert!(recorder.set_frame_rate(0.0).is_err());
        assert!(recorder.set_frame_rate(-5.0).is_err());
        recorder.set_frame_rate(60.0).unwrap();
        assert_eq!(recorder.frame_rate(), 60.0);
    }

    #[test]
    fn test_second_start_is_rejected_until_stop() {
        let (driver, mut camera) = ready_camera();
        driver.set_auto_frames(true);
        let mut recorder = camera.video_recorder().unwrap();
        recorder.set_filename("/tmp/out.avi").unwrap();
        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(UeyeError::Validation(_))));
        recorder.stop().unwrap();
        recorder.start().unwrap();
        recorder.stop().unwrap();
    }

    #[test]
    fn test_stop_when_idle_is_a_no_op() {
        let (_driver, mut camera) = ready_camera();
        let mut recorder = camera.video_recorder().unwrap();
        recorder.stop().unwrap();
        recorder.stop().unwrap();
    }

    #[test]
    fn test_drop_releases_the_engine_even_while_capturing() {
        let (driver, mut camera) = ready_camera();
        driver.set_auto_frames(true);
        {
            let mut recorder = camera.video_recorder().unwrap();
            recorder.set_filename("/tmp/out.avi").unwrap();
            recorder.start().unwrap();
        }
        assert_eq!(driver.open_video_engines(), 0);
        assert!(!camera.video_capturing());
    }
}
