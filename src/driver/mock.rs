//! In-memory driver implementation.
//!
//! `MockDriver` models the driver-visible state of a small fleet of
//! devices: exclusive claims, the image queue, buffer/sequence bookkeeping
//! with lock semantics, scalar properties, and the AVI engine. The test
//! suites run entirely against it, and the demo binaries use it as a
//! simulation backend. Tests can script frame delivery with
//! [`MockDriver::queue_frame`], inject one-shot failures with
//! [`MockDriver::fail_next`], and audit buffer hygiene through the call
//! counters.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::common::DisplayMode;
use crate::device_info::{
    BayerPixel, CameraInfo, CameraType, DeviceEntry, SensorColorMode, SensorInfo,
};
use crate::driver::{DeviceHandle, Driver, DriverResult, ErrorCode, MemoryId, VideoHandle};
use crate::frame::{ImageInfo, Timestamp};
use crate::properties::{Aoi, GainChannel, GainQuery, Gains, WhiteBalanceMode};

/// Driver entry points that accept one-shot failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Open,
    CameraInfo,
    SensorInfo,
    InitQueue,
    ExitQueue,
    AllocMem,
    SetMem,
    AddToSequence,
    ClearSequence,
    FreeMem,
    Wait,
    ImageInfo,
    CopyMem,
    Unlock,
    SetGain,
    SetFrameRate,
    SetAoi,
    SetDisplayMode,
    AviInit,
    AviOpen,
    AviSetFrameRate,
}

/// Per-frame values a test scripts ahead of delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStamp {
    pub timestamp: Timestamp,
    pub frame_number: u64,
    pub io_status: u32,
}

impl FrameStamp {
    pub fn new(timestamp: Timestamp, frame_number: u64) -> Self {
        FrameStamp {
            timestamp,
            frame_number,
            io_status: 0,
        }
    }
}

/// One simulated attachable device: its identity, sensor, and model label.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub model: String,
    pub camera_info: CameraInfo,
    pub sensor_info: SensorInfo,
}

impl MockDevice {
    /// 1.3 MP monochrome module, the default device.
    pub fn mono() -> Self {
        MockDevice {
            model: "UI124xSE-M".into(),
            camera_info: CameraInfo {
                serial_number: "4102885308".into(),
                manufacturer: "IDS GmbH".into(),
                hw_version: "V2.10".into(),
                date: "01.06.2022".into(),
                id: 1,
                camera_type: CameraType::UsbSe,
            },
            sensor_info: SensorInfo {
                sensor_id: 0x22,
                sensor_name: "UI124xSE-M".into(),
                max_width: 1280,
                max_height: 1024,
                master_gain: true,
                red_gain: false,
                green_gain: false,
                blue_gain: false,
                global_shutter: true,
                pixel_size: 5.3,
                first_pixel_color: BayerPixel::Red,
                color_mode: SensorColorMode::Monochrome,
            },
        }
    }

    /// Bayer color variant of the same module.
    pub fn color() -> Self {
        let mut device = MockDevice::mono();
        device.model = "UI124xSE-C".into();
        device.sensor_info.sensor_name = "UI124xSE-C".into();
        device.sensor_info.sensor_id = 0x23;
        device.sensor_info.red_gain = true;
        device.sensor_info.green_gain = true;
        device.sensor_info.blue_gain = true;
        device.sensor_info.color_mode = SensorColorMode::Bayer;
        device
    }
}

#[derive(Debug)]
struct MockBuffer {
    width: u32,
    height: u32,
    bits_per_pixel: u32,
    locked: bool,
    in_sequence: bool,
    delivered: Option<FrameStamp>,
}

impl MockBuffer {
    fn byte_len(&self) -> usize {
        (self.width * self.height * self.bits_per_pixel / 8) as usize
    }
}

#[derive(Debug)]
struct MockSession {
    device: usize,
    queue_ready: bool,
    active_mem: Option<MemoryId>,
    buffers: HashMap<i32, MockBuffer>,
    sequence: Vec<MemoryId>,
    pending: VecDeque<FrameStamp>,
    frame_counter: u64,
    gains: Gains,
    auto_gain: bool,
    frame_rate: f64,
    pixel_clock: u32,
    exposure: f64,
    white_balance: WhiteBalanceMode,
    aoi: Aoi,
    display_mode: DisplayMode,
}

impl MockSession {
    fn new(device: usize, sensor: &SensorInfo) -> Self {
        MockSession {
            device,
            queue_ready: false,
            active_mem: None,
            buffers: HashMap::new(),
            sequence: Vec::new(),
            pending: VecDeque::new(),
            frame_counter: 0,
            gains: Gains {
                master: 0,
                red: 0,
                green: 0,
                blue: 0,
            },
            auto_gain: false,
            frame_rate: 10.0,
            pixel_clock: 24,
            exposure: 0.02,
            white_balance: WhiteBalanceMode::Disabled,
            aoi: Aoi::new(0, 0, sensor.max_width as i32, sensor.max_height as i32),
            display_mode: DisplayMode::Dib,
        }
    }

    /// First sequence member that exists and is not hardware-locked.
    fn next_free_slot(&self) -> Option<MemoryId> {
        self.sequence
            .iter()
            .copied()
            .find(|mem| self.buffers.get(&mem.0).is_some_and(|b| !b.locked))
    }

    fn sequence_len(&self) -> u32 {
        self.sequence
            .iter()
            .filter(|mem| self.buffers.contains_key(&mem.0))
            .count() as u32
    }

    fn locked_count(&self) -> u32 {
        self.buffers.values().filter(|b| b.locked).count() as u32
    }
}

#[derive(Debug)]
struct MockVideo {
    dev: DeviceHandle,
    file: Option<PathBuf>,
    frame_rate: f64,
    streaming: bool,
}

#[derive(Debug, Default)]
struct MockInner {
    devices: Vec<MockDevice>,
    sessions: HashMap<u32, MockSession>,
    next_handle: u32,
    videos: HashMap<i32, MockVideo>,
    next_video: i32,
    next_mem: i32,
    fail_next: HashMap<MockOp, ErrorCode>,
    auto_frames: bool,
    display_mode_history: Vec<DisplayMode>,
    saved_parameters: Vec<PathBuf>,
    loaded_parameters: Vec<PathBuf>,
}

/// Scriptable in-memory driver.
pub struct MockDriver {
    inner: Mutex<MockInner>,
    frames_available: Condvar,
    alloc_calls: AtomicUsize,
    free_calls: AtomicUsize,
    gain_set_calls: AtomicUsize,
    avi_frames: AtomicUsize,
    leaked_on_close: AtomicUsize,
}

impl Default for MockDriver {
    fn default() -> Self {
        MockDriver::new()
    }
}

impl MockDriver {
    /// One monochrome device attached.
    pub fn new() -> Self {
        MockDriver::with_devices(vec![MockDevice::mono()])
    }

    /// One Bayer color device attached.
    pub fn color() -> Self {
        MockDriver::with_devices(vec![MockDevice::color()])
    }

    pub fn with_devices(devices: Vec<MockDevice>) -> Self {
        MockDriver {
            inner: Mutex::new(MockInner {
                devices,
                next_handle: 1,
                next_video: 1,
                next_mem: 1,
                ..MockInner::default()
            }),
            frames_available: Condvar::new(),
            alloc_calls: AtomicUsize::new(0),
            free_calls: AtomicUsize::new(0),
            gain_set_calls: AtomicUsize::new(0),
            avi_frames: AtomicUsize::new(0),
            leaked_on_close: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next call of `op` fail with `code`. Consumed on use.
    pub fn fail_next(&self, op: MockOp, code: ErrorCode) {
        self.lock().fail_next.insert(op, code);
    }

    /// Scripts one frame for delivery on every open session's next wait.
    pub fn queue_frame(&self, stamp: FrameStamp) {
        {
            let mut inner = self.lock();
            for session in inner.sessions.values_mut() {
                session.pending.push_back(stamp);
            }
        }
        self.frames_available.notify_all();
    }

    /// When enabled, waits synthesize a live-stamped frame immediately
    /// instead of blocking for scripted ones.
    pub fn set_auto_frames(&self, enabled: bool) {
        self.lock().auto_frames = enabled;
        if enabled {
            self.frames_available.notify_all();
        }
    }

    // Audit accessors. The buffer counters make leak checks cheap: a
    // balanced allocate/free history leaves `outstanding_buffers` at zero.

    pub fn outstanding_buffers(&self) -> usize {
        self.lock().sessions.values().map(|s| s.buffers.len()).sum()
    }

    /// Buffers that were still allocated when their session closed.
    pub fn leaked_on_close(&self) -> usize {
        self.leaked_on_close.load(Ordering::Relaxed)
    }

    /// Buffers currently locked for hardware or caller use.
    pub fn locked_buffers(&self) -> usize {
        self.lock()
            .sessions
            .values()
            .map(|s| s.buffers.values().filter(|b| b.locked).count())
            .sum()
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn alloc_calls(&self) -> usize {
        self.alloc_calls.load(Ordering::Relaxed)
    }

    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::Relaxed)
    }

    /// Invocations of the hardware-gain setter, including rejected ones.
    pub fn gain_set_calls(&self) -> usize {
        self.gain_set_calls.load(Ordering::Relaxed)
    }

    pub fn avi_frames_written(&self) -> usize {
        self.avi_frames.load(Ordering::Relaxed)
    }

    /// Video engines allocated and not yet released.
    pub fn open_video_engines(&self) -> usize {
        self.lock().videos.len()
    }

    /// True when any open session has automatic gain control enabled.
    pub fn auto_gain_enabled(&self) -> bool {
        self.lock().sessions.values().any(|s| s.auto_gain)
    }

    /// Every display mode pushed through `set_display_mode`, in order.
    pub fn display_mode_history(&self) -> Vec<DisplayMode> {
        self.lock().display_mode_history.clone()
    }

    pub fn saved_parameter_files(&self) -> Vec<PathBuf> {
        self.lock().saved_parameters.clone()
    }

    pub fn loaded_parameter_files(&self) -> Vec<PathBuf> {
        self.lock().loaded_parameters.clone()
    }
}

fn take_fail(inner: &mut MockInner, op: MockOp) -> DriverResult<()> {
    match inner.fail_next.remove(&op) {
        Some(code) => Err(code),
        None => Ok(()),
    }
}

fn session_mut<'a>(
    inner: &'a mut MockInner,
    dev: DeviceHandle,
) -> DriverResult<&'a mut MockSession> {
    inner
        .sessions
        .get_mut(&dev.0)
        .ok_or(ErrorCode::INVALID_HANDLE)
}

impl Driver for MockDriver {
    fn device_count(&self) -> DriverResult<u32> {
        Ok(self.lock().devices.len() as u32)
    }

    fn device_list(&self) -> DriverResult<Vec<DeviceEntry>> {
        let inner = self.lock();
        Ok(inner
            .devices
            .iter()
            .enumerate()
            .map(|(i, device)| DeviceEntry {
                camera_id: device.camera_info.id,
                device_id: 1000 + i as u32,
                sensor_id: device.sensor_info.sensor_id as u32,
                in_use: inner.sessions.values().any(|s| s.device == i),
                serial_number: device.camera_info.serial_number.clone(),
                model: device.model.clone(),
                status: 0,
            })
            .collect())
    }

    fn open_device(&self, index: Option<u32>) -> DriverResult<DeviceHandle> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::Open)?;
        let claimed: Vec<usize> = inner.sessions.values().map(|s| s.device).collect();
        let device = match index {
            Some(i) => {
                let i = i as usize;
                if i >= inner.devices.len() || claimed.contains(&i) {
                    return Err(ErrorCode::CANT_OPEN_DEVICE);
                }
                i
            }
            None => (0..inner.devices.len())
                .find(|i| !claimed.contains(i))
                .ok_or(ErrorCode::CANT_OPEN_DEVICE)?,
        };
        let handle = inner.next_handle;
        inner.next_handle += 1;
        let session = MockSession::new(device, &inner.devices[device].sensor_info);
        inner.sessions.insert(handle, session);
        Ok(DeviceHandle(handle))
    }

    fn close_device(&self, dev: DeviceHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        let session = inner
            .sessions
            .remove(&dev.0)
            .ok_or(ErrorCode::INVALID_HANDLE)?;
        self.leaked_on_close
            .fetch_add(session.buffers.len(), Ordering::Relaxed);
        inner.videos.retain(|_, video| video.dev != dev);
        Ok(())
    }

    fn camera_info(&self, dev: DeviceHandle) -> DriverResult<CameraInfo> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::CameraInfo)?;
        let device = session_mut(&mut inner, dev)?.device;
        Ok(inner.devices[device].camera_info.clone())
    }

    fn sensor_info(&self, dev: DeviceHandle) -> DriverResult<SensorInfo> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SensorInfo)?;
        let device = session_mut(&mut inner, dev)?.device;
        Ok(inner.devices[device].sensor_info.clone())
    }

    fn init_image_queue(&self, dev: DeviceHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::InitQueue)?;
        session_mut(&mut inner, dev)?.queue_ready = true;
        Ok(())
    }

    fn exit_image_queue(&self, dev: DeviceHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::ExitQueue)?;
        let session = session_mut(&mut inner, dev)?;
        session.queue_ready = false;
        session.pending.clear();
        Ok(())
    }

    fn alloc_image_mem(
        &self,
        dev: DeviceHandle,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    ) -> DriverResult<MemoryId> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::AllocMem)?;
        if width == 0 || height == 0 || bits_per_pixel % 8 != 0 {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        let mem = MemoryId(inner.next_mem);
        inner.next_mem += 1;
        session_mut(&mut inner, dev)?.buffers.insert(
            mem.0,
            MockBuffer {
                width,
                height,
                bits_per_pixel,
                locked: false,
                in_sequence: false,
                delivered: None,
            },
        );
        self.alloc_calls.fetch_add(1, Ordering::Relaxed);
        Ok(mem)
    }

    fn set_image_mem(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SetMem)?;
        let session = session_mut(&mut inner, dev)?;
        if !session.buffers.contains_key(&mem.0) {
            return Err(ErrorCode::INVALID_MEMORY);
        }
        session.active_mem = Some(mem);
        Ok(())
    }

    fn add_to_sequence(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::AddToSequence)?;
        let session = session_mut(&mut inner, dev)?;
        let buffer = session
            .buffers
            .get_mut(&mem.0)
            .ok_or(ErrorCode::INVALID_MEMORY)?;
        if buffer.in_sequence {
            return Err(ErrorCode::NO_SUCCESS);
        }
        buffer.in_sequence = true;
        session.sequence.push(mem);
        Ok(())
    }

    fn clear_sequence(&self, dev: DeviceHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::ClearSequence)?;
        let session = session_mut(&mut inner, dev)?;
        for mem in std::mem::take(&mut session.sequence) {
            if let Some(buffer) = session.buffers.get_mut(&mem.0) {
                buffer.in_sequence = false;
            }
        }
        Ok(())
    }

    fn free_image_mem(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::FreeMem)?;
        let session = session_mut(&mut inner, dev)?;
        let buffer = session
            .buffers
            .get(&mem.0)
            .ok_or(ErrorCode::INVALID_MEMORY)?;
        if buffer.locked {
            return Err(ErrorCode::SEQUENCE_BUFFER_LOCKED);
        }
        session.buffers.remove(&mem.0);
        session.sequence.retain(|m| *m != mem);
        if session.active_mem == Some(mem) {
            session.active_mem = None;
        }
        self.free_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_for_next_image(
        &self,
        dev: DeviceHandle,
        timeout: Duration,
    ) -> DriverResult<MemoryId> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::Wait)?;
        loop {
            let auto_frames = inner.auto_frames;
            let session = session_mut(&mut inner, dev)?;
            if !session.queue_ready {
                return Err(ErrorCode::NO_SUCCESS);
            }
            if session.sequence_len() == 0 {
                return Err(ErrorCode::NO_ACTIVE_MEMORY);
            }
            if let Some(mem) = session.next_free_slot() {
                let stamp = session.pending.pop_front().or_else(|| {
                    auto_frames.then(|| FrameStamp {
                        timestamp: Timestamp::now(),
                        frame_number: session.frame_counter + 1,
                        io_status: 0,
                    })
                });
                if let Some(stamp) = stamp {
                    session.frame_counter = stamp.frame_number;
                    if let Some(buffer) = session.buffers.get_mut(&mem.0) {
                        buffer.locked = true;
                        buffer.delivered = Some(stamp);
                    }
                    return Ok(mem);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ErrorCode::TIMED_OUT);
            }
            let (guard, _) = self
                .frames_available
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
    }

    fn image_info(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<ImageInfo> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::ImageInfo)?;
        let session = session_mut(&mut inner, dev)?;
        let total = session.sequence_len();
        let in_use = session.locked_count();
        let width = session.aoi.width as u32;
        let height = session.aoi.height as u32;
        let buffer = session
            .buffers
            .get(&mem.0)
            .ok_or(ErrorCode::INVALID_MEMORY)?;
        let stamp = buffer.delivered.ok_or(ErrorCode::NO_SUCCESS)?;
        Ok(ImageInfo {
            timestamp: stamp.timestamp,
            io_status: stamp.io_status,
            frame_number: stamp.frame_number,
            buffers_total: total,
            buffers_in_use: in_use,
            width,
            height,
        })
    }

    fn copy_image_mem(
        &self,
        dev: DeviceHandle,
        mem: MemoryId,
        dst: &mut [u8],
    ) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::CopyMem)?;
        let session = session_mut(&mut inner, dev)?;
        let buffer = session
            .buffers
            .get(&mem.0)
            .ok_or(ErrorCode::INVALID_MEMORY)?;
        if dst.len() != buffer.byte_len() {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        let seed = buffer.delivered.map(|s| s.frame_number).unwrap_or(0);
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = ((i as u64 + seed) % 251) as u8;
        }
        Ok(())
    }

    fn unlock_buffer(&self, dev: DeviceHandle, mem: MemoryId) -> DriverResult<()> {
        {
            let mut inner = self.lock();
            take_fail(&mut inner, MockOp::Unlock)?;
            let session = session_mut(&mut inner, dev)?;
            let buffer = session
                .buffers
                .get_mut(&mem.0)
                .ok_or(ErrorCode::INVALID_MEMORY)?;
            if !buffer.locked {
                return Err(ErrorCode::NO_SUCCESS);
            }
            buffer.locked = false;
        }
        self.frames_available.notify_all();
        Ok(())
    }

    fn set_hardware_gain(
        &self,
        dev: DeviceHandle,
        master: Option<i32>,
        red: Option<i32>,
        green: Option<i32>,
        blue: Option<i32>,
    ) -> DriverResult<()> {
        self.gain_set_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SetGain)?;
        for value in [master, red, green, blue].into_iter().flatten() {
            if !(0..=100).contains(&value) {
                return Err(ErrorCode::INVALID_PARAMETER);
            }
        }
        let session = session_mut(&mut inner, dev)?;
        if let Some(value) = master {
            session.gains.master = value;
            session.auto_gain = false;
        }
        if let Some(value) = red {
            session.gains.red = value;
        }
        if let Some(value) = green {
            session.gains.green = value;
        }
        if let Some(value) = blue {
            session.gains.blue = value;
        }
        Ok(())
    }

    fn hardware_gain(
        &self,
        dev: DeviceHandle,
        channel: GainChannel,
        query: GainQuery,
    ) -> DriverResult<i32> {
        let mut inner = self.lock();
        let session = session_mut(&mut inner, dev)?;
        Ok(match query {
            GainQuery::Default => 0,
            GainQuery::Current => match channel {
                GainChannel::Master => session.gains.master,
                GainChannel::Red => session.gains.red,
                GainChannel::Green => session.gains.green,
                GainChannel::Blue => session.gains.blue,
            },
        })
    }

    fn set_auto_gain(&self, dev: DeviceHandle, enabled: bool) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?.auto_gain = enabled;
        Ok(())
    }

    fn set_frame_rate(&self, dev: DeviceHandle, fps: f64) -> DriverResult<f64> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SetFrameRate)?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        // The simulated device produces half-fps steps only.
        let actual = (fps * 2.0).round() / 2.0;
        session_mut(&mut inner, dev)?.frame_rate = actual;
        Ok(actual)
    }

    fn frame_rate(&self, dev: DeviceHandle) -> DriverResult<f64> {
        let mut inner = self.lock();
        Ok(session_mut(&mut inner, dev)?.frame_rate)
    }

    fn set_pixel_clock(&self, dev: DeviceHandle, mhz: u32) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?.pixel_clock = mhz;
        Ok(())
    }

    fn pixel_clock(&self, dev: DeviceHandle) -> DriverResult<u32> {
        let mut inner = self.lock();
        Ok(session_mut(&mut inner, dev)?.pixel_clock)
    }

    fn set_exposure(&self, dev: DeviceHandle, seconds: f64) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?.exposure = seconds;
        Ok(())
    }

    fn exposure(&self, dev: DeviceHandle) -> DriverResult<f64> {
        let mut inner = self.lock();
        Ok(session_mut(&mut inner, dev)?.exposure)
    }

    fn set_white_balance(&self, dev: DeviceHandle, mode: WhiteBalanceMode) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?.white_balance = mode;
        Ok(())
    }

    fn white_balance(&self, dev: DeviceHandle) -> DriverResult<WhiteBalanceMode> {
        let mut inner = self.lock();
        Ok(session_mut(&mut inner, dev)?.white_balance)
    }

    fn set_aoi(&self, dev: DeviceHandle, aoi: Aoi) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SetAoi)?;
        let device = session_mut(&mut inner, dev)?.device;
        let sensor = &inner.devices[device].sensor_info;
        let fits = aoi.x >= 0
            && aoi.y >= 0
            && aoi.width > 0
            && aoi.height > 0
            && aoi.x + aoi.width <= sensor.max_width as i32
            && aoi.y + aoi.height <= sensor.max_height as i32;
        if !fits {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        session_mut(&mut inner, dev)?.aoi = aoi;
        Ok(())
    }

    fn aoi(&self, dev: DeviceHandle) -> DriverResult<Aoi> {
        let mut inner = self.lock();
        Ok(session_mut(&mut inner, dev)?.aoi)
    }

    fn save_parameters(&self, dev: DeviceHandle, path: &Path) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?;
        inner.saved_parameters.push(path.to_path_buf());
        Ok(())
    }

    fn load_parameters(&self, dev: DeviceHandle, path: &Path) -> DriverResult<()> {
        let mut inner = self.lock();
        session_mut(&mut inner, dev)?;
        inner.loaded_parameters.push(path.to_path_buf());
        Ok(())
    }

    fn set_display_mode(&self, dev: DeviceHandle, mode: DisplayMode) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::SetDisplayMode)?;
        session_mut(&mut inner, dev)?.display_mode = mode;
        inner.display_mode_history.push(mode);
        Ok(())
    }

    fn avi_init(&self, dev: DeviceHandle) -> DriverResult<VideoHandle> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::AviInit)?;
        session_mut(&mut inner, dev)?;
        let id = inner.next_video;
        inner.next_video += 1;
        inner.videos.insert(
            id,
            MockVideo {
                dev,
                file: None,
                frame_rate: 25.0,
                streaming: false,
            },
        );
        Ok(VideoHandle(id))
    }

    fn avi_open(&self, video: VideoHandle, path: &Path) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::AviOpen)?;
        let entry = inner
            .videos
            .get_mut(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?;
        entry.file = Some(path.to_path_buf());
        entry.streaming = true;
        Ok(())
    }

    fn avi_set_frame_rate(&self, video: VideoHandle, fps: f64) -> DriverResult<()> {
        let mut inner = self.lock();
        take_fail(&mut inner, MockOp::AviSetFrameRate)?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ErrorCode::INVALID_PARAMETER);
        }
        inner
            .videos
            .get_mut(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?
            .frame_rate = fps;
        Ok(())
    }

    fn avi_add_frame(&self, video: VideoHandle, mem: MemoryId) -> DriverResult<()> {
        let mut inner = self.lock();
        let entry = inner
            .videos
            .get(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?;
        if entry.file.is_none() || !entry.streaming {
            return Err(ErrorCode::NO_SUCCESS);
        }
        let dev = entry.dev;
        let session = session_mut(&mut inner, dev)?;
        if !session.buffers.contains_key(&mem.0) {
            return Err(ErrorCode::INVALID_MEMORY);
        }
        self.avi_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn avi_stop(&self, video: VideoHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        inner
            .videos
            .get_mut(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?
            .streaming = false;
        Ok(())
    }

    fn avi_close(&self, video: VideoHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        inner
            .videos
            .get_mut(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?
            .file = None;
        Ok(())
    }

    fn avi_exit(&self, video: VideoHandle) -> DriverResult<()> {
        let mut inner = self.lock();
        inner
            .videos
            .remove(&video.0)
            .ok_or(ErrorCode::INVALID_PARAMETER)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_session(driver: &MockDriver) -> DeviceHandle {
        let dev = driver.open_device(None).unwrap();
        driver.init_image_queue(dev).unwrap();
        dev
    }

    fn registered_buffer(driver: &MockDriver, dev: DeviceHandle) -> MemoryId {
        let mem = driver.alloc_image_mem(dev, 64, 48, 8).unwrap();
        driver.set_image_mem(dev, mem).unwrap();
        driver.add_to_sequence(dev, mem).unwrap();
        mem
    }

    #[test]
    fn test_open_assigns_distinct_nonzero_handles() {
        let driver = MockDriver::with_devices(vec![MockDevice::mono(), MockDevice::mono()]);
        let first = driver.open_device(None).unwrap();
        let second = driver.open_device(None).unwrap();
        assert_ne!(first.0, 0);
        assert_ne!(first, second);
        assert_eq!(driver.open_sessions(), 2);
        assert!(driver.open_device(None).is_err());
    }

    #[test]
    fn test_device_list_tracks_claims() {
        let driver = MockDriver::new();
        assert!(!driver.device_list().unwrap()[0].in_use);
        let _dev = driver.open_device(None).unwrap();
        assert!(driver.device_list().unwrap()[0].in_use);
    }

    #[test]
    fn test_fail_next_fires_once() {
        let driver = MockDriver::new();
        driver.fail_next(MockOp::Open, ErrorCode::CANT_OPEN_DEVICE);
        assert_eq!(
            driver.open_device(None).unwrap_err(),
            ErrorCode::CANT_OPEN_DEVICE
        );
        assert!(driver.open_device(None).is_ok());
    }

    #[test]
    fn test_outstanding_buffers_balance() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let mem = registered_buffer(&driver, dev);
        assert_eq!(driver.outstanding_buffers(), 1);
        driver.free_image_mem(dev, mem).unwrap();
        assert_eq!(driver.outstanding_buffers(), 0);
        assert_eq!(driver.alloc_calls(), driver.free_calls());
    }

    #[test]
    fn test_locked_buffers_cannot_be_freed() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let mem = registered_buffer(&driver, dev);
        driver.queue_frame(FrameStamp::new(Timestamp::now(), 1));
        let locked = driver
            .wait_for_next_image(dev, Duration::from_millis(50))
            .unwrap();
        assert_eq!(locked, mem);
        assert_eq!(
            driver.free_image_mem(dev, mem).unwrap_err(),
            ErrorCode::SEQUENCE_BUFFER_LOCKED
        );
        driver.unlock_buffer(dev, mem).unwrap();
        driver.free_image_mem(dev, mem).unwrap();
    }

    #[test]
    fn test_wait_times_out_without_frames() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let _mem = registered_buffer(&driver, dev);
        let started = Instant::now();
        let err = driver
            .wait_for_next_image(dev, Duration::from_millis(40))
            .unwrap_err();
        assert_eq!(err, ErrorCode::TIMED_OUT);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_wait_without_sequence_reports_no_active_memory() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        assert_eq!(
            driver
                .wait_for_next_image(dev, Duration::from_millis(10))
                .unwrap_err(),
            ErrorCode::NO_ACTIVE_MEMORY
        );
    }

    #[test]
    fn test_auto_frames_deliver_immediately() {
        let driver = MockDriver::new();
        driver.set_auto_frames(true);
        let dev = ready_session(&driver);
        let mem = registered_buffer(&driver, dev);
        let got = driver
            .wait_for_next_image(dev, Duration::from_secs(5))
            .unwrap();
        assert_eq!(got, mem);
        let info = driver.image_info(dev, mem).unwrap();
        assert_eq!(info.frame_number, 1);
    }

    #[test]
    fn test_image_info_reports_pool_occupancy() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let first = registered_buffer(&driver, dev);
        let _second = registered_buffer(&driver, dev);
        driver.queue_frame(FrameStamp::new(Timestamp::new(2024, 1, 1, 12, 0, 0, 500), 42));
        let mem = driver
            .wait_for_next_image(dev, Duration::from_millis(50))
            .unwrap();
        assert_eq!(mem, first);
        let info = driver.image_info(dev, mem).unwrap();
        assert_eq!(info.frame_number, 42);
        assert_eq!(info.buffers_total, 2);
        assert_eq!(info.buffers_in_use, 1);
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 1024);
    }

    #[test]
    fn test_copy_checks_destination_size() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let mem = registered_buffer(&driver, dev);
        let mut wrong = vec![0u8; 10];
        assert_eq!(
            driver.copy_image_mem(dev, mem, &mut wrong).unwrap_err(),
            ErrorCode::INVALID_PARAMETER
        );
        let mut right = vec![0u8; 64 * 48];
        driver.copy_image_mem(dev, mem, &mut right).unwrap();
    }

    #[test]
    fn test_close_counts_leaked_buffers() {
        let driver = MockDriver::new();
        let dev = ready_session(&driver);
        let _mem = registered_buffer(&driver, dev);
        driver.close_device(dev).unwrap();
        assert_eq!(driver.leaked_on_close(), 1);
        assert_eq!(driver.open_sessions(), 0);
    }

    #[test]
    fn test_frame_rate_quantizes_to_half_steps() {
        let driver = MockDriver::new();
        let dev = driver.open_device(None).unwrap();
        let actual = driver.set_frame_rate(dev, 24.7).unwrap();
        assert_eq!(actual, 24.5);
        assert_eq!(driver.frame_rate(dev).unwrap(), 24.5);
    }

    #[test]
    fn test_aoi_rejects_rects_off_the_sensor() {
        let driver = MockDriver::new();
        let dev = driver.open_device(None).unwrap();
        assert_eq!(
            driver
                .set_aoi(dev, Aoi::new(1024, 0, 640, 480))
                .unwrap_err(),
            ErrorCode::INVALID_PARAMETER
        );
        driver.set_aoi(dev, Aoi::new(0, 0, 640, 480)).unwrap();
        assert_eq!(driver.aoi(dev).unwrap(), Aoi::new(0, 0, 640, 480));
    }
}
