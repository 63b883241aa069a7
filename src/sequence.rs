//! Standing pool of driver-registered acquisition buffers.

use tracing::{debug, warn};

use crate::driver::{DeviceHandle, Driver, ErrorCode, MemoryId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// In the capture sequence, available to receive a frame.
    Registered,
    /// Hardware or a caller holds the buffer; must be unlocked before free.
    Locked,
}

#[derive(Debug)]
struct BufferSlot {
    mem: MemoryId,
    state: SlotState,
}

/// Fixed set of image buffers registered with the driver's capture sequence.
///
/// Buffers are allocated once per geometry and cycle between the hardware
/// and the caller via lock/unlock; nothing is allocated or freed per frame.
#[derive(Debug, Default)]
pub(crate) struct SequencePool {
    slots: Vec<BufferSlot>,
}

impl SequencePool {
    /// Allocates, binds, and registers `count` buffers of the given geometry.
    /// A failure part-way through releases everything provisioned so far.
    pub(crate) fn provision(
        driver: &dyn Driver,
        dev: DeviceHandle,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
        count: u32,
    ) -> Result<Self> {
        let mut pool = SequencePool::default();
        for _ in 0..count {
            if let Err(err) = pool.provision_slot(driver, dev, width, height, bits_per_pixel) {
                pool.release(driver, dev);
                return Err(err);
            }
        }
        debug!(
            buffers = pool.slots.len(),
            width, height, bits_per_pixel, "capture sequence provisioned"
        );
        Ok(pool)
    }

    fn provision_slot(
        &mut self,
        driver: &dyn Driver,
        dev: DeviceHandle,
        width: u32,
        height: u32,
        bits_per_pixel: u32,
    ) -> Result<()> {
        let mem = driver.alloc_image_mem(dev, width, height, bits_per_pixel)?;
        if let Err(err) = driver.set_image_mem(dev, mem) {
            scrap(driver, dev, mem);
            return Err(err.into());
        }
        if let Err(err) = driver.add_to_sequence(dev, mem) {
            scrap(driver, dev, mem);
            return Err(err.into());
        }
        self.slots.push(BufferSlot {
            mem,
            state: SlotState::Registered,
        });
        Ok(())
    }

    /// Unlocks, frees, and deregisters every buffer.
    ///
    /// Teardown always runs to completion: each step's result is checked,
    /// failures are logged and the next step proceeds. Safe to call twice.
    pub(crate) fn release(&mut self, driver: &dyn Driver, dev: DeviceHandle) {
        if self.slots.is_empty() {
            return;
        }
        for slot in &self.slots {
            if slot.state == SlotState::Locked {
                if let Err(err) = driver.unlock_buffer(dev, slot.mem) {
                    warn!(mem = %slot.mem, code = %err, "failed to unlock buffer during release");
                }
            }
        }
        for slot in &self.slots {
            let mut freed = driver.free_image_mem(dev, slot.mem);
            if freed == Err(ErrorCode::SEQUENCE_BUFFER_LOCKED) {
                // The capture thread locks buffers without this pool
                // seeing it, so a free can land on a still-locked
                // buffer. Unlock and try once more.
                if driver.unlock_buffer(dev, slot.mem).is_ok() {
                    freed = driver.free_image_mem(dev, slot.mem);
                }
            }
            if let Err(err) = freed {
                warn!(mem = %slot.mem, code = %err, "failed to free buffer during release");
            }
        }
        // The driver sequence is all-or-nothing: cleared once, after the
        // last member buffer is gone.
        if let Err(err) = driver.clear_sequence(dev) {
            warn!(code = %err, "failed to clear the capture sequence");
        }
        self.slots.clear();
    }

    /// Records that the driver handed `mem` to the caller.
    pub(crate) fn note_locked(&mut self, mem: MemoryId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.mem == mem) {
            slot.state = SlotState::Locked;
        }
    }

    /// Records that `mem` went back to the driver's free pool.
    pub(crate) fn note_unlocked(&mut self, mem: MemoryId) {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.mem == mem) {
            slot.state = SlotState::Registered;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Frees a buffer that never made it into the pool.
fn scrap(driver: &dyn Driver, dev: DeviceHandle, mem: MemoryId) {
    if let Err(err) = driver.free_image_mem(dev, mem) {
        warn!(mem = %mem, code = %err, "failed to free buffer after provisioning error");
    }
}
