use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ueye::driver::mock::MockDriver;
use ueye::{Camera, Result, available_devices};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ueye=debug")),
        )
        .init();

    // A simulated camera stands in for real hardware; any `Driver`
    // implementation slots in the same way.
    let driver = Arc::new(MockDriver::new());
    driver.set_auto_frames(true);

    for entry in available_devices(driver.as_ref())? {
        println!(
            "device {}: {} (serial {}, in use: {})",
            entry.device_id, entry.model, entry.serial_number, entry.in_use
        );
    }

    let mut camera = Camera::new(driver.clone());
    camera.open(None)?;
    println!(
        "opened: {} at {}x{} ({:?})",
        camera.status(),
        camera.width(),
        camera.height(),
        camera.color_mode()
    );

    let mut last = None;
    for _ in 0..5 {
        let frame = camera.get_image()?;
        println!("got {}", frame.describe());
        last = Some(frame);
    }

    // Dump the last frame to disk so there is something to look at.
    if let Some(frame) = last {
        let (w, h) = (frame.pixels.width() as u32, frame.pixels.height() as u32);
        let png = image::GrayImage::from_raw(w, h, frame.pixels.as_bytes().to_vec()).unwrap();
        png.save("live_capture.png").unwrap();
        println!("wrote live_capture.png ({w}x{h})");
    }

    camera.close();
    Ok(())
}
