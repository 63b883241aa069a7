use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use ueye::driver::mock::MockDriver;
use ueye::{Camera, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ueye=info")),
        )
        .init();

    let driver = Arc::new(MockDriver::new());
    driver.set_auto_frames(true);

    let mut camera = Camera::new(driver.clone());
    camera.open(None)?;

    let mut recorder = camera.video_recorder()?;
    recorder.set_filename("clip.avi")?;
    recorder.set_frame_rate(30.0)?;
    recorder.start()?;
    println!("recording...");

    thread::sleep(Duration::from_millis(200));

    recorder.stop()?;
    println!(
        "captured {} frames into clip.avi",
        driver.avi_frames_written()
    );

    // Still capture works again once the recorder lets go of the buffers.
    let frame = camera.get_image()?;
    println!("follow-up still: {}", frame.describe());

    camera.close();
    Ok(())
}
