//! Property controls: validation gates in front of the driver, round-trips.

use std::sync::Arc;

use ueye::driver::mock::MockDriver;
use ueye::{Aoi, Camera, ErrorCode, GainChannel, GainValue, Gains, UeyeError, WhiteBalanceMode};

fn ready_camera() -> (Arc<MockDriver>, Camera) {
    let driver = Arc::new(MockDriver::new());
    let mut camera = Camera::new(driver.clone());
    camera.open(None).unwrap();
    (driver, camera)
}

#[test]
fn test_gain_round_trip_within_range() {
    let (_driver, camera) = ready_camera();
    for g in [0, 1, 50, 99, 100] {
        camera.set_master_gain(GainValue::Manual(g)).unwrap();
        let got = camera.master_gain().unwrap();
        assert!((0..=100).contains(&got));
        assert_eq!(got, g);
    }
}

#[test]
fn test_out_of_range_gain_never_reaches_the_driver() {
    let (driver, camera) = ready_camera();
    for g in [-1, 101, i32::MIN, i32::MAX] {
        assert!(matches!(
            camera.set_master_gain(GainValue::Manual(g)),
            Err(UeyeError::Validation(_))
        ));
        assert!(matches!(
            camera.set_red_gain(g),
            Err(UeyeError::Validation(_))
        ));
        assert!(matches!(
            camera.set_blue_gain(g),
            Err(UeyeError::Validation(_))
        ));
    }
    assert_eq!(driver.gain_set_calls(), 0);
}

#[test]
fn test_auto_master_gain_maps_to_the_auto_command() {
    let (driver, camera) = ready_camera();
    camera.set_master_gain(GainValue::Auto).unwrap();
    assert!(driver.auto_gain_enabled());
    assert_eq!(driver.gain_set_calls(), 0);
    // A manual master value turns automatic control back off.
    camera.set_master_gain(GainValue::Manual(10)).unwrap();
    assert!(!driver.auto_gain_enabled());
    assert_eq!(driver.gain_set_calls(), 1);
}

#[test]
fn test_gain_value_parses_the_auto_literal_only() {
    assert_eq!("auto".parse::<GainValue>().unwrap(), GainValue::Auto);
    assert_eq!("55".parse::<GainValue>().unwrap(), GainValue::Manual(55));
    assert!("Auto".parse::<GainValue>().is_err());
    assert!("bright".parse::<GainValue>().is_err());
    assert!("".parse::<GainValue>().is_err());
}

#[test]
fn test_gains_bundle_reads_every_channel() {
    let (_driver, camera) = ready_camera();
    camera.set_master_gain(GainValue::Manual(40)).unwrap();
    camera.set_red_gain(10).unwrap();
    camera.set_green_gain(20).unwrap();
    camera.set_blue_gain(30).unwrap();
    assert_eq!(
        camera.gains().unwrap(),
        Gains {
            master: 40,
            red: 10,
            green: 20,
            blue: 30,
        }
    );
    assert_eq!(camera.gain(GainChannel::Green).unwrap(), 20);
}

#[test]
fn test_default_gain_is_a_separate_query() {
    let (_driver, camera) = ready_camera();
    camera.set_master_gain(GainValue::Manual(75)).unwrap();
    assert_eq!(camera.master_gain().unwrap(), 75);
    assert_eq!(camera.default_gain(GainChannel::Master).unwrap(), 0);
}

#[test]
fn test_frame_rate_returns_what_the_device_chose() {
    let (_driver, camera) = ready_camera();
    let actual = camera.set_frame_rate(24.7).unwrap();
    assert_eq!(actual, 24.5);
    assert_eq!(camera.frame_rate().unwrap(), 24.5);
}

#[test]
fn test_non_finite_scalars_are_rejected_locally() {
    let (_driver, camera) = ready_camera();
    assert!(matches!(
        camera.set_frame_rate(f64::NAN),
        Err(UeyeError::Validation(_))
    ));
    assert!(matches!(
        camera.set_exposure(f64::INFINITY),
        Err(UeyeError::Validation(_))
    ));
}

#[test]
fn test_exposure_and_pixel_clock_pass_through() {
    let (_driver, camera) = ready_camera();
    camera.set_exposure(0.0125).unwrap();
    assert_eq!(camera.exposure().unwrap(), 0.0125);
    camera.set_pixel_clock(30).unwrap();
    assert_eq!(camera.pixel_clock().unwrap(), 30);
}

#[test]
fn test_white_balance_modes_round_trip() {
    let (_driver, camera) = ready_camera();
    for mode in [
        WhiteBalanceMode::Disabled,
        WhiteBalanceMode::GreyWorld,
        WhiteBalanceMode::ColorTemperature,
    ] {
        camera.set_white_balance(mode).unwrap();
        assert_eq!(camera.white_balance().unwrap(), mode);
    }
}

#[test]
fn test_aoi_round_trip_is_exact() {
    let (_driver, mut camera) = ready_camera();
    let aoi = Aoi::new(16, 32, 640, 480);
    camera.set_aoi(aoi).unwrap();
    assert_eq!(camera.aoi().unwrap(), aoi);
    assert_eq!(camera.width(), 640);
    assert_eq!(camera.height(), 480);
}

#[test]
fn test_invalid_aoi_is_surfaced_verbatim_and_changes_nothing() {
    let (_driver, mut camera) = ready_camera();
    let err = camera.set_aoi(Aoi::new(1200, 1000, 640, 480)).unwrap_err();
    assert!(err.is_code(ErrorCode::INVALID_PARAMETER));
    assert_eq!(camera.width(), 1280);
    assert_eq!(camera.height(), 1024);
    assert_eq!(camera.aoi().unwrap(), Aoi::new(0, 0, 1280, 1024));
}

#[test]
fn test_aoi_change_reprovisions_buffers_at_the_new_size() {
    let (driver, mut camera) = ready_camera();
    driver.set_auto_frames(true);
    camera.get_image().unwrap();
    assert_eq!(driver.outstanding_buffers(), 3);

    camera.set_aoi(Aoi::new(0, 0, 640, 480)).unwrap();
    assert_eq!(driver.outstanding_buffers(), 0);

    let frame = camera.get_image().unwrap();
    assert_eq!(driver.outstanding_buffers(), 3);
    assert_eq!(frame.pixels.width(), 640);
    assert_eq!(frame.pixels.height(), 480);
    assert_eq!(driver.leaked_on_close(), 0);
}

#[test]
fn test_properties_require_an_open_session() {
    let camera = Camera::new(Arc::new(MockDriver::new()));
    assert!(matches!(camera.master_gain(), Err(UeyeError::NotReady(_))));
    assert!(matches!(camera.frame_rate(), Err(UeyeError::NotReady(_))));
    assert!(matches!(camera.aoi(), Err(UeyeError::NotReady(_))));
}

#[test]
fn test_gain_validation_precedes_the_session_check() {
    // Every channel rejects a bad value the same way, open or not.
    let camera = Camera::new(Arc::new(MockDriver::new()));
    assert!(matches!(
        camera.set_master_gain(GainValue::Manual(101)),
        Err(UeyeError::Validation(_))
    ));
    assert!(matches!(
        camera.set_red_gain(101),
        Err(UeyeError::Validation(_))
    ));
    assert!(matches!(
        camera.set_green_gain(-1),
        Err(UeyeError::Validation(_))
    ));
    assert!(matches!(
        camera.set_blue_gain(-1),
        Err(UeyeError::Validation(_))
    ));
    // A value that passes validation still needs the session.
    assert!(matches!(
        camera.set_master_gain(GainValue::Auto),
        Err(UeyeError::NotReady(_))
    ));
}
