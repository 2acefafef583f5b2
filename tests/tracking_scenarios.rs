//! Black-box end-to-end scenarios for the tracker facade, built against a
//! scripted fake camera and LED pair. No GUI, no real hardware: each test
//! scripts exactly the frames the facade will pull and asserts on what a
//! caller sees through the public API alone.

use orb_tracker::camera::MockCamera;
use orb_tracker::config::TrackerConfig;
use orb_tracker::core::{Bgr, Frame};
use orb_tracker::led::MockLedController;
use orb_tracker::persistence::InMemoryColorStore;
use orb_tracker::{ControllerHandle, Status, Tracker};

const W: u32 = 640;
const H: u32 = 480;

fn disk_frame(cx: i64, cy: i64, radius: i64, fg: Bgr, bg: Bgr) -> Frame {
    let mut data = Vec::with_capacity((W * H * 3) as usize);
    for y in 0..H as i64 {
        for x in 0..W as i64 {
            let c = if (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius { fg } else { bg };
            data.push(c.b);
            data.push(c.g);
            data.push(c.r);
        }
    }
    Frame::new(W, H, data)
}

const MAGENTA: Bgr = Bgr { b: 255, g: 0, r: 255 };
const BLACK: Bgr = Bgr { b: 0, g: 0, r: 0 };

/// Steps a single `wait_for_frame` call burns through with the default
/// `blink_delay_ms` (50ms / 10ms-per-step).
const SETTLE_STEPS: usize = 5;

/// Builds the frame sequence `run_full_calibration` consumes for one blink
/// cycle per `(on_frame, off_frame)` pair: every settle step within a phase
/// sees the same frame, since only the phase's last frame is ever kept.
fn blink_cycle(on_frame: Frame, off_frame: Frame) -> Vec<Frame> {
    let mut v = Vec::with_capacity(SETTLE_STEPS * 2);
    v.extend(std::iter::repeat(on_frame).take(SETTLE_STEPS));
    v.extend(std::iter::repeat(off_frame).take(SETTLE_STEPS));
    v
}

fn happy_calibration_script() -> Vec<Frame> {
    let mut script = vec![Frame::blank(W, H)]; // probe frame read by Tracker::new
    for _ in 0..4 {
        script.extend(blink_cycle(disk_frame(320, 240, 30, MAGENTA, BLACK), disk_frame(320, 240, 0, BLACK, BLACK)));
    }
    script
}

async fn tracker_with_script(script: Vec<Frame>) -> Tracker {
    let mut cam = MockCamera::new(W, H);
    cam.set_script(script);
    Tracker::new(
        Box::new(cam),
        Box::new(MockLedController::new()),
        Box::new(InMemoryColorStore::new()),
        TrackerConfig::default(),
        "backup.ini",
        "intrinsics.xml",
        "distortion.xml",
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn happy_calibration_then_accurate_track() {
    let mut script = happy_calibration_script();
    script.push(disk_frame(320, 240, 30, MAGENTA, BLACK));
    let mut tracker = tracker_with_script(script).await;

    let handle = ControllerHandle(1);
    let status = tracker.enable_with_color(handle, 0xff, 0x00, 0xff).await.unwrap();
    assert_eq!(status, Status::Calibrated);

    tracker.update_image().await.unwrap();
    tracker.update(Some(handle)).await.unwrap();

    let (x, y, r) = tracker.get_position(handle).unwrap();
    assert!((x - 320.0).abs() <= 1.0, "x = {x}");
    assert!((y - 240.0).abs() <= 1.0, "y = {y}");
    assert!((r - 30.0).abs() <= 2.0, "r = {r}");
    assert_eq!(tracker.status(handle), Status::Tracking);
}

#[tokio::test]
async fn size_dispersion_reject() {
    let mut script = vec![Frame::blank(W, H)];
    for radius in [10, 30, 10, 30] {
        script.extend(blink_cycle(
            disk_frame(320, 240, radius, MAGENTA, BLACK),
            disk_frame(320, 240, 0, BLACK, BLACK),
        ));
    }
    let mut tracker = tracker_with_script(script).await;

    let err = tracker.enable_with_color(ControllerHandle(1), 0xff, 0x00, 0xff).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn displacement_reject() {
    let mut script = vec![Frame::blank(W, H)];
    for (cx, cy) in [(100i64, 100i64), (200, 100), (100, 100), (100, 100)] {
        script.extend(blink_cycle(disk_frame(cx, cy, 30, MAGENTA, BLACK), disk_frame(cx, cy, 0, BLACK, BLACK)));
    }
    let mut tracker = tracker_with_script(script).await;

    let err = tracker.enable_with_color(ControllerHandle(1), 0xff, 0x00, 0xff).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn palette_exhaustion_after_three_successful_enables() {
    let mut script = vec![Frame::blank(W, H)];
    for _ in 0..3 {
        for _ in 0..4 {
            script.extend(blink_cycle(disk_frame(320, 240, 30, MAGENTA, BLACK), disk_frame(320, 240, 0, BLACK, BLACK)));
        }
    }
    let mut tracker = tracker_with_script(script).await;

    for i in 0..3u32 {
        let status = tracker.enable(ControllerHandle(i)).await.unwrap();
        assert_eq!(status, Status::Calibrated);
    }

    let fourth = tracker.enable(ControllerHandle(99)).await;
    assert!(fourth.is_err());
}

#[tokio::test]
async fn disable_then_enable_round_trips_the_freed_color() {
    let mut script = happy_calibration_script();
    for _ in 0..4 {
        script.extend(blink_cycle(disk_frame(320, 240, 30, MAGENTA, BLACK), disk_frame(320, 240, 0, BLACK, BLACK)));
    }
    let mut tracker = tracker_with_script(script).await;

    let handle = ControllerHandle(7);
    tracker.enable_with_color(handle, 0xff, 0x00, 0xff).await.unwrap();
    assert_eq!(tracker.get_color(handle), Some((0xff, 0x00, 0xff)));

    assert!(tracker.disable(handle));
    assert_eq!(tracker.status(handle), Status::NotCalibrated);

    let status = tracker.enable_with_color(ControllerHandle(8), 0xff, 0x00, 0xff).await.unwrap();
    assert_eq!(status, Status::Calibrated);
}

#[tokio::test]
async fn quadrant_fallback_recovers_after_a_teleport() {
    let mut script = happy_calibration_script();
    // One in-place tracking frame to commit a confident track at (320,240)...
    script.push(disk_frame(320, 240, 30, MAGENTA, BLACK));
    // ...then the blob teleports into the top-left quadrant. MockCamera
    // holds this last frame for every subsequent `query_frame` call, so the
    // two updates below both see the teleported blob.
    script.push(disk_frame(20, 20, 30, MAGENTA, BLACK));
    let mut tracker = tracker_with_script(script).await;

    let handle = ControllerHandle(1);
    tracker.enable_with_color(handle, 0xff, 0x00, 0xff).await.unwrap();

    tracker.update_image().await.unwrap();
    tracker.update(Some(handle)).await.unwrap();
    assert_eq!(tracker.status(handle), Status::Tracking);

    // First update after the teleport: escalates through ROI levels looking
    // near the old position, finds nothing, and falls back to quadrant 0.
    tracker.update_image().await.unwrap();
    tracker.update(Some(handle)).await.unwrap();
    assert_eq!(tracker.status(handle), Status::Calibrated);

    // Second update: quadrant 0 covers the teleported blob's new position.
    tracker.update_image().await.unwrap();
    tracker.update(Some(handle)).await.unwrap();
    assert_eq!(tracker.status(handle), Status::Tracking);
}
