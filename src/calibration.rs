//! Blink calibration: component C. Drives the orb through on/off cycles,
//! estimates the camera-observed color, and validates that a stable,
//! spatially coherent blob exists before registering a new controller.
//!
//! Grounded on `psmove_tracker_enable_with_color`, `psmove_tracker_get_diff`,
//! `psmove_tracker_biggest_contour`, and `psmove_tracker_old_color_is_tracked`
//! (the quick-verify shortcut, §4.3.1). Per-cycle diagnostics are collected
//! into [`CalibrationReport`] instead of the original's HTML trace sink
//! (`psmove_html_trace_*`), which is out of scope per `spec.md` §1 — see
//! `SPEC_FULL.md` §4.3.

use image::GrayImage;

use crate::camera::Camera;
use crate::config::TrackerConfig;
use crate::controller::{ControllerHandle, ControllerRecord};
use crate::core::{Bgr, Frame, Hsv};
use crate::error::CalibrationError;
use crate::image_ops;
use crate::led::LedController;

/// Per-cycle diagnostics collected during a full blink calibration, so the
/// facade can log one structured event and tests can assert on *why*
/// calibration failed rather than just that it failed.
#[derive(Clone, Debug, Default)]
pub struct CalibrationReport {
    /// Blob area found in each blink cycle's filtered image.
    pub cycle_sizes: Vec<f64>,
    /// Distance (px) of each cycle's blob bounding-box top-left from cycle 0's.
    pub cycle_distances: Vec<f64>,
    /// True if the fused mask had fewer than `CALIB_MIN_SIZE` pixels (warning only).
    pub warn_small_blob: bool,
    /// True if the assigned and observed hues differ by more than the HSV
    /// filter's hue half-range (warning only).
    pub warn_hue_mismatch: bool,
    /// Number of blink cycles whose blob passed the size/displacement checks.
    pub valid_cycles: usize,
    /// Mean of `cycle_sizes`.
    pub size_mean: f64,
    /// Standard deviation of `cycle_sizes`.
    pub size_stddev: f64,
}

/// Outcome of a full calibration attempt: diagnostics plus either the
/// observed color pair or the fatal error that aborted it.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub report: CalibrationReport,
    pub result: Result<(Bgr, Hsv), CalibrationError>,
}

fn gray_of(frame: &Frame) -> GrayImage {
    image_ops::to_gray(frame)
}

fn prepare_diff(on: &Frame, off: &Frame, config: &TrackerConfig) -> GrayImage {
    let diff = image_ops::absdiff(&gray_of(on), &gray_of(off));
    let thresholded = image_ops::threshold(&diff, config.calibration_diff_t as u8);
    image_ops::erode_dilate(&thresholded)
}

/// Pumps a handful of frames while waiting `delay_ms` for the LED to settle,
/// discarding all but the last frame read — mirrors
/// `psmove_tracker_wait_for_frame`'s 10ms-step polling loop. Camera read
/// failures here are tolerated per spec §7 ("tolerated; loop continues"),
/// falling back to whatever frame was last successfully read.
async fn wait_for_frame(camera: &mut dyn Camera, delay_ms: u64) -> crate::error::AppResult<Frame> {
    let steps = (delay_ms / 10).max(1);
    let mut last = None;
    for _ in 0..steps {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if let Ok(frame) = camera.query_frame().await {
            last = Some(frame);
        }
    }
    match last {
        Some(frame) => Ok(frame),
        None => camera.query_frame().await,
    }
}

/// Runs the full `BLINKS`-cycle blink-differencing protocol (spec §4.3).
pub async fn run_full_calibration(
    camera: &mut dyn Camera,
    led: &mut dyn LedController,
    config: &TrackerConfig,
    assigned_rgb: (u8, u8, u8),
) -> crate::error::AppResult<CalibrationOutcome> {
    let (r, g, b) = assigned_rgb;
    let dim = config.dimming_factor;

    let mut on_frames = Vec::with_capacity(config.blinks);
    let mut diffs = Vec::with_capacity(config.blinks);

    for _ in 0..config.blinks {
        led.set_leds(r.saturating_mul(dim), g.saturating_mul(dim), b.saturating_mul(dim)).await?;
        let on = wait_for_frame(camera, config.blink_delay_ms).await?;

        led.set_leds(0, 0, 0).await?;
        let off = wait_for_frame(camera, config.blink_delay_ms).await?;

        diffs.push(prepare_diff(&on, &off, config));
        on_frames.push(on);
    }

    let mut fused = diffs[0].clone();
    for d in diffs.iter().skip(1) {
        fused = image_ops::and_masks(&fused, d);
    }

    let best_contour = image_ops::largest_contour(&diffs[0]);
    let mut mask = fused;
    if let Some(ref contour) = best_contour {
        image_ops::fill_only_contour(&mut mask, contour);
    } else {
        for px in mask.pixels_mut() {
            px.0[0] = 0;
        }
    }

    let mut report = CalibrationReport::default();
    report.warn_small_blob = image_ops::count_non_zero(&mask) < config.calib_min_size as usize;

    let (mb, mg, mr) = image_ops::mean_under_mask(&on_frames[0], &mask);
    let observed_bgr = Bgr::new(mb.round() as u8, mg.round() as u8, mr.round() as u8);
    let observed_hsv = image_ops::bgr_to_hsv_pixel(observed_bgr);
    let assigned_hsv = image_ops::bgr_to_hsv_pixel(Bgr::from_rgb(r, g, b));

    report.warn_hue_mismatch = (assigned_hsv.h - observed_hsv.h).abs() > config.hsv_range.h;

    let min = observed_hsv.minus(config.hsv_range);
    let max = observed_hsv.plus(config.hsv_range);

    let mut first_top_left: Option<(i64, i64)> = None;
    let mut valid_cycles = 0usize;

    for on in &on_frames {
        let filtered_raw = image_ops::in_range(on, min, max);
        let filtered = image_ops::erode_dilate(&filtered_raw);
        let contour = image_ops::largest_contour(&filtered);

        let (size, dist, ok_contour) = match contour {
            Some(c) => {
                let (bx, by, _, _) = image_ops::bounding_rect(&c.points);
                let top_left = first_top_left.get_or_insert((bx, by));
                let dx = (bx - top_left.0) as f64;
                let dy = (by - top_left.1) as f64;
                let dist = (dx * dx + dy * dy).sqrt();
                (c.area, dist, true)
            }
            None => (0.0, f64::MAX, false),
        };

        report.cycle_sizes.push(size);
        report.cycle_distances.push(dist);

        if ok_contour && size > config.calib_min_size && dist < config.calib_max_dist {
            valid_cycles += 1;
        }
    }
    report.valid_cycles = valid_cycles;

    let n = report.cycle_sizes.len() as f64;
    report.size_mean = report.cycle_sizes.iter().sum::<f64>() / n;
    let variance = report
        .cycle_sizes
        .iter()
        .map(|s| (s - report.size_mean).powi(2))
        .sum::<f64>()
        / n;
    report.size_stddev = variance.sqrt();

    if valid_cycles < config.blinks {
        let result = Err(CalibrationError::InconsistentBlobs { valid: valid_cycles, total: config.blinks });
        return Ok(CalibrationOutcome { report, result });
    }

    let limit = report.size_mean * config.calib_size_std_pct / 100.0;
    if report.size_stddev >= limit {
        let result = Err(CalibrationError::SizeDispersionTooHigh { stddev: report.size_stddev, limit });
        return Ok(CalibrationOutcome { report, result });
    }

    Ok(CalibrationOutcome { report, result: Ok((observed_bgr, observed_hsv)) })
}

/// Quick-verify shortcut (§4.3.1): if a previously persisted color exists,
/// run three consecutive per-frame updates with LED re-assertion between
/// them; skip full calibration if every update clears the tight thresholds.
pub async fn quick_verify(
    camera: &mut dyn Camera,
    led: &mut dyn LedController,
    pyramid: &[(u32, u32)],
    config: &TrackerConfig,
    assigned_rgb: (u8, u8, u8),
    persisted_hsv: Hsv,
    frame_w: u32,
    frame_h: u32,
) -> crate::error::AppResult<Option<ControllerRecord>> {
    const ATTEMPTS: usize = 3;
    const SETTLE_STEPS: u32 = 10;
    const Q1_T: f64 = 0.83;
    const Q3_T: f64 = 8.0;

    // Only the HSV value was persisted; reconstruct an approximate BGR
    // sample so the revert-on-drift path (tracking::update_controller) has
    // a usable target if adaptation later overruns.
    let persisted_bgr = image_ops::hsv_to_bgr_pixel(persisted_hsv);
    let mut rec = ControllerRecord::new_calibrated(
        ControllerHandle(0),
        assigned_rgb,
        persisted_bgr,
        persisted_hsv,
        frame_w,
        frame_h,
        pyramid[0].0,
        pyramid[0].1,
    );

    let (r, g, b) = assigned_rgb;
    let dim = config.dimming_factor;

    for _ in 0..ATTEMPTS {
        for _ in 0..SETTLE_STEPS {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            led.set_leds(r.saturating_mul(dim), g.saturating_mul(dim), b.saturating_mul(dim)).await?;
        }
        let frame = camera.query_frame().await?;
        let found = crate::tracking::update_controller(&mut rec, &frame, pyramid, config, 0.0, 0);
        if !found || rec.q1 <= Q1_T || rec.q3 <= Q3_T {
            return Ok(None);
        }
    }

    Ok(Some(rec))
}
