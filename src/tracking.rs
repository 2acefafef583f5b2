//! Per-frame update: component D. A single bounded pass over the ROI
//! pyramid that locates the orb, fits a circle, smooths the estimate, and
//! optionally adapts the learned color.
//!
//! Grounded directly on `psmove_tracker_update_controller` and
//! `psmove_tracker_center_roi_on_controller`. The escalation/commit control
//! flow below mirrors the original's `while (1)` loop line for line,
//! including the subtlety that radius/xy smoothing and the mass-center snap
//! run whenever a contour was found — even if the quality gate ultimately
//! fails — while ROI re-selection and color adaptation run only inside the
//! `sphere_found` branch (see `psmove_tracker.c:746-870`). This also
//! preserves the "color adaptation penalty" side effect from `SPEC_FULL.md`
//! §9: a drift-triggered revert clears `sphere_found` after the ROI
//! re-selection code already ran, so the outer escalation branch still
//! overwrites the ROI with an escalated search box on the very same call.

use crate::config::TrackerConfig;
use crate::controller::ControllerRecord;
use crate::core::{Frame, Hsv, Roi};
use crate::geometry::{self, Point};
use crate::image_ops;

/// Runs one per-frame update for `rec` against `frame`. Returns `true` iff
/// the sphere was found and the record was committed as tracking.
///
/// `pyramid` gives the `(width, height)` of each ROI level, largest first.
/// `fps` is the tracker's current smoothed frame rate (for the optional
/// recentering sub-routine, §4.4.1). `now_ms` is a wall-clock millisecond
/// timestamp, threaded in by the caller for testability (seed scenario 6
/// depends on simulated time advancing).
pub fn update_controller(
    rec: &mut ControllerRecord,
    frame: &Frame,
    pyramid: &[(u32, u32)],
    config: &TrackerConfig,
    fps: f64,
    now_ms: i64,
) -> bool {
    let min = rec.adapted_hsv.minus(config.hsv_range);
    let max = rec.adapted_hsv.plus(config.hsv_range);

    if fps > config.roi_adjust_fps_t {
        if let Some((new_roi_x, new_roi_y)) = recenter_roi(rec, frame, pyramid, min, max) {
            let (w, h) = pyramid[rec.roi_level];
            let roi = Roi::from_signed(new_roi_x, new_roi_y, w, h, frame.width(), frame.height());
            rec.roi_x = roi.x;
            rec.roi_y = roi.y;
        }
    }

    loop {
        let (w, h) = pyramid[rec.roi_level];
        let roi = Roi::new(rec.roi_x, rec.roi_y, w, h).clamp_to(frame.width(), frame.height());
        rec.roi_x = roi.x;
        rec.roi_y = roi.y;

        let cropped = frame.crop(roi);
        let mut mask = image_ops::in_range(&cropped, min, max);
        let contour = image_ops::largest_contour(&mask);

        let mut sphere_found = false;

        if let Some(contour) = contour {
            let (br_x, br_y, br_w, br_h) = image_ops::bounding_rect(&contour.points);
            image_ops::fill_only_contour(&mut mask, &contour);

            let old_mx = rec.mx;
            let old_my = rec.my;
            let (cx, cy) = image_ops::moments_centroid(&mask).unwrap_or((0.0, 0.0));
            rec.mx = cx + rec.roi_x as f64;
            rec.my = cy + rec.roi_y as f64;

            let old_r = rec.r;
            let circle = geometry::estimate_circle_from_contour(&contour.points);
            let (fit_x, fit_y, fit_r) = circle
                .map(|c| (c.center.x, c.center.y, c.radius))
                .unwrap_or((0.0, 0.0, 0.0));

            if config.tracker_adaptive_z {
                let r_diff = (rec.rs - fit_r).abs();
                let f_r = (r_diff / 4.0 + 0.15).min(1.0);
                rec.rs = rec.rs * (1.0 - f_r) + fit_r * f_r;
                rec.r = rec.rs;
            } else {
                rec.rs = fit_r;
                rec.r = fit_r;
            }

            // The source actually guards this XY-smoothing block with
            // `tracker_adaptive_z` (likely a typo for `_xy`); both flags
            // default to enabled so production behavior is unaffected. Kept
            // here as two independently-named, independently-gated fields.
            if config.tracker_adaptive_xy {
                let d = geometry::distance(Point::new(old_mx, old_my), Point::new(rec.mx, rec.my));
                let f_xy = (d / 7.0 + 0.15).min(1.0);
                rec.x = rec.x * (1.0 - f_xy) + (fit_x + rec.roi_x as f64) * f_xy;
                rec.y = rec.y * (1.0 - f_xy) + (fit_y + rec.roi_y as f64) * f_xy;
            } else {
                rec.x = fit_x + rec.roi_x as f64;
                rec.y = fit_y + rec.roi_y as f64;
            }

            let pixel_in_blob = image_ops::count_non_zero(&mask);
            let area = std::f64::consts::PI * rec.r * rec.r;
            let mut q1 = if area > 0.0 { pixel_in_blob as f64 / area } else { 0.0 };
            if pixel_in_blob < 20 {
                q1 /= 2.0;
            }
            let q3 = rec.r;
            let mut q2 = f64::INFINITY;

            sphere_found = q1 > config.tracker_t1 && q3 > config.tracker_t3;
            if old_r > 0.0 && rec.search_quadrant == 0 {
                q2 = (old_r - rec.r).abs() / (old_r + f64::EPSILON);
                sphere_found = sphere_found && q2 < config.tracker_t2;
            }

            rec.q1 = q1;
            rec.q2 = q2;
            rec.q3 = q3;

            if q1 > 0.85 {
                rec.x = rec.mx;
                rec.y = rec.my;
            }

            if sphere_found {
                if config.color_update_rate_s > 0.0
                    && (now_ms - rec.last_color_update) as f64 > config.color_update_rate_s * 1000.0
                    && q1 > config.color_t1
                    && q2 < config.color_t2
                    && q3 > config.color_t3
                {
                    let (mb, mg, mr) = image_ops::mean_under_mask(&cropped, &mask);
                    let new_b = 0.5 * (rec.adapted_bgr.b as f64 + mb);
                    let new_g = 0.5 * (rec.adapted_bgr.g as f64 + mg);
                    let new_r = 0.5 * (rec.adapted_bgr.r as f64 + mr);
                    rec.adapted_bgr = crate::core::Bgr::new(
                        new_b.round().clamp(0.0, 255.0) as u8,
                        new_g.round().clamp(0.0, 255.0) as u8,
                        new_r.round().clamp(0.0, 255.0) as u8,
                    );
                    rec.adapted_hsv = image_ops::bgr_to_hsv_pixel(rec.adapted_bgr);
                    rec.last_color_update = now_ms;

                    if geometry::hsv_distance(rec.adapted_hsv, rec.observed_hsv) > config.adapt_t1 {
                        rec.adapted_bgr = rec.observed_bgr;
                        rec.adapted_hsv = rec.observed_hsv;
                        sphere_found = false;
                    }
                }

                let side = (br_w.max(br_h) as f64 * 3.0).round() as u32;
                let mut level = rec.roi_level;
                for (i, (pw, ph)) in pyramid.iter().enumerate() {
                    if side > *pw && side > *ph {
                        break;
                    }
                    level = i;
                }
                rec.roi_level = level;
                let (nw, nh) = pyramid[rec.roi_level];
                let new_roi = Roi::from_signed(
                    rec.x.round() as i64 - nw as i64 / 2,
                    rec.y.round() as i64 - nh as i64 / 2,
                    nw,
                    nh,
                    frame.width(),
                    frame.height(),
                );
                rec.roi_x = new_roi.x;
                rec.roi_y = new_roi.y;
            }
            let _ = (br_x, br_y);
        }

        if sphere_found {
            rec.search_quadrant = 0;
            rec.is_tracked = true;
            return true;
        } else if rec.roi_level > 0 {
            let (cur_w, cur_h) = pyramid[rec.roi_level];
            let old_cx = rec.roi_x as i64 + cur_w as i64 / 2;
            let old_cy = rec.roi_y as i64 + cur_h as i64 / 2;
            rec.roi_level -= 1;
            let (nw, nh) = pyramid[rec.roi_level];
            let new_roi = Roi::from_signed(
                old_cx - nw as i64 / 2,
                old_cy - nh as i64 / 2,
                nw,
                nh,
                frame.width(),
                frame.height(),
            );
            rec.roi_x = new_roi.x;
            rec.roi_y = new_roi.y;
        } else {
            let (fw, fh) = (frame.width(), frame.height());
            let (qx, qy) = match rec.search_quadrant {
                0 => (0, 0),
                1 => (fw / 2, 0),
                2 => (fw / 2, fh / 2),
                _ => (0, fh / 2),
            };
            rec.search_quadrant = (rec.search_quadrant + 1) % 4;
            rec.roi_level = 0;
            rec.roi_x = qx;
            rec.roi_y = qy;
            rec.is_tracked = false;
            return false;
        }
    }
}

/// Sub-routine §4.4.1: proposes a new ROI top-left by locating the largest
/// blob within the controller's current ROI and offsetting its centroid by
/// half the ROI extent (mirroring `psmove_tracker_center_roi_on_controller`'s
/// `center` point, which callers pass straight through to `set_roi` with no
/// further adjustment). Returns `None` if no contour is found there.
fn recenter_roi(
    rec: &ControllerRecord,
    frame: &Frame,
    pyramid: &[(u32, u32)],
    min: Hsv,
    max: Hsv,
) -> Option<(i64, i64)> {
    let (w, h) = pyramid[rec.roi_level];
    let roi = Roi::new(rec.roi_x, rec.roi_y, w, h).clamp_to(frame.width(), frame.height());
    let cropped = frame.crop(roi);
    let mask = image_ops::in_range(&cropped, min, max);
    let contour = image_ops::largest_contour(&mask)?;

    let mut filled = mask;
    image_ops::fill_only_contour(&mut filled, &contour);
    let (cx, cy) = image_ops::moments_centroid(&filled)?;

    let x = cx + rec.roi_x as f64 - (w as f64) / 2.0;
    let y = cy + rec.roi_y as f64 - (h as f64) / 2.0;
    Some((x.round() as i64, y.round() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerHandle;
    use crate::core::Bgr;

    fn solid_frame(w: u32, h: u32, c: Bgr) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _ in 0..(w * h) {
            data.push(c.b);
            data.push(c.g);
            data.push(c.r);
        }
        Frame::new(w, h, data)
    }

    fn disk_frame(w: u32, h: u32, cx: i64, cy: i64, radius: i64, fg: Bgr, bg: Bgr) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let c = if (x - cx).pow(2) + (y - cy).pow(2) <= radius * radius { fg } else { bg };
                data.push(c.b);
                data.push(c.g);
                data.push(c.r);
            }
        }
        Frame::new(w, h, data)
    }

    fn pyramid_for(w: u32, h: u32) -> Vec<(u32, u32)> {
        let mut dims = Vec::new();
        let (mut pw, mut ph) = (w / 2, h / 2);
        dims.push((pw, ph));
        for _ in 1..4 {
            let side = (0.7 * pw.min(ph) as f64) as u32;
            pw = side;
            ph = side;
            dims.push((pw, ph));
        }
        dims
    }

    #[test]
    fn tracks_a_centered_bright_disk() {
        let magenta = Bgr::from_rgb(255, 0, 255);
        let frame = disk_frame(640, 480, 320, 240, 30, magenta, Bgr::new(0, 0, 0));
        let pyramid = pyramid_for(640, 480);
        let hsv = image_ops::bgr_to_hsv_pixel(magenta);

        let mut rec = ControllerRecord::new_calibrated(
            ControllerHandle(0),
            (255, 0, 255),
            magenta,
            hsv,
            640,
            480,
            pyramid[0].0,
            pyramid[0].1,
        );
        let config = TrackerConfig::default();
        let found = update_controller(&mut rec, &frame, &pyramid, &config, 30.0, 0);
        assert!(found);
        assert!(rec.is_tracked);
        assert!((rec.x - 320.0).abs() < 2.0);
        assert!((rec.y - 240.0).abs() < 2.0);
        assert!(rec.q1 > 0.8);
    }

    #[test]
    fn missing_blob_advances_quadrant_after_escalation() {
        let frame = solid_frame(640, 480, Bgr::new(0, 0, 0));
        let pyramid = pyramid_for(640, 480);
        let mut rec = ControllerRecord::new_calibrated(
            ControllerHandle(0),
            (255, 0, 255),
            Bgr::from_rgb(255, 0, 255),
            image_ops::bgr_to_hsv_pixel(Bgr::from_rgb(255, 0, 255)),
            640,
            480,
            pyramid[0].0,
            pyramid[0].1,
        );
        let config = TrackerConfig::default();
        let found = update_controller(&mut rec, &frame, &pyramid, &config, 30.0, 0);
        assert!(!found);
        assert!(!rec.is_tracked);
        assert_eq!(rec.search_quadrant, 1);
        assert_eq!(rec.roi_level, 0);
    }

    #[test]
    fn color_adaptation_reverts_and_reports_untracked_on_drift_overrun() {
        let pyramid = pyramid_for(640, 480);
        let observed_bgr = Bgr::from_rgb(255, 0, 255); // magenta, the first-calibration color
        let observed_hsv = image_ops::bgr_to_hsv_pixel(observed_bgr);

        // A color already 40 degrees off from the calibration reference, as
        // if earlier frames had drifted adaptation this far without yet
        // tripping the guard.
        let shifted_hsv = Hsv::new(observed_hsv.h - 40.0, observed_hsv.s, observed_hsv.v);
        let shifted_bgr = image_ops::hsv_to_bgr_pixel(shifted_hsv);
        let shifted_hsv = image_ops::bgr_to_hsv_pixel(shifted_bgr);

        let mut rec = ControllerRecord::new_calibrated(
            ControllerHandle(0),
            (255, 0, 255),
            observed_bgr,
            observed_hsv,
            640,
            480,
            pyramid[0].0,
            pyramid[0].1,
        );
        rec.adapted_bgr = shifted_bgr;
        rec.adapted_hsv = shifted_hsv;

        let frame = disk_frame(640, 480, 320, 240, 30, shifted_bgr, Bgr::new(0, 0, 0));
        let config = TrackerConfig { color_update_rate_s: 0.001, ..TrackerConfig::default() };

        // First call only establishes a baseline radius: `q2` is gated on
        // `old_r > 0`, so adaptation is never attempted on the very first
        // sighting of a controller.
        assert!(update_controller(&mut rec, &frame, &pyramid, &config, 30.0, 0));
        assert_eq!(rec.roi_level, 0, "a 30px-radius blob should not zoom the ROI pyramid");

        // Second call: same steady blob, so q2 ~ 0 and the color-adaptation
        // gate opens. The blended color is unchanged from `shifted_*` (the
        // frame's true color), so its distance from `observed_hsv` still
        // exceeds `adapt_t1`, reverting the learned color and, per the
        // source's documented quirk, clearing `sphere_found` for this frame.
        let found = update_controller(&mut rec, &frame, &pyramid, &config, 30.0, 10_000);
        assert!(!found, "a drift overrun must report this frame as untracked");
        assert!(!rec.is_tracked);
        assert_eq!(rec.adapted_bgr, rec.observed_bgr);
        assert_eq!(rec.adapted_hsv, rec.observed_hsv);
    }

    #[test]
    fn small_blob_below_20px_halves_pixel_ratio() {
        let magenta = Bgr::from_rgb(255, 0, 255);
        // radius 2 disk is well under the 20px countNonZero threshold.
        let frame = disk_frame(640, 480, 320, 240, 2, magenta, Bgr::new(0, 0, 0));
        let pyramid = pyramid_for(640, 480);
        let hsv = image_ops::bgr_to_hsv_pixel(magenta);
        let mut rec = ControllerRecord::new_calibrated(
            ControllerHandle(0),
            (255, 0, 255),
            magenta,
            hsv,
            640,
            480,
            pyramid[0].0,
            pyramid[0].1,
        );
        let config = TrackerConfig::default();
        // Quality likely fails (tiny blob): asserts only on the halving contract
        // via q3 (radius) staying small and tracking failing/escalating.
        let _ = update_controller(&mut rec, &frame, &pyramid, &config, 30.0, 0);
        assert!(rec.q3 < config.tracker_t3 || !rec.is_tracked);
    }
}
