//! The per-controller tracking record and its opaque handle.
//!
//! Grounded on the `TrackedController` struct in `psmove_tracker.c` /
//! `tracked_controller.h`: a passive aggregate keyed by a controller handle,
//! mutated in place by calibration ([`crate::calibration`]) and the
//! per-frame update ([`crate::tracker`]). The original threads these through
//! an intrusive singly linked list; here they live in a facade-owned `Vec`
//! (see `SPEC_FULL.md` §9 on the indexed-container substitution).

use crate::core::{Bgr, Hsv, Roi};

/// Opaque identity for a physical controller being tracked. The facade
/// hands these out and uses them to key [`ControllerRecord`]s; equality is
/// by value, matching the spec's "keyed by an opaque controller handle".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerHandle(pub u32);

/// Per-controller tracking state. A passive aggregate: no methods beyond
/// field access and construction, per spec §4.2.
#[derive(Clone, Debug)]
pub struct ControllerRecord {
    pub handle: ControllerHandle,

    /// Color commanded to the LED, `(r, g, b)` as handed to `enable_with_color`.
    pub assigned_rgb: (u8, u8, u8),

    /// Color actually seen by the camera at first calibration (the revert
    /// target for adaptation overrun); `eFColor`/`eFColorHSV` in the original.
    pub observed_bgr: Bgr,
    pub observed_hsv: Hsv,

    /// Currently learned color, possibly drifted from `observed_*`;
    /// `eColor`/`eColorHSV` in the original.
    pub adapted_bgr: Bgr,
    pub adapted_hsv: Hsv,

    /// Top-left of the current ROI in full-frame coordinates.
    pub roi_x: u32,
    pub roi_y: u32,
    /// Index into the ROI pyramid, 0 = largest.
    pub roi_level: usize,

    /// Smoothed image-space center of the orb.
    pub x: f64,
    pub y: f64,
    /// Mass-center of the segmented blob in the latest frame.
    pub mx: f64,
    pub my: f64,

    /// Current radius estimate and its smoothed counterpart.
    pub r: f64,
    pub rs: f64,

    /// Quality metrics: pixel-ratio, relative radius change, absolute radius.
    pub q1: f64,
    pub q2: f64,
    pub q3: f64,

    /// True iff the latest update passed the quality gates.
    pub is_tracked: bool,

    /// Wall-clock timestamp (ms) of the last color adaptation.
    pub last_color_update: i64,

    /// Quadrant index `[0,3]` used for full-frame fallback search.
    pub search_quadrant: u8,
}

impl ControllerRecord {
    /// Builds a freshly-calibrated record: ROI reset to level 0 centered on
    /// the frame, position/radius zeroed, colors seeded from the blink
    /// calibration sample. Mirrors the state `tracked_controller_insert` +
    /// the field assignments at the end of `psmove_tracker_enable_with_color`
    /// leave a new controller in.
    #[allow(clippy::too_many_arguments)]
    pub fn new_calibrated(
        handle: ControllerHandle,
        assigned_rgb: (u8, u8, u8),
        observed_bgr: Bgr,
        observed_hsv: Hsv,
        frame_w: u32,
        frame_h: u32,
        roi0_w: u32,
        roi0_h: u32,
    ) -> Self {
        let roi = Roi::new(
            frame_w.saturating_sub(roi0_w) / 2,
            frame_h.saturating_sub(roi0_h) / 2,
            roi0_w,
            roi0_h,
        )
        .clamp_to(frame_w, frame_h);
        Self {
            handle,
            assigned_rgb,
            observed_bgr,
            observed_hsv,
            adapted_bgr: observed_bgr,
            adapted_hsv: observed_hsv,
            roi_x: roi.x,
            roi_y: roi.y,
            roi_level: 0,
            x: (roi.x + roi0_w / 2) as f64,
            y: (roi.y + roi0_h / 2) as f64,
            mx: 0.0,
            my: 0.0,
            r: 0.0,
            rs: 0.0,
            q1: 0.0,
            q2: 0.0,
            q3: 0.0,
            is_tracked: false,
            last_color_update: 0,
            search_quadrant: 0,
        }
    }

    /// Current ROI rectangle given this controller's pyramid dimensions.
    pub fn roi(&self, width: u32, height: u32) -> Roi {
        Roi::new(self.roi_x, self.roi_y, width, height)
    }
}
