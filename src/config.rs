//! Layered configuration for the tracker (V5-style: defaults merged with an
//! optional `tracker.toml` file and `ORBTRACK_`-prefixed environment
//! variables), following the teacher's figment-based configuration system.
//!
//! Every constant here was hard-coded as a C `#define` in
//! `psmove_tracker.c`; field defaults reproduce those values exactly.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::core::Hsv;
use crate::error::AppResult;

/// All tunables the tracker needs at runtime, loadable from
/// `tracker.toml` + environment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// LED color dimming factor applied before commanding the orb.
    pub dimming_factor: u8,
    /// Static camera exposure used throughout tracking.
    pub good_exposure: i32,
    /// Number of ROI pyramid levels.
    pub rois: usize,
    /// Number of on/off blink cycles during calibration.
    pub blinks: usize,
    /// Milliseconds to wait after each LED state change during calibration.
    pub blink_delay_ms: u64,
    /// Minimum blob pixel count accepted during calibration.
    pub calib_min_size: f64,
    /// Maximum allowed blob-size standard deviation, in percent of mean.
    pub calib_size_std_pct: f64,
    /// Maximum allowed displacement (pixels) between blink-cycle blobs.
    pub calib_max_dist: f64,
    /// Threshold applied to the blink diff image before morphology.
    pub calibration_diff_t: f64,
    /// HSV color filter half-range.
    pub hsv_range: Hsv,
    /// Minimum fps before ROI recentering is attempted.
    pub roi_adjust_fps_t: f64,
    /// Tracker quality gate 1: minimum pixel-ratio.
    pub tracker_t1: f64,
    /// Tracker quality gate 2: maximum relative radius change.
    pub tracker_t2: f64,
    /// Tracker quality gate 3: minimum radius in pixels.
    pub tracker_t3: f64,
    /// Enable adaptive XY smoothing.
    pub tracker_adaptive_xy: bool,
    /// Enable adaptive radius smoothing (source's `tracker_adaptive_z`,
    /// kept independent per [DESIGN.md] Open Question 2).
    pub tracker_adaptive_z: bool,
    /// Max subjective HSV drift before adapted color reverts to the
    /// first-calibration color.
    pub adapt_t1: f64,
    /// Color adaptation quality gate 1: minimum pixel-ratio.
    pub color_t1: f64,
    /// Color adaptation quality gate 2: maximum relative radius change.
    pub color_t2: f64,
    /// Color adaptation quality gate 3: minimum radius in pixels.
    pub color_t3: f64,
    /// Seconds between color adaptation updates; 0 disables adaptation.
    pub color_update_rate_s: f64,
    /// Camera focal length constant (mm) used for distance estimation.
    pub cam_focal_length: f64,
    /// Camera pixel height constant (µm) used for distance estimation.
    pub cam_pixel_height: f64,
    /// Physical orb diameter (mm).
    pub ps_move_diameter: f64,
    /// User-tunable distance-calculation fudge factor.
    pub user_factor_dist: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            dimming_factor: 1,
            good_exposure: 2051,
            rois: 4,
            blinks: 4,
            blink_delay_ms: 50,
            calib_min_size: 50.0,
            calib_size_std_pct: 10.0,
            calib_max_dist: 30.0,
            calibration_diff_t: 20.0,
            hsv_range: Hsv::new(12.0, 85.0, 85.0),
            roi_adjust_fps_t: 160.0,
            tracker_t1: 0.3,
            tracker_t2: 0.7,
            tracker_t3: 4.0,
            tracker_adaptive_xy: true,
            tracker_adaptive_z: true,
            adapt_t1: 35.0,
            color_t1: 0.8,
            color_t2: 0.2,
            color_t3: 6.0,
            color_update_rate_s: 1.0,
            cam_focal_length: 28.3,
            cam_pixel_height: 5.0,
            ps_move_diameter: 47.0,
            user_factor_dist: 1.05,
        }
    }
}

impl TrackerConfig {
    /// Loads configuration by layering defaults, an optional `tracker.toml`
    /// in the current directory, then `ORBTRACK_`-prefixed environment
    /// variables, in that priority order.
    pub fn load() -> AppResult<Self> {
        let config: TrackerConfig = Figment::new()
            .merge(Serialized::defaults(TrackerConfig::default()))
            .merge(Toml::file("tracker.toml"))
            .merge(Env::prefixed("ORBTRACK_"))
            .extract()?;
        Ok(config)
    }
}

/// Name of the environment variable that overrides the autodetected camera
/// index, read once by the facade constructor. Analogous to the original's
/// `PSMOVE_TRACKER_CAMERA_ENV`.
pub const CAMERA_INDEX_ENV: &str = "ORBTRACK_CAMERA_INDEX";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_constants() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.good_exposure, 2051);
        assert_eq!(cfg.blinks, 4);
        assert_eq!(cfg.rois, 4);
        assert_eq!(cfg.hsv_range, Hsv::new(12.0, 85.0, 85.0));
        assert_eq!(cfg.tracker_t3, 4.0);
    }

    #[test]
    fn load_without_overrides_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let cfg = TrackerConfig::load().unwrap();
            assert_eq!(cfg, TrackerConfig::default());
            Ok(())
        });
    }

    #[test]
    fn env_override_takes_priority_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ORBTRACK_GOOD_EXPOSURE", "3000");
            let cfg = TrackerConfig::load().unwrap();
            assert_eq!(cfg.good_exposure, 3000);
            Ok(())
        });
    }
}
