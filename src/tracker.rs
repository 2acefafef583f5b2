//! The tracker facade: component E. Owns the camera handle, the ROI
//! pyramid dimensions, the controller list, and the color palette, and
//! orchestrates calibration (C) and per-frame update (D) across them.
//!
//! Grounded on `psmove_tracker_new_with_camera`, `_enable_with_color`,
//! `_update`, `_update_controller`, `_get_position`, and `_free`. Per spec
//! §5 this is single-threaded and cooperative: every method here runs to
//! completion before the next is called, so the controller list, palette,
//! and pyramid dimensions never need synchronization.

use std::path::Path;

use tracing::{debug, warn};

use crate::calibration::{self, CalibrationOutcome};
use crate::camera::{Camera, CameraParameters, SettingsBackup};
use crate::color_palette::{Palette, ReserveOutcome};
use crate::config::TrackerConfig;
use crate::controller::{ControllerHandle, ControllerRecord};
use crate::core::Frame;
use crate::error::{AppResult, CalibrationError, Status};
use crate::led::LedController;
use crate::persistence::{self, ColorStore, PersistedColor};
use crate::tracking;

/// Builds the ROI pyramid dimensions: level 0 is half the frame, and each
/// subsequent level is a square at 0.7x the previous level's shorter side.
/// Mirrors the original's `psmove_tracker_new_with_camera` ROI setup.
fn pyramid_dimensions(frame_w: u32, frame_h: u32, levels: usize) -> Vec<(u32, u32)> {
    let mut dims = Vec::with_capacity(levels);
    let (mut w, mut h) = (frame_w / 2, frame_h / 2);
    dims.push((w, h));
    for _ in 1..levels {
        let side = (0.7 * w.min(h) as f64) as u32;
        w = side;
        h = side;
        dims.push((w, h));
    }
    dims
}

/// A camera collaborator that can also back up and restore its vendor
/// settings. Most real camera drivers implement both capabilities on the
/// same device handle; this trait lets the facade hold a single boxed
/// object instead of two independently-owned ones.
pub trait CameraDevice: Camera + SettingsBackup {}
impl<T: Camera + SettingsBackup> CameraDevice for T {}

/// The tracker facade.
pub struct Tracker {
    camera: Box<dyn CameraDevice>,
    led: Box<dyn LedController>,
    color_store: Box<dyn ColorStore>,
    config: TrackerConfig,
    backup_path: String,

    palette: Palette,
    controllers: Vec<ControllerRecord>,
    pyramid: Vec<(u32, u32)>,
    frame: Option<Frame>,
    fps: f64,
    frame_w: u32,
    frame_h: u32,
}

impl Tracker {
    /// Opens the camera, loads intrinsics/distortion calibration, backs up
    /// its vendor settings if no backup exists yet, pins exposure to
    /// `GOOD_EXPOSURE`, probes one frame to size the ROI pyramid, and
    /// initializes the color palette. Mirrors
    /// `psmove_tracker_new_with_camera`'s order exactly: the settings
    /// backup must be taken *before* exposure is changed, or `free()`'s
    /// restore would merely reinstate the tracker's own exposure setting.
    pub async fn new(
        mut camera: Box<dyn CameraDevice>,
        led: Box<dyn LedController>,
        color_store: Box<dyn ColorStore>,
        config: TrackerConfig,
        backup_path: impl Into<String>,
        intrinsics_path: impl AsRef<Path>,
        distortion_path: impl AsRef<Path>,
    ) -> AppResult<Self> {
        let backup_path = backup_path.into();

        let calibration = persistence::read_calibration_files(intrinsics_path.as_ref(), distortion_path.as_ref())?;
        camera.load_calibration(calibration).await?;

        if !camera.backup_exists(&backup_path) {
            camera.backup(&backup_path).await?;
        }

        camera
            .set_parameters(CameraParameters { exposure: config.good_exposure, ..Default::default() })
            .await?;

        let probe = camera.query_frame().await?;
        let (frame_w, frame_h) = (probe.width(), probe.height());
        let pyramid = pyramid_dimensions(frame_w, frame_h, config.rois);

        debug!(frame_w, frame_h, levels = pyramid.len(), "tracker initialized");

        Ok(Self {
            camera,
            led,
            color_store,
            config,
            backup_path,
            palette: Palette::new(),
            controllers: Vec::new(),
            pyramid,
            frame: None,
            fps: 0.0,
            frame_w,
            frame_h,
        })
    }

    fn find(&self, handle: ControllerHandle) -> Option<&ControllerRecord> {
        self.controllers.iter().find(|c| c.handle == handle)
    }

    fn find_mut(&mut self, handle: ControllerHandle) -> Option<&mut ControllerRecord> {
        self.controllers.iter_mut().find(|c| c.handle == handle)
    }

    /// Allocates the first free palette color and calibrates with it.
    pub async fn enable(&mut self, handle: ControllerHandle) -> AppResult<Status> {
        let rgb = self.palette.reserve().ok_or(CalibrationError::PaletteExhausted)?;
        match self.enable_with_color(handle, rgb.0, rgb.1, rgb.2).await {
            Ok(status) => Ok(status),
            Err(e) => {
                self.palette.release(rgb.0, rgb.1, rgb.2);
                Err(e)
            }
        }
    }

    /// Calibrates `handle` to the specific `(r, g, b)` color. Idempotent if
    /// the handle is already registered (returns `Calibrated` unchanged).
    /// Attempts quick-verify first, then full blink calibration; persists
    /// colors to disk on success. Mirrors
    /// `psmove_tracker_enable_with_color`.
    pub async fn enable_with_color(
        &mut self,
        handle: ControllerHandle,
        r: u8,
        g: u8,
        b: u8,
    ) -> AppResult<Status> {
        if self.find(handle).is_some() {
            return Ok(Status::Calibrated);
        }

        if !self.palette.contains(r, g, b) || self.palette.is_in_use(r, g, b) {
            return Err(CalibrationError::ColorUnavailable(r, g, b).into());
        }
        match self.palette.reserve_specific(r, g, b) {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::AlreadyUsed | ReserveOutcome::Unknown => {
                return Err(CalibrationError::ColorUnavailable(r, g, b).into());
            }
        }

        let record = self.calibrate(handle, r, g, b).await;
        match record {
            Ok(rec) => {
                self.controllers.push(rec);
                self.persist_colors()?;
                Ok(Status::Calibrated)
            }
            Err(e) => {
                self.palette.release(r, g, b);
                Err(e)
            }
        }
    }

    async fn calibrate(&mut self, handle: ControllerHandle, r: u8, g: u8, b: u8) -> AppResult<ControllerRecord> {
        if let Some(persisted) = self.color_store.load_color(r, g, b)? {
            if let Some(mut rec) = calibration::quick_verify(
                self.camera.as_mut(),
                self.led.as_mut(),
                &self.pyramid,
                &self.config,
                (r, g, b),
                persisted,
                self.frame_w,
                self.frame_h,
            )
            .await?
            {
                rec.handle = handle;
                return Ok(rec);
            }
        }

        let CalibrationOutcome { report, result } =
            calibration::run_full_calibration(self.camera.as_mut(), self.led.as_mut(), &self.config, (r, g, b)).await?;

        debug!(
            valid_cycles = report.valid_cycles,
            size_mean = report.size_mean,
            size_stddev = report.size_stddev,
            warn_small_blob = report.warn_small_blob,
            warn_hue_mismatch = report.warn_hue_mismatch,
            "calibration report"
        );
        if report.warn_small_blob {
            warn!("calibration blob may not be representative for color estimation");
        }
        if report.warn_hue_mismatch {
            warn!("estimated color does not resemble the assigned color");
        }

        let (observed_bgr, observed_hsv) = result?;
        Ok(ControllerRecord::new_calibrated(
            handle,
            (r, g, b),
            observed_bgr,
            observed_hsv,
            self.frame_w,
            self.frame_h,
            self.pyramid[0].0,
            self.pyramid[0].1,
        ))
    }

    fn persist_colors(&mut self) -> AppResult<()> {
        let colors: Vec<PersistedColor> = self
            .controllers
            .iter()
            .map(|c| PersistedColor {
                r: c.assigned_rgb.0,
                g: c.assigned_rgb.1,
                b: c.assigned_rgb.2,
                hsv: c.observed_hsv,
            })
            .collect();
        self.color_store.save_colors(&colors)
    }

    /// Returns `assigned_rgb * DIMMING_FACTOR` for a registered controller.
    pub fn get_color(&self, handle: ControllerHandle) -> Option<(u8, u8, u8)> {
        self.find(handle).map(|c| {
            let dim = self.config.dimming_factor;
            (
                c.assigned_rgb.0.saturating_mul(dim),
                c.assigned_rgb.1.saturating_mul(dim),
                c.assigned_rgb.2.saturating_mul(dim),
            )
        })
    }

    /// `NotCalibrated` / `Calibrated` / `Tracking` for the given handle.
    pub fn status(&self, handle: ControllerHandle) -> Status {
        match self.find(handle) {
            None => Status::NotCalibrated,
            Some(c) if c.is_tracked => Status::Tracking,
            Some(_) => Status::Calibrated,
        }
    }

    /// Pulls the next frame into the facade's buffer. Must be called before
    /// [`Tracker::update`].
    pub async fn update_image(&mut self) -> AppResult<()> {
        self.frame = Some(self.camera.query_frame().await?);
        Ok(())
    }

    /// Runs the per-frame update for one controller (`Some(handle)`) or all
    /// of them (`None`), returning the count of controllers tracked this
    /// invocation. Updates the smoothed FPS estimate, skipping the update
    /// when the measured duration is zero (spec §9, "Duration == 0 on first
    /// frame").
    pub async fn update(&mut self, handle: Option<ControllerHandle>) -> AppResult<usize> {
        let Some(frame) = self.frame.clone() else {
            return Ok(0);
        };

        let started = std::time::Instant::now();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let fps = self.fps;
        let config = self.config;
        let pyramid = self.pyramid.clone();

        let mut found = 0usize;
        for rec in self.controllers.iter_mut().filter(|c| handle.map_or(true, |h| h == c.handle)) {
            if tracking::update_controller(rec, &frame, &pyramid, &config, fps, now_ms) {
                found += 1;
            }
        }

        let duration_ms = started.elapsed().as_millis() as f64;
        if duration_ms > 0.0 {
            self.fps = 0.85 * self.fps + 0.15 * (1000.0 / duration_ms);
        }

        Ok(found)
    }

    /// Last committed `(x, y, radius)` for a registered controller, or
    /// `None` if the handle is not registered.
    pub fn get_position(&self, handle: ControllerHandle) -> Option<(f64, f64, f64)> {
        self.find(handle).map(|c| (c.x, c.y, c.r))
    }

    /// Removes the controller's record and frees its palette color,
    /// preserving the insertion order of surviving records.
    pub fn disable(&mut self, handle: ControllerHandle) -> bool {
        if let Some(pos) = self.controllers.iter().position(|c| c.handle == handle) {
            let rec = self.controllers.remove(pos);
            self.palette.release(rec.assigned_rgb.0, rec.assigned_rgb.1, rec.assigned_rgb.2);
            true
        } else {
            false
        }
    }

    /// Converts an orb radius in pixels to an estimated physical distance in
    /// millimeters, mirroring `psmove_tracker_calculate_distance`.
    pub fn estimate_distance_mm(&self, radius_px: f64) -> f64 {
        crate::geometry::estimate_distance_mm(
            radius_px * 2.0,
            self.config.cam_focal_length,
            self.config.cam_pixel_height,
            self.config.ps_move_diameter,
            self.config.user_factor_dist,
        )
    }

    /// Persists colors one final time and restores the camera's vendor
    /// settings backup if present. Mirrors `psmove_tracker_free`.
    pub async fn free(mut self) -> AppResult<()> {
        self.persist_colors()?;
        if self.camera.backup_exists(&self.backup_path) {
            self.camera.restore(&self.backup_path).await?;
        }
        Ok(())
    }
}
