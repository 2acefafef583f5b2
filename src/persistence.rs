//! Persistence collaborators: per-controller color storage and the camera
//! calibration-matrix / vendor-settings-backup file contracts.
//!
//! Grounded on `tracked_controller_load_color`/`tracked_controller_save_colors`
//! and `camera_control_backup_system_settings`/`_restore_system_settings`.
//! The on-disk color format is left unspecified by spec §6 ("an opaque store
//! addressed by the controller's serial identity... only requires
//! load-by-(r,g,b)-hint and bulk-save semantics"); this crate implements it
//! as a JSON sidecar file, following the teacher's `serde_json`-based
//! metadata persistence (`metadata.rs`) rather than inventing a binary
//! format (see `DESIGN.md` Open Question 4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Hsv;
use crate::error::AppResult;

/// One persisted color record: the `(r, g, b)` hint that was commanded, and
/// the HSV color the camera actually observed for it last time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub hsv: Hsv,
}

/// Addressed by `(r, g, b)` hint; bulk-save semantics (spec §6).
pub trait ColorStore: Send + Sync {
    /// Loads a previously persisted HSV color for `(r, g, b)`, if any.
    fn load_color(&self, r: u8, g: u8, b: u8) -> AppResult<Option<Hsv>>;

    /// Persists the full set of currently known controller colors, replacing
    /// anything previously stored. Mirrors `tracked_controller_save_colors`,
    /// which re-writes the whole list on every successful enable and on
    /// `free()`.
    fn save_colors(&mut self, colors: &[PersistedColor]) -> AppResult<()>;
}

/// Filesystem-backed [`ColorStore`]: one JSON array at a configurable path.
#[derive(Clone, Debug)]
pub struct FileColorStore {
    path: PathBuf,
}

impl FileColorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the platform config directory, mirroring the
    /// teacher's `dirs::config_dir`-based metadata paths.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("orb_tracker")
            .join("colors.json")
    }

    fn read_all(&self) -> AppResult<Vec<PersistedColor>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ColorStore for FileColorStore {
    fn load_color(&self, r: u8, g: u8, b: u8) -> AppResult<Option<Hsv>> {
        let all = self.read_all()?;
        Ok(all
            .into_iter()
            .find(|c| c.r == r && c.g == g && c.b == b)
            .map(|c| c.hsv))
    }

    fn save_colors(&mut self, colors: &[PersistedColor]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(colors)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

/// In-memory [`ColorStore`] used by tests and by the quick-verify scenarios
/// in spec §8 where no real filesystem should be touched.
#[derive(Clone, Debug, Default)]
pub struct InMemoryColorStore {
    entries: HashMap<(u8, u8, u8), Hsv>,
}

impl InMemoryColorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a previously-calibrated color, as if loaded from a prior run.
    pub fn seed(&mut self, r: u8, g: u8, b: u8, hsv: Hsv) {
        self.entries.insert((r, g, b), hsv);
    }
}

impl ColorStore for InMemoryColorStore {
    fn load_color(&self, r: u8, g: u8, b: u8) -> AppResult<Option<Hsv>> {
        Ok(self.entries.get(&(r, g, b)).copied())
    }

    fn save_colors(&mut self, colors: &[PersistedColor]) -> AppResult<()> {
        self.entries.clear();
        for c in colors {
            self.entries.insert((c.r, c.g, c.b), c.hsv);
        }
        Ok(())
    }
}

/// Reads the camera calibration matrices from `intrinsics_path`/
/// `distortion_path`, tolerating their absence (a fresh install has none
/// yet) by returning empty buffers rather than erroring, matching the
/// original's best-effort `camera_control_read_calibration`.
pub fn read_calibration_files(
    intrinsics_path: &Path,
    distortion_path: &Path,
) -> AppResult<crate::camera::CameraCalibration> {
    let intrinsics = std::fs::read(intrinsics_path).unwrap_or_default();
    let distortion = std::fs::read(distortion_path).unwrap_or_default();
    Ok(crate::camera::CameraCalibration { intrinsics, distortion })
}
