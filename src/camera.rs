//! The camera collaborator: frame acquisition, exposure/parameter control,
//! calibration-matrix loading, and vendor settings backup/restore.
//!
//! Grounded on `camera_control.h`'s contract (`camera_control_new`,
//! `_query_frame`, `_set_parameters`, `_read_calibration`,
//! `_backup_system_settings`/`_restore_system_settings`) and the teacher's
//! `core::Camera` capability-trait shape (`async_trait`, `Instrument`-style
//! lifecycle). Camera acquisition itself is out of scope per `spec.md` §1;
//! this module only defines the trait the facade depends on plus a
//! deterministic mock for tests.

use async_trait::async_trait;

use crate::core::Frame;
use crate::error::AppResult;

/// Camera parameters the facade can push to the device. Matches the
/// positional argument list of `camera_control_set_parameters` (the
/// original zeros most of them and pins white balance to `0xFFFF`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParameters {
    pub exposure: i32,
    pub white_balance_r: u16,
    pub white_balance_g: u16,
    pub white_balance_b: u16,
}

impl Default for CameraParameters {
    fn default() -> Self {
        Self {
            exposure: 0,
            white_balance_r: 0xFFFF,
            white_balance_g: 0xFFFF,
            white_balance_b: 0xFFFF,
        }
    }
}

/// Camera intrinsics/distortion loaded from `intrinsics.xml`/`distortion.xml`.
/// The spec leaves the matrix format to the image library; this crate only
/// needs to round-trip opaque bytes between the persistence collaborator and
/// whatever native camera-control layer ultimately consumes them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraCalibration {
    pub intrinsics: Vec<u8>,
    pub distortion: Vec<u8>,
}

/// Required operations from the camera acquisition collaborator (external
/// to this crate's scope per spec §1, but its contract is owned here).
#[async_trait]
pub trait Camera: Send + Sync {
    /// Pulls the next available frame as BGR8.
    async fn query_frame(&mut self) -> AppResult<Frame>;

    /// Pushes exposure/white-balance parameters to the device.
    async fn set_parameters(&mut self, params: CameraParameters) -> AppResult<()>;

    /// Loads previously-read intrinsics/distortion matrices into the
    /// device, mirroring `camera_control_read_calibration`'s effect on the
    /// camera handle. A fresh install with no calibration files on disk
    /// passes empty buffers here; collaborators tolerate that.
    async fn load_calibration(&mut self, calibration: CameraCalibration) -> AppResult<()>;

    /// Frame width/height as currently configured.
    fn frame_size(&self) -> (u32, u32);
}

/// Vendor settings backup/restore, modeled separately from [`Camera`] since
/// it is addressed by file path rather than by frame, mirroring
/// `camera_control_backup_system_settings`/`_restore_system_settings`.
#[async_trait]
pub trait SettingsBackup: Send + Sync {
    /// True if a backup file already exists at `path` (gates whether `new()`
    /// writes a fresh one, per spec §4.5/§6).
    fn backup_exists(&self, path: &str) -> bool;

    /// Writes the device's current vendor settings to `path`.
    async fn backup(&mut self, path: &str) -> AppResult<()>;

    /// Restores vendor settings from `path`.
    async fn restore(&mut self, path: &str) -> AppResult<()>;
}

/// Deterministic fake camera for tests: frames are scripted in advance and
/// served in order, repeating the last frame once exhausted (matching the
/// spec §8 end-to-end scenarios' "fake returns scripted frames" shape).
#[derive(Clone, Debug)]
pub struct MockCamera {
    width: u32,
    height: u32,
    frames: Vec<Frame>,
    cursor: usize,
    pub last_params: Option<CameraParameters>,
    pub last_calibration: Option<CameraCalibration>,
    backups_written: std::collections::HashSet<String>,
}

impl MockCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: vec![Frame::blank(width, height)],
            cursor: 0,
            last_params: None,
            last_calibration: None,
            backups_written: std::collections::HashSet::new(),
        }
    }

    /// Appends a frame to the scripted sequence this camera will serve.
    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Replaces the scripted sequence, resetting the cursor to its start.
    pub fn set_script(&mut self, frames: Vec<Frame>) {
        self.frames = frames;
        self.cursor = 0;
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn query_frame(&mut self) -> AppResult<Frame> {
        let frame = self.frames[self.cursor.min(self.frames.len() - 1)].clone();
        if self.cursor + 1 < self.frames.len() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    async fn set_parameters(&mut self, params: CameraParameters) -> AppResult<()> {
        self.last_params = Some(params);
        Ok(())
    }

    async fn load_calibration(&mut self, calibration: CameraCalibration) -> AppResult<()> {
        self.last_calibration = Some(calibration);
        Ok(())
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[async_trait]
impl SettingsBackup for MockCamera {
    fn backup_exists(&self, path: &str) -> bool {
        self.backups_written.contains(path)
    }

    async fn backup(&mut self, path: &str) -> AppResult<()> {
        self.backups_written.insert(path.to_string());
        Ok(())
    }

    async fn restore(&mut self, _path: &str) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_camera_serves_scripted_frames_then_holds_last() {
        let mut cam = MockCamera::new(4, 4);
        cam.push_frame(Frame::blank(4, 4));
        cam.push_frame(Frame::blank(4, 4));
        let _ = cam.query_frame().await.unwrap();
        let _ = cam.query_frame().await.unwrap();
        let _ = cam.query_frame().await.unwrap();
        assert_eq!(cam.cursor, 2);
    }

    #[tokio::test]
    async fn load_calibration_records_the_matrices() {
        let mut cam = MockCamera::new(4, 4);
        assert!(cam.last_calibration.is_none());
        let calib = CameraCalibration { intrinsics: vec![1, 2, 3], distortion: vec![4] };
        cam.load_calibration(calib.clone()).await.unwrap();
        assert_eq!(cam.last_calibration, Some(calib));
    }

    #[tokio::test]
    async fn backup_exists_tracks_written_paths() {
        let mut cam = MockCamera::new(4, 4);
        assert!(!cam.backup_exists("a.ini"));
        cam.backup("a.ini").await.unwrap();
        assert!(cam.backup_exists("a.ini"));
    }
}
