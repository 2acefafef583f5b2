//! Error and status types for the tracker.
//!
//! `TrackerError` consolidates the failure modes the facade and its
//! collaborators can raise. Status values the facade reports for a
//! registered controller (`NotCalibrated` / `Calibrated` / `Tracking`) are
//! kept in a separate [`Status`] enum rather than folded into the error
//! type: they are outcomes of a successful call, not failures.

use thiserror::Error;

/// Convenience alias for results using [`TrackerError`].
pub type AppResult<T> = std::result::Result<T, TrackerError>;

/// Tracking status of a registered controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// No controller record exists for this handle.
    NotCalibrated,
    /// Registered, but no successful per-frame update has committed yet.
    Calibrated,
    /// The most recent `update` found the sphere.
    Tracking,
}

/// Why blink calibration (or quick-verify) failed to produce a usable
/// controller record.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// No palette entry is free to allocate.
    #[error("no free tracking color available")]
    PaletteExhausted,
    /// The requested `(r,g,b)` is not one of the palette's colors, or is
    /// already assigned to another controller.
    #[error("color ({0}, {1}, {2}) is unknown or already in use")]
    ColorUnavailable(u8, u8, u8),
    /// Fewer than `BLINKS` cycles produced a valid, sufficiently large,
    /// sufficiently close contour.
    #[error("sphere was not found consistently across blink cycles ({valid}/{total} valid)")]
    InconsistentBlobs {
        /// Cycles that passed size/displacement checks.
        valid: usize,
        /// Total blink cycles attempted.
        total: usize,
    },
    /// The blob sizes found across blink cycles varied by more than
    /// `CALIB_SIZE_STD` percent.
    #[error("blob sizes differ too much across blink cycles (stddev {stddev:.2} >= {limit:.2})")]
    SizeDispersionTooHigh {
        /// Observed standard deviation of blob sizes.
        stddev: f64,
        /// Allowed limit (mean * CALIB_SIZE_STD / 100).
        limit: f64,
    },
}

/// Top-level error type for the tracker crate.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Calibration (full or quick-verify) failed; see [`CalibrationError`].
    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    /// The camera collaborator could not be opened, queried, or configured.
    #[error("camera error: {0}")]
    Camera(String),

    /// The LED/controller transport collaborator failed to apply a color.
    #[error("led controller error: {0}")]
    Led(String),

    /// I/O error loading or saving persisted state (colors, settings backup,
    /// calibration matrices).
    #[error("persistence I/O error: {0}")]
    Persistence(#[from] std::io::Error),

    /// A persisted color or settings file existed but could not be parsed.
    #[error("persisted data is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
}
