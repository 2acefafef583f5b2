//! Core library for the orb tracker.
//!
//! This crate locates glowing spherical markers ("orbs") in a camera feed:
//! a blink-differencing protocol calibrates each marker's color against a
//! small palette of candidate LED colors, and a hierarchical region-of-
//! interest pyramid drives a bounded per-frame search that finds, fits, and
//! smooths a circle around the marker once calibrated. Camera acquisition
//! and LED transport are external collaborators; this crate owns their
//! contracts ([`camera`], [`led`]) and a deterministic mock of each for
//! tests.

pub mod calibration;
pub mod camera;
pub mod color_palette;
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod geometry;
pub mod image_ops;
pub mod led;
pub mod persistence;
pub mod tracker;
pub mod tracking;

pub use controller::ControllerHandle;
pub use error::{AppResult, CalibrationError, Status, TrackerError};
pub use tracker::Tracker;
