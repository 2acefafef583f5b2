//! Shared value types used across the tracker: raw frame buffers, color
//! triples, and regions of interest.

use serde::{Deserialize, Serialize};

/// A BGR 8-bit-per-channel frame, row-major, 3 bytes per pixel.
///
/// This is the only image representation the facade and its collaborators
/// exchange; conversions to HSV/gray scratch buffers happen internally in
/// [`crate::image_ops`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Builds a frame from a BGR8 buffer. Panics if `data.len() !=
    /// width * height * 3`; callers control frame acquisition so this is a
    /// programming error, not a runtime condition.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "frame buffer size does not match width * height * 3"
        );
        Self { width, height, data }
    }

    /// Allocates a black frame of the given size.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 3],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGR pixel at `(x, y)`. Panics on out-of-bounds coordinates.
    pub fn pixel_bgr(&self, x: u32, y: u32) -> Bgr {
        let idx = ((y * self.width + x) * 3) as usize;
        Bgr {
            b: self.data[idx],
            g: self.data[idx + 1],
            r: self.data[idx + 2],
        }
    }

    /// Returns the sub-frame described by `roi`, cloning pixel data.
    /// `roi` must be fully contained in this frame.
    pub fn crop(&self, roi: Roi) -> Frame {
        debug_assert!(roi.x + roi.width <= self.width);
        debug_assert!(roi.y + roi.height <= self.height);
        let mut out = Vec::with_capacity((roi.width * roi.height * 3) as usize);
        for row in roi.y..roi.y + roi.height {
            let start = ((row * self.width + roi.x) * 3) as usize;
            let end = start + (roi.width * 3) as usize;
            out.extend_from_slice(&self.data[start..end]);
        }
        Frame {
            width: roi.width,
            height: roi.height,
            data: out,
        }
    }
}

/// A BGR color triple, channel order matching how the original API performs
/// its arithmetic (blue, green, red).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bgr {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl Bgr {
    pub fn new(b: u8, g: u8, r: u8) -> Self {
        Self { b, g, r }
    }

    /// Builds a BGR triple from an `(r, g, b)` hint, the order callers
    /// (palette, calibration API) naturally think in.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r }
    }

    pub fn as_f64(&self) -> [f64; 3] {
        [self.b as f64, self.g as f64, self.r as f64]
    }
}

/// An HSV color, using OpenCV's 8-bit quantization: `h` in `[0, 180)`, `s`
/// and `v` in `[0, 255]`. Stored as `f64` since calibration and adaptation
/// arithmetic (averaging, epsilon-guarded differences) needs sub-unit
/// precision before the value is ever quantized back to a filter bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

impl Hsv {
    pub fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }

    /// `self - other`, channel-wise.
    pub fn minus(&self, other: Hsv) -> Hsv {
        Hsv::new(self.h - other.h, self.s - other.s, self.v - other.v)
    }

    /// `self + other`, channel-wise.
    pub fn plus(&self, other: Hsv) -> Hsv {
        Hsv::new(self.h + other.h, self.s + other.s, self.v + other.v)
    }
}

/// A rectangular region of interest in full-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clamps this ROI so it stays fully inside a `frame_w x frame_h` frame,
    /// preserving width/height (per `psmove_tracker_set_roi`: clamp the
    /// top-left, never shrink the rectangle).
    pub fn clamp_to(mut self, frame_w: u32, frame_h: u32) -> Roi {
        if self.x as i64 + self.width as i64 > frame_w as i64 {
            self.x = frame_w.saturating_sub(self.width);
        }
        if self.y as i64 + self.height as i64 > frame_h as i64 {
            self.y = frame_h.saturating_sub(self.height);
        }
        self
    }

    /// Builds a clamped ROI from a possibly negative proposed top-left
    /// (the original's `roi_x`/`roi_y` are signed `int`s that can go
    /// negative before clamping to zero).
    pub fn from_signed(x: i64, y: i64, width: u32, height: u32, frame_w: u32, frame_h: u32) -> Roi {
        let x = x.max(0) as u32;
        let y = y.max(0) as u32;
        Roi::new(x, y, width, height).clamp_to(frame_w, frame_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roi_clamp_keeps_size_and_shifts_origin() {
        let roi = Roi::new(900, 700, 200, 200).clamp_to(1000, 800);
        assert_eq!(roi.width, 200);
        assert_eq!(roi.height, 200);
        assert_eq!(roi.x, 800);
        assert_eq!(roi.y, 600);
    }

    #[test]
    fn roi_from_signed_clamps_negative_origin_to_zero() {
        let roi = Roi::from_signed(-50, -10, 100, 100, 1000, 800);
        assert_eq!(roi.x, 0);
        assert_eq!(roi.y, 0);
    }

    #[test]
    fn frame_crop_extracts_expected_pixels() {
        let mut data = vec![0u8; 4 * 4 * 3];
        for i in 0..data.len() {
            data[i] = i as u8;
        }
        let frame = Frame::new(4, 4, data);
        let cropped = frame.crop(Roi::new(1, 1, 2, 2));
        assert_eq!(cropped.width(), 2);
        assert_eq!(cropped.height(), 2);
        assert_eq!(cropped.pixel_bgr(0, 0), frame.pixel_bgr(1, 1));
    }

    #[test]
    fn bgr_from_rgb_reorders_channels() {
        let c = Bgr::from_rgb(10, 20, 30);
        assert_eq!(c, Bgr::new(30, 20, 10));
    }
}
