//! Image-processing primitives: BGR/HSV/gray conversion, thresholding,
//! morphology, contour extraction, and moments.
//!
//! Contour-finding and morphology are backed by `imageproc`, the closest
//! real-ecosystem analog to the original's OpenCV calls. Color-space
//! conversion and mean/moments are hand-rolled against OpenCV's exact 8-bit
//! HSV quantization (`h` in `[0,180)`, `s`/`v` in `[0,255]`), since no
//! published Rust color crate reproduces that quantization.

use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_polygon_mut;
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point as ImgPoint;

use crate::core::{Bgr, Frame, Hsv};
use crate::geometry::Point;

/// Radius of the shared 5x5 rectangular structuring element used for
/// erode/dilate throughout calibration and tracking (`ks = 5`).
pub const MORPH_RADIUS: u8 = 2;

/// Converts one BGR pixel to HSV using OpenCV's 8-bit quantization.
pub fn bgr_to_hsv_pixel(c: Bgr) -> Hsv {
    let (b, g, r) = (c.b as f64, c.g as f64, c.r as f64);
    let max = b.max(g).max(r);
    let min = b.min(g).min(r);
    let delta = max - min;

    let v = max;
    let s = if max <= 0.0 { 0.0 } else { delta / max * 255.0 };

    let h = if delta <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    // OpenCV scales the 0-360 hue to a single byte: 0-180.
    Hsv::new(h / 2.0, s, v)
}

/// Converts one HSV color (OpenCV's 8-bit quantization) back to BGR. Used
/// to reconstruct an approximate observed-color sample when only a
/// persisted HSV value is available (quick-verify, §4.3.1), since the
/// revert-on-drift path needs a BGR triple, not just HSV.
pub fn hsv_to_bgr_pixel(hsv: Hsv) -> Bgr {
    let h = (hsv.h * 2.0).rem_euclid(360.0);
    let s = (hsv.s / 255.0).clamp(0.0, 1.0);
    let v = hsv.v.clamp(0.0, 255.0);

    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r1, g1, b1) = match h as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Bgr::new(
        (b1 + m).round().clamp(0.0, 255.0) as u8,
        (g1 + m).round().clamp(0.0, 255.0) as u8,
        (r1 + m).round().clamp(0.0, 255.0) as u8,
    )
}

/// Converts an entire frame to a flat row-major HSV buffer.
pub fn frame_to_hsv(frame: &Frame) -> Vec<Hsv> {
    let mut out = Vec::with_capacity((frame.width() * frame.height()) as usize);
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            out.push(bgr_to_hsv_pixel(frame.pixel_bgr(x, y)));
        }
    }
    out
}

/// Converts a frame to grayscale using the standard BT.601-ish luma
/// weighting `image` itself uses for `Luma` conversion from RGB, applied to
/// BGR order.
pub fn to_gray(frame: &Frame) -> GrayImage {
    let mut img = GrayImage::new(frame.width(), frame.height());
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let px = frame.pixel_bgr(x, y);
            let luma = 0.114 * px.b as f64 + 0.587 * px.g as f64 + 0.299 * px.r as f64;
            img.put_pixel(x, y, Luma([luma.round().clamp(0.0, 255.0) as u8]));
        }
    }
    img
}

/// Absolute per-pixel difference of two equally-sized grayscale images.
pub fn absdiff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = a.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let av = a.get_pixel(x, y).0[0] as i16;
            let bv = b.get_pixel(x, y).0[0] as i16;
            out.put_pixel(x, y, Luma([(av - bv).unsigned_abs() as u8]));
        }
    }
    out
}

/// Binary threshold: pixels `>= t` become 255, others 0.
pub fn threshold(img: &GrayImage, t: u8) -> GrayImage {
    let mut out = img.clone();
    for px in out.pixels_mut() {
        px.0[0] = if px.0[0] >= t { 0xFF } else { 0 };
    }
    out
}

/// Erode then dilate with the shared 5x5 rectangular structuring element.
pub fn erode_dilate(img: &GrayImage) -> GrayImage {
    let eroded = erode(img, Norm::LInf, MORPH_RADIUS);
    dilate(&eroded, Norm::LInf, MORPH_RADIUS)
}

/// Bitwise AND of two binary (0/255) masks.
pub fn and_masks(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = a.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let av = a.get_pixel(x, y).0[0];
            let bv = b.get_pixel(x, y).0[0];
            out.put_pixel(x, y, Luma([if av != 0 && bv != 0 { 0xFF } else { 0 }]));
        }
    }
    out
}

/// Produces a binary mask where every pixel whose HSV value falls within
/// `[min, max]` (channel-wise, no hue wraparound — matching the original's
/// plain `cvInRangeS`) is set.
pub fn in_range(frame: &Frame, min: Hsv, max: Hsv) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let hsv = bgr_to_hsv_pixel(frame.pixel_bgr(x, y));
            let hit = hsv.h >= min.h
                && hsv.h <= max.h
                && hsv.s >= min.s
                && hsv.s <= max.s
                && hsv.v >= min.v
                && hsv.v <= max.v;
            out.put_pixel(x, y, Luma([if hit { 0xFF } else { 0 }]));
        }
    }
    out
}

/// A contour as an ordered list of pixel coordinates, plus its polygon
/// area (shoelace formula, matching `cvContourArea`).
#[derive(Clone, Debug)]
pub struct Contour {
    pub points: Vec<Point>,
    pub area: f64,
}

fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..points.len() {
        let p0 = points[i];
        let p1 = points[(i + 1) % points.len()];
        sum += p0.x * p1.y - p1.x * p0.y;
    }
    (sum / 2.0).abs()
}

/// Finds the contour with the largest polygon area in a binary mask,
/// mirroring `psmove_tracker_biggest_contour` (external retrieval,
/// chain-approx-simple is approximated by `imageproc`'s border tracing).
pub fn largest_contour(mask: &GrayImage) -> Option<Contour> {
    let contours = find_contours::<u32>(mask);
    contours
        .into_iter()
        .map(|c| {
            let points: Vec<Point> = c
                .points
                .iter()
                .map(|p| Point::new(p.x as f64, p.y as f64))
                .collect();
            let area = polygon_area(&points);
            Contour { points, area }
        })
        .filter(|c| c.area > 0.0)
        .fold(None, |best: Option<Contour>, cur| match best {
            Some(b) if b.area >= cur.area => Some(b),
            _ => Some(cur),
        })
}

/// Axis-aligned bounding box of a contour's points: `(x, y, width, height)`.
pub fn bounding_rect(points: &[Point]) -> (i64, i64, u32, u32) {
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    (
        min_x.floor() as i64,
        min_y.floor() as i64,
        (max_x - min_x).round().max(1.0) as u32,
        (max_y - min_y).round().max(1.0) as u32,
    )
}

/// Clears `mask` and repaints only the given contour, filled, mirroring the
/// `cvSet` + `cvDrawContours(..., CV_FILLED, ...)` sequence used both in
/// calibration and per-frame tracking.
pub fn fill_only_contour(mask: &mut GrayImage, contour: &Contour) {
    for px in mask.pixels_mut() {
        px.0[0] = 0;
    }
    if contour.points.len() < 3 {
        for p in &contour.points {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([0xFF]));
        }
        return;
    }
    let poly: Vec<ImgPoint<i32>> = contour
        .points
        .iter()
        .map(|p| ImgPoint::new(p.x as i32, p.y as i32))
        .collect();
    draw_polygon_mut(mask, &poly, Luma([0xFF]));
}

/// Number of non-zero pixels in a mask.
pub fn count_non_zero(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] != 0).count()
}

/// Image moments centroid `(m10/m00, m01/m00)` of a binary mask, or `None`
/// if the mask is empty (`m00 == 0`).
pub fn moments_centroid(mask: &GrayImage) -> Option<(f64, f64)> {
    let mut m00 = 0.0f64;
    let mut m10 = 0.0f64;
    let mut m01 = 0.0f64;
    for (x, y, px) in mask.enumerate_pixels() {
        if px.0[0] != 0 {
            m00 += 1.0;
            m10 += x as f64;
            m01 += y as f64;
        }
    }
    if m00 == 0.0 {
        None
    } else {
        Some((m10 / m00, m01 / m00))
    }
}

/// Mean BGR color of `frame` restricted to non-zero pixels of `mask`,
/// mirroring `cvAvg(frame, mask)`. Returns `(b, g, r)` as floats since
/// color adaptation averages this against an already-fractional estimate.
pub fn mean_under_mask(frame: &Frame, mask: &GrayImage) -> (f64, f64, f64) {
    let mut sum = [0.0f64; 3];
    let mut n = 0u64;
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            if mask.get_pixel(x, y).0[0] != 0 {
                let px = frame.pixel_bgr(x, y);
                sum[0] += px.b as f64;
                sum[1] += px.g as f64;
                sum[2] += px.r as f64;
                n += 1;
            }
        }
    }
    if n == 0 {
        (0.0, 0.0, 0.0)
    } else {
        (sum[0] / n as f64, sum[1] / n as f64, sum[2] / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, c: Bgr) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _ in 0..(w * h) {
            data.push(c.b);
            data.push(c.g);
            data.push(c.r);
        }
        Frame::new(w, h, data)
    }

    #[test]
    fn bgr_to_hsv_pure_red_has_hue_zero() {
        let hsv = bgr_to_hsv_pixel(Bgr::from_rgb(255, 0, 0));
        assert_eq!(hsv.h, 0.0);
        assert_eq!(hsv.s, 255.0);
        assert_eq!(hsv.v, 255.0);
    }

    #[test]
    fn bgr_to_hsv_pure_green_has_hue_60_scaled() {
        let hsv = bgr_to_hsv_pixel(Bgr::from_rgb(0, 255, 0));
        // 120 degrees / 2 (OpenCV 8-bit quantization) = 60.
        assert!((hsv.h - 60.0).abs() < 1e-9);
    }

    #[test]
    fn in_range_matches_solid_color_frame() {
        let frame = solid_frame(4, 4, Bgr::from_rgb(255, 0, 255)); // magenta
        let hsv = bgr_to_hsv_pixel(frame.pixel_bgr(0, 0));
        let range = Hsv::new(12.0, 85.0, 85.0);
        let mask = in_range(&frame, hsv.minus(range), hsv.plus(range));
        assert_eq!(count_non_zero(&mask), 16);
    }

    #[test]
    fn threshold_is_binary() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([10]));
        img.put_pixel(1, 0, Luma([200]));
        let out = threshold(&img, 20);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 0xFF);
    }

    #[test]
    fn hsv_to_bgr_round_trips_pure_red() {
        let hsv = bgr_to_hsv_pixel(Bgr::from_rgb(255, 0, 0));
        let back = hsv_to_bgr_pixel(hsv);
        assert_eq!(back, Bgr::from_rgb(255, 0, 0));
    }

    #[test]
    fn mean_under_mask_ignores_unmasked_pixels() {
        let frame = solid_frame(2, 1, Bgr::new(10, 20, 30));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([0xFF]));
        let (b, g, r) = mean_under_mask(&frame, &mask);
        assert_eq!((b, g, r), (10.0, 20.0, 30.0));
    }
}
