//! Fit-and-crop: map any source frame onto an exact target size.
//!
//! The frame is flattened onto black, rotated when a landscape source meets a
//! portrait target, scaled uniformly until it covers the whole target, and
//! finally center-cropped. No letterboxing, no non-uniform stretching.
//!
//! ## Rust concepts
//! - `image::imageops` free functions over `ImageBuffer`
//! - Pure functions returning owned buffers (no hidden state)

use crate::FrameSize;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Composite an image with alpha onto an opaque black background.
///
/// Fully transparent pixels become black, partially transparent pixels are
/// blended toward black. The result never carries an alpha channel.
pub fn flatten_onto_black(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    flatten_rgba(&rgba)
}

fn flatten_rgba(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([blend(r, a), blend(g, a), blend(b, a)])
    })
}

/// `channel * alpha` against a black background, rounded.
fn blend(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16 + 127) / 255) as u8
}

/// Whether the source must be turned 90° before fitting.
pub fn needs_rotation(src_w: u32, src_h: u32, target: FrameSize) -> bool {
    src_w > src_h && target.is_portrait()
}

/// Uniform scale factor that makes the source cover the target entirely.
pub fn fill_scale(src_w: u32, src_h: u32, target: FrameSize) -> f64 {
    let sx = target.width as f64 / src_w as f64;
    let sy = target.height as f64 / src_h as f64;
    sx.max(sy)
}

/// Size of the source after fill scaling, truncated to whole pixels.
///
/// Never smaller than the target on either axis, so the crop that follows
/// always has enough pixels even when float rounding lands just below.
pub fn scaled_size(src_w: u32, src_h: u32, target: FrameSize) -> (u32, u32) {
    let scale = fill_scale(src_w, src_h, target);
    let w = (src_w as f64 * scale) as u32;
    let h = (src_h as f64 * scale) as u32;
    (w.max(target.width), h.max(target.height))
}

/// Top-left corner of a centered `target` window inside a `scaled` image.
pub fn crop_origin(scaled_w: u32, scaled_h: u32, target: FrameSize) -> (u32, u32) {
    (
        scaled_w.saturating_sub(target.width) / 2,
        scaled_h.saturating_sub(target.height) / 2,
    )
}

/// Fit `img` into exactly `target` pixels: flatten, auto-rotate, fill, crop.
pub fn fit_and_crop(img: &DynamicImage, target: FrameSize) -> RgbImage {
    let mut rgb = flatten_onto_black(img);

    if rgb.width() == 0 || rgb.height() == 0 {
        return RgbImage::new(target.width, target.height);
    }

    if needs_rotation(rgb.width(), rgb.height(), target) {
        // Counter-clockwise quarter turn.
        rgb = imageops::rotate270(&rgb);
    }

    let (src_w, src_h) = rgb.dimensions();
    if src_w == target.width && src_h == target.height {
        return rgb;
    }

    let (new_w, new_h) = scaled_size(src_w, src_h, target);
    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Lanczos3);

    let (left, top) = crop_origin(new_w, new_h, target);
    imageops::crop_imm(&resized, left, top, target.width, target.height).to_image()
}
