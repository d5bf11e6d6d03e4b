//! Byte layouts the ESP32 client decodes.
//!
//! Two formats, never mixed on one path:
//! - MJPEG: JPEG frames wrapped in `multipart/x-mixed-replace` parts
//! - RGB565: raw `width × height × 2` byte frames, big-endian, no framing

use crate::FrameSize;
use axum::body::Bytes;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use std::io::Cursor;

/// Multipart boundary name. Fixed: the client's decoder looks for `--frame`.
pub const MJPEG_BOUNDARY: &str = "frame";

/// `Content-Type` of the MJPEG stream response.
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

pub const RAW_CONTENT_TYPE: &str = "application/octet-stream";

/// Wrap one JPEG in its multipart part:
/// boundary, content type, explicit length, blank line, payload, CRLF.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{MJPEG_BOUNDARY}\r\nContent-Type: {JPEG_CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Pack one pixel as RGB565: 5 bits red (high), 6 bits green, 5 bits blue.
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Encode a whole image row-major as big-endian RGB565.
pub fn encode_rgb565(img: &RgbImage) -> Vec<u8> {
    let mut data = Vec::with_capacity(img.width() as usize * img.height() as usize * 2);
    for pixel in img.pixels() {
        let [r, g, b] = pixel.0;
        data.extend_from_slice(&rgb565(r, g, b).to_be_bytes());
    }
    data
}

/// Decode a cached JPEG and turn it into one raw RGB565 frame of `size`.
///
/// Frames produced by the converter already match `size`; anything else is
/// resized (Lanczos3) so the client always receives exactly
/// `width × height × 2` bytes.
pub fn jpeg_to_rgb565(jpeg: &[u8], size: FrameSize) -> Result<Vec<u8>, image::ImageError> {
    let img = ImageReader::new(Cursor::new(jpeg))
        .with_guessed_format()?
        .decode()?;

    let rgb = if img.width() == size.width && img.height() == size.height {
        img.to_rgb8()
    } else {
        img.resize_exact(size.width, size.height, FilterType::Lanczos3)
            .to_rgb8()
    };

    Ok(encode_rgb565(&rgb))
}
