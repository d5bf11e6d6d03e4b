//! Shared types for the GIF frame converter and the frame streaming server.
//!
//! The crate has two halves that only meet through a directory of JPEG files:
//! - `convert` turns every frame of every source GIF into a `width × height` JPEG
//! - `cache` + `server` load that directory into memory and hand frames out
//!   round-robin over HTTP (single pull or continuous stream)
//!
//! This module holds the pieces both halves share: the target frame size,
//! default paths, and Ctrl+C handling.

pub mod cache;
pub mod convert;
pub mod error;
pub mod server;
pub mod transform;
pub mod wire;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Defaults ───────────────────────────────────────────────────────

/// Directory scanned for source `.gif` files.
pub const DEFAULT_SOURCE_DIR: &str = "sourceGIF";

/// Directory the converter writes frames to and the server reads from.
pub const DEFAULT_OUTPUT_DIR: &str = "images";

/// JPEG quality used for every written frame.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Extension of the frame files shared by both halves.
pub const FRAME_EXTENSION: &str = "jpg";

// ── Frame size ─────────────────────────────────────────────────────

/// Target resolution of every prepared frame.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (it's just two u32s), so it is
/// passed by value through the converter and the server alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels in one frame.
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Number of bytes of one RGB565 frame (2 bytes per pixel).
    pub fn rgb565_byte_count(&self) -> usize {
        self.pixel_count() as usize * 2
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

/// 240×320 portrait, the ILI9341-style panel the ESP32 client drives.
impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 240,
            height: 320,
        }
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── Signal handling ────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the conversion loop and the signal handler.
/// `AtomicBool` is a thread-safe boolean — no mutex needed for a single bool.
///
/// Fails if a handler has already been installed for this process.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
