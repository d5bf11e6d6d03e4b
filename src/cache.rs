//! Frame cache: load prepared frames into memory and hand them out round-robin.
//!
//! The cache is rebuilt wholesale from a [`FrameSource`] (normally a
//! directory of `.jpg` files) and served through a rotation cursor. Each time
//! the cursor wraps back to the first frame, the next request reloads the
//! source first, so new frames show up without restarting the server.
//!
//! ## Rust concepts
//! - Trait objects (`dyn FrameSource`) as the seam between I/O and logic
//! - `Mutex` guarding "maybe reload, read, advance" as one critical section
//! - `Bytes` for cheap, reference-counted clones of frame buffers

use axum::body::Bytes;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ── Sources ──────────────────────────────────────────────────────────

/// Where the cache gets its frames from.
///
/// `load` must return the complete frame set in playback order. The server
/// never merges results; every call replaces the whole cache.
pub trait FrameSource: Send + Sync {
    fn load(&self) -> io::Result<Vec<Bytes>>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}

/// Frames stored as individual files in one flat directory.
pub struct DirFrameSource {
    dir: PathBuf,
    extension: String,
}

impl DirFrameSource {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }
}

impl FrameSource for DirFrameSource {
    fn load(&self) -> io::Result<Vec<Bytes>> {
        load_frames(&self.dir, &self.extension)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// List frame files with the given extension, sorted by filename.
///
/// A missing directory is treated as empty. Zero-padded frame indices make
/// filename order equal to playback order.
pub fn list_frame_files(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut paths: Vec<PathBuf> = read_dir
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Read every frame file into memory, in filename order.
///
/// Files that disappear or fail to read between listing and reading are
/// skipped with a warning.
pub fn load_frames(dir: &Path, extension: &str) -> io::Result<Vec<Bytes>> {
    let paths = list_frame_files(dir, extension)?;
    let mut frames = Vec::with_capacity(paths.len());

    for path in &paths {
        match fs::read(path) {
            Ok(data) => frames.push(Bytes::from(data)),
            Err(e) => tracing::warn!("Skipping frame {}: {}", path.display(), e),
        }
    }

    Ok(frames)
}

// ── Rotation ─────────────────────────────────────────────────────────

/// Whether the ring currently has anything to serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingState {
    Empty,
    Serving,
}

/// The frame cache plus its rotation cursor.
///
/// Invariant: `cursor < frames.len()` whenever `frames` is non-empty.
/// `wrapped` is set when the cursor has just moved from the last frame back
/// to the first; the next request reloads before serving.
#[derive(Default)]
pub struct FrameRing {
    frames: Vec<Bytes>,
    cursor: usize,
    wrapped: bool,
    reloads: u64,
}

impl FrameRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RingState {
        if self.frames.is_empty() {
            RingState::Empty
        } else {
            RingState::Serving
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of reload attempts since creation.
    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    pub fn total_bytes(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Replace the whole cache from `source` and reset the cursor.
    ///
    /// On a load error the previous frames are kept; a reload never leaves
    /// a half-built cache behind.
    pub fn reload(&mut self, source: &dyn FrameSource) {
        self.reloads += 1;
        self.wrapped = false;

        match source.load() {
            Ok(frames) => {
                let total: usize = frames.iter().map(Bytes::len).sum();
                if frames.is_empty() {
                    tracing::info!("No frames in {}", source.describe());
                } else {
                    tracing::info!(
                        "Loaded {} frames ({} KB total) from {}",
                        frames.len(),
                        total / 1024,
                        source.describe()
                    );
                }
                self.frames = frames;
                self.cursor = 0;
            }
            Err(e) => {
                tracing::warn!(
                    "Reload from {} failed, keeping {} cached frames: {}",
                    source.describe(),
                    self.frames.len(),
                    e
                );
                if self.cursor >= self.frames.len() {
                    self.cursor = 0;
                }
            }
        }
    }

    /// Serve the frame under the cursor and advance it.
    ///
    /// Transitions:
    /// - `Empty`: reload; still empty means `None`
    /// - `Serving` right after a wrap: reload, then serve from the new set
    /// - `Serving` otherwise: serve directly
    pub fn next_frame(&mut self, source: &dyn FrameSource) -> Option<Bytes> {
        match self.state() {
            RingState::Empty => self.reload(source),
            RingState::Serving if self.wrapped => {
                let before = self.frames.len();
                self.reload(source);
                if self.frames.len() != before {
                    tracing::info!("Reloaded: {} -> {} frames", before, self.frames.len());
                }
            }
            RingState::Serving => {}
        }

        let frame = self.frames.get(self.cursor)?.clone();
        self.advance();
        Some(frame)
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.wrapped = self.cursor == 0;
    }
}

// ── Shared server state ─────────────────────────────────────────────

/// Snapshot of the cache for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CacheStatus {
    /// Number of cached frames
    pub frames: usize,
    /// Index of the next frame to be served
    pub cursor: usize,
    /// Sum of all cached frame sizes in bytes
    pub total_bytes: usize,
    /// Reload attempts since startup
    pub reloads: u64,
}

/// A [`FrameRing`] bound to its source, safe to share between handlers.
///
/// All access goes through one mutex: a reader never sees a half-replaced
/// cache or a cursor that belongs to an older frame set.
pub struct FrameServer {
    source: Box<dyn FrameSource>,
    ring: Mutex<FrameRing>,
}

impl FrameServer {
    /// Create a server with an empty cache. Call [`FrameServer::reload`] to
    /// load eagerly, or let the first request do it.
    pub fn new(source: impl FrameSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            ring: Mutex::new(FrameRing::new()),
        }
    }

    fn ring(&self) -> MutexGuard<'_, FrameRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the cache now. Returns the new frame count.
    pub fn reload(&self) -> usize {
        let mut ring = self.ring();
        ring.reload(self.source.as_ref());
        ring.len()
    }

    /// Next frame in rotation, or `None` when nothing is available.
    pub fn next_frame(&self) -> Option<Bytes> {
        self.ring().next_frame(self.source.as_ref())
    }

    pub fn frame_count(&self) -> usize {
        self.ring().len()
    }

    pub fn status(&self) -> CacheStatus {
        let ring = self.ring();
        CacheStatus {
            frames: ring.len(),
            cursor: ring.cursor(),
            total_bytes: ring.total_bytes(),
            reloads: ring.reloads(),
        }
    }

    pub fn describe_source(&self) -> String {
        self.source.describe()
    }
}
