//! GIF → JPEG frame conversion.
//!
//! Every `.gif` in the source directory is decoded frame by frame, each frame
//! is fitted to the target size (see [`crate::transform`]) and written as
//! `<gif-name>-<NNNN>.jpg` into the output directory. Zero-padded indices
//! make a sorted directory listing equal to playback order.
//!
//! Failures are isolated per source: a GIF that cannot be opened is reported
//! and skipped, a frame that fails to decode ends that GIF early while the
//! frames already written stay on disk.
//!
//! ## Rust concepts
//! - `image::AnimationDecoder` iterating `Result<Frame>` values
//! - `clap::ValueEnum` on a library type so the CLI can parse it
//! - Passing behaviour in as closures (`confirm`) to keep I/O out of the core

use crate::error::{ConvertError, ConvertResult};
use crate::transform::fit_and_crop;
use crate::{FRAME_EXTENSION, FrameSize, is_running};
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

// ── Options ──────────────────────────────────────────────────────────

/// What to do with files already present in the output directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ClearPolicy {
    /// Delete existing files before converting
    Yes,
    /// Keep existing files; new frames are added (same names are overwritten)
    No,
    /// Ask on the terminal
    Prompt,
}

#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub size: FrameSize,
    /// JPEG quality, 1-100
    pub quality: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(crate::DEFAULT_SOURCE_DIR),
            output_dir: PathBuf::from(crate::DEFAULT_OUTPUT_DIR),
            size: FrameSize::default(),
            quality: crate::DEFAULT_JPEG_QUALITY,
        }
    }
}

// ── Output directory ─────────────────────────────────────────────────

/// State of the output directory after [`prepare_output_dir`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputDirState {
    /// Did not exist; created empty
    Created,
    /// Existed without any files
    Empty,
    /// Existing files were removed
    Cleared(usize),
    /// Existing files were kept
    Kept(usize),
}

/// Count regular files (not subdirectories) directly inside `dir`.
pub fn count_files(dir: &Path) -> io::Result<usize> {
    Ok(fs::read_dir(dir)?
        .flatten()
        .filter(|e| e.path().is_file())
        .count())
}

/// Make sure `dir` exists and decide what happens to files already in it.
///
/// `confirm` is only called for [`ClearPolicy::Prompt`] and only when there
/// is something to clear; it receives the file count.
pub fn prepare_output_dir(
    dir: &Path,
    policy: ClearPolicy,
    confirm: impl FnOnce(usize) -> bool,
) -> io::Result<OutputDirState> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        tracing::info!("Created '{}/' folder", dir.display());
        return Ok(OutputDirState::Created);
    }

    let count = count_files(dir)?;
    if count == 0 {
        return Ok(OutputDirState::Empty);
    }

    let clear = match policy {
        ClearPolicy::Yes => true,
        ClearPolicy::No => false,
        ClearPolicy::Prompt => confirm(count),
    };

    if !clear {
        tracing::info!("Keeping existing files. New frames will be added alongside them.");
        return Ok(OutputDirState::Kept(count));
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_file() {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    tracing::info!("Cleared {} files", removed);
    Ok(OutputDirState::Cleared(removed))
}

/// Ask the operator whether to clear `count` files from `dir`.
///
/// Only an answer starting with `y` (any case) counts as yes.
pub fn ask_to_clear(
    input: &mut impl BufRead,
    output: &mut impl Write,
    dir: &Path,
    count: usize,
) -> io::Result<bool> {
    write!(
        output,
        "'{}/' contains {} files. Clear them? (y/n): ",
        dir.display(),
        count
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().to_lowercase().starts_with('y'))
}

// ── Sources ──────────────────────────────────────────────────────────

/// `.gif` files (any case) directly inside `dir`, sorted by filename.
pub fn list_sources(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("gif"))
        })
        .collect();

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Basic facts about a source GIF, logged before converting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Frames that decode successfully from the start of the file
    pub frames: usize,
}

pub fn inspect_source(path: &Path) -> ConvertResult<SourceInfo> {
    let decoder = open_gif(path)?;
    let (width, height) = decoder.dimensions();
    let frames = decoder
        .into_frames()
        .take_while(|frame| frame.is_ok())
        .count();
    Ok(SourceInfo {
        width,
        height,
        frames,
    })
}

fn open_gif(path: &Path) -> ConvertResult<GifDecoder<BufReader<File>>> {
    let open_error = |source: image::ImageError| ConvertError::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| open_error(image::ImageError::IoError(e)))?;
    GifDecoder::new(BufReader::new(file)).map_err(open_error)
}

// ── Extraction ───────────────────────────────────────────────────────

/// Output filename for frame `index` of the source called `stem`.
pub fn frame_file_name(stem: &str, index: usize) -> String {
    format!("{stem}-{index:04}.{FRAME_EXTENSION}")
}

/// Result of converting one source GIF.
#[derive(Debug)]
pub struct SourceReport {
    pub source: PathBuf,
    pub frames_written: usize,
    /// Why extraction stopped early, if it did
    pub error: Option<ConvertError>,
}

impl SourceReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Encode one fitted frame as a JPEG file.
pub fn write_jpeg(img: &RgbImage, path: &Path, quality: u8) -> ConvertResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
        .encode_image(img)
        .map_err(|source| ConvertError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush()?;
    Ok(())
}

/// Convert every frame of the GIF at `path` into the output directory.
///
/// Frames already written are kept when a later frame fails; the report
/// carries both the count and the error.
pub fn extract_gif_frames(path: &Path, options: &ConvertOptions) -> SourceReport {
    let stem = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();

    let mut written = 0;
    let error = write_frames(path, &stem, options, &mut written).err();

    if let Some(e) = &error {
        if e.is_source_failure() {
            tracing::error!("{}", e);
        } else {
            tracing::warn!("{}: stopped after {} frames: {}", stem, written, e);
        }
    }

    SourceReport {
        source: path.to_path_buf(),
        frames_written: written,
        error,
    }
}

fn write_frames(
    path: &Path,
    stem: &str,
    options: &ConvertOptions,
    written: &mut usize,
) -> ConvertResult<()> {
    let decoder = open_gif(path)?;

    for (index, frame) in decoder.into_frames().enumerate() {
        let frame = frame.map_err(|source| ConvertError::Decode { index, source })?;
        let img = DynamicImage::ImageRgba8(frame.into_buffer());
        let fitted = fit_and_crop(&img, options.size);

        let out_path = options.output_dir.join(frame_file_name(stem, index));
        write_jpeg(&fitted, &out_path, options.quality)?;
        *written += 1;
    }

    Ok(())
}

// ── Whole run ────────────────────────────────────────────────────────

/// Everything that happened during one [`run_conversion`].
#[derive(Debug, Default)]
pub struct ConversionReport {
    /// `None` when the run ended before touching the output directory
    pub output: Option<OutputDirState>,
    pub sources: Vec<SourceReport>,
    /// Stopped by Ctrl+C before all sources were processed
    pub interrupted: bool,
}

impl ConversionReport {
    pub fn total_frames(&self) -> usize {
        self.sources.iter().map(|s| s.frames_written).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_complete()).count()
    }
}

/// Convert all GIFs in `options.source_dir`.
///
/// A missing source directory is created and the run ends with a hint, as
/// does a directory without GIFs. `running` is checked between sources.
pub fn run_conversion(
    options: &ConvertOptions,
    policy: ClearPolicy,
    confirm: impl FnOnce(usize) -> bool,
    running: &AtomicBool,
) -> ConvertResult<ConversionReport> {
    let source_dir = &options.source_dir;
    if !source_dir.exists() {
        fs::create_dir_all(source_dir)?;
        tracing::info!("Created '{}/' folder.", source_dir.display());
        tracing::info!(
            "Please put your .gif files in '{}/' and run again.",
            source_dir.display()
        );
        return Ok(ConversionReport::default());
    }

    let sources = list_sources(source_dir)?;
    if sources.is_empty() {
        tracing::info!("No .gif files found in '{}/'", source_dir.display());
        return Ok(ConversionReport::default());
    }

    tracing::info!(
        "Found {} GIF file(s) in '{}/':",
        sources.len(),
        source_dir.display()
    );
    for path in &sources {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match inspect_source(path) {
            Ok(info) => tracing::info!(
                "  {}: {}x{}, {} frames",
                name,
                info.width,
                info.height,
                info.frames
            ),
            Err(e) => tracing::warn!("  {}: {}", name, e),
        }
    }

    let output = prepare_output_dir(&options.output_dir, policy, confirm)?;
    let mut report = ConversionReport {
        output: Some(output),
        ..Default::default()
    };

    for path in &sources {
        if !is_running(running) {
            tracing::warn!("Interrupted, skipping remaining sources");
            report.interrupted = true;
            break;
        }

        tracing::info!("Processing: {}", path.display());
        let source = extract_gif_frames(path, options);
        tracing::info!("  Extracted {} frames", source.frames_written);
        report.sources.push(source);
    }

    tracing::info!(
        "Done! Total: {} JPEG frames saved to '{}/'",
        report.total_frames(),
        options.output_dir.display()
    );
    tracing::info!("  Resolution: {}", options.size);
    tracing::info!("  Quality: {}", options.quality);

    for sample in verify_samples(&options.output_dir, 3)? {
        tracing::info!(
            "  {}: {}x{}, {:.1} KB",
            sample.name,
            sample.width,
            sample.height,
            sample.bytes as f64 / 1024.0
        );
    }

    Ok(report)
}

// ── Verification ─────────────────────────────────────────────────────

/// A written frame re-opened from disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

/// Re-open the first `limit` frame files (sorted) and report their size.
///
/// Files that fail to decode are skipped with a warning.
pub fn verify_samples(dir: &Path, limit: usize) -> io::Result<Vec<SampleInfo>> {
    let paths = crate::cache::list_frame_files(dir, FRAME_EXTENSION)?;
    let mut samples = Vec::new();

    for path in paths.iter().take(limit) {
        let dims = ImageReader::open(path).and_then(|r| {
            r.into_dimensions()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        });
        match dims {
            Ok((width, height)) => samples.push(SampleInfo {
                name: path
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned(),
                width,
                height,
                bytes: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            }),
            Err(e) => tracing::warn!("Cannot verify {}: {}", path.display(), e),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Frames built from a 16-colour hash so the GIF encoder uses an exact
    /// palette and the LZW data does not compress away.
    fn noisy_frame(w: u32, h: u32, seed: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ seed.wrapping_mul(31)) % 16;
            let c = (v * 16) as u8;
            Rgba([c, 255 - c, c / 2, 255])
        })
    }

    fn write_gif(path: &Path, frames: Vec<RgbaImage>) {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, 10);
            encoder
                .encode_frames(frames.into_iter().map(Frame::new))
                .unwrap();
        }
        fs::write(path, buf).unwrap();
    }

    fn options(tmp: &TempDir) -> ConvertOptions {
        ConvertOptions {
            source_dir: tmp.path().join("sourceGIF"),
            output_dir: tmp.path().join("images"),
            size: FrameSize::new(240, 320),
            quality: 85,
        }
    }

    fn setup(tmp: &TempDir) -> ConvertOptions {
        let opts = options(tmp);
        fs::create_dir_all(&opts.source_dir).unwrap();
        fs::create_dir_all(&opts.output_dir).unwrap();
        opts
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn running() -> AtomicBool {
        AtomicBool::new(true)
    }

    // ── Naming ────────────────────────────────────────────────────────

    #[rstest]
    #[case("anim", 0, "anim-0000.jpg")]
    #[case("anim", 42, "anim-0042.jpg")]
    #[case("cat dance", 9999, "cat dance-9999.jpg")]
    #[case("x", 12345, "x-12345.jpg")]
    fn test_frame_file_name(#[case] stem: &str, #[case] index: usize, #[case] expected: &str) {
        assert_eq!(frame_file_name(stem, index), expected);
    }

    #[test]
    fn padded_names_sort_in_frame_order() {
        let mut names: Vec<String> = [10, 2, 100, 0].iter().map(|&i| frame_file_name("a", i)).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["a-0000.jpg", "a-0002.jpg", "a-0010.jpg", "a-0100.jpg"]
        );
    }

    // ── Extraction ────────────────────────────────────────────────────

    #[test]
    fn three_frame_landscape_gif_becomes_three_portrait_jpegs() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let gif = opts.source_dir.join("anim.gif");
        write_gif(&gif, (0..3).map(|i| noisy_frame(400, 300, i)).collect());

        let report = extract_gif_frames(&gif, &opts);
        assert_eq!(report.frames_written, 3);
        assert!(report.is_complete());
        assert_eq!(
            file_names(&opts.output_dir),
            vec!["anim-0000.jpg", "anim-0001.jpg", "anim-0002.jpg"]
        );

        for name in file_names(&opts.output_dir) {
            let img = ImageReader::open(opts.output_dir.join(name))
                .unwrap()
                .decode()
                .unwrap();
            assert_eq!((img.width(), img.height()), (240, 320));
            assert!(!img.color().has_alpha());
        }
    }

    #[test]
    fn transparent_gif_frames_are_written_black() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let gif = opts.source_dir.join("ghost.gif");
        let mut frame = RgbaImage::from_pixel(40, 40, Rgba([250, 250, 250, 0]));
        frame.put_pixel(0, 0, Rgba([250, 250, 250, 255]));
        write_gif(&gif, vec![frame]);

        let report = extract_gif_frames(&gif, &opts);
        assert_eq!(report.frames_written, 1);

        let img = ImageReader::open(opts.output_dir.join("ghost-0000.jpg"))
            .unwrap()
            .decode()
            .unwrap()
            .to_rgb8();
        let center = img.get_pixel(120, 160);
        assert!(center.0.iter().all(|&c| c < 16), "center was {center:?}");
    }

    #[test]
    fn unreadable_source_reports_zero_frames() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let bogus = opts.source_dir.join("bogus.gif");
        fs::write(&bogus, b"definitely not a gif").unwrap();

        let report = extract_gif_frames(&bogus, &opts);
        assert_eq!(report.frames_written, 0);
        assert!(matches!(report.error, Some(ConvertError::Open { .. })));
        assert!(file_names(&opts.output_dir).is_empty());
    }

    #[test]
    fn missing_source_reports_open_error() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let report = extract_gif_frames(&opts.source_dir.join("gone.gif"), &opts);
        assert!(report.error.as_ref().is_some_and(ConvertError::is_source_failure));
    }

    #[test]
    fn truncated_gif_keeps_frames_written_so_far() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let gif = opts.source_dir.join("cut.gif");
        write_gif(&gif, (0..3).map(|i| noisy_frame(200, 200, i)).collect());

        let bytes = fs::read(&gif).unwrap();
        fs::write(&gif, &bytes[..bytes.len() * 7 / 10]).unwrap();

        let report = extract_gif_frames(&gif, &opts);
        assert!((1..3).contains(&report.frames_written));
        let expected: Vec<String> = (0..report.frames_written)
            .map(|i| frame_file_name("cut", i))
            .collect();
        assert_eq!(file_names(&opts.output_dir), expected);
    }

    // ── Output directory ──────────────────────────────────────────────

    fn prefill(dir: &Path, n: usize) {
        fs::create_dir_all(dir).unwrap();
        for i in 0..n {
            fs::write(dir.join(format!("old-{i:04}.jpg")), b"old").unwrap();
        }
    }

    #[test]
    fn missing_output_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("images");
        let state = prepare_output_dir(&dir, ClearPolicy::Prompt, |_| panic!("no prompt")).unwrap();
        assert_eq!(state, OutputDirState::Created);
        assert!(dir.is_dir());
    }

    #[test]
    fn empty_output_dir_needs_no_decision() {
        let tmp = TempDir::new().unwrap();
        let state =
            prepare_output_dir(tmp.path(), ClearPolicy::Prompt, |_| panic!("no prompt")).unwrap();
        assert_eq!(state, OutputDirState::Empty);
    }

    #[rstest]
    #[case(ClearPolicy::Yes, OutputDirState::Cleared(5), 0)]
    #[case(ClearPolicy::No, OutputDirState::Kept(5), 5)]
    fn policy_decides_without_prompting(
        #[case] policy: ClearPolicy,
        #[case] expected: OutputDirState,
        #[case] remaining: usize,
    ) {
        let tmp = TempDir::new().unwrap();
        prefill(tmp.path(), 5);
        let state = prepare_output_dir(tmp.path(), policy, |_| panic!("no prompt")).unwrap();
        assert_eq!(state, expected);
        assert_eq!(count_files(tmp.path()).unwrap(), remaining);
    }

    #[rstest]
    #[case(true, OutputDirState::Cleared(5))]
    #[case(false, OutputDirState::Kept(5))]
    fn prompt_policy_asks_with_file_count(#[case] answer: bool, #[case] expected: OutputDirState) {
        let tmp = TempDir::new().unwrap();
        prefill(tmp.path(), 5);
        let mut asked = None;
        let state = prepare_output_dir(tmp.path(), ClearPolicy::Prompt, |n| {
            asked = Some(n);
            answer
        })
        .unwrap();
        assert_eq!(asked, Some(5));
        assert_eq!(state, expected);
    }

    #[test]
    fn clearing_leaves_subdirectories_alone() {
        let tmp = TempDir::new().unwrap();
        prefill(tmp.path(), 2);
        fs::create_dir(tmp.path().join("keep")).unwrap();
        let state = prepare_output_dir(tmp.path(), ClearPolicy::Yes, |_| true).unwrap();
        assert_eq!(state, OutputDirState::Cleared(2));
        assert!(tmp.path().join("keep").is_dir());
    }

    #[rstest]
    #[case("y\n", true)]
    #[case("Y\n", true)]
    #[case("  yes \n", true)]
    #[case("n\n", false)]
    #[case("\n", false)]
    #[case("", false)]
    fn test_ask_to_clear(#[case] typed: &str, #[case] expected: bool) {
        let mut input = Cursor::new(typed.as_bytes());
        let mut output = Vec::new();
        let answer = ask_to_clear(&mut input, &mut output, Path::new("images"), 5).unwrap();
        assert_eq!(answer, expected);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "'images/' contains 5 files. Clear them? (y/n): "
        );
    }

    // ── Whole run ─────────────────────────────────────────────────────

    #[test]
    fn list_sources_is_sorted_and_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.gif", "A.GIF", "c.Gif", "d.png", "e.txt"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = list_sources(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.GIF", "b.gif", "c.Gif"]);
    }

    #[test]
    fn inspect_source_counts_frames() {
        let tmp = TempDir::new().unwrap();
        let gif = tmp.path().join("two.gif");
        write_gif(&gif, (0..2).map(|i| noisy_frame(30, 20, i)).collect());
        assert_eq!(
            inspect_source(&gif).unwrap(),
            SourceInfo {
                width: 30,
                height: 20,
                frames: 2,
            }
        );
    }

    #[test]
    fn missing_source_dir_is_created_and_run_ends() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp);
        let report = run_conversion(&opts, ClearPolicy::Yes, |_| true, &running()).unwrap();
        assert!(opts.source_dir.is_dir());
        assert_eq!(report.output, None);
        assert_eq!(report.total_frames(), 0);
        assert!(!opts.output_dir.exists());
    }

    #[test]
    fn declined_clear_adds_new_frames_alongside_old() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp);
        fs::create_dir_all(&opts.source_dir).unwrap();
        prefill(&opts.output_dir, 5);
        write_gif(
            &opts.source_dir.join("duo.gif"),
            (0..2).map(|i| noisy_frame(64, 64, i)).collect(),
        );

        let report = run_conversion(&opts, ClearPolicy::Prompt, |_| false, &running()).unwrap();
        assert_eq!(report.output, Some(OutputDirState::Kept(5)));
        assert_eq!(report.total_frames(), 2);
        assert_eq!(count_files(&opts.output_dir).unwrap(), 7);
    }

    #[test]
    fn colliding_names_are_overwritten_not_duplicated() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp);
        fs::create_dir_all(&opts.source_dir).unwrap();
        fs::create_dir_all(&opts.output_dir).unwrap();
        fs::write(opts.output_dir.join("duo-0000.jpg"), b"stale").unwrap();
        write_gif(
            &opts.source_dir.join("duo.gif"),
            (0..2).map(|i| noisy_frame(64, 64, i)).collect(),
        );

        run_conversion(&opts, ClearPolicy::No, |_| false, &running()).unwrap();
        assert_eq!(
            file_names(&opts.output_dir),
            vec!["duo-0000.jpg", "duo-0001.jpg"]
        );
        assert_ne!(fs::read(opts.output_dir.join("duo-0000.jpg")).unwrap(), b"stale");
    }

    #[test]
    fn bad_source_does_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp);
        fs::create_dir_all(&opts.source_dir).unwrap();
        fs::write(opts.source_dir.join("a-broken.gif"), b"GIF89a garbage").unwrap();
        write_gif(
            &opts.source_dir.join("b-good.gif"),
            vec![noisy_frame(32, 32, 1)],
        );

        let report = run_conversion(&opts, ClearPolicy::Yes, |_| true, &running()).unwrap();
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.failed_sources(), 1);
        assert_eq!(report.total_frames(), 1);
        assert_eq!(file_names(&opts.output_dir), vec!["b-good-0000.jpg"]);
    }

    #[test]
    fn interrupted_run_skips_remaining_sources() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp);
        fs::create_dir_all(&opts.source_dir).unwrap();
        write_gif(&opts.source_dir.join("a.gif"), vec![noisy_frame(8, 8, 0)]);

        let stopped = AtomicBool::new(false);
        let report = run_conversion(&opts, ClearPolicy::Yes, |_| true, &stopped).unwrap();
        assert!(report.interrupted);
        assert!(report.sources.is_empty());
    }

    #[test]
    fn verify_samples_reads_first_files() {
        let tmp = TempDir::new().unwrap();
        let opts = setup(&tmp);
        let gif = opts.source_dir.join("v.gif");
        write_gif(&gif, (0..4).map(|i| noisy_frame(50, 50, i)).collect());
        extract_gif_frames(&gif, &opts);

        let samples = verify_samples(&opts.output_dir, 3).unwrap();
        let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["v-0000.jpg", "v-0001.jpg", "v-0002.jpg"]);
        assert!(samples.iter().all(|s| (s.width, s.height) == (240, 320) && s.bytes > 0));
    }
}
