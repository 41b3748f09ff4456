//! Frame sources feeding the motion counter

use super::frame::Frame;
use crate::infra::error::SensingError;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "pgm", "ppm", "pnm"];

/// Ordered, non-restartable sequence of frames
///
/// `Err(SensingError::Exhausted)` marks the end of the session; any other
/// error is a read failure. Either way the caller stops pulling.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, SensingError>;
}

/// Frames decoded from the image files of one directory, in file-name order
///
/// Stands in for a camera session: a recording dumped as numbered stills.
pub struct ImageDirSource {
    files: VecDeque<PathBuf>,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SensingError> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        info!(dir = %dir.display(), frames = %files.len(), "frame_source_opened");
        Ok(Self { files: files.into() })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Frame, SensingError> {
        let path = self.files.pop_front().ok_or(SensingError::Exhausted)?;
        // The counter only looks at intensity, so decode straight to luma
        let image = image::open(&path)
            .map_err(|source| SensingError::Read { path: path.display().to_string(), source })?
            .to_luma8();
        let (width, height) = image.dimensions();
        Frame::new(width as usize, height as usize, 1, image.into_raw())
    }
}

/// In-memory frames, mostly for tests and replay
#[derive(Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self { frames: frames.into_iter().collect() }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Frame, SensingError> {
        self.frames.pop_front().ok_or(SensingError::Exhausted)
    }
}
