//! Motion-based vehicle counter
//!
//! Per frame: intensity conversion, background subtraction, morphological
//! opening, outermost-region extraction, and a minimum-area filter. The
//! result is a per-frame estimate; nothing is tracked across frames.

pub mod background;
pub mod blobs;
pub mod frame;
pub mod morphology;
pub mod source;


use crate::infra::config::CounterConfig;
use crate::infra::error::SensingError;
use crate::services::CountSource;
use async_trait::async_trait;
use background::BackgroundModel;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use blobs::Blob;
pub use frame::{Frame, GrayFrame};
pub use morphology::Mask;
pub use source::{FrameSource, ImageDirSource, MemorySource};

/// Stateful frame-to-count pipeline; the background model is private to it
pub struct MotionCounter {
    params: CounterConfig,
    model: Option<BackgroundModel>,
}

impl MotionCounter {
    pub fn new(params: CounterConfig) -> Self {
        Self { params, model: None }
    }

    /// Frames folded into the background model so far
    pub fn frames_seen(&self) -> u32 {
        self.model.as_ref().map(|m| m.frames_seen()).unwrap_or(0)
    }

    /// Foreground mask after opening, with the model updated
    pub fn foreground(&mut self, frame: &Frame) -> Result<Mask, SensingError> {
        let gray = frame.to_gray();
        let mask = match self.model.as_mut() {
            Some(model) => model.apply(&gray)?,
            None => {
                // First frame seeds the model; nothing can be foreground yet
                self.model = Some(BackgroundModel::from_first_frame(&gray, &self.params));
                Mask::empty(gray.width, gray.height)
            }
        };
        Ok(mask.open(self.params.kernel_size))
    }

    /// Vehicle estimate for one frame
    pub fn process(&mut self, frame: &Frame) -> Result<u32, SensingError> {
        let mask = self.foreground(frame)?;
        let count = blobs::count_blobs(&mask, self.params.min_area);
        Ok(count as u32)
    }
}

/// Motion counter driven by a frame source at a fixed frame interval
pub struct CameraCounter<S: FrameSource> {
    source: S,
    counter: MotionCounter,
    pacing: Option<Interval>,
    frames: u64,
}

impl<S: FrameSource> CameraCounter<S> {
    /// `frame_interval` of zero processes frames back to back
    pub fn new(source: S, params: CounterConfig, frame_interval: Duration) -> Self {
        let pacing = (!frame_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(frame_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { source, counter: MotionCounter::new(params), pacing, frames: 0 }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl<S: FrameSource> CountSource for CameraCounter<S> {
    async fn next_count(&mut self) -> Option<u32> {
        if let Some(interval) = self.pacing.as_mut() {
            interval.tick().await;
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(SensingError::Exhausted) => {
                info!(frames = %self.frames, "frame_source_exhausted");
                return None;
            }
            Err(e) => {
                warn!(error = %e, frames = %self.frames, "frame_read_failed");
                return None;
            }
        };

        match self.counter.process(&frame) {
            Ok(count) => {
                self.frames += 1;
                debug!(frame = %self.frames, count = %count, "frame_counted");
                Some(count)
            }
            Err(e) => {
                warn!(error = %e, frames = %self.frames, "frame_processing_failed");
                None
            }
        }
    }
}
