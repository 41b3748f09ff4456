//! Adaptive per-pixel background model
//!
//! Each pixel keeps a running Gaussian (mean, variance). A pixel is
//! foreground when its squared deviation from the mean exceeds
//! `var_threshold` variances. Both moments adapt every frame with a
//! learning rate of `1 / min(frames_seen, history)`, so the first frames
//! converge quickly and later frames follow a fixed-length window.

use super::frame::GrayFrame;
use super::morphology::Mask;
use crate::infra::config::CounterConfig;
use crate::infra::error::SensingError;

/// Upper variance bound as a multiple of the initial variance
const VAR_MAX_FACTOR: f32 = 5.0;

pub struct BackgroundModel {
    width: usize,
    height: usize,
    mean: Vec<f32>,
    var: Vec<f32>,
    frames_seen: u32,
    history: u32,
    var_threshold: f32,
    var_min: f32,
    var_max: f32,
}

impl BackgroundModel {
    /// Seed the model from the first observed frame
    pub fn from_first_frame(frame: &GrayFrame, params: &CounterConfig) -> Self {
        let var_init = params.var_init.max(params.var_min);
        Self {
            width: frame.width,
            height: frame.height,
            mean: frame.data.iter().map(|&v| v as f32).collect(),
            var: vec![var_init; frame.data.len()],
            frames_seen: 1,
            history: params.history.max(1),
            var_threshold: params.var_threshold,
            var_min: params.var_min,
            var_max: (var_init * VAR_MAX_FACTOR).max(params.var_min),
        }
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Classify `frame` against the current model, then fold it in
    pub fn apply(&mut self, frame: &GrayFrame) -> Result<Mask, SensingError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(SensingError::DimensionMismatch {
                got_w: frame.width,
                got_h: frame.height,
                want_w: self.width,
                want_h: self.height,
            });
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;

        let mut mask = Mask::empty(self.width, self.height);
        for (i, &pixel) in frame.data.iter().enumerate() {
            let d = pixel as f32 - self.mean[i];
            let d2 = d * d;
            mask.data[i] = d2 > self.var_threshold * self.var[i];

            self.mean[i] += alpha * d;
            let var = self.var[i] + alpha * (d2 - self.var[i]);
            // max/min rather than clamp: never panics on inverted bounds
            self.var[i] = var.max(self.var_min).min(self.var_max);
        }
        Ok(mask)
    }

    /// Current background estimate rounded to 8-bit intensities
    pub fn background(&self) -> GrayFrame {
        GrayFrame {
            width: self.width,
            height: self.height,
            data: self.mean.iter().map(|&m| m.round().clamp(0.0, 255.0) as u8).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: usize, height: usize, value: u8) -> GrayFrame {
        GrayFrame { width, height, data: vec![value; width * height] }
    }

    #[test]
    fn test_static_scene_has_no_foreground() {
        let params = CounterConfig::default();
        let mut model = BackgroundModel::from_first_frame(&flat(8, 8, 60), &params);
        for _ in 0..20 {
            assert_eq!(model.apply(&flat(8, 8, 60)).unwrap().count(), 0);
        }
        // small sensor noise stays below the variance floor threshold
        assert_eq!(model.apply(&flat(8, 8, 63)).unwrap().count(), 0);
    }

    #[test]
    fn test_large_change_is_foreground() {
        let params = CounterConfig::default();
        let mut model = BackgroundModel::from_first_frame(&flat(8, 8, 40), &params);
        let mut frame = flat(8, 8, 40);
        frame.data[9] = 220;
        let mask = model.apply(&frame).unwrap();
        assert_eq!(mask.count(), 1);
        assert!(mask.data[9]);
    }

    #[test]
    fn test_persistent_change_is_absorbed() {
        let params = CounterConfig { history: 10, ..CounterConfig::default() };
        let mut model = BackgroundModel::from_first_frame(&flat(4, 4, 40), &params);
        let changed = flat(4, 4, 200);
        assert_eq!(model.apply(&changed).unwrap().count(), 16);
        for _ in 0..60 {
            model.apply(&changed).unwrap();
        }
        assert_eq!(model.apply(&changed).unwrap().count(), 0);
        assert!(model.background().data.iter().all(|&v| v >= 195));
    }

    #[test]
    fn test_dimension_mismatch() {
        let params = CounterConfig::default();
        let mut model = BackgroundModel::from_first_frame(&flat(4, 4, 0), &params);
        let err = model.apply(&flat(5, 4, 0)).unwrap_err();
        assert!(matches!(err, SensingError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_unsanitized_variances_do_not_panic() {
        let params = CounterConfig { var_init: -15.0, var_min: 4.0, ..CounterConfig::default() };
        let mut model = BackgroundModel::from_first_frame(&flat(4, 4, 40), &params);
        assert_eq!(model.apply(&flat(4, 4, 40)).unwrap().count(), 0);

        let params = CounterConfig { var_min: f32::NAN, ..CounterConfig::default() };
        let mut model = BackgroundModel::from_first_frame(&flat(4, 4, 40), &params);
        model.apply(&flat(4, 4, 90)).unwrap();
    }
}
