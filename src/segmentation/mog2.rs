//! Adaptive Gaussian-mixture background subtraction
//!
//! Each pixel keeps up to `max_components` isotropic RGB Gaussians sorted by
//! weight. A frame pixel is background when it lies close to one of the
//! heaviest modes that together hold `background_ratio` of the weight.
//! Foreground pixels that look like a darker copy of a background mode are
//! reported as shadow.

use super::{Segmentation, Segmenter};
use crate::{config::Mog2Settings, error::Result, services::DebugSink, types::SegmentationMethod};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy)]
struct Mode {
    weight: f32,
    mean: [f32; 3],
    variance: f32,
}

/// Per-pixel mixture model fed one frame at a time
#[derive(Debug, Clone)]
pub struct Mog2Model {
    settings: Mog2Settings,
    width: u32,
    height: u32,
    frames: u32,
    pixels: Vec<Vec<Mode>>,
}

impl Mog2Model {
    #[must_use]
    pub fn new(settings: Mog2Settings) -> Self {
        Self {
            settings,
            width: 0,
            height: 0,
            frames: 0,
            pixels: Vec::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Mog2Settings {
        &self.settings
    }

    /// Frames seen since the model was last reset
    #[must_use]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    fn reset(&mut self, width: u32, height: u32) {
        let capacity = self.settings.max_components;
        self.width = width;
        self.height = height;
        self.frames = 0;
        self.pixels = vec![Vec::with_capacity(capacity); (width as usize) * (height as usize)];
    }

    /// Learning rate for the next frame
    ///
    /// An explicit rate only applies once the model has seen a frame; the
    /// automatic rate is `1 / min(2 * frames, history)`.
    fn learning_rate(&self, requested: Option<f32>) -> f32 {
        match requested {
            Some(rate) if rate >= 0.0 && self.frames > 1 => rate,
            _ => 1.0 / (2 * self.frames).min(self.settings.history.max(1)) as f32,
        }
    }

    /// Classify `frame` and fold it into the model
    ///
    /// Returns a mask with 0 for background, 255 for foreground and
    /// `shadow_value` for shadow. A frame of a different size resets the model.
    pub fn apply(&mut self, frame: &RgbImage, learning_rate: Option<f32>) -> GrayImage {
        let (width, height) = frame.dimensions();
        if (width, height) != (self.width, self.height) || self.pixels.is_empty() {
            debug!(width, height, "Initialising background model");
            self.reset(width, height);
        }
        self.frames = self.frames.saturating_add(1);
        let alpha = self.learning_rate(learning_rate);

        let settings = &self.settings;
        let mut mask = GrayImage::new(width, height);
        for ((pixel, modes), out) in frame
            .pixels()
            .zip(self.pixels.iter_mut())
            .zip(mask.pixels_mut())
        {
            let data = rgb_to_f32(pixel);
            let background = update_pixel(modes, data, alpha, settings);
            *out = Luma([if background {
                0
            } else if settings.detect_shadows && is_shadow(modes, data, settings) {
                settings.shadow_value
            } else {
                255
            }]);
        }
        mask
    }

    /// Weighted mean of the background modes of every pixel
    ///
    /// `None` before the first frame.
    #[must_use]
    pub fn background_image(&self) -> Option<RgbImage> {
        if self.frames == 0 {
            return None;
        }
        let ratio = self.settings.background_ratio;
        Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            let modes = &self.pixels[(y * self.width + x) as usize];
            let mut sum = [0.0f32; 3];
            let mut total = 0.0f32;
            for mode in modes {
                for (s, m) in sum.iter_mut().zip(mode.mean) {
                    *s += mode.weight * m;
                }
                total += mode.weight;
                if total > ratio {
                    break;
                }
            }
            if total <= 0.0 {
                return Rgb([0, 0, 0]);
            }
            Rgb(sum.map(|s| (s / total).round().clamp(0.0, 255.0) as u8))
        }))
    }
}

fn rgb_to_f32(pixel: &Rgb<u8>) -> [f32; 3] {
    pixel.0.map(f32::from)
}

fn distance_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    a.iter().zip(b).map(|(p, q)| (p - q) * (p - q)).sum()
}

/// Update one pixel's modes with `data`; returns whether it matched the background
fn update_pixel(modes: &mut Vec<Mode>, data: [f32; 3], alpha: f32, settings: &Mog2Settings) -> bool {
    let prune = -alpha * settings.complexity_reduction;
    let mut background = false;
    let mut fits = false;
    let mut total = 0.0f32;

    for mode in modes.iter_mut() {
        let mut weight = (1.0 - alpha) * mode.weight + prune;
        if !fits {
            let dist2 = distance_sq(mode.mean, data);
            if total < settings.background_ratio && dist2 < settings.var_threshold * mode.variance {
                background = true;
            }
            if dist2 < settings.var_threshold_gen * mode.variance {
                fits = true;
                weight += alpha;
                let k = alpha / weight;
                for (m, d) in mode.mean.iter_mut().zip(data) {
                    *m -= k * (*m - d);
                }
                let variance = mode.variance + k * (dist2 - mode.variance);
                mode.variance = variance.clamp(settings.min_variance, settings.max_variance);
            }
        }
        mode.weight = weight;
        total += weight;
    }

    modes.retain(|mode| mode.weight >= -prune);
    let kept: f32 = modes.iter().map(|mode| mode.weight).sum();
    if kept > 0.0 {
        for mode in modes.iter_mut() {
            mode.weight /= kept;
        }
    }

    if !fits {
        let fresh = Mode {
            weight: if modes.is_empty() { 1.0 } else { alpha },
            mean: data,
            variance: settings.initial_variance,
        };
        if !modes.is_empty() {
            for mode in modes.iter_mut() {
                mode.weight *= 1.0 - alpha;
            }
        }
        if modes.len() >= settings.max_components {
            modes.pop();
        }
        modes.push(fresh);
    }

    modes.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    background
}

/// Whether `data` is a darker copy of one of the background modes
fn is_shadow(modes: &[Mode], data: [f32; 3], settings: &Mog2Settings) -> bool {
    let mut total = 0.0f32;
    for mode in modes {
        let numerator: f32 = mode.mean.iter().zip(data).map(|(m, d)| m * d).sum();
        let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
        if denominator == 0.0 {
            return false;
        }
        if numerator <= denominator && numerator >= settings.shadow_threshold * denominator {
            let a = numerator / denominator;
            let dist2a: f32 = mode.mean.iter().zip(data).map(|(m, d)| (a * m - d).powi(2)).sum();
            if dist2a < settings.var_threshold * mode.variance * a * a {
                return true;
            }
        }
        total += mode.weight;
        if total > settings.background_ratio {
            return false;
        }
    }
    false
}

/// Background-subtraction strategy; the model persists across calls
#[derive(Debug, Clone)]
pub struct Mog2Segmenter {
    model: Mog2Model,
}

impl Mog2Segmenter {
    #[must_use]
    pub fn new(settings: Mog2Settings) -> Self {
        Self {
            model: Mog2Model::new(settings),
        }
    }

    #[must_use]
    pub fn model(&self) -> &Mog2Model {
        &self.model
    }
}

impl Segmenter for Mog2Segmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::BackgroundSubtraction
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let mask = self.model.apply(image, None);
        if let Some(background) = self.model.background_image() {
            debug_sink.dump("background_model", &DynamicImage::ImageRgb8(background));
        }
        debug!(frames = self.model.frames(), "Applied background model");
        Ok(Segmentation::RawMask(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::test_utils::{scene, BACKGROUND};
    use crate::services::NoOpDebugSink;

    #[test]
    fn test_first_frame_has_no_background() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        let mut frame = scene();
        frame.put_pixel(0, 0, Rgb([0, 0, 0]));
        let mask = model.apply(&frame, None);

        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(50, 50)[0], 127);
        assert!(mask.pixels().all(|p| p[0] != 0));
    }

    #[test]
    fn test_first_frame_without_shadows_is_foreground() {
        let settings = Mog2Settings {
            detect_shadows: false,
            ..Mog2Settings::default()
        };
        let mut model = Mog2Model::new(settings);
        let mask = model.apply(&scene(), None);
        assert!(mask.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_static_scene_becomes_background() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        let frame = scene();
        for _ in 0..20 {
            model.apply(&frame, None);
        }
        let mask = model.apply(&frame, None);
        assert!(mask.pixels().all(|p| p[0] == 0));

        let mut changed = frame.clone();
        changed.put_pixel(10, 10, Rgb([10, 200, 30]));
        let mask = model.apply(&changed, None);
        assert_eq!(mask.get_pixel(10, 10)[0], 255);
        assert_eq!(mask.get_pixel(11, 10)[0], 0);
    }

    #[test]
    fn test_darker_pixel_is_shadow() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        let frame = scene();
        for _ in 0..20 {
            model.apply(&frame, None);
        }
        let mut shaded = frame.clone();
        shaded.put_pixel(5, 5, Rgb([150, 150, 150]));
        let mask = model.apply(&shaded, None);
        assert_eq!(mask.get_pixel(5, 5)[0], 127);
    }

    #[test]
    fn test_learning_rate() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        model.reset(1, 1);
        model.frames = 1;
        assert!((model.learning_rate(Some(0.2)) - 0.5).abs() < 1e-6);
        model.frames = 3;
        assert!((model.learning_rate(None) - 1.0 / 6.0).abs() < 1e-6);
        assert!((model.learning_rate(Some(0.2)) - 0.2).abs() < 1e-6);
        model.frames = 1000;
        assert!((model.learning_rate(None) - 1.0 / 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_background_image_tracks_scene() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        assert!(model.background_image().is_none());
        for _ in 0..5 {
            model.apply(&scene(), None);
        }
        let background = model.background_image().unwrap();
        assert_eq!(*background.get_pixel(2, 2), BACKGROUND);
    }

    #[test]
    fn test_resize_resets_model() {
        let mut model = Mog2Model::new(Mog2Settings::default());
        model.apply(&scene(), None);
        model.apply(&scene(), None);
        assert_eq!(model.frames(), 2);
        model.apply(&RgbImage::from_pixel(10, 10, BACKGROUND), None);
        assert_eq!(model.frames(), 1);
    }

    #[test]
    fn test_segmenter_returns_raw_mask() {
        let mut segmenter = Mog2Segmenter::new(Mog2Settings::default());
        let Segmentation::RawMask(mask) = segmenter.segment(&scene(), &NoOpDebugSink).unwrap()
        else {
            panic!("background subtraction must return a raw mask");
        };
        assert_eq!(mask.dimensions(), (100, 100));
        assert_eq!(segmenter.model().frames(), 1);
    }
}
