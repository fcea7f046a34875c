//! OpenCV implementations of strategies 2-4
//!
//! Images are handed to OpenCV as borrowed 8-bit, 3-channel matrices. The
//! algorithms treat the channels symmetrically, so RGB order is kept as is.

use super::{
    grabcut::keep_foreground,
    watershed::{compute_markers, paint_boundaries},
    Segmentation, Segmenter,
};
use crate::{
    config::{Mog2Settings, WatershedParams},
    error::{RemoveBgError, Result},
    services::DebugSink,
    types::SegmentationMethod,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use opencv::{
    boxed_ref::BoxedRef,
    core::{self, Mat, Rect, Vec3b},
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractorMOG2},
};
use tracing::{debug, instrument};

fn to_i32<T>(value: T, what: &str) -> Result<i32>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| RemoveBgError::invalid_config(format!("{} {} does not fit OpenCV's int", what, value)))
}

fn dimensions(image: &RgbImage) -> Result<(i32, i32)> {
    Ok((to_i32(image.height(), "height")?, to_i32(image.width(), "width")?))
}

/// Borrow `image` as a `CV_8UC3` matrix
fn borrow_rgb(image: &RgbImage) -> Result<BoxedRef<'_, Mat>> {
    let (rows, cols) = dimensions(image)?;
    Ok(Mat::new_rows_cols_with_bytes::<Vec3b>(rows, cols, image.as_raw())?)
}

/// Interactive cut via `cv::grabCut`, seeded with the inset whole-image rectangle
#[derive(Debug, Clone)]
pub struct OpenCvGrabCutSegmenter {
    iterations: u32,
}

impl OpenCvGrabCutSegmenter {
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Segmenter for OpenCvGrabCutSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::InteractiveCut
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let (rows, cols) = dimensions(image)?;
        let src = borrow_rgb(image)?;
        let mut labels = vec![0u8; image.as_raw().len() / 3];
        {
            let mut mask = Mat::new_rows_cols_with_data_mut::<u8>(rows, cols, &mut labels)?;
            let mut bgd_model = Mat::default();
            let mut fgd_model = Mat::default();
            // grabCut clips the rectangle to the image
            imgproc::grab_cut(
                &src,
                &mut mask,
                Rect::new(1, 1, cols, rows),
                &mut bgd_model,
                &mut fgd_model,
                to_i32(self.iterations, "iteration count")?,
                imgproc::GC_INIT_WITH_RECT,
            )?;
        }

        let binary = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let index = y as usize * image.width() as usize + x as usize;
            let label = labels.get(index).copied().map_or(imgproc::GC_BGD, i32::from);
            if label == imgproc::GC_FGD || label == imgproc::GC_PR_FGD {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        debug_sink.dump("grabcut_mask", &DynamicImage::ImageLuma8(binary.clone()));
        Ok(Segmentation::Masked(keep_foreground(image, &binary)))
    }
}

/// Marker flooding via `cv::watershed` over the distance-transform seeds
#[derive(Debug, Clone)]
pub struct OpenCvWatershedSegmenter {
    params: WatershedParams,
}

impl OpenCvWatershedSegmenter {
    #[must_use]
    pub fn new(params: WatershedParams) -> Self {
        Self { params }
    }
}

impl Segmenter for OpenCvWatershedSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::MarkerFlooding
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let (rows, cols) = dimensions(image)?;
        let mut markers = compute_markers(image, &self.params, debug_sink);
        {
            let src = borrow_rgb(image)?;
            let cells = markers
                .as_slice_mut()
                .ok_or_else(|| RemoveBgError::segmentation("marker grid is not contiguous"))?;
            let mut marker_mat = Mat::new_rows_cols_with_data_mut::<i32>(rows, cols, cells)?;
            imgproc::watershed(&src, &mut marker_mat)?;
        }

        let output = paint_boundaries(image, &markers, Rgb(self.params.boundary_color));
        debug_sink.dump("watershed", &DynamicImage::ImageRgb8(output.clone()));
        Ok(Segmentation::Masked(output))
    }
}

/// Background subtraction via `cv::BackgroundSubtractorMOG2`; the model persists across calls
pub struct OpenCvMog2Segmenter {
    subtractor: core::Ptr<BackgroundSubtractorMOG2>,
    frames: u32,
}

impl OpenCvMog2Segmenter {
    /// Create a subtractor configured from `settings`
    ///
    /// # Errors
    /// - A setting does not fit OpenCV's parameter types
    /// - OpenCV rejects the configuration
    pub fn new(settings: &Mog2Settings) -> Result<Self> {
        let mut subtractor = video::create_background_subtractor_mog2(
            to_i32(settings.history, "history")?,
            f64::from(settings.var_threshold),
            settings.detect_shadows,
        )?;
        subtractor.set_n_mixtures(to_i32(settings.max_components, "max_components")?)?;
        subtractor.set_background_ratio(f64::from(settings.background_ratio))?;
        subtractor.set_var_threshold_gen(f64::from(settings.var_threshold_gen))?;
        subtractor.set_var_init(f64::from(settings.initial_variance))?;
        subtractor.set_var_min(f64::from(settings.min_variance))?;
        subtractor.set_var_max(f64::from(settings.max_variance))?;
        subtractor.set_complexity_reduction_threshold(f64::from(settings.complexity_reduction))?;
        subtractor.set_shadow_value(i32::from(settings.shadow_value))?;
        subtractor.set_shadow_threshold(f64::from(settings.shadow_threshold))?;
        Ok(Self { subtractor, frames: 0 })
    }

    /// Frames applied so far
    #[must_use]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    fn background_image(&self, width: u32, height: u32) -> Result<Option<RgbImage>> {
        let mut background = Mat::default();
        self.subtractor.get_background_image(&mut background)?;
        if background.empty() {
            return Ok(None);
        }
        Ok(RgbImage::from_raw(width, height, background.data_bytes()?.to_vec()))
    }
}

impl Segmenter for OpenCvMog2Segmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::BackgroundSubtraction
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn segment(&mut self, image: &RgbImage, debug_sink: &dyn DebugSink) -> Result<Segmentation> {
        let src = borrow_rgb(image)?;
        let mut foreground = Mat::default();
        // negative rate: OpenCV picks 1/frames, capped by history
        video::BackgroundSubtractorMOG2Trait::apply(&mut self.subtractor, &src, &mut foreground, -1.0)?;
        self.frames = self.frames.saturating_add(1);

        let mask = GrayImage::from_raw(image.width(), image.height(), foreground.data_bytes()?.to_vec())
            .ok_or_else(|| RemoveBgError::segmentation("foreground mask does not match the frame size"))?;
        if let Some(background) = self.background_image(image.width(), image.height())? {
            debug_sink.dump("background_model", &DynamicImage::ImageRgb8(background));
        }
        debug!(frames = self.frames, "Applied background model");
        Ok(Segmentation::RawMask(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::test_utils::{scene, BACKGROUND, OBJECT};
    use crate::services::NoOpDebugSink;

    #[test]
    fn test_grabcut_keeps_object_and_clears_border() {
        let mut segmenter = OpenCvGrabCutSegmenter::new(5);
        let Segmentation::Masked(output) = segmenter.segment(&scene(), &NoOpDebugSink).unwrap()
        else {
            panic!("interactive cut must return a masked image");
        };
        assert_eq!(*output.get_pixel(50, 50), OBJECT);
        assert_eq!(*output.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*output.get_pixel(99, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_watershed_paints_border_only() {
        let params = WatershedParams::default();
        let mut segmenter = OpenCvWatershedSegmenter::new(params.clone());
        let Segmentation::Masked(output) = segmenter.segment(&scene(), &NoOpDebugSink).unwrap()
        else {
            panic!("marker flooding must return a masked image");
        };
        assert_eq!(*output.get_pixel(5, 5), BACKGROUND);
        assert_eq!(*output.get_pixel(50, 50), OBJECT);
        assert_eq!(*output.get_pixel(0, 0), Rgb(params.boundary_color));
    }

    #[test]
    fn test_mog2_learns_static_scene() {
        let mut segmenter = OpenCvMog2Segmenter::new(&Mog2Settings::default()).unwrap();
        let frame = scene();
        let mut last = None;
        for _ in 0..20 {
            last = Some(segmenter.segment(&frame, &NoOpDebugSink).unwrap());
        }
        assert_eq!(segmenter.frames(), 20);

        let Some(Segmentation::RawMask(mask)) = last else {
            panic!("background subtraction must return a raw mask");
        };
        assert_eq!(mask.dimensions(), frame.dimensions());
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
        assert_eq!(mask.get_pixel(50, 50)[0], 0);
    }
}
