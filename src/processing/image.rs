use std::collections::BTreeMap;
use std::path::Path;

use image::imageops::crop_imm;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::models::RoiBox;
use crate::utils::{MrzError, Result, ThresholdAlgorithm};

const FOREGROUND: Luma<u8> = Luma([255]);

/// Image-side collaborators of the pipeline: decoding, greyscale,
/// binarization, component boxes and crops.
///
/// Masks are `GrayImage`s holding 255 for foreground (dark ink on the
/// document) and 0 for background.
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn open(image_path: &Path) -> Result<DynamicImage> {
        image::open(image_path).map_err(|e| {
            MrzError::ImageProcessingError(format!(
                "Failed to open image {}: {}",
                image_path.display(),
                e
            ))
        })
    }

    pub fn to_grey(image: &DynamicImage) -> GrayImage {
        image.to_luma8()
    }

    /// Threshold level for `grey` with the chosen algorithm. Pixels at or
    /// below the level are foreground.
    pub fn threshold_level(grey: &GrayImage, algorithm: ThresholdAlgorithm) -> u8 {
        match algorithm {
            ThresholdAlgorithm::Isodata => Self::isodata_level(grey),
            ThresholdAlgorithm::Otsu => otsu_level(grey),
        }
    }

    /// Ridler-Calvard iterative selection: the level settles where it is
    /// the mean of the two class means.
    pub fn isodata_level(grey: &GrayImage) -> u8 {
        let mut histogram = [0u64; 256];
        for pixel in grey.pixels() {
            histogram[pixel[0] as usize] += 1;
        }
        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return 0;
        }
        let weighted: u64 = histogram
            .iter()
            .enumerate()
            .map(|(value, count)| value as u64 * count)
            .sum();

        let mut level = (weighted / total) as usize;
        for _ in 0..256 {
            let (mut low_count, mut low_sum) = (0u64, 0u64);
            for (value, count) in histogram.iter().enumerate().take(level + 1) {
                low_count += count;
                low_sum += value as u64 * count;
            }
            let high_count = total - low_count;
            if low_count == 0 || high_count == 0 {
                break;
            }
            let low_mean = low_sum as f64 / low_count as f64;
            let high_mean = (weighted - low_sum) as f64 / high_count as f64;
            let next = ((low_mean + high_mean) / 2.0) as usize;
            if next == level {
                break;
            }
            level = next;
        }
        level.min(255) as u8
    }

    /// Binarize `grey`, dark pixels becoming foreground. A uniform image has
    /// no foreground at all.
    pub fn mask(grey: &GrayImage, algorithm: ThresholdAlgorithm) -> GrayImage {
        let mut mask = GrayImage::new(grey.width(), grey.height());
        let (min, max) = grey
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if min >= max {
            return mask;
        }
        let level = Self::threshold_level(grey, algorithm);
        for (x, y, pixel) in grey.enumerate_pixels() {
            if pixel[0] <= level {
                mask.put_pixel(x, y, FOREGROUND);
            }
        }
        mask
    }

    /// Bounding boxes of the 8-connected foreground components, ordered
    /// top to bottom, then left to right. Each box keeps a seed pixel of its
    /// component.
    pub fn extract_rois(mask: &GrayImage) -> Vec<RoiBox> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        // label -> (x_min, y_min, x_max, y_max, pixels, first pixel)
        let mut extents: BTreeMap<u32, (u32, u32, u32, u32, u32, (u32, u32))> = BTreeMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            let extent = extents.entry(label).or_insert((x, y, x, y, 0, (x, y)));
            extent.0 = extent.0.min(x);
            extent.1 = extent.1.min(y);
            extent.2 = extent.2.max(x);
            extent.3 = extent.3.max(y);
            extent.4 += 1;
        }

        let mut rois: Vec<RoiBox> = extents
            .values()
            .map(|&(x0, y0, x1, y1, pixels, (sx, sy))| {
                RoiBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1, pixels).with_seed(sx, sy)
            })
            .collect();
        rois.sort_by_key(|r| (r.y, r.x));
        rois
    }

    /// Full-width horizontal strip, clamped to the image.
    pub fn crop_rows(image: &GrayImage, y: u32, height: u32) -> GrayImage {
        let y = y.min(image.height());
        let height = height.min(image.height() - y);
        crop_imm(image, 0, y, image.width(), height).to_image()
    }

    pub fn crop_box(image: &GrayImage, roi: &RoiBox) -> GrayImage {
        crop_imm(image, roi.x, roi.y, roi.width, roi.height).to_image()
    }

    /// Foreground pixels per image row.
    pub fn row_projection(mask: &GrayImage) -> Vec<u32> {
        mask.rows()
            .map(|row| row.filter(|p| p[0] > 0).count() as u32)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(width: u32, height: u32, dark: &[(u32, u32)]) -> GrayImage {
        let mut grey = GrayImage::from_pixel(width, height, Luma([230]));
        for &(x, y) in dark {
            grey.put_pixel(x, y, Luma([20]));
        }
        grey
    }

    #[test]
    fn test_isodata_splits_two_levels() {
        let grey = two_tone(10, 10, &[(1, 1), (2, 2), (3, 3)]);
        let level = ImageProcessor::isodata_level(&grey);
        assert!(level >= 20 && level < 230, "level {}", level);
    }

    #[test]
    fn test_uniform_image_has_empty_mask() {
        let grey = GrayImage::from_pixel(8, 8, Luma([200]));
        let mask = ImageProcessor::mask(&grey, ThresholdAlgorithm::Isodata);
        assert!(mask.pixels().all(|p| p[0] == 0));
        assert!(ImageProcessor::extract_rois(&mask).is_empty());
    }

    #[test]
    fn test_extract_rois_boxes() {
        let mut dark = Vec::new();
        // 3x4 block at (2, 1)
        for y in 1..5 {
            for x in 2..5 {
                dark.push((x, y));
            }
        }
        // diagonal pair, joined by 8-connectivity
        dark.push((8, 6));
        dark.push((9, 7));
        let grey = two_tone(12, 10, &dark);

        for algorithm in [ThresholdAlgorithm::Isodata, ThresholdAlgorithm::Otsu] {
            let mask = ImageProcessor::mask(&grey, algorithm);
            let rois = ImageProcessor::extract_rois(&mask);
            assert_eq!(
                rois,
                vec![
                    RoiBox::new(2, 1, 3, 4, 12).with_seed(2, 1),
                    RoiBox::new(8, 6, 2, 2, 2).with_seed(8, 6)
                ]
            );
        }
    }

    #[test]
    fn test_crop_rows_clamps() {
        let grey = GrayImage::new(5, 10);
        let crop = ImageProcessor::crop_rows(&grey, 8, 6);
        assert_eq!(crop.dimensions(), (5, 2));
        let crop = ImageProcessor::crop_rows(&grey, 12, 6);
        assert_eq!(crop.dimensions(), (5, 0));
    }

    #[test]
    fn test_row_projection() {
        let grey = two_tone(4, 3, &[(0, 1), (3, 1), (2, 2)]);
        let mask = ImageProcessor::mask(&grey, ThresholdAlgorithm::Isodata);
        assert_eq!(ImageProcessor::row_projection(&mask), vec![0, 2, 1]);
    }
}
