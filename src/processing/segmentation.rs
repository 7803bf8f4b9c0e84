use image::GrayImage;

use crate::models::{RoiBox, RowInfo};
use crate::processing::{ImageProcessor, RegionFilter};
use crate::utils::RoiOptions;

/// Glyph boxes of a text image, one vector per line, left to right.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentedText {
    pub lines: Vec<RowInfo>,
    /// Foreground pixels per image row.
    pub histogram: Vec<u32>,
}

impl SegmentedText {
    pub fn glyph_count(&self) -> usize {
        self.lines.iter().map(RowInfo::count).sum()
    }

    pub fn glyphs(&self) -> impl Iterator<Item = &RoiBox> {
        self.lines.iter().flat_map(|line| line.boxes.iter())
    }
}

/// Splits a binarized text image into glyph boxes.
///
/// Unlike the document-level filter this keeps narrow glyphs such as `1`
/// or `I`, only dropping specks.
#[derive(Debug, Clone)]
pub struct GlyphSegmenter {
    filter: RegionFilter,
}

impl GlyphSegmenter {
    pub fn new(options: RoiOptions) -> Self {
        GlyphSegmenter {
            filter: RegionFilter::new(options),
        }
    }

    /// Every line found in `mask`.
    pub fn segment(&self, mask: &GrayImage) -> SegmentedText {
        let rois = ImageProcessor::extract_rois(mask);
        let glyphs = self.filter.remove_specks(&rois);
        SegmentedText {
            lines: self.filter.group_rows(&glyphs),
            histogram: ImageProcessor::row_projection(mask),
        }
    }

    /// Lines of a cropped MRZ band. The crop margin can catch pieces of the
    /// neighbouring text, so lines holding less than half the glyphs of the
    /// fullest line are dropped.
    pub fn segment_band(&self, mask: &GrayImage) -> SegmentedText {
        let mut text = self.segment(mask);
        let fullest = text.lines.iter().map(RowInfo::count).max().unwrap_or(0);
        text.lines.retain(|line| line.count() * 2 >= fullest);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_lines, FontStyle};
    use crate::utils::ThresholdAlgorithm;

    #[test]
    fn test_segments_lines_in_reading_order() {
        let grey = render_lines(&["AB<12", "XYZ"], FontStyle::Regular, 3);
        let mask = ImageProcessor::mask(&grey, ThresholdAlgorithm::Isodata);
        let text = GlyphSegmenter::new(RoiOptions::default()).segment(&mask);

        assert_eq!(text.lines.len(), 2);
        assert_eq!(text.lines[0].count(), 5);
        assert_eq!(text.lines[1].count(), 3);
        assert_eq!(text.glyph_count(), 8);
        assert!(text.lines[0].boxes.windows(2).all(|w| w[0].x < w[1].x));
        assert_eq!(text.histogram.len(), grey.height() as usize);
    }

    #[test]
    fn test_band_drops_sparse_lines() {
        let grey = render_lines(&["A", "P<UTOERIKSSON", "L898902C36UT"], FontStyle::Regular, 3);
        let mask = ImageProcessor::mask(&grey, ThresholdAlgorithm::Isodata);
        let text = GlyphSegmenter::new(RoiOptions::default()).segment_band(&mask);
        assert_eq!(text.lines.len(), 2);
        assert_eq!(text.glyph_count(), 25);
    }
}
