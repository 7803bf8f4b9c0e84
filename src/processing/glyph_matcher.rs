use std::cmp::Ordering;

use image::GrayImage;
use log::debug;

use crate::models::{Bitmap, MatchResult};
use crate::processing::{FingerprintCatalog, GlyphSegmenter, SegmentedText};
use crate::utils::Config;

/// Scores the glyphs of an MRZ band against every font of the catalog.
#[derive(Debug, Clone)]
pub struct GlyphMatcher {
    segmenter: GlyphSegmenter,
    threshold: f64,
}

impl GlyphMatcher {
    pub fn new(config: &Config) -> Self {
        GlyphMatcher {
            segmenter: GlyphSegmenter::new(config.roi.clone()),
            threshold: config.matching.threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn segment(&self, band_mask: &GrayImage) -> SegmentedText {
        self.segmenter.segment_band(band_mask)
    }

    /// Normalized bitmaps of the segmented glyphs, in reading order.
    pub fn glyph_bitmaps(
        &self,
        band_mask: &GrayImage,
        text: &SegmentedText,
        catalog: &FingerprintCatalog,
    ) -> Vec<Bitmap> {
        text.glyphs()
            .map(|roi| catalog.normalize(band_mask, roi))
            .collect()
    }

    /// One ranked `MatchResult` per catalog font.
    pub fn analyze(&self, band_mask: &GrayImage, catalog: &FingerprintCatalog) -> Vec<MatchResult> {
        let text = self.segment(band_mask);
        let glyphs = self.glyph_bitmaps(band_mask, &text, catalog);
        debug!("Matching {} glyphs in {} lines", glyphs.len(), text.lines.len());
        self.analyze_glyphs(&glyphs, catalog)
    }

    pub fn analyze_glyphs(&self, glyphs: &[Bitmap], catalog: &FingerprintCatalog) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = catalog
            .font_names()
            .map(|font_name| {
                let mut result = MatchResult::new(font_name);
                for glyph in glyphs {
                    match catalog.best_in_font(glyph, font_name) {
                        Some(best) if best.similarity > self.threshold => {
                            result.total_found += 1;
                            result.total_similarity += best.similarity;
                        }
                        _ => result.total_not_found += 1,
                    }
                }
                result
            })
            .collect();
        rank(&mut results);
        results
    }
}

/// Best mean similarity first, then most glyphs found, then font name.
pub fn rank(results: &mut [MatchResult]) {
    results.sort_by(compare);
}

fn compare(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.mean_similarity()
        .total_cmp(&a.mean_similarity())
        .then_with(|| b.total_found.cmp(&a.total_found))
        .then_with(|| a.font_name.cmp(&b.font_name))
}
