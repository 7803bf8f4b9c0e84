use image::GrayImage;
use log::debug;

use crate::models::{
    CheckField, FieldError, LetterStats, LetterTally, MatchResult, MrzCode, MrzFormat, MrzResult,
};
use crate::processing::{FingerprintCatalog, GlyphMatcher, ImageProcessor, SegmentedText};
use crate::utils::{Config, FontSelection};
use crate::validation::check_digit;
use crate::validation::format::{field_text, FormatValidator};

/// Placeholder for a glyph no fingerprint of the chosen font matched.
pub const UNRECOGNIZED: char = '?';

/// Reads an MRZ band with one catalog font and classifies the text.
#[derive(Debug, Clone)]
pub struct MrzValidator {
    matcher: GlyphMatcher,
    font_selection: FontSelection,
}

/// Outcome of the checks, with the check fields that failed.
struct Evaluation {
    result: MrzResult,
    format: Option<MrzFormat>,
    failed: Vec<&'static str>,
}

impl MrzValidator {
    pub fn new(config: &Config) -> Self {
        MrzValidator {
            matcher: GlyphMatcher::new(config),
            font_selection: config.matching.font_selection.clone(),
        }
    }

    /// Font the band is read with. A ranked font needs at least one glyph
    /// found; a named one has to be in the catalog.
    pub fn select_font<'a>(
        &'a self,
        ranking: &'a [MatchResult],
        catalog: &FingerprintCatalog,
    ) -> Option<&'a str> {
        match &self.font_selection {
            FontSelection::TopRanked => ranking
                .first()
                .filter(|r| r.total_found > 0)
                .map(|r| r.font_name.as_str()),
            FontSelection::Named(name) => catalog.contains_font(name).then_some(name.as_str()),
        }
    }

    /// Recognized text, one string per segmented line.
    pub fn read_lines(
        &self,
        band_mask: &GrayImage,
        text: &SegmentedText,
        catalog: &FingerprintCatalog,
        font_name: &str,
    ) -> Vec<String> {
        text.lines
            .iter()
            .map(|line| {
                line.boxes
                    .iter()
                    .map(|roi| {
                        let bitmap = catalog.normalize(band_mask, roi);
                        match catalog.best_in_font(&bitmap, font_name) {
                            Some(best) if best.similarity > self.matcher.threshold() => best.label,
                            _ => UNRECOGNIZED,
                        }
                    })
                    .collect()
            })
            .collect()
    }

    pub fn validate_band(
        &self,
        band_mask: &GrayImage,
        catalog: &FingerprintCatalog,
        ranking: &[MatchResult],
        stats: &LetterStats,
    ) -> MrzResult {
        let text = self.matcher.segment(band_mask);
        let histogram = text.histogram.clone();

        if text.glyph_count() == 0 {
            return MrzResult::preprocess_error("no glyphs in the band").with_band(histogram, Vec::new());
        }
        if !(2..=3).contains(&text.lines.len()) {
            return MrzResult::preprocess_error(format!(
                "{} text lines in the band, expected 2 or 3",
                text.lines.len()
            ))
            .with_band(histogram, Vec::new());
        }

        let Some(font_name) = self.select_font(ranking, catalog) else {
            return MrzResult::unknown_error(format!("no usable font for {:?}", self.font_selection))
                .with_band(histogram, Vec::new());
        };

        let lines = self.read_lines(band_mask, &text, catalog, font_name);
        let images = text
            .lines
            .iter()
            .map(|line| ImageProcessor::crop_rows(band_mask, line.y, line.height))
            .collect();
        debug!("Read band with {}: {:?}", font_name, lines);

        self.validate_lines(&lines, stats).with_band(histogram, images)
    }

    /// Classifies recognized text and merges its letter tally into `stats`.
    /// Text with the wrong number of lines is a format error here; only the
    /// band path can fail segmentation.
    pub fn validate_lines(&self, lines: &[String], stats: &LetterStats) -> MrzResult {
        let evaluation = evaluate(lines);
        stats.merge(&letter_tally(lines, &evaluation));
        evaluation.result
    }
}

fn evaluate(lines: &[String]) -> Evaluation {
    let owned = lines.to_vec();
    let format = match FormatValidator::validate(lines) {
        Ok(format) => format,
        Err(errors) => {
            return Evaluation {
                result: MrzResult::format_error(owned, errors),
                format: None,
                failed: Vec::new(),
            }
        }
    };

    let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();
    let mut errors = Vec::new();
    let mut failed = Vec::new();
    for field in format.check_fields() {
        let (line, column) = field.check;
        let found = chars[line][column];
        let data = field_text(&chars, field);
        if field.optional && found == '<' && data.chars().all(|c| c == '<') {
            continue;
        }
        let Some(expected) = check_digit::compute(data.chars()) else {
            return Evaluation {
                result: MrzResult::unknown_error(format!("cannot compute the {} check digit", field.name)),
                format: Some(format),
                failed,
            };
        };
        if expected != found {
            errors.push(FieldError::check_digit(field.name, expected, found));
            failed.push(field.name);
        }
    }

    let fields = FormatValidator::parse_fields(format, lines);
    let result = if errors.is_empty() {
        MrzResult::correct(owned, fields)
    } else {
        MrzResult::checksum_error(owned, fields, errors)
    };
    Evaluation {
        result,
        format: Some(format),
        failed,
    }
}

fn field_length(field: &CheckField) -> usize {
    field.segments.iter().map(|s| s.end - s.start).sum::<usize>() + 1
}

/// Per-glyph verdicts for one image.
fn letter_tally(lines: &[String], evaluation: &Evaluation) -> LetterTally {
    let mut tally = LetterTally::new();
    let code = evaluation.result.code;
    if matches!(code, MrzCode::PreprocessError | MrzCode::UnknownError) {
        return tally;
    }

    for (line, text) in lines.iter().enumerate() {
        for (column, label) in text.chars().enumerate() {
            if label == UNRECOGNIZED {
                continue;
            }
            let correct = match (code, evaluation.format) {
                (MrzCode::FormatError, _) | (_, None) => false,
                (_, Some(format)) => {
                    let narrowest = format
                        .check_fields()
                        .iter()
                        .filter(|f| f.covers(line, column))
                        .min_by_key(|f| field_length(f));
                    match narrowest {
                        Some(field) => !evaluation.failed.contains(&field.name),
                        None => code == MrzCode::Correct,
                    }
                }
            };
            tally.record(label, correct);
        }
    }
    tally
}
