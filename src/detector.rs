use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::models::{Band, BandOutcome, LetterStats, LetterTally, MatchResult, MrzCode, MrzResult, NotFoundReason};
use crate::processing::{FingerprintCatalog, GlyphMatcher, ImageProcessor, RegionFilter, TextBandLocator};
use crate::utils::{Config, MrzError, Result};
use crate::validation::MrzValidator;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Everything learned about one image whose MRZ band was located.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub filename: String,
    /// Glyph count of every row of the page, top to bottom.
    pub parse_row_info: Vec<f64>,
    pub band: Band,
    /// Best fonts for the band, at most `matching.top_fonts`.
    pub fonts: Vec<MatchResult>,
    pub result: MrzResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    Analyzed(ImageReport),
    /// No MRZ band; the image gets no result code.
    Skipped {
        filename: String,
        reason: NotFoundReason,
        parse_row_info: Vec<f64>,
        filtered_histogram: Vec<f64>,
    },
}

impl ImageOutcome {
    pub fn filename(&self) -> &str {
        match self {
            ImageOutcome::Analyzed(report) => &report.filename,
            ImageOutcome::Skipped { filename, .. } => filename,
        }
    }

    pub fn code(&self) -> Option<MrzCode> {
        match self {
            ImageOutcome::Analyzed(report) => Some(report.result.code),
            ImageOutcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub images: Vec<ImageOutcome>,
    /// Images where no MRZ band was found.
    pub not_found: usize,
    /// Files that could not be decoded.
    pub unreadable: Vec<String>,
    /// Images per result code; every code is present.
    pub counters: BTreeMap<MrzCode, usize>,
    pub letter_stats: LetterTally,
}

impl BatchReport {
    fn new(images: Vec<ImageOutcome>, unreadable: Vec<String>, letter_stats: LetterTally) -> Self {
        let mut counters: BTreeMap<MrzCode, usize> = MrzCode::ALL.iter().map(|&c| (c, 0)).collect();
        let mut not_found = 0;
        for outcome in &images {
            match outcome.code() {
                Some(code) => *counters.entry(code).or_insert(0) += 1,
                None => not_found += 1,
            }
        }
        BatchReport {
            images,
            not_found,
            unreadable,
            counters,
            letter_stats,
        }
    }
}

/// The whole pipeline for one image, and its parallel batch driver.
///
/// The catalog and the letter statistics are shared; the statistics keep
/// accumulating over every image this detector (or any other holder of the
/// same `Arc`) processes.
pub struct MrzDetector {
    config: Config,
    catalog: Arc<FingerprintCatalog>,
    stats: Arc<LetterStats>,
    filter: RegionFilter,
    locator: TextBandLocator,
    matcher: GlyphMatcher,
    validator: MrzValidator,
}

impl MrzDetector {
    pub fn new(config: Config, catalog: Arc<FingerprintCatalog>, stats: Arc<LetterStats>) -> Result<Self> {
        config.validate()?;
        let options = catalog.options();
        if options.height != config.fingerprint.height || options.width != config.fingerprint.width {
            return Err(MrzError::InvalidConfig(format!(
                "catalog fingerprints are {}x{}, configuration asks for {}x{}",
                options.height, options.width, config.fingerprint.height, config.fingerprint.width
            )));
        }
        if catalog.is_empty() {
            return Err(MrzError::CatalogError("catalog has no fonts".to_string()));
        }
        for dir in [&config.output.masks_dir, &config.output.crops_dir].into_iter().flatten() {
            fs::create_dir_all(dir)?;
        }

        Ok(MrzDetector {
            filter: RegionFilter::new(config.roi.clone()),
            locator: TextBandLocator::new(config.band.clone()),
            matcher: GlyphMatcher::new(&config),
            validator: MrzValidator::new(&config),
            config,
            catalog,
            stats,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Arc<LetterStats> {
        &self.stats
    }

    pub fn process_image(&self, image_path: &Path) -> Result<ImageOutcome> {
        let filename = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.display().to_string());
        let image = ImageProcessor::open(image_path)?;
        Ok(self.process_grey(&filename, &ImageProcessor::to_grey(&image)))
    }

    pub fn process_grey(&self, filename: &str, grey: &GrayImage) -> ImageOutcome {
        debug!("Processing {} ({}x{})", filename, grey.width(), grey.height());
        let algorithm = self.config.threshold_algorithm;
        let mask = ImageProcessor::mask(grey, algorithm);
        save_inspection(self.config.output.masks_dir.as_deref(), filename, "bmp", &mask);
        let rois = ImageProcessor::extract_rois(&mask);
        let regions = self.filter.filter(&rois, grey.width());

        let band = match self.locator.locate(
            &regions.parse_row_info,
            &regions.rows_info,
            &regions.rois,
            grey.width(),
        ) {
            BandOutcome::Found(band) => band,
            BandOutcome::NotFound {
                reason,
                filtered_histogram,
            } => {
                warn!("Not able to find the MRZ in {}: {}", filename, reason);
                return ImageOutcome::Skipped {
                    filename: filename.to_string(),
                    reason,
                    parse_row_info: regions.parse_row_info,
                    filtered_histogram,
                };
            }
        };

        let margin = self.config.band_margin;
        let top = band.y.saturating_sub(margin);
        let bottom = band.y + band.height + margin;
        let crop = ImageProcessor::crop_rows(grey, top, bottom - top);
        save_inspection(self.config.output.crops_dir.as_deref(), filename, "png", &crop);
        let band_mask = ImageProcessor::mask(&crop, algorithm);

        let mut fonts = self.matcher.analyze(&band_mask, &self.catalog);
        fonts.truncate(self.config.matching.top_fonts);
        for font in &fonts {
            debug!(
                "{}: {} mean similarity {:.3}, found {}, not found {}",
                filename,
                font.font_name,
                font.mean_similarity(),
                font.total_found,
                font.total_not_found
            );
        }

        let result = self
            .validator
            .validate_band(&band_mask, &self.catalog, &fonts, &self.stats);
        info!("{}: {}", filename, result.code);

        ImageOutcome::Analyzed(ImageReport {
            filename: filename.to_string(),
            parse_row_info: regions.parse_row_info,
            band,
            fonts,
            result,
        })
    }

    /// Decoded images, processed in parallel. Reports keep the input order.
    pub fn run_batch(&self, images: &[(String, GrayImage)]) -> BatchReport {
        let outcomes: Vec<ImageOutcome> = images
            .par_iter()
            .map(|(filename, grey)| self.process_grey(filename, grey))
            .collect();
        self.finish(outcomes, Vec::new())
    }

    /// Image files, processed in parallel. Unreadable files are reported and
    /// skipped.
    pub fn run_files(&self, paths: &[PathBuf]) -> BatchReport {
        let results: Vec<(PathBuf, Result<ImageOutcome>)> = paths
            .par_iter()
            .map(|path| (path.clone(), self.process_image(path)))
            .collect();

        let mut outcomes = Vec::with_capacity(results.len());
        let mut unreadable = Vec::new();
        for (path, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    unreadable.push(
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string()),
                    );
                }
            }
        }
        self.finish(outcomes, unreadable)
    }

    /// Every `.png` / `.jpg` of `dir`, in file name order.
    pub fn run_directory<P: AsRef<Path>>(&self, dir: P) -> Result<BatchReport> {
        let paths = list_images(dir.as_ref())?;
        info!("Found {} images in {}", paths.len(), dir.as_ref().display());
        Ok(self.run_files(&paths))
    }

    fn finish(&self, outcomes: Vec<ImageOutcome>, unreadable: Vec<String>) -> BatchReport {
        let report = BatchReport::new(outcomes, unreadable, self.stats.snapshot());
        info!(
            "Batch done: {} images, {} without MRZ, {} correct",
            report.images.len(),
            report.not_found,
            report.counters.get(&MrzCode::Correct).copied().unwrap_or(0)
        );
        report
    }
}

/// Writes `image` as `<dir>/<stem of filename>.<extension>`. Failures only
/// cost the inspection copy.
fn save_inspection(dir: Option<&Path>, filename: &str, extension: &str, image: &GrayImage) {
    let Some(dir) = dir else {
        return;
    };
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let path = dir.join(format!("{}.{}", stem, extension));
    match image.save(&path) {
        Ok(()) => debug!("Saved {}", path.display()),
        Err(e) => warn!("Could not save {}: {}", path.display(), e),
    }
}

pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{render_document, synthetic_catalog, FontStyle, TD3_SAMPLE};
    use image::Luma;

    fn detector(config: Config) -> MrzDetector {
        let catalog = Arc::new(synthetic_catalog(&config));
        MrzDetector::new(config, catalog, Arc::new(LetterStats::new())).unwrap()
    }

    fn analyzed(outcome: ImageOutcome) -> ImageReport {
        match outcome {
            ImageOutcome::Analyzed(report) => report,
            other => panic!("expected an analyzed image, got {:?}", other),
        }
    }

    #[test]
    fn test_passport_page_is_correct() {
        let detector = detector(Config::default());
        let page = render_document("PASSPORT", &TD3_SAMPLE, FontStyle::Regular);
        let report = analyzed(detector.process_grey("passport.png", &page));

        assert_eq!(report.result.code, MrzCode::Correct, "{:?}", report.result.diagnostics);
        assert_eq!(report.band.similar_peaks.len(), 2);
        assert_eq!(report.parse_row_info, vec![8.0, 44.0, 44.0]);
        assert_eq!(report.fonts.len(), 2);
        assert_eq!(report.fonts[0].font_name, "Synth");
        assert_eq!(report.fonts[0].total_found, 88);
        assert_eq!(
            report.result.diagnostics.fields.as_ref().map(|f| f.document_number.as_str()),
            Some("L898902C3")
        );
    }

    #[test]
    fn test_id_card_page_is_correct() {
        let detector = detector(Config::default());
        let td1 = [
            "I<UTOD231458907<<<<<<<<<<<<<<<",
            "7408122F1204159UTO<<<<<<<<<<<6",
            "ERIKSSON<<ANNA<MARIA<<<<<<<<<<",
        ];
        let page = render_document("ID", &td1, FontStyle::Bold);
        let report = analyzed(detector.process_grey("card.png", &page));
        assert_eq!(report.result.code, MrzCode::Correct, "{:?}", report.result.diagnostics);
        assert_eq!(report.band.similar_peaks.len(), 3);
        assert_eq!(report.fonts[0].font_name, "Synth Bold");
    }

    #[test]
    fn test_same_image_same_outcome() {
        let detector = detector(Config::default());
        let page = render_document("PASSPORT", &TD3_SAMPLE, FontStyle::Regular);
        let first = detector.process_grey("a.png", &page);
        let second = detector.process_grey("a.png", &page);
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_page_is_skipped() {
        let detector = detector(Config::default());
        let blank = GrayImage::from_pixel(400, 300, Luma([235]));
        match detector.process_grey("blank.png", &blank) {
            ImageOutcome::Skipped { reason, .. } => assert_eq!(reason, NotFoundReason::NoRegions),
            other => panic!("expected a skipped image, got {:?}", other),
        }
        assert!(detector.stats().snapshot().is_empty());
    }

    #[test]
    fn test_batch_stats_sum_per_image_tallies() {
        let page = render_document("PASSPORT", &TD3_SAMPLE, FontStyle::Regular);

        let single = detector(Config::default());
        single.process_grey("one.png", &page);
        let per_image = single.stats().snapshot();

        let batch = detector(Config::default());
        let blank = GrayImage::from_pixel(400, 300, Luma([235]));
        let mut images: Vec<(String, GrayImage)> =
            (0..4).map(|i| (format!("{}.png", i), page.clone())).collect();
        images.push(("blank.png".to_string(), blank));
        let report = batch.run_batch(&images);

        assert_eq!(report.images.len(), 5);
        assert_eq!(report.images[4].filename(), "blank.png");
        assert_eq!(report.not_found, 1);
        assert_eq!(report.counters[&MrzCode::Correct], 4);
        assert_eq!(report.counters.len(), MrzCode::ALL.len());
        for (label, count) in per_image.iter() {
            let total = report.letter_stats.get(*label);
            assert_eq!(total.correct, 4 * count.correct);
            assert_eq!(total.incorrect, 4 * count.incorrect);
        }
        assert_eq!(report.letter_stats.totals().total(), 4 * 88);
    }

    #[test]
    fn test_writes_masks_and_band_crops() {
        let out = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.output.masks_dir = Some(out.path().join("masks"));
        config.output.crops_dir = Some(out.path().join("crops"));
        let detector = detector(config);

        let page = render_document("PASSPORT", &TD3_SAMPLE, FontStyle::Regular);
        let report = analyzed(detector.process_grey("passport.png", &page));
        let blank = GrayImage::from_pixel(400, 300, Luma([235]));
        detector.process_grey("blank.jpg", &blank);

        let mask = image::open(out.path().join("masks/passport.bmp")).unwrap().to_luma8();
        assert_eq!(mask.dimensions(), page.dimensions());
        assert!(out.path().join("masks/blank.bmp").is_file());

        let crop = image::open(out.path().join("crops/passport.png")).unwrap().to_luma8();
        let margin = detector.config().band_margin;
        assert_eq!(crop.width(), page.width());
        assert_eq!(crop.height(), report.band.height + 2 * margin);
        // no band, no crop
        assert!(!out.path().join("crops/blank.png").exists());
    }

    #[test]
    fn test_rejects_catalog_of_other_size() {
        let config = Config::default();
        let catalog = Arc::new(synthetic_catalog(&config));
        let mut other = Config::default();
        other.fingerprint.width = 16;
        assert!(MrzDetector::new(other, catalog, Arc::new(LetterStats::new())).is_err());
    }

    #[test]
    fn test_run_directory_skips_unreadable_files() {
        let detector = detector(Config::default());
        let dir = tempfile::tempdir().unwrap();
        let page = render_document("PASSPORT", &TD3_SAMPLE, FontStyle::Regular);
        page.save(dir.path().join("b.png")).unwrap();
        page.save(dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let report = detector.run_directory(dir.path()).unwrap();
        let names: Vec<&str> = report.images.iter().map(ImageOutcome::filename).collect();
        assert_eq!(names, ["a.png", "b.png"]);
        assert_eq!(report.unreadable, vec!["broken.png".to_string()]);
        assert_eq!(report.counters[&MrzCode::Correct], 2);
    }
}
