use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::GrayImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::models::{Bitmap, Fingerprint, RoiBox};
use crate::processing::{GlyphSegmenter, ImageProcessor};
use crate::utils::{Config, FingerprintOptions, MrzError, Result, RoiOptions};

/// One scored catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub font_name: String,
    pub label: char,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub added: usize,
    pub discarded: usize,
}

/// Deduplicated glyph templates, grouped by font then label.
///
/// A new sample is stored only when it is less than `max_similarity`
/// similar to every stored template with the same label and category, in
/// any font. The catalog is filled once and then only read.
#[derive(Debug, Clone)]
pub struct FingerprintCatalog {
    options: FingerprintOptions,
    max_similarity: f64,
    fonts: BTreeMap<String, BTreeMap<char, Vec<Fingerprint>>>,
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    height: u32,
    width: u32,
    category: String,
    max_similarity: f64,
    fingerprints: Vec<Fingerprint>,
}

impl FingerprintCatalog {
    pub fn new(options: FingerprintOptions, max_similarity: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&max_similarity) {
            return Err(MrzError::InvalidConfig(format!(
                "max_similarity must be within [0, 1], got {}",
                max_similarity
            )));
        }
        if options.height == 0 || options.width == 0 {
            return Err(MrzError::InvalidConfig(
                "fingerprint dimensions must be positive".to_string(),
            ));
        }
        Ok(FingerprintCatalog {
            options,
            max_similarity,
            fonts: BTreeMap::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.fingerprint.clone(), config.max_similarity)
    }

    pub fn options(&self) -> &FingerprintOptions {
        &self.options
    }

    pub fn max_similarity(&self) -> f64 {
        self.max_similarity
    }

    pub fn font_names(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(String::as_str)
    }

    pub fn contains_font(&self, font_name: &str) -> bool {
        self.fonts.contains_key(font_name)
    }

    pub fn len(&self) -> usize {
        self.fingerprints().count()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// All fingerprints, by font, label, then insertion order.
    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.fonts
            .values()
            .flat_map(|labels| labels.values().flat_map(|v| v.iter()))
    }

    pub fn font_fingerprints<'a>(&'a self, font_name: &str) -> impl Iterator<Item = &'a Fingerprint> {
        self.fonts
            .get(font_name)
            .into_iter()
            .flat_map(|labels| labels.values().flat_map(|v| v.iter()))
    }

    /// Normalize one glyph of `mask` to the catalog dimensions.
    pub fn normalize(&self, mask: &GrayImage, roi: &RoiBox) -> Bitmap {
        Bitmap::from_mask_region(mask, roi, self.options.height, self.options.width)
    }

    /// Adds a sample in the catalog category. Returns whether it was kept.
    pub fn insert(&mut self, font_name: &str, label: char, bitmap: Bitmap) -> Result<bool> {
        self.insert_fingerprint(Fingerprint {
            font_name: font_name.to_string(),
            category: self.options.category.clone(),
            label,
            bitmap,
        })
    }

    pub fn insert_fingerprint(&mut self, fingerprint: Fingerprint) -> Result<bool> {
        if fingerprint.bitmap.height() != self.options.height
            || fingerprint.bitmap.width() != self.options.width
        {
            return Err(MrzError::CatalogError(format!(
                "fingerprint for {:?} in {} is {}x{}, catalog expects {}x{}",
                fingerprint.label,
                fingerprint.font_name,
                fingerprint.bitmap.height(),
                fingerprint.bitmap.width(),
                self.options.height,
                self.options.width
            )));
        }

        let closest = self
            .fingerprints()
            .filter(|f| f.label == fingerprint.label && f.category == fingerprint.category)
            .map(|f| f.bitmap.similarity(&fingerprint.bitmap))
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

        if let Some(similarity) = closest {
            if similarity >= self.max_similarity {
                return Ok(false);
            }
        }

        self.fonts
            .entry(fingerprint.font_name.clone())
            .or_default()
            .entry(fingerprint.label)
            .or_default()
            .push(fingerprint);
        Ok(true)
    }

    /// Every fingerprint scored against `bitmap`, best first, optionally
    /// limited to one font.
    pub fn lookup(&self, bitmap: &Bitmap, font_name: Option<&str>) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .fingerprints()
            .filter(|f| font_name.map_or(true, |name| f.font_name == name))
            .map(|f| Candidate {
                font_name: f.font_name.clone(),
                label: f.label,
                similarity: f.bitmap.similarity(bitmap),
            })
            .collect();
        // stable: equal scores keep font, label, insertion order
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        candidates
    }

    /// Best fingerprint of one font for `bitmap`; the first one wins ties.
    pub fn best_in_font(&self, bitmap: &Bitmap, font_name: &str) -> Option<Candidate> {
        let mut best: Option<(&Fingerprint, f64)> = None;
        for fingerprint in self.font_fingerprints(font_name) {
            let similarity = fingerprint.bitmap.similarity(bitmap);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((fingerprint, similarity));
            }
        }
        best.map(|(f, similarity)| Candidate {
            font_name: f.font_name.clone(),
            label: f.label,
            similarity,
        })
    }

    /// Learns a font from a binarized sample sheet whose lines hold exactly
    /// the characters of `lines` (whitespace ignored).
    pub fn train_font(
        &mut self,
        font_name: &str,
        mask: &GrayImage,
        lines: &[&str],
        roi_options: &RoiOptions,
    ) -> Result<TrainingSummary> {
        let expected: Vec<Vec<char>> = lines
            .iter()
            .map(|l| l.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>())
            .filter(|l| !l.is_empty())
            .collect();
        let text = GlyphSegmenter::new(roi_options.clone()).segment(mask);

        if text.lines.len() != expected.len() {
            return Err(MrzError::TrainingError(format!(
                "{}: sheet has {} lines of glyphs, text has {}",
                font_name,
                text.lines.len(),
                expected.len()
            )));
        }
        for (i, (line, chars)) in text.lines.iter().zip(&expected).enumerate() {
            if line.count() != chars.len() {
                return Err(MrzError::TrainingError(format!(
                    "{}: line {} has {} glyphs, text has {} characters",
                    font_name,
                    i + 1,
                    line.count(),
                    chars.len()
                )));
            }
        }

        let mut summary = TrainingSummary::default();
        for (line, chars) in text.lines.iter().zip(&expected) {
            for (roi, &label) in line.boxes.iter().zip(chars) {
                let bitmap = self.normalize(mask, roi);
                if self.insert(font_name, label, bitmap)? {
                    summary.added += 1;
                } else {
                    summary.discarded += 1;
                }
            }
        }
        debug!(
            "Trained {}: {} fingerprints added, {} redundant",
            font_name, summary.added, summary.discarded
        );
        Ok(summary)
    }

    /// Builds a catalog from `<dir>/<font name>/*.png` sample sheets, each
    /// with a `.txt` file of the same name holding the sheet's text.
    pub fn from_font_directory<P: AsRef<Path>>(dir: P, config: &Config) -> Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::from_config(config)?;

        let mut fonts: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        fonts.sort();

        for font_dir in fonts {
            let Some(font_name) = font_dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let mut sheets: Vec<_> = fs::read_dir(&font_dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.extension()
                        .and_then(|e| e.to_str())
                        .map_or(false, |e| e.eq_ignore_ascii_case("png"))
                })
                .collect();
            sheets.sort();

            for sheet in sheets {
                let text_path = sheet.with_extension("txt");
                let text = match fs::read_to_string(&text_path) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Skipping {}: no text at {} ({})", sheet.display(), text_path.display(), e);
                        continue;
                    }
                };
                let image = match ImageProcessor::open(&sheet) {
                    Ok(image) => image,
                    Err(e) => {
                        warn!("Skipping {}: {}", sheet.display(), e);
                        continue;
                    }
                };
                let grey = ImageProcessor::to_grey(&image);
                let mask = ImageProcessor::mask(&grey, config.threshold_algorithm);
                let lines: Vec<&str> = text.lines().collect();
                if let Err(e) = catalog.train_font(&font_name, &mask, &lines, &config.roi) {
                    warn!("Skipping {}: {}", sheet.display(), e);
                }
            }
        }

        if catalog.is_empty() {
            return Err(MrzError::CatalogError(format!(
                "no usable font samples under {}",
                dir.display()
            )));
        }
        info!(
            "Built catalog with {} fingerprints for {} fonts",
            catalog.len(),
            catalog.fonts.len()
        );
        Ok(catalog)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = CatalogFile {
            height: self.options.height,
            width: self.options.width,
            category: self.options.category.clone(),
            max_similarity: self.max_similarity,
            fingerprints: self.fingerprints().cloned().collect(),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        Ok(())
    }

    /// Loads a saved catalog. The file has to match `config` in dimensions,
    /// category and deduplication bound, and every stored fingerprint goes
    /// through the deduplicating insert again.
    pub fn load<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&data)?;
        let expected = &config.fingerprint;
        if file.height != expected.height || file.width != expected.width {
            return Err(MrzError::CatalogError(format!(
                "catalog {} holds {}x{} fingerprints, configuration expects {}x{}",
                path.display(),
                file.height,
                file.width,
                expected.height,
                expected.width
            )));
        }
        if file.category != expected.category {
            return Err(MrzError::CatalogError(format!(
                "catalog {} is for category {:?}, configuration expects {:?}",
                path.display(),
                file.category,
                expected.category
            )));
        }
        if (file.max_similarity - config.max_similarity).abs() > 1e-9 {
            return Err(MrzError::CatalogError(format!(
                "catalog {} was deduplicated at max_similarity {}, configuration asks for {}",
                path.display(),
                file.max_similarity,
                config.max_similarity
            )));
        }

        let mut catalog = Self::from_config(config)?;
        for fingerprint in file.fingerprints {
            let (label, font_name) = (fingerprint.label, fingerprint.font_name.clone());
            if !catalog.insert_fingerprint(fingerprint)? {
                return Err(MrzError::CatalogError(format!(
                    "catalog {}: fingerprint {:?} of {} duplicates a stored variant",
                    path.display(),
                    label,
                    font_name
                )));
            }
        }
        if catalog.is_empty() {
            return Err(MrzError::CatalogError(format!(
                "catalog {} is empty",
                path.display()
            )));
        }
        debug!("Loaded {} fingerprints from {}", catalog.len(), path.display());
        Ok(catalog)
    }
}
