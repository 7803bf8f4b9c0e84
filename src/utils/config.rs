use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::{MrzError, Result};

/// Size and category every glyph is normalized to before fingerprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintOptions {
    pub height: u32,
    pub width: u32,
    pub category: String,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        FingerprintOptions {
            height: 18,
            width: 12,
            category: "MRZ".to_string(),
        }
    }
}

/// Parameters used to clean connected components and group them into rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiOptions {
    /// Boxes shorter than this (pixels) are noise.
    pub min_height: u32,
    /// Boxes with fewer foreground pixels are noise.
    pub min_pixels: u32,
    /// Boxes wider than this fraction of the image width are not glyphs.
    pub max_width_ratio: f64,
    /// Allowed factor between a box's height/width ratio and the median ratio.
    pub ratio_tolerance: f64,
    /// Minimal vertical overlap, as a fraction of the smaller height, for a
    /// box to join a row.
    pub row_overlap: f64,
}

impl Default for RoiOptions {
    fn default() -> Self {
        RoiOptions {
            min_height: 6,
            min_pixels: 10,
            max_width_ratio: 0.1,
            ratio_tolerance: 2.5,
            row_overlap: 0.5,
        }
    }
}

/// Tolerances for the row histogram peak search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandOptions {
    /// Running median window over rows, must be odd.
    pub smoothing_window: usize,
    /// A row is a candidate peak when it reaches this fraction of the highest
    /// smoothed row.
    pub peak_ratio: f64,
    pub min_glyphs_per_line: usize,
    /// Fraction of the image width an MRZ line spans at least.
    pub min_line_width_ratio: f64,
    pub height_tolerance: f64,
    pub magnitude_tolerance: f64,
    pub spacing_tolerance: f64,
    /// Largest allowed distance between row centres, in median row heights.
    pub max_gap_factor: f64,
}

impl Default for BandOptions {
    fn default() -> Self {
        BandOptions {
            smoothing_window: 3,
            peak_ratio: 0.6,
            min_glyphs_per_line: 10,
            min_line_width_ratio: 0.4,
            height_tolerance: 0.25,
            magnitude_tolerance: 0.35,
            spacing_tolerance: 0.3,
            max_gap_factor: 3.0,
        }
    }
}

/// Which font the validator reads the MRZ with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSelection {
    /// Best font of the band's match ranking.
    #[default]
    TopRanked,
    /// Always this font, whatever the ranking says.
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingOptions {
    /// A glyph counts as found when its best score is above this.
    pub threshold: f64,
    /// How many ranked fonts are kept as candidates.
    pub top_fonts: usize,
    pub font_selection: FontSelection,
}

impl Default for MatchingOptions {
    fn default() -> Self {
        MatchingOptions {
            threshold: 0.5,
            top_fonts: 5,
            font_selection: FontSelection::TopRanked,
        }
    }
}

/// Where inspection images go. Nothing is written when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Page masks, as `<stem>.bmp`.
    pub masks_dir: Option<PathBuf>,
    /// Greyscale band crops, as `<stem>.png`.
    pub crops_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdAlgorithm {
    #[default]
    Isodata,
    Otsu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fingerprint: FingerprintOptions,
    pub roi: RoiOptions,
    pub band: BandOptions,
    pub matching: MatchingOptions,
    /// Catalog deduplication bound: a sample at least this similar to a
    /// stored variant is dropped.
    pub max_similarity: f64,
    /// Pixels added above and below the located band before cropping.
    pub band_margin: u32,
    pub threshold_algorithm: ThresholdAlgorithm,
    pub output: OutputOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fingerprint: FingerprintOptions::default(),
            roi: RoiOptions::default(),
            band: BandOptions::default(),
            matching: MatchingOptions::default(),
            max_similarity: 0.7,
            band_margin: 10,
            threshold_algorithm: ThresholdAlgorithm::default(),
            output: OutputOptions::default(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("max_similarity", self.max_similarity)?;
        check_unit("matching.threshold", self.matching.threshold)?;
        check_unit("band.peak_ratio", self.band.peak_ratio)?;
        check_unit("band.min_line_width_ratio", self.band.min_line_width_ratio)?;
        check_unit("roi.max_width_ratio", self.roi.max_width_ratio)?;
        check_unit("roi.row_overlap", self.roi.row_overlap)?;
        for (name, value) in [
            ("band.height_tolerance", self.band.height_tolerance),
            ("band.magnitude_tolerance", self.band.magnitude_tolerance),
            ("band.spacing_tolerance", self.band.spacing_tolerance),
        ] {
            check_unit(name, value)?;
        }

        if self.fingerprint.height == 0 || self.fingerprint.width == 0 {
            return Err(MrzError::InvalidConfig(format!(
                "fingerprint dimensions must be positive, got {}x{}",
                self.fingerprint.height, self.fingerprint.width
            )));
        }
        if self.band.smoothing_window == 0 || self.band.smoothing_window % 2 == 0 {
            return Err(MrzError::InvalidConfig(format!(
                "band.smoothing_window must be odd, got {}",
                self.band.smoothing_window
            )));
        }
        if self.roi.ratio_tolerance < 1.0 {
            return Err(MrzError::InvalidConfig(format!(
                "roi.ratio_tolerance must be at least 1, got {}",
                self.roi.ratio_tolerance
            )));
        }
        if self.band.max_gap_factor <= 0.0 {
            return Err(MrzError::InvalidConfig(
                "band.max_gap_factor must be positive".to_string(),
            ));
        }
        if self.matching.top_fonts == 0 {
            return Err(MrzError::InvalidConfig(
                "matching.top_fonts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(MrzError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_max_similarity_out_of_range() {
        let config = Config {
            max_similarity: 1.2,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(MrzError::InvalidConfig(_))));
    }

    #[test]
    fn test_even_smoothing_window_rejected() {
        let mut config = Config::default();
        config.band.smoothing_window = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"max_similarity": 0.8, "matching": {"font_selection": {"named": "OCR-B"}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_similarity, 0.8);
        assert_eq!(config.band_margin, 10);
        assert_eq!(
            config.matching.font_selection,
            FontSelection::Named("OCR-B".to_string())
        );
        assert_eq!(config.matching.top_fonts, 5);
        assert_eq!(config.output, OutputOptions::default());
    }
}
