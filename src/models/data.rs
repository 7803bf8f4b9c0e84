use serde::{Deserialize, Serialize};

/// Bounding box of one connected foreground component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Foreground pixel count of the component.
    pub pixels: u32,
    /// First pixel of the component in raster order. Without it every
    /// foreground pixel inside the box counts as part of the glyph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<(u32, u32)>,
}

impl RoiBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32, pixels: u32) -> Self {
        RoiBox {
            x,
            y,
            width,
            height,
            pixels,
            seed: None,
        }
    }

    pub fn with_seed(mut self, x: u32, y: u32) -> Self {
        self.seed = Some((x, y));
        self
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Height over width, 0 for degenerate boxes.
    pub fn ratio(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.height as f64 / self.width as f64
        }
    }
}

/// One horizontal row of boxes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowInfo {
    pub y: u32,
    pub height: u32,
    pub median_height: f64,
    pub x_min: u32,
    pub x_max: u32,
    /// Sorted left to right.
    pub boxes: Vec<RoiBox>,
}

impl RowInfo {
    pub fn from_boxes(mut boxes: Vec<RoiBox>) -> Self {
        boxes.sort_by_key(|b| (b.x, b.y));
        let y = boxes.iter().map(|b| b.y).min().unwrap_or(0);
        let bottom = boxes.iter().map(RoiBox::bottom).max().unwrap_or(0);
        let x_min = boxes.iter().map(|b| b.x).min().unwrap_or(0);
        let x_max = boxes.iter().map(RoiBox::right).max().unwrap_or(0);
        let mut heights: Vec<f64> = boxes.iter().map(|b| b.height as f64).collect();
        RowInfo {
            y,
            height: bottom.saturating_sub(y),
            median_height: median(&mut heights),
            x_min,
            x_max,
            boxes,
        }
    }

    pub fn count(&self) -> usize {
        self.boxes.len()
    }

    /// Row scalar used for band detection: the number of glyph-like boxes.
    pub fn density(&self) -> f64 {
        self.boxes.len() as f64
    }

    pub fn center(&self) -> f64 {
        self.y as f64 + self.height as f64 / 2.0
    }

    pub fn span_width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }
}

/// Ordered `(position, magnitude)` samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Signal {
    pub points: Vec<(f64, f64)>,
}

impl Signal {
    /// Pair each row centre with the matching magnitude.
    pub fn from_rows(rows: &[RowInfo], magnitudes: &[f64]) -> Self {
        Signal {
            points: rows
                .iter()
                .zip(magnitudes)
                .map(|(row, &m)| (row.center(), m))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_magnitude(&self) -> f64 {
        self.points.iter().map(|p| p.1).fold(0.0, f64::max)
    }
}

/// A candidate MRZ line found in the smoothed row histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peak {
    pub row: usize,
    pub y: u32,
    pub height: u32,
    pub position: f64,
    pub magnitude: f64,
}

/// Vertical span of an accepted MRZ band plus what led to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub y: u32,
    pub height: u32,
    pub filtered_histogram: Vec<f64>,
    pub similar_peaks: Vec<Peak>,
    pub similarity_between_peaks: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotFoundReason {
    /// No box survived filtering.
    NoRegions,
    /// No row stands out of the histogram.
    NoPeaks,
    /// Peaks exist but never as 2 or 3 similar adjacent lines.
    IncoherentPeaks { peaks: usize, longest_run: usize },
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            NotFoundReason::NoRegions => write!(f, "no regions left after filtering"),
            NotFoundReason::NoPeaks => write!(f, "no row peaks"),
            NotFoundReason::IncoherentPeaks { peaks, longest_run } => write!(
                f,
                "{} peaks without a coherent MRZ pattern (longest run {})",
                peaks, longest_run
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BandOutcome {
    Found(Band),
    NotFound {
        reason: NotFoundReason,
        filtered_histogram: Vec<f64>,
    },
}

/// Aggregated fingerprint matches of one font over one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub font_name: String,
    pub total_found: usize,
    pub total_not_found: usize,
    pub total_similarity: f64,
}

impl MatchResult {
    pub fn new(font_name: &str) -> Self {
        MatchResult {
            font_name: font_name.to_string(),
            total_found: 0,
            total_not_found: 0,
            total_similarity: 0.0,
        }
    }

    pub fn mean_similarity(&self) -> f64 {
        if self.total_found == 0 {
            0.0
        } else {
            self.total_similarity / self.total_found as f64
        }
    }

    pub fn total(&self) -> usize {
        self.total_found + self.total_not_found
    }
}

/// Fields decoded from a validated MRZ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MrzFields {
    pub document_type: String,
    pub issuing_country: String,
    pub document_number: String,
    pub surname: String,
    pub given_names: String,
    pub nationality: String,
    pub birth_date: String,
    pub sex: String,
    pub expiry_date: String,
    pub optional_data: Option<String>,
}

/// Median of the values, reordering them. 0 for an empty slice.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
