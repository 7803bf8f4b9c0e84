use log::debug;

use crate::models::{median, Band, BandOutcome, NotFoundReason, Peak, RoiBox, RowInfo, Signal};
use crate::utils::BandOptions;

/// Finds the MRZ band: two or three adjacent, near-identical rows that stand
/// out in the smoothed row histogram.
#[derive(Debug, Clone)]
pub struct TextBandLocator {
    options: BandOptions,
}

struct Run {
    rows: Vec<usize>,
    similarities: Vec<f64>,
    /// Some pair of rows, not only neighbours, is too different.
    incoherent: bool,
}

impl TextBandLocator {
    pub fn new(options: BandOptions) -> Self {
        TextBandLocator { options }
    }

    pub fn locate(
        &self,
        parse_row_info: &[f64],
        rows_info: &[RowInfo],
        rois: &[RoiBox],
        image_width: u32,
    ) -> BandOutcome {
        let filtered_histogram = smooth(parse_row_info, self.options.smoothing_window);
        let not_found = |reason: NotFoundReason| BandOutcome::NotFound {
            reason,
            filtered_histogram: filtered_histogram.clone(),
        };

        if rois.is_empty() || rows_info.is_empty() {
            return not_found(NotFoundReason::NoRegions);
        }

        let signal = Signal::from_rows(rows_info, &filtered_histogram);
        let candidates = self.candidate_rows(&signal, rows_info, image_width);
        if candidates.is_empty() {
            debug!("No row reaches the peak threshold");
            return not_found(NotFoundReason::NoPeaks);
        }

        let mut heights: Vec<f64> = rois.iter().map(|r| r.height as f64).collect();
        let glyph_height = median(&mut heights);
        let runs = self.coherent_runs(&candidates, &signal, rows_info, glyph_height);
        let longest_run = runs.iter().map(|r| r.rows.len()).max().unwrap_or(0);

        // Highest mean magnitude wins; on ties the lower band on the page.
        let mut best: Option<(f64, &Run)> = None;
        for run in runs
            .iter()
            .filter(|r| !r.incoherent && (2..=3).contains(&r.rows.len()))
        {
            let mean = run.rows.iter().map(|&i| signal.points[i].1).sum::<f64>() / run.rows.len() as f64;
            if best.map_or(true, |(m, _)| mean >= m) {
                best = Some((mean, run));
            }
        }

        let Some((_, run)) = best else {
            debug!(
                "{} candidate rows, longest coherent run {}",
                candidates.len(),
                longest_run
            );
            return not_found(NotFoundReason::IncoherentPeaks {
                peaks: candidates.len(),
                longest_run,
            });
        };

        let first = &rows_info[run.rows[0]];
        let last = &rows_info[run.rows[run.rows.len() - 1]];
        let y = first.y;
        let height = run
            .rows
            .iter()
            .map(|&i| rows_info[i].y + rows_info[i].height)
            .max()
            .unwrap_or(last.y + last.height)
            - y;

        let similar_peaks = run
            .rows
            .iter()
            .map(|&i| Peak {
                row: i,
                y: rows_info[i].y,
                height: rows_info[i].height,
                position: signal.points[i].0,
                magnitude: signal.points[i].1,
            })
            .collect();

        debug!("MRZ band at y={} height={} ({} lines)", y, height, run.rows.len());

        BandOutcome::Found(Band {
            y,
            height,
            filtered_histogram,
            similar_peaks,
            similarity_between_peaks: run.similarities.clone(),
        })
    }

    fn candidate_rows(&self, signal: &Signal, rows_info: &[RowInfo], image_width: u32) -> Vec<usize> {
        let max = signal.max_magnitude();
        if max <= 0.0 {
            return Vec::new();
        }
        let min_magnitude = (self.options.peak_ratio * max).max(self.options.min_glyphs_per_line as f64);
        let min_span = self.options.min_line_width_ratio * image_width as f64;
        signal
            .points
            .iter()
            .enumerate()
            .filter(|(i, &(_, magnitude))| {
                magnitude >= min_magnitude && rows_info[*i].span_width() as f64 >= min_span
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Splits candidate rows into runs of adjacent rows, each chained to the
    /// previous one. A run where two rows, adjacent or not, differ too much in
    /// height or magnitude is marked incoherent.
    fn coherent_runs(
        &self,
        candidates: &[usize],
        signal: &Signal,
        rows_info: &[RowInfo],
        glyph_height: f64,
    ) -> Vec<Run> {
        let max_gap = self.options.max_gap_factor * glyph_height;
        let mut runs: Vec<Run> = Vec::new();

        for &row in candidates {
            if let Some(run) = runs.last_mut() {
                let prev = run.rows[run.rows.len() - 1];
                if prev + 1 == row {
                    let gap = signal.points[row].0 - signal.points[prev].0;
                    let previous_gap = (run.rows.len() >= 2)
                        .then(|| signal.points[prev].0 - signal.points[run.rows[run.rows.len() - 2]].0);
                    if let Some(similarity) = self.pair_similarity(
                        &rows_info[prev],
                        &rows_info[row],
                        signal.points[prev].1,
                        signal.points[row].1,
                        gap,
                        previous_gap,
                        max_gap,
                    ) {
                        let fits_all = run.rows.iter().all(|&earlier| {
                            self.alike(
                                &rows_info[earlier],
                                &rows_info[row],
                                signal.points[earlier].1,
                                signal.points[row].1,
                            )
                        });
                        run.rows.push(row);
                        run.similarities.push(similarity);
                        run.incoherent |= !fits_all;
                        continue;
                    }
                }
            }
            runs.push(Run {
                rows: vec![row],
                similarities: Vec::new(),
                incoherent: false,
            });
        }
        runs
    }

    /// Similarity of two adjacent rows, or `None` when they cannot belong to
    /// the same MRZ.
    #[allow(clippy::too_many_arguments)]
    fn pair_similarity(
        &self,
        a: &RowInfo,
        b: &RowInfo,
        magnitude_a: f64,
        magnitude_b: f64,
        gap: f64,
        previous_gap: Option<f64>,
        max_gap: f64,
    ) -> Option<f64> {
        if !self.alike(a, b, magnitude_a, magnitude_b) || gap > max_gap {
            return None;
        }
        if let Some(previous_gap) = previous_gap {
            if 1.0 - ratio(gap, previous_gap) > self.options.spacing_tolerance {
                return None;
            }
        }
        Some(ratio(a.median_height, b.median_height) * ratio(magnitude_a, magnitude_b))
    }

    fn alike(&self, a: &RowInfo, b: &RowInfo, magnitude_a: f64, magnitude_b: f64) -> bool {
        ratio(a.median_height, b.median_height) >= 1.0 - self.options.height_tolerance
            && ratio(magnitude_a, magnitude_b) >= 1.0 - self.options.magnitude_tolerance
    }
}

fn ratio(a: f64, b: f64) -> f64 {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    if high <= 0.0 {
        1.0
    } else {
        low / high
    }
}

/// Running median. Windows are clamped at both ends; an even-sized edge
/// window takes its lower middle value so lone spikes at the ends vanish too.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let mut slice = values[lo..hi].to_vec();
            slice.sort_by(|a, b| a.total_cmp(b));
            slice[(slice.len() - 1) / 2]
        })
        .collect()
}
