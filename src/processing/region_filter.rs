use log::debug;

use crate::models::{median, RoiBox, RowInfo};
use crate::utils::RoiOptions;

/// Filtered boxes of one image, grouped into rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredRegions {
    /// One scalar per row, ordered by `y`.
    pub parse_row_info: Vec<f64>,
    pub rows_info: Vec<RowInfo>,
    pub rois: Vec<RoiBox>,
}

impl FilteredRegions {
    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }
}

/// Rejects boxes that cannot be glyphs and clusters the rest into rows.
#[derive(Debug, Clone)]
pub struct RegionFilter {
    options: RoiOptions,
}

impl RegionFilter {
    pub fn new(options: RoiOptions) -> Self {
        RegionFilter { options }
    }

    pub fn filter(&self, rois: &[RoiBox], image_width: u32) -> FilteredRegions {
        let kept = self.remove_specks(rois);
        let kept = self.remove_wide(&kept, image_width);
        let kept = self.remove_ratio_outliers(&kept);
        let rows_info = self.group_rows(&kept);
        let parse_row_info = rows_info.iter().map(RowInfo::density).collect();

        debug!(
            "Region filter kept {} of {} boxes in {} rows",
            kept.len(),
            rois.len(),
            rows_info.len()
        );

        FilteredRegions {
            parse_row_info,
            rows_info,
            rois: kept,
        }
    }

    /// Drops boxes too small to be a glyph.
    pub fn remove_specks(&self, rois: &[RoiBox]) -> Vec<RoiBox> {
        rois.iter()
            .filter(|r| r.height >= self.options.min_height && r.pixels >= self.options.min_pixels)
            .copied()
            .collect()
    }

    /// Drops boxes spanning too much of the image width (frames, lines,
    /// photos).
    pub fn remove_wide(&self, rois: &[RoiBox], image_width: u32) -> Vec<RoiBox> {
        let max_width = self.options.max_width_ratio * image_width as f64;
        rois.iter()
            .filter(|r| r.width as f64 <= max_width)
            .copied()
            .collect()
    }

    /// Drops boxes whose height/width ratio is too far from the median ratio.
    pub fn remove_ratio_outliers(&self, rois: &[RoiBox]) -> Vec<RoiBox> {
        let mut ratios: Vec<f64> = rois.iter().map(RoiBox::ratio).collect();
        let median_ratio = median(&mut ratios);
        if median_ratio <= 0.0 {
            return Vec::new();
        }
        let low = median_ratio / self.options.ratio_tolerance;
        let high = median_ratio * self.options.ratio_tolerance;
        rois.iter()
            .filter(|r| {
                let ratio = r.ratio();
                ratio >= low && ratio <= high
            })
            .copied()
            .collect()
    }

    /// Clusters boxes into rows by vertical overlap, top to bottom.
    pub fn group_rows(&self, rois: &[RoiBox]) -> Vec<RowInfo> {
        let mut sorted = rois.to_vec();
        sorted.sort_by_key(|r| (r.y, r.x));

        // (top, bottom, members)
        let mut rows: Vec<(u32, u32, Vec<RoiBox>)> = Vec::new();
        for roi in sorted {
            if let Some((top, bottom, members)) = rows.last_mut() {
                let overlap = (*bottom).min(roi.bottom()).saturating_sub((*top).max(roi.y));
                let smaller = roi.height.min(*bottom - *top);
                if overlap as f64 >= self.options.row_overlap * smaller as f64 && overlap > 0 {
                    *top = (*top).min(roi.y);
                    *bottom = (*bottom).max(roi.bottom());
                    members.push(roi);
                    continue;
                }
            }
            rows.push((roi.y, roi.bottom(), vec![roi]));
        }

        rows.into_iter()
            .map(|(_, _, members)| RowInfo::from_boxes(members))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(y: u32, count: u32, height: u32) -> Vec<RoiBox> {
        (0..count)
            .map(|i| RoiBox::new(10 + i * 14, y, 10, height, 60))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let regions = RegionFilter::new(RoiOptions::default()).filter(&[], 500);
        assert!(regions.is_empty());
        assert!(regions.rows_info.is_empty());
        assert!(regions.parse_row_info.is_empty());
    }

    #[test]
    fn test_rejects_noise_and_outliers() {
        let mut rois = line(20, 5, 14);
        rois.push(RoiBox::new(100, 5, 2, 2, 4)); // speck
        rois.push(RoiBox::new(0, 60, 400, 14, 900)); // rule line
        rois.push(RoiBox::new(300, 20, 3, 14, 30)); // too thin for the median ratio
        let regions = RegionFilter::new(RoiOptions::default()).filter(&rois, 500);
        assert_eq!(regions.rois.len(), 5);
        assert_eq!(regions.rows_info.len(), 1);
        assert_eq!(regions.parse_row_info, vec![5.0]);
    }

    #[test]
    fn test_groups_rows_by_overlap() {
        let mut rois = line(100, 6, 14);
        rois.extend(line(40, 4, 14));
        // slightly lower glyph still belongs to the first row
        rois.push(RoiBox::new(200, 43, 10, 14, 60));
        let regions = RegionFilter::new(RoiOptions::default()).filter(&rois, 1000);

        assert_eq!(regions.rows_info.len(), 2);
        assert_eq!(regions.rows_info[0].y, 40);
        assert_eq!(regions.rows_info[0].count(), 5);
        assert_eq!(regions.rows_info[1].y, 100);
        assert_eq!(regions.parse_row_info, vec![5.0, 6.0]);
    }
}
