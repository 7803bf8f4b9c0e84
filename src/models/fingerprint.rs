use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::crop_imm;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};

use crate::models::RoiBox;

/// Fixed-size binary grid, stored as packed 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PackedBitmap", into = "PackedBitmap")]
pub struct Bitmap {
    height: u32,
    width: u32,
    words: Vec<u64>,
}

impl Bitmap {
    pub fn new(height: u32, width: u32) -> Self {
        let len = (height as usize * width as usize + 63) / 64;
        Bitmap {
            height,
            width,
            words: vec![0; len],
        }
    }

    /// Builds a bitmap from rows of `'#'` (set) and any other character.
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as u32;
        let mut bitmap = Bitmap::new(height, width);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    bitmap.set(y as u32, x as u32, true);
                }
            }
        }
        bitmap
    }

    /// Normalizes the glyph of `roi` in `mask` to `height × width` with
    /// nearest-neighbour sampling. When the box has a seed only the seed's
    /// component is sampled, so neighbours reaching into the box are ignored.
    pub fn from_mask_region(mask: &GrayImage, roi: &RoiBox, height: u32, width: u32) -> Self {
        let mut bitmap = Bitmap::new(height, width);
        if roi.width == 0 || roi.height == 0 {
            return bitmap;
        }
        let region = crop_imm(mask, roi.x, roi.y, roi.width, roi.height).to_image();
        let labels = connected_components(&region, Connectivity::Eight, Luma([0u8]));
        let own = roi.seed.and_then(|(x, y)| {
            let (x, y) = (x.checked_sub(roi.x)?, y.checked_sub(roi.y)?);
            (x < labels.width() && y < labels.height())
                .then(|| labels.get_pixel(x, y)[0])
                .filter(|&label| label != 0)
        });

        for row in 0..height {
            let src_y = ((row as f64 + 0.5) * roi.height as f64 / height as f64) as u32;
            for col in 0..width {
                let src_x = ((col as f64 + 0.5) * roi.width as f64 / width as f64) as u32;
                if src_x >= labels.width() || src_y >= labels.height() {
                    continue;
                }
                let label = labels.get_pixel(src_x, src_y)[0];
                let inside = match own {
                    Some(own) => label == own,
                    None => label != 0,
                };
                if inside {
                    bitmap.set(row, col, true);
                }
            }
        }
        bitmap
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn get(&self, row: u32, col: u32) -> bool {
        let index = (row * self.width + col) as usize;
        self.words[index / 64] >> (index % 64) & 1 == 1
    }

    pub fn set(&mut self, row: u32, col: u32, value: bool) {
        let index = (row * self.width + col) as usize;
        if value {
            self.words[index / 64] |= 1 << (index % 64);
        } else {
            self.words[index / 64] &= !(1 << (index % 64));
        }
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Tanimoto overlap: shared set bits over bits set in either bitmap.
    /// Two empty bitmaps are identical; bitmaps of different sizes share
    /// nothing.
    pub fn similarity(&self, other: &Bitmap) -> f64 {
        if self.height != other.height || self.width != other.width {
            return 0.0;
        }
        let (mut common, mut union) = (0u32, 0u32);
        for (a, b) in self.words.iter().zip(&other.words) {
            common += (a & b).count_ones();
            union += (a | b).count_ones();
        }
        if union == 0 {
            1.0
        } else {
            common as f64 / union as f64
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PackedBitmap {
    height: u32,
    width: u32,
    data: String,
}

impl From<Bitmap> for PackedBitmap {
    fn from(bitmap: Bitmap) -> Self {
        let bytes_len = (bitmap.height as usize * bitmap.width as usize + 7) / 8;
        let bytes: Vec<u8> = bitmap
            .words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(bytes_len)
            .collect();
        PackedBitmap {
            height: bitmap.height,
            width: bitmap.width,
            data: STANDARD.encode(bytes),
        }
    }
}

impl TryFrom<PackedBitmap> for Bitmap {
    type Error = String;

    fn try_from(packed: PackedBitmap) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(packed.data.as_bytes())
            .map_err(|e| format!("invalid bitmap data: {}", e))?;
        let bits = packed.height as usize * packed.width as usize;
        let expected = (bits + 7) / 8;
        if bytes.len() != expected {
            return Err(format!(
                "bitmap {}x{} needs {} bytes, got {}",
                packed.height,
                packed.width,
                expected,
                bytes.len()
            ));
        }

        let mut bitmap = Bitmap::new(packed.height, packed.width);
        for (i, chunk) in bytes.chunks(8).enumerate() {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            bitmap.words[i] = u64::from_le_bytes(word);
        }
        // padding bits past the last pixel stay clear
        if bits % 64 != 0 {
            if let Some(last) = bitmap.words.last_mut() {
                *last &= (1u64 << (bits % 64)) - 1;
            }
        }
        Ok(bitmap)
    }
}

/// Normalized template of one glyph in one font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub font_name: String,
    pub category: String,
    pub label: char,
    pub bitmap: Bitmap,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_similarity_bounds() {
        let a = Bitmap::from_rows(&["##..", "##..", "...."]);
        let b = Bitmap::from_rows(&["#...", "#...", "#..."]);
        assert_eq!(a.similarity(&a), 1.0);
        // 2 shared bits out of 5 set in either
        assert!((a.similarity(&b) - 0.4).abs() < 1e-9);
        assert_eq!(a.similarity(&b), b.similarity(&a));

        let empty = Bitmap::new(3, 4);
        assert_eq!(empty.similarity(&Bitmap::new(3, 4)), 1.0);
        assert_eq!(a.similarity(&empty), 0.0);
        assert_eq!(a.similarity(&Bitmap::new(4, 4)), 0.0);
    }

    #[test]
    fn test_from_mask_region_scales_nearest() {
        let mut mask = GrayImage::new(10, 10);
        // 4x4 filled square at (2, 2) with its top-left quarter cleared
        for y in 2..6 {
            for x in 2..6 {
                if !(x < 4 && y < 4) {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let roi = RoiBox::new(2, 2, 4, 4, 12);
        let bitmap = Bitmap::from_mask_region(&mask, &roi, 2, 2);
        assert!(!bitmap.get(0, 0));
        assert!(bitmap.get(0, 1));
        assert!(bitmap.get(1, 0));
        assert!(bitmap.get(1, 1));

        let same = Bitmap::from_mask_region(&mask, &roi, 4, 4);
        assert_eq!(same.count_ones(), 12);
    }

    #[test]
    fn test_from_mask_region_ignores_other_components() {
        let mut mask = GrayImage::new(12, 12);
        // L of 16 pixels: x=1 for y in 1..=8, then y=8 for x in 2..=9
        for y in 1..=8 {
            mask.put_pixel(1, y, Luma([255]));
        }
        for x in 2..=9 {
            mask.put_pixel(x, 8, Luma([255]));
        }
        // separate 3x3 blob inside the L's box
        for y in 3..=5 {
            for x in 5..=7 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let rois = crate::processing::ImageProcessor::extract_rois(&mask);
        assert_eq!(rois.len(), 2);
        assert_eq!((rois[0].width, rois[0].height, rois[0].pixels), (9, 8, 16));

        let l_shape = Bitmap::from_mask_region(&mask, &rois[0], 8, 9);
        assert_eq!(l_shape.count_ones(), 16);
        assert!(!l_shape.get(3, 5));
        let blob = Bitmap::from_mask_region(&mask, &rois[1], 3, 3);
        assert_eq!(blob.count_ones(), 9);

        // a box without a seed takes everything inside it
        let unseeded = RoiBox { seed: None, ..rois[0] };
        assert_eq!(Bitmap::from_mask_region(&mask, &unseeded, 8, 9).count_ones(), 25);
    }

    #[test]
    fn test_serde_keeps_bits() {
        let bitmap = Bitmap::from_rows(&["#.#.#", ".#.#.", "#####"]);
        let json = serde_json::to_string(&bitmap).unwrap();
        let back: Bitmap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bitmap);
    }

    #[test]
    fn test_serde_rejects_short_data() {
        let json = r#"{"height": 8, "width": 8, "data": "AA=="}"#;
        assert!(serde_json::from_str::<Bitmap>(json).is_err());
        // rejected before anything the size of the claimed grid is allocated
        let huge = r#"{"height": 4000000000, "width": 4000000000, "data": "AA=="}"#;
        assert!(serde_json::from_str::<Bitmap>(huge).is_err());
    }

    #[test]
    fn test_serde_clears_padding_bits() {
        // 3x3 grid: 9 bits in 2 bytes, the top 7 bits of the second byte set
        let json = r#"{"height": 3, "width": 3, "data": "/w=="}"#;
        assert!(serde_json::from_str::<Bitmap>(json).is_err());
        let json = r#"{"height": 3, "width": 3, "data": "//8="}"#;
        let bitmap: Bitmap = serde_json::from_str(json).unwrap();
        assert_eq!(bitmap.count_ones(), 9);
        assert_eq!(bitmap, Bitmap::from_rows(&["###", "###", "###"]));
    }
}
