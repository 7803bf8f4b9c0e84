//! Synthetic glyph rendering shared by the unit tests.
//!
//! Every glyph is a 5x7 cell pattern: a full bar and a full spine plus one
//! stroke per remaining row whose length encodes the character, so each glyph
//! is a single connected component with a fixed bounding box.

use image::{GrayImage, Luma};

use crate::processing::{FingerprintCatalog, ImageProcessor};
use crate::utils::{Config, ThresholdAlgorithm};

pub const CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ<";

pub const TD3_SAMPLE: [&str; 2] = [
    "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<",
    "L898902C36UTO7408122F1204159ZE184226B<<<<<10",
];

const MARGIN: u32 = 20;
const INK: Luma<u8> = Luma([15]);
const PAPER: Luma<u8> = Luma([235]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    /// Top bar, left spine, strokes to the right.
    Regular,
    /// Bottom bar, right spine, strokes to the left.
    Bold,
}

impl FontStyle {
    pub fn name(self) -> &'static str {
        match self {
            FontStyle::Regular => "Synth",
            FontStyle::Bold => "Synth Bold",
        }
    }
}

pub fn glyph_cells(c: char, style: FontStyle) -> [[bool; 5]; 7] {
    let index = CHARSET.find(c).unwrap_or_else(|| panic!("no synthetic glyph for {:?}", c));
    let code = index + 1;
    let mut cells = [[false; 5]; 7];
    match style {
        FontStyle::Regular => {
            cells[0] = [true; 5];
            for (r, row) in cells.iter_mut().enumerate().skip(1) {
                row[0] = true;
                let len = (code / 5usize.pow(r as u32 - 1)) % 5;
                for cell in row.iter_mut().skip(1).take(len) {
                    *cell = true;
                }
            }
        }
        FontStyle::Bold => {
            cells[6] = [true; 5];
            for (r, row) in cells.iter_mut().enumerate().take(6) {
                row[4] = true;
                let len = (code / 5usize.pow(r as u32)) % 5;
                for cell in row.iter_mut().take(4).skip(4 - len) {
                    *cell = true;
                }
            }
        }
    }
    cells
}

pub fn glyph_width(scale: u32) -> u32 {
    5 * scale
}

pub fn glyph_height(scale: u32) -> u32 {
    7 * scale
}

fn advance(scale: u32) -> u32 {
    7 * scale
}

fn line_pitch(scale: u32) -> u32 {
    11 * scale
}

pub fn text_width(len: usize, scale: u32) -> u32 {
    if len == 0 {
        0
    } else {
        len as u32 * advance(scale) - 2 * scale
    }
}

pub fn draw_text(image: &mut GrayImage, x: u32, y: u32, text: &str, style: FontStyle, scale: u32) {
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * advance(scale);
        for (r, row) in glyph_cells(c, style).iter().enumerate() {
            for (col, &on) in row.iter().enumerate() {
                if !on {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        image.put_pixel(gx + col as u32 * scale + dx, y + r as u32 * scale + dy, INK);
                    }
                }
            }
        }
    }
}

/// Lines of text on a blank page, left aligned.
pub fn render_lines(lines: &[&str], style: FontStyle, scale: u32) -> GrayImage {
    let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let width = 2 * MARGIN + text_width(longest, scale);
    let height = 2 * MARGIN + lines.len() as u32 * line_pitch(scale);
    let mut image = GrayImage::from_pixel(width, height, PAPER);
    for (i, line) in lines.iter().enumerate() {
        draw_text(&mut image, MARGIN, MARGIN + i as u32 * line_pitch(scale), line, style, scale);
    }
    image
}

/// A document page: a short header at the top and the MRZ near the bottom.
pub fn render_document(header: &str, mrz: &[&str], style: FontStyle) -> GrayImage {
    let scale = 3;
    let longest = mrz.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let width = 2 * MARGIN + text_width(longest, scale);
    let mrz_top = MARGIN + 100;
    let height = mrz_top + mrz.len() as u32 * line_pitch(scale) + MARGIN;
    let mut image = GrayImage::from_pixel(width, height, PAPER);
    draw_text(&mut image, MARGIN, MARGIN, header, style, scale);
    for (i, line) in mrz.iter().enumerate() {
        draw_text(&mut image, MARGIN, mrz_top + i as u32 * line_pitch(scale), line, style, scale);
    }
    image
}

pub fn render_mask(lines: &[&str], style: FontStyle) -> GrayImage {
    ImageProcessor::mask(&render_lines(lines, style, 3), ThresholdAlgorithm::Isodata)
}

/// Catalog trained on one sheet per synthetic font.
pub fn synthetic_catalog(config: &Config) -> FingerprintCatalog {
    let mut catalog = FingerprintCatalog::from_config(config).unwrap();
    for style in [FontStyle::Regular, FontStyle::Bold] {
        let sheet = render_mask(&[CHARSET], style);
        catalog
            .train_font(style.name(), &sheet, &[CHARSET], &config.roi)
            .unwrap();
    }
    catalog
}

#[test]
fn test_synthetic_glyphs_are_distinct() {
    for style in [FontStyle::Regular, FontStyle::Bold] {
        let all: Vec<_> = CHARSET.chars().map(|c| glyph_cells(c, style)).collect();
        for i in 0..all.len() {
            for j in i + 1..all.len() {
                assert_ne!(all[i], all[j]);
            }
        }
    }
}
