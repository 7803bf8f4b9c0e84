pub mod fingerprint_catalog;
pub mod glyph_matcher;
pub mod image;
pub mod region_filter;
pub mod segmentation;
pub mod text_band;

pub use fingerprint_catalog::{Candidate, FingerprintCatalog, TrainingSummary};
pub use glyph_matcher::{rank, GlyphMatcher};
pub use self::image::ImageProcessor;
pub use region_filter::{FilteredRegions, RegionFilter};
pub use segmentation::{GlyphSegmenter, SegmentedText};
pub use text_band::TextBandLocator;
