pub mod detector;
pub mod models;
pub mod processing;
pub mod utils;
pub mod validation;

#[cfg(test)]
mod testing;

pub use detector::{BatchReport, ImageOutcome, ImageReport, MrzDetector};
pub use models::{LetterStats, MrzCode, MrzResult};
pub use processing::FingerprintCatalog;
pub use utils::{Config, MrzError, Result};
