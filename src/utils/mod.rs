pub mod config;
pub mod error;

pub use config::{
    BandOptions, Config, FingerprintOptions, FontSelection, MatchingOptions, OutputOptions,
    RoiOptions, ThresholdAlgorithm,
};
pub use error::{MrzError, Result};
