pub mod data;
pub mod fingerprint;
pub mod result;
pub mod rules;
pub mod stats;

pub use data::*;
pub use fingerprint::{Bitmap, Fingerprint};
pub use result::{Diagnostics, FieldError, MrzCode, MrzResult};
pub use rules::{CheckField, MrzFormat, Segment};
pub use stats::{LetterCount, LetterStats, LetterTally};
