pub mod check_digit;
pub mod format;
pub mod mrz;

pub use format::FormatValidator;
pub use mrz::{MrzValidator, UNRECOGNIZED};
