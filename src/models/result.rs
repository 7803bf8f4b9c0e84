use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::models::MrzFields;

/// Closed outcome taxonomy. Names and numeric codes are part of the report
/// format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MrzCode {
    PreprocessError,
    Correct,
    ChecksumError,
    FormatError,
    UnknownError,
}

impl MrzCode {
    pub const ALL: [MrzCode; 5] = [
        MrzCode::PreprocessError,
        MrzCode::Correct,
        MrzCode::ChecksumError,
        MrzCode::FormatError,
        MrzCode::UnknownError,
    ];

    pub fn code(self) -> u8 {
        match self {
            MrzCode::PreprocessError => 0,
            MrzCode::Correct => 1,
            MrzCode::ChecksumError => 2,
            MrzCode::FormatError => 3,
            MrzCode::UnknownError => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MrzCode::PreprocessError => "PREPROCESS_ERROR",
            MrzCode::Correct => "CORRECT",
            MrzCode::ChecksumError => "CHECKSUM_ERROR",
            MrzCode::FormatError => "FORMAT_ERROR",
            MrzCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for MrzCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed check on one MRZ field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub expected: Option<char>,
    pub found: Option<char>,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
            expected: None,
            found: None,
        }
    }

    pub fn check_digit(field: &str, expected: char, found: char) -> Self {
        FieldError {
            field: field.to_string(),
            message: format!("check digit is {} but {} was computed", found, expected),
            expected: Some(expected),
            found: Some(found),
        }
    }
}

/// Per-image details for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub error_information: Option<String>,
    pub field_errors: Vec<FieldError>,
    /// Foreground pixels per row of the band.
    pub histogram: Vec<u32>,
    pub lines: Vec<String>,
    pub fields: Option<MrzFields>,
    /// One crop per recognized line.
    #[serde(skip)]
    pub images: Vec<GrayImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MrzResult {
    pub code: MrzCode,
    pub diagnostics: Diagnostics,
}

impl MrzResult {
    pub fn correct(lines: Vec<String>, fields: MrzFields) -> Self {
        MrzResult {
            code: MrzCode::Correct,
            diagnostics: Diagnostics {
                lines,
                fields: Some(fields),
                ..Diagnostics::default()
            },
        }
    }

    pub fn preprocess_error(detail: impl Into<String>) -> Self {
        MrzResult {
            code: MrzCode::PreprocessError,
            diagnostics: Diagnostics {
                error_information: Some(detail.into()),
                ..Diagnostics::default()
            },
        }
    }

    pub fn checksum_error(
        lines: Vec<String>,
        fields: MrzFields,
        field_errors: Vec<FieldError>,
    ) -> Self {
        let summary = field_errors
            .iter()
            .map(|e| e.field.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        MrzResult {
            code: MrzCode::ChecksumError,
            diagnostics: Diagnostics {
                error_information: Some(format!("invalid check digits: {}", summary)),
                field_errors,
                lines,
                fields: Some(fields),
                ..Diagnostics::default()
            },
        }
    }

    pub fn format_error(lines: Vec<String>, field_errors: Vec<FieldError>) -> Self {
        let summary = field_errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        MrzResult {
            code: MrzCode::FormatError,
            diagnostics: Diagnostics {
                error_information: Some(summary),
                field_errors,
                lines,
                ..Diagnostics::default()
            },
        }
    }

    pub fn unknown_error(detail: impl Into<String>) -> Self {
        MrzResult {
            code: MrzCode::UnknownError,
            diagnostics: Diagnostics {
                error_information: Some(detail.into()),
                ..Diagnostics::default()
            },
        }
    }

    /// Attach the band projection and line crops.
    pub fn with_band(mut self, histogram: Vec<u32>, images: Vec<GrayImage>) -> Self {
        self.diagnostics.histogram = histogram;
        self.diagnostics.images = images;
        self
    }

    pub fn is_correct(&self) -> bool {
        self.code == MrzCode::Correct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let names: Vec<&str> = MrzCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            ["PREPROCESS_ERROR", "CORRECT", "CHECKSUM_ERROR", "FORMAT_ERROR", "UNKNOWN_ERROR"]
        );
        for (i, code) in MrzCode::ALL.iter().enumerate() {
            assert_eq!(code.code() as usize, i);
            assert_eq!(
                serde_json::to_string(code).unwrap(),
                format!("\"{}\"", code.as_str())
            );
        }
    }

    #[test]
    fn test_format_error_summary() {
        let result = MrzResult::format_error(
            vec!["P<UTO".to_string()],
            vec![FieldError::new("line 1", "expected 44 characters, got 5")],
        );
        assert_eq!(result.code, MrzCode::FormatError);
        assert_eq!(
            result.diagnostics.error_information.as_deref(),
            Some("line 1: expected 44 characters, got 5")
        );
    }
}
