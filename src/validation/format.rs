use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{CheckField, FieldError, MrzFields, MrzFormat, Segment};

lazy_static! {
    static ref MRZ_TEXT: Regex = Regex::new(r"^[A-Z0-9<]*$").unwrap();
    static ref NOT_MRZ_CHAR: Regex = Regex::new(r"[^A-Z0-9<]").unwrap();
}

/// Structural checks on recognized MRZ text, before any checksum.
pub struct FormatValidator;

impl FormatValidator {
    /// Returns the detected format, or every violation found.
    ///
    /// Length and charset problems stop the checks early, since field
    /// positions are meaningless on a malformed line.
    pub fn validate(lines: &[String]) -> Result<MrzFormat, Vec<FieldError>> {
        let lengths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        let Some(format) = MrzFormat::detect(&lengths) else {
            return Err(vec![FieldError::new(
                "lines",
                format!("expected 2 or 3 lines, found {}", lines.len()),
            )]);
        };

        let mut errors = Vec::new();
        for (i, (line, &length)) in lines.iter().zip(&lengths).enumerate() {
            let field = format!("line {}", i + 1);
            if length != format.chars_per_line() {
                errors.push(FieldError::new(
                    &field,
                    format!(
                        "expected {} characters for {:?}, found {}",
                        format.chars_per_line(),
                        format,
                        length
                    ),
                ));
            }
            if !MRZ_TEXT.is_match(line) {
                let invalid: String = NOT_MRZ_CHAR.find_iter(line).map(|m| m.as_str()).collect();
                errors.push(FieldError::new(
                    &field,
                    format!("characters outside the MRZ set: {:?}", invalid),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();
        for field in format.check_fields() {
            let (line, column) = field.check;
            let check = chars[line][column];
            let blank_optional = field.optional && check == '<';
            if !check.is_ascii_digit() && !blank_optional {
                errors.push(FieldError::new(
                    field.name,
                    format!("check digit at line {} column {} is {:?}", line + 1, column + 1, check),
                ));
            }
            if field.date {
                let value = field_text(&chars, field);
                if NaiveDate::parse_from_str(&value, "%y%m%d").is_err() {
                    errors.push(FieldError::new(field.name, format!("{:?} is not a YYMMDD date", value)));
                }
            }
        }

        if errors.is_empty() {
            Ok(format)
        } else {
            Err(errors)
        }
    }

    /// Decodes the fields of lines that passed `validate`.
    pub fn parse_fields(format: MrzFormat, lines: &[String]) -> MrzFields {
        let chars: Vec<Vec<char>> = lines.iter().map(|l| l.chars().collect()).collect();
        let layout = format.layout();
        let raw = |segment: Segment| segment_text(&chars, &segment);

        let names = raw(layout.names);
        let (surname, given_names) = match names.split_once("<<") {
            Some((surname, given)) => (clean(surname), clean(given)),
            None => (clean(&names), String::new()),
        };
        let optional_data = clean(&raw(layout.optional_data));

        MrzFields {
            document_type: clean(&raw(layout.document_type)),
            issuing_country: clean(&raw(layout.issuing_country)),
            document_number: clean(&raw(layout.document_number)),
            surname,
            given_names,
            nationality: clean(&raw(layout.nationality)),
            birth_date: raw(layout.birth_date),
            sex: clean(&raw(layout.sex)),
            expiry_date: raw(layout.expiry_date),
            optional_data: (!optional_data.is_empty()).then_some(optional_data),
        }
    }
}

/// Characters protected by `field`, segments concatenated.
pub fn field_text(chars: &[Vec<char>], field: &CheckField) -> String {
    field
        .segments
        .iter()
        .map(|segment| segment_text(chars, segment))
        .collect()
}

fn segment_text(chars: &[Vec<char>], segment: &Segment) -> String {
    chars
        .get(segment.line)
        .map(|line| {
            line.iter()
                .skip(segment.start)
                .take(segment.end - segment.start)
                .collect()
        })
        .unwrap_or_default()
}

/// Fillers to spaces, runs collapsed.
fn clean(text: &str) -> String {
    text.split('<')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
