use serde::Serialize;

/// Character range `start..end` on one MRZ line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

// A struct literal keeps the nested slices promotable to 'static.
macro_rules! seg {
    ($line:expr, $start:expr, $end:expr) => {
        Segment {
            line: $line,
            start: $start,
            end: $end,
        }
    };
}

/// A field protected by a check digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckField {
    pub name: &'static str,
    pub segments: &'static [Segment],
    /// `(line, column)` of the check digit.
    pub check: (usize, usize),
    /// The field may be left blank, and the check digit then may be `<`.
    pub optional: bool,
    /// Holds a `YYMMDD` date.
    pub date: bool,
}

impl CheckField {
    pub fn covers(&self, line: usize, column: usize) -> bool {
        self.check == (line, column)
            || self
                .segments
                .iter()
                .any(|s| s.line == line && (s.start..s.end).contains(&column))
    }
}

const fn field(name: &'static str, segments: &'static [Segment], check: (usize, usize)) -> CheckField {
    CheckField {
        name,
        segments,
        check,
        optional: false,
        date: false,
    }
}

const fn date_field(name: &'static str, segments: &'static [Segment], check: (usize, usize)) -> CheckField {
    CheckField {
        name,
        segments,
        check,
        optional: false,
        date: true,
    }
}

const TD1_FIELDS: &[CheckField] = &[
    field("document_number", &[seg!(0, 5, 14)], (0, 14)),
    date_field("birth_date", &[seg!(1, 0, 6)], (1, 6)),
    date_field("expiry_date", &[seg!(1, 8, 14)], (1, 14)),
    field(
        "composite",
        &[seg!(0, 5, 30), seg!(1, 0, 7), seg!(1, 8, 15), seg!(1, 18, 29)],
        (1, 29),
    ),
];

const TD2_FIELDS: &[CheckField] = &[
    field("document_number", &[seg!(1, 0, 9)], (1, 9)),
    date_field("birth_date", &[seg!(1, 13, 19)], (1, 19)),
    date_field("expiry_date", &[seg!(1, 21, 27)], (1, 27)),
    field(
        "composite",
        &[seg!(1, 0, 10), seg!(1, 13, 20), seg!(1, 21, 35)],
        (1, 35),
    ),
];

const TD3_FIELDS: &[CheckField] = &[
    field("document_number", &[seg!(1, 0, 9)], (1, 9)),
    date_field("birth_date", &[seg!(1, 13, 19)], (1, 19)),
    date_field("expiry_date", &[seg!(1, 21, 27)], (1, 27)),
    CheckField {
        name: "personal_number",
        segments: &[seg!(1, 28, 42)],
        check: (1, 42),
        optional: true,
        date: false,
    },
    field(
        "composite",
        &[seg!(1, 0, 10), seg!(1, 13, 20), seg!(1, 21, 43)],
        (1, 43),
    ),
];

/// Where the plain (unchecked) fields sit in each format.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    pub document_type: Segment,
    pub issuing_country: Segment,
    pub document_number: Segment,
    pub names: Segment,
    pub nationality: Segment,
    pub birth_date: Segment,
    pub sex: Segment,
    pub expiry_date: Segment,
    pub optional_data: Segment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MrzFormat {
    TD1, // ID card, 3 x 30
    TD2, // ID card, 2 x 36
    TD3, // Passport, 2 x 44
}

impl MrzFormat {
    pub fn lines(&self) -> usize {
        match self {
            MrzFormat::TD1 => 3,
            MrzFormat::TD2 => 2,
            MrzFormat::TD3 => 2,
        }
    }

    pub fn chars_per_line(&self) -> usize {
        match self {
            MrzFormat::TD1 => 30,
            MrzFormat::TD2 => 36,
            MrzFormat::TD3 => 44,
        }
    }

    /// Guess the format from the line count and the longest line. The
    /// lengths themselves are checked later, so a truncated line still
    /// resolves to the format it was cut from.
    pub fn detect(line_lengths: &[usize]) -> Option<MrzFormat> {
        let longest = line_lengths.iter().copied().max()?;
        match line_lengths.len() {
            3 => Some(MrzFormat::TD1),
            2 if longest > MrzFormat::TD2.chars_per_line() => Some(MrzFormat::TD3),
            2 => Some(MrzFormat::TD2),
            _ => None,
        }
    }

    pub fn check_fields(&self) -> &'static [CheckField] {
        match self {
            MrzFormat::TD1 => TD1_FIELDS,
            MrzFormat::TD2 => TD2_FIELDS,
            MrzFormat::TD3 => TD3_FIELDS,
        }
    }

    pub fn layout(&self) -> FieldLayout {
        match self {
            MrzFormat::TD1 => FieldLayout {
                document_type: seg!(0, 0, 2),
                issuing_country: seg!(0, 2, 5),
                document_number: seg!(0, 5, 14),
                names: seg!(2, 0, 30),
                nationality: seg!(1, 15, 18),
                birth_date: seg!(1, 0, 6),
                sex: seg!(1, 7, 8),
                expiry_date: seg!(1, 8, 14),
                optional_data: seg!(0, 15, 30),
            },
            MrzFormat::TD2 => FieldLayout {
                document_type: seg!(0, 0, 2),
                issuing_country: seg!(0, 2, 5),
                document_number: seg!(1, 0, 9),
                names: seg!(0, 5, 36),
                nationality: seg!(1, 10, 13),
                birth_date: seg!(1, 13, 19),
                sex: seg!(1, 20, 21),
                expiry_date: seg!(1, 21, 27),
                optional_data: seg!(1, 28, 35),
            },
            MrzFormat::TD3 => FieldLayout {
                document_type: seg!(0, 0, 2),
                issuing_country: seg!(0, 2, 5),
                document_number: seg!(1, 0, 9),
                names: seg!(0, 5, 44),
                nationality: seg!(1, 10, 13),
                birth_date: seg!(1, 13, 19),
                sex: seg!(1, 20, 21),
                expiry_date: seg!(1, 21, 27),
                optional_data: seg!(1, 28, 42),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(MrzFormat::detect(&[44, 44]), Some(MrzFormat::TD3));
        assert_eq!(MrzFormat::detect(&[44, 40]), Some(MrzFormat::TD3));
        assert_eq!(MrzFormat::detect(&[36, 36]), Some(MrzFormat::TD2));
        assert_eq!(MrzFormat::detect(&[30, 30, 30]), Some(MrzFormat::TD1));
        assert_eq!(MrzFormat::detect(&[44]), None);
        assert_eq!(MrzFormat::detect(&[]), None);
    }

    #[test]
    fn test_check_digits_inside_lines() {
        for format in [MrzFormat::TD1, MrzFormat::TD2, MrzFormat::TD3] {
            for field in format.check_fields() {
                assert!(field.check.0 < format.lines());
                assert!(field.check.1 < format.chars_per_line());
                for s in field.segments {
                    assert!(s.end <= format.chars_per_line(), "{:?} {}", format, field.name);
                }
            }
        }
    }

    #[test]
    fn test_composite_covers_its_check_digit() {
        let composite = MrzFormat::TD3.check_fields()[4];
        assert!(composite.covers(1, 43));
        assert!(composite.covers(1, 9));
        assert!(!composite.covers(1, 11));
        assert!(!composite.covers(0, 0));
    }
}
