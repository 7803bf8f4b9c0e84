//! ICAO 9303 check digits: weighted sum modulo 10 with weights 7, 3, 1.

const WEIGHTS: [u32; 3] = [7, 3, 1];

/// Numeric value of an MRZ character: digits as themselves, `A`..`Z` as
/// 10..35, filler `<` as 0.
pub fn char_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
        '<' => Some(0),
        _ => None,
    }
}

/// Check digit of `data`, or `None` if it holds a character outside the MRZ
/// alphabet.
pub fn compute<I>(data: I) -> Option<char>
where
    I: IntoIterator<Item = char>,
{
    let mut sum = 0;
    for (i, c) in data.into_iter().enumerate() {
        sum += char_value(c)? * WEIGHTS[i % 3];
    }
    char::from_digit(sum % 10, 10)
}

pub fn verify(data: &str, check: char) -> bool {
    compute(data.chars()) == Some(check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_values() {
        assert_eq!(char_value('0'), Some(0));
        assert_eq!(char_value('7'), Some(7));
        assert_eq!(char_value('A'), Some(10));
        assert_eq!(char_value('Z'), Some(35));
        assert_eq!(char_value('<'), Some(0));
        assert_eq!(char_value('a'), None);
        assert_eq!(char_value('?'), None);
    }

    #[test]
    fn test_known_check_digits() {
        assert_eq!(compute("L898902C3".chars()), Some('6'));
        assert_eq!(compute("740812".chars()), Some('2'));
        assert_eq!(compute("120415".chars()), Some('9'));
        assert_eq!(compute("ZE184226B<<<<<".chars()), Some('1'));
        assert_eq!(compute("".chars()), Some('0'));
        assert!(verify("D23145890", '7'));
        assert!(!verify("D23145890", '8'));
        assert_eq!(compute("AB?".chars()), None);
    }
}
