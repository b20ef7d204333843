//! Object name rules for dimensions, attributes, and variables.
//!
//! A legal name starts with an ASCII letter, digit, underscore, or any
//! non-ASCII character, contains no ASCII control characters, DEL, or `/`,
//! and does not end in ASCII whitespace.

use crate::error::FormatError;

fn valid_first(c: char) -> bool {
    !c.is_ascii() || c.is_ascii_alphanumeric() || c == '_'
}

fn valid_rest(c: char) -> bool {
    !c.is_ascii() || ((' '..='~').contains(&c) && c != '/')
}

/// True if `name` may be used for a dimension, attribute, or variable.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if valid_first(c) => {}
        _ => return false,
    }
    if !chars.all(valid_rest) {
        return false;
    }
    !name.ends_with(|c: char| c.is_ascii_whitespace())
}

/// Repair `name` by dropping illegal characters.
///
/// Leading characters that cannot start a name are removed, illegal
/// characters elsewhere are removed, and trailing whitespace is trimmed.
/// Fails with [`FormatError::InvalidName`] if nothing legal remains.
pub fn make_valid_name(name: &str) -> Result<String, FormatError> {
    let start = name.trim_start_matches(|c: char| !valid_first(c));
    let mut out = String::with_capacity(start.len());
    let mut chars = start.chars();
    if let Some(first) = chars.next() {
        out.push(first);
        out.extend(chars.filter(|&c| valid_rest(c)));
    }
    let trimmed = out.trim_end_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return Err(FormatError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Return an error unless `name` is legal.
pub(crate) fn check_name(name: &str) -> Result<(), FormatError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(FormatError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        for name in ["x", "time", "_FillValue", "2m_temp", "lat lon", "température"] {
            assert!(is_valid_name(name), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in ["", "-x", " x", "a/b", "tab\there", "trailing ", "del\x7f"] {
            assert!(!is_valid_name(name), "{name:?}");
        }
    }

    #[test]
    fn utf8_may_lead() {
        assert!(is_valid_name("éclair"));
    }

    #[test]
    fn repair() {
        assert_eq!(make_valid_name("--temp/max  ").unwrap(), "tempmax");
        assert_eq!(make_valid_name("a\nb").unwrap(), "ab");
        assert_eq!(make_valid_name("ok").unwrap(), "ok");
    }

    #[test]
    fn repair_fails_when_empty() {
        assert_eq!(
            make_valid_name("///"),
            Err(FormatError::InvalidName("///".to_string()))
        );
    }

    #[test]
    fn repaired_names_are_valid() {
        for name in ["  x", "#1 a\tb ", "é/é", "_"] {
            let fixed = make_valid_name(name).unwrap();
            assert!(is_valid_name(&fixed), "{fixed:?}");
        }
    }
}
