//! Phone number normalization and validation.
//!
//! Strips the punctuation callers commonly include (`+`, `-`, spaces,
//! parentheses) and checks the remaining digit string falls within the
//! length bounds the API accepts.

use super::error::AppError;

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Strips `+`, `-`, ` `, `(`, `)` from `raw` and validates the remaining
/// digits are within `[7, 15]` characters long.
///
/// Returns the normalized digit string on success.
pub fn normalize(raw: &str) -> Result<String, AppError> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | ' ' | '(' | ')'))
        .collect();

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::bad_request(format!(
            "phone number contains invalid characters: {raw}"
        )));
    }

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return Err(AppError::bad_request(format!(
            "phone number must have between {MIN_DIGITS} and {MAX_DIGITS} digits, got {}",
            digits.len()
        )));
    }

    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_common_punctuation() {
        assert_eq!(normalize("+1 (555) 123-4567").unwrap(), "15551234567");
    }

    #[test]
    fn rejects_too_short() {
        assert!(normalize("12345").is_err());
    }

    #[test]
    fn rejects_too_long() {
        assert!(normalize("1234567890123456").is_err());
    }

    #[test]
    fn rejects_non_digit_characters() {
        assert!(normalize("555-CALL-NOW").is_err());
    }

    #[test]
    fn accepts_boundary_lengths() {
        assert!(normalize("1234567").is_ok());
        assert!(normalize("123456789012345").is_ok());
    }
}
