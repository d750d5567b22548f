//! Subject identifier normalization
//!
//! The subject (for example a ticker symbol) becomes part of every artifact
//! file name, so it is reduced to a safe, canonical form before use.

use unicode_normalization::UnicodeNormalization;

use crate::error::SubjectError;

/// Maximum length of a normalized subject.
pub const MAX_SUBJECT_LEN: usize = 64;

/// Normalize a subject identifier for use in file names.
///
/// 1. NFKC normalization folds confusable Unicode forms (e.g. fullwidth letters).
/// 2. Surrounding whitespace is trimmed and ASCII letters are uppercased.
/// 3. Characters outside `[A-Z0-9._-]` become `_`.
/// 4. `..` sequences are replaced with `__` so the subject never forms a path component.
///
/// A warning is logged when step 3 or 4 altered the input.
///
/// ```rust
/// use phasegate_utils::subject::sanitize_subject;
///
/// assert_eq!(sanitize_subject("acme").unwrap(), "ACME");
/// assert_eq!(sanitize_subject("brk.b").unwrap(), "BRK.B");
/// assert_eq!(sanitize_subject("a/b").unwrap(), "A_B");
/// ```
pub fn sanitize_subject(raw: &str) -> Result<String, SubjectError> {
    let folded: String = raw.nfkc().collect::<String>().trim().to_ascii_uppercase();

    let mut sanitized: String = folded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    if sanitized.is_empty() {
        return Err(SubjectError::Empty);
    }

    let has_meaningful_content = sanitized
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !has_meaningful_content {
        return Err(SubjectError::OnlyInvalidCharacters);
    }

    let length = sanitized.chars().count();
    if length > MAX_SUBJECT_LEN {
        return Err(SubjectError::TooLong {
            length,
            max: MAX_SUBJECT_LEN,
        });
    }

    if sanitized != folded {
        tracing::warn!(
            original = %raw,
            sanitized = %sanitized,
            "Subject contained characters not allowed in file names and was sanitized"
        );
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uppercases_and_trims() {
        assert_eq!(sanitize_subject("  msft ").unwrap(), "MSFT");
    }

    #[test]
    fn test_fullwidth_letters_fold() {
        assert_eq!(sanitize_subject("ＡＢＣ").unwrap(), "ABC");
    }

    #[test]
    fn test_path_traversal_neutralized() {
        let result = sanitize_subject("../etc").unwrap();
        assert!(!result.contains(".."));
        assert!(!result.contains('/'));
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(matches!(sanitize_subject(""), Err(SubjectError::Empty)));
        assert!(matches!(sanitize_subject("   "), Err(SubjectError::Empty)));
        assert!(matches!(
            sanitize_subject("@@@"),
            Err(SubjectError::OnlyInvalidCharacters)
        ));
    }

    #[test]
    fn test_too_long() {
        let long = "A".repeat(MAX_SUBJECT_LEN + 1);
        assert!(matches!(
            sanitize_subject(&long),
            Err(SubjectError::TooLong { .. })
        ));
        assert!(sanitize_subject(&"A".repeat(MAX_SUBJECT_LEN)).is_ok());
    }

    proptest! {
        #[test]
        fn prop_sanitized_subject_is_file_name_safe(raw in "\\PC{0,80}") {
            if let Ok(subject) = sanitize_subject(&raw) {
                prop_assert!(subject.chars().all(|c| c.is_ascii_uppercase()
                    || c.is_ascii_digit()
                    || c == '.' || c == '_' || c == '-'));
                prop_assert!(!subject.contains(".."));
                prop_assert!(subject.len() <= MAX_SUBJECT_LEN);
            }
        }

        #[test]
        fn prop_sanitize_is_idempotent(raw in "[a-zA-Z0-9._ -]{1,40}") {
            if let Ok(once) = sanitize_subject(&raw) {
                prop_assert_eq!(sanitize_subject(&once).unwrap(), once);
            }
        }
    }
}
