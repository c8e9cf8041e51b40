//! Validation of untrusted identifiers before they reach SQL, HTTP, or the filesystem.
//!
//! Every function takes one untrusted value and either returns it unchanged or
//! fails with a specific [`ValidationError`] variant. None of them have side
//! effects beyond reading the filesystem to resolve paths.
//!
//! # Example
//!
//! ```
//! use libsafe_export::validation::{sanitize_filename, validate_handle};
//!
//! assert_eq!(validate_handle("10754/124545").unwrap(), "10754/124545");
//! assert!(validate_handle("10754/124545/extra").is_err());
//! assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
//! ```

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// Calendar format accepted for date bounds and embargo comparisons.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[allow(clippy::expect_used)]
static HANDLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A[0-9]+/[0-9]+\z").expect("handle regex is valid") // Static pattern, safe to panic
});

/// Rejection reasons for untrusted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value is not a `prefix/suffix` handle made of decimal digits.
    #[error("invalid handle {value:?}: expected prefix/suffix, e.g. 10754/123456")]
    InvalidHandle {
        /// The rejected value.
        value: String,
    },

    /// Value does not parse under the expected calendar format.
    #[error("invalid date {value:?}: expected format {format}")]
    InvalidDate {
        /// The rejected value.
        value: String,
        /// The format it was checked against.
        format: String,
    },

    /// Start bound is later than the end bound.
    #[error("start date {start} is after end date {end}")]
    InvalidDateRange {
        /// Requested start bound.
        start: String,
        /// Requested end bound.
        end: String,
    },

    /// Value is not a syntactically valid UUID.
    #[error("invalid UUID {value:?}")]
    InvalidUuid {
        /// The rejected value.
        value: String,
    },

    /// Resolved path is not contained in the allowed root.
    #[error("path traversal detected: {path} is outside {root}")]
    PathTraversal {
        /// The path that was checked.
        path: PathBuf,
        /// The directory it had to stay within.
        root: PathBuf,
    },

    /// Content is larger than the configured ceiling.
    #[error("file size {size} bytes exceeds maximum allowed size {max} bytes")]
    FileTooLarge {
        /// Observed size.
        size: u64,
        /// Configured ceiling.
        max: u64,
    },

    /// Content type is not the tracked MIME type.
    #[error("invalid MIME type {value:?}: expected {expected}")]
    InvalidMimeType {
        /// Observed content type.
        value: String,
        /// Expected MIME type.
        expected: String,
    },

    /// Short-lived token contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid short-lived token format")]
    InvalidToken,
}

/// Validates a repository handle of the form `digits/digits`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHandle`] unless the whole value matches.
pub fn validate_handle(value: &str) -> Result<&str, ValidationError> {
    if HANDLE_PATTERN.is_match(value) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidHandle {
            value: value.to_string(),
        })
    }
}

/// Returns the second segment of an already-validated handle.
#[must_use]
pub fn handle_suffix(handle: &str) -> &str {
    handle.rsplit_once('/').map_or(handle, |(_, suffix)| suffix)
}

/// Validates that `value` parses exactly under `format`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDate`] if parsing fails or leaves input unconsumed.
pub fn validate_date<'a>(value: &'a str, format: &str) -> Result<&'a str, ValidationError> {
    parse_date(value, format).map(|_| value)
}

/// Parses a date with the same rules as [`validate_date`].
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDate`] if parsing fails.
pub fn parse_date(value: &str, format: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, format).map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
        format: format.to_string(),
    })
}

/// Validates that `value` is a UUID of any version or variant.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidUuid`] on malformed input.
pub fn validate_uuid(value: &str) -> Result<&str, ValidationError> {
    uuid::Uuid::parse_str(value)
        .map(|_| value)
        .map_err(|_| ValidationError::InvalidUuid {
            value: value.to_string(),
        })
}

/// Removes everything that could make a filename unsafe.
///
/// Characters outside `[A-Za-z0-9._-]` are dropped, then leading dots, then
/// every run of two or more dots collapses to one. The result is idempotent.
#[must_use]
pub fn sanitize_filename(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let mut out = String::with_capacity(kept.len());
    let mut prev_dot = false;
    for ch in kept.trim_start_matches('.').chars() {
        if ch == '.' {
            if !prev_dot {
                out.push(ch);
            }
            prev_dot = true;
        } else {
            out.push(ch);
            prev_dot = false;
        }
    }
    out
}

/// Checks that `path` resolves to a location inside `root`.
///
/// Both are resolved to absolute form (existing prefixes canonicalized, the
/// remaining components normalized lexically) and compared as strings. This is
/// a textual prefix check: a symlink already placed inside `root` that points
/// elsewhere is not detected.
///
/// # Errors
///
/// Returns [`ValidationError::PathTraversal`] when the resolved path is not
/// prefixed by the resolved root, or when either cannot be resolved.
pub fn validate_safe_path(path: &Path, root: &Path) -> Result<PathBuf, ValidationError> {
    let traversal = || ValidationError::PathTraversal {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };

    let resolved_path = resolve(path).ok_or_else(traversal)?;
    let resolved_root = resolve(root).ok_or_else(traversal)?;

    if resolved_path
        .to_string_lossy()
        .starts_with(resolved_root.to_string_lossy().as_ref())
    {
        Ok(resolved_path)
    } else {
        Err(traversal())
    }
}

/// Resolves a possibly non-existent path: canonicalize the longest existing
/// ancestor, then apply the remaining components lexically.
fn resolve(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail: Vec<Component<'_>> = Vec::new();
    let mut base = loop {
        match existing.canonicalize() {
            Ok(canonical) => break canonical,
            Err(_) => {
                let name = existing.components().next_back()?;
                tail.push(name);
                existing = existing.parent()?;
            }
        }
    };

    for component in tail.into_iter().rev() {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::Normal(part) => base.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(base)
}

/// Validates a content length against the configured ceiling.
///
/// # Errors
///
/// Returns [`ValidationError::FileTooLarge`] when `size > max`.
pub fn validate_file_size(size: u64, max: u64) -> Result<u64, ValidationError> {
    if size > max {
        Err(ValidationError::FileTooLarge { size, max })
    } else {
        Ok(size)
    }
}

/// Validates a `Content-Type` value against the tracked MIME type.
///
/// Parameters such as `; charset=...` are ignored and the comparison is
/// case-insensitive.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidMimeType`] on mismatch.
pub fn validate_mime_type<'a>(value: &'a str, expected: &str) -> Result<&'a str, ValidationError> {
    let essence = value.split(';').next().unwrap_or("").trim();
    if essence.eq_ignore_ascii_case(expected) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidMimeType {
            value: value.to_string(),
            expected: expected.to_string(),
        })
    }
}

/// Validates a short-lived download token.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidToken`] if the token is empty or contains
/// characters outside `[A-Za-z0-9_-]`.
pub fn validate_token(value: &str) -> Result<&str, ValidationError> {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        Ok(value)
    } else {
        Err(ValidationError::InvalidToken)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const ALPHABET: &[char] = &[
        'a', 'Z', '0', '9', '.', '.', '.', '/', '\\', '-', '_', ' ', '\n', '\t', '$', '*', 'é',
        '٣', '\0', ':', '~',
    ];

    fn random_strings(count: usize) -> Vec<String> {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        (0..count)
            .map(|_| {
                let len = rng.gen_range(0..24);
                (0..len)
                    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
                    .collect()
            })
            .collect()
    }

    // ==================== Handle Tests ====================

    #[test]
    fn test_validate_handle_accepts_digit_pairs() {
        for handle in ["10754/124545", "1/2", "0/0", "123456789/987654321"] {
            assert_eq!(validate_handle(handle).unwrap(), handle);
        }
    }

    #[test]
    fn test_validate_handle_rejects_malformed_values() {
        for bad in [
            "",
            "10754",
            "10754/",
            "/124545",
            "10754/124545/1",
            "10754/12a45",
            "10754/124545\n",
            " 10754/124545",
            "10754\\124545",
            "10754/124545; DROP TABLE metadata",
            "١٢/٣٤",
        ] {
            assert!(
                matches!(
                    validate_handle(bad),
                    Err(ValidationError::InvalidHandle { .. })
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_validate_handle_matches_pattern_for_random_input() {
        for value in random_strings(2000) {
            let expected = {
                let mut parts = value.split('/');
                let (a, b, rest) = (parts.next(), parts.next(), parts.next());
                matches!((a, b, rest), (Some(a), Some(b), None)
                    if !a.is_empty() && !b.is_empty()
                    && a.chars().all(|c| c.is_ascii_digit())
                    && b.chars().all(|c| c.is_ascii_digit()))
            };
            assert_eq!(validate_handle(&value).is_ok(), expected, "{value:?}");
        }
    }

    #[test]
    fn test_handle_suffix_returns_second_segment() {
        assert_eq!(handle_suffix("10754/124545"), "124545");
        assert_eq!(handle_suffix("http://hdl.handle.net/10754/124545"), "124545");
    }

    // ==================== Date Tests ====================

    #[test]
    fn test_validate_date_accepts_calendar_dates() {
        assert_eq!(validate_date("2024-02-29", DATE_FORMAT).unwrap(), "2024-02-29");
        assert!(validate_date("2023-12-31", DATE_FORMAT).is_ok());
    }

    #[test]
    fn test_validate_date_rejects_invalid_values() {
        for bad in ["2023-02-29", "2024-13-01", "2024/01/01", "yesterday", "", "2024-01-01x"] {
            assert!(
                matches!(
                    validate_date(bad, DATE_FORMAT),
                    Err(ValidationError::InvalidDate { .. })
                ),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_validate_date_honors_custom_format() {
        assert!(validate_date("01/02/2024", "%d/%m/%Y").is_ok());
        assert!(validate_date("2024-02-01", "%d/%m/%Y").is_err());
    }

    // ==================== UUID Tests ====================

    #[test]
    fn test_validate_uuid_accepts_any_version() {
        for id in [
            "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "00000000-0000-0000-0000-000000000000",
            "F9168C5E-CEB2-4FAA-B6BF-329BF39FA1E4",
        ] {
            assert_eq!(validate_uuid(id).unwrap(), id);
        }
    }

    #[test]
    fn test_validate_uuid_rejects_malformed_values() {
        for bad in ["", "not-a-uuid", "3f2504e0-4f89-11d3-9a0c", "../../etc/passwd"] {
            assert!(matches!(
                validate_uuid(bad),
                Err(ValidationError::InvalidUuid { .. })
            ));
        }
    }

    // ==================== Filename Tests ====================

    #[test]
    fn test_sanitize_filename_examples() {
        assert_eq!(sanitize_filename("124545.pdf"), "124545.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("...hidden"), "hidden");
        assert_eq!(sanitize_filename("a....b..c"), "a.b.c");
        assert_eq!(sanitize_filename("my file (1).pdf"), "myfile1.pdf");
        assert_eq!(sanitize_filename("über_report-v2.pdf"), "ber_report-v2.pdf");
        assert_eq!(sanitize_filename(""), "");
        assert_eq!(sanitize_filename("./."), "");
    }

    #[test]
    fn test_sanitize_filename_is_idempotent() {
        for value in random_strings(5000) {
            let once = sanitize_filename(&value);
            assert_eq!(sanitize_filename(&once), once, "input {value:?}");
        }
    }

    #[test]
    fn test_sanitize_filename_output_invariants() {
        for value in random_strings(5000) {
            let out = sanitize_filename(&value);
            assert!(
                out.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')),
                "{out:?}"
            );
            assert!(!out.starts_with('.'), "{out:?}");
            assert!(!out.contains(".."), "{out:?}");
        }
    }

    // ==================== Path Tests ====================

    #[test]
    fn test_validate_safe_path_accepts_child_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = validate_safe_path(&dir.path().join("124545.pdf"), dir.path()).unwrap();
        assert!(resolved.ends_with("124545.pdf"));
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_validate_safe_path_rejects_parent_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("export");
        std::fs::create_dir(&root).unwrap();

        let result = validate_safe_path(&root.join("../outside.pdf"), &root);
        assert!(matches!(
            result,
            Err(ValidationError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_validate_safe_path_rejects_absolute_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let result = validate_safe_path(&other.path().join("x.pdf"), dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_safe_path_is_textual_prefix_check() {
        // A sibling whose name extends the root's name passes the prefix check.
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("export");
        let sibling = dir.path().join("export2");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&sibling).unwrap();

        assert!(validate_safe_path(&sibling.join("a.pdf"), &root).is_ok());
    }

    // ==================== Size / MIME / Token Tests ====================

    #[test]
    fn test_validate_file_size_boundary() {
        assert_eq!(validate_file_size(100, 100).unwrap(), 100);
        assert!(matches!(
            validate_file_size(101, 100),
            Err(ValidationError::FileTooLarge { size: 101, max: 100 })
        ));
    }

    #[test]
    fn test_validate_mime_type_ignores_parameters_and_case() {
        assert!(validate_mime_type("application/pdf", "application/pdf").is_ok());
        assert!(validate_mime_type("Application/PDF; qs=1", "application/pdf").is_ok());
        assert!(validate_mime_type("text/html; charset=utf-8", "application/pdf").is_err());
    }

    #[test]
    fn test_validate_token_character_class() {
        assert!(validate_token("abc-DEF_123").is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token("abc&x=1").is_err());
        assert!(validate_token("abc def").is_err());
    }

    #[test]
    fn test_validation_error_display_contains_value() {
        let err = validate_handle("bad").unwrap_err();
        assert!(err.to_string().contains("\"bad\""));
    }
}
