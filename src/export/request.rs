//! Validated parameters of one export run.

use chrono::NaiveDate;

use crate::validation::{DATE_FORMAT, ValidationError, parse_date};

/// Date bounds and download limit for a run.
///
/// Construction validates the bounds, so an engine never starts a run with an
/// inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportRequest {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    limit: usize,
}

impl ExportRequest {
    /// Parses `YYYY-MM-DD` bounds and checks `start <= end`.
    ///
    /// `limit` of 0 means unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDate`] for a malformed bound or
    /// [`ValidationError::InvalidDateRange`] when start is after end.
    pub fn new(
        start: Option<&str>,
        end: Option<&str>,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        let start = start.map(|s| parse_date(s, DATE_FORMAT)).transpose()?;
        let end = end.map(|e| parse_date(e, DATE_FORMAT)).transpose()?;
        Self::from_dates(start, end, limit)
    }

    /// Same as [`new`](Self::new) for already-parsed dates.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidDateRange`] when start is after end.
    pub fn from_dates(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        if let (Some(start), Some(end)) = (start, end)
            && start > end
        {
            return Err(ValidationError::InvalidDateRange {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end, limit })
    }

    /// Inclusive lower bound on first file attachment.
    #[must_use]
    pub fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    /// Inclusive upper bound on first file attachment.
    #[must_use]
    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Maximum successful rows for this run; 0 is unbounded.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether `successes` has reached a non-zero limit.
    #[must_use]
    pub fn limit_reached(&self, successes: usize) -> bool {
        self.limit > 0 && successes >= self.limit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bounds_is_valid() {
        let request = ExportRequest::new(None, None, 0).unwrap();
        assert_eq!(request.start(), None);
        assert_eq!(request.end(), None);
        assert!(!request.limit_reached(1_000_000));
    }

    #[test]
    fn test_equal_bounds_are_valid() {
        let request = ExportRequest::new(Some("2024-02-29"), Some("2024-02-29"), 0).unwrap();
        assert_eq!(request.start(), request.end());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = ExportRequest::new(Some("2024-03-02"), Some("2024-03-01"), 0).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidDateRange {
                start: "2024-03-02".to_string(),
                end: "2024-03-01".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_bound_rejected() {
        let err = ExportRequest::new(Some("2024/03/01"), None, 0).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { .. }));
        let err = ExportRequest::new(None, Some("2023-02-29"), 0).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { .. }));
    }

    #[test]
    fn test_limit_reached() {
        let request = ExportRequest::new(None, None, 2).unwrap();
        assert!(!request.limit_reached(1));
        assert!(request.limit_reached(2));
        assert!(request.limit_reached(3));
    }
}
