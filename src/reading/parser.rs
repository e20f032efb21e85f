//! Line validation and numeric parsing.

use crate::error::{Result, StreamError};
use crate::reading::data::Reading;

/// Parse one framed line into a native-unit reading.
///
/// The whole trimmed line must be a base-10 number; `"23.5 ok"` is rejected
/// rather than truncated. Empty lines and non-finite values (`inf`, `NaN`)
/// are rejected too.
pub fn parse(line: &str) -> Result<Reading> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(StreamError::malformed_line(line));
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Reading::native(value)),
        _ => Err(StreamError::malformed_line(line)),
    }
}
