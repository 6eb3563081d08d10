//! Edit outcome and artifact naming

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one edit invocation, handed to the caller as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub success: bool,
    pub spans_changed: usize,
    /// Single summarized change, even when several spans were changed
    pub change: String,
    /// Address of the written artifact
    pub location: String,
}

impl EditOutcome {
    pub fn new(original: &str, replacement: &str, spans_changed: usize, location: String) -> Self {
        Self {
            success: spans_changed > 0,
            spans_changed,
            change: describe_change(original, replacement),
            location,
        }
    }
}

pub fn describe_change(original: &str, replacement: &str) -> String {
    format!("Changed '{}' to '{}'", original, replacement)
}

/// Name for an edited artifact: `edited_<timestamp>_<original filename>`.
///
/// The timestamp is all digits, second resolution followed by microseconds,
/// so two edits of one document within a second still get distinct names.
pub fn artifact_name(original_filename: &str, at: DateTime<Utc>) -> String {
    let base = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_filename);
    format!(
        "edited_{}{:06}_{}",
        at.format("%Y%m%d%H%M%S"),
        at.timestamp_subsec_micros(),
        base
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regex::Regex;

    #[test]
    fn test_artifact_name_pattern() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
            + chrono::Duration::microseconds(42);
        let name = artifact_name("invoice.pdf", at);
        assert_eq!(name, "edited_20240305140709000042_invoice.pdf");

        let pattern = Regex::new(r"^edited_\d+_invoice\.pdf$").unwrap();
        assert!(pattern.is_match(&artifact_name("invoice.pdf", Utc::now())));
    }

    #[test]
    fn test_artifact_name_drops_directories() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            artifact_name("uploads/abc_report.pdf", at),
            "edited_20240101000000000000_abc_report.pdf"
        );
    }

    #[test]
    fn test_outcome_describes_single_change() {
        let outcome = EditOutcome::new("NO. 1", "TEST", 3, "mem://edited.pdf".to_string());
        assert!(outcome.success);
        assert_eq!(outcome.spans_changed, 3);
        assert_eq!(outcome.change, "Changed 'NO. 1' to 'TEST'");
    }
}
