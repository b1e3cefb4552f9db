// Output Classification
// Decides whether a run succeeded, failed, or silently returned a status code

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header line the extraction tool prints before its payload
pub const DEFAULT_HEADER_LINE: &str = "Descriptor XML:";

/// A payload consisting of nothing but ASCII decimal digits
pub const DEFAULT_NUMERIC_PATTERN: &str = r"^[0-9]+$";

/// Outcome class of a single job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Zero exit with a structured payload
    Success,
    /// Zero exit, but the payload is a bare numeric code
    AnomalousNumeric,
    /// Non-zero exit, spawn failure or timeout
    HardFailure,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::AnomalousNumeric => "anomalous-numeric",
            Classification::HardFailure => "hard-failure",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Framing of the numeric-output anomaly.
///
/// Leading lines that are a JSON metadata object or one of `header_lines` are
/// discarded, blank lines are ignored, and the remaining payload is anomalous
/// when it is exactly one line matching `numeric_pattern`.
#[derive(Debug, Clone)]
pub struct DetectionRule {
    header_lines: Vec<String>,
    skip_json_metadata: bool,
    numeric_pattern: Regex,
}

impl DetectionRule {
    pub fn new(
        header_lines: Vec<String>,
        skip_json_metadata: bool,
        numeric_pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            header_lines,
            skip_json_metadata,
            numeric_pattern: Regex::new(numeric_pattern)?,
        })
    }

    /// Replace the header lines that are stripped before the payload
    pub fn with_header_lines(mut self, header_lines: Vec<String>) -> Self {
        self.header_lines = header_lines;
        self
    }

    /// Replace the pattern a lone payload line must match to be anomalous
    pub fn with_numeric_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.numeric_pattern = Regex::new(pattern)?;
        Ok(self)
    }

    /// Classify captured output. Pure: no I/O, same input gives same answer.
    pub fn classify(&self, exit_code: Option<i32>, stdout: &str) -> Classification {
        if exit_code != Some(0) {
            return Classification::HardFailure;
        }

        if self.is_numeric_payload(stdout) {
            Classification::AnomalousNumeric
        } else {
            Classification::Success
        }
    }

    /// Whether the payload left after header stripping is a lone numeric line
    pub fn is_numeric_payload(&self, text: &str) -> bool {
        match self.payload_lines(text).as_slice() {
            [only] => self.numeric_pattern.is_match(only),
            _ => false,
        }
    }

    /// Non-blank lines remaining once leading metadata/header lines are dropped
    pub fn payload_lines<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut in_header = true;
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                if in_header && self.is_header_line(line) {
                    return false;
                }
                in_header = false;
                true
            })
            .collect()
    }

    fn is_header_line(&self, line: &str) -> bool {
        if self.header_lines.iter().any(|h| h.trim() == line) {
            return true;
        }
        self.skip_json_metadata
            && line.starts_with('{')
            && serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line).is_ok()
    }
}

impl Default for DetectionRule {
    fn default() -> Self {
        Self {
            header_lines: vec![DEFAULT_HEADER_LINE.to_string()],
            skip_json_metadata: true,
            numeric_pattern: Regex::new(DEFAULT_NUMERIC_PATTERN)
                .expect("default numeric pattern is a valid regex"),
        }
    }
}
