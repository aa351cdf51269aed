//! The verification report returned to callers.
//!
//! The backend is trusted for field-level correctness: the only guarantee a
//! [`ValidatedReport`] carries is that it is a syntactically valid JSON
//! object. Accessors here read well-known fields without enforcing them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A JSON object produced by the generation backend and accepted by the
/// extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedReport(Map<String, Value>);

impl ValidatedReport {
    /// Wrap a JSON value, accepting only objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// `final_summary.overall_risk_rating`, if the backend supplied a
    /// recognisable one.
    pub fn risk_rating(&self) -> Option<RiskRating> {
        self.0
            .get("final_summary")?
            .get("overall_risk_rating")?
            .as_str()
            .and_then(RiskRating::parse)
    }

    /// Top-level document sections that carry a `validation_status`.
    pub fn document_sections(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0
            .iter()
            .filter(|(_, v)| v.get("validation_status").is_some())
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Overall transaction risk as rated by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskRating {
    /// Significant discrepancies suggesting fraud or contract violation.
    Red,
    /// Minor discrepancies needing clarification.
    Amber,
    /// No or negligible discrepancies.
    Green,
}

impl RiskRating {
    /// Lenient parse: case-insensitive, tolerates trailing qualifiers such as
    /// `"Red (High Risk)"` or `"amber - medium"`.
    pub fn parse(s: &str) -> Option<Self> {
        let word = s
            .trim()
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|w| !w.is_empty())?;
        match word.to_ascii_lowercase().as_str() {
            "red" => Some(RiskRating::Red),
            "amber" => Some(RiskRating::Amber),
            "green" => Some(RiskRating::Green),
            _ => None,
        }
    }
}

impl fmt::Display for RiskRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskRating::Red => "Red",
            RiskRating::Amber => "Amber",
            RiskRating::Green => "Green",
        };
        f.write_str(s)
    }
}
