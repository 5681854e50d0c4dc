//! Attribute extraction from semi-structured payloads.
//!
//! Records arrive as a mix of clean structured payloads and legacy free-text
//! blobs with embedded `KEY: value` tokens, so every lookup is two-tier:
//! candidate keys in priority order first, then a regex over the text field.
//! Nothing here fails: every miss is `None` or an empty string.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::types::Payload;

static SALARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bBASICSALARY\s*:\s*([0-9][0-9,]*(?:\.[0-9]+)?)\b")
        .expect("salary regex is valid")
});
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bEMPLOYEENAME\s*:\s*([^|]+)").expect("name regex is valid")
});

/// Characters dropped before numeric parsing.
const THOUSANDS_SEPARATORS: [char; 2] = [',', '_'];

/// Where one attribute may live: structured keys, in priority order, plus an
/// optional fallback pattern whose first capture group holds the value.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub keys: Vec<String>,
    pub pattern: Option<Regex>,
}

impl FieldSpec {
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            pattern: None,
        }
    }

    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Fallback pattern for a numeric `TAG: 1,234.5` token, case-insensitive.
    pub fn with_numeric_tag(self, tag: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"(?i)\b{}\s*:\s*([0-9][0-9,]*(?:\.[0-9]+)?)\b",
            regex::escape(tag)
        ))?;
        Ok(self.with_pattern(pattern))
    }

    /// Fallback pattern for a `TAG: text` token running up to the next `|`.
    pub fn with_text_tag(self, tag: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"(?i)\b{}\s*:\s*([^|]+)", regex::escape(tag)))?;
        Ok(self.with_pattern(pattern))
    }
}

/// Swappable extraction policy used by the aggregation engine.
pub trait RecordExtractor: Send + Sync {
    /// Identity used to collapse repeated ingestions of one entity.
    fn dedup_key(&self, payload: &Payload) -> Option<String>;

    /// The value being aggregated.
    fn numeric_value(&self, payload: &Payload) -> Option<f64>;

    /// Human-readable label for min/max exemplars. Empty when unknown.
    fn display_name(&self, payload: &Payload) -> String;
}

/// Field layout of one corpus.
#[derive(Debug, Clone)]
pub struct ExtractionProfile {
    /// Free-text field scanned by fallback patterns.
    pub text_field: String,
    pub dedup: FieldSpec,
    pub value: FieldSpec,
    pub name: FieldSpec,
}

impl ExtractionProfile {
    /// Employee records keyed by `EMPLOYEEID`, aggregating `BASICSALARY`.
    pub fn employee_salary() -> Self {
        Self {
            text_field: "prompt".to_string(),
            dedup: FieldSpec::keys(["EMPLOYEEID", "employeeid", "employee_id", "EmployeeId"]),
            value: FieldSpec::keys(["BASICSALARY", "basicSalary", "SALARY", "salary"])
                .with_pattern(SALARY_RE.clone()),
            name: FieldSpec::keys(["EMPLOYEENAME", "employee_name", "name", "EmployeeName"])
                .with_pattern(NAME_RE.clone()),
        }
    }
}

impl Default for ExtractionProfile {
    fn default() -> Self {
        Self::employee_salary()
    }
}

impl RecordExtractor for ExtractionProfile {
    fn dedup_key(&self, payload: &Payload) -> Option<String> {
        extract_dedup_key(payload, &self.dedup.keys)
    }

    fn numeric_value(&self, payload: &Payload) -> Option<f64> {
        extract_numeric(
            payload,
            &self.value.keys,
            &self.text_field,
            self.value.pattern.as_ref(),
        )
    }

    fn display_name(&self, payload: &Payload) -> String {
        extract_text(
            payload,
            &self.name.keys,
            &self.text_field,
            self.name.pattern.as_ref(),
        )
    }
}

/// First candidate key holding a usable number, else the fallback pattern.
pub fn extract_numeric(
    payload: &Payload,
    keys: &[String],
    text_field: &str,
    pattern: Option<&Regex>,
) -> Option<f64> {
    for key in keys {
        let Some(value) = payload.get(key) else {
            continue;
        };
        if let Some(n) = numeric_from_value(value) {
            return Some(n);
        }
    }

    let captured = capture(payload, text_field, pattern)?;
    parse_number(&captured)
}

/// First candidate key holding non-blank text, else the fallback pattern, else `""`.
pub fn extract_text(
    payload: &Payload,
    keys: &[String],
    text_field: &str,
    pattern: Option<&Regex>,
) -> String {
    if let Some(text) = keys.iter().find_map(|k| payload.get(k).and_then(scalar_text)) {
        return text;
    }
    capture(payload, text_field, pattern)
        .map(|c| c.trim().to_string())
        .unwrap_or_default()
}

/// First candidate key holding a non-blank scalar. No text fallback.
pub fn extract_dedup_key(payload: &Payload, keys: &[String]) -> Option<String> {
    keys.iter().find_map(|k| payload.get(k).and_then(scalar_text))
}

/// The free-text field of a payload, or `""`.
pub fn text_field<'a>(payload: &'a Payload, field: &str) -> &'a str {
    payload.get(field).and_then(Value::as_str).unwrap_or("")
}

fn capture(payload: &Payload, field: &str, pattern: Option<&Regex>) -> Option<String> {
    let pattern = pattern?;
    let text = text_field(payload, field);
    if text.is_empty() {
        return None;
    }
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn numeric_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !THOUSANDS_SEPARATORS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::payload;
    use serde_json::json;

    fn profile() -> ExtractionProfile {
        ExtractionProfile::employee_salary()
    }

    #[test]
    fn test_structured_number_and_string() {
        let p = profile();
        assert_eq!(p.numeric_value(&payload(json!({"BASICSALARY": 1500}))), Some(1500.0));
        assert_eq!(p.numeric_value(&payload(json!({"salary": " 12,500.50 "}))), Some(12500.5));
        assert_eq!(p.numeric_value(&payload(json!({"SALARY": "1_000"}))), Some(1000.0));
    }

    #[test]
    fn test_structured_field_beats_conflicting_text() {
        let p = profile();
        let record = payload(json!({
            "BASICSALARY": "2000",
            "prompt": "EMPLOYEEID: 9 | BASICSALARY: 9999"
        }));
        assert_eq!(p.numeric_value(&record), Some(2000.0));
    }

    #[test]
    fn test_unparseable_key_falls_through_to_next_key() {
        let p = profile();
        let record = payload(json!({"BASICSALARY": "n/a", "basicSalary": "", "SALARY": "3100"}));
        assert_eq!(p.numeric_value(&record), Some(3100.0));
    }

    #[test]
    fn test_text_fallback_is_case_insensitive() {
        let p = profile();
        let record = payload(json!({
            "prompt": "EmployeeId: 4 | basicsalary : 4,250.75 | EmployeeName: Ada Lovelace | DEPT: R&D"
        }));
        assert_eq!(p.numeric_value(&record), Some(4250.75));
        assert_eq!(p.display_name(&record), "Ada Lovelace");
    }

    #[test]
    fn test_misses_are_quiet() {
        let p = profile();
        let record = payload(json!({"BASICSALARY": null, "prompt": 42, "name": "   "}));
        assert_eq!(p.numeric_value(&record), None);
        assert_eq!(p.display_name(&record), "");
        assert_eq!(p.dedup_key(&record), None);

        let nested = payload(json!({"BASICSALARY": {"amount": 5}, "SALARY": [1, 2]}));
        assert_eq!(p.numeric_value(&nested), None);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let p = profile();
        assert_eq!(p.numeric_value(&payload(json!({"BASICSALARY": "NaN"}))), None);
        assert_eq!(p.numeric_value(&payload(json!({"BASICSALARY": "inf"}))), None);
    }

    #[test]
    fn test_dedup_key_priority_and_numbers() {
        let p = profile();
        let record = payload(json!({"employee_id": "B-7", "EMPLOYEEID": " 17 "}));
        assert_eq!(p.dedup_key(&record), Some("17".to_string()));

        let numeric = payload(json!({"employeeid": 42}));
        assert_eq!(p.dedup_key(&numeric), Some("42".to_string()));
    }

    #[test]
    fn test_dedup_key_has_no_text_fallback() {
        let p = profile();
        let record = payload(json!({"prompt": "EMPLOYEEID: 5 | BASICSALARY: 10"}));
        assert_eq!(p.dedup_key(&record), None);
    }

    #[test]
    fn test_custom_profile_tags() {
        let profile = ExtractionProfile {
            text_field: "body".to_string(),
            dedup: FieldSpec::keys(["sku"]),
            value: FieldSpec::keys(["price"]).with_numeric_tag("PRICE").unwrap(),
            name: FieldSpec::keys(["title"]).with_text_tag("TITLE").unwrap(),
        };
        let record = payload(json!({"body": "TITLE: Lamp | price: 19.99"}));
        assert_eq!(profile.numeric_value(&record), Some(19.99));
        assert_eq!(profile.display_name(&record), "Lamp");
    }
}
