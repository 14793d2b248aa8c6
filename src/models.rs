//! Case records and batch output entries

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Field labels used by the discharge-medication case files
pub mod fields {
    pub const VISIT_ID: &str = "就诊标识";
    pub const GENDER: &str = "性别";
    pub const BIRTH_DATE: &str = "出生日期";
    pub const BMI: &str = "BMI";
    pub const CHIEF_COMPLAINT: &str = "主诉";
    pub const PRESENT_ILLNESS: &str = "现病史";
    pub const PAST_HISTORY: &str = "既往史";
    pub const ADMISSION_STATUS: &str = "入院情况";
    pub const TREATMENT_COURSE: &str = "诊疗过程";
    pub const DISCHARGE_DIAGNOSIS: &str = "出院诊断";
}

/// One patient encounter as read from a JSONL line
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    raw: String,
    fields: Map<String, Value>,
}

impl CaseRecord {
    /// Parse a JSONL line
    ///
    /// A line that is not a JSON object still yields a record: the raw text
    /// is kept and the field map is empty.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let raw = line.trim().to_string();
        let fields = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self { raw, fields }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Field value as text; strings are returned as-is, scalars in display form
    #[must_use]
    pub fn text_field(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Case identifier from `id_field`, or `line-{line_no}`
    #[must_use]
    pub fn case_id(&self, id_field: &str, line_no: usize) -> String {
        match self.fields.get(id_field) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("line-{line_no}"),
        }
    }
}

/// One row of the batch output document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionEntry {
    #[serde(rename = "ID")]
    pub id: String,
    pub prediction: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_line() {
        let record = CaseRecord::parse(r#"{"就诊标识":"A001","性别":"男","BMI":23.5}"#);
        assert!(record.has_fields());
        assert_eq!(record.text_field(fields::GENDER).as_deref(), Some("男"));
        assert_eq!(record.text_field(fields::BMI).as_deref(), Some("23.5"));
        assert_eq!(record.case_id(fields::VISIT_ID, 3), "A001");
    }

    #[test]
    fn test_parse_non_object_keeps_raw_text() {
        let record = CaseRecord::parse("  患者有高血压  ");
        assert!(!record.has_fields());
        assert_eq!(record.raw(), "患者有高血压");
        assert_eq!(record.case_id(fields::VISIT_ID, 7), "line-7");
    }

    #[test]
    fn test_case_id_numeric_and_missing() {
        let record = CaseRecord::parse(r#"{"就诊标识":1024}"#);
        assert_eq!(record.case_id(fields::VISIT_ID, 1), "1024");

        let record = CaseRecord::parse(r#"{"性别":"女"}"#);
        assert_eq!(record.case_id(fields::VISIT_ID, 2), "line-2");
    }

    #[test]
    fn test_prediction_entry_serializes_id_key() {
        let entry = PredictionEntry {
            id: "A001".to_string(),
            prediction: vec!["阿司匹林".to_string()],
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"ID":"A001","prediction":["阿司匹林"]}"#);
    }
}
