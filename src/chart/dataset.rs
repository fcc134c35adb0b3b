use serde_json::{Map, Value};

use crate::core::format_tick_value;
use crate::sandbox::PropValue;

/// Row-oriented `data` prop of a chart or pie.
///
/// Rows that are not objects are kept as empty rows so indices still line up
/// with the categories the component author sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    rows: Vec<Map<String, Value>>,
}

impl DataSet {
    /// Reads an array-valued prop; anything else yields `None`.
    #[must_use]
    pub fn from_prop(prop: Option<&PropValue>) -> Option<Self> {
        let Value::Array(items) = prop?.as_json()? else {
            return None;
        };
        let rows = items
            .iter()
            .map(|item| match item {
                Value::Object(row) => row.clone(),
                _ => Map::new(),
            })
            .collect();
        Some(Self { rows })
    }

    #[must_use]
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn raw(&self, index: usize, key: &str) -> Value {
        self.rows
            .get(index)
            .and_then(|row| row.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Numeric field; numeric strings count, everything else is a gap.
    #[must_use]
    pub fn number(&self, index: usize, key: &str) -> Option<f64> {
        json_number(self.rows.get(index)?.get(key)?)
    }

    #[must_use]
    pub fn label(&self, index: usize, key: &str) -> String {
        json_label(&self.raw(index, key))
    }

    #[must_use]
    pub fn row_json(&self, index: usize) -> Value {
        self.rows
            .get(index)
            .map_or(Value::Null, |row| Value::Object(row.clone()))
    }
}

#[must_use]
pub fn json_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[must_use]
pub fn json_label(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.as_f64().map(format_tick_value).unwrap_or_default(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_numbers_and_labels_with_gaps() {
        let data = DataSet::from_prop(Some(&PropValue::Json(json!([
            { "mes": "Jan", "total": 10 },
            { "mes": "Fev", "total": "12.5" },
            { "mes": "Mar", "total": null },
            7
        ]))))
        .expect("array");

        assert_eq!(data.len(), 4);
        assert_eq!(data.number(0, "total"), Some(10.0));
        assert_eq!(data.number(1, "total"), Some(12.5));
        assert_eq!(data.number(2, "total"), None);
        assert_eq!(data.number(3, "total"), None);
        assert_eq!(data.label(1, "mes"), "Fev");
        assert_eq!(data.label(3, "mes"), "");
    }

    #[test]
    fn non_array_props_are_not_data() {
        assert!(DataSet::from_prop(Some(&PropValue::Json(json!({ "a": 1 })))).is_none());
        assert!(DataSet::from_prop(Some(&PropValue::Callback(0))).is_none());
        assert!(DataSet::from_prop(None).is_none());
    }
}
