use derive_more::From;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::number_to_string;

/// Type of a feature's values. All values of a feature (default and rule values) are coerced to
/// this type before they are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ValueType {
    Boolean,
    String,
    Number,
    Json,
}

/// Value served by a feature.
///
/// Serializes as plain JSON (`Null` as `null`, `Json` as the embedded document).
#[derive(Debug, Clone, PartialEq, Serialize, From)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Value of unknown features.
    #[from(ignore)]
    Null,
    #[allow(missing_docs)]
    Boolean(bool),
    #[allow(missing_docs)]
    Number(f64),
    #[allow(missing_docs)]
    String(String),
    #[allow(missing_docs)]
    Json(Value),
}

impl ValueType {
    /// Convert a stored value to a typed [`FeatureValue`].
    ///
    /// Stored values are either native JSON or the JSON-string encoding written by the publishing
    /// side (`"true"`, `"42"`, `"{\"a\": 1}"`). Returns `None` if the value cannot represent this
    /// type.
    pub fn coerce(self, value: &Value) -> Option<FeatureValue> {
        match (self, value) {
            (ValueType::Boolean, Value::Bool(b)) => Some(FeatureValue::Boolean(*b)),
            (ValueType::Boolean, Value::String(s)) => match s.trim() {
                "true" => Some(FeatureValue::Boolean(true)),
                "false" => Some(FeatureValue::Boolean(false)),
                _ => None,
            },

            (ValueType::Number, Value::Number(n)) => n.as_f64().map(FeatureValue::Number),
            (ValueType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(FeatureValue::Number),

            (ValueType::String, Value::String(s)) => Some(FeatureValue::String(s.clone())),
            (ValueType::String, Value::Number(n)) => Some(FeatureValue::String(number_to_string(n))),
            (ValueType::String, Value::Bool(b)) => Some(FeatureValue::String(b.to_string())),

            (ValueType::Json, Value::String(s)) => serde_json::from_str(s).ok().map(FeatureValue::Json),
            (ValueType::Json, other) => Some(FeatureValue::Json(other.clone())),

            _ => None,
        }
    }
}

impl FeatureValue {
    /// Return `true` if the value is "on": anything except `null`, `false`, `0`, `""` and a JSON
    /// `null`.
    pub fn is_truthy(&self) -> bool {
        match self {
            FeatureValue::Null => false,
            FeatureValue::Boolean(b) => *b,
            FeatureValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FeatureValue::String(s) => !s.is_empty(),
            FeatureValue::Json(v) => !v.is_null(),
        }
    }

    #[allow(missing_docs)]
    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }

    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Return the number as an integer if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        let n = self.as_f64()?;
        (n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64).then_some(n as i64)
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FeatureValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Plain JSON representation, used when matching prerequisite conditions.
    pub fn to_json(&self) -> Value {
        match self {
            FeatureValue::Null => Value::Null,
            FeatureValue::Boolean(b) => Value::Bool(*b),
            FeatureValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FeatureValue::String(s) => Value::String(s.clone()),
            FeatureValue::Json(v) => v.clone(),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FeatureValue, ValueType};

    #[test]
    fn coerce_booleans() {
        assert_eq!(ValueType::Boolean.coerce(&json!(true)), Some(FeatureValue::from(true)));
        assert_eq!(ValueType::Boolean.coerce(&json!("false")), Some(FeatureValue::from(false)));
        assert_eq!(ValueType::Boolean.coerce(&json!("yes")), None);
        assert_eq!(ValueType::Boolean.coerce(&json!(1)), None);
    }

    #[test]
    fn coerce_numbers() {
        assert_eq!(ValueType::Number.coerce(&json!(42)), Some(FeatureValue::from(42.0)));
        assert_eq!(ValueType::Number.coerce(&json!(" 1.5 ")), Some(FeatureValue::from(1.5)));
        assert_eq!(ValueType::Number.coerce(&json!("NaN")), None);
        assert_eq!(ValueType::Number.coerce(&json!("abc")), None);
        assert_eq!(ValueType::Number.coerce(&json!(null)), None);
    }

    #[test]
    fn coerce_strings() {
        assert_eq!(ValueType::String.coerce(&json!("red")), Some(FeatureValue::from("red")));
        assert_eq!(ValueType::String.coerce(&json!(42)), Some(FeatureValue::from("42")));
        assert_eq!(ValueType::String.coerce(&json!(true)), Some(FeatureValue::from("true")));
        assert_eq!(ValueType::String.coerce(&json!({"a": 1})), None);
    }

    #[test]
    fn coerce_json() {
        assert_eq!(
            ValueType::Json.coerce(&json!("{\"a\": 1}")),
            Some(FeatureValue::Json(json!({"a": 1})))
        );
        assert_eq!(
            ValueType::Json.coerce(&json!([1, 2])),
            Some(FeatureValue::Json(json!([1, 2])))
        );
        assert_eq!(ValueType::Json.coerce(&json!("{not json")), None);
    }

    #[test]
    fn truthiness() {
        assert!(!FeatureValue::Null.is_truthy());
        assert!(!FeatureValue::from(false).is_truthy());
        assert!(!FeatureValue::from(0.0).is_truthy());
        assert!(!FeatureValue::from("").is_truthy());
        assert!(FeatureValue::from("off").is_truthy());
        assert!(FeatureValue::Json(json!({})).is_truthy());
    }

    #[test]
    fn serialize_untagged() {
        assert_eq!(serde_json::to_value(FeatureValue::Null).unwrap(), json!(null));
        assert_eq!(serde_json::to_value(FeatureValue::from("x")).unwrap(), json!("x"));
        assert_eq!(
            serde_json::to_value(FeatureValue::Json(json!({"a": [1]}))).unwrap(),
            json!({"a": [1]})
        );
    }

    #[test]
    fn integer_view() {
        assert_eq!(FeatureValue::from(3.0).as_i64(), Some(3));
        assert_eq!(FeatureValue::from(3.5).as_i64(), None);
    }
}
