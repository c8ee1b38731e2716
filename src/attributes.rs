use std::collections::HashMap;

use serde_json::{Number, Value};

/// Type alias for a HashMap representing the attributes of the unit being evaluated.
///
/// Keys are attribute names. Values may be scalars, arrays or nested objects; nested values are
/// addressed with dotted paths (`company.plan`) in conditions.
///
/// # Examples
/// ```
/// # use feature_rules::Attributes;
/// let attributes = [
///     ("id".to_owned(), "user-42".into()),
///     ("age".to_owned(), 30.into()),
///     ("company".to_owned(), serde_json::json!({"plan": "enterprise"})),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a single attribute.
pub type AttributeValue = Value;

/// Look up an attribute by a dotted path.
///
/// An attribute whose name literally contains dots takes precedence over path traversal.
pub(crate) fn get_path<'a>(attributes: &'a Attributes, path: &str) -> Option<&'a AttributeValue> {
    if let Some(value) = attributes.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let mut current = attributes.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// String representation of an attribute used as hash input and for list membership.
///
/// Returns `None` for values that cannot identify a unit (null, empty string, arrays, objects).
pub(crate) fn to_hash_value(value: &AttributeValue) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(number_to_string(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Render numbers the way ECMAScript `Number.prototype.toString` does, so that hash inputs are the
/// same in every SDK: `42.0` is `"42"`, `1e21` is `"1e+21"` and `1.5e-7` is `"1.5e-7"`.
///
/// Integers beyond 2^53 go through `f64` first, like they do in a JavaScript runtime.
pub(crate) fn number_to_string(n: &Number) -> String {
    match n.as_f64() {
        Some(f) => js_number_to_string(f).unwrap_or_else(|| f.to_string()),
        None => n.to_string(),
    }
}

fn js_number_to_string(f: f64) -> Option<String> {
    if f.is_nan() {
        return Some("NaN".to_owned());
    }
    if f.is_infinite() {
        return Some(if f > 0.0 { "Infinity" } else { "-Infinity" }.to_owned());
    }
    if f == 0.0 {
        return Some("0".to_owned());
    }

    // Shortest round-trip digits, e.g. "1.2345e-7".
    let scientific = format!("{:e}", f.abs());
    let (mantissa, exponent) = scientific.split_once('e')?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit.
    let n = exponent.parse::<i32>().ok()? + 1;

    let body = if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat(n.unsigned_abs() as usize))
    } else {
        let (first, rest) = digits.split_at(1);
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{first}e{sign}{}", e.abs())
        } else {
            format!("{first}.{rest}e{sign}{}", e.abs())
        }
    };

    Some(if f < 0.0 { format!("-{body}") } else { body })
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, a)| b.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => a == b,
    }
}
