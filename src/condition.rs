use std::cmp::Ordering;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    attributes::{get_path, values_equal},
    saved_group::{list_contains, SavedGroup, SavedGroups},
    Attributes, TryParse,
};

/// A targeting expression evaluated against an attribute map.
///
/// Expressions use a mongo-like syntax. Top-level keys are either logical operators (`$and`,
/// `$or`, `$nor`, `$not`) or dotted attribute paths. A path maps either to a literal (equality) or
/// to an object of operators that all have to hold:
///
/// ```json
/// {"country": {"$in": ["US", "CA"]}, "$or": [{"plan": "pro"}, {"age": {"$gte": 18}}]}
/// ```
///
/// Expressions are parsed once, when the configuration is loaded. An expression that uses an
/// unknown operator or a malformed operand (e.g., an invalid regex) never matches, even under
/// `$not`.
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Parse a condition from its JSON representation.
    pub fn parse(value: &Value) -> Condition {
        let expr = Expr::parse(value);
        if expr.is_well_formed() {
            Condition { expr }
        } else {
            Condition {
                expr: Expr::Malformed,
            }
        }
    }

    /// A condition that matches everything.
    pub fn always() -> Condition {
        Condition {
            expr: Expr::And(Vec::new()),
        }
    }

    /// Return `true` if the condition failed to parse and will never match.
    pub fn is_malformed(&self) -> bool {
        matches!(self.expr, Expr::Malformed)
    }

    /// Evaluate the condition. `saved_groups` are consulted by `$inGroup` and `$notInGroup`.
    pub fn eval(&self, attributes: &Attributes, saved_groups: &SavedGroups) -> bool {
        self.expr.eval(attributes, saved_groups)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Conditions may be stored as a JSON object or as a string containing JSON.
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::String(s) if s.trim().is_empty() => Condition::always(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed) => Condition::parse(&parsed),
                Err(_) => Condition {
                    expr: Expr::Malformed,
                },
            },
            _ => Condition::parse(&value),
        })
    }
}

#[derive(Debug, Clone)]
enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Nor(Vec<Expr>),
    Not(Box<Expr>),
    Field { path: String, test: FieldTest },
    Malformed,
}

impl Expr {
    fn parse(value: &Value) -> Expr {
        let Value::Object(map) = value else {
            return Expr::Malformed;
        };

        let mut parts: Vec<Expr> = map
            .iter()
            .map(|(key, value)| Expr::parse_entry(key, value))
            .collect();
        if parts.len() == 1 {
            parts.swap_remove(0)
        } else {
            Expr::And(parts)
        }
    }

    fn parse_entry(key: &str, value: &Value) -> Expr {
        match key {
            "$and" => Expr::parse_list(value).map_or(Expr::Malformed, Expr::And),
            "$or" => Expr::parse_list(value).map_or(Expr::Malformed, Expr::Or),
            "$nor" => Expr::parse_list(value).map_or(Expr::Malformed, Expr::Nor),
            "$not" => Expr::Not(Box::new(Expr::parse(value))),
            key if key.starts_with('$') => Expr::Malformed,
            path => Expr::Field {
                path: path.to_owned(),
                test: FieldTest::parse(value),
            },
        }
    }

    fn parse_list(value: &Value) -> Option<Vec<Expr>> {
        Some(value.as_array()?.iter().map(Expr::parse).collect())
    }

    fn is_well_formed(&self) -> bool {
        match self {
            Expr::And(exprs) | Expr::Or(exprs) | Expr::Nor(exprs) => {
                exprs.iter().all(Expr::is_well_formed)
            }
            Expr::Not(expr) => expr.is_well_formed(),
            Expr::Field { test, .. } => test.is_well_formed(),
            Expr::Malformed => false,
        }
    }

    fn eval(&self, attributes: &Attributes, saved_groups: &SavedGroups) -> bool {
        match self {
            Expr::And(exprs) => exprs.iter().all(|e| e.eval(attributes, saved_groups)),
            // Empty `$or` is vacuously true.
            Expr::Or(exprs) => {
                exprs.is_empty() || exprs.iter().any(|e| e.eval(attributes, saved_groups))
            }
            Expr::Nor(exprs) => !exprs.iter().any(|e| e.eval(attributes, saved_groups)),
            Expr::Not(expr) => !expr.eval(attributes, saved_groups),
            Expr::Field { path, test } => test.eval(get_path(attributes, path), saved_groups),
            Expr::Malformed => false,
        }
    }
}

#[derive(Debug, Clone)]
enum FieldTest {
    /// Deep equality with a literal.
    Equals(Value),
    /// Every operator must hold.
    Operators(Vec<Operator>),
}

impl FieldTest {
    fn parse(value: &Value) -> FieldTest {
        match value {
            Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
                FieldTest::Operators(
                    map.iter()
                        .map(|(key, value)| Operator::parse(key, value))
                        .collect(),
                )
            }
            _ => FieldTest::Equals(value.clone()),
        }
    }

    fn is_well_formed(&self) -> bool {
        match self {
            FieldTest::Equals(_) => true,
            FieldTest::Operators(ops) => ops.iter().all(Operator::is_well_formed),
        }
    }

    fn eval(&self, actual: Option<&Value>, saved_groups: &SavedGroups) -> bool {
        match self {
            FieldTest::Equals(expected) => actual.is_some_and(|a| values_equal(a, expected)),
            FieldTest::Operators(ops) => ops.iter().all(|op| op.eval(actual, saved_groups)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Lte => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
enum Operator {
    Eq(Value),
    Ne(Value),
    Compare(CompareOp, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<Value>),
    Size(Box<FieldTest>),
    ElemMatch(Box<ElemMatch>),
    Exists(bool),
    Type(String),
    Regex(Regex),
    Not(Box<FieldTest>),
    Version(CompareOp, Version),
    InGroup(String),
    NotInGroup(String),
    /// Unknown operator or malformed operand.
    Unsupported(String),
}

impl Operator {
    fn parse(key: &str, value: &Value) -> Operator {
        let unsupported = || Operator::Unsupported(key.to_owned());
        let list = || value.as_array().cloned();
        let version = |op| {
            value
                .as_str()
                .and_then(parse_version)
                .map_or_else(unsupported, |v| Operator::Version(op, v))
        };

        match key {
            "$eq" => Operator::Eq(value.clone()),
            "$ne" => Operator::Ne(value.clone()),
            "$lt" => Operator::Compare(CompareOp::Lt, value.clone()),
            "$lte" => Operator::Compare(CompareOp::Lte, value.clone()),
            "$gt" => Operator::Compare(CompareOp::Gt, value.clone()),
            "$gte" => Operator::Compare(CompareOp::Gte, value.clone()),
            "$in" => list().map_or_else(unsupported, Operator::In),
            "$nin" => list().map_or_else(unsupported, Operator::Nin),
            "$all" => list().map_or_else(unsupported, Operator::All),
            "$size" => Operator::Size(Box::new(FieldTest::parse(value))),
            "$elemMatch" => Operator::ElemMatch(Box::new(ElemMatch::parse(value))),
            "$exists" => value.as_bool().map_or_else(unsupported, Operator::Exists),
            "$type" => value
                .as_str()
                .map_or_else(unsupported, |t| Operator::Type(t.to_owned())),
            "$regex" => value
                .as_str()
                .and_then(|s| Regex::new(s).ok())
                .map_or_else(unsupported, Operator::Regex),
            "$not" => Operator::Not(Box::new(FieldTest::parse(value))),
            "$veq" => version(CompareOp::Eq),
            "$vne" => version(CompareOp::Ne),
            "$vlt" => version(CompareOp::Lt),
            "$vlte" => version(CompareOp::Lte),
            "$vgt" => version(CompareOp::Gt),
            "$vgte" => version(CompareOp::Gte),
            "$inGroup" => value
                .as_str()
                .map_or_else(unsupported, |id| Operator::InGroup(id.to_owned())),
            "$notInGroup" => value
                .as_str()
                .map_or_else(unsupported, |id| Operator::NotInGroup(id.to_owned())),
            _ => unsupported(),
        }
    }

    fn is_well_formed(&self) -> bool {
        match self {
            Operator::Size(test) | Operator::Not(test) => test.is_well_formed(),
            Operator::ElemMatch(elem_match) => elem_match.is_well_formed(),
            Operator::Unsupported(_) => false,
            _ => true,
        }
    }

    /// Apply the operator to the attribute value. Absent attributes only satisfy operators that
    /// test for absence.
    fn eval(&self, actual: Option<&Value>, saved_groups: &SavedGroups) -> bool {
        let Some(actual) = actual else {
            return match self {
                Operator::Exists(expected) => !expected,
                Operator::Type(t) => t == "undefined",
                Operator::Not(test) => !test.eval(None, saved_groups),
                _ => false,
            };
        };

        match self {
            Operator::Eq(expected) => values_equal(actual, expected),
            Operator::Ne(expected) => !values_equal(actual, expected),
            Operator::Compare(op, expected) => {
                compare(actual, expected).is_some_and(|ordering| op.test(ordering))
            }
            Operator::In(list) => is_in(list, actual),
            Operator::Nin(list) => !is_in(list, actual),
            Operator::All(list) => actual.as_array().is_some_and(|items| {
                list.iter()
                    .all(|expected| items.iter().any(|item| values_equal(item, expected)))
            }),
            Operator::Size(test) => actual
                .as_array()
                .is_some_and(|items| test.eval(Some(&Value::from(items.len())), saved_groups)),
            Operator::ElemMatch(elem_match) => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|item| elem_match.eval(item, saved_groups))),
            Operator::Exists(expected) => !actual.is_null() == *expected,
            Operator::Type(t) => type_name(actual) == t,
            Operator::Regex(regex) => actual.as_str().is_some_and(|s| regex.is_match(s)),
            Operator::Not(test) => !test.eval(Some(actual), saved_groups),
            Operator::Version(op, expected) => actual
                .as_str()
                .and_then(parse_version)
                .is_some_and(|v| op.test(v.cmp(expected))),
            Operator::InGroup(id) => in_list_group(id, actual, saved_groups).unwrap_or(false),
            Operator::NotInGroup(id) => {
                in_list_group(id, actual, saved_groups).is_some_and(|found| !found)
            }
            Operator::Unsupported(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
enum ElemMatch {
    /// Operators applied to each element.
    Test(FieldTest),
    /// A nested condition applied to each (object) element.
    Condition(Expr),
}

impl ElemMatch {
    fn parse(value: &Value) -> ElemMatch {
        match FieldTest::parse(value) {
            test @ FieldTest::Operators(_) => ElemMatch::Test(test),
            FieldTest::Equals(_) => ElemMatch::Condition(Expr::parse(value)),
        }
    }

    fn is_well_formed(&self) -> bool {
        match self {
            ElemMatch::Test(test) => test.is_well_formed(),
            ElemMatch::Condition(expr) => expr.is_well_formed(),
        }
    }

    fn eval(&self, item: &Value, saved_groups: &SavedGroups) -> bool {
        match self {
            ElemMatch::Test(test) => test.eval(Some(item), saved_groups),
            ElemMatch::Condition(expr) => match item {
                Value::Object(map) => {
                    let attributes: Attributes =
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    expr.eval(&attributes, saved_groups)
                }
                _ => false,
            },
        }
    }
}

/// Order two values: numbers numerically (numeric strings are coerced), strings
/// lexicographically. Other combinations are incomparable.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), Value::String(b)) => {
            a.as_f64()?.partial_cmp(&b.trim().parse::<f64>().ok()?)
        }
        (Value::String(a), Value::Number(b)) => {
            a.trim().parse::<f64>().ok()?.partial_cmp(&b.as_f64()?)
        }
        _ => None,
    }
}

/// Scalar membership, or non-empty intersection when the attribute is an array.
fn is_in(list: &[Value], actual: &Value) -> bool {
    match actual {
        Value::Array(items) => items
            .iter()
            .any(|item| list.iter().any(|v| values_equal(item, v))),
        _ => list.iter().any(|v| values_equal(actual, v)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `None` if the group is unknown or not a list group.
fn in_list_group(id: &str, actual: &Value, saved_groups: &SavedGroups) -> Option<bool> {
    match saved_groups.get(id).and_then(TryParse::parsed) {
        Some(SavedGroup::List { values, .. }) => Some(list_contains(values, actual)),
        _ => {
            log::warn!(target: "feature_rules", saved_group = id; "unknown list saved group");
            None
        }
    }
}

/// Lenient semver parsing: a leading `v` is dropped and missing minor/patch components are padded
/// with zeros (`v1.2` is `1.2.0`).
fn parse_version(s: &str) -> Option<Version> {
    let s = s.trim().trim_start_matches(['v', 'V']);
    let (core, suffix) = match s.find(['-', '+']) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), suffix)).ok()
}
