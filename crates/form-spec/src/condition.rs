use serde_json::{Map, Value};

use crate::spec::condition::{Condition, Operator};

/// Field name to raw input value, as typed by the user.
pub type ValueSnapshot = Map<String, Value>;

impl Condition {
    /// Evaluates the condition tree against a snapshot.
    ///
    /// The base comparison is computed first. Any false `and` child makes the
    /// whole condition false. When `or` children exist the result is
    /// `base && any(or)`: they gate the base result, they never replace it.
    pub fn evaluate(&self, values: &ValueSnapshot) -> bool {
        let field_value = values.get(&self.field_name);
        let mut result = compare(field_value, &self.operator, &self.value);

        for child in &self.and {
            if !child.evaluate(values) {
                return false;
            }
        }

        if !self.or.is_empty() {
            let any = self.or.iter().any(|child| child.evaluate(values));
            result = result && any;
        }

        result
    }
}

/// Applies a single operator. Unknown or missing operators fail open.
pub fn compare(field_value: Option<&Value>, operator: &Operator, expected: &Value) -> bool {
    match operator {
        Operator::Equals => normalize(field_value) == normalize(Some(expected)),
        Operator::NotEquals => normalize(field_value) != normalize(Some(expected)),
        Operator::Contains => contains(field_value, expected),
        Operator::NotContains => !contains(field_value, expected),
        Operator::GreaterThan => to_number(field_value) > to_number(Some(expected)),
        Operator::LessThan => to_number(field_value) < to_number(Some(expected)),
        Operator::IsEmpty => is_empty(field_value),
        Operator::IsNotEmpty => !is_empty(field_value),
        Operator::Other(name) => {
            tracing::warn!(operator = %name, "unknown condition operator; treating as satisfied");
            true
        }
        Operator::Missing => true,
    }
}

/// True for absent, null, blank strings, empty arrays and empty objects.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
    }
}

fn contains(field_value: Option<&Value>, expected: &Value) -> bool {
    let haystack = coerce_string(field_value).to_lowercase();
    let needle = coerce_string(Some(expected)).to_lowercase();
    haystack.contains(&needle)
}

/// Lower-cased, trimmed comparison key. Arrays compare order-insensitively.
fn normalize(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => {
            let mut parts: Vec<String> = items
                .iter()
                .map(|item| coerce_string(Some(item)).to_lowercase().trim().to_string())
                .collect();
            parts.sort();
            parts.join(",")
        }
        Some(other) => coerce_string(Some(other)).to_lowercase().trim().to_string(),
    }
}

/// String coercion used by the text operators.
pub fn coerce_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => format_number(number),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| coerce_string(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(object @ Value::Object(_)) => object.to_string(),
    }
}

fn format_number(number: &serde_json::Number) -> String {
    if let Some(int) = number.as_i64() {
        return int.to_string();
    }
    if let Some(int) = number.as_u64() {
        return int.to_string();
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => format!("{}", float as i64),
        Some(float) => float.to_string(),
        None => number.to_string(),
    }
}

/// Numeric coercion. Anything that is not a number becomes NaN, which never
/// compares greater or less than anything.
pub fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(flag)) => {
            if *flag {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(text)) => parse_numeric(text),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(Some(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

/// Parses a decimal literal; blank input is zero and words such as `inf` are rejected.
pub fn parse_numeric(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let plausible = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if !plausible {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}
