use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied between a field value and a condition value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
    /// Unrecognized operator; evaluates to `true`.
    Other(String),
    #[default]
    Missing,
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::Other(name) => name,
            Operator::Missing => "",
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "greater_than" => Operator::GreaterThan,
            "less_than" => Operator::LessThan,
            "is_empty" => Operator::IsEmpty,
            "is_not_empty" => Operator::IsNotEmpty,
            "" => Operator::Missing,
            _ => Operator::Other(value),
        }
    }
}

/// Non-string operators (`null`, numbers, objects) are treated as missing.
impl From<Value> for Operator {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => Operator::from(name),
            _ => Operator::Missing,
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recursive boolean expression: a base comparison gated by `and`/`or` children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub field_name: String,
    #[serde(default)]
    #[schemars(with = "String")]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    #[serde(
        default,
        deserialize_with = "crate::spec::null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub and: Vec<Condition>,
    #[serde(
        default,
        deserialize_with = "crate::spec::null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub or: Vec<Condition>,
}

impl Condition {
    pub fn new(field_name: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value,
            and: Vec::new(),
            or: Vec::new(),
        }
    }

    pub fn with_and(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.and.extend(conditions);
        self
    }

    pub fn with_or(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.or.extend(conditions);
        self
    }
}

/// Conditional behaviour attached to a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConditionalLogic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_if: Option<Condition>,
    /// Ignored whenever `show_if` is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_if: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_if: Option<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_children_read_as_empty() {
        let condition: Condition = serde_json::from_value(json!({
            "field_name": "topic",
            "operator": "equals",
            "value": "support",
            "and": null,
            "or": null
        }))
        .expect("condition");
        assert!(condition.and.is_empty());
        assert!(condition.or.is_empty());
        assert_eq!(condition.operator, Operator::Equals);
    }

    #[test]
    fn non_string_operator_reads_as_missing() {
        for operator in [json!(null), json!(3), json!({ "op": "equals" })] {
            let condition: Condition = serde_json::from_value(json!({
                "field_name": null,
                "operator": operator,
                "value": "x"
            }))
            .expect("condition");
            assert_eq!(condition.operator, Operator::Missing);
            assert_eq!(condition.field_name, "");
        }
    }

    #[test]
    fn operator_serializes_as_its_name() {
        let condition = Condition::new("a", Operator::GreaterThan, json!(1));
        let encoded = serde_json::to_value(&condition).expect("encode");
        assert_eq!(encoded["operator"], json!("greater_than"));
        assert!(encoded.get("and").is_none());
    }
}
