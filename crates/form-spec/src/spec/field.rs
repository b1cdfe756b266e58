use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::condition::ConditionalLogic;

/// Kinds of fields a form definition may declare.
///
/// Unknown type names are preserved in [`FieldType::Other`] so custom widgets
/// can still be rendered; the validator treats them as accept-anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum FieldType {
    Text,
    Textarea,
    Email,
    Phone,
    Number,
    Url,
    Date,
    Time,
    Datetime,
    Select,
    Radio,
    Checkbox,
    CheckboxGroup,
    File,
    Hidden,
    Country,
    State,
    Html,
    Divider,
    Recaptcha,
    Other(String),
}

impl FieldType {
    pub const BUILT_IN: [FieldType; 20] = [
        FieldType::Text,
        FieldType::Textarea,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Number,
        FieldType::Url,
        FieldType::Date,
        FieldType::Time,
        FieldType::Datetime,
        FieldType::Select,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::CheckboxGroup,
        FieldType::File,
        FieldType::Hidden,
        FieldType::Country,
        FieldType::State,
        FieldType::Html,
        FieldType::Divider,
        FieldType::Recaptcha,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Number => "number",
            FieldType::Url => "url",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Select => "select",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::CheckboxGroup => "checkbox_group",
            FieldType::File => "file",
            FieldType::Hidden => "hidden",
            FieldType::Country => "country",
            FieldType::State => "state",
            FieldType::Html => "html",
            FieldType::Divider => "divider",
            FieldType::Recaptcha => "recaptcha",
            FieldType::Other(name) => name,
        }
    }

    pub fn unknown() -> Self {
        FieldType::Other(String::new())
    }

    /// Display-only types carry no user input and never enter the compiled schema.
    pub fn is_display_only(&self) -> bool {
        matches!(
            self,
            FieldType::Html | FieldType::Divider | FieldType::Recaptcha
        )
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        FieldType::BUILT_IN
            .iter()
            .find(|kind| kind.as_str() == value)
            .cloned()
            .unwrap_or(FieldType::Other(value))
    }
}

/// A missing or non-string type tag becomes an unnamed [`FieldType::Other`].
impl From<Value> for FieldType {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => FieldType::from(name),
            _ => FieldType::unknown(),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fractional width a field occupies in multi-column layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum FieldWidth {
    #[default]
    Full,
    Half,
    Third,
    Quarter,
}

impl FieldWidth {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldWidth::Full => "full",
            FieldWidth::Half => "half",
            FieldWidth::Third => "third",
            FieldWidth::Quarter => "quarter",
        }
    }

    pub fn fraction(&self) -> f64 {
        match self {
            FieldWidth::Full => 1.0,
            FieldWidth::Half => 0.5,
            FieldWidth::Third => 0.333,
            FieldWidth::Quarter => 0.25,
        }
    }
}

impl From<String> for FieldWidth {
    fn from(value: String) -> Self {
        match value.as_str() {
            "half" => FieldWidth::Half,
            "third" => FieldWidth::Third,
            "quarter" => FieldWidth::Quarter,
            _ => FieldWidth::Full,
        }
    }
}

impl From<Value> for FieldWidth {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => FieldWidth::from(name),
            _ => FieldWidth::Full,
        }
    }
}

impl From<FieldWidth> for String {
    fn from(value: FieldWidth) -> Self {
        value.as_str().to_string()
    }
}

/// Per-type validation knobs; keys that do not apply to a field type are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
    /// Maximum upload size in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

/// Choice configuration for select, radio and checkbox group fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FieldOptions {
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub options: Vec<SelectOption>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub allow_other: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_label: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub multiple: bool,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub searchable: bool,
}

impl FieldOptions {
    pub fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    pub fn selected(&self) -> Option<&SelectOption> {
        self.options.iter().find(|option| option.selected)
    }
}

/// Single field of a server-defined form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "field_type", alias = "type", default = "FieldType::unknown")]
    #[schemars(with = "String")]
    pub kind: FieldType,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub display_order: i64,
    #[serde(default, deserialize_with = "crate::spec::null_as_default")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rules: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_logic: Option<ConditionalLogic>,
    #[serde(default)]
    #[schemars(with = "String")]
    pub width: FieldWidth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    /// Absent means active; an explicit `null` reads as inactive.
    #[serde(default = "default_active", deserialize_with = "crate::spec::null_as_default")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl FieldDefinition {
    pub fn rules(&self) -> Option<&ValidationRules> {
        self.validation_rules.as_ref()
    }

    pub fn custom_error(&self) -> Option<&str> {
        self.validation_rules
            .as_ref()
            .and_then(|rules| rules.custom_error.as_deref())
    }

    /// Initial snapshot value: a pre-selected option wins over `default_value`.
    pub fn initial_value(&self) -> Option<Value> {
        if let Some(selected) = self.options.as_ref().and_then(FieldOptions::selected) {
            return Some(Value::String(selected.value.clone()));
        }
        match &self.default_value {
            Some(Value::Null) | None => None,
            Some(Value::String(text)) if text.is_empty() => None,
            Some(value) => Some(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_field_type_is_preserved() {
        let kind: FieldType = serde_json::from_value(json!("signature")).expect("kind");
        assert_eq!(kind, FieldType::Other("signature".into()));
        assert_eq!(serde_json::to_value(&kind).expect("encode"), json!("signature"));
    }

    #[test]
    fn built_in_names_round_trip() {
        for kind in FieldType::BUILT_IN {
            let parsed = FieldType::from(kind.as_str().to_string());
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_width_falls_back_to_full() {
        let width: FieldWidth = serde_json::from_value(json!("two-thirds")).expect("width");
        assert_eq!(width, FieldWidth::Full);
    }

    #[test]
    fn nulls_fall_back_to_defaults() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "id": "f1",
            "name": "notes",
            "field_type": null,
            "label": null,
            "display_order": null,
            "required": null,
            "width": null,
            "options": { "options": null, "multiple": null }
        }))
        .expect("field");
        assert_eq!(field.kind, FieldType::unknown());
        assert_eq!(field.label, "");
        assert_eq!(field.display_order, 0);
        assert!(!field.required);
        assert_eq!(field.width, FieldWidth::Full);
        assert!(field.options.as_ref().is_some_and(|options| options.options.is_empty()));
        assert!(field.is_active);
    }

    #[test]
    fn missing_type_and_numeric_width_still_load() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "id": "f1",
            "name": "notes",
            "width": 50,
            "is_active": null
        }))
        .expect("field");
        assert_eq!(field.kind, FieldType::unknown());
        assert_eq!(field.width, FieldWidth::Full);
        assert!(!field.is_active);
    }

    #[test]
    fn selected_option_overrides_default_value() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "id": "f1",
            "name": "plan",
            "field_type": "select",
            "label": "Plan",
            "default_value": "basic",
            "options": {
                "options": [
                    { "value": "basic", "label": "Basic" },
                    { "value": "pro", "label": "Pro", "selected": true }
                ]
            }
        }))
        .expect("field");
        assert!(field.is_active);
        assert_eq!(field.initial_value(), Some(json!("pro")));
    }
}
