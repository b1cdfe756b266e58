use handlebars::Handlebars;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::SpecError;
use crate::spec::field::FieldDefinition;

/// Validation message identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Required,
    MinLength,
    MaxLength,
    Pattern,
    Email,
    Phone,
    Url,
    Number,
    Min,
    Max,
    Date,
    Time,
    Datetime,
    Option,
    Options,
    SelectAtLeastOne,
    CheckboxRequired,
    FileType,
    FileSize,
    TypeMismatch,
    ConsentRequired,
    CaptchaRequired,
}

impl MessageKey {
    pub const ALL: [MessageKey; 22] = [
        MessageKey::Required,
        MessageKey::MinLength,
        MessageKey::MaxLength,
        MessageKey::Pattern,
        MessageKey::Email,
        MessageKey::Phone,
        MessageKey::Url,
        MessageKey::Number,
        MessageKey::Min,
        MessageKey::Max,
        MessageKey::Date,
        MessageKey::Time,
        MessageKey::Datetime,
        MessageKey::Option,
        MessageKey::Options,
        MessageKey::SelectAtLeastOne,
        MessageKey::CheckboxRequired,
        MessageKey::FileType,
        MessageKey::FileSize,
        MessageKey::TypeMismatch,
        MessageKey::ConsentRequired,
        MessageKey::CaptchaRequired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Required => "required",
            MessageKey::MinLength => "min_length",
            MessageKey::MaxLength => "max_length",
            MessageKey::Pattern => "pattern",
            MessageKey::Email => "email",
            MessageKey::Phone => "phone",
            MessageKey::Url => "url",
            MessageKey::Number => "number",
            MessageKey::Min => "min",
            MessageKey::Max => "max",
            MessageKey::Date => "date",
            MessageKey::Time => "time",
            MessageKey::Datetime => "datetime",
            MessageKey::Option => "option",
            MessageKey::Options => "options",
            MessageKey::SelectAtLeastOne => "select_at_least_one",
            MessageKey::CheckboxRequired => "checkbox_required",
            MessageKey::FileType => "file_type",
            MessageKey::FileSize => "file_size",
            MessageKey::TypeMismatch => "type_mismatch",
            MessageKey::ConsentRequired => "consent_required",
            MessageKey::CaptchaRequired => "captcha_required",
        }
    }
}

/// Handlebars templates for every default validation message.
///
/// Available variables: `label`, `name`, `min_length`, `max_length`, `min`,
/// `max`, `allowed_types`, `max_file_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MessageTemplates {
    pub required: String,
    pub min_length: String,
    pub max_length: String,
    pub pattern: String,
    pub email: String,
    pub phone: String,
    pub url: String,
    pub number: String,
    pub min: String,
    pub max: String,
    pub date: String,
    pub time: String,
    pub datetime: String,
    pub option: String,
    pub options: String,
    pub select_at_least_one: String,
    pub checkbox_required: String,
    pub file_type: String,
    pub file_size: String,
    pub type_mismatch: String,
    pub consent_required: String,
    pub captcha_required: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            required: "{{label}} is required".into(),
            min_length: "{{label}} must be at least {{min_length}} characters".into(),
            max_length: "{{label}} must be at most {{max_length}} characters".into(),
            pattern: "{{label}} has an invalid format".into(),
            email: "Please enter a valid email address".into(),
            phone: "Please enter a valid phone number".into(),
            url: "Please enter a valid URL".into(),
            number: "{{label}} must be a number".into(),
            min: "{{label}} must be at least {{min}}".into(),
            max: "{{label}} must be at most {{max}}".into(),
            date: "Please enter a valid date".into(),
            time: "Please enter a valid time".into(),
            datetime: "Please enter a valid date and time".into(),
            option: "Please select a valid option".into(),
            options: "Please select valid options".into(),
            select_at_least_one: "Please select at least one option".into(),
            checkbox_required: "{{label}} is required".into(),
            file_type: "File must be one of: {{allowed_types}}".into(),
            file_size: "File must be smaller than {{max_file_size}}MB".into(),
            type_mismatch: "{{label}} has an invalid value".into(),
            consent_required: "You must agree to continue".into(),
            captcha_required: "Please complete the CAPTCHA challenge".into(),
        }
    }
}

impl MessageTemplates {
    pub fn get(&self, key: MessageKey) -> &str {
        match key {
            MessageKey::Required => &self.required,
            MessageKey::MinLength => &self.min_length,
            MessageKey::MaxLength => &self.max_length,
            MessageKey::Pattern => &self.pattern,
            MessageKey::Email => &self.email,
            MessageKey::Phone => &self.phone,
            MessageKey::Url => &self.url,
            MessageKey::Number => &self.number,
            MessageKey::Min => &self.min,
            MessageKey::Max => &self.max,
            MessageKey::Date => &self.date,
            MessageKey::Time => &self.time,
            MessageKey::Datetime => &self.datetime,
            MessageKey::Option => &self.option,
            MessageKey::Options => &self.options,
            MessageKey::SelectAtLeastOne => &self.select_at_least_one,
            MessageKey::CheckboxRequired => &self.checkbox_required,
            MessageKey::FileType => &self.file_type,
            MessageKey::FileSize => &self.file_size,
            MessageKey::TypeMismatch => &self.type_mismatch,
            MessageKey::ConsentRequired => &self.consent_required,
            MessageKey::CaptchaRequired => &self.captcha_required,
        }
    }
}

/// Compiled message templates.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    templates: MessageTemplates,
    registry: Handlebars<'static>,
}

impl MessageCatalog {
    pub fn new(templates: MessageTemplates) -> Result<Self, SpecError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for key in MessageKey::ALL {
            registry
                .register_template_string(key.as_str(), templates.get(key))
                .map_err(|source| SpecError::Template {
                    key: key.as_str(),
                    source: Box::new(source),
                })?;
        }
        Ok(Self {
            templates,
            registry,
        })
    }

    pub fn templates(&self) -> &MessageTemplates {
        &self.templates
    }

    /// Message for a field; `custom_error` wins over every template.
    pub fn for_field(&self, key: MessageKey, field: &FieldDefinition) -> String {
        if let Some(custom) = field.custom_error() {
            return custom.to_string();
        }
        self.render(key, &field_context(field))
    }

    /// Message that is not tied to a field definition.
    pub fn plain(&self, key: MessageKey) -> String {
        self.render(key, &Value::Object(Map::new()))
    }

    fn render(&self, key: MessageKey, ctx: &Value) -> String {
        match self.registry.render(key.as_str(), ctx) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    key = key.as_str(),
                    error = %err,
                    "message template failed; using raw text"
                );
                self.templates.get(key).to_string()
            }
        }
    }
}

impl Default for MessageCatalog {
    fn default() -> Self {
        match Self::new(MessageTemplates::default()) {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = %err, "default message templates failed to compile");
                let mut registry = Handlebars::new();
                registry.register_escape_fn(handlebars::no_escape);
                Self {
                    templates: MessageTemplates::default(),
                    registry,
                }
            }
        }
    }
}

fn field_context(field: &FieldDefinition) -> Value {
    let label = if field.label.trim().is_empty() {
        field.name.clone()
    } else {
        field.label.clone()
    };
    let rules = field.rules();
    json!({
        "label": label,
        "name": field.name,
        "min_length": rules.and_then(|rules| rules.min_length),
        "max_length": rules.and_then(|rules| rules.max_length),
        "min": rules.and_then(|rules| rules.min).map(display_number),
        "max": rules.and_then(|rules| rules.max).map(display_number),
        "allowed_types": rules
            .and_then(|rules| rules.allowed_types.as_ref())
            .map(|types| types.join(", ")),
        "max_file_size": rules.and_then(|rules| rules.max_file_size).map(display_number),
    })
}

fn display_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(value: Value) -> FieldDefinition {
        serde_json::from_value(value).expect("field")
    }

    #[test]
    fn renders_label_and_bounds() {
        let catalog = MessageCatalog::default();
        let name = field(json!({
            "id": "1",
            "name": "name",
            "field_type": "text",
            "label": "Full name",
            "validation_rules": { "min_length": 3, "min": 2.0 }
        }));
        assert_eq!(
            catalog.for_field(MessageKey::MinLength, &name),
            "Full name must be at least 3 characters"
        );
        assert_eq!(catalog.for_field(MessageKey::Min, &name), "Full name must be at least 2");
    }

    #[test]
    fn label_falls_back_to_name() {
        let catalog = MessageCatalog::default();
        let unnamed = field(json!({ "id": "1", "name": "email", "field_type": "email" }));
        assert_eq!(catalog.for_field(MessageKey::Required, &unnamed), "email is required");
    }

    #[test]
    fn custom_error_overrides_templates() {
        let catalog = MessageCatalog::default();
        let custom = field(json!({
            "id": "1",
            "name": "code",
            "field_type": "text",
            "validation_rules": { "custom_error": "Bad code" }
        }));
        assert_eq!(catalog.for_field(MessageKey::Pattern, &custom), "Bad code");
    }

    #[test]
    fn overrides_load_from_partial_json() {
        let templates: MessageTemplates =
            serde_json::from_value(json!({ "required": "Bitte {{label}} ausfüllen" }))
                .expect("templates");
        let catalog = MessageCatalog::new(templates).expect("catalog");
        let zip = field(json!({ "id": "1", "name": "zip", "field_type": "text", "label": "PLZ" }));
        assert_eq!(catalog.for_field(MessageKey::Required, &zip), "Bitte PLZ ausfüllen");
        assert_eq!(catalog.plain(MessageKey::Email), "Please enter a valid email address");
    }

    #[test]
    fn broken_template_is_rejected() {
        let templates = MessageTemplates {
            required: "{{#if label}".into(),
            ..MessageTemplates::default()
        };
        assert!(matches!(
            MessageCatalog::new(templates),
            Err(SpecError::Template { key: "required", .. })
        ));
    }
}
